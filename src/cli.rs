use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "cephdeploy")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Deploy Ceph to remote hosts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Name of the cluster
    #[arg(long, default_value = "ceph", global = true)]
    pub cluster: String,

    /// Connect to hosts as this user
    #[arg(long, global = true, env = "CEPHDEPLOY_USERNAME")]
    pub username: Option<String>,

    /// Directory holding <cluster>.conf and keyrings
    #[arg(long, default_value = ".", global = true)]
    pub conf_dir: String,

    /// Replace remote config files that have different content
    #[arg(long, global = true)]
    pub overwrite_conf: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Install Ceph packages on remote hosts
    Install(InstallArgs),

    /// Add a custom repository from the settings file without installing Ceph
    #[command(name = "install-repo", alias = "repo")]
    InstallRepo(InstallRepoArgs),

    /// Remove Ceph packages from remote hosts
    Uninstall(HostsArgs),

    /// Remove Ceph packages and their configuration from remote hosts
    Purge(HostsArgs),

    /// Delete Ceph data from /var/lib/ceph and /etc/ceph
    #[command(name = "purgedata")]
    PurgeData(PurgeDataArgs),

    /// Deploy monitors
    #[command(subcommand)]
    Mon(MonCommand),

    /// Manage rados gateways
    #[command(subcommand)]
    Rgw(RgwCommand),

    /// Connect hosts to a Calamari server
    #[command(subcommand)]
    Calamari(CalamariCommand),

    /// Push or inspect the cluster configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Install
// ============================================================================

#[derive(Args)]
pub struct HostsArgs {
    /// Hosts to operate on (host or user@host)
    #[arg(required = true, value_name = "HOST")]
    pub hosts: Vec<String>,
}

#[derive(Args)]
pub struct InstallArgs {
    /// Hosts to install on
    #[arg(required = true, value_name = "HOST")]
    pub hosts: Vec<String>,

    /// Install a named stable release
    #[arg(long, default_value = "firefly", group = "release_version")]
    pub release: String,

    /// Deprecated alias of --release
    #[arg(long, hide = true, group = "release_version")]
    pub stable: Option<String>,

    /// Install the latest testing release
    #[arg(long, group = "release_version")]
    pub testing: bool,

    /// Install a development build of a branch
    #[arg(long, value_name = "BRANCH", num_args = 0..=1, default_missing_value = "master", group = "release_version")]
    pub dev: Option<String>,

    /// Rewrite the hosts' package repository configuration
    #[arg(long)]
    pub adjust_repos: bool,

    /// Install from a mirror instead of the upstream repositories
    #[arg(long, requires = "gpg_url")]
    pub repo_url: Option<String>,

    /// Signing key of the mirror
    #[arg(long, requires = "repo_url")]
    pub gpg_url: Option<String>,
}

#[derive(Args)]
pub struct InstallRepoArgs {
    /// Hosts to add the repository to
    #[arg(required = true, value_name = "HOST")]
    pub hosts: Vec<String>,

    /// Repository name from the settings file (falls back to the default repo)
    #[arg(long)]
    pub release: Option<String>,
}

#[derive(Args)]
pub struct PurgeDataArgs {
    /// Hosts to purge data from
    #[arg(required = true, value_name = "HOST")]
    pub hosts: Vec<String>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Monitors
// ============================================================================

#[derive(Subcommand)]
pub enum MonCommand {
    /// Build and start monitors (defaults to mon_initial_members)
    Create {
        /// Hosts to deploy monitors on
        #[arg(value_name = "HOST")]
        hosts: Vec<String>,
    },
}

// ============================================================================
// Gateways
// ============================================================================

#[derive(Subcommand)]
pub enum RgwCommand {
    /// List gateways in the cluster configuration
    List,

    /// Install, configure and key gateways
    Prepare(RgwArgs),

    /// Start and enable prepared gateways
    Activate(RgwArgs),

    /// Prepare then activate
    Create(RgwArgs),

    /// Tear down gateways and remove them from the configuration
    Delete(RgwArgs),
}

#[derive(Args)]
pub struct RgwArgs {
    /// Gateways as host[:instance][:fqdn][:port][:redirect]
    #[arg(required = true, value_name = "HOST[:NAME]")]
    pub gateways: Vec<String>,
}

// ============================================================================
// Calamari
// ============================================================================

#[derive(Subcommand)]
pub enum CalamariCommand {
    /// Install and start the salt minion pointed at a Calamari master
    Connect {
        /// FQDN of the Calamari server
        #[arg(long)]
        master: String,

        /// Hosts to connect
        #[arg(required = true, value_name = "HOST")]
        hosts: Vec<String>,
    },
}

// ============================================================================
// Config
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Write <cluster>.conf to /etc/ceph on hosts
    Push {
        /// Hosts to push to
        #[arg(required = true, value_name = "HOST")]
        hosts: Vec<String>,
    },

    /// Show where settings and the cluster configuration are read from
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_install_defaults() {
        let cli = Cli::parse_from(["cephdeploy", "install", "node1", "node2"]);
        assert_eq!(cli.cluster, "ceph");
        match cli.command {
            Command::Install(args) => {
                assert_eq!(args.hosts, vec!["node1", "node2"]);
                assert_eq!(args.release, "firefly");
                assert!(args.dev.is_none());
                assert!(!args.testing);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_dev_without_branch_means_master() {
        let cli = Cli::parse_from(["cephdeploy", "install", "--dev", "--", "node1"]);
        match cli.command {
            Command::Install(args) => assert_eq!(args.dev.as_deref(), Some("master")),
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_version_flags_are_exclusive() {
        let result = Cli::try_parse_from(["cephdeploy", "install", "--testing", "--dev", "x", "node1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_mon_create_hosts_are_optional() {
        let cli = Cli::parse_from(["cephdeploy", "mon", "create"]);
        match cli.command {
            Command::Mon(MonCommand::Create { hosts }) => assert!(hosts.is_empty()),
            _ => panic!("expected mon create"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "cephdeploy",
            "rgw",
            "prepare",
            "node3:gw1",
            "--cluster",
            "backup",
            "--username",
            "admin",
        ]);
        assert_eq!(cli.cluster, "backup");
        assert_eq!(cli.username.as_deref(), Some("admin"));
    }
}
