mod cli;
mod commands;
mod config;
mod engine;
mod ui;

use anyhow::{Result, anyhow};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{CalamariCommand, Cli, Command, ConfigCommand, MonCommand, RgwCommand};
use remote::{HostTarget, SshConnector};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub cluster: String,
    pub username: Option<String>,
    pub conf_dir: PathBuf,
    pub overwrite_conf: bool,
}

impl Context {
    /// Path of `<cluster>.conf` in the working config directory
    pub fn conf_path(&self) -> PathBuf {
        self.conf_dir.join(cephconf::cluster_path(&self.cluster))
    }

    /// Parse `host` / `user@host` arguments, filling in `--username`
    pub fn targets<S: AsRef<str>>(&self, hosts: &[S]) -> Result<Vec<HostTarget>> {
        hosts
            .iter()
            .map(|h| {
                h.as_ref()
                    .parse::<HostTarget>()
                    .map(|t| t.or_user(self.username.as_deref()))
                    .map_err(|e| anyhow!(e))
            })
            .collect()
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        cluster: cli.cluster,
        username: cli.username,
        conf_dir: config::expand_dir(&cli.conf_dir),
        overwrite_conf: cli.overwrite_conf,
    };

    let settings = config::Settings::load()?;
    let mut connector =
        SshConnector::new().with_connect_timeout(Duration::from_secs(settings.ssh.connect_timeout));
    for option in &settings.ssh.options {
        connector = connector.with_option(option.clone());
    }

    match cli.command {
        Command::Install(args) => commands::install::install(&ctx, &connector, &settings, &args),
        Command::InstallRepo(args) => {
            commands::install::install_repo(&ctx, &connector, &settings, &args)
        }
        Command::Uninstall(args) => commands::install::uninstall(&ctx, &connector, &args.hosts),
        Command::Purge(args) => commands::install::purge(&ctx, &connector, &args.hosts),
        Command::PurgeData(args) => commands::install::purgedata(&ctx, &connector, &args),
        Command::Mon(MonCommand::Create { hosts }) => {
            commands::mon::create(&ctx, &connector, &hosts)
        }
        Command::Rgw(cmd) => match cmd {
            RgwCommand::List => commands::rgw::list(&ctx),
            RgwCommand::Prepare(args) => commands::rgw::prepare(&ctx, &connector, &args.gateways),
            RgwCommand::Activate(args) => {
                commands::rgw::activate(&ctx, &connector, &args.gateways)
            }
            RgwCommand::Create(args) => commands::rgw::create(&ctx, &connector, &args.gateways),
            RgwCommand::Delete(args) => commands::rgw::delete(&ctx, &connector, &args.gateways),
        },
        Command::Calamari(CalamariCommand::Connect { master, hosts }) => {
            commands::calamari::connect(&ctx, &connector, &master, &hosts)
        }
        Command::Config(cmd) => match cmd {
            ConfigCommand::Push { hosts } => commands::config::push(&ctx, &connector, &hosts),
            ConfigCommand::Show => commands::config::show(&ctx),
        },
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "cephdeploy", &mut io::stdout());
            Ok(())
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_targets_apply_global_username() {
        let mut ctx = test_support::context(Path::new("."), "ceph");
        ctx.username = Some("admin".to_string());

        let targets = ctx.targets(&["node1", "root@node2"]).unwrap();
        assert_eq!(targets[0].destination(), "admin@node1");
        assert_eq!(targets[1].destination(), "root@node2");
        assert!(ctx.targets(&["@node3"]).is_err());
    }

    #[test]
    fn test_conf_path_uses_cluster_name() {
        let ctx = test_support::context(Path::new("/work"), "backup");
        assert_eq!(ctx.conf_path(), PathBuf::from("/work/backup.conf"));
    }
}
