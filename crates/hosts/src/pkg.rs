//! Package manager bindings.
//!
//! Callers say "install these packages"; the command line for apt, yum,
//! dnf or zypper is chosen here.

use crate::distro::PackageManager;
use crate::error::Result;
use remote::{Session, check};

fn install_argv(manager: PackageManager) -> Vec<&'static str> {
    match manager {
        PackageManager::Apt => vec![
            "env",
            "DEBIAN_FRONTEND=noninteractive",
            "DEBIAN_PRIORITY=critical",
            "apt-get",
            "--assume-yes",
            "-q",
            "--no-install-recommends",
            "install",
        ],
        PackageManager::Yum => vec!["yum", "-y", "install"],
        PackageManager::Dnf => vec!["dnf", "-y", "install"],
        PackageManager::Zypper => vec!["zypper", "--non-interactive", "--quiet", "install"],
    }
}

fn remove_argv(manager: PackageManager, purge: bool) -> Vec<&'static str> {
    match manager {
        PackageManager::Apt => {
            let mut argv = vec![
                "env",
                "DEBIAN_FRONTEND=noninteractive",
                "DEBIAN_PRIORITY=critical",
                "apt-get",
                "--assume-yes",
                "-q",
                "-f",
                "remove",
            ];
            if purge {
                argv.push("--purge");
            }
            argv
        }
        PackageManager::Yum => vec!["yum", "-y", "-q", "remove"],
        PackageManager::Dnf => vec!["dnf", "-y", "-q", "remove"],
        PackageManager::Zypper => vec!["zypper", "--non-interactive", "--quiet", "remove"],
    }
}

fn update_argv(manager: PackageManager) -> Vec<&'static str> {
    match manager {
        PackageManager::Apt => vec!["apt-get", "-q", "update"],
        PackageManager::Yum => vec!["yum", "clean", "expire-cache"],
        PackageManager::Dnf => vec!["dnf", "clean", "expire-cache"],
        PackageManager::Zypper => vec!["zypper", "--non-interactive", "refresh"],
    }
}

/// Install packages.
pub fn install<S: Session + ?Sized>(
    session: &S,
    manager: PackageManager,
    packages: &[&str],
) -> Result<()> {
    let mut argv = install_argv(manager);
    argv.extend_from_slice(packages);
    check(session, &argv, None)?;
    Ok(())
}

/// Remove packages, optionally purging their configuration.
pub fn remove<S: Session + ?Sized>(
    session: &S,
    manager: PackageManager,
    packages: &[&str],
    purge: bool,
) -> Result<()> {
    let mut argv = remove_argv(manager, purge);
    argv.extend_from_slice(packages);
    check(session, &argv, None)?;
    Ok(())
}

/// Refresh package metadata.
pub fn update<S: Session + ?Sized>(session: &S, manager: PackageManager) -> Result<()> {
    check(session, &update_argv(manager), None)?;
    Ok(())
}
