//! Sequential per-host execution with failure isolation.

use anyhow::Result;
use colored::Colorize;
use hosts::Host;
use remote::{Connector, HostTarget};
use thiserror::Error;

use crate::ui;

/// What a batch does when some hosts fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Return the partial outcome
    BestEffort,
    /// Fail the batch after every host was attempted
    AllOrFail,
}

/// Outcome for one host.
#[derive(Debug)]
pub enum HostOutcome<T> {
    Succeeded(T),
    Failed(String),
}

/// Per-host outcomes, in input order.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub results: Vec<(String, HostOutcome<T>)>,
}

impl<T> BatchOutcome<T> {
    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &T)> {
        self.results.iter().filter_map(|(host, outcome)| match outcome {
            HostOutcome::Succeeded(value) => Some((host.as_str(), value)),
            HostOutcome::Failed(_) => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results.iter().filter_map(|(host, outcome)| match outcome {
            HostOutcome::Failed(reason) => Some((host.as_str(), reason.as_str())),
            HostOutcome::Succeeded(_) => None,
        })
    }

    pub fn failed_hosts(&self) -> Vec<String> {
        self.failed().map(|(host, _)| host.to_string()).collect()
    }

    pub fn is_ok(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// An all-or-fail batch had failures.
#[derive(Debug, Error)]
#[error("Failed to {action} {} ({})", ui::plural(*count, "host"), hosts.join(", "))]
pub struct BatchFailed {
    pub action: String,
    pub count: usize,
    pub hosts: Vec<String>,
}

/// Run `op` on each host in order.
///
/// Resolution, connection and operation failures are logged with the host
/// and recorded; the next host is attempted regardless. Each connection is
/// released before the next host is opened.
pub fn run_on_hosts<C, T, F>(
    connector: &C,
    targets: &[HostTarget],
    action: &str,
    policy: Policy,
    mut op: F,
) -> std::result::Result<BatchOutcome<T>, BatchFailed>
where
    C: Connector + ?Sized,
    F: FnMut(&Host) -> Result<T>,
{
    let mut results = Vec::with_capacity(targets.len());

    for target in targets {
        log::debug!("{}: detecting platform ...", target.host);
        let outcome = match hosts::get(connector, target) {
            Ok(host) => {
                let outcome = op(&host);
                if let Err(e) = host.release() {
                    log::warn!("{}: failed to release connection: {e}", target.host);
                }
                outcome
            }
            Err(e) => Err(e.into()),
        };

        let outcome = match outcome {
            Ok(value) => HostOutcome::Succeeded(value),
            Err(e) => {
                let reason = format!("{e:#}");
                log::error!("{}: failed to {action}: {reason}", target.host);
                HostOutcome::Failed(reason)
            }
        };
        results.push((target.host.clone(), outcome));
    }

    let outcome = BatchOutcome { results };
    if policy == Policy::AllOrFail && !outcome.is_ok() {
        let hosts = outcome.failed_hosts();
        return Err(BatchFailed {
            action: action.to_string(),
            count: hosts.len(),
            hosts,
        });
    }
    Ok(outcome)
}

/// Print a per-host summary of a batch.
pub fn print_summary<T>(action: &str, outcome: &BatchOutcome<T>) {
    println!();
    let failed = outcome.failed_hosts().len();
    let total = outcome.results.len();
    if failed == 0 {
        println!(
            "  {} {} on {}",
            "✓".green().bold(),
            action,
            ui::plural(total, "host")
        );
    } else {
        println!(
            "  {} {} with errors on {} of {}",
            "⚠".yellow().bold(),
            action,
            failed,
            ui::plural(total, "host")
        );
    }
    for (host, outcome) in &outcome.results {
        match outcome {
            HostOutcome::Succeeded(_) => println!("    {} {}", "•".green(), host),
            HostOutcome::Failed(reason) => {
                println!("    {} {}: {}", "•".red(), host, reason.dimmed());
            }
        }
    }
}
