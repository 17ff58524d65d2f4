//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function. Commands that
//! change dataset state finish by printing the dataset listing.

pub mod define;
pub mod delete;
pub mod status;
pub mod subscribe;
pub mod summary;
pub mod verify;
pub mod whoami;

use rtm_core::{Manager, SweepReport};

use crate::error::Result;
use colored::Colorize;

/// Print the datasets matching `pattern` with a grand total
pub(crate) async fn print_report(manager: &Manager, pattern: &str) -> Result<()> {
    let report = manager.report(pattern).await?;
    println!("{}", report);
    Ok(())
}

/// Print the datasets a sweep moved to `error`
pub(crate) fn print_errors(sweep: &SweepReport) {
    for failed in &sweep.errored {
        eprintln!("{} {}: {}", "error".red().bold(), failed.name, failed.reason);
    }
}
