//! `rtm verify` command implementation

use colored::Colorize;
use rtm_core::verifier::{CheckOutcome, FileCheck};
use rtm_core::Manager;
use tracing::info;

use super::print_report;
use crate::error::Result;

/// Verify transferred datasets, list bad files, then list the datasets
pub async fn run(manager: &Manager, pattern: &str) -> Result<()> {
    let sweep = manager.verify(pattern).await?;
    info!(
        verified = sweep.advanced.len(),
        incomplete = sweep.unchanged.len(),
        "Verification finished"
    );

    for check in &sweep.bad_files {
        if let Some(line) = bad_file_line(check) {
            eprintln!("{}", line);
        }
    }

    print_report(manager, pattern).await
}

/// One line describing a file that did not verify
fn bad_file_line(check: &FileCheck) -> Option<String> {
    if let Some(mismatch) = check.as_error() {
        return Some(format!("{} {} ({})", "bad".red().bold(), mismatch, check.url));
    }

    match &check.outcome {
        CheckOutcome::ToolFailed { reason } => {
            Some(format!("{} {} {}", "unchecked".yellow().bold(), check.url, reason))
        },
        CheckOutcome::NoUrl => Some(format!(
            "{} {} has no storage URL",
            "unchecked".yellow().bold(),
            check.lfn
        )),
        _ => None,
    }
}
