//! `rtm status` command implementation
//!
//! Polls the replication rules of subscribed datasets (unless `--no-update`
//! is given) and lists the datasets.

use rtm_core::Manager;
use tracing::info;

use super::{print_errors, print_report};
use crate::error::Result;

pub async fn run(manager: &Manager, pattern: &str, update: bool) -> Result<()> {
    if update {
        let sweep = manager.update_status(pattern).await?;
        info!(
            polled = sweep.processed(),
            transferred = sweep.advanced.len(),
            errors = sweep.errored.len(),
            "Status update finished"
        );
        print_errors(&sweep);
    }

    print_report(manager, pattern).await
}
