//! `rtm subscribe` command implementation

use rtm_core::Manager;
use tracing::info;

use super::{print_errors, print_report};
use crate::error::Result;

/// Create replication rules for new datasets, then list them
pub async fn run(manager: &Manager, pattern: &str) -> Result<()> {
    let sweep = manager.subscribe(pattern).await?;
    info!(
        subscribed = sweep.advanced.len(),
        errors = sweep.errored.len(),
        "Subscription finished"
    );
    print_errors(&sweep);

    print_report(manager, pattern).await
}
