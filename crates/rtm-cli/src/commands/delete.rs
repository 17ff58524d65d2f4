//! `rtm delete` command implementation

use tracing::warn;

/// Deleting subscriptions is not supported yet
pub fn run() {
    warn!("Not implemented yet");
}
