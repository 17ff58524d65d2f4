//! `rtm summary` command implementation
//!
//! Shows dataset count, file count and volume per lifecycle state.

use colored::Colorize;
use rtm_core::Manager;

use crate::error::Result;

pub async fn run(manager: &Manager) -> Result<()> {
    let summary = manager.summary().await?;

    if summary.datasets() == 0 {
        println!("No datasets defined.");
        println!("Run 'rtm define' to add datasets.");
        return Ok(());
    }

    println!("{}", "Summary:".cyan().bold());
    println!("{}", summary);
    Ok(())
}
