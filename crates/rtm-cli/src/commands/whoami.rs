//! `rtm whoami` command implementation

use rtm_core::Manager;

use crate::error::Result;

/// Show the Rucio account the client authenticates as
pub async fn run(manager: &Manager) -> Result<()> {
    let account = manager.whoami().await?;
    println!("{}", account);
    Ok(())
}
