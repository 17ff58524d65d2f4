//! VOMS proxy check
//!
//! Every command that talks to the grid needs a proxy with enough lifetime
//! left. `voms-proxy-info -timeleft` reports the remaining seconds; when it
//! is below `min_timeleft` (or the tool fails) a new proxy is requested with
//! `voms-proxy-init`.

use std::process::Command;

use rtm_core::config::VomsProxyConfig;
use tracing::{debug, info};

use crate::error::{CliError, Result};

pub const VOMS_PROXY_INFO: &str = "voms-proxy-info";
pub const VOMS_PROXY_INIT: &str = "voms-proxy-init";

/// Seconds of proxy lifetime left, 0 if unknown
pub fn timeleft(info_command: &str) -> u64 {
    match Command::new(info_command).arg("-timeleft").output() {
        Ok(output) if output.status.success() => parse_timeleft(&String::from_utf8_lossy(&output.stdout)),
        Ok(output) => {
            debug!(status = %output.status, "{} failed", info_command);
            0
        },
        Err(e) => {
            debug!(error = %e, "Failed to run {}", info_command);
            0
        },
    }
}

fn parse_timeleft(stdout: &str) -> u64 {
    stdout.trim().parse().unwrap_or(0)
}

/// Make sure a proxy with at least `min_timeleft` seconds exists
pub fn ensure_proxy(config: &VomsProxyConfig) -> Result<()> {
    ensure_proxy_with(config, VOMS_PROXY_INFO, VOMS_PROXY_INIT)
}

pub fn ensure_proxy_with(config: &VomsProxyConfig, info_command: &str, init_command: &str) -> Result<()> {
    let left = timeleft(info_command);
    if left >= config.min_timeleft {
        debug!(timeleft = left, "Proxy is valid");
        return Ok(());
    }

    info!(timeleft = left, min_timeleft = config.min_timeleft, "Renewing proxy");
    let status = Command::new(init_command)
        .args(&config.voms_proxy_args)
        .status()
        .map_err(|e| CliError::proxy(format!("failed to run {}: {}", init_command, e)))?;

    if !status.success() {
        return Err(CliError::proxy(format!("{} exited with {}", init_command, status)));
    }

    Ok(())
}
