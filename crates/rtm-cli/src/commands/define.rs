//! `rtm define` command implementation
//!
//! Registers datasets from the command line or from a YAML list:
//!
//! ```yaml
//! site: T2_CH_CERN
//! datasets:
//!   - /DoubleMuon/Run2016G-UL2016_MiniAODv2-v1/MINIAOD
//!   - /DoubleMuon/Run2016H-UL2016_MiniAODv2-v1/MINIAOD
//! ```

use std::path::{Path, PathBuf};

use colored::Colorize;
use rtm_core::Manager;
use serde::Deserialize;

use crate::error::{CliError, Result};

/// Contents of a `--file` dataset list
#[derive(Debug, Deserialize)]
pub struct DatasetList {
    pub datasets: Vec<String>,
    pub site: String,
}

impl DatasetList {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

/// Resolve the datasets and site from arguments or a YAML file
pub fn request(datasets: &[String], site: Option<&str>, file: Option<&PathBuf>) -> Result<DatasetList> {
    if let Some(path) = file {
        return DatasetList::load(path);
    }

    let site = site.ok_or_else(|| CliError::invalid_arguments("--site is required unless --file is given"))?;
    Ok(DatasetList {
        datasets: datasets.to_vec(),
        site: site.to_string(),
    })
}

pub async fn run(manager: &Manager, request: DatasetList) -> Result<()> {
    if request.datasets.is_empty() {
        println!("No datasets given.");
        return Ok(());
    }

    let report = manager.ingest(&request.datasets, &request.site).await?;

    for name in &report.created {
        println!("{} {}", "created".green(), name);
    }
    for name in &report.already_subscribed {
        println!("{} {}", "subscribed".cyan(), name);
    }
    for name in &report.skipped {
        println!("{} {}", "exists".dimmed(), name);
    }
    for failed in &report.failed {
        eprintln!("{} {}: {}", "failed".red().bold(), failed.name, failed.reason);
    }

    println!(
        "{} defined, {} skipped, {} failed",
        report.stored(),
        report.skipped.len(),
        report.failed.len()
    );

    Ok(())
}
