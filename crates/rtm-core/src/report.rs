//! Dataset listings and status summaries
//!
//! Both are read-only views built from the repository. Their `Display`
//! implementations produce the fixed-width text printed by the CLI.

use std::fmt;

use serde::Serialize;

use crate::lifecycle::DatasetStatus;
use crate::models::Dataset;

/// One dataset with its aggregate file usage
#[derive(Debug, Clone, Serialize)]
pub struct DatasetUsage {
    pub dataset: Dataset,
    pub total_size: u64,
    pub file_count: u64,
}

/// Dataset listing with a grand total
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub rows: Vec<DatasetUsage>,
}

impl Report {
    pub fn total_size(&self) -> u64 {
        self.rows.iter().map(|r| r.total_size).sum()
    }

    pub fn total_files(&self) -> u64 {
        self.rows.iter().map(|r| r.file_count).sum()
    }
}

impl fmt::Display for DatasetUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ds = &self.dataset;
        let status: String = ds.status.as_str().chars().take(4).collect();
        write!(
            f,
            "{:>11} {:6} [{:4}/{:4}/{:4}] {:4} {} {} {}",
            human_readable_size(self.total_size),
            self.file_count,
            ds.locks.ok,
            ds.locks.replicating,
            ds.locks.stuck,
            status,
            ds.site,
            ds.name,
            ds.subscription.as_deref().unwrap_or("-"),
        )
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            writeln!(f, "{}", row)?;
        }
        write!(
            f,
            "{:>11} {:6} Total",
            human_readable_size(self.total_size()),
            self.total_files()
        )
    }
}

/// Dataset count, file count and bytes for one status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusTotals {
    pub status: DatasetStatus,
    pub datasets: u64,
    pub files: u64,
    pub total_size: u64,
}

/// Per-status totals, in lifecycle order
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub by_status: Vec<StatusTotals>,
}

impl Summary {
    /// Order the rows by lifecycle position and fill in missing states with zeros
    pub fn from_totals(totals: Vec<StatusTotals>) -> Self {
        let by_status = DatasetStatus::ALL
            .iter()
            .map(|status| {
                totals
                    .iter()
                    .find(|t| t.status == *status)
                    .copied()
                    .unwrap_or(StatusTotals {
                        status: *status,
                        datasets: 0,
                        files: 0,
                        total_size: 0,
                    })
            })
            .collect();

        Self { by_status }
    }

    pub fn datasets(&self) -> u64 {
        self.by_status.iter().map(|t| t.datasets).sum()
    }

    pub fn files(&self) -> u64 {
        self.by_status.iter().map(|t| t.files).sum()
    }

    pub fn total_size(&self) -> u64 {
        self.by_status.iter().map(|t| t.total_size).sum()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.by_status {
            writeln!(
                f,
                "{:<12} {:6} datasets {:8} files {:>11}",
                t.status.as_str(),
                t.datasets,
                t.files,
                human_readable_size(t.total_size)
            )?;
        }
        write!(
            f,
            "{:<12} {:6} datasets {:8} files {:>11}",
            "total",
            self.datasets(),
            self.files(),
            human_readable_size(self.total_size())
        )
    }
}

/// Format a byte count with binary units and two decimals
pub fn human_readable_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}
