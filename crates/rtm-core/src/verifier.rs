//! Checksum verification of transferred files
//!
//! Each file is fetched by `xrdadler32` from the open-data storage endpoint
//! and its Adler-32 compared with the catalog value. Tool failures are
//! reported as outcomes, never as errors, so a sweep over a dataset always
//! visits every file.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use rtm_common::checksum::Adler32;
use serde::Serialize;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::error::{EngineError, Result};
use crate::models::File;

/// Number of leading LFN characters replaced by the storage prefix (`/store/data/`, `/store/mc/`)
const LFN_STRIP: usize = 12;

/// Computes the checksum of a remote file
#[async_trait]
pub trait ChecksumTool: Send + Sync {
    async fn checksum(&self, url: &str) -> Result<Adler32>;
}

/// Runs `xrdadler32 <url>` and reads the leading hex token of stdout
#[derive(Debug, Clone)]
pub struct XrdAdler32 {
    command: String,
}

impl XrdAdler32 {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl ChecksumTool for XrdAdler32 {
    async fn checksum(&self, url: &str) -> Result<Adler32> {
        let output = Command::new(&self.command)
            .arg(url)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(EngineError::Io(std::io::Error::other(format!(
                "{} exited with {}",
                self.command, output.status
            ))));
        }

        Ok(Adler32::from_tool_output(&String::from_utf8_lossy(&output.stdout))?)
    }
}

/// Storage URL of a file
///
/// The first twelve bytes of the LFN are dropped. LFNs containing `marker`
/// live directly under `prefix`, all others under `prefix/mc`. `None` when
/// nothing is left after the strip or byte twelve splits a character.
pub fn retrieval_url(lfn: &str, prefix: &str, marker: &str) -> Option<String> {
    let rest = lfn.get(LFN_STRIP..).filter(|rest| !rest.is_empty())?;
    let prefix = prefix.trim_end_matches('/');

    if lfn.contains(marker) {
        Some(format!("{}/{}", prefix, rest))
    } else {
        Some(format!("{}/mc/{}", prefix, rest))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutcome {
    Match,
    Mismatch { actual: Adler32 },
    ToolFailed { reason: String },
    /// The LFN does not map to a storage URL; the tool was not run
    NoUrl,
}

/// Result of checking one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileCheck {
    pub lfn: String,
    pub url: String,
    pub expected: Adler32,
    pub outcome: CheckOutcome,
}

impl FileCheck {
    pub fn is_match(&self) -> bool {
        self.outcome == CheckOutcome::Match
    }

    /// Mismatch as an error value, for reporting
    pub fn as_error(&self) -> Option<EngineError> {
        match &self.outcome {
            CheckOutcome::Mismatch { actual } => Some(EngineError::ChecksumMismatch {
                lfn: self.lfn.clone(),
                expected: self.expected.to_string(),
                actual: actual.to_string(),
            }),
            _ => None,
        }
    }
}

/// Checks files against their catalog checksums under a concurrency ceiling
#[derive(Clone)]
pub struct ChecksumVerifier {
    tool: Arc<dyn ChecksumTool>,
    permits: Arc<Semaphore>,
    url_prefix: String,
    data_marker: String,
}

impl ChecksumVerifier {
    pub fn new(
        tool: Arc<dyn ChecksumTool>,
        max_concurrent: usize,
        url_prefix: impl Into<String>,
        data_marker: impl Into<String>,
    ) -> Self {
        Self {
            tool,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            url_prefix: url_prefix.into(),
            data_marker: data_marker.into(),
        }
    }

    pub fn url_for(&self, lfn: &str) -> Option<String> {
        retrieval_url(lfn, &self.url_prefix, &self.data_marker)
    }

    pub async fn check(&self, lfn: &str, expected: Adler32) -> FileCheck {
        let Some(url) = self.url_for(lfn) else {
            error!(lfn = %lfn, "Cannot derive a storage URL from LFN");
            return FileCheck {
                lfn: lfn.to_string(),
                url: String::new(),
                expected,
                outcome: CheckOutcome::NoUrl,
            };
        };
        debug!(lfn = %lfn, url = %url, "Verifying checksum");

        let computed = match self.permits.acquire().await {
            Ok(_permit) => self.tool.checksum(&url).await,
            Err(e) => Err(EngineError::Io(std::io::Error::other(e.to_string()))),
        };

        let outcome = match computed {
            Ok(actual) if actual == expected => CheckOutcome::Match,
            Ok(actual) => {
                error!(lfn = %lfn, url = %url, expected = %expected, actual = %actual, "Invalid checksum");
                CheckOutcome::Mismatch { actual }
            },
            Err(e) => {
                warn!(lfn = %lfn, url = %url, error = %e, "Checksum tool failed");
                CheckOutcome::ToolFailed { reason: e.to_string() }
            },
        };

        FileCheck {
            lfn: lfn.to_string(),
            url,
            expected,
            outcome,
        }
    }

    /// Whether the computed checksum of `lfn` equals `expected`
    pub async fn verify(&self, lfn: &str, expected: Adler32) -> bool {
        self.check(lfn, expected).await.is_match()
    }

    /// Check every file; all checks run to completion
    pub async fn check_all(&self, files: &[File]) -> Vec<FileCheck> {
        join_all(files.iter().map(|f| self.check(&f.lfn, f.checksum))).await
    }
}
