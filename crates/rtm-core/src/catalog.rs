//! File catalog resolution
//!
//! The catalog is queried with `dasgoclient`. Its JSON output is an array of
//! records, each holding a `file` array:
//!
//! ```json
//! [{"file": [{"name": "/store/...", "adler32": "1a2b3c4d", "size": 1024, "nevents": "52"}]}]
//! ```
//!
//! `size` and `nevents` arrive either as numbers or as numeric strings, and
//! `nevents` may be `null`.

use std::sync::Arc;

use async_trait::async_trait;
use rtm_common::checksum::Adler32;
use serde::{Deserialize, Deserializer};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::models::FileRecord;

/// Source of a dataset's file inventory
#[async_trait]
pub trait CatalogQuery: Send + Sync {
    /// Every file of `dataset`, possibly empty
    async fn query(&self, dataset: &str) -> Result<Vec<FileRecord>>;
}

/// Runs `dasgoclient -json "-query=file dataset=<name>"`
#[derive(Debug, Clone)]
pub struct DasGoClient {
    command: String,
}

impl DasGoClient {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl CatalogQuery for DasGoClient {
    async fn query(&self, dataset: &str) -> Result<Vec<FileRecord>> {
        debug!(dataset = %dataset, command = %self.command, "Querying catalog");

        let output = Command::new(&self.command)
            .arg("-json")
            .arg(format!("-query=file dataset={}", dataset))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EngineError::catalog(dataset, format!("failed to run {}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::catalog(
                dataset,
                format!("{} exited with {}: {}", self.command, output.status, stderr.trim()),
            ));
        }

        parse_catalog_output(dataset, &output.stdout)
    }
}

#[derive(Deserialize)]
struct CatalogEntry {
    #[serde(default)]
    file: Vec<CatalogFile>,
}

#[derive(Deserialize)]
struct CatalogFile {
    name: String,
    adler32: String,
    #[serde(deserialize_with = "number_or_string")]
    size: u64,
    #[serde(default, deserialize_with = "optional_number_or_string")]
    nevents: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

impl NumberOrString {
    fn into_u64<E: serde::de::Error>(self) -> std::result::Result<u64, E> {
        match self {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected an integer, got '{}'", s))),
        }
    }
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    NumberOrString::deserialize(deserializer)?.into_u64()
}

fn optional_number_or_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error> {
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(NumberOrString::into_u64)
        .transpose()
}

/// Flatten raw `dasgoclient -json` output into file records
pub fn parse_catalog_output(dataset: &str, stdout: &[u8]) -> Result<Vec<FileRecord>> {
    let entries: Vec<CatalogEntry> = serde_json::from_slice(stdout)
        .map_err(|e| EngineError::catalog(dataset, format!("malformed catalog output: {}", e)))?;

    entries
        .into_iter()
        .flat_map(|entry| entry.file)
        .map(|file| {
            let checksum: Adler32 = file.adler32.parse().map_err(|e| {
                EngineError::catalog(dataset, format!("bad checksum for {}: {}", file.name, e))
            })?;

            Ok(FileRecord {
                lfn: file.name,
                size: file.size,
                checksum,
                events: file.nevents.unwrap_or(0),
            })
        })
        .collect()
}

/// Resolves dataset names to file inventories under a concurrency ceiling
#[derive(Clone)]
pub struct CatalogResolver {
    query: Arc<dyn CatalogQuery>,
    permits: Arc<Semaphore>,
}

impl CatalogResolver {
    pub fn new(query: Arc<dyn CatalogQuery>, max_concurrent: usize) -> Self {
        Self {
            query,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// File inventory of `dataset`
    ///
    /// A dataset without files is reported as `EmptyDataset`.
    pub async fn resolve(&self, dataset: &str) -> Result<Vec<FileRecord>> {
        let files = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| EngineError::catalog(dataset, e.to_string()))?;
            self.query.query(dataset).await?
        };

        if files.is_empty() {
            return Err(EngineError::EmptyDataset(dataset.to_string()));
        }

        info!(dataset = %dataset, files = files.len(), "Resolved dataset");
        Ok(files)
    }
}
