//! Dataset and file records

use rtm_common::checksum::Adler32;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::lifecycle::{DatasetStatus, Event};

/// Aggregate replica lock counts of a replication rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockCounts {
    pub ok: u64,
    pub replicating: u64,
    pub stuck: u64,
}

impl LockCounts {
    pub fn total(&self) -> u64 {
        self.ok + self.replicating + self.stuck
    }
}

/// A dataset as stored in the `datasets` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataset {
    pub id: i64,
    pub name: String,
    pub site: String,
    pub status: DatasetStatus,
    pub subscription: Option<String>,
    pub locks: LockCounts,
}

impl Dataset {
    /// Fire `subscribe` and attach the replication rule id
    pub fn subscribe(&mut self, rule_id: impl Into<String>) -> Result<()> {
        self.status = self.status.fire(Event::Subscribe)?;
        self.subscription = Some(rule_id.into());
        Ok(())
    }

    pub fn mark_transferred(&mut self) -> Result<()> {
        self.status = self.status.fire(Event::Transferred)?;
        Ok(())
    }

    pub fn mark_verified(&mut self) -> Result<()> {
        self.status = self.status.fire(Event::Verified)?;
        Ok(())
    }

    pub fn mark_error(&mut self) -> Result<()> {
        self.status = self.status.fire(Event::Error)?;
        Ok(())
    }

    /// Check the record invariants before it is written
    pub fn validate(&self) -> Result<()> {
        if self.status.requires_subscription() && self.subscription.is_none() {
            return Err(EngineError::CorruptRecord(format!(
                "dataset '{}' is {} without a subscription",
                self.name, self.status
            )));
        }
        Ok(())
    }
}

/// One file entry as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub lfn: String,
    pub size: u64,
    pub checksum: Adler32,
    pub events: u64,
}

/// A file as stored in the `files` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct File {
    pub id: i64,
    pub dataset_id: i64,
    pub lfn: String,
    pub size: u64,
    pub checksum: Adler32,
    pub events: u64,
}

/// A fully resolved dataset waiting to be committed
#[derive(Debug, Clone)]
pub struct NewDataset {
    pub name: String,
    pub site: String,
    pub status: DatasetStatus,
    pub subscription: Option<String>,
    pub locks: LockCounts,
    pub files: Vec<FileRecord>,
}

impl NewDataset {
    pub fn new(name: impl Into<String>, site: impl Into<String>, files: Vec<FileRecord>) -> Self {
        Self {
            name: name.into(),
            site: site.into(),
            status: DatasetStatus::New,
            subscription: None,
            locks: LockCounts::default(),
            files,
        }
    }

    /// Adopt a replication rule that already exists for this dataset and site
    pub fn adopt_rule(&mut self, rule_id: impl Into<String>, locks: LockCounts) -> Result<()> {
        self.status = self.status.fire(Event::Subscribe)?;
        self.subscription = Some(rule_id.into());
        self.locks = locks;
        Ok(())
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}
