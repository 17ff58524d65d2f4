//! Error types for the dataset lifecycle engine

use crate::lifecycle::{DatasetStatus, Event};
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the engine
///
/// Catalog failures and replication service answers are per-dataset: the
/// manager catches them at the dataset boundary. An unreachable replication
/// service, persistence failures and lifecycle violations abort the running
/// operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The file catalog process failed or produced unusable output
    #[error("Catalog query for '{dataset}' failed: {reason}")]
    CatalogUnavailable { dataset: String, reason: String },

    /// The catalog knows the dataset but lists no files for it
    #[error("Catalog returned no files for '{0}'")]
    EmptyDataset(String),

    /// The replication service refused to create a rule
    #[error("Replication rule for '{dataset}' rejected: {reason}")]
    ReplicationRejected { dataset: String, reason: String },

    /// The replication service answered a query or listing with an error
    #[error("Replication service error: {0}")]
    Replication(String),

    /// The replication service could not be reached or refused our credentials
    #[error("Replication service unavailable: {0}")]
    ReplicationUnavailable(String),

    /// Computed checksum differs from the catalog value
    #[error("Checksum mismatch for '{lfn}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        lfn: String,
        expected: String,
        actual: String,
    },

    #[error("Persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A transition outside the lifecycle table was attempted
    #[error("Invalid transition '{event}' from state '{from}'")]
    InvalidTransition { from: DatasetStatus, event: Event },

    /// The stored row changed state between load and commit
    #[error("Dataset '{0}' was modified concurrently")]
    StaleState(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] rtm_common::RtmError),
}

impl EngineError {
    pub fn catalog(dataset: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CatalogUnavailable {
            dataset: dataset.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected(dataset: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ReplicationRejected {
            dataset: dataset.into(),
            reason: reason.into(),
        }
    }

    pub fn replication(msg: impl Into<String>) -> Self {
        Self::Replication(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ReplicationUnavailable(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error only concerns the dataset being processed
    ///
    /// Connectivity, credential, store, schema and lifecycle errors are fatal
    /// for the whole operation.
    pub fn is_per_dataset(&self) -> bool {
        matches!(
            self,
            Self::CatalogUnavailable { .. }
                | Self::EmptyDataset(_)
                | Self::ReplicationRejected { .. }
                | Self::Replication(_)
                | Self::ChecksumMismatch { .. }
        )
    }
}
