//! Dataset lifecycle state machine
//!
//! ```text
//! new --subscribe--> subscribed --transferred--> transferred --verified--> done
//!
//! any state --error--> error
//! ```
//!
//! The machine is pure: [`DatasetStatus::fire`] only computes the next state.
//! Persisting it is the repository's job.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    New,
    Subscribed,
    Transferred,
    Done,
    Error,
}

/// Named lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    /// A replication rule was created
    Subscribe,
    /// The replication service reports every lock as OK
    Transferred,
    /// Every file passed checksum verification
    Verified,
    /// Unrecoverable failure while processing the dataset
    Error,
}

impl DatasetStatus {
    pub const ALL: [DatasetStatus; 5] = [
        DatasetStatus::New,
        DatasetStatus::Subscribed,
        DatasetStatus::Transferred,
        DatasetStatus::Done,
        DatasetStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::New => "new",
            DatasetStatus::Subscribed => "subscribed",
            DatasetStatus::Transferred => "transferred",
            DatasetStatus::Done => "done",
            DatasetStatus::Error => "error",
        }
    }

    /// Target state for `event`, or `InvalidTransition` if the table has no such edge
    pub fn fire(self, event: Event) -> Result<DatasetStatus> {
        use DatasetStatus::*;

        match (self, event) {
            (New, Event::Subscribe) => Ok(Subscribed),
            (Subscribed, Event::Transferred) => Ok(Transferred),
            (Transferred, Event::Verified) => Ok(Done),
            (_, Event::Error) => Ok(Error),
            (from, event) => Err(EngineError::InvalidTransition { from, event }),
        }
    }

    /// Whether a replication rule id must be attached in this state
    pub fn requires_subscription(&self) -> bool {
        matches!(
            self,
            DatasetStatus::Subscribed | DatasetStatus::Transferred | DatasetStatus::Done
        )
    }
}

impl Event {
    pub const ALL: [Event; 4] = [Event::Subscribe, Event::Transferred, Event::Verified, Event::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Subscribe => "subscribe",
            Event::Transferred => "transferred",
            Event::Verified => "verified",
            Event::Error => "error",
        }
    }
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(DatasetStatus::New),
            "subscribed" => Ok(DatasetStatus::Subscribed),
            "transferred" => Ok(DatasetStatus::Transferred),
            "done" => Ok(DatasetStatus::Done),
            "error" => Ok(DatasetStatus::Error),
            other => Err(EngineError::CorruptRecord(format!("unknown dataset status '{}'", other))),
        }
    }
}
