//! RTM Core
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Dataset lifecycle engine of the Rucio Transfer Manager.
//!
//! A dataset is registered from the file catalog, subscribed to a site with
//! a Rucio replication rule, polled until every replica lock is satisfied,
//! and finally verified file by file against the catalog checksums:
//!
//! ```text
//! new -> subscribed -> transferred -> done
//! ```
//!
//! Any state can fall into `error`.
//!
//! # Example
//!
//! ```no_run
//! use rtm_core::{Config, Manager};
//!
//! # async fn run() -> rtm_core::Result<()> {
//! let config = Config::load(&Config::default_path())?;
//! let manager = Manager::connect(&config).await?;
//!
//! manager.ingest(&["/DoubleMuon/Run2016G-UL2016_MiniAODv2-v1/MINIAOD".to_string()], "T2_CH_CERN").await?;
//! manager.subscribe("*Run2016G*").await?;
//! println!("{}", manager.report("").await?);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod models;
pub mod replication;
pub mod report;
pub mod repository;
pub mod verifier;

pub use config::Config;
pub use error::{EngineError, Result};
pub use lifecycle::{DatasetStatus, Event};
pub use manager::{IngestReport, Manager, SweepReport};
pub use models::{Dataset, File, FileRecord};
pub use report::{Report, Summary};
pub use repository::Repository;
