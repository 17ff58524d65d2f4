//! RTM Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Rucio Transfer Manager.
//!
//! # Overview
//!
//! This crate provides common functionality used across the RTM workspace members:
//!
//! - **Error Handling**: Common error type and result alias
//! - **Checksums**: Adler-32 values as reported by the catalog and `xrdadler32`
//! - **Logging**: Centralized `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use rtm_common::checksum::Adler32;
//! use rtm_common::Result;
//!
//! fn expected_checksum(hex: &str) -> Result<u32> {
//!     let checksum: Adler32 = hex.parse()?;
//!     Ok(checksum.value())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, RtmError};
