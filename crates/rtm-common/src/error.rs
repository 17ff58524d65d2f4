//! Error types shared by the RTM crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, RtmError>;

/// Common error type
#[derive(Error, Debug)]
pub enum RtmError {
    #[error("Invalid checksum '{0}': expected up to 8 hexadecimal digits")]
    InvalidChecksum(String),
}
