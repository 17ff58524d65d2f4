//! Adler-32 checksum values
//!
//! The file catalog reports checksums as hexadecimal strings and `xrdadler32`
//! prints them as the leading token of its output. Both are normalised into
//! [`Adler32`] so they can be compared as integers.

use crate::error::{Result, RtmError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 32-bit Adler checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Adler32(u32);

impl Adler32 {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Parse the leading hexadecimal token of a checksum tool's stdout
    ///
    /// `xrdadler32` prints `<checksum> <url>`; anything after the first
    /// whitespace-separated token is ignored.
    pub fn from_tool_output(stdout: &str) -> Result<Self> {
        let token = stdout
            .split_whitespace()
            .next()
            .ok_or_else(|| RtmError::InvalidChecksum(String::new()))?;
        token.parse()
    }
}

impl FromStr for Adler32 {
    type Err = RtmError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() || digits.len() > 8 {
            return Err(RtmError::InvalidChecksum(s.to_string()));
        }

        u32::from_str_radix(digits, 16)
            .map(Adler32)
            .map_err(|_| RtmError::InvalidChecksum(s.to_string()))
    }
}

impl fmt::Display for Adler32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl Serialize for Adler32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Adler32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl From<u32> for Adler32 {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
