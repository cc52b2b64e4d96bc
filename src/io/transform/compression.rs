//! Gzip compression.

use crate::{Error, Result};
use flate2::Compression as Level;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::str::FromStr;

/// Default gzip level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Gzip stream magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Payload compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Bytes are delivered as produced.
    #[default]
    None,
    /// Gzip (RFC 1952).
    Gzip,
}

impl Compression {
    /// Returns the compression name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
        }
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "gzip" | "gz" => Ok(Self::Gzip),
            _ => Err(Error::InvalidInput(format!("Unknown compression: {s}"))),
        }
    }
}

/// Checks a gzip level is within 1..=9.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for levels outside the range.
pub fn validate_level(level: u32) -> Result<u32> {
    if (1..=9).contains(&level) {
        Ok(level)
    } else {
        Err(Error::InvalidInput(format!(
            "Compression level must be between 1 and 9, got {level}"
        )))
    }
}

/// Returns whether `data` starts with the gzip magic bytes.
#[must_use]
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

/// Wraps `writer` in a gzip encoder at `level`.
///
/// # Errors
///
/// Returns an error if the level is out of range.
pub fn gzip_writer<W: Write>(writer: W, level: u32) -> Result<GzEncoder<W>> {
    Ok(GzEncoder::new(writer, Level::new(validate_level(level)?)))
}

/// Compresses `data` with gzip.
///
/// # Errors
///
/// Returns an error if the level is out of range or compression fails.
pub fn gzip(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = gzip_writer(Vec::with_capacity(data.len() / 2), level)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompresses a gzip stream.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the data is not a valid gzip stream.
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoded = Vec::with_capacity(data.len().saturating_mul(4));
    GzDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(|e| Error::InvalidInput(format!("Invalid gzip payload: {e}")))?;
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1)]
    #[test_case(6)]
    #[test_case(9)]
    fn test_gzip_roundtrip_at_level(level: u32) {
        let data = "prompt ".repeat(500);
        let compressed = gzip(data.as_bytes(), level).unwrap();
        assert!(is_gzip(&compressed));
        assert!(compressed.len() < data.len());
        assert_eq!(gunzip(&compressed).unwrap(), data.as_bytes());
    }

    #[test_case(0)]
    #[test_case(10)]
    fn test_rejects_out_of_range_level(level: u32) {
        assert!(gzip(b"x", level).is_err());
    }

    #[test]
    fn test_gunzip_rejects_plain_bytes() {
        assert!(gunzip(b"{\"not\":\"gzip\"}").is_err());
    }

    #[test]
    fn test_compression_from_str() {
        assert_eq!("GZIP".parse::<Compression>().unwrap(), Compression::Gzip);
        assert_eq!("none".parse::<Compression>().unwrap(), Compression::None);
        assert!("brotli".parse::<Compression>().is_err());
    }
}
