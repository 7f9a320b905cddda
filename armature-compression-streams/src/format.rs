//! Compression formats accepted by the stream constructors

use crate::{CompressionError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported compression formats.
///
/// Names match exactly: no trimming and no case folding, so `"GZIP"` or
/// `"deflate "` are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    /// zlib-wrapped deflate (2-byte header, Adler-32 trailer)
    Deflate,

    /// Bare deflate stream, no header or trailer
    DeflateRaw,

    /// Gzip member (10-byte header, CRC-32 and length trailer)
    Gzip,
}

impl Format {
    /// Every recognized format.
    pub const ALL: [Format; 3] = [Format::Deflate, Format::DeflateRaw, Format::Gzip];

    /// The literal name of this format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deflate => "deflate",
            Self::DeflateRaw => "deflate-raw",
            Self::Gzip => "gzip",
        }
    }

    /// Parse a dynamically typed format argument.
    ///
    /// Only JSON strings can name a format; numbers, `null`, booleans and
    /// containers fail with [`CompressionError::InvalidFormat`].
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(s) => s.parse(),
            other => Err(CompressionError::invalid_format(other)),
        }
    }
}

impl FromStr for Format {
    type Err = CompressionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| CompressionError::invalid_format(format!("{:?}", s)))
    }
}

impl TryFrom<&serde_json::Value> for Format {
    type Error = CompressionError;

    fn try_from(value: &serde_json::Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way a transform moves bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Plain bytes in, compressed bytes out
    Compress,
    /// Compressed bytes in, plain bytes out
    Decompress,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compress => write!(f, "compress"),
            Self::Decompress => write!(f, "decompress"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_display() {
        assert_eq!(format!("{}", Format::Deflate), "deflate");
        assert_eq!(format!("{}", Format::DeflateRaw), "deflate-raw");
        assert_eq!(format!("{}", Format::Gzip), "gzip");
    }

    #[test]
    fn test_parse_recognized_names() {
        for format in Format::ALL {
            assert_eq!(format.as_str().parse::<Format>().unwrap(), format);
        }
    }

    #[test]
    fn test_parse_is_exact() {
        for bad in ["GZIP", "Gzip", " gzip", "gzip ", "deflate_raw", "raw", "br", ""] {
            let err = bad.parse::<Format>().unwrap_err();
            assert!(err.is_invalid_format(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_from_value_rejects_non_strings() {
        assert_eq!(Format::from_value(&json!("gzip")).unwrap(), Format::Gzip);

        let values = [
            json!(123),
            json!(null),
            json!(true),
            json!(["gzip"]),
            json!({"format": "gzip"}),
        ];
        for value in values {
            let err = Format::from_value(&value).unwrap_err();
            assert!(err.is_invalid_format());
        }

        let err = Format::from_value(&json!(123)).unwrap_err();
        assert!(err.to_string().contains("123"));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_value(Format::DeflateRaw).unwrap(), json!("deflate-raw"));
        let format: Format = serde_json::from_value(json!("deflate")).unwrap();
        assert_eq!(format, Format::Deflate);
        assert!(serde_json::from_value::<Format>(json!("Deflate")).is_err());
    }
}
