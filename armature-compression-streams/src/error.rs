//! Error types for compression streams

use crate::Format;
use thiserror::Error;

/// Errors that can occur while constructing or driving a compression stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompressionError {
    /// The requested format is not one of `deflate`, `deflate-raw` or `gzip`
    #[error("Invalid compression format: {value} (expected one of: {accepted})")]
    InvalidFormat {
        /// The offending value, rendered for display
        value: String,
        /// The accepted format names
        accepted: &'static str,
    },

    /// Compressed input is not a valid stream in the declared format
    #[error("Corrupt {format} input: {message}")]
    CorruptInput {
        /// Format the input was declared as
        format: Format,
        /// What the decoder rejected
        message: String,
    },

    /// Operation attempted on a stream that is closed, errored or cancelled
    #[error("Invalid stream state: {0}")]
    StreamState(String),

    /// The writable side was aborted by the caller
    #[error("Stream aborted: {0}")]
    Aborted(String),

    /// Compression operation failed
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    /// Invalid compression level
    #[error("Invalid compression level: {0} (must be between {1} and {2})")]
    InvalidLevel(u32, u32, u32),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CompressionError {
    pub(crate) fn invalid_format(value: impl std::fmt::Display) -> Self {
        Self::InvalidFormat {
            value: value.to_string(),
            accepted: "deflate, deflate-raw, gzip",
        }
    }

    pub(crate) fn corrupt(format: Format, message: impl Into<String>) -> Self {
        Self::CorruptInput {
            format,
            message: message.into(),
        }
    }

    /// Returns true for construction-time format errors.
    pub fn is_invalid_format(&self) -> bool {
        matches!(self, Self::InvalidFormat { .. })
    }

    /// Returns true when the decoder rejected its input.
    pub fn is_corrupt_input(&self) -> bool {
        matches!(self, Self::CorruptInput { .. })
    }

    /// Returns true for stream lifecycle violations.
    pub fn is_stream_state(&self) -> bool {
        matches!(self, Self::StreamState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_format_message_names_value_and_alternatives() {
        let err = CompressionError::invalid_format("\"brotli\"");
        let msg = err.to_string();
        assert!(msg.contains("\"brotli\""));
        assert!(msg.contains("deflate, deflate-raw, gzip"));
        assert!(err.is_invalid_format());
        assert!(!err.is_corrupt_input());
    }

    #[test]
    fn test_corrupt_input_display() {
        let err = CompressionError::corrupt(Format::Gzip, "invalid gzip header");
        assert_eq!(err.to_string(), "Corrupt gzip input: invalid gzip header");
        assert!(err.is_corrupt_input());
    }
}
