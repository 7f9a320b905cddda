//! Stream configuration

use crate::{CompressionError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::warn;

/// Lowest accepted compression level.
pub const MIN_LEVEL: u32 = 0;
/// Highest accepted compression level.
pub const MAX_LEVEL: u32 = 9;

/// Configuration shared by compression and decompression streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Compression level (0-9). Ignored by decompression streams.
    pub level: u32,
    /// Number of written chunks that may be queued before `write` waits
    pub high_water_mark: usize,
    /// Largest chunk handed out by the readable side
    pub output_chunk_size: usize,
    /// Sync-flush the encoder after this many input bytes (0 = never)
    pub flush_interval: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            level: 6,
            high_water_mark: 16,
            output_chunk_size: 64 * 1024,
            flush_interval: 0,
        }
    }
}

impl StreamConfig {
    /// Create new stream config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set compression level.
    pub fn level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    /// Set the writable side's queue capacity (chunks).
    pub fn high_water_mark(mut self, chunks: usize) -> Self {
        self.high_water_mark = chunks;
        self
    }

    /// Set the maximum size of chunks emitted by the readable side.
    pub fn output_chunk_size(mut self, size: usize) -> Self {
        self.output_chunk_size = size;
        self
    }

    /// Set flush interval (bytes).
    pub fn flush_interval(mut self, interval: usize) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Create config optimized for low latency streaming.
    pub fn low_latency() -> Self {
        Self {
            level: 1,
            high_water_mark: 4,
            output_chunk_size: 4096,
            flush_interval: 256,
        }
    }

    /// Create config optimized for high compression ratio.
    pub fn high_compression() -> Self {
        Self {
            level: 9,
            high_water_mark: 32,
            output_chunk_size: 256 * 1024,
            flush_interval: 0,
        }
    }

    /// Load configuration from `ARMATURE_COMPRESSION_*` environment variables.
    ///
    /// - `ARMATURE_COMPRESSION_LEVEL`
    /// - `ARMATURE_COMPRESSION_HIGH_WATER_MARK`
    /// - `ARMATURE_COMPRESSION_CHUNK_SIZE`
    /// - `ARMATURE_COMPRESSION_FLUSH_INTERVAL`
    ///
    /// Missing or unparseable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, keyed by the
    /// `ARMATURE_COMPRESSION_*` variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            level: parse_or(&lookup, "ARMATURE_COMPRESSION_LEVEL", defaults.level),
            high_water_mark: parse_or(
                &lookup,
                "ARMATURE_COMPRESSION_HIGH_WATER_MARK",
                defaults.high_water_mark,
            ),
            output_chunk_size: parse_or(
                &lookup,
                "ARMATURE_COMPRESSION_CHUNK_SIZE",
                defaults.output_chunk_size,
            ),
            flush_interval: parse_or(
                &lookup,
                "ARMATURE_COMPRESSION_FLUSH_INTERVAL",
                defaults.flush_interval,
            ),
        }
    }

    /// Check that the configuration can build a stream.
    pub fn validate(&self) -> Result<()> {
        if self.level > MAX_LEVEL {
            return Err(CompressionError::InvalidLevel(self.level, MIN_LEVEL, MAX_LEVEL));
        }
        if self.high_water_mark == 0 {
            return Err(CompressionError::Config(
                "high_water_mark must be at least 1".to_string(),
            ));
        }
        if self.output_chunk_size == 0 {
            return Err(CompressionError::Config(
                "output_chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T: FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring unparseable compression setting");
            default
        }),
        None => default,
    }
}
