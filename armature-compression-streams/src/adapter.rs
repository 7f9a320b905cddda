//! Compression and decompression stream adapters
//!
//! Each adapter validates its format, asks the codec provider for a fresh
//! transform and connects it to a readable/writable pair. The pair is fixed
//! at construction; both sides are only reachable through accessors.
//!
//! ```rust
//! use armature_compression_streams::{CompressionStream, DecompressionStream};
//!
//! # tokio_test::block_on(async {
//! let mut compress = CompressionStream::new("gzip").unwrap();
//! compress.writable().write("Hello, World!").await.unwrap();
//! compress.writable().close().await.unwrap();
//! let compressed = compress.readable_mut().read_to_end().await.unwrap();
//!
//! let mut decompress = DecompressionStream::new("gzip").unwrap();
//! decompress.writable().write(compressed).await.unwrap();
//! decompress.writable().close().await.unwrap();
//! let plain = decompress.readable_mut().read_to_end().await.unwrap();
//! assert_eq!(plain, "Hello, World!");
//! # });
//! ```

use crate::codec::{CodecProvider, Flate2Codecs};
use crate::streaming::{CompressionStats, ReadableStream, WritableStream, stream_pair};
use crate::{Direction, Format, Result, StreamConfig};
use tracing::debug;

/// A transform connected to its readable and writable sides.
#[derive(Debug)]
pub struct TransformStream {
    direction: Direction,
    format: Format,
    readable: ReadableStream,
    writable: WritableStream,
}

impl TransformStream {
    fn build(
        direction: Direction,
        format: Format,
        provider: &dyn CodecProvider,
        config: &StreamConfig,
    ) -> Result<Self> {
        config.validate()?;
        let transform = provider.transform(direction, format, config)?;
        let (readable, writable) = stream_pair(transform, config);
        debug!(%direction, %format, "created stream pair");

        Ok(Self {
            direction,
            format,
            readable,
            writable,
        })
    }

    /// Whether this stream compresses or decompresses.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Format being produced or consumed.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Output side.
    pub fn readable(&self) -> &ReadableStream {
        &self.readable
    }

    /// Output side, for reading.
    pub fn readable_mut(&mut self) -> &mut ReadableStream {
        &mut self.readable
    }

    /// Input side.
    pub fn writable(&self) -> &WritableStream {
        &self.writable
    }

    /// Split into the two sides, e.g. to drive them from separate tasks.
    pub fn into_parts(self) -> (ReadableStream, WritableStream) {
        (self.readable, self.writable)
    }

    /// Bytes written and read so far.
    pub fn stats(&self) -> CompressionStats {
        self.writable.stats()
    }
}

/// Compresses bytes written to its writable side.
#[derive(Debug)]
pub struct CompressionStream {
    inner: TransformStream,
}

impl CompressionStream {
    /// Create a compression stream for a format name.
    ///
    /// Fails with [`CompressionError::InvalidFormat`](crate::CompressionError::InvalidFormat)
    /// unless `format` is exactly `"deflate"`, `"deflate-raw"` or `"gzip"`.
    pub fn new(format: &str) -> Result<Self> {
        Self::with_config(format.parse()?, &StreamConfig::default())
    }

    /// Create a compression stream from a dynamically typed argument.
    pub fn from_value(format: &serde_json::Value) -> Result<Self> {
        Self::with_config(Format::from_value(format)?, &StreamConfig::default())
    }

    /// Create a compression stream with explicit configuration.
    pub fn with_config(format: Format, config: &StreamConfig) -> Result<Self> {
        Self::with_provider(format, &Flate2Codecs, config)
    }

    /// Create a compression stream backed by a custom codec provider.
    pub fn with_provider(
        format: Format,
        provider: &dyn CodecProvider,
        config: &StreamConfig,
    ) -> Result<Self> {
        TransformStream::build(Direction::Compress, format, provider, config)
            .map(|inner| Self { inner })
    }

    /// Format being produced.
    pub fn format(&self) -> Format {
        self.inner.format()
    }

    /// Compressed output.
    pub fn readable(&self) -> &ReadableStream {
        self.inner.readable()
    }

    /// Compressed output, for reading.
    pub fn readable_mut(&mut self) -> &mut ReadableStream {
        self.inner.readable_mut()
    }

    /// Uncompressed input.
    pub fn writable(&self) -> &WritableStream {
        self.inner.writable()
    }

    /// Split into the two sides.
    pub fn into_parts(self) -> (ReadableStream, WritableStream) {
        self.inner.into_parts()
    }

    /// Bytes written and read so far.
    pub fn stats(&self) -> CompressionStats {
        self.inner.stats()
    }
}

impl From<CompressionStream> for TransformStream {
    fn from(stream: CompressionStream) -> Self {
        stream.inner
    }
}

/// Decompresses bytes written to its writable side.
///
/// Input that is not a valid stream in the declared format surfaces as
/// [`CompressionError::CorruptInput`](crate::CompressionError::CorruptInput)
/// from the readable side, and from later writes.
#[derive(Debug)]
pub struct DecompressionStream {
    inner: TransformStream,
}

impl DecompressionStream {
    /// Create a decompression stream for a format name.
    pub fn new(format: &str) -> Result<Self> {
        Self::with_config(format.parse()?, &StreamConfig::default())
    }

    /// Create a decompression stream from a dynamically typed argument.
    pub fn from_value(format: &serde_json::Value) -> Result<Self> {
        Self::with_config(Format::from_value(format)?, &StreamConfig::default())
    }

    /// Create a decompression stream with explicit configuration.
    pub fn with_config(format: Format, config: &StreamConfig) -> Result<Self> {
        Self::with_provider(format, &Flate2Codecs, config)
    }

    /// Create a decompression stream backed by a custom codec provider.
    pub fn with_provider(
        format: Format,
        provider: &dyn CodecProvider,
        config: &StreamConfig,
    ) -> Result<Self> {
        TransformStream::build(Direction::Decompress, format, provider, config)
            .map(|inner| Self { inner })
    }

    /// Format being consumed.
    pub fn format(&self) -> Format {
        self.inner.format()
    }

    /// Decompressed output.
    pub fn readable(&self) -> &ReadableStream {
        self.inner.readable()
    }

    /// Decompressed output, for reading.
    pub fn readable_mut(&mut self) -> &mut ReadableStream {
        self.inner.readable_mut()
    }

    /// Compressed input.
    pub fn writable(&self) -> &WritableStream {
        self.inner.writable()
    }

    /// Split into the two sides.
    pub fn into_parts(self) -> (ReadableStream, WritableStream) {
        self.inner.into_parts()
    }

    /// Bytes written and read so far.
    pub fn stats(&self) -> CompressionStats {
        self.inner.stats()
    }
}

impl From<DecompressionStream> for TransformStream {
    fn from(stream: DecompressionStream) -> Self {
        stream.inner
    }
}
