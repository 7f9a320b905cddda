//! Compression Streams for Armature
//!
//! This crate provides `CompressionStream` and `DecompressionStream`: a
//! readable/writable stream pair around a gzip, deflate or raw deflate codec.
//! Bytes written to the writable side come out of the readable side
//! compressed (or decompressed), in write order.
//!
//! # Formats
//!
//! | Name          | Framing                                         |
//! |---------------|-------------------------------------------------|
//! | `gzip`        | 10-byte header, deflate payload, CRC-32 + length |
//! | `deflate`     | zlib: 2-byte header, deflate payload, Adler-32   |
//! | `deflate-raw` | bare deflate payload                            |
//!
//! Format names are matched exactly; anything else fails at construction
//! with [`CompressionError::InvalidFormat`].
//!
//! # Example
//!
//! ```rust
//! use armature_compression_streams::CompressionStream;
//!
//! # tokio_test::block_on(async {
//! let stream = CompressionStream::new("gzip").unwrap();
//! let (mut readable, writable) = stream.into_parts();
//!
//! let writer = tokio::spawn(async move {
//!     writable.write("Hello, ").await?;
//!     writable.write("World!").await?;
//!     writable.close().await
//! });
//!
//! let compressed = readable.read_to_end().await.unwrap();
//! writer.await.unwrap().unwrap();
//! assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
//! # });
//! ```
//!
//! # Errors
//!
//! - [`CompressionError::InvalidFormat`] - unknown format, raised by the constructor
//! - [`CompressionError::CorruptInput`] - malformed compressed data, raised by the
//!   readable side of a decompression stream (and by later writes)
//! - [`CompressionError::StreamState`] - reading or writing after close, error or cancel
//!
//! # Global Registration
//!
//! [`global::install_global`] registers both constructors in a process-wide
//! [`global::GlobalScope`] unless they are already defined there.

mod adapter;
mod config;
mod error;
mod format;

pub mod codec;
pub mod global;
pub mod streaming;

pub use adapter::{CompressionStream, DecompressionStream, TransformStream};
pub use codec::{CodecProvider, Flate2Codecs, Transform};
pub use config::{MAX_LEVEL, MIN_LEVEL, StreamConfig};
pub use error::CompressionError;
pub use format::{Direction, Format};
pub use streaming::{CompressionStats, ReadableStream, WritableStream};

/// Result type for compression stream operations
pub type Result<T> = std::result::Result<T, CompressionError>;
