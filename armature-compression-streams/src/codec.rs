//! Codec provider - push-style transforms backed by flate2
//!
//! A [`Transform`] accepts input chunks and returns whatever output the codec
//! has produced so far; [`Transform::finish`] flushes the remainder (gzip and
//! zlib trailers on the way out, end-of-stream validation on the way in).
//!
//! ```rust
//! use armature_compression_streams::{
//!     CodecProvider, Flate2Codecs, Format, StreamConfig, Transform,
//! };
//!
//! let config = StreamConfig::default();
//! let mut encoder = Flate2Codecs.compressor(Format::Gzip, &config).unwrap();
//! let mut compressed = encoder.push(b"Hello, World!").unwrap().to_vec();
//! compressed.extend_from_slice(&encoder.finish().unwrap());
//!
//! let mut decoder = Flate2Codecs.decompressor(Format::Gzip, &config).unwrap();
//! let mut plain = decoder.push(&compressed).unwrap().to_vec();
//! plain.extend_from_slice(&decoder.finish().unwrap());
//! assert_eq!(plain, b"Hello, World!");
//! ```

use crate::{CompressionError, Direction, Format, Result, StreamConfig};
use bytes::Bytes;
use flate2::write::{DeflateEncoder, GzDecoder, GzEncoder, ZlibEncoder};
use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::{self, Write};

/// Spare output capacity kept available for each inflate call.
const INFLATE_CHUNK: usize = 32 * 1024;

const TRAILING_DATA: &str = "trailing data after end of stream";

/// A push-style byte transform owned by exactly one stream.
pub trait Transform: Send {
    /// Format this transform reads or writes.
    fn format(&self) -> Format;

    /// Feed one input chunk and collect the output produced so far.
    ///
    /// May return an empty buffer while the codec is still accumulating.
    fn push(&mut self, input: &[u8]) -> Result<Bytes>;

    /// Signal end of input and collect the final output.
    fn finish(&mut self) -> Result<Bytes>;
}

/// Supplies transforms for each supported format.
pub trait CodecProvider: Send + Sync {
    /// Create a compressing transform.
    fn compressor(&self, format: Format, config: &StreamConfig) -> Result<Box<dyn Transform>>;

    /// Create a decompressing transform.
    fn decompressor(&self, format: Format, config: &StreamConfig) -> Result<Box<dyn Transform>>;

    /// Create a transform for the given direction.
    fn transform(
        &self,
        direction: Direction,
        format: Format,
        config: &StreamConfig,
    ) -> Result<Box<dyn Transform>> {
        match direction {
            Direction::Compress => self.compressor(format, config),
            Direction::Decompress => self.decompressor(format, config),
        }
    }
}

/// Default codec provider backed by `flate2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flate2Codecs;

impl CodecProvider for Flate2Codecs {
    fn compressor(&self, format: Format, config: &StreamConfig) -> Result<Box<dyn Transform>> {
        Ok(Box::new(Encoder::new(format, config)?))
    }

    fn decompressor(&self, format: Format, _config: &StreamConfig) -> Result<Box<dyn Transform>> {
        Ok(Box::new(Decoder::new(format)))
    }
}

// ========== Encoder ==========

enum EncoderState {
    Gzip(GzEncoder<Vec<u8>>),
    Zlib(ZlibEncoder<Vec<u8>>),
    Deflate(DeflateEncoder<Vec<u8>>),
}

impl EncoderState {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Gzip(encoder) => encoder.write_all(data),
            Self::Zlib(encoder) => encoder.write_all(data),
            Self::Deflate(encoder) => encoder.write_all(data),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Gzip(encoder) => encoder.flush(),
            Self::Zlib(encoder) => encoder.flush(),
            Self::Deflate(encoder) => encoder.flush(),
        }
    }

    fn try_finish(&mut self) -> io::Result<()> {
        match self {
            Self::Gzip(encoder) => encoder.try_finish(),
            Self::Zlib(encoder) => encoder.try_finish(),
            Self::Deflate(encoder) => encoder.try_finish(),
        }
    }

    fn output(&mut self) -> &mut Vec<u8> {
        match self {
            Self::Gzip(encoder) => encoder.get_mut(),
            Self::Zlib(encoder) => encoder.get_mut(),
            Self::Deflate(encoder) => encoder.get_mut(),
        }
    }
}

/// Compressing transform.
pub struct Encoder {
    format: Format,
    state: EncoderState,
    flush_interval: usize,
    unflushed_bytes: usize,
    finished: bool,
}

impl Encoder {
    /// Create an encoder for `format` at the configured level.
    pub fn new(format: Format, config: &StreamConfig) -> Result<Self> {
        config.validate()?;
        let level = Compression::new(config.level);
        let state = match format {
            Format::Gzip => EncoderState::Gzip(GzEncoder::new(Vec::new(), level)),
            Format::Deflate => EncoderState::Zlib(ZlibEncoder::new(Vec::new(), level)),
            Format::DeflateRaw => EncoderState::Deflate(DeflateEncoder::new(Vec::new(), level)),
        };

        Ok(Self {
            format,
            state,
            flush_interval: config.flush_interval,
            unflushed_bytes: 0,
            finished: false,
        })
    }

    fn take_output(&mut self) -> Bytes {
        Bytes::from(std::mem::take(self.state.output()))
    }

    fn failed(e: io::Error) -> CompressionError {
        CompressionError::CompressionFailed(e.to_string())
    }
}

impl Transform for Encoder {
    fn format(&self) -> Format {
        self.format
    }

    fn push(&mut self, input: &[u8]) -> Result<Bytes> {
        if self.finished {
            return Err(CompressionError::StreamState("encoder already finished".to_string()));
        }

        if input.is_empty() {
            return Ok(Bytes::new());
        }

        self.state.write_all(input).map_err(Self::failed)?;
        self.unflushed_bytes += input.len();

        if self.flush_interval > 0 && self.unflushed_bytes >= self.flush_interval {
            self.unflushed_bytes = 0;
            self.state.flush().map_err(Self::failed)?;
        }

        Ok(self.take_output())
    }

    fn finish(&mut self) -> Result<Bytes> {
        if self.finished {
            return Ok(Bytes::new());
        }
        self.finished = true;

        self.state.try_finish().map_err(Self::failed)?;
        Ok(self.take_output())
    }
}

// ========== Decoder ==========

enum DecoderState {
    Gzip(GzDecoder<Vec<u8>>),
    // zlib and raw deflate; `Decompress` reports StreamEnd so truncation is detectable
    Inflate {
        inner: Decompress,
        output: Vec<u8>,
        ended: bool,
    },
}

/// Decompressing transform.
pub struct Decoder {
    format: Format,
    state: DecoderState,
    finished: bool,
}

impl Decoder {
    /// Create a decoder for `format`.
    pub fn new(format: Format) -> Self {
        let state = match format {
            Format::Gzip => DecoderState::Gzip(GzDecoder::new(Vec::new())),
            Format::Deflate => DecoderState::Inflate {
                inner: Decompress::new(true),
                output: Vec::new(),
                ended: false,
            },
            Format::DeflateRaw => DecoderState::Inflate {
                inner: Decompress::new(false),
                output: Vec::new(),
                ended: false,
            },
        };

        Self {
            format,
            state,
            finished: false,
        }
    }

    fn take_output(&mut self) -> Bytes {
        let output = match &mut self.state {
            DecoderState::Gzip(decoder) => decoder.get_mut(),
            DecoderState::Inflate { output, .. } => output,
        };
        Bytes::from(std::mem::take(output))
    }
}

fn reserve(output: &mut Vec<u8>) {
    if output.capacity() - output.len() < INFLATE_CHUNK {
        output.reserve(INFLATE_CHUNK);
    }
}

impl Transform for Decoder {
    fn format(&self) -> Format {
        self.format
    }

    fn push(&mut self, mut input: &[u8]) -> Result<Bytes> {
        if self.finished {
            return Err(CompressionError::StreamState("decoder already finished".to_string()));
        }

        let format = self.format;
        match &mut self.state {
            DecoderState::Gzip(decoder) => {
                decoder.write_all(input).map_err(|e| match e.kind() {
                    // the decoder stops accepting input once the trailer is read
                    io::ErrorKind::WriteZero => CompressionError::corrupt(format, TRAILING_DATA),
                    _ => CompressionError::corrupt(format, e.to_string()),
                })?;
            }

            DecoderState::Inflate {
                inner,
                output,
                ended,
            } => {
                while !input.is_empty() {
                    if *ended {
                        return Err(CompressionError::corrupt(format, TRAILING_DATA));
                    }

                    reserve(output);
                    let before_in = inner.total_in();
                    let before_out = inner.total_out();
                    let status = inner
                        .decompress_vec(input, output, FlushDecompress::None)
                        .map_err(|e| CompressionError::corrupt(format, e.to_string()))?;

                    let consumed = (inner.total_in() - before_in) as usize;
                    input = &input[consumed..];

                    if status == Status::StreamEnd {
                        *ended = true;
                    } else if consumed == 0 && inner.total_out() == before_out {
                        return Err(CompressionError::corrupt(format, "decoder made no progress"));
                    }
                }
            }
        }

        Ok(self.take_output())
    }

    fn finish(&mut self) -> Result<Bytes> {
        if self.finished {
            return Ok(Bytes::new());
        }
        self.finished = true;

        let format = self.format;
        match &mut self.state {
            DecoderState::Gzip(decoder) => {
                decoder
                    .try_finish()
                    .map_err(|e| CompressionError::corrupt(format, e.to_string()))?;
            }

            DecoderState::Inflate {
                inner,
                output,
                ended,
            } => {
                while !*ended {
                    reserve(output);
                    let before_out = inner.total_out();
                    let status = inner
                        .decompress_vec(&[], output, FlushDecompress::Finish)
                        .map_err(|e| CompressionError::corrupt(format, e.to_string()))?;

                    if status == Status::StreamEnd {
                        *ended = true;
                    } else if inner.total_out() == before_out {
                        return Err(CompressionError::corrupt(format, "unexpected end of stream"));
                    }
                }
            }
        }

        Ok(self.take_output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn run(transform: &mut dyn Transform, chunks: &[&[u8]]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend_from_slice(&transform.push(chunk)?);
        }
        out.extend_from_slice(&transform.finish()?);
        Ok(out)
    }

    fn compress(format: Format, data: &[u8]) -> Vec<u8> {
        let mut encoder = Encoder::new(format, &StreamConfig::default()).unwrap();
        run(&mut encoder, &[data]).unwrap()
    }

    #[test]
    fn test_gzip_output_readable_by_flate2() {
        let compressed = compress(Format::Gzip, b"Hello, World!");
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        let mut plain = String::new();
        decoder.read_to_string(&mut plain).unwrap();
        assert_eq!(plain, "Hello, World!");
    }

    #[test]
    fn test_zlib_framing() {
        let compressed = compress(Format::Deflate, b"framing");
        // CMF byte: deflate, 32K window
        assert_eq!(compressed[0], 0x78);
        assert_eq!((u16::from(compressed[0]) << 8 | u16::from(compressed[1])) % 31, 0);

        let mut decoder = flate2::read::ZlibDecoder::new(&compressed[..]);
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).unwrap();
        assert_eq!(plain, b"framing");
    }

    #[test]
    fn test_raw_deflate_has_no_framing() {
        let raw = compress(Format::DeflateRaw, b"framing");
        assert_ne!(raw[0], 0x78);

        let mut decoder = flate2::read::DeflateDecoder::new(&raw[..]);
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).unwrap();
        assert_eq!(plain, b"framing");
    }

    #[test]
    fn test_round_trip_all_formats() {
        let data = b"The quick brown fox jumps over the lazy dog. ".repeat(50);
        for format in Format::ALL {
            let compressed = compress(format, &data);
            let mut decoder = Decoder::new(format);
            let plain = run(&mut decoder, &[&compressed]).unwrap();
            assert_eq!(plain, data, "{format}");
        }
    }

    #[test]
    fn test_byte_at_a_time_decode() {
        let data = b"split me into single bytes";
        for format in Format::ALL {
            let compressed = compress(format, data);
            let chunks: Vec<&[u8]> = compressed.chunks(1).collect();
            let mut decoder = Decoder::new(format);
            assert_eq!(run(&mut decoder, &chunks).unwrap(), data, "{format}");
        }
    }

    #[test]
    fn test_truncated_input_is_corrupt() {
        for format in Format::ALL {
            let compressed = compress(format, b"truncate this payload please");
            let truncated = &compressed[..compressed.len() - 3];
            let mut decoder = Decoder::new(format);
            let err = run(&mut decoder, &[truncated]).unwrap_err();
            assert!(err.is_corrupt_input(), "{format}: {err}");
        }
    }

    #[test]
    fn test_empty_input_is_corrupt() {
        for format in Format::ALL {
            let mut decoder = Decoder::new(format);
            let err = run(&mut decoder, &[]).unwrap_err();
            assert!(err.is_corrupt_input(), "{format}: {err}");
        }
    }

    #[test]
    fn test_trailing_garbage_is_corrupt() {
        for format in Format::ALL {
            let mut compressed = compress(format, b"payload");
            compressed.extend_from_slice(b"garbage");
            let mut decoder = Decoder::new(format);
            let err = run(&mut decoder, &[&compressed]).unwrap_err();
            assert_eq!(err, CompressionError::corrupt(format, TRAILING_DATA));
        }
    }

    #[test]
    fn test_gzip_trailing_garbage_in_later_chunk() {
        let compressed = compress(Format::Gzip, b"payload");
        let crc_at = compressed.len() - 8;

        // split exactly after the trailer, then inside the CRC
        for at in [compressed.len(), crc_at + 2] {
            let mut input = compressed.clone();
            input.extend_from_slice(b"garbage");
            let (head, tail) = input.split_at(at);

            let mut decoder = Decoder::new(Format::Gzip);
            let err = run(&mut decoder, &[head, tail]).unwrap_err();
            let expected = CompressionError::corrupt(Format::Gzip, TRAILING_DATA);
            assert_eq!(err, expected, "split at {at}");
        }
    }

    #[test]
    fn test_bad_gzip_header() {
        let mut decoder = Decoder::new(Format::Gzip);
        let err = run(&mut decoder, &[b"definitely not gzip"]).unwrap_err();
        assert!(err.is_corrupt_input());
    }

    #[test]
    fn test_gzip_checksum_mismatch() {
        let mut compressed = compress(Format::Gzip, b"checksummed payload");
        let crc_at = compressed.len() - 8;
        compressed[crc_at] ^= 0xff;
        let mut decoder = Decoder::new(Format::Gzip);
        let err = run(&mut decoder, &[&compressed]).unwrap_err();
        assert!(err.is_corrupt_input());
    }

    #[test]
    fn test_flush_interval_emits_early() {
        let config = StreamConfig::new().flush_interval(8);
        let mut encoder = Encoder::new(Format::DeflateRaw, &config).unwrap();
        let first = encoder.push(b"0123456789").unwrap();
        assert!(!first.is_empty());
    }

    #[test]
    fn test_push_after_finish() {
        let mut encoder = Encoder::new(Format::Gzip, &StreamConfig::default()).unwrap();
        encoder.finish().unwrap();
        assert!(encoder.push(b"late").unwrap_err().is_stream_state());
        assert!(encoder.finish().unwrap().is_empty());
    }

    #[test]
    fn test_provider_direction() {
        let config = StreamConfig::default();
        let encoder = Flate2Codecs
            .transform(Direction::Compress, Format::DeflateRaw, &config)
            .unwrap();
        assert_eq!(encoder.format(), Format::DeflateRaw);

        let err = Flate2Codecs
            .compressor(Format::Gzip, &StreamConfig::new().level(42))
            .err()
            .unwrap();
        assert_eq!(err, CompressionError::InvalidLevel(42, 0, 9));
    }
}
