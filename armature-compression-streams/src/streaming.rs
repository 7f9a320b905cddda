//! Stream bridge - exposes a push-style [`Transform`] as a readable/writable pair
//!
//! Bytes written to the [`WritableStream`] travel over a bounded channel to the
//! [`ReadableStream`], which runs them through the transform when it is polled
//! and hands the output out in write order. No task is spawned: nothing is
//! transformed until the readable side is read.
//!
//! # Backpressure
//!
//! The channel holds at most `high_water_mark` chunks. Once it is full,
//! [`WritableStream::write`] waits until the reader catches up. The output of
//! a single input chunk is buffered in full before it is handed out in
//! `output_chunk_size` pieces, so a small compressed chunk that inflates to a
//! large payload is held in memory at once.
//!
//! # Example
//!
//! ```rust
//! use armature_compression_streams::streaming::stream_pair;
//! use armature_compression_streams::{CodecProvider, Flate2Codecs, Format, StreamConfig};
//!
//! # tokio_test::block_on(async {
//! let config = StreamConfig::default();
//! let transform = Flate2Codecs.compressor(Format::Gzip, &config).unwrap();
//! let (mut readable, writable) = stream_pair(transform, &config);
//!
//! writable.write("Hello, ").await.unwrap();
//! writable.write("World!").await.unwrap();
//! writable.close().await.unwrap();
//!
//! let compressed = readable.read_to_end().await.unwrap();
//! assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
//! # });
//! ```

use crate::codec::Transform;
use crate::{CompressionError, Result, StreamConfig};
use bytes::{Bytes, BytesMut};
use futures::stream::{FusedStream, Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, ready};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Message carried from the writable side to the readable side.
#[derive(Debug)]
enum StreamChunk {
    /// Input bytes
    Bytes(Bytes),
    /// Writer closed
    End,
    /// Writer aborted
    Error(CompressionError),
}

/// Lifecycle shared by both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamState {
    Open,
    Closing,
    Finished,
    Errored(CompressionError),
    Cancelled(String),
}

#[derive(Debug)]
struct Shared {
    state: Mutex<StreamState>,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(StreamState::Open),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
        }
    }

    /// Error explaining why the writable side can no longer accept input.
    fn write_error(&self) -> Option<CompressionError> {
        match &*self.state.lock() {
            StreamState::Open => None,
            StreamState::Closing | StreamState::Finished => {
                Some(CompressionError::StreamState("cannot write to a closed stream".to_string()))
            }
            StreamState::Errored(err) => Some(err.clone()),
            StreamState::Cancelled(reason) => Some(CompressionError::StreamState(format!(
                "readable side cancelled: {reason}"
            ))),
        }
    }

    fn errored(&self) -> Option<CompressionError> {
        match &*self.state.lock() {
            StreamState::Errored(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Move to `next` unless the stream already reached a terminal state.
    fn transition(&self, next: StreamState) -> bool {
        let mut state = self.state.lock();
        match *state {
            StreamState::Open | StreamState::Closing => {
                *state = next;
                true
            }
            _ => false,
        }
    }

    fn stats(&self) -> CompressionStats {
        CompressionStats::new(
            self.bytes_in.load(Ordering::Relaxed),
            self.bytes_out.load(Ordering::Relaxed),
        )
    }
}

/// Connect `transform` to a new readable/writable pair.
pub fn stream_pair(
    transform: Box<dyn Transform>,
    config: &StreamConfig,
) -> (ReadableStream, WritableStream) {
    let high_water_mark = config.high_water_mark.max(1);
    let (sender, receiver) = mpsc::channel(high_water_mark);
    let shared = Arc::new(Shared::new());

    (
        ReadableStream {
            receiver,
            transform: Some(transform),
            pending: VecDeque::new(),
            output_chunk_size: config.output_chunk_size.max(1),
            terminated: false,
            closed_reason: None,
            shared: Arc::clone(&shared),
        },
        WritableStream {
            sender,
            high_water_mark,
            shared,
        },
    )
}

// ============================================================================
// Writable side
// ============================================================================

/// Input side of a stream pair.
#[derive(Debug)]
pub struct WritableStream {
    sender: mpsc::Sender<StreamChunk>,
    high_water_mark: usize,
    shared: Arc<Shared>,
}

impl WritableStream {
    /// Queue a chunk, waiting while the queue is full.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<()> {
        if let Some(err) = self.shared.write_error() {
            return Err(err);
        }

        let chunk = chunk.into();
        let len = chunk.len() as u64;
        trace!(len, "queueing chunk");

        self.sender
            .send(StreamChunk::Bytes(chunk))
            .await
            .map_err(|_| self.disconnected())?;
        self.shared.bytes_in.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    /// Signal end of input.
    ///
    /// The readable side ends after emitting whatever the codec flushes.
    pub async fn close(&self) -> Result<()> {
        if let Some(err) = self.shared.write_error() {
            return Err(err);
        }

        self.shared.transition(StreamState::Closing);
        debug!("writable side closed");
        self.sender.send(StreamChunk::End).await.map_err(|_| {
            self.shared.errored().unwrap_or_else(|| {
                CompressionError::StreamState("readable side dropped before close".to_string())
            })
        })
    }

    /// Abort the stream, erroring the readable side with `reason`.
    ///
    /// Has no effect once the stream is closed, errored or cancelled.
    pub fn abort(&self, reason: impl Into<String>) {
        let err = CompressionError::Aborted(reason.into());
        let mut state = self.shared.state.lock();
        if *state != StreamState::Open {
            return;
        }
        *state = StreamState::Errored(err.clone());
        drop(state);

        warn!(error = %err, "writable side aborted");
        // A full queue means the reader still has chunks to poll, and it
        // checks the shared state before each one.
        let _ = self.sender.try_send(StreamChunk::Error(err));
    }

    /// Whether the stream no longer accepts writes.
    pub fn is_closed(&self) -> bool {
        self.shared.write_error().is_some() || self.sender.is_closed()
    }

    /// Chunks that can be queued before `write` starts waiting.
    pub fn desired_size(&self) -> usize {
        if self.is_closed() {
            0
        } else {
            self.sender.capacity()
        }
    }

    /// Queue capacity in chunks.
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Bytes written and read so far.
    pub fn stats(&self) -> CompressionStats {
        self.shared.stats()
    }

    fn disconnected(&self) -> CompressionError {
        self.shared.write_error().unwrap_or_else(|| {
            CompressionError::StreamState("readable side dropped".to_string())
        })
    }
}

// ============================================================================
// Readable side
// ============================================================================

/// Output side of a stream pair.
///
/// Implements [`Stream`]; after an error is yielded the stream ends.
pub struct ReadableStream {
    receiver: mpsc::Receiver<StreamChunk>,
    transform: Option<Box<dyn Transform>>,
    pending: VecDeque<Bytes>,
    output_chunk_size: usize,
    terminated: bool,
    closed_reason: Option<String>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ReadableStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadableStream")
            .field("pending", &self.pending.len())
            .field("terminated", &self.terminated)
            .field("state", &*self.shared.state.lock())
            .finish()
    }
}

impl ReadableStream {
    /// Read the next chunk, or `None` once the stream has ended.
    ///
    /// Fails with the stream's error the first time it is observed, and with
    /// [`CompressionError::StreamState`] on any read after that or after
    /// [`cancel`](Self::cancel).
    pub async fn read(&mut self) -> Result<Option<Bytes>> {
        if let Some(reason) = &self.closed_reason {
            return Err(CompressionError::StreamState(reason.clone()));
        }
        self.next().await.transpose()
    }

    /// Read until the stream ends and concatenate the chunks.
    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.read().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    /// Stop reading and release the transform.
    ///
    /// Pending and future writes fail with [`CompressionError::StreamState`].
    pub fn cancel(&mut self, reason: impl Into<String>) {
        if self.terminated {
            return;
        }
        let reason = reason.into();
        debug!(%reason, "readable side cancelled");

        self.shared.transition(StreamState::Cancelled(reason.clone()));
        self.release();
        self.closed_reason = Some(format!("stream was cancelled: {}", reason));
    }

    /// Bytes written and read so far.
    pub fn stats(&self) -> CompressionStats {
        self.shared.stats()
    }

    fn release(&mut self) {
        self.terminated = true;
        self.transform = None;
        self.pending.clear();
        self.receiver.close();
    }

    fn fail(&mut self, err: CompressionError) -> CompressionError {
        if err.is_corrupt_input() {
            warn!(error = %err, "rejecting compressed input");
        } else {
            debug!(error = %err, "stream errored");
        }

        self.shared.transition(StreamState::Errored(err.clone()));
        self.release();
        self.closed_reason = Some(format!("stream errored: {}", err));
        err
    }

    fn enqueue(&mut self, mut output: Bytes) {
        while output.len() > self.output_chunk_size {
            self.pending.push_back(output.split_to(self.output_chunk_size));
        }
        if !output.is_empty() {
            self.pending.push_back(output);
        }
    }

    fn handle(&mut self, chunk: Option<StreamChunk>) -> Result<()> {
        let Some(transform) = self.transform.as_mut() else {
            return Ok(());
        };

        match chunk {
            Some(StreamChunk::Bytes(input)) => {
                let output = transform.push(&input)?;
                trace!(input = input.len(), output = output.len(), "transformed chunk");
                self.enqueue(output);
            }
            Some(StreamChunk::End) => {
                let output = transform.finish()?;
                self.enqueue(output);
                self.transform = None;
                self.receiver.close();
                self.shared.transition(StreamState::Finished);
                debug!(stats = ?self.shared.stats(), "transform finished");
            }
            Some(StreamChunk::Error(err)) => return Err(err),
            None => {
                return Err(CompressionError::StreamState(
                    "writable side dropped before close".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Stream for ReadableStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.terminated {
                return Poll::Ready(None);
            }

            if this.transform.is_some() {
                if let Some(err) = this.shared.errored() {
                    return Poll::Ready(Some(Err(this.fail(err))));
                }
            }

            if let Some(chunk) = this.pending.pop_front() {
                this.shared
                    .bytes_out
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                return Poll::Ready(Some(Ok(chunk)));
            }

            if this.transform.is_none() {
                this.terminated = true;
                return Poll::Ready(None);
            }

            let chunk = ready!(this.receiver.poll_recv(cx));
            if let Err(err) = this.handle(chunk) {
                return Poll::Ready(Some(Err(this.fail(err))));
            }
        }
    }
}

impl FusedStream for ReadableStream {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Compression statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionStats {
    /// Total bytes written to the writable side
    pub bytes_in: u64,
    /// Total bytes read from the readable side
    pub bytes_out: u64,
    /// Ratio (out/in, lower is better for compression)
    pub ratio: f64,
}

impl CompressionStats {
    fn new(bytes_in: u64, bytes_out: u64) -> Self {
        Self {
            bytes_in,
            bytes_out,
            ratio: if bytes_in > 0 {
                bytes_out as f64 / bytes_in as f64
            } else {
                1.0
            },
        }
    }

    /// Get space savings as percentage (0-100).
    pub fn savings_percent(&self) -> f64 {
        if self.bytes_in == 0 {
            return 0.0;
        }
        (1.0 - self.ratio) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Format;

    /// Uppercases ASCII; finishing appends a marker.
    struct Upper;

    impl Transform for Upper {
        fn format(&self) -> Format {
            Format::DeflateRaw
        }

        fn push(&mut self, input: &[u8]) -> Result<Bytes> {
            if input == b"boom" {
                return Err(CompressionError::corrupt(Format::DeflateRaw, "boom"));
            }
            Ok(Bytes::from(input.to_ascii_uppercase()))
        }

        fn finish(&mut self) -> Result<Bytes> {
            Ok(Bytes::from_static(b"!"))
        }
    }

    fn pair(config: StreamConfig) -> (ReadableStream, WritableStream) {
        stream_pair(Box::new(Upper), &config)
    }

    #[tokio::test]
    async fn test_order_and_finish() {
        let (mut readable, writable) = pair(StreamConfig::default());
        writable.write("hello").await.unwrap();
        writable.write(" world").await.unwrap();
        writable.close().await.unwrap();

        assert_eq!(readable.read_to_end().await.unwrap(), "HELLO WORLD!");
        assert_eq!(readable.read().await.unwrap(), None);
        assert!(readable.is_terminated());
    }

    #[tokio::test]
    async fn test_output_chunking() {
        let (readable, writable) = pair(StreamConfig::new().output_chunk_size(2));
        writable.write("abcde").await.unwrap();
        writable.close().await.unwrap();

        let chunks: Vec<Bytes> = readable.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["AB", "CD", "E", "!"]);
    }

    #[tokio::test]
    async fn test_write_after_close() {
        let (_readable, writable) = pair(StreamConfig::default());
        writable.close().await.unwrap();

        assert!(writable.write("late").await.unwrap_err().is_stream_state());
        assert!(writable.close().await.unwrap_err().is_stream_state());
        assert!(writable.is_closed());
        assert_eq!(writable.desired_size(), 0);
    }

    #[tokio::test]
    async fn test_transform_error_propagates_to_writer() {
        let (mut readable, writable) = pair(StreamConfig::default());
        writable.write("boom").await.unwrap();

        let err = readable.read().await.unwrap_err();
        assert!(err.is_corrupt_input());
        assert!(readable.read().await.unwrap_err().is_stream_state());

        let err = writable.write("more").await.unwrap_err();
        assert!(err.is_corrupt_input());
    }

    #[tokio::test]
    async fn test_abort_errors_reader() {
        let (mut readable, writable) = pair(StreamConfig::default());
        writable.write("kept?").await.unwrap();
        writable.abort("caller gave up");

        let err = readable.read().await.unwrap_err();
        assert_eq!(err, CompressionError::Aborted("caller gave up".to_string()));
        assert!(matches!(
            writable.write("x").await.unwrap_err(),
            CompressionError::Aborted(_)
        ));
    }

    #[tokio::test]
    async fn test_cancel_fails_writer() {
        let (mut readable, writable) = pair(StreamConfig::default());
        readable.cancel("not interested");

        assert!(writable.write("x").await.unwrap_err().is_stream_state());
        assert!(readable.read().await.unwrap_err().is_stream_state());
    }

    #[tokio::test]
    async fn test_dropped_writer_errors_reader() {
        let (mut readable, writable) = pair(StreamConfig::default());
        writable.write("partial").await.unwrap();
        drop(writable);

        assert_eq!(readable.read().await.unwrap().unwrap(), "PARTIAL");
        assert!(readable.read().await.unwrap_err().is_stream_state());
    }

    #[tokio::test]
    async fn test_dropped_reader_fails_writer() {
        let (readable, writable) = pair(StreamConfig::default());
        drop(readable);

        assert!(writable.write("x").await.unwrap_err().is_stream_state());
    }

    #[tokio::test]
    async fn test_backpressure() {
        let (mut readable, writable) = pair(StreamConfig::new().high_water_mark(1));
        writable.write("a").await.unwrap();
        assert_eq!(writable.desired_size(), 0);

        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(20), writable.write("b")).await;
        assert!(blocked.is_err(), "write should wait while the queue is full");

        assert_eq!(readable.read().await.unwrap().unwrap(), "A");
        writable.write("b").await.unwrap();
        assert_eq!(readable.read().await.unwrap().unwrap(), "B");
        writable.close().await.unwrap();
        assert_eq!(readable.read_to_end().await.unwrap(), "!");
    }

    #[tokio::test]
    async fn test_stats() {
        let (mut readable, writable) = pair(StreamConfig::default());
        writable.write("abcd").await.unwrap();
        writable.close().await.unwrap();
        readable.read_to_end().await.unwrap();

        let stats = writable.stats();
        assert_eq!(stats.bytes_in, 4);
        assert_eq!(stats.bytes_out, 5);
    }

    #[test]
    fn test_compression_stats() {
        let stats = CompressionStats::new(1000, 400);
        assert_eq!(stats.ratio, 0.4);
        assert_eq!(stats.savings_percent(), 60.0);
        assert_eq!(CompressionStats::new(0, 0).savings_percent(), 0.0);
    }
}
