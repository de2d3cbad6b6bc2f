// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoped capture of diagnostic output.
//!
//! A [`DiagnosticCapture`] hands out capture handles. The runner wraps each
//! handle in a [`CaptureSession`], which guarantees the handle is released
//! exactly once: explicitly through [`CaptureSession::close`], or on drop if
//! the session is abandoned while unwinding.

use crate::errors::CaptureError;
use bytes::BytesMut;
use std::{
    fmt, io,
    ops::Range,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::debug;

/// A stream that can be captured.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CaptureStream {
    /// Standard output.
    Stdout,

    /// Standard error.
    Stderr,

    /// Debug trace output.
    Trace,
}

/// Options for acquiring a capture session.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CaptureRequest {
    /// Whether the trace stream should be captured.
    pub trace: bool,
}

/// Text captured over the lifetime of a session.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CapturedOutput {
    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,

    /// Captured debug trace output. Empty if trace capture wasn't requested.
    pub trace: String,
}

impl CapturedOutput {
    /// Returns the total number of captured bytes.
    pub fn len(&self) -> usize {
        self.stdout.len() + self.stderr.len() + self.trace.len()
    }

    /// Returns true if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A mechanism for capturing process or thread-level output.
///
/// Implementations are provided by the host. Acquiring while another handle
/// from the same capture is still live should fail with
/// [`CaptureError::AlreadyActive`].
pub trait DiagnosticCapture: Send + Sync {
    /// Starts capturing.
    fn acquire(&self, request: CaptureRequest) -> Result<Box<dyn CaptureHandle>, CaptureError>;
}

/// A live capture, returned by [`DiagnosticCapture::acquire`].
pub trait CaptureHandle: Send {
    /// Stops capturing and returns everything captured.
    fn release(self: Box<Self>) -> CapturedOutput;
}

/// An active capture scope.
///
/// Owns exactly one capture handle for its lifetime.
#[must_use = "dropping a session discards captured output"]
pub struct CaptureSession {
    handle: Option<Box<dyn CaptureHandle>>,
}

impl CaptureSession {
    /// Opens a new session on `capture`.
    pub fn open(
        capture: &dyn DiagnosticCapture,
        request: CaptureRequest,
    ) -> Result<Self, CaptureError> {
        let handle = capture.acquire(request)?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Closes the session, returning the captured output.
    pub fn close(mut self) -> CapturedOutput {
        self.handle
            .take()
            .map(|handle| handle.release())
            .unwrap_or_default()
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("open", &self.handle.is_some())
            .finish()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let output = handle.release();
            debug!(
                discarded_bytes = output.len(),
                "capture session dropped without being closed"
            );
        }
    }
}

/// A [`DiagnosticCapture`] that captures nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoCapture;

impl DiagnosticCapture for NoCapture {
    fn acquire(&self, _request: CaptureRequest) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        Ok(Box::new(NoCaptureHandle))
    }
}

struct NoCaptureHandle;

impl CaptureHandle for NoCaptureHandle {
    fn release(self: Box<Self>) -> CapturedOutput {
        CapturedOutput::default()
    }
}

/// An in-memory [`DiagnosticCapture`].
///
/// Code under test writes through the writers returned by
/// [`BufferCapture::writer`]. Writes are recorded only while a session is
/// active; trace writes are recorded only if the session requested them.
///
/// Clones share the same buffer. At most one session can be active at a time.
#[derive(Clone, Debug, Default)]
pub struct BufferCapture {
    state: Arc<Mutex<BufferState>>,
}

#[derive(Debug, Default)]
struct BufferState {
    active: Option<CaptureRequest>,
    acc: CaptureAccumulator,
}

impl BufferCapture {
    /// Creates a new, inactive buffer capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a writer for the given stream.
    pub fn writer(&self, stream: CaptureStream) -> CaptureWriter {
        CaptureWriter {
            state: self.state.clone(),
            stream,
        }
    }

    /// Returns true if a session is currently active.
    pub fn is_active(&self) -> bool {
        self.lock().active.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        lock_state(&self.state)
    }
}

impl DiagnosticCapture for BufferCapture {
    fn acquire(&self, request: CaptureRequest) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let mut state = self.lock();
        if state.active.is_some() {
            return Err(CaptureError::AlreadyActive);
        }
        state.active = Some(request);
        state.acc = CaptureAccumulator::default();
        Ok(Box::new(BufferHandle {
            state: self.state.clone(),
        }))
    }
}

struct BufferHandle {
    state: Arc<Mutex<BufferState>>,
}

impl CaptureHandle for BufferHandle {
    fn release(self: Box<Self>) -> CapturedOutput {
        let mut state = lock_state(&self.state);
        state.active = None;
        std::mem::take(&mut state.acc).freeze()
    }
}

fn lock_state(state: &Mutex<BufferState>) -> MutexGuard<'_, BufferState> {
    // A panic while holding the lock only ever leaves a partially written chunk behind.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Provides [`std::io::Write`] and [`std::fmt::Write`] implementations for a
/// single stream of a [`BufferCapture`].
#[derive(Clone, Debug)]
pub struct CaptureWriter {
    state: Arc<Mutex<BufferState>>,
    stream: CaptureStream,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock_state(&self.state);
        let record = match (state.active, self.stream) {
            (None, _) => false,
            (Some(request), CaptureStream::Trace) => request.trace,
            (Some(_), _) => true,
        };
        if record {
            state.acc.push(self.stream, buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Write for CaptureWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        io::Write::write_all(self, s.as_bytes()).map_err(|_| fmt::Error)
    }
}

/// A single chunk of captured output.
#[derive(Clone, Debug)]
struct OutputChunk {
    /// The byte range the chunk occupies in the buffer.
    range: Range<usize>,
    stream: CaptureStream,
}

/// Interleaved output of all three streams, indexed by chunk.
#[derive(Debug, Default)]
struct CaptureAccumulator {
    buf: BytesMut,
    chunks: Vec<OutputChunk>,
}

impl CaptureAccumulator {
    fn push(&mut self, stream: CaptureStream, bytes: &[u8]) {
        let start = self.buf.len();
        self.buf.extend_from_slice(bytes);
        self.chunks.push(OutputChunk {
            range: start..self.buf.len(),
            stream,
        });
    }

    fn freeze(self) -> CapturedOutput {
        CapturedOutput {
            stdout: self.as_string(CaptureStream::Stdout),
            stderr: self.as_string(CaptureStream::Stderr),
            trace: self.as_string(CaptureStream::Trace),
        }
    }

    fn as_string(&self, stream: CaptureStream) -> String {
        let count = self
            .chunks
            .iter()
            .filter_map(|chunk| (chunk.stream == stream).then_some(chunk.range.len()))
            .sum();

        let bytes = self
            .chunks
            .iter()
            .filter(|chunk| chunk.stream == stream)
            .fold(Vec::with_capacity(count), |mut acc, chunk| {
                acc.extend_from_slice(&self.buf[chunk.range.clone()]);
                acc
            });
        // Chunks may split multi-byte characters, so decode the stream as a whole.
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
