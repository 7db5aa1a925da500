// src/read_bridge.rs

//! Satisfy the engine's demand for input bytes from a caller-supplied read function.
//!
//! The caller's function receives the number of bytes the engine can take and answers with a
//! `Chunk`: some bytes plus the length it claims is valid. We never trust that claim beyond
//! what the chunk and the engine's buffer can actually hold.

use std::io::{self, Read};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::ReadStatus;
use crate::runtime::{HostRuntime, ManagedRegion};

/// Bytes returned by a read function, with the number of leading bytes that are valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    pub data: Vec<u8>,
    pub len: usize,
}

impl Chunk {
    /// A chunk whose every byte is valid.
    pub fn new(data: Vec<u8>) -> Self {
        let len = data.len();
        Self { data, len }
    }

    /// A chunk where only the first `len` bytes of `data` are valid.
    pub fn with_len(data: Vec<u8>, len: usize) -> Self {
        Self { data, len }
    }

    /// An empty chunk, which signals end of input.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// The caller-supplied read function: "give me up to `max_bytes` bytes".
///
/// Returning an empty chunk means the input is exhausted. Returning an error aborts decoding;
/// the error is handed back to the caller from the decode step that hit it.
pub trait ByteSource: Send {
    fn request(&mut self, max_bytes: usize) -> io::Result<Chunk>;
}

impl<F> ByteSource for F
where
    F: FnMut(usize) -> io::Result<Chunk> + Send,
{
    fn request(&mut self, max_bytes: usize) -> io::Result<Chunk> {
        self(max_bytes)
    }
}

/// Adapts any `Read` into a `ByteSource`.
///
/// Interrupted reads are retried; everything else is passed through.
pub struct ReaderSource<R> {
    inner: R,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Send> ByteSource for ReaderSource<R> {
    fn request(&mut self, max_bytes: usize) -> io::Result<Chunk> {
        let mut data = vec![0u8; max_bytes];
        loop {
            match self.inner.read(&mut data) {
                Ok(n) => {
                    data.truncate(n);
                    return Ok(Chunk::new(data));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Calls the read function on behalf of the engine and copies its answer into engine memory.
pub struct ReadBridge {
    source: Box<dyn ByteSource>,
    runtime: Arc<dyn HostRuntime>,
    failure: Option<io::Error>,
    total_bytes: u64,
}

impl ReadBridge {
    pub fn new(source: Box<dyn ByteSource>, runtime: Arc<dyn HostRuntime>) -> Self {
        Self {
            source,
            runtime,
            failure: None,
            total_bytes: 0,
        }
    }

    /// Fill the front of `buffer` from the read function.
    ///
    /// - zero bytes (or an empty buffer) → `EndOfStream`
    /// - read function error → `Abort`, with the error kept for `take_failure`
    /// - otherwise → `Continue(n)` with `n <= buffer.len()`
    pub fn fill(&mut self, buffer: &mut [u8]) -> ReadStatus {
        if buffer.is_empty() {
            return ReadStatus::EndOfStream;
        }

        let requested = buffer.len();
        let answer = {
            let _managed = ManagedRegion::enter(self.runtime.as_ref());
            self.source.request(requested)
        };

        let chunk = match answer {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!(error = %err, requested, "read function failed; aborting decode");
                self.failure = Some(err);
                return ReadStatus::Abort;
            }
        };

        let claimed = chunk.len;
        let n = claimed.min(chunk.data.len()).min(requested);
        if n < claimed {
            warn!(
                requested,
                claimed,
                available = chunk.data.len(),
                copied = n,
                "read function claimed more bytes than it could deliver; truncating"
            );
        }

        if n == 0 {
            debug!(total_bytes = self.total_bytes, "read function reported end of input");
            return ReadStatus::EndOfStream;
        }

        buffer[..n].copy_from_slice(&chunk.data[..n]);
        self.total_bytes += n as u64;
        ReadStatus::Continue(n)
    }

    /// Take the read function's most recent failure, if any.
    pub fn take_failure(&mut self) -> Option<io::Error> {
        self.failure.take()
    }

    /// Bytes handed to the engine so far.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}
