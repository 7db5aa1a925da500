// src/engine.rs

//! The callback protocol between a push-style stream decoder ("engine") and its client.
//!
//! This mirrors libFLAC's stream decoder contract:
//! - the client installs a table of callbacks (`StreamCallbacks`) once, at `init_stream`
//! - the client then drives the engine with `process_until_end_of_metadata` / `process_single`
//! - during those calls the engine pulls bytes through `read` and pushes results through
//!   `metadata`, `write` and `error`
//!
//! Buffers handed to `write` are owned by the engine and only valid for the duration of
//! the call. Implementations of `StreamCallbacks` must copy what they keep.

use std::sync::{Arc, Mutex};

use serde::Serialize;

pub mod builtin;
#[cfg(feature = "libflac")]
pub mod libflac;
#[cfg(test)]
pub(crate) mod scripted;

/// Callback table shared between a client and the engine it drives.
///
/// The engine locks it once per callback; the client locks it between engine calls.
pub type SharedCallbacks = Arc<Mutex<dyn StreamCallbacks + Send>>;

/// Outcome of a `read` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// This many bytes were written to the front of the buffer.
    Continue(usize),
    /// The input is exhausted.
    EndOfStream,
    /// Stop decoding.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    Ok,
    Error,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TellStatus {
    Ok(u64),
    Error,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthStatus {
    Ok(u64),
    Error,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Continue,
    Abort,
}

/// Non-fatal decoding problems reported through the `error` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorStatus {
    LostSync,
    BadHeader,
    FrameCrcMismatch,
    UnparseableStream,
    BadMetadata,
    /// A status code this crate does not know about yet.
    Unknown(u32),
}

impl ErrorStatus {
    /// Translate a raw `FLAC__StreamDecoderErrorStatus` value.
    pub const fn from_raw(code: u32) -> Self {
        match code {
            0 => Self::LostSync,
            1 => Self::BadHeader,
            2 => Self::FrameCrcMismatch,
            3 => Self::UnparseableStream,
            4 => Self::BadMetadata,
            other => Self::Unknown(other),
        }
    }
}

/// Header of one decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameHeader {
    pub channels: u32,
    /// Samples per channel in this frame.
    pub block_size: u32,
    pub bits_per_sample: u32,
    pub sample_rate: u32,
    /// Index of the frame's first sample within the stream.
    pub first_sample: u64,
}

/// The STREAMINFO metadata block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
    /// Samples per channel in the whole stream; `0` when the encoder did not know.
    pub total_samples: u64,
    /// MD5 of the unencoded audio; all zeros when unset.
    pub md5: [u8; 16],
    pub min_block_size: u32,
    pub max_block_size: u32,
}

/// A metadata block delivered by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataBlock {
    StreamInfo(StreamInfo),
    /// Vorbis comment entries as `(key, value)` pairs.
    VorbisComment(Vec<(String, String)>),
    Picture { media_type: String, data_len: usize },
    /// Any other block type, by its FLAC block type number.
    Other(u32),
}

/// Callbacks an engine invokes while it runs.
pub trait StreamCallbacks {
    /// Fill the front of `buffer` with input bytes.
    fn read(&mut self, buffer: &mut [u8]) -> ReadStatus;

    fn seek(&mut self, absolute_byte_offset: u64) -> SeekStatus;

    fn tell(&mut self) -> TellStatus;

    fn length(&mut self) -> LengthStatus;

    fn eof(&mut self) -> bool;

    /// Receive one decoded frame: one slice per channel, each `header.block_size` long.
    fn write(&mut self, header: &FrameHeader, channels: &[&[i32]]) -> WriteStatus;

    fn metadata(&mut self, block: &MetadataBlock);

    fn error(&mut self, status: ErrorStatus);
}

/// Status returned when an engine cannot be initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    UnsupportedContainer,
    InvalidCallbacks,
    MemoryAllocation,
    AlreadyInitialized,
    Other(u32),
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedContainer => f.write_str("unsupported container"),
            Self::InvalidCallbacks => f.write_str("invalid callbacks"),
            Self::MemoryAllocation => f.write_str("memory allocation failed"),
            Self::AlreadyInitialized => f.write_str("already initialized"),
            Self::Other(code) => write!(f, "init status {code}"),
        }
    }
}

/// A push-style stream decoder.
///
/// Implementations keep a raw status code numbered like `FLAC__StreamDecoderState`
/// (see `crate::state::raw`). Callers translate it with `DecoderState::from_raw`.
pub trait StreamEngine: Send {
    /// Install the callback table. Must be called exactly once, before any processing.
    fn init_stream(&mut self, callbacks: SharedCallbacks) -> Result<(), InitError>;

    /// Run until every leading metadata block has been delivered.
    ///
    /// Returns `false` on a fatal problem; the state tells which.
    fn process_until_end_of_metadata(&mut self) -> bool;

    /// Decode exactly one frame, or stop at the end of the stream or an error.
    ///
    /// Returns `false` on a fatal problem; the state tells which.
    fn process_single(&mut self) -> bool;

    fn raw_state(&self) -> u32;

    /// Release per-stream resources. The engine returns to the uninitialized state.
    fn finish(&mut self);
}

/// Run `f` with the callback table locked.
///
/// Returns `None` when the table is poisoned; engines treat that like an aborting callback.
pub(crate) fn with_callbacks<T>(
    callbacks: &SharedCallbacks,
    f: impl FnOnce(&mut (dyn StreamCallbacks + Send)) -> T,
) -> Option<T> {
    let mut guard = callbacks.lock().ok()?;
    Some(f(&mut *guard))
}
