// src/state.rs

//! Host-visible decoder states.
//!
//! Engines report their status as a raw integer numbered like libFLAC's
//! `FLAC__StreamDecoderState`. We project that code onto a closed enum so callers can match
//! on it, with an explicit `Unknown` arm so a newer engine with extra states never breaks
//! the translation.

use std::fmt;

use serde::Serialize;

/// Raw status codes, numbered like `FLAC__StreamDecoderState`.
pub mod raw {
    pub const SEARCH_FOR_METADATA: u32 = 0;
    pub const READ_METADATA: u32 = 1;
    pub const SEARCH_FOR_FRAME_SYNC: u32 = 2;
    pub const READ_FRAME: u32 = 3;
    pub const END_OF_STREAM: u32 = 4;
    pub const OGG_ERROR: u32 = 5;
    pub const SEEK_ERROR: u32 = 6;
    pub const ABORTED: u32 = 7;
    pub const MEMORY_ALLOCATION_ERROR: u32 = 8;
    pub const UNINITIALIZED: u32 = 9;
}

/// The state of a decoder at the instant it is queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DecoderState {
    SearchingForMetadata,
    ReadingMetadata,
    SearchingForFrameSync,
    ReadingFrame,
    EndOfStream,
    /// Transport (Ogg) error.
    ContainerError,
    SeekError,
    /// A callback asked the engine to stop.
    Aborted,
    MemoryAllocationError,
    Uninitialized,
    /// A status code this crate does not know about yet.
    Unknown(u32),
}

impl DecoderState {
    /// Translate a raw engine status code. Never fails.
    pub const fn from_raw(code: u32) -> Self {
        match code {
            raw::SEARCH_FOR_METADATA => Self::SearchingForMetadata,
            raw::READ_METADATA => Self::ReadingMetadata,
            raw::SEARCH_FOR_FRAME_SYNC => Self::SearchingForFrameSync,
            raw::READ_FRAME => Self::ReadingFrame,
            raw::END_OF_STREAM => Self::EndOfStream,
            raw::OGG_ERROR => Self::ContainerError,
            raw::SEEK_ERROR => Self::SeekError,
            raw::ABORTED => Self::Aborted,
            raw::MEMORY_ALLOCATION_ERROR => Self::MemoryAllocationError,
            raw::UNINITIALIZED => Self::Uninitialized,
            other => Self::Unknown(other),
        }
    }

    /// The raw status code this state was translated from.
    pub const fn raw(self) -> u32 {
        match self {
            Self::SearchingForMetadata => raw::SEARCH_FOR_METADATA,
            Self::ReadingMetadata => raw::READ_METADATA,
            Self::SearchingForFrameSync => raw::SEARCH_FOR_FRAME_SYNC,
            Self::ReadingFrame => raw::READ_FRAME,
            Self::EndOfStream => raw::END_OF_STREAM,
            Self::ContainerError => raw::OGG_ERROR,
            Self::SeekError => raw::SEEK_ERROR,
            Self::Aborted => raw::ABORTED,
            Self::MemoryAllocationError => raw::MEMORY_ALLOCATION_ERROR,
            Self::Uninitialized => raw::UNINITIALIZED,
            Self::Unknown(code) => code,
        }
    }

    /// Whether this is one of the engine's error states.
    pub const fn is_error(self) -> bool {
        matches!(
            self,
            Self::ContainerError | Self::SeekError | Self::Aborted | Self::MemoryAllocationError
        )
    }

    /// Whether no further frame can be produced from this state.
    ///
    /// `Unknown` is not terminal: we keep stepping and let the engine decide.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::EndOfStream | Self::Uninitialized) || self.is_error()
    }
}

impl fmt::Display for DecoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SearchingForMetadata => "searching for metadata",
            Self::ReadingMetadata => "reading metadata",
            Self::SearchingForFrameSync => "searching for frame sync",
            Self::ReadingFrame => "reading frame",
            Self::EndOfStream => "end of stream",
            Self::ContainerError => "container error",
            Self::SeekError => "seek error",
            Self::Aborted => "aborted",
            Self::MemoryAllocationError => "memory allocation error",
            Self::Uninitialized => "uninitialized",
            Self::Unknown(code) => return write!(f, "unknown state ({code})"),
        };
        f.write_str(name)
    }
}
