// src/frame_cache.rs

//! Owned copies of what the engine delivered most recently.
//!
//! The engine's write buffers die when the write callback returns, so everything kept here is
//! a deep copy. The cache holds at most one frame: it is emptied at the start of every decode
//! step, so a step that produces nothing can never hand back the previous step's samples.

use std::collections::TryReserveError;

use crate::engine::{FrameHeader, StreamInfo};

/// One decoded frame, copied out of engine memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFrame {
    pub header: FrameHeader,
    /// `[channel][sample]`, each channel `header.block_size` long.
    pub samples: Vec<Vec<i32>>,
}

#[derive(Debug, Default)]
pub struct FrameCache {
    frame: Option<CachedFrame>,
    info: Option<StreamInfo>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the previous frame before the next decode step runs.
    pub fn begin_step(&mut self) {
        self.frame = None;
    }

    /// Copy a delivered frame in, replacing header and samples together.
    ///
    /// On allocation failure the cache keeps no frame at all.
    pub fn store_frame(
        &mut self,
        header: FrameHeader,
        channels: &[&[i32]],
    ) -> Result<(), TryReserveError> {
        self.frame = None;

        let mut samples = Vec::new();
        samples.try_reserve_exact(channels.len())?;
        for channel in channels {
            let mut copy = Vec::new();
            copy.try_reserve_exact(channel.len())?;
            copy.extend_from_slice(channel);
            samples.push(copy);
        }

        self.frame = Some(CachedFrame { header, samples });
        Ok(())
    }

    /// Hand the current frame to the caller, leaving the cache empty.
    pub fn take_frame(&mut self) -> Option<CachedFrame> {
        self.frame.take()
    }

    pub fn has_frame(&self) -> bool {
        self.frame.is_some()
    }

    /// Record a STREAMINFO block; a later block replaces an earlier one.
    pub fn store_info(&mut self, info: StreamInfo) {
        self.info = Some(info);
    }

    pub fn info(&self) -> Option<&StreamInfo> {
        self.info.as_ref()
    }
}
