// src/callbacks.rs

//! The callback table a `Decoder` installs into its engine.
//!
//! `CallbackContext` is the shared state behind the table: the frame cache the engine writes
//! into, and the read bridge it pulls bytes through. This decoder is strictly forward-only, so
//! the positional callbacks (seek / tell / length) always answer "unsupported" and `eof` always
//! answers "not yet"; the end of input is reported by `read` instead.

use tracing::{debug, error, warn};

use crate::engine::{
    ErrorStatus, FrameHeader, LengthStatus, MetadataBlock, ReadStatus, SeekStatus,
    StreamCallbacks, TellStatus, WriteStatus,
};
use crate::frame_cache::FrameCache;
use crate::read_bridge::ReadBridge;

pub struct CallbackContext {
    pub(crate) cache: FrameCache,
    pub(crate) bridge: ReadBridge,
    last_error: Option<ErrorStatus>,
    frames_written: u64,
}

impl CallbackContext {
    pub fn new(bridge: ReadBridge) -> Self {
        Self {
            cache: FrameCache::new(),
            bridge,
            last_error: None,
            frames_written: 0,
        }
    }

    /// Most recent payload of the `error` callback.
    pub fn last_error(&self) -> Option<ErrorStatus> {
        self.last_error
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl StreamCallbacks for CallbackContext {
    fn read(&mut self, buffer: &mut [u8]) -> ReadStatus {
        self.bridge.fill(buffer)
    }

    fn seek(&mut self, _absolute_byte_offset: u64) -> SeekStatus {
        SeekStatus::Unsupported
    }

    fn tell(&mut self) -> TellStatus {
        TellStatus::Unsupported
    }

    fn length(&mut self) -> LengthStatus {
        LengthStatus::Unsupported
    }

    fn eof(&mut self) -> bool {
        false
    }

    fn write(&mut self, header: &FrameHeader, channels: &[&[i32]]) -> WriteStatus {
        let block_size = header.block_size as usize;
        if channels.len() != header.channels as usize
            || channels.iter().any(|c| c.len() != block_size)
        {
            error!(
                channels = header.channels,
                block_size = header.block_size,
                delivered_channels = channels.len(),
                "engine delivered a frame that does not match its header"
            );
            return WriteStatus::Abort;
        }

        if let Err(err) = self.cache.store_frame(*header, channels) {
            error!(error = %err, "failed to copy decoded frame");
            return WriteStatus::Abort;
        }

        self.frames_written += 1;
        WriteStatus::Continue
    }

    fn metadata(&mut self, block: &MetadataBlock) {
        match block {
            MetadataBlock::StreamInfo(info) => {
                debug!(
                    sample_rate = info.sample_rate,
                    channels = info.channels,
                    bits_per_sample = info.bits_per_sample,
                    total_samples = info.total_samples,
                    "stream info"
                );
                self.cache.store_info(*info);
            }
            other => debug!(block = ?other, "ignoring metadata block"),
        }
    }

    fn error(&mut self, status: ErrorStatus) {
        warn!(?status, "decoder reported a stream error");
        self.last_error = Some(status);
    }
}
