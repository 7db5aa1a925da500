// src/decoder.rs

//! The pull-style decoder handle.
//!
//! A `Decoder` owns one engine and the callback context installed into it. The engine pushes
//! (it calls us); the handle pulls (the caller asks for one frame at a time):
//! - `create` runs the engine through the leading metadata, so `info` is ready right away
//! - every `read_frame` / `read_pcm` runs exactly one `process_single`, during which the
//!   engine pulls bytes through the read function and pushes at most one frame into the cache
//! - problems inside the engine are not errors of the step: poll `state` (and optionally
//!   `last_error`) after each call
//!
//! Current mode: **forward-only**. Seeking is not offered, and the engine is told so.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::callbacks::CallbackContext;
use crate::engine::builtin::SymphoniaEngine;
use crate::engine::{ErrorStatus, SharedCallbacks, StreamEngine, StreamInfo};
use crate::error::{Error, Result};
use crate::frame_cache::CachedFrame;
use crate::opts::DecoderOpts;
use crate::pcm::{self, SampleFrame};
use crate::read_bridge::{ByteSource, ReadBridge};
use crate::runtime::{HostRuntime, UnmanagedRegion, no_runtime};
use crate::state::DecoderState;

/// Handle over one engine instance.
///
/// Operations take `&mut self`, so one handle is never driven from two threads at once.
/// The handle is `Send` and can move to a dedicated decode thread.
pub struct Decoder {
    engine: Box<dyn StreamEngine>,
    callbacks: Arc<Mutex<CallbackContext>>,
    runtime: Arc<dyn HostRuntime>,
    opts: DecoderOpts,
}

/// Configures and creates a `Decoder`.
pub struct DecoderBuilder {
    source: Box<dyn ByteSource>,
    engine: Option<Box<dyn StreamEngine>>,
    runtime: Arc<dyn HostRuntime>,
    opts: DecoderOpts,
}

impl DecoderBuilder {
    /// Use this engine instead of the built-in `SymphoniaEngine`.
    pub fn engine(mut self, engine: Box<dyn StreamEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Release / re-acquire this runtime around engine calls.
    pub fn runtime(mut self, runtime: Arc<dyn HostRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn opts(mut self, opts: DecoderOpts) -> Self {
        self.opts = opts;
        self
    }

    /// Construct the engine, install the callback table and process the leading metadata.
    ///
    /// Fails only when the engine cannot be constructed or initialized. A stream that turns
    /// out to be empty, truncated or not FLAC at all still yields a handle; its `state` tells
    /// what happened and `info` reports `Error::OutOfSync`.
    pub fn build(self) -> Result<Decoder> {
        let mut engine = match self.engine {
            Some(engine) => engine,
            None => Box::new(SymphoniaEngine::new(self.opts.buffer_len)),
        };

        let bridge = ReadBridge::new(self.source, self.runtime.clone());
        let callbacks = Arc::new(Mutex::new(CallbackContext::new(bridge)));
        let shared: SharedCallbacks = callbacks.clone();

        engine
            .init_stream(shared)
            .map_err(|e| Error::Allocation(format!("failed to initialize stream decoder: {e}")))?;

        let mut decoder = Decoder {
            engine,
            callbacks,
            runtime: self.runtime,
            opts: self.opts,
        };
        decoder.process_metadata()?;
        Ok(decoder)
    }
}

impl Decoder {
    /// Create a decoder over `source` with the built-in engine and default options.
    pub fn create(source: impl ByteSource + 'static) -> Result<Self> {
        Self::builder(source).build()
    }

    pub fn builder(source: impl ByteSource + 'static) -> DecoderBuilder {
        DecoderBuilder {
            source: Box::new(source),
            engine: None,
            runtime: no_runtime(),
            opts: DecoderOpts::default(),
        }
    }

    /// The engine's state right now. Not cached; calling it twice without decoding in
    /// between returns the same value.
    pub fn state(&self) -> DecoderState {
        DecoderState::from_raw(self.engine.raw_state())
    }

    /// Stream info from the most recent STREAMINFO block.
    pub fn info(&self) -> Result<StreamInfo> {
        self.context()?
            .cache
            .info()
            .copied()
            .ok_or(Error::OutOfSync)
    }

    /// Most recent non-fatal problem the engine reported, for diagnostics.
    pub fn last_error(&self) -> Option<ErrorStatus> {
        self.context().ok().and_then(|ctx| ctx.last_error())
    }

    pub fn opts(&self) -> &DecoderOpts {
        &self.opts
    }

    /// Decode the next frame as planar `f64` samples equal to the decoded integers.
    ///
    /// - `Ok(Some(frame))` → one new frame, `[channels][block_size]`
    /// - `Ok(None)` → no frame this step; `state` says whether the stream ended or failed
    /// - `Err(Error::Source(_))` → the read function failed (state is then `Aborted`)
    pub fn read_frame(&mut self) -> Result<Option<SampleFrame>> {
        Ok(self.step()?.map(SampleFrame::from))
    }

    /// Decode the next frame as interleaved S16LE bytes.
    ///
    /// Same stepping contract as `read_frame`. Streams that are not 16-bit are handled per
    /// `DecoderOpts::pcm_policy`; under `PcmPolicy::Strict` the frame is consumed and
    /// `Error::UnsupportedBitDepth` is returned.
    pub fn read_pcm(&mut self) -> Result<Option<Vec<u8>>> {
        let policy = self.opts.pcm_policy;
        self.step()?
            .map(|frame| pcm::to_s16le(&frame, policy))
            .transpose()
    }

    /// Iterate over the remaining frames until the stream ends or fails.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { decoder: self }
    }

    /// Tear the decoder down: engine, cached buffers and the read function.
    ///
    /// Dropping the handle does the same; this just makes the point explicit.
    pub fn destroy(self) {
        debug!("destroying decoder");
        drop(self);
    }

    fn process_metadata(&mut self) -> Result<()> {
        let ok = {
            let _region = UnmanagedRegion::enter(self.runtime.as_ref());
            self.engine.process_until_end_of_metadata()
        };

        let ctx = self.context()?;
        let state = self.state();
        debug!(
            ok,
            %state,
            has_info = ctx.cache.info().is_some(),
            bytes = ctx.bridge.total_bytes(),
            "processed leading metadata"
        );
        if !ok || state.is_error() {
            warn!(%state, "stream decoder stopped while reading metadata");
        }
        Ok(())
    }

    /// Run one decode step and hand back the frame it produced, if any.
    fn step(&mut self) -> Result<Option<CachedFrame>> {
        // A read failure during `create` is reported by the first step after it.
        if let Some(err) = self.context()?.bridge.take_failure() {
            return Err(Error::Source(err));
        }

        let state = self.state();
        if state.is_terminal() {
            debug!(%state, "decoder finished; not stepping");
            return Ok(None);
        }

        self.context()?.cache.begin_step();
        let ok = {
            let _region = UnmanagedRegion::enter(self.runtime.as_ref());
            self.engine.process_single()
        };

        let mut ctx = self.context()?;
        if let Some(err) = ctx.bridge.take_failure() {
            return Err(Error::Source(err));
        }

        let frame = ctx.cache.take_frame();
        match &frame {
            Some(frame) => debug!(
                first_sample = frame.header.first_sample,
                block_size = frame.header.block_size,
                "decoded frame"
            ),
            None => debug!(ok, state = %self.state(), "decode step produced no frame"),
        }
        Ok(frame)
    }

    fn context(&self) -> Result<MutexGuard<'_, CallbackContext>> {
        self.callbacks.lock().map_err(|_| Error::Poisoned)
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.engine.finish();
        if let Ok(ctx) = self.callbacks.lock() {
            debug!(
                frames = ctx.frames_written(),
                bytes = ctx.bridge.total_bytes(),
                "decoder released"
            );
        }
    }
}

/// Iterator over the remaining frames of a `Decoder`.
pub struct Frames<'a> {
    decoder: &'a mut Decoder,
}

impl Iterator for Frames<'_> {
    type Item = Result<SampleFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.read_frame().transpose()
    }
}
