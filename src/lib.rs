//! `flac-pull`: a pull-style, frame-at-a-time API over callback-driven FLAC stream decoders.
//!
//! FLAC stream decoders such as libFLAC are push-based: you install callbacks, and the
//! decoder calls them to ask for input bytes and to deliver decoded frames. This crate turns
//! that inside out:
//! - you supply a read function ("give me up to N bytes")
//! - you call `Decoder::read_frame` / `Decoder::read_pcm` and get exactly one frame back
//! - you poll `Decoder::state` to learn whether the stream ended or failed
//!
//! The default engine is Symphonia's FLAC decoder. With the `libflac` feature, the system
//! libFLAC can be plugged in instead through the same `StreamEngine` seam.
//!
//! ```no_run
//! use std::fs::File;
//! use flac_pull::{Decoder, DecoderState, ReaderSource};
//!
//! # fn main() -> flac_pull::Result<()> {
//! let mut decoder = Decoder::create(ReaderSource::new(File::open("song.flac")?))?;
//! let info = decoder.info()?;
//! println!("{} Hz, {} channels", info.sample_rate, info.channels);
//!
//! while let Some(frame) = decoder.read_frame()? {
//!     println!("{} samples", frame.block_size());
//! }
//! assert_eq!(decoder.state(), DecoderState::EndOfStream);
//! # Ok(())
//! # }
//! ```

// High-level API (most consumers should start here).
pub mod decoder;
pub mod opts;

// Stream-facing types and conversions.
pub mod pcm;
pub mod state;

// Engine contract and implementations.
pub mod engine;

// Plumbing between the handle and its engine.
pub mod callbacks;
pub mod frame_cache;
pub mod read_bridge;
pub mod runtime;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

mod error;

pub use decoder::{Decoder, DecoderBuilder, Frames};
pub use engine::{ErrorStatus, FrameHeader, StreamInfo};
pub use error::{Error, Result};
pub use opts::{DecoderOpts, PcmPolicy};
pub use pcm::SampleFrame;
pub use read_bridge::{ByteSource, Chunk, ReaderSource};
pub use runtime::{HostRuntime, NoRuntime};
pub use state::DecoderState;
