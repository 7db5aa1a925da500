// src/engine/builtin.rs

//! The default engine: Symphonia's FLAC demuxer and decoder, driven through the callback table.
//!
//! Symphonia is pull-based: it reads from a `MediaSource` and hands back packets. We adapt it to
//! the push contract by making the `MediaSource` call the `read` / `seek` / `tell` / `length`
//! callbacks, and by pushing each decoded packet into `write`.
//!
//! Error policy follows the usual Symphonia decode loop:
//! - `DecodeError` on a frame → report it through `error`, skip the frame, keep going
//! - `IoError` → end of stream, or `Aborted` when a callback asked us to stop
//! - anything else → `Aborted`
//! - a gap in the frame sequence (the demuxer dropped a frame that failed its CRC) → reported
//!   through `error` as a CRC mismatch before the next frame is written

use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, Ordering};

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions, VerificationCheck};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Track};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::default::formats::FlacReader;
use tracing::{debug, warn};

use super::{
    ErrorStatus, FrameHeader, InitError, LengthStatus, MetadataBlock, ReadStatus, SeekStatus,
    SharedCallbacks, StreamEngine, StreamInfo, TellStatus, WriteStatus, with_callbacks,
};
use crate::state::raw;

/// Smallest read-ahead buffer Symphonia accepts comfortably.
const MIN_BUFFER_LEN: usize = 64 * 1024;

/// Symphonia refuses STREAMINFO block-size bounds below this, though FLAC allows them.
const MIN_BLOCK_BOUND: u16 = 16;

/// Stream bytes up to the end of the STREAMINFO block-size bounds.
const HEAD_LEN: usize = 12;

/// Stream decoder backed by Symphonia.
pub struct SymphoniaEngine {
    buffer_len: usize,
    state: u32,
    callbacks: Option<SharedCallbacks>,
    aborted: Arc<AtomicBool>,
    /// Set when the source had to widen the stream's block-size bounds.
    bounds: Arc<OnceLock<BlockBounds>>,
    stream: Option<OpenStream>,
    /// Per-frame sample planes, reused across frames.
    scratch: Vec<Vec<i32>>,
}

struct OpenStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    bits_per_sample: u32,
    /// First sample the next frame should start at.
    next_sample: u64,
}

/// STREAMINFO block-size bounds as written in the stream, and as handed to Symphonia.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockBounds {
    actual: (u16, u16),
    widened: (u16, u16),
}

impl BlockBounds {
    /// Undo the timestamp scaling Symphonia applies to fixed-blocksize streams, whose frames
    /// are numbered rather than positioned.
    fn first_sample(&self, ts: u64) -> u64 {
        let (min, max) = self.actual;
        let widened = u64::from(self.widened.0);
        if min == max && widened > 0 {
            ts / widened * u64::from(min)
        } else {
            ts
        }
    }
}

impl SymphoniaEngine {
    /// `buffer_len` is rounded up to a power of two of at least 64 KiB.
    pub fn new(buffer_len: usize) -> Self {
        let buffer_len = buffer_len
            .max(MIN_BUFFER_LEN)
            .checked_next_power_of_two()
            .unwrap_or(MIN_BUFFER_LEN);

        Self {
            buffer_len,
            state: raw::UNINITIALIZED,
            callbacks: None,
            aborted: Arc::new(AtomicBool::new(false)),
            bounds: Arc::new(OnceLock::new()),
            stream: None,
            scratch: Vec::new(),
        }
    }

    fn report(&self, status: ErrorStatus) {
        if let Some(callbacks) = &self.callbacks {
            with_callbacks(callbacks, |cb| cb.error(status));
        }
    }

    fn open(&mut self, callbacks: &SharedCallbacks) -> bool {
        let source = CallbackSource {
            callbacks: callbacks.clone(),
            aborted: self.aborted.clone(),
            bounds: self.bounds.clone(),
            head: Head::Unread,
        };
        let mss = MediaSourceStream::new(
            Box::new(source),
            MediaSourceStreamOptions {
                buffer_len: self.buffer_len,
            },
        );

        let format = match FlacReader::try_new(mss, &FormatOptions::default()) {
            Ok(format) => format,
            Err(SymphoniaError::IoError(err)) => {
                self.state = end_state(&self.aborted, &err);
                return self.state == raw::END_OF_STREAM;
            }
            Err(err) => {
                // Not a FLAC stream (or a broken one): nothing will ever sync.
                warn!(error = %err, "no decodable FLAC stream found");
                self.report(ErrorStatus::LostSync);
                self.state = raw::END_OF_STREAM;
                return true;
            }
        };

        let Some(track) = pick_track(format.tracks()).cloned() else {
            warn!("FLAC stream has no audio track");
            self.report(ErrorStatus::BadMetadata);
            self.state = raw::END_OF_STREAM;
            return true;
        };

        let decoder = match symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
        {
            Ok(decoder) => decoder,
            Err(err) => {
                warn!(error = %err, "failed to create FLAC decoder for track");
                self.report(ErrorStatus::UnparseableStream);
                self.state = raw::END_OF_STREAM;
                return true;
            }
        };

        let mut format: Box<dyn FormatReader> = Box::new(format);
        let bounds = self.bounds.get().copied();
        for block in metadata_blocks(&track, format.as_mut(), bounds) {
            if with_callbacks(callbacks, |cb| cb.metadata(&block)).is_none() {
                self.state = raw::ABORTED;
                return false;
            }
        }

        self.stream = Some(OpenStream {
            format,
            decoder,
            track_id: track.id,
            bits_per_sample: track.codec_params.bits_per_sample.unwrap_or(16),
            next_sample: 0,
        });
        self.state = raw::SEARCH_FOR_FRAME_SYNC;
        true
    }
}

impl StreamEngine for SymphoniaEngine {
    fn init_stream(&mut self, callbacks: SharedCallbacks) -> Result<(), InitError> {
        if self.callbacks.is_some() {
            return Err(InitError::AlreadyInitialized);
        }
        self.callbacks = Some(callbacks);
        self.aborted.store(false, Ordering::SeqCst);
        self.state = raw::SEARCH_FOR_METADATA;
        Ok(())
    }

    fn process_until_end_of_metadata(&mut self) -> bool {
        if self.state != raw::SEARCH_FOR_METADATA {
            return !matches!(self.state, raw::UNINITIALIZED | raw::ABORTED);
        }
        let Some(callbacks) = self.callbacks.clone() else {
            return false;
        };

        self.state = raw::READ_METADATA;
        self.open(&callbacks)
    }

    fn process_single(&mut self) -> bool {
        if self.state == raw::SEARCH_FOR_METADATA && !self.process_until_end_of_metadata() {
            return false;
        }
        if self.state != raw::SEARCH_FOR_FRAME_SYNC {
            return self.state == raw::END_OF_STREAM;
        }
        let (Some(callbacks), Some(stream)) = (self.callbacks.clone(), self.stream.as_mut())
        else {
            return false;
        };
        let bounds = self.bounds.get().copied();

        loop {
            let packet = match stream.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err)) => {
                    self.state = end_state(&self.aborted, &err);
                    return self.state == raw::END_OF_STREAM;
                }
                Err(SymphoniaError::DecodeError(msg)) => {
                    warn!(error = msg, "lost frame sync");
                    with_callbacks(&callbacks, |cb| cb.error(ErrorStatus::LostSync));
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "demuxer failure");
                    self.state = raw::ABORTED;
                    return false;
                }
            };

            if packet.track_id() != stream.track_id {
                continue;
            }

            self.state = raw::READ_FRAME;
            let first_sample = bounds.map_or(packet.ts(), |b| b.first_sample(packet.ts()));
            let decoded = match stream.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    // Recoverable: drop the corrupted frame and keep going.
                    warn!(error = msg, first_sample, "skipping undecodable frame");
                    with_callbacks(&callbacks, |cb| cb.error(ErrorStatus::FrameCrcMismatch));
                    stream.next_sample = first_sample + packet.dur();
                    self.state = raw::SEARCH_FOR_FRAME_SYNC;
                    continue;
                }
                Err(SymphoniaError::IoError(err)) => {
                    self.state = end_state(&self.aborted, &err);
                    return self.state == raw::END_OF_STREAM;
                }
                Err(err) => {
                    warn!(error = %err, "decoder failure");
                    self.state = raw::ABORTED;
                    return false;
                }
            };

            let AudioBufferRef::S32(buf) = decoded else {
                warn!(first_sample, "decoder produced a non-integer buffer; skipping frame");
                with_callbacks(&callbacks, |cb| cb.error(ErrorStatus::UnparseableStream));
                self.state = raw::SEARCH_FOR_FRAME_SYNC;
                continue;
            };

            // Samples come out left-justified in 32 bits; shift them back to their real width.
            let shift = 32u32.saturating_sub(stream.bits_per_sample);
            let channels = buf.spec().channels.count();
            self.scratch.resize_with(channels, Vec::new);
            for (ch, plane) in self.scratch.iter_mut().enumerate() {
                plane.clear();
                plane.extend(buf.chan(ch).iter().map(|&s| s >> shift));
            }

            if first_sample > stream.next_sample {
                warn!(
                    expected = stream.next_sample,
                    first_sample, "frames dropped before this one"
                );
                with_callbacks(&callbacks, |cb| cb.error(ErrorStatus::FrameCrcMismatch));
            }
            stream.next_sample = first_sample + buf.frames() as u64;

            let header = FrameHeader {
                channels: channels as u32,
                block_size: buf.frames() as u32,
                bits_per_sample: stream.bits_per_sample,
                sample_rate: buf.spec().rate,
                first_sample,
            };
            let planes: Vec<&[i32]> = self.scratch.iter().map(Vec::as_slice).collect();
            let status = with_callbacks(&callbacks, |cb| cb.write(&header, &planes));

            if status != Some(WriteStatus::Continue) {
                debug!(first_sample, "write callback aborted decoding");
                self.state = raw::ABORTED;
                return false;
            }

            self.state = raw::SEARCH_FOR_FRAME_SYNC;
            return true;
        }
    }

    fn raw_state(&self) -> u32 {
        self.state
    }

    fn finish(&mut self) {
        self.stream = None;
        self.callbacks = None;
        self.scratch = Vec::new();
        self.state = raw::UNINITIALIZED;
    }
}

/// Terminal state for an I/O failure from Symphonia: a callback abort, or just the end of input.
fn end_state(aborted: &AtomicBool, err: &io::Error) -> u32 {
    if aborted.load(Ordering::SeqCst) {
        debug!(error = %err, "input aborted by a callback");
        raw::ABORTED
    } else {
        debug!(error = %err, "input exhausted");
        raw::END_OF_STREAM
    }
}

/// First track that looks decodable.
fn pick_track(tracks: &[Track]) -> Option<&Track> {
    tracks
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
}

/// Rebuild the leading metadata blocks from what the demuxer parsed.
fn metadata_blocks(
    track: &Track,
    format: &mut dyn FormatReader,
    bounds: Option<BlockBounds>,
) -> Vec<MetadataBlock> {
    let params = &track.codec_params;
    let max_block_size = params.max_frames_per_packet.unwrap_or(0) as u32;

    // STREAMINFO starts with the min / max block sizes as big-endian u16.
    let (min_block_size, max_block_size) = match (bounds, params.extra_data.as_deref()) {
        (Some(BlockBounds { actual, .. }), _) => (u32::from(actual.0), u32::from(actual.1)),
        (None, Some([a, b, c, d, ..])) => (
            u32::from(u16::from_be_bytes([*a, *b])),
            u32::from(u16::from_be_bytes([*c, *d])),
        ),
        (None, _) => (max_block_size, max_block_size),
    };

    let md5 = match params.verification_check {
        Some(VerificationCheck::Md5(md5)) => md5,
        _ => [0; 16],
    };

    let mut blocks = vec![MetadataBlock::StreamInfo(StreamInfo {
        sample_rate: params.sample_rate.unwrap_or(0),
        channels: params.channels.map_or(0, |c| c.count() as u32),
        bits_per_sample: params.bits_per_sample.unwrap_or(0),
        total_samples: params.n_frames.unwrap_or(0),
        md5,
        min_block_size,
        max_block_size,
    })];

    let mut metadata = format.metadata();
    if let Some(rev) = metadata.skip_to_latest() {
        if !rev.tags().is_empty() {
            blocks.push(MetadataBlock::VorbisComment(
                rev.tags()
                    .iter()
                    .map(|tag| (tag.key.clone(), tag.value.to_string()))
                    .collect(),
            ));
        }
        blocks.extend(rev.visuals().iter().map(|visual| MetadataBlock::Picture {
            media_type: visual.media_type.clone(),
            data_len: visual.data.len(),
        }));
    }

    blocks
}

/// Raise STREAMINFO block-size bounds Symphonia would refuse, in place.
///
/// Returns the bounds before and after when `head` needed it. Equal bounds stay equal and
/// unequal ones stay unequal, so the demuxer keeps the stream's blocking strategy.
fn widen_block_bounds(head: &mut [u8]) -> Option<BlockBounds> {
    let [b'f', b'L', b'a', b'C', kind, _, _, _, min_hi, min_lo, max_hi, max_lo] = *head else {
        return None;
    };
    // Block type 0 is STREAMINFO; the top bit only flags the last metadata block.
    if kind & 0x7F != 0 {
        return None;
    }

    let min = u16::from_be_bytes([min_hi, min_lo]);
    let max = u16::from_be_bytes([max_hi, max_lo]);
    if min >= MIN_BLOCK_BOUND && max >= MIN_BLOCK_BOUND {
        return None;
    }

    let mut wide_max = max.max(MIN_BLOCK_BOUND);
    let wide_min = if min == max {
        wide_max
    } else {
        min.clamp(MIN_BLOCK_BOUND, wide_max)
    };
    if min != max && wide_min == wide_max {
        wide_max += 1;
    }

    head[8..10].copy_from_slice(&wide_min.to_be_bytes());
    head[10..12].copy_from_slice(&wide_max.to_be_bytes());
    Some(BlockBounds {
        actual: (min, max),
        widened: (wide_min, wide_max),
    })
}

/// Where `CallbackSource` is with the first `HEAD_LEN` bytes of the stream.
enum Head {
    Unread,
    Buffered(Cursor<Vec<u8>>),
    Passed,
}

/// `MediaSource` that pulls through the callback table.
struct CallbackSource {
    callbacks: SharedCallbacks,
    aborted: Arc<AtomicBool>,
    bounds: Arc<OnceLock<BlockBounds>>,
    head: Head,
}

impl CallbackSource {
    fn abort(&self, what: &str) -> io::Error {
        self.aborted.store(true, Ordering::SeqCst);
        io::Error::other(format!("{what} callback aborted decoding"))
    }

    /// Buffer the stream head and widen its block-size bounds before Symphonia sees them.
    fn load_head(&mut self) -> io::Result<()> {
        let mut head = vec![0; HEAD_LEN];
        let mut filled = 0;
        while filled < HEAD_LEN {
            match self.pull(&mut head[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        head.truncate(filled);

        if let Some(bounds) = widen_block_bounds(&mut head) {
            debug!(?bounds, "widened STREAMINFO block-size bounds");
            let _ = self.bounds.set(bounds);
        }
        self.head = Head::Buffered(Cursor::new(head));
        Ok(())
    }

    /// Head bytes pulled from the callbacks but not yet handed out.
    fn buffered(&self) -> u64 {
        match &self.head {
            Head::Buffered(cursor) => cursor.get_ref().len() as u64 - cursor.position(),
            Head::Unread | Head::Passed => 0,
        }
    }

    fn pull(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let status = with_callbacks(&self.callbacks, |cb| {
            if cb.eof() {
                ReadStatus::EndOfStream
            } else {
                cb.read(buf)
            }
        });

        match status {
            Some(ReadStatus::Continue(n)) => Ok(n.min(buf.len())),
            Some(ReadStatus::EndOfStream) => Ok(0),
            Some(ReadStatus::Abort) | None => Err(self.abort("read")),
        }
    }
}

impl Read for CallbackSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if matches!(self.head, Head::Unread) {
            self.load_head()?;
        }
        if let Head::Buffered(cursor) = &mut self.head {
            let n = cursor.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            self.head = Head::Passed;
        }
        self.pull(buf)
    }
}

impl Seek for CallbackSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let unsupported = || io::Error::new(io::ErrorKind::Unsupported, "stream is not seekable");

        match pos {
            SeekFrom::Start(offset) => {
                match with_callbacks(&self.callbacks, |cb| cb.seek(offset)) {
                    Some(SeekStatus::Ok) => {
                        self.head = Head::Passed;
                        Ok(offset)
                    }
                    Some(SeekStatus::Unsupported) => Err(unsupported()),
                    Some(SeekStatus::Error) => Err(io::Error::other("seek callback failed")),
                    None => Err(self.abort("seek")),
                }
            }
            SeekFrom::Current(0) => match with_callbacks(&self.callbacks, |cb| cb.tell()) {
                Some(TellStatus::Ok(pos)) => Ok(pos.saturating_sub(self.buffered())),
                Some(TellStatus::Unsupported) => Err(unsupported()),
                Some(TellStatus::Error) => Err(io::Error::other("tell callback failed")),
                None => Err(self.abort("tell")),
            },
            _ => Err(unsupported()),
        }
    }
}

impl MediaSource for CallbackSource {
    fn is_seekable(&self) -> bool {
        matches!(
            with_callbacks(&self.callbacks, |cb| cb.tell()),
            Some(TellStatus::Ok(_))
        )
    }

    fn byte_len(&self) -> Option<u64> {
        match with_callbacks(&self.callbacks, |cb| cb.length()) {
            Some(LengthStatus::Ok(len)) => Some(len),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::engine::StreamCallbacks;

    /// Callback table over an in-memory byte slice that records what it receives.
    #[derive(Default)]
    struct Collect {
        input: Vec<u8>,
        pos: usize,
        frames: Vec<(FrameHeader, Vec<Vec<i32>>)>,
        blocks: Vec<MetadataBlock>,
        errors: Vec<ErrorStatus>,
    }

    impl StreamCallbacks for Collect {
        fn read(&mut self, buffer: &mut [u8]) -> ReadStatus {
            let n = buffer.len().min(self.input.len() - self.pos);
            if n == 0 {
                return ReadStatus::EndOfStream;
            }
            buffer[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
            self.pos += n;
            ReadStatus::Continue(n)
        }
        fn seek(&mut self, _offset: u64) -> SeekStatus {
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
            self.frames
                .push((*header, channels.iter().map(|c| c.to_vec()).collect()));
            WriteStatus::Continue
        }
        fn metadata(&mut self, block: &MetadataBlock) {
            self.blocks.push(block.clone());
        }
        fn error(&mut self, status: ErrorStatus) {
            self.errors.push(status);
        }
    }

    fn engine_over(input: Vec<u8>) -> (SymphoniaEngine, Arc<Mutex<Collect>>) {
        let collect = Arc::new(Mutex::new(Collect {
            input,
            ..Collect::default()
        }));
        let mut engine = SymphoniaEngine::new(0);
        engine
            .init_stream(collect.clone())
            .expect("fresh engine initializes");
        (engine, collect)
    }

    #[test]
    fn buffer_len_is_a_large_power_of_two() {
        assert_eq!(SymphoniaEngine::new(0).buffer_len, 64 * 1024);
        assert_eq!(SymphoniaEngine::new(100_000).buffer_len, 128 * 1024);
        assert_eq!(SymphoniaEngine::new(256 * 1024).buffer_len, 256 * 1024);
    }

    #[test]
    fn init_twice_is_refused() {
        let (mut engine, collect) = engine_over(Vec::new());
        assert_eq!(
            engine.init_stream(collect),
            Err(InitError::AlreadyInitialized)
        );
    }

    #[test]
    fn empty_input_ends_the_stream() {
        let (mut engine, collect) = engine_over(Vec::new());
        assert!(engine.process_until_end_of_metadata());
        assert_eq!(engine.raw_state(), raw::END_OF_STREAM);
        assert!(collect.lock().unwrap().blocks.is_empty());

        // Nothing left to step.
        assert!(engine.process_single());
        assert_eq!(engine.raw_state(), raw::END_OF_STREAM);
    }

    #[test]
    fn garbage_input_reports_lost_sync() {
        let (mut engine, collect) = engine_over(b"RIFF this is not flac at all".to_vec());
        engine.process_until_end_of_metadata();

        assert_eq!(engine.raw_state(), raw::END_OF_STREAM);
        let collect = collect.lock().unwrap();
        assert!(collect.blocks.is_empty());
        assert_eq!(collect.errors, vec![ErrorStatus::LostSync]);
    }

    fn head(min: u16, max: u16) -> Vec<u8> {
        let mut head = b"fLaC\x80\x00\x00\x22".to_vec();
        head.extend_from_slice(&min.to_be_bytes());
        head.extend_from_slice(&max.to_be_bytes());
        head
    }

    #[test]
    fn small_block_bounds_are_widened() {
        let mut fixed = head(2, 2);
        let bounds = widen_block_bounds(&mut fixed).expect("widened");
        assert_eq!(bounds.actual, (2, 2));
        assert_eq!(bounds.widened, (16, 16));
        assert_eq!(&fixed[8..], &[0, 16, 0, 16]);

        let mut variable = head(4, 12);
        let bounds = widen_block_bounds(&mut variable).expect("widened");
        assert_eq!(bounds.widened, (16, 17));

        let mut mixed = head(8, 4096);
        let bounds = widen_block_bounds(&mut mixed).expect("widened");
        assert_eq!(bounds.widened, (16, 4096));
    }

    #[test]
    fn acceptable_or_foreign_heads_are_left_alone() {
        let mut normal = head(4096, 4096);
        assert_eq!(widen_block_bounds(&mut normal), None);
        assert_eq!(normal, head(4096, 4096));

        // Not STREAMINFO first.
        let mut other = head(2, 2);
        other[4] = 0x04;
        assert_eq!(widen_block_bounds(&mut other), None);

        let mut short = b"fLaC\x00".to_vec();
        assert_eq!(widen_block_bounds(&mut short), None);
    }

    #[test]
    fn fixed_stream_timestamps_are_rescaled() {
        let fixed = BlockBounds {
            actual: (2, 2),
            widened: (16, 16),
        };
        assert_eq!(fixed.first_sample(0), 0);
        assert_eq!(fixed.first_sample(16), 2);
        assert_eq!(fixed.first_sample(48), 6);

        let variable = BlockBounds {
            actual: (4, 12),
            widened: (16, 17),
        };
        assert_eq!(variable.first_sample(20), 20);
    }

    #[test]
    fn tell_excludes_buffered_head_bytes() {
        struct Tell(u64);
        impl StreamCallbacks for Tell {
            fn read(&mut self, buffer: &mut [u8]) -> ReadStatus {
                buffer.fill(0);
                self.0 += buffer.len() as u64;
                ReadStatus::Continue(buffer.len())
            }
            fn seek(&mut self, _offset: u64) -> SeekStatus {
                SeekStatus::Unsupported
            }
            fn tell(&mut self) -> TellStatus {
                TellStatus::Ok(self.0)
            }
            fn length(&mut self) -> LengthStatus {
                LengthStatus::Unsupported
            }
            fn eof(&mut self) -> bool {
                false
            }
            fn write(&mut self, _header: &FrameHeader, _channels: &[&[i32]]) -> WriteStatus {
                WriteStatus::Continue
            }
            fn metadata(&mut self, _block: &MetadataBlock) {}
            fn error(&mut self, _status: ErrorStatus) {}
        }

        let mut source = CallbackSource {
            callbacks: Arc::new(Mutex::new(Tell(0))),
            aborted: Arc::new(AtomicBool::new(false)),
            bounds: Arc::new(OnceLock::new()),
            head: Head::Unread,
        };
        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(source.stream_position().unwrap(), 4);
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(source.stream_position().unwrap(), 12);
    }

    #[test]
    fn finish_returns_to_uninitialized() {
        let (mut engine, _collect) = engine_over(Vec::new());
        engine.process_until_end_of_metadata();
        engine.finish();
        assert_eq!(engine.raw_state(), raw::UNINITIALIZED);
        assert!(!engine.process_single());
    }
}
