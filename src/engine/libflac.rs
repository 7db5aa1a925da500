// src/engine/libflac.rs

//! Engine backed by the system libFLAC (`FLAC__StreamDecoder`), enabled with the `libflac`
//! feature.
//!
//! The callback table lives behind a boxed `SharedCallbacks` whose address is libFLAC's
//! `client_data`. Every trampoline catches panics: unwinding into C is undefined behaviour, so a
//! panicking callback is answered with the protocol's "abort" status instead.

use std::ffi::c_void;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr::NonNull;

use tracing::error;

use super::{
    ErrorStatus, FrameHeader, InitError, LengthStatus, MetadataBlock, ReadStatus, SeekStatus,
    SharedCallbacks, StreamCallbacks, StreamEngine, StreamInfo, TellStatus, WriteStatus,
    with_callbacks,
};
use crate::error::Error;
use crate::state::raw;

#[allow(non_camel_case_types, non_snake_case, dead_code)]
mod ffi {
    use std::ffi::{c_int, c_uint, c_void};

    pub type FLAC__bool = c_int;

    #[repr(C)]
    pub struct FLAC__StreamDecoder {
        _private: [u8; 0],
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    pub union FLAC__FrameNumber {
        pub frame_number: u32,
        pub sample_number: u64,
    }

    pub const FLAC__FRAME_NUMBER_TYPE_FRAME_NUMBER: c_int = 0;
    pub const FLAC__FRAME_NUMBER_TYPE_SAMPLE_NUMBER: c_int = 1;

    #[repr(C)]
    pub struct FLAC__FrameHeader {
        pub blocksize: c_uint,
        pub sample_rate: c_uint,
        pub channels: c_uint,
        pub channel_assignment: c_int,
        pub bits_per_sample: c_uint,
        pub number_type: c_int,
        pub number: FLAC__FrameNumber,
        pub crc: u8,
    }

    /// Only the header is read; subframes and footer follow it in C.
    #[repr(C)]
    pub struct FLAC__Frame {
        pub header: FLAC__FrameHeader,
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    pub struct FLAC__StreamMetadata_StreamInfo {
        pub min_blocksize: c_uint,
        pub max_blocksize: c_uint,
        pub min_framesize: c_uint,
        pub max_framesize: c_uint,
        pub sample_rate: c_uint,
        pub channels: c_uint,
        pub bits_per_sample: c_uint,
        pub total_samples: u64,
        pub md5sum: [u8; 16],
    }

    pub const FLAC__METADATA_TYPE_STREAMINFO: c_int = 0;

    /// Header of `FLAC__StreamMetadata`. The payload union is only read as STREAMINFO, and only
    /// when `type_` says so.
    #[repr(C)]
    pub struct FLAC__StreamMetadata {
        pub type_: c_int,
        pub is_last: FLAC__bool,
        pub length: c_uint,
        pub stream_info: FLAC__StreamMetadata_StreamInfo,
    }

    pub const READ_CONTINUE: c_int = 0;
    pub const READ_END_OF_STREAM: c_int = 1;
    pub const READ_ABORT: c_int = 2;

    pub const SEEK_OK: c_int = 0;
    pub const SEEK_ERROR: c_int = 1;
    pub const SEEK_UNSUPPORTED: c_int = 2;

    pub const TELL_OK: c_int = 0;
    pub const TELL_ERROR: c_int = 1;
    pub const TELL_UNSUPPORTED: c_int = 2;

    pub const LENGTH_OK: c_int = 0;
    pub const LENGTH_ERROR: c_int = 1;
    pub const LENGTH_UNSUPPORTED: c_int = 2;

    pub const WRITE_CONTINUE: c_int = 0;
    pub const WRITE_ABORT: c_int = 1;

    pub const INIT_OK: c_int = 0;
    pub const INIT_UNSUPPORTED_CONTAINER: c_int = 1;
    pub const INIT_INVALID_CALLBACKS: c_int = 2;
    pub const INIT_MEMORY_ALLOCATION_ERROR: c_int = 3;
    pub const INIT_ALREADY_INITIALIZED: c_int = 5;

    pub type ReadCallback = unsafe extern "C" fn(
        decoder: *const FLAC__StreamDecoder,
        buffer: *mut u8,
        bytes: *mut usize,
        client_data: *mut c_void,
    ) -> c_int;
    pub type SeekCallback = unsafe extern "C" fn(
        decoder: *const FLAC__StreamDecoder,
        absolute_byte_offset: u64,
        client_data: *mut c_void,
    ) -> c_int;
    pub type TellCallback = unsafe extern "C" fn(
        decoder: *const FLAC__StreamDecoder,
        absolute_byte_offset: *mut u64,
        client_data: *mut c_void,
    ) -> c_int;
    pub type LengthCallback = unsafe extern "C" fn(
        decoder: *const FLAC__StreamDecoder,
        stream_length: *mut u64,
        client_data: *mut c_void,
    ) -> c_int;
    pub type EofCallback = unsafe extern "C" fn(
        decoder: *const FLAC__StreamDecoder,
        client_data: *mut c_void,
    ) -> FLAC__bool;
    pub type WriteCallback = unsafe extern "C" fn(
        decoder: *const FLAC__StreamDecoder,
        frame: *const FLAC__Frame,
        buffer: *const *const i32,
        client_data: *mut c_void,
    ) -> c_int;
    pub type MetadataCallback = unsafe extern "C" fn(
        decoder: *const FLAC__StreamDecoder,
        metadata: *const FLAC__StreamMetadata,
        client_data: *mut c_void,
    );
    pub type ErrorCallback = unsafe extern "C" fn(
        decoder: *const FLAC__StreamDecoder,
        status: c_int,
        client_data: *mut c_void,
    );

    #[link(name = "FLAC")]
    unsafe extern "C" {
        pub fn FLAC__stream_decoder_new() -> *mut FLAC__StreamDecoder;
        pub fn FLAC__stream_decoder_delete(decoder: *mut FLAC__StreamDecoder);
        pub fn FLAC__stream_decoder_init_stream(
            decoder: *mut FLAC__StreamDecoder,
            read_callback: Option<ReadCallback>,
            seek_callback: Option<SeekCallback>,
            tell_callback: Option<TellCallback>,
            length_callback: Option<LengthCallback>,
            eof_callback: Option<EofCallback>,
            write_callback: Option<WriteCallback>,
            metadata_callback: Option<MetadataCallback>,
            error_callback: Option<ErrorCallback>,
            client_data: *mut c_void,
        ) -> c_int;
        pub fn FLAC__stream_decoder_process_until_end_of_metadata(
            decoder: *mut FLAC__StreamDecoder,
        ) -> FLAC__bool;
        pub fn FLAC__stream_decoder_process_single(decoder: *mut FLAC__StreamDecoder)
        -> FLAC__bool;
        pub fn FLAC__stream_decoder_get_state(decoder: *const FLAC__StreamDecoder) -> c_int;
        pub fn FLAC__stream_decoder_finish(decoder: *mut FLAC__StreamDecoder) -> FLAC__bool;
    }
}

/// Stream decoder backed by libFLAC.
pub struct LibFlacEngine {
    raw: NonNull<ffi::FLAC__StreamDecoder>,
    /// `client_data` handed to libFLAC; owned here and freed after `finish`.
    client: Option<NonNull<SharedCallbacks>>,
}

// SAFETY: a libFLAC decoder has no thread affinity. It is only touched through `&mut self`,
// and the callback table it calls into is itself `Send`.
unsafe impl Send for LibFlacEngine {}

impl LibFlacEngine {
    pub fn new() -> Result<Self, Error> {
        // SAFETY: plain constructor; null means allocation failure.
        let raw = unsafe { ffi::FLAC__stream_decoder_new() };
        let raw = NonNull::new(raw)
            .ok_or_else(|| Error::Allocation("FLAC__stream_decoder_new returned null".into()))?;
        Ok(Self { raw, client: None })
    }

    fn release_client(&mut self) {
        if let Some(client) = self.client.take() {
            // SAFETY: produced by `Box::into_raw` in `init_stream`; libFLAC no longer holds it.
            drop(unsafe { Box::from_raw(client.as_ptr()) });
        }
    }
}

impl StreamEngine for LibFlacEngine {
    fn init_stream(&mut self, callbacks: SharedCallbacks) -> Result<(), InitError> {
        if self.client.is_some() {
            return Err(InitError::AlreadyInitialized);
        }

        let client = NonNull::from(Box::leak(Box::new(callbacks)));
        // SAFETY: `raw` is a live decoder; `client` outlives it being initialized.
        let status = unsafe {
            ffi::FLAC__stream_decoder_init_stream(
                self.raw.as_ptr(),
                Some(read_cb),
                Some(seek_cb),
                Some(tell_cb),
                Some(length_cb),
                Some(eof_cb),
                Some(write_cb),
                Some(metadata_cb),
                Some(error_cb),
                client.as_ptr().cast::<c_void>(),
            )
        };
        self.client = Some(client);

        match status {
            ffi::INIT_OK => Ok(()),
            other => {
                self.release_client();
                Err(match other {
                    ffi::INIT_UNSUPPORTED_CONTAINER => InitError::UnsupportedContainer,
                    ffi::INIT_INVALID_CALLBACKS => InitError::InvalidCallbacks,
                    ffi::INIT_MEMORY_ALLOCATION_ERROR => InitError::MemoryAllocation,
                    ffi::INIT_ALREADY_INITIALIZED => InitError::AlreadyInitialized,
                    code => InitError::Other(code as u32),
                })
            }
        }
    }

    fn process_until_end_of_metadata(&mut self) -> bool {
        // SAFETY: `raw` is a live decoder.
        unsafe { ffi::FLAC__stream_decoder_process_until_end_of_metadata(self.raw.as_ptr()) != 0 }
    }

    fn process_single(&mut self) -> bool {
        // SAFETY: `raw` is a live decoder.
        unsafe { ffi::FLAC__stream_decoder_process_single(self.raw.as_ptr()) != 0 }
    }

    fn raw_state(&self) -> u32 {
        // SAFETY: `raw` is a live decoder.
        let state = unsafe { ffi::FLAC__stream_decoder_get_state(self.raw.as_ptr()) };
        u32::try_from(state).unwrap_or(raw::UNINITIALIZED)
    }

    fn finish(&mut self) {
        // SAFETY: `raw` is a live decoder; finishing an uninitialized one is a no-op.
        unsafe { ffi::FLAC__stream_decoder_finish(self.raw.as_ptr()) };
        self.release_client();
    }
}

impl Drop for LibFlacEngine {
    fn drop(&mut self) {
        // SAFETY: `raw` came from `FLAC__stream_decoder_new` and is deleted exactly once here.
        // Deleting finishes the decoder first, so `client` is released afterwards.
        unsafe { ffi::FLAC__stream_decoder_delete(self.raw.as_ptr()) };
        self.release_client();
    }
}

/// Run a callback against the table behind `client_data`, answering `fallback` when the table
/// is missing, poisoned, or the callback panics.
///
/// # Safety
/// `client_data` must be null or the pointer installed by `init_stream`.
unsafe fn dispatch<T>(
    op: &'static str,
    client_data: *mut c_void,
    fallback: T,
    f: impl FnOnce(&mut (dyn StreamCallbacks + Send)) -> T,
) -> T {
    if client_data.is_null() {
        return fallback;
    }
    // SAFETY: guaranteed by the caller.
    let callbacks = unsafe { &*(client_data as *const SharedCallbacks) };

    match catch_unwind(AssertUnwindSafe(|| with_callbacks(callbacks, f))) {
        Ok(Some(value)) => value,
        Ok(None) => {
            error!(op, "callback table poisoned");
            fallback
        }
        Err(_) => {
            error!(op, "callback panicked");
            fallback
        }
    }
}

unsafe extern "C" fn read_cb(
    _decoder: *const ffi::FLAC__StreamDecoder,
    buffer: *mut u8,
    bytes: *mut usize,
    client_data: *mut c_void,
) -> std::ffi::c_int {
    if buffer.is_null() || bytes.is_null() {
        return ffi::READ_ABORT;
    }
    // SAFETY: libFLAC hands us a writable buffer of `*bytes` bytes.
    let capacity = unsafe { *bytes };
    let buf = unsafe { std::slice::from_raw_parts_mut(buffer, capacity) };

    let status = unsafe { dispatch("read", client_data, ReadStatus::Abort, |cb| cb.read(buf)) };
    let (n, code) = match status {
        ReadStatus::Continue(n) => (n.min(capacity), ffi::READ_CONTINUE),
        ReadStatus::EndOfStream => (0, ffi::READ_END_OF_STREAM),
        ReadStatus::Abort => (0, ffi::READ_ABORT),
    };
    // SAFETY: checked non-null above.
    unsafe { *bytes = n };
    code
}

unsafe extern "C" fn seek_cb(
    _decoder: *const ffi::FLAC__StreamDecoder,
    absolute_byte_offset: u64,
    client_data: *mut c_void,
) -> std::ffi::c_int {
    let status = unsafe {
        dispatch("seek", client_data, SeekStatus::Error, |cb| {
            cb.seek(absolute_byte_offset)
        })
    };
    match status {
        SeekStatus::Ok => ffi::SEEK_OK,
        SeekStatus::Error => ffi::SEEK_ERROR,
        SeekStatus::Unsupported => ffi::SEEK_UNSUPPORTED,
    }
}

unsafe extern "C" fn tell_cb(
    _decoder: *const ffi::FLAC__StreamDecoder,
    absolute_byte_offset: *mut u64,
    client_data: *mut c_void,
) -> std::ffi::c_int {
    match unsafe { dispatch("tell", client_data, TellStatus::Error, |cb| cb.tell()) } {
        TellStatus::Ok(pos) if !absolute_byte_offset.is_null() => {
            // SAFETY: checked non-null.
            unsafe { *absolute_byte_offset = pos };
            ffi::TELL_OK
        }
        TellStatus::Ok(_) | TellStatus::Error => ffi::TELL_ERROR,
        TellStatus::Unsupported => ffi::TELL_UNSUPPORTED,
    }
}

unsafe extern "C" fn length_cb(
    _decoder: *const ffi::FLAC__StreamDecoder,
    stream_length: *mut u64,
    client_data: *mut c_void,
) -> std::ffi::c_int {
    match unsafe { dispatch("length", client_data, LengthStatus::Error, |cb| cb.length()) } {
        LengthStatus::Ok(len) if !stream_length.is_null() => {
            // SAFETY: checked non-null.
            unsafe { *stream_length = len };
            ffi::LENGTH_OK
        }
        LengthStatus::Ok(_) | LengthStatus::Error => ffi::LENGTH_ERROR,
        LengthStatus::Unsupported => ffi::LENGTH_UNSUPPORTED,
    }
}

unsafe extern "C" fn eof_cb(
    _decoder: *const ffi::FLAC__StreamDecoder,
    client_data: *mut c_void,
) -> ffi::FLAC__bool {
    ffi::FLAC__bool::from(unsafe { dispatch("eof", client_data, true, |cb| cb.eof()) })
}

unsafe extern "C" fn write_cb(
    _decoder: *const ffi::FLAC__StreamDecoder,
    frame: *const ffi::FLAC__Frame,
    buffer: *const *const i32,
    client_data: *mut c_void,
) -> std::ffi::c_int {
    if frame.is_null() || buffer.is_null() {
        return ffi::WRITE_ABORT;
    }
    // SAFETY: libFLAC passes a valid frame and `channels` planes of `blocksize` samples,
    // valid until we return.
    let h = unsafe { &(*frame).header };
    let first_sample = match h.number_type {
        ffi::FLAC__FRAME_NUMBER_TYPE_SAMPLE_NUMBER => unsafe { h.number.sample_number },
        _ => u64::from(unsafe { h.number.frame_number }) * u64::from(h.blocksize),
    };
    let header = FrameHeader {
        channels: h.channels,
        block_size: h.blocksize,
        bits_per_sample: h.bits_per_sample,
        sample_rate: h.sample_rate,
        first_sample,
    };

    let planes = unsafe { std::slice::from_raw_parts(buffer, h.channels as usize) };
    if planes.iter().any(|p| p.is_null()) {
        return ffi::WRITE_ABORT;
    }
    let channels: Vec<&[i32]> = planes
        .iter()
        .map(|&p| unsafe { std::slice::from_raw_parts(p, h.blocksize as usize) })
        .collect();

    match unsafe {
        dispatch("write", client_data, WriteStatus::Abort, |cb| {
            cb.write(&header, &channels)
        })
    } {
        WriteStatus::Continue => ffi::WRITE_CONTINUE,
        WriteStatus::Abort => ffi::WRITE_ABORT,
    }
}

unsafe extern "C" fn metadata_cb(
    _decoder: *const ffi::FLAC__StreamDecoder,
    metadata: *const ffi::FLAC__StreamMetadata,
    client_data: *mut c_void,
) {
    if metadata.is_null() {
        return;
    }
    // SAFETY: libFLAC passes a valid block; its payload is STREAMINFO when `type_` says so.
    let block = unsafe { &*metadata };
    let block = match block.type_ {
        ffi::FLAC__METADATA_TYPE_STREAMINFO => {
            let si = block.stream_info;
            MetadataBlock::StreamInfo(StreamInfo {
                sample_rate: si.sample_rate,
                channels: si.channels,
                bits_per_sample: si.bits_per_sample,
                total_samples: si.total_samples,
                md5: si.md5sum,
                min_block_size: si.min_blocksize,
                max_block_size: si.max_blocksize,
            })
        }
        other => MetadataBlock::Other(other as u32),
    };
    unsafe { dispatch("metadata", client_data, (), |cb| cb.metadata(&block)) }
}

unsafe extern "C" fn error_cb(
    _decoder: *const ffi::FLAC__StreamDecoder,
    status: std::ffi::c_int,
    client_data: *mut c_void,
) {
    let status = ErrorStatus::from_raw(status as u32);
    unsafe { dispatch("error", client_data, (), |cb| cb.error(status)) }
}
