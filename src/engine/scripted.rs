//! A test engine that replays a fixed script of callback invocations.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    ErrorStatus, FrameHeader, InitError, MetadataBlock, ReadStatus, SharedCallbacks,
    StreamEngine, WriteStatus, with_callbacks,
};
use crate::state::raw;

/// Filler for read buffers, so tests can see which bytes the callback left alone.
pub const UNTOUCHED: u8 = 0xEE;

#[derive(Debug, Clone)]
pub enum Step {
    /// Ask the read callback for this many bytes.
    Read(usize),
    Metadata(MetadataBlock),
    Write(FrameHeader, Vec<Vec<i32>>),
    Error(ErrorStatus),
    /// Force a raw state, e.g. an error state the script wants to end in.
    State(u32),
}

/// What the engine observed, shared with the test after the engine moves into a decoder.
#[derive(Debug, Default)]
pub struct Recorder {
    /// Full read buffers after each `Continue` read.
    pub reads: Mutex<Vec<Vec<u8>>>,
    pub finished: AtomicUsize,
    pub dropped: AtomicUsize,
}

impl Recorder {
    pub fn reads(&self) -> Vec<Vec<u8>> {
        self.reads.lock().expect("reads lock").clone()
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

pub struct ScriptedEngine {
    metadata: Vec<Step>,
    frames: VecDeque<Vec<Step>>,
    state: u32,
    callbacks: Option<SharedCallbacks>,
    recorder: Arc<Recorder>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            metadata: Vec::new(),
            frames: VecDeque::new(),
            state: raw::UNINITIALIZED,
            callbacks: None,
            recorder: Arc::new(Recorder::default()),
        }
    }

    pub fn with_metadata(mut self, steps: Vec<Step>) -> Self {
        self.metadata = steps;
        self
    }

    /// Append the script for one `process_single` call.
    pub fn with_frame(mut self, steps: Vec<Step>) -> Self {
        self.frames.push_back(steps);
        self
    }

    pub fn recorder(&self) -> Arc<Recorder> {
        self.recorder.clone()
    }

    /// Run steps until one of them ends the call. Returns the engine's success flag.
    fn run(&mut self, steps: Vec<Step>) -> bool {
        let Some(callbacks) = self.callbacks.clone() else {
            return false;
        };

        for step in steps {
            match step {
                Step::Read(n) => {
                    let mut buf = vec![UNTOUCHED; n];
                    match with_callbacks(&callbacks, |cb| cb.read(&mut buf)) {
                        Some(ReadStatus::Continue(_)) => {
                            self.recorder.reads.lock().expect("reads lock").push(buf);
                        }
                        Some(ReadStatus::EndOfStream) => {
                            self.state = raw::END_OF_STREAM;
                            return true;
                        }
                        Some(ReadStatus::Abort) | None => {
                            self.state = raw::ABORTED;
                            return false;
                        }
                    }
                }
                Step::Metadata(block) => {
                    with_callbacks(&callbacks, |cb| cb.metadata(&block));
                }
                Step::Write(header, samples) => {
                    let planes: Vec<&[i32]> = samples.iter().map(Vec::as_slice).collect();
                    let status = with_callbacks(&callbacks, |cb| cb.write(&header, &planes));
                    if status != Some(WriteStatus::Continue) {
                        self.state = raw::ABORTED;
                        return false;
                    }
                }
                Step::Error(status) => {
                    with_callbacks(&callbacks, |cb| cb.error(status));
                }
                Step::State(code) => self.state = code,
            }
        }

        true
    }
}

impl StreamEngine for ScriptedEngine {
    fn init_stream(&mut self, callbacks: SharedCallbacks) -> Result<(), InitError> {
        if self.callbacks.is_some() {
            return Err(InitError::AlreadyInitialized);
        }
        self.callbacks = Some(callbacks);
        self.state = raw::SEARCH_FOR_METADATA;
        Ok(())
    }

    fn process_until_end_of_metadata(&mut self) -> bool {
        if self.state != raw::SEARCH_FOR_METADATA {
            return true;
        }
        self.state = raw::READ_METADATA;
        let steps = std::mem::take(&mut self.metadata);
        let ok = self.run(steps);
        if self.state == raw::READ_METADATA {
            self.state = raw::SEARCH_FOR_FRAME_SYNC;
        }
        ok
    }

    fn process_single(&mut self) -> bool {
        let Some(steps) = self.frames.pop_front() else {
            self.state = raw::END_OF_STREAM;
            return true;
        };
        self.state = raw::READ_FRAME;
        let ok = self.run(steps);
        if self.state == raw::READ_FRAME {
            self.state = raw::SEARCH_FOR_FRAME_SYNC;
        }
        ok
    }

    fn raw_state(&self) -> u32 {
        self.state
    }

    fn finish(&mut self) {
        self.recorder.finished.fetch_add(1, Ordering::SeqCst);
        self.callbacks = None;
        self.state = raw::UNINITIALIZED;
    }
}

impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        self.recorder.dropped.fetch_add(1, Ordering::SeqCst);
    }
}
