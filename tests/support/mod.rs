//! In-memory FLAC streams for integration tests.
//!
//! Frames are fixed-blocksize, 44.1 kHz, 16-bit, with VERBATIM subframes, so the encoded
//! bytes are easy to reason about and every sample decodes back exactly.

#![allow(dead_code)]

pub const SAMPLE_RATE: u32 = 44_100;
pub const BLOCK_SIZE: usize = 16;
pub const MD5: [u8; 16] = *b"flac-pull-md5sum";

pub struct FlacBuilder {
    channels: Vec<Vec<i16>>,
    block_size: usize,
    tags: Vec<(String, String)>,
}

impl FlacBuilder {
    /// `channels` is planar: one `Vec` per channel, all the same length.
    pub fn new(channels: Vec<Vec<i16>>) -> Self {
        assert!(matches!(channels.len(), 1 | 2), "mono or stereo only");
        assert!(channels.iter().all(|c| c.len() == channels[0].len()));
        Self {
            channels,
            block_size: BLOCK_SIZE,
            tags: Vec::new(),
        }
    }

    /// Samples per frame, and both STREAMINFO block-size bounds. At most 256.
    pub fn block_size(mut self, block_size: usize) -> Self {
        assert!((1..=256).contains(&block_size));
        self.block_size = block_size;
        self
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn total_samples(&self) -> usize {
        self.channels[0].len()
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = b"fLaC".to_vec();

        let has_tags = !self.tags.is_empty();
        metadata_header(&mut out, 0, !has_tags, 34);
        out.extend_from_slice(&self.stream_info());

        if has_tags {
            let block = self.vorbis_comment();
            metadata_header(&mut out, 4, true, block.len());
            out.extend_from_slice(&block);
        }

        let total = self.total_samples();
        for (number, start) in (0..total).step_by(self.block_size).enumerate() {
            let end = (start + self.block_size).min(total);
            out.extend_from_slice(&self.frame(number as u32, start, end));
        }

        out
    }

    fn stream_info(&self) -> Vec<u8> {
        let mut block = Vec::with_capacity(34);
        block.extend_from_slice(&(self.block_size as u16).to_be_bytes());
        block.extend_from_slice(&(self.block_size as u16).to_be_bytes());
        // Min / max frame size: unknown.
        block.extend_from_slice(&[0; 6]);

        let packed = (u64::from(SAMPLE_RATE) << 44)
            | ((self.channels.len() as u64 - 1) << 41)
            | ((16u64 - 1) << 36)
            | self.total_samples() as u64;
        block.extend_from_slice(&packed.to_be_bytes());
        block.extend_from_slice(&MD5);
        block
    }

    fn vorbis_comment(&self) -> Vec<u8> {
        let vendor = b"flac-pull tests";
        let mut block = Vec::new();
        block.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        block.extend_from_slice(vendor);
        block.extend_from_slice(&(self.tags.len() as u32).to_le_bytes());
        for (key, value) in &self.tags {
            let entry = format!("{key}={value}");
            block.extend_from_slice(&(entry.len() as u32).to_le_bytes());
            block.extend_from_slice(entry.as_bytes());
        }
        block
    }

    fn frame(&self, number: u32, start: usize, end: usize) -> Vec<u8> {
        let block_size = end - start;

        // Sync code, fixed blocksize.
        let mut frame = vec![0xFF, 0xF8];
        // Blocksize: 8-bit (n - 1) at end of header. Sample rate: 44.1 kHz.
        frame.push(0x69);
        // Independent channels, 16 bits per sample.
        frame.push(((self.channels.len() as u8 - 1) << 4) | 0x08);
        frame.extend_from_slice(&utf8_number(number));
        frame.push((block_size - 1) as u8);
        frame.push(crc8(&frame));

        for channel in &self.channels {
            // VERBATIM subframe, no wasted bits.
            frame.push(0x02);
            for &sample in &channel[start..end] {
                frame.extend_from_slice(&sample.to_be_bytes());
            }
        }

        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
        frame
    }
}

/// Interleave planar samples as S16LE.
pub fn s16le(channels: &[Vec<i16>], start: usize, end: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in start..end {
        for channel in channels {
            out.extend_from_slice(&channel[i].to_le_bytes());
        }
    }
    out
}

/// A deterministic stereo test signal.
pub fn stereo_ramp(len: usize) -> Vec<Vec<i16>> {
    let left = (0..len).map(|i| (i as i16) * 97 - 1000).collect();
    let right = (0..len)
        .map(|i| if i % 2 == 0 { i16::MAX - i as i16 } else { i16::MIN + i as i16 })
        .collect();
    vec![left, right]
}

fn metadata_header(out: &mut Vec<u8>, block_type: u8, is_last: bool, len: usize) {
    out.push(if is_last { 0x80 | block_type } else { block_type });
    out.extend_from_slice(&(len as u32).to_be_bytes()[1..]);
}

fn utf8_number(n: u32) -> Vec<u8> {
    match n {
        0..=0x7F => vec![n as u8],
        0x80..=0x7FF => vec![0xC0 | (n >> 6) as u8, 0x80 | (n & 0x3F) as u8],
        _ => vec![
            0xE0 | (n >> 12) as u8,
            0x80 | ((n >> 6) & 0x3F) as u8,
            0x80 | (n & 0x3F) as u8,
        ],
    }
}

fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x8005
            } else {
                crc << 1
            };
        }
    }
    crc
}
