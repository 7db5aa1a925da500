// src/pcm.rs

//! Output shapes for decoded frames.
//!
//! - `SampleFrame`: planar `f64`, one `Vec` per channel, values equal to the decoded integers.
//!   No normalization: callers that want `[-1.0, 1.0]` divide by `2^(bits_per_sample - 1)`.
//! - `to_s16le`: interleaved signed 16-bit little-endian bytes, frame-major.

use crate::engine::FrameHeader;
use crate::error::{Error, Result};
use crate::frame_cache::CachedFrame;
use crate::opts::PcmPolicy;

/// One decoded frame as planar floating-point samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFrame {
    pub header: FrameHeader,
    /// `[channel][sample]`.
    pub channels: Vec<Vec<f64>>,
}

impl SampleFrame {
    /// Samples per channel.
    pub fn block_size(&self) -> usize {
        self.header.block_size as usize
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Interleave this frame as S16LE bytes, like `Decoder::read_pcm` would have.
    pub fn to_s16le(&self, policy: PcmPolicy) -> Result<Vec<u8>> {
        interleave_s16le(
            self.header.bits_per_sample,
            policy,
            &self.channels,
            |&s: &f64| s as i32,
        )
    }
}

impl From<CachedFrame> for SampleFrame {
    fn from(frame: CachedFrame) -> Self {
        let channels = frame
            .samples
            .iter()
            .map(|channel| channel.iter().map(|&s| f64::from(s)).collect())
            .collect();

        Self {
            header: frame.header,
            channels,
        }
    }
}

/// Interleave a frame into S16LE bytes: `[f0c0, f0c1, …, f1c0, …]`.
pub fn to_s16le(frame: &CachedFrame, policy: PcmPolicy) -> Result<Vec<u8>> {
    interleave_s16le(frame.header.bits_per_sample, policy, &frame.samples, |&s: &i32| s)
}

fn interleave_s16le<T>(
    bits: u32,
    policy: PcmPolicy,
    planes: &[Vec<T>],
    sample: impl Fn(&T) -> i32,
) -> Result<Vec<u8>> {
    let convert: fn(i32, u32) -> i16 = match policy {
        PcmPolicy::Strict if bits != 16 => return Err(Error::UnsupportedBitDepth(bits)),
        PcmPolicy::Strict | PcmPolicy::Truncate => truncate,
        PcmPolicy::Scale => scale,
    };

    let block_size = planes.first().map_or(0, Vec::len);
    let mut out = Vec::with_capacity(planes.len() * block_size * 2);

    for i in 0..block_size {
        for plane in planes {
            out.extend_from_slice(&convert(sample(&plane[i]), bits).to_le_bytes());
        }
    }

    Ok(out)
}

fn truncate(sample: i32, _bits: u32) -> i16 {
    sample as i16
}

fn scale(sample: i32, bits: u32) -> i16 {
    if bits > 16 {
        (sample >> (bits - 16)) as i16
    } else {
        (sample << (16 - bits)) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(bits_per_sample: u32, samples: Vec<Vec<i32>>) -> CachedFrame {
        CachedFrame {
            header: FrameHeader {
                channels: samples.len() as u32,
                block_size: samples[0].len() as u32,
                bits_per_sample,
                sample_rate: 44_100,
                first_sample: 0,
            },
            samples,
        }
    }

    #[test]
    fn planar_floats_equal_raw_integers() {
        let cached = frame(24, vec![vec![8_388_607, -8_388_608], vec![0, 1]]);
        let out = SampleFrame::from(cached);

        assert_eq!(out.channel_count(), 2);
        assert_eq!(out.block_size(), 2);
        assert_eq!(out.channels[0], vec![8_388_607.0, -8_388_608.0]);
        assert_eq!(out.channels[1], vec![0.0, 1.0]);
    }

    #[test]
    fn s16le_is_interleaved_frame_major() -> anyhow::Result<()> {
        let cached = frame(16, vec![vec![1, -2], vec![0x1234, i16::MIN as i32]]);
        let bytes = to_s16le(&cached, PcmPolicy::Strict)?;

        assert_eq!(
            bytes,
            vec![
                0x01, 0x00, // f0 c0
                0x34, 0x12, // f0 c1
                0xFE, 0xFF, // f1 c0
                0x00, 0x80, // f1 c1
            ]
        );
        Ok(())
    }

    #[test]
    fn sample_frame_interleaves_like_the_cache() -> anyhow::Result<()> {
        let cached = frame(16, vec![vec![5, -5], vec![7, -7]]);
        let expected = to_s16le(&cached, PcmPolicy::Strict)?;
        assert_eq!(
            SampleFrame::from(cached).to_s16le(PcmPolicy::Strict)?,
            expected
        );
        Ok(())
    }

    #[test]
    fn strict_policy_refuses_other_depths() {
        let cached = frame(24, vec![vec![1, 2]]);
        let err = to_s16le(&cached, PcmPolicy::Strict).unwrap_err();
        assert!(matches!(err, Error::UnsupportedBitDepth(24)));
    }

    #[test]
    fn truncate_policy_keeps_low_sixteen_bits() -> anyhow::Result<()> {
        let cached = frame(24, vec![vec![0x01_2345, -1]]);
        let bytes = to_s16le(&cached, PcmPolicy::Truncate)?;
        assert_eq!(bytes, vec![0x45, 0x23, 0xFF, 0xFF]);
        Ok(())
    }

    #[test]
    fn scale_policy_shifts_to_sixteen_bits() -> anyhow::Result<()> {
        let wide = frame(24, vec![vec![0x7F_FF00, -0x80_0000]]);
        assert_eq!(
            to_s16le(&wide, PcmPolicy::Scale)?,
            vec![0xFF, 0x7F, 0x00, 0x80]
        );

        let narrow = frame(8, vec![vec![127, -128]]);
        assert_eq!(
            to_s16le(&narrow, PcmPolicy::Scale)?,
            vec![0x00, 0x7F, 0x00, 0x80]
        );
        Ok(())
    }
}
