/// How `Decoder::read_pcm` handles frames that are not 16 bits per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum PcmPolicy {
    /// Refuse non-16-bit frames with `Error::UnsupportedBitDepth`.
    #[default]
    Strict,

    /// Keep the low 16 bits of every sample, whatever the stream's depth.
    ///
    /// Only correct for 16-bit streams; wider samples wrap.
    Truncate,

    /// Shift samples to 16 bits: wider streams lose their low bits, narrower ones are padded.
    Scale,
}

/// Options that control how a `Decoder` is built and how it converts output.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The CLI maps user input into this type so other frontends can construct it
/// programmatically.
#[derive(Debug, Clone)]
pub struct DecoderOpts {
    /// Read-ahead buffer of the built-in engine, in bytes.
    ///
    /// Symphonia expects a power of two larger than 32 KiB. The read function is still
    /// asked for smaller amounts while the buffer warms up.
    pub buffer_len: usize,

    /// Bit-depth handling for `read_pcm`.
    pub pcm_policy: PcmPolicy,
}

impl Default for DecoderOpts {
    fn default() -> Self {
        Self {
            buffer_len: 64 * 1024,
            pcm_policy: PcmPolicy::Strict,
        }
    }
}
