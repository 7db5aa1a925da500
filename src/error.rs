use std::error::Error as StdError;

use thiserror::Error;

/// flac-pull's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// flac-pull's crate-wide error type.
///
/// Failures inside the engine (lost sync, CRC mismatches, truncated streams) are not errors
/// here. They surface through `Decoder::state` and `Decoder::last_error`, so callers poll
/// state after each step instead of matching on this type.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine instance, or a buffer it needs up front, could not be constructed.
    #[error("failed to allocate decoder: {0}")]
    Allocation(String),

    /// Stream info was requested before any STREAMINFO block was seen.
    #[error("stream info is not available (stream not yet in sync)")]
    OutOfSync,

    /// The caller-supplied read function failed during a decode step.
    #[error("read function failed")]
    Source(#[source] std::io::Error),

    /// `read_pcm` under `PcmPolicy::Strict` received a frame that is not 16-bit.
    #[error("16-bit PCM output requires a 16-bit stream, got {0} bits per sample")]
    UnsupportedBitDepth(u32),

    /// A previous panic inside a callback poisoned the shared callback context.
    #[error("decoder callback context poisoned")]
    Poisoned,

    /// A failure from a helper that reports through `anyhow`, context chain flattened.
    #[error("{0}")]
    Message(String),

    /// Any other boxed error, for callers that layer their own I/O around the decoder.
    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anyhow_context_is_kept_in_message() {
        let err: Error = anyhow::anyhow!("inner").context("outer").into();
        assert_eq!(err.to_string(), "outer: inner");
    }

    #[test]
    fn io_errors_convert_to_other() {
        let err: Error = std::io::Error::other("disk on fire").into();
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn source_error_exposes_io_cause() {
        let err = Error::Source(std::io::Error::other("socket closed"));
        let cause = err.source().expect("io cause");
        assert_eq!(cause.to_string(), "socket closed");
    }
}
