//! Unified error type for the msb engine.
//!
//! Every fallible stream operation funnels its failure into [`Error`]. Append
//! contract violations are grouped under [`AppendError`] so callers can match
//! on the exact reason a batch was rejected.

use crate::time::DecodeTimestamp;

/// Reasons an `append` call rejects a batch of buffers.
///
/// A rejected batch leaves no guarantee about partial state; the whole call
/// has to be retried with corrected input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppendError {
    /// The batch contained no buffers.
    #[error("append of an empty batch")]
    EmptyBatch,

    /// The first batch of a coded frame group did not start with a keyframe.
    #[error("coded frame group did not begin with a keyframe")]
    MissingKeyframe,

    /// Decode timestamps went backwards.
    #[error("buffers were not monotonically increasing at {timestamp}")]
    NonMonotonic {
        /// Decode timestamp of the offending buffer.
        timestamp: DecodeTimestamp,
    },

    /// Two buffers share a decode timestamp in a disallowed keyframe pattern.
    #[error("invalid same timestamp construct detected at {timestamp}")]
    InvalidSameTimestamp {
        /// The shared decode timestamp.
        timestamp: DecodeTimestamp,
    },

    /// The coded frame group or its first buffer starts before zero.
    #[error("cannot append a coded frame group with negative timestamps")]
    NegativeTimestamp,

    /// End of stream has been marked; appends are not accepted until it is
    /// unmarked.
    #[error("cannot append after end of stream")]
    EndOfStream,

    /// No coded frame group was started before the first append.
    #[error("append without a coded frame group")]
    NoCodedFrameGroup,
}

/// Unified error type covering all failure modes of the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An append batch violated the caller contract.
    #[error("Append rejected: {0}")]
    Append(#[from] AppendError),

    /// Garbage collection could not make room for the incoming data.
    #[error("Quota exceeded: {requested} bytes requested, {buffered} buffered, limit {limit}")]
    QuotaExceeded {
        /// Size of the pending append.
        requested: usize,
        /// Bytes buffered when collection gave up.
        buffered: usize,
        /// The stream's memory limit.
        limit: usize,
    },

    /// A decoder config update attempted a disallowed change.
    #[error("Config change rejected: {0}")]
    ConfigChange(String),

    /// An internal precondition failed; the call was refused before any
    /// data was modified.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration or script data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Whether the same call may succeed later without changing its input.
    ///
    /// Quota failures clear once playback advances and more data becomes
    /// collectable; everything else needs corrected input or is a bug.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::QuotaExceeded { .. } | Error::Io { .. })
    }

    /// Convenience constructor for [`Error::InvariantViolation`].
    pub fn invariant(message: impl Into<String>) -> Self {
        Error::InvariantViolation(message.into())
    }

    /// Convenience constructor for [`Error::ConfigChange`].
    pub fn config_change(message: impl Into<String>) -> Self {
        Error::ConfigChange(message.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
