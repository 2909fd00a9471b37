//! msb-core: shared time types, errors, configuration, media types and the
//! media log.
//!
//! This crate is the foundational dependency for the stream engine,
//! providing microsecond time types with sentinel values, a unified error
//! type, decoder-config value objects, stream configuration, presentation
//! time ranges and an injectable observability sink.

pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod ranges;
pub mod time;

// Re-export the most commonly used items at the crate root.
pub use config::StreamConfig;
pub use error::{AppendError, Error, Result};
pub use events::{LimitedMediaLog, MediaLog, MediaLogEvent, RecordingMediaLog, TracingMediaLog};
pub use media::*;
pub use ranges::{TimeRange, TimeRanges};
pub use time::{DecodeTimestamp, TimeDelta};
