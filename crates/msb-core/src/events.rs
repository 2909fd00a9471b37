//! User-visible media log.
//!
//! The engine reports notable, caller-facing conditions (rejected appends,
//! skipped splices, failed evictions) as [`MediaLogEvent`] values through an
//! injected [`MediaLog`] sink. Developer diagnostics go straight to `tracing`
//! and do not pass through here.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::time::TimeDelta;

// ---------------------------------------------------------------------------
// MediaLogEvent
// ---------------------------------------------------------------------------

/// Something a media-log consumer should know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaLogEvent {
    // -- Append --------------------------------------------------------------
    AppendRejected {
        reason: String,
    },
    /// A GOP lost its reference keyframe and was dropped instead of buffered.
    SkippedOrphanGop {
        timestamp: TimeDelta,
    },

    // -- Config --------------------------------------------------------------
    ConfigChangeRejected {
        reason: String,
    },

    // -- Splicing ------------------------------------------------------------
    SpliceGenerated {
        timestamp: TimeDelta,
        pre_splice_buffers: usize,
    },
    SpliceSkipped {
        timestamp: TimeDelta,
        reason: String,
    },

    // -- Read-out ------------------------------------------------------------
    /// Playback jumps forward when the track buffer runs dry.
    TrackBufferGap {
        gap: TimeDelta,
    },

    // -- Garbage collection --------------------------------------------------
    GarbageCollectionFailed {
        requested: usize,
        buffered: usize,
        limit: usize,
    },
}

impl MediaLogEvent {
    /// Stable name of the variant, used for per-kind rate limiting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AppendRejected { .. } => "append_rejected",
            Self::SkippedOrphanGop { .. } => "skipped_orphan_gop",
            Self::ConfigChangeRejected { .. } => "config_change_rejected",
            Self::SpliceGenerated { .. } => "splice_generated",
            Self::SpliceSkipped { .. } => "splice_skipped",
            Self::TrackBufferGap { .. } => "track_buffer_gap",
            Self::GarbageCollectionFailed { .. } => "garbage_collection_failed",
        }
    }

    /// Whether the event reports a problem rather than routine activity.
    pub fn is_warning(&self) -> bool {
        !matches!(self, Self::SpliceGenerated { .. } | Self::SpliceSkipped { .. })
    }
}

impl std::fmt::Display for MediaLogEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AppendRejected { reason } => write!(f, "append rejected: {reason}"),
            Self::SkippedOrphanGop { timestamp } => write!(
                f,
                "skipped GOP at {timestamp} with no keyframe after its reference was removed"
            ),
            Self::ConfigChangeRejected { reason } => write!(f, "config change rejected: {reason}"),
            Self::SpliceGenerated {
                timestamp,
                pre_splice_buffers,
            } => write!(
                f,
                "generated splice at {timestamp} over {pre_splice_buffers} buffer(s)"
            ),
            Self::SpliceSkipped { timestamp, reason } => {
                write!(f, "skipped splice at {timestamp}: {reason}")
            }
            Self::TrackBufferGap { gap } => {
                write!(f, "track buffer exhausted; playback skips forward by {gap}")
            }
            Self::GarbageCollectionFailed {
                requested,
                buffered,
                limit,
            } => write!(
                f,
                "garbage collection could not free room for {requested} bytes ({buffered} buffered, limit {limit})"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// MediaLog sinks
// ---------------------------------------------------------------------------

/// Sink for [`MediaLogEvent`]s.
pub trait MediaLog: Send + Sync {
    fn log(&self, event: MediaLogEvent);
}

/// Forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMediaLog;

impl MediaLog for TracingMediaLog {
    fn log(&self, event: MediaLogEvent) {
        if event.is_warning() {
            tracing::warn!(kind = event.kind(), "{event}");
        } else {
            tracing::info!(kind = event.kind(), "{event}");
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct RecordingMediaLog {
    events: Mutex<Vec<MediaLogEvent>>,
}

impl RecordingMediaLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far, oldest first.
    pub fn events(&self) -> Vec<MediaLogEvent> {
        self.events.lock().clone()
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl MediaLog for RecordingMediaLog {
    fn log(&self, event: MediaLogEvent) {
        self.events.lock().push(event);
    }
}

/// Passes at most `max_per_kind` events of each kind to the wrapped sink and
/// drops the rest.
pub struct LimitedMediaLog {
    inner: Arc<dyn MediaLog>,
    max_per_kind: usize,
    counts: Mutex<HashMap<&'static str, usize>>,
}

impl LimitedMediaLog {
    pub fn new(inner: Arc<dyn MediaLog>, max_per_kind: usize) -> Self {
        Self {
            inner,
            max_per_kind,
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Number of events of `kind` seen so far, including dropped ones.
    pub fn seen(&self, kind: &str) -> usize {
        self.counts.lock().get(kind).copied().unwrap_or(0)
    }
}

impl MediaLog for LimitedMediaLog {
    fn log(&self, event: MediaLogEvent) {
        let forward = {
            let mut counts = self.counts.lock();
            let count = counts.entry(event.kind()).or_insert(0);
            *count += 1;
            *count <= self.max_per_kind
        };
        if forward {
            self.inner.log(event);
        } else {
            tracing::trace!(kind = event.kind(), "media log limit reached; dropping event");
        }
    }
}
