//! Scripted replay of stream operations.
//!
//! A [`Script`] names one stream and a list of [`Step`]s. [`run`] applies the
//! steps to a fresh [`SourceBufferStream`] and returns a [`Report`] holding
//! each step's outcome, the buffered ranges after it, and the media log.
//!
//! Scripts are JSON or TOML; the file extension picks the format:
//!
//! ```toml
//! stream = "video"
//!
//! [[steps]]
//! op = "start_group"
//! dts_ms = 0
//!
//! [[steps]]
//! op = "append"
//! buffers = [
//!     { dts_ms = 0, duration_ms = 10, keyframe = true, size = 100 },
//!     { dts_ms = 10, duration_ms = 10, size = 100 },
//! ]
//! ```

use msb_core::{
    AudioCodec, AudioDecoderConfig, DecodeTimestamp, Error, LimitedMediaLog, MediaLogEvent,
    RecordingMediaLog, StreamConfig, StreamType, TextKind, TextTrackConfig, TimeDelta, VideoCodec,
    VideoDecoderConfig,
};
use msb_stream::{Buffer, CursorState, SourceBufferStream, StreamStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Script model
// ---------------------------------------------------------------------------

/// A stream to build and the operations to run against it.
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    pub stream: StreamType,
    /// Overrides the config loaded from `--config`.
    #[serde(default)]
    pub config: Option<StreamConfig>,
    #[serde(default)]
    pub audio_config: Option<AudioDecoderConfig>,
    #[serde(default)]
    pub video_config: Option<VideoDecoderConfig>,
    #[serde(default)]
    pub text_config: Option<TextTrackConfig>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One stream operation. Times are in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    StartGroup {
        dts_ms: i64,
    },
    Append {
        buffers: Vec<BufferSpec>,
    },
    Remove {
        start_ms: i64,
        end_ms: i64,
        /// Media duration used to cap the removal end; unbounded if absent.
        #[serde(default)]
        duration_ms: Option<i64>,
    },
    Seek {
        time_ms: i64,
    },
    /// Read up to `count` buffers. Config changes are acknowledged and do
    /// not count.
    Read {
        count: usize,
    },
    Gc {
        media_time_ms: i64,
        #[serde(default)]
        size: usize,
    },
    SetDuration {
        duration_ms: i64,
    },
    EndOfStream,
    UpdateAudioConfig {
        config: AudioDecoderConfig,
    },
    UpdateVideoConfig {
        config: VideoDecoderConfig,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartGroup { .. } => "start_group",
            Self::Append { .. } => "append",
            Self::Remove { .. } => "remove",
            Self::Seek { .. } => "seek",
            Self::Read { .. } => "read",
            Self::Gc { .. } => "gc",
            Self::SetDuration { .. } => "set_duration",
            Self::EndOfStream => "end_of_stream",
            Self::UpdateAudioConfig { .. } => "update_audio_config",
            Self::UpdateVideoConfig { .. } => "update_video_config",
        }
    }
}

/// One sample of an `append` step. `pts_ms` defaults to `dts_ms`.
#[derive(Debug, Clone, Deserialize)]
pub struct BufferSpec {
    pub dts_ms: i64,
    #[serde(default)]
    pub pts_ms: Option<i64>,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub keyframe: bool,
    /// Payload size in bytes.
    #[serde(default)]
    pub size: usize,
}

impl BufferSpec {
    fn to_buffer(&self, stream_type: StreamType) -> Buffer {
        let pts = self.pts_ms.unwrap_or(self.dts_ms);
        Buffer::new(stream_type, vec![0u8; self.size], self.keyframe)
            .with_timestamps(
                DecodeTimestamp::from_milliseconds(self.dts_ms),
                TimeDelta::from_milliseconds(pts),
            )
            .with_duration(TimeDelta::from_milliseconds(self.duration_ms))
    }
}

impl Script {
    pub fn from_json(json_str: &str) -> msb_core::Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("script parse error: {e}")))
    }

    pub fn from_toml(toml_str: &str) -> msb_core::Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Validation(format!("script parse error: {e}")))
    }

    /// Read a script file; `.toml` files are TOML, anything else JSON.
    pub fn from_path(path: &Path) -> msb_core::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "toml") {
            Self::from_toml(&contents)
        } else {
            Self::from_json(&contents)
        }
    }

    fn build_stream(
        &self,
        settings: &StreamConfig,
        media_log: Arc<LimitedMediaLog>,
    ) -> SourceBufferStream {
        match self.stream {
            StreamType::Audio => SourceBufferStream::new_audio(
                self.audio_config
                    .clone()
                    .unwrap_or_else(|| AudioDecoderConfig::new(AudioCodec::Aac, 44_100, 2)),
                settings,
                media_log,
            ),
            StreamType::Video => SourceBufferStream::new_video(
                self.video_config
                    .clone()
                    .unwrap_or_else(|| VideoDecoderConfig::new(VideoCodec::H264, 1280, 720)),
                settings,
                media_log,
            ),
            StreamType::Text => SourceBufferStream::new_text(
                self.text_config
                    .clone()
                    .unwrap_or_else(|| TextTrackConfig::new(TextKind::Subtitles, "", "", "")),
                settings,
                media_log,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Everything observed while running a script.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub stream: StreamType,
    pub steps: Vec<StepReport>,
    pub media_log: Vec<MediaLogEvent>,
    pub buffered_bytes: usize,
}

impl Report {
    /// Number of steps that returned an error.
    pub fn failed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, Outcome::Error { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    pub outcome: Outcome,
    /// Buffered presentation ranges in milliseconds after the step.
    pub buffered: Vec<[i64; 2]>,
    pub cursor: CursorState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Error { message: String },
    /// Read tokens: a presentation time in ms with a `K` suffix for
    /// keyframes, or `config`, `need` or `eos`.
    Read { items: Vec<String> },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error { message } => write!(f, "error: {message}"),
            Self::Read { items } => write!(f, "read: {}", items.join(" ")),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stream: {}", self.stream)?;
        for step in &self.steps {
            let buffered = step
                .buffered
                .iter()
                .map(|[start, end]| format!("[{start},{end})"))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(
                f,
                "{:>3}. {:<20} {}  buffered: {}",
                step.index,
                step.op,
                step.outcome,
                if buffered.is_empty() { "none" } else { &buffered }
            )?;
        }
        writeln!(f, "Buffered bytes: {}", self.buffered_bytes)?;
        writeln!(f, "Media log: {} event(s)", self.media_log.len())?;
        for event in &self.media_log {
            writeln!(f, "  {event}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Run `script` against a fresh stream.
///
/// Step failures are recorded in the report and do not stop the run.
pub fn run(script: &Script, settings: &StreamConfig) -> Report {
    let settings = script.config.as_ref().unwrap_or(settings);
    let recording = Arc::new(RecordingMediaLog::new());
    let media_log = Arc::new(LimitedMediaLog::new(
        recording.clone(),
        settings.max_media_log_messages,
    ));
    let mut stream = script.build_stream(settings, media_log);

    let mut steps = Vec::with_capacity(script.steps.len());
    for (i, step) in script.steps.iter().enumerate() {
        let outcome = match apply(&mut stream, step) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::debug!(step = i + 1, op = step.name(), "step failed: {e}");
                Outcome::Error {
                    message: e.to_string(),
                }
            }
        };
        steps.push(StepReport {
            index: i + 1,
            op: step.name(),
            outcome,
            buffered: stream
                .get_buffered_time()
                .iter()
                .map(|r| [r.start.in_milliseconds(), r.end.in_milliseconds()])
                .collect(),
            cursor: stream.cursor_state(),
        });
    }

    Report {
        stream: script.stream,
        steps,
        media_log: recording.events(),
        buffered_bytes: stream.get_buffered_size(),
    }
}

fn apply(stream: &mut SourceBufferStream, step: &Step) -> msb_core::Result<Outcome> {
    match step {
        Step::StartGroup { dts_ms } => {
            stream.on_start_of_coded_frame_group(DecodeTimestamp::from_milliseconds(*dts_ms));
        }
        Step::Append { buffers } => {
            let stream_type = stream.stream_type();
            stream.append(buffers.iter().map(|b| b.to_buffer(stream_type)).collect())?;
        }
        Step::Remove {
            start_ms,
            end_ms,
            duration_ms,
        } => {
            let duration = duration_ms.map_or(TimeDelta::INFINITE, TimeDelta::from_milliseconds);
            stream.remove(
                TimeDelta::from_milliseconds(*start_ms),
                TimeDelta::from_milliseconds(*end_ms),
                duration,
            )?;
        }
        Step::Seek { time_ms } => stream.seek(TimeDelta::from_milliseconds(*time_ms))?,
        Step::Read { count } => return read(stream, *count),
        Step::Gc {
            media_time_ms,
            size,
        } => {
            stream.garbage_collect_if_needed(TimeDelta::from_milliseconds(*media_time_ms), *size)?;
        }
        Step::SetDuration { duration_ms } => {
            stream.on_set_duration(TimeDelta::from_milliseconds(*duration_ms));
        }
        Step::EndOfStream => stream.mark_end_of_stream(),
        Step::UpdateAudioConfig { config } => stream.update_audio_config(config.clone())?,
        Step::UpdateVideoConfig { config } => stream.update_video_config(config.clone())?,
    }
    Ok(Outcome::Ok)
}

fn read(stream: &mut SourceBufferStream, count: usize) -> msb_core::Result<Outcome> {
    let mut items = Vec::new();
    let mut delivered = 0;
    while delivered < count {
        match stream.get_next_buffer()? {
            StreamStatus::Buffer(buffer) => {
                items.push(format!(
                    "{}{}",
                    buffer.timestamp().in_milliseconds(),
                    if buffer.is_keyframe() { "K" } else { "" }
                ));
                delivered += 1;
            }
            StreamStatus::ConfigChange => {
                items.push("config".to_string());
                stream.complete_config_change();
            }
            StreamStatus::NeedMoreData => {
                items.push("need".to_string());
                break;
            }
            StreamStatus::EndOfStream => {
                items.push("eos".to_string());
                break;
            }
        }
    }
    Ok(Outcome::Read { items })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO_SCRIPT: &str = r#"
stream = "video"

[[steps]]
op = "start_group"
dts_ms = 0

[[steps]]
op = "append"
buffers = [
    { dts_ms = 0, duration_ms = 10, keyframe = true, size = 100 },
    { dts_ms = 10, duration_ms = 10, size = 100 },
    { dts_ms = 20, duration_ms = 10, size = 100 },
]

[[steps]]
op = "seek"
time_ms = 0

[[steps]]
op = "read"
count = 5
"#;

    #[test]
    fn toml_script_replays() {
        let script = Script::from_toml(VIDEO_SCRIPT).unwrap();
        assert_eq!(script.steps.len(), 4);

        let report = run(&script, &StreamConfig::default());
        assert_eq!(report.failed_steps(), 0);
        assert_eq!(report.buffered_bytes, 300);
        assert_eq!(report.steps[1].buffered, vec![[0, 30]]);
        assert_eq!(
            report.steps[3].outcome,
            Outcome::Read {
                items: vec!["0K".into(), "10".into(), "20".into(), "need".into()]
            }
        );
    }

    #[test]
    fn failing_step_is_recorded_and_run_continues() {
        let script = Script::from_json(
            r#"{
                "stream": "audio",
                "steps": [
                    {"op": "append", "buffers": [{"dts_ms": 0, "duration_ms": 10, "keyframe": true}]},
                    {"op": "start_group", "dts_ms": 0},
                    {"op": "append", "buffers": [{"dts_ms": 0, "duration_ms": 10, "keyframe": true, "size": 50}]}
                ]
            }"#,
        )
        .unwrap();

        let report = run(&script, &StreamConfig::default());
        assert_eq!(report.failed_steps(), 1);
        assert!(matches!(report.steps[0].outcome, Outcome::Error { .. }));
        assert_eq!(report.steps[2].outcome, Outcome::Ok);
        assert_eq!(report.buffered_bytes, 50);
    }

    #[test]
    fn script_config_overrides_settings() {
        let script = Script::from_json(
            r#"{
                "stream": "video",
                "config": {"video_memory_limit": 10},
                "steps": [
                    {"op": "gc", "media_time_ms": 0, "size": 100}
                ]
            }"#,
        )
        .unwrap();

        let report = run(&script, &StreamConfig::default());
        assert_eq!(report.failed_steps(), 1);
        assert_eq!(report.media_log.len(), 1);
        assert_eq!(report.media_log[0].kind(), "garbage_collection_failed");
    }

    #[test]
    fn unknown_op_is_a_parse_error() {
        let err = Script::from_json(r#"{"stream": "video", "steps": [{"op": "rewind"}]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("script parse error"));
    }

    #[test]
    fn report_renders_ranges_and_log() {
        let script = Script::from_toml(VIDEO_SCRIPT).unwrap();
        let text = run(&script, &StreamConfig::default()).to_string();
        assert!(text.contains("Stream: video"));
        assert!(text.contains("buffered: [0,30)"));
        assert!(text.contains("read: 0K 10 20 need"));
        assert!(text.contains("Media log: 0 event(s)"));
    }
}
