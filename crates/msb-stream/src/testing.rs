//! Buffer builders for unit tests.
//!
//! A buffer list is written as whitespace-separated tokens. Each token is a
//! millisecond timestamp, optionally `pts|dts` when the two differ, with a
//! trailing `K` marking a keyframe: `"0K 10 20 30K"`.

use msb_core::{DecodeTimestamp, StreamType, TimeDelta};

use crate::buffer::Buffer;

pub const BUFFER_SIZE: usize = 100;

pub fn dts(ms: i64) -> DecodeTimestamp {
    DecodeTimestamp::from_milliseconds(ms)
}

pub fn ms(ms: i64) -> TimeDelta {
    TimeDelta::from_milliseconds(ms)
}

pub fn buffers(stream_type: StreamType, spec: &str, duration_ms: i64, size: usize) -> Vec<Buffer> {
    spec.split_whitespace()
        .map(|token| {
            let (body, keyframe) = match token.strip_suffix('K') {
                Some(body) => (body, true),
                None => (token, false),
            };
            let (pts, dts_ms) = body.split_once('|').unwrap_or((body, body));
            let pts: i64 = pts.parse().unwrap();
            let dts_ms: i64 = dts_ms.parse().unwrap();
            Buffer::new(stream_type, vec![0u8; size], keyframe)
                .with_timestamps(dts(dts_ms), ms(pts))
                .with_duration(ms(duration_ms))
        })
        .collect()
}

/// Video buffers, 10ms long and 100 bytes each.
pub fn video(spec: &str) -> Vec<Buffer> {
    buffers(StreamType::Video, spec, 10, BUFFER_SIZE)
}

/// Audio buffers, 10ms long and 100 bytes each.
pub fn audio(spec: &str) -> Vec<Buffer> {
    buffers(StreamType::Audio, spec, 10, BUFFER_SIZE)
}

// ---------------------------------------------------------------------------
// Stream helpers
// ---------------------------------------------------------------------------

use msb_core::{
    AudioCodec, AudioDecoderConfig, RecordingMediaLog, StreamConfig, VideoCodec,
    VideoDecoderConfig,
};
use std::sync::Arc;

use crate::stream::{SourceBufferStream, StreamStatus};

pub fn stream_video_config() -> VideoDecoderConfig {
    VideoDecoderConfig::new(VideoCodec::H264, 640, 360)
}

pub fn stream_audio_config() -> AudioDecoderConfig {
    AudioDecoderConfig::new(AudioCodec::Aac, 44_100, 2)
}

pub fn video_stream() -> (SourceBufferStream, Arc<RecordingMediaLog>) {
    let log = Arc::new(RecordingMediaLog::new());
    let stream =
        SourceBufferStream::new_video(stream_video_config(), &StreamConfig::default(), log.clone());
    (stream, log)
}

pub fn audio_stream() -> (SourceBufferStream, Arc<RecordingMediaLog>) {
    let log = Arc::new(RecordingMediaLog::new());
    let stream =
        SourceBufferStream::new_audio(stream_audio_config(), &StreamConfig::default(), log.clone());
    (stream, log)
}

fn stream_buffers(stream: &SourceBufferStream, spec: &str) -> Vec<Buffer> {
    buffers(stream.stream_type(), spec, 10, BUFFER_SIZE)
}

/// Start a coded frame group at the first buffer and append.
pub fn new_group_append(stream: &mut SourceBufferStream, spec: &str) {
    let buffers = stream_buffers(stream, spec);
    stream.on_start_of_coded_frame_group(buffers[0].decode_timestamp());
    stream.append(buffers).unwrap();
}

/// Append to the current coded frame group.
pub fn append(stream: &mut SourceBufferStream, spec: &str) {
    let buffers = stream_buffers(stream, spec);
    stream.append(buffers).unwrap();
}

/// Read up to `count` buffers, rendered in the buffer-list format by
/// presentation time. Stops at the first status that is not a buffer,
/// rendered as `need`, `config` or `eos`.
pub fn read(stream: &mut SourceBufferStream, count: usize) -> String {
    let mut out = Vec::new();
    for _ in 0..count {
        match stream.get_next_buffer().unwrap() {
            StreamStatus::Buffer(buffer) => out.push(format!(
                "{}{}",
                buffer.timestamp().in_milliseconds(),
                if buffer.is_keyframe() { "K" } else { "" }
            )),
            StreamStatus::NeedMoreData => {
                out.push("need".to_string());
                break;
            }
            StreamStatus::ConfigChange => {
                out.push("config".to_string());
                break;
            }
            StreamStatus::EndOfStream => {
                out.push("eos".to_string());
                break;
            }
        }
    }
    out.join(" ")
}

/// Buffered presentation ranges in milliseconds, e.g. `[0,60) [80,100)`.
pub fn buffered(stream: &SourceBufferStream) -> String {
    stream
        .get_buffered_time()
        .iter()
        .map(|r| format!("[{},{})", r.start.in_milliseconds(), r.end.in_milliseconds()))
        .collect::<Vec<_>>()
        .join(" ")
}
