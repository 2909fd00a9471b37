//! Shared harness for stream integration tests.
//!
//! Provides [`StreamHarness`], which wraps a [`SourceBufferStream`] together
//! with a recording media log, and a compact text syntax for buffer lists:
//! whitespace-separated millisecond timestamps, `pts|dts` when they differ,
//! with a trailing `K` for keyframes (`"0K 10 20 30K"`).

#![allow(dead_code)]

use std::sync::Arc;

use msb_core::{
    AudioCodec, AudioDecoderConfig, DecodeTimestamp, RecordingMediaLog, StreamConfig, StreamType,
    TimeDelta, VideoCodec, VideoDecoderConfig,
};
use msb_stream::{Buffer, SourceBufferStream, StreamStatus};

pub const BUFFER_SIZE: usize = 100;

pub fn ms(ms: i64) -> TimeDelta {
    TimeDelta::from_milliseconds(ms)
}

pub fn dts(ms: i64) -> DecodeTimestamp {
    DecodeTimestamp::from_milliseconds(ms)
}

/// Parse a buffer list; every buffer lasts 10ms and holds [`BUFFER_SIZE`]
/// bytes.
pub fn parse_buffers(stream_type: StreamType, spec: &str) -> Vec<Buffer> {
    spec.split_whitespace()
        .map(|token| {
            let (body, keyframe) = match token.strip_suffix('K') {
                Some(body) => (body, true),
                None => (token, false),
            };
            let (pts, decode) = body.split_once('|').unwrap_or((body, body));
            Buffer::new(stream_type, vec![0u8; BUFFER_SIZE], keyframe)
                .with_timestamps(dts(decode.parse().unwrap()), ms(pts.parse().unwrap()))
                .with_duration(ms(10))
        })
        .collect()
}

/// A stream plus the media log it reports to.
pub struct StreamHarness {
    pub stream: SourceBufferStream,
    pub log: Arc<RecordingMediaLog>,
}

impl StreamHarness {
    /// H.264 video stream with default settings.
    pub fn video() -> Self {
        Self::video_with(StreamConfig::default())
    }

    pub fn video_with(config: StreamConfig) -> Self {
        let log = Arc::new(RecordingMediaLog::new());
        let stream = SourceBufferStream::new_video(
            VideoDecoderConfig::new(VideoCodec::H264, 1280, 720),
            &config,
            log.clone(),
        );
        Self { stream, log }
    }

    /// 44.1kHz stereo AAC stream with default settings.
    pub fn audio() -> Self {
        let log = Arc::new(RecordingMediaLog::new());
        let stream = SourceBufferStream::new_audio(
            AudioDecoderConfig::new(AudioCodec::Aac, 44_100, 2),
            &StreamConfig::default(),
            log.clone(),
        );
        Self { stream, log }
    }

    /// Start a coded frame group at the first buffer, then append.
    pub fn new_group(&mut self, spec: &str) {
        let buffers = parse_buffers(self.stream.stream_type(), spec);
        self.stream
            .on_start_of_coded_frame_group(buffers[0].decode_timestamp());
        self.stream.append(buffers).expect("append failed");
    }

    pub fn append(&mut self, spec: &str) {
        let buffers = parse_buffers(self.stream.stream_type(), spec);
        self.stream.append(buffers).expect("append failed");
    }

    /// Up to `count` reads rendered as presentation milliseconds, ending at
    /// the first `need`, `config` or `eos`.
    pub fn read(&mut self, count: usize) -> String {
        let mut out = Vec::new();
        for _ in 0..count {
            match self.stream.get_next_buffer().expect("read failed") {
                StreamStatus::Buffer(b) => out.push(format!(
                    "{}{}",
                    b.timestamp().in_milliseconds(),
                    if b.is_keyframe() { "K" } else { "" }
                )),
                StreamStatus::NeedMoreData => {
                    out.push("need".into());
                    break;
                }
                StreamStatus::ConfigChange => {
                    out.push("config".into());
                    break;
                }
                StreamStatus::EndOfStream => {
                    out.push("eos".into());
                    break;
                }
            }
        }
        out.join(" ")
    }

    /// Buffered ranges as `[start,end)` in milliseconds.
    pub fn buffered(&self) -> String {
        self.stream
            .get_buffered_time()
            .iter()
            .map(|r| format!("[{},{})", r.start.in_milliseconds(), r.end.in_milliseconds()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
