//! Stream engine configuration.
//!
//! [`StreamConfig`] can be deserialized from JSON or TOML. Every field has a
//! default, so an empty `{}` (or empty TOML document) is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::media::StreamType;
use crate::time::TimeDelta;
use crate::Error;

const MIB: usize = 1024 * 1024;

/// Tunables shared by every stream created from this config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Byte budget for audio streams.
    pub audio_memory_limit: usize,
    /// Byte budget for video streams.
    pub video_memory_limit: usize,
    /// Byte budget for text streams.
    pub text_memory_limit: usize,
    /// A seek lands on the first buffered range when that range starts
    /// within this many milliseconds.
    pub seek_to_start_fudge_room_ms: i64,
    /// Duration assumed for buffers before any inter-buffer distance has
    /// been observed.
    pub default_buffer_duration_ms: i64,
    pub splice_frames_enabled: bool,
    /// Window after the splice point searched for overlapped audio.
    pub crossfade_duration_ms: i64,
    pub min_splice_duration_us: i64,
    /// Per-kind cap on user-visible media log messages.
    pub max_media_log_messages: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            audio_memory_limit: 12 * MIB,
            video_memory_limit: 150 * MIB,
            text_memory_limit: 12 * MIB,
            seek_to_start_fudge_room_ms: 1000,
            default_buffer_duration_ms: 125,
            splice_frames_enabled: true,
            crossfade_duration_ms: 5,
            min_splice_duration_us: 1000,
            max_media_log_messages: 20,
        }
    }
}

impl StreamConfig {
    /// Deserialize a `StreamConfig` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Deserialize a `StreamConfig` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Parse a config file, picking the format from its extension.
    ///
    /// Files ending in `.toml` are read as TOML; anything else as JSON.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "toml") {
            Self::from_toml(&contents)
        } else {
            Self::from_json(&contents)
        }
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None`, the file does not exist, or it fails to parse.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match Self::from_path(path) {
            Ok(cfg) => cfg,
            Err(Error::Io { source }) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to load config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for (name, limit) in [
            ("audio_memory_limit", self.audio_memory_limit),
            ("video_memory_limit", self.video_memory_limit),
            ("text_memory_limit", self.text_memory_limit),
        ] {
            if limit == 0 {
                warnings.push(format!("{name} is 0; every append will fail garbage collection"));
            }
        }

        if self.seek_to_start_fudge_room_ms < 0 {
            warnings.push("seek_to_start_fudge_room_ms is negative".into());
        }

        if self.default_buffer_duration_ms <= 0 {
            warnings.push(
                "default_buffer_duration_ms must be positive; fudge room will be zero".into(),
            );
        }

        if self.splice_frames_enabled {
            if self.min_splice_duration_us <= 0 {
                warnings.push("min_splice_duration_us should be positive".into());
            }
            if self.crossfade_duration().in_microseconds() < self.min_splice_duration_us {
                warnings.push(format!(
                    "crossfade_duration_ms ({}) is shorter than min_splice_duration_us ({}); no splice can ever be generated",
                    self.crossfade_duration_ms, self.min_splice_duration_us
                ));
            }
        }

        if self.max_media_log_messages == 0 {
            warnings.push("max_media_log_messages is 0; media log messages are suppressed".into());
        }

        warnings
    }

    /// The byte budget for a stream of the given type.
    pub fn memory_limit_for(&self, stream_type: StreamType) -> usize {
        match stream_type {
            StreamType::Audio => self.audio_memory_limit,
            StreamType::Video => self.video_memory_limit,
            StreamType::Text => self.text_memory_limit,
        }
    }

    pub fn seek_to_start_fudge_room(&self) -> TimeDelta {
        TimeDelta::from_milliseconds(self.seek_to_start_fudge_room_ms)
    }

    pub fn default_buffer_duration(&self) -> TimeDelta {
        TimeDelta::from_milliseconds(self.default_buffer_duration_ms)
    }

    pub fn crossfade_duration(&self) -> TimeDelta {
        TimeDelta::from_milliseconds(self.crossfade_duration_ms)
    }

    pub fn min_splice_duration(&self) -> TimeDelta {
        TimeDelta::from_microseconds(self.min_splice_duration_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let cfg = StreamConfig::default();
        assert_eq!(cfg.audio_memory_limit, 12 * 1024 * 1024);
        assert_eq!(cfg.video_memory_limit, 150 * 1024 * 1024);
        assert_eq!(cfg.seek_to_start_fudge_room(), TimeDelta::from_seconds(1));
        assert_eq!(cfg.default_buffer_duration(), TimeDelta::from_milliseconds(125));
        assert!(cfg.splice_frames_enabled);
    }

    #[test]
    fn default_config_no_warnings() {
        let cfg = StreamConfig::default();
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn zero_memory_limit_warns() {
        let cfg = StreamConfig {
            video_memory_limit: 0,
            ..Default::default()
        };
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("video_memory_limit")));
    }

    #[test]
    fn short_crossfade_warns() {
        let cfg = StreamConfig {
            crossfade_duration_ms: 0,
            ..Default::default()
        };
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("crossfade_duration_ms")));
    }

    #[test]
    fn memory_limit_per_stream_type() {
        let cfg = StreamConfig::default();
        assert_eq!(cfg.memory_limit_for(StreamType::Audio), cfg.audio_memory_limit);
        assert_eq!(cfg.memory_limit_for(StreamType::Video), cfg.video_memory_limit);
        assert_eq!(cfg.memory_limit_for(StreamType::Text), cfg.text_memory_limit);
    }

    #[test]
    fn parse_json_config() {
        let cfg = StreamConfig::from_json(r#"{"audio_memory_limit": 4096}"#).unwrap();
        assert_eq!(cfg.audio_memory_limit, 4096);
        assert_eq!(cfg.video_memory_limit, 150 * 1024 * 1024);
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = StreamConfig::from_json("{}").unwrap();
        assert_eq!(cfg, StreamConfig::default());
    }

    #[test]
    fn parse_toml_config() {
        let cfg = StreamConfig::from_toml("splice_frames_enabled = false\ncrossfade_duration_ms = 10\n")
            .unwrap();
        assert!(!cfg.splice_frames_enabled);
        assert_eq!(cfg.crossfade_duration_ms, 10);
    }

    #[test]
    fn invalid_json_is_validation_error() {
        let err = StreamConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn load_or_default_with_none() {
        let cfg = StreamConfig::load_or_default(None);
        assert_eq!(cfg, StreamConfig::default());
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = StreamConfig::load_or_default(Some(Path::new("/nonexistent/msb.json")));
        assert_eq!(cfg, StreamConfig::default());
    }

    #[test]
    fn load_or_default_reads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "text_memory_limit = 1024").unwrap();
        let cfg = StreamConfig::load_or_default(Some(file.path()));
        assert_eq!(cfg.text_memory_limit, 1024);
    }

    #[test]
    fn load_or_default_with_garbage_falls_back() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "[1, 2").unwrap();
        let cfg = StreamConfig::load_or_default(Some(file.path()));
        assert_eq!(cfg, StreamConfig::default());
    }
}
