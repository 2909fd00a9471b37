//! Media-domain enums and decoder configuration value objects.
//!
//! All enums serialize in lowercase (via `serde(rename_all = "lowercase")`) and
//! implement `Display` manually for consistent string representation. Decoder
//! configs are opaque to the engine beyond codec, encryption and sample rate;
//! two configs "match" when they compare equal.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// StreamType
// ---------------------------------------------------------------------------

/// Kind of elementary stream a buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Audio,
    Video,
    Text,
}

impl StreamType {
    /// Gap tolerance used by ranges holding this type of data.
    pub fn gap_policy(self) -> GapPolicy {
        match self {
            Self::Audio | Self::Video => GapPolicy::NoGapsAllowed,
            Self::Text => GapPolicy::AllowGaps,
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Text => write!(f, "text"),
        }
    }
}

// ---------------------------------------------------------------------------
// GapPolicy
// ---------------------------------------------------------------------------

/// Whether a range may contain gaps between consecutive buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    NoGapsAllowed,
    AllowGaps,
}

// ---------------------------------------------------------------------------
// AudioCodec
// ---------------------------------------------------------------------------

/// Audio codecs a stream may be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Mp3,
    Opus,
    Vorbis,
    Flac,
    Ac3,
    Eac3,
    #[serde(rename = "pcm")]
    Pcm,
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aac => write!(f, "aac"),
            Self::Mp3 => write!(f, "mp3"),
            Self::Opus => write!(f, "opus"),
            Self::Vorbis => write!(f, "vorbis"),
            Self::Flac => write!(f, "flac"),
            Self::Ac3 => write!(f, "ac3"),
            Self::Eac3 => write!(f, "eac3"),
            Self::Pcm => write!(f, "pcm"),
        }
    }
}

// ---------------------------------------------------------------------------
// VideoCodec
// ---------------------------------------------------------------------------

/// Video codecs a stream may be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Hevc,
    Vp8,
    Vp9,
    Av1,
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => write!(f, "h264"),
            Self::Hevc => write!(f, "hevc"),
            Self::Vp8 => write!(f, "vp8"),
            Self::Vp9 => write!(f, "vp9"),
            Self::Av1 => write!(f, "av1"),
        }
    }
}

// ---------------------------------------------------------------------------
// TextKind
// ---------------------------------------------------------------------------

/// Role of a text track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextKind {
    Subtitles,
    Captions,
    Descriptions,
    Metadata,
}

impl fmt::Display for TextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subtitles => write!(f, "subtitles"),
            Self::Captions => write!(f, "captions"),
            Self::Descriptions => write!(f, "descriptions"),
            Self::Metadata => write!(f, "metadata"),
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder configs
// ---------------------------------------------------------------------------

/// Audio decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioDecoderConfig {
    pub codec: AudioCodec,
    pub samples_per_second: u32,
    pub channels: u16,
    #[serde(default)]
    pub is_encrypted: bool,
    /// Codec-specific initialisation bytes.
    #[serde(default)]
    pub extra_data: Vec<u8>,
}

impl AudioDecoderConfig {
    pub fn new(codec: AudioCodec, samples_per_second: u32, channels: u16) -> Self {
        Self {
            codec,
            samples_per_second,
            channels,
            is_encrypted: false,
            extra_data: Vec::new(),
        }
    }
}

impl fmt::Display for AudioDecoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}Hz {}ch{}",
            self.codec,
            self.samples_per_second,
            self.channels,
            if self.is_encrypted { " encrypted" } else { "" }
        )
    }
}

/// Video decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoDecoderConfig {
    pub codec: VideoCodec,
    pub coded_width: u32,
    pub coded_height: u32,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default)]
    pub extra_data: Vec<u8>,
}

impl VideoDecoderConfig {
    pub fn new(codec: VideoCodec, coded_width: u32, coded_height: u32) -> Self {
        Self {
            codec,
            coded_width,
            coded_height,
            is_encrypted: false,
            extra_data: Vec::new(),
        }
    }
}

impl fmt::Display for VideoDecoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{}{}",
            self.codec,
            self.coded_width,
            self.coded_height,
            if self.is_encrypted { " encrypted" } else { "" }
        )
    }
}

/// Text track configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextTrackConfig {
    pub kind: TextKind,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub id: String,
}

impl TextTrackConfig {
    pub fn new(kind: TextKind, label: &str, language: &str, id: &str) -> Self {
        Self {
            kind,
            label: label.into(),
            language: language.into(),
            id: id.into(),
        }
    }
}
