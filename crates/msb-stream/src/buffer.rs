//! Timed media sample.
//!
//! A [`Buffer`] is one encoded access unit plus its timing. Payload bytes are
//! opaque to the engine; only their length counts towards memory budgets.
//! Besides plain samples a buffer can be a *splice buffer*, which owns the
//! pre-splice buffers it overlaps plus a copy of itself, or carry a *preroll*
//! buffer that must be decoded (and discarded) before it. The two roles are
//! mutually exclusive.

use bytes::Bytes;
use msb_core::{DecodeTimestamp, Error, Result, StreamType, TimeDelta};
use std::fmt;

/// An encoded sample with decode and presentation timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    data: Bytes,
    stream_type: StreamType,
    decode_timestamp: DecodeTimestamp,
    timestamp: TimeDelta,
    duration: TimeDelta,
    is_keyframe: bool,
    is_duration_estimated: bool,
    config_id: usize,
    splice_timestamp: Option<TimeDelta>,
    preroll_buffer: Option<Box<Buffer>>,
    splice_buffers: Vec<Buffer>,
    discard_padding: (TimeDelta, TimeDelta),
}

impl Buffer {
    /// Create a buffer at decode and presentation time zero with no duration.
    pub fn new(stream_type: StreamType, data: impl Into<Bytes>, is_keyframe: bool) -> Self {
        Self {
            data: data.into(),
            stream_type,
            decode_timestamp: DecodeTimestamp::ZERO,
            timestamp: TimeDelta::ZERO,
            duration: TimeDelta::NO_TIMESTAMP,
            is_keyframe,
            is_duration_estimated: false,
            config_id: 0,
            splice_timestamp: None,
            preroll_buffer: None,
            splice_buffers: Vec::new(),
            discard_padding: (TimeDelta::ZERO, TimeDelta::ZERO),
        }
    }

    /// Builder-style setter for both timestamps.
    #[must_use]
    pub fn with_timestamps(mut self, decode_timestamp: DecodeTimestamp, timestamp: TimeDelta) -> Self {
        self.decode_timestamp = decode_timestamp;
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: TimeDelta) -> Self {
        self.duration = duration;
        self
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn decode_timestamp(&self) -> DecodeTimestamp {
        self.decode_timestamp
    }

    pub fn set_decode_timestamp(&mut self, timestamp: DecodeTimestamp) {
        self.decode_timestamp = timestamp;
    }

    /// Presentation timestamp.
    pub fn timestamp(&self) -> TimeDelta {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: TimeDelta) {
        self.timestamp = timestamp;
    }

    /// Duration, or [`TimeDelta::NO_TIMESTAMP`] when unknown.
    pub fn duration(&self) -> TimeDelta {
        self.duration
    }

    pub fn set_duration(&mut self, duration: TimeDelta) {
        self.duration = duration;
    }

    /// Whether the duration is known and strictly positive.
    pub fn has_positive_duration(&self) -> bool {
        !self.duration.is_no_timestamp() && self.duration.is_positive()
    }

    pub fn is_keyframe(&self) -> bool {
        self.is_keyframe
    }

    pub fn is_duration_estimated(&self) -> bool {
        self.is_duration_estimated
    }

    pub fn set_duration_estimated(&mut self, estimated: bool) {
        self.is_duration_estimated = estimated;
    }

    pub fn config_id(&self) -> usize {
        self.config_id
    }

    /// Tag this buffer, and any preroll it carries, with `config_id`.
    pub fn set_config_id(&mut self, config_id: usize) {
        self.config_id = config_id;
        if let Some(preroll) = self.preroll_buffer.as_deref_mut() {
            preroll.config_id = config_id;
        }
    }

    /// Splice point of a splice buffer or of a pre-splice component.
    pub fn splice_timestamp(&self) -> Option<TimeDelta> {
        self.splice_timestamp
    }

    pub fn set_splice_timestamp(&mut self, timestamp: Option<TimeDelta>) {
        self.splice_timestamp = timestamp;
    }

    pub fn discard_padding(&self) -> (TimeDelta, TimeDelta) {
        self.discard_padding
    }

    pub fn set_discard_padding(&mut self, front: TimeDelta, back: TimeDelta) {
        self.discard_padding = (front, back);
    }

    pub fn preroll_buffer(&self) -> Option<&Buffer> {
        self.preroll_buffer.as_deref()
    }

    /// Attach a preroll buffer.
    ///
    /// Fails when `self` is a splice buffer, or when the preroll is itself a
    /// splice buffer or carries preroll of its own.
    pub fn set_preroll_buffer(&mut self, preroll: Buffer) -> Result<()> {
        if !self.splice_buffers.is_empty() {
            return Err(Error::invariant("splice buffers cannot carry preroll"));
        }
        if !preroll.splice_buffers.is_empty() || preroll.preroll_buffer.is_some() {
            return Err(Error::invariant("preroll must be a plain buffer"));
        }
        if preroll.timestamp > self.timestamp {
            return Err(Error::invariant("preroll must not start after its buffer"));
        }
        self.preroll_buffer = Some(Box::new(preroll));
        Ok(())
    }

    pub fn splice_buffers(&self) -> &[Buffer] {
        &self.splice_buffers
    }

    /// Config id of the splice component at `index`, or of the buffer itself
    /// when it is not a splice buffer. Indices past the end map to the final
    /// component.
    pub fn splice_buffer_config_id(&self, index: usize) -> usize {
        match self.splice_buffers.get(index).or(self.splice_buffers.last()) {
            Some(buffer) => buffer.config_id,
            None => self.config_id,
        }
    }

    /// Rewrite this buffer as a splice buffer covering `pre_splice_buffers`.
    ///
    /// The components become independent copies of the pre-splice buffers
    /// (each tagged with the splice point) followed by a copy of `self` as it
    /// was, which also takes over any preroll. `self` then adopts the first
    /// pre-splice buffer's decode timestamp, timestamp, keyframe flag and
    /// config, and its duration stretches to whichever ends later: the
    /// overlapping buffer or the pre-splice buffers.
    pub fn convert_to_splice_buffer(&mut self, pre_splice_buffers: &[Buffer]) -> Result<()> {
        let Some(first) = pre_splice_buffers.first() else {
            return Err(Error::invariant("splice requires at least one pre-splice buffer"));
        };
        if !self.splice_buffers.is_empty() {
            return Err(Error::invariant("buffer is already a splice buffer"));
        }
        if !self.has_positive_duration() {
            return Err(Error::invariant(
                "only buffers with a positive duration can become splice buffers",
            ));
        }
        if first.timestamp > self.timestamp {
            return Err(Error::invariant("pre-splice buffers must start before the splice point"));
        }
        if pre_splice_buffers
            .iter()
            .any(|b| !b.splice_buffers.is_empty() || b.preroll_buffer.is_some())
        {
            return Err(Error::invariant(
                "pre-splice buffers cannot be splices or carry preroll",
            ));
        }

        let mut overlapping = self.clone();
        overlapping.splice_timestamp = None;
        self.preroll_buffer = None;

        let splice_timestamp = overlapping.timestamp;
        let end = pre_splice_buffers
            .iter()
            .map(|b| b.timestamp + b.duration)
            .fold(overlapping.timestamp + overlapping.duration, TimeDelta::max);
        self.decode_timestamp = first.decode_timestamp;
        self.config_id = first.config_id;
        self.timestamp = first.timestamp;
        self.is_keyframe = first.is_keyframe;
        self.stream_type = first.stream_type;
        self.splice_timestamp = Some(splice_timestamp);
        self.duration = end - first.timestamp;

        self.splice_buffers = pre_splice_buffers
            .iter()
            .map(|b| {
                let mut copy = b.clone();
                copy.splice_timestamp = Some(splice_timestamp);
                copy
            })
            .collect();
        self.splice_buffers.push(overlapping);
        Ok(())
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} dts={} pts={} dur={}",
            self.stream_type,
            if self.is_keyframe { " K" } else { "" },
            self.decode_timestamp,
            self.timestamp,
            self.duration
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(ms: i64, dur_ms: i64) -> Buffer {
        Buffer::new(StreamType::Audio, vec![0u8; 16], true)
            .with_timestamps(
                DecodeTimestamp::from_milliseconds(ms),
                TimeDelta::from_milliseconds(ms),
            )
            .with_duration(TimeDelta::from_milliseconds(dur_ms))
    }

    #[test]
    fn new_buffer_defaults() {
        let b = Buffer::new(StreamType::Video, Bytes::from_static(b"abc"), false);
        assert_eq!(b.data_size(), 3);
        assert!(!b.is_keyframe());
        assert!(b.duration().is_no_timestamp());
        assert!(!b.has_positive_duration());
        assert_eq!(b.splice_timestamp(), None);
        assert_eq!(b.config_id(), 0);
    }

    #[test]
    fn convert_to_splice_buffer_rewrites_timing() {
        let mut pre_a = audio(0, 10);
        pre_a.set_config_id(1);
        let pre_b = audio(10, 10);
        let mut overlap = audio(15, 10);
        overlap.set_config_id(2);

        overlap.convert_to_splice_buffer(&[pre_a, pre_b]).unwrap();

        assert_eq!(overlap.timestamp(), TimeDelta::ZERO);
        assert_eq!(overlap.decode_timestamp(), DecodeTimestamp::ZERO);
        assert_eq!(overlap.duration(), TimeDelta::from_milliseconds(25));
        assert_eq!(overlap.config_id(), 1);
        assert_eq!(overlap.splice_timestamp(), Some(TimeDelta::from_milliseconds(15)));

        let parts = overlap.splice_buffers();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].splice_timestamp(), Some(TimeDelta::from_milliseconds(15)));
        assert_eq!(parts[1].splice_timestamp(), Some(TimeDelta::from_milliseconds(15)));
        assert_eq!(parts[2].splice_timestamp(), None);
        assert_eq!(parts[2].timestamp(), TimeDelta::from_milliseconds(15));

        assert_eq!(overlap.splice_buffer_config_id(0), 1);
        assert_eq!(overlap.splice_buffer_config_id(2), 2);
        assert_eq!(overlap.splice_buffer_config_id(7), 2);
    }

    #[test]
    fn splice_duration_covers_longer_pre_splice_buffer() {
        let mut overlap = audio(12, 5);
        overlap.convert_to_splice_buffer(&[audio(10, 10)]).unwrap();

        assert_eq!(overlap.timestamp(), TimeDelta::from_milliseconds(10));
        assert_eq!(overlap.duration(), TimeDelta::from_milliseconds(10));
        assert_eq!(overlap.splice_timestamp(), Some(TimeDelta::from_milliseconds(12)));
        assert_eq!(overlap.splice_buffers()[1].duration(), TimeDelta::from_milliseconds(5));
    }

    #[test]
    fn preroll_moves_onto_overlapping_copy() {
        let mut overlap = audio(15, 10);
        overlap.set_preroll_buffer(audio(5, 10)).unwrap();
        overlap.convert_to_splice_buffer(&[audio(10, 10)]).unwrap();

        assert!(overlap.preroll_buffer().is_none());
        assert!(overlap.splice_buffers()[1].preroll_buffer().is_some());
    }

    #[test]
    fn splice_and_preroll_are_exclusive() {
        let mut splice = audio(15, 10);
        splice.convert_to_splice_buffer(&[audio(10, 10)]).unwrap();
        assert!(splice.set_preroll_buffer(audio(0, 5)).is_err());

        let mut with_preroll = audio(20, 10);
        with_preroll.set_preroll_buffer(audio(10, 10)).unwrap();
        let mut next = audio(25, 10);
        assert!(next.convert_to_splice_buffer(&[with_preroll]).is_err());
    }

    #[test]
    fn splice_requires_positive_duration() {
        let mut b = audio(15, 0);
        assert!(b.convert_to_splice_buffer(&[audio(10, 10)]).is_err());
        let mut b = audio(15, 10);
        assert!(b.convert_to_splice_buffer(&[]).is_err());
    }

    #[test]
    fn plain_buffer_config_id_for_any_index() {
        let mut b = audio(0, 10);
        b.set_config_id(3);
        assert_eq!(b.splice_buffer_config_id(0), 3);
        assert_eq!(b.splice_buffer_config_id(5), 3);
    }
}
