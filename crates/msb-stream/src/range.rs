//! A contiguous run of buffers with a keyframe index.
//!
//! [`SourceBufferRange`] holds buffers in decode order inside a `VecDeque`
//! and indexes its keyframes in a `BTreeMap` from decode timestamp to buffer
//! position. Positions in the map are offset by `keyframe_map_index_base` so
//! that evicting buffers from the front never forces a renumbering pass.

use msb_core::{DecodeTimestamp, Error, GapPolicy, Result, TimeDelta};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::ops::Bound::{Excluded, Unbounded};

use crate::buffer::Buffer;

/// Whether a buffer may share its decode timestamp with the buffer before it.
///
/// Only a keyframe may be followed by a buffer at the same timestamp:
/// (keyframe, keyframe) and (keyframe, non-keyframe) are allowed.
pub fn allow_same_timestamp(prev_is_keyframe: bool, _current_is_keyframe: bool) -> bool {
    prev_is_keyframe
}

/// Ordered, gap-free (per [`GapPolicy`]) sequence of buffers.
#[derive(Debug, Clone)]
pub struct SourceBufferRange {
    gap_policy: GapPolicy,
    buffers: VecDeque<Buffer>,
    keyframe_map: BTreeMap<DecodeTimestamp, usize>,
    keyframe_map_index_base: usize,
    /// Read cursor. May equal `buffers.len()` when positioned past the end.
    next_buffer_index: Option<usize>,
    /// Explicit start when the range begins in a gap before its first buffer.
    media_segment_start_time: Option<DecodeTimestamp>,
    /// Stream-wide maximum inter-buffer distance; fudge room is twice this.
    approximate_duration: TimeDelta,
    size_in_bytes: usize,
}

impl SourceBufferRange {
    /// Create a range from `buffers`, which must be non-empty and start with
    /// a keyframe.
    pub fn new(
        gap_policy: GapPolicy,
        buffers: Vec<Buffer>,
        media_segment_start_time: Option<DecodeTimestamp>,
        approximate_duration: TimeDelta,
    ) -> Result<Self> {
        let Some(first) = buffers.first() else {
            return Err(Error::invariant("a range needs at least one buffer"));
        };
        if !first.is_keyframe() {
            return Err(Error::invariant("a range must start with a keyframe"));
        }
        if media_segment_start_time.is_some_and(|start| start > first.decode_timestamp()) {
            return Err(Error::invariant(
                "media segment start time is after the first buffer",
            ));
        }
        let mut range = Self::empty(gap_policy, media_segment_start_time, approximate_duration);
        range.push_buffers(buffers);
        Ok(range)
    }

    fn empty(
        gap_policy: GapPolicy,
        media_segment_start_time: Option<DecodeTimestamp>,
        approximate_duration: TimeDelta,
    ) -> Self {
        Self {
            gap_policy,
            buffers: VecDeque::new(),
            keyframe_map: BTreeMap::new(),
            keyframe_map_index_base: 0,
            next_buffer_index: None,
            media_segment_start_time,
            approximate_duration,
            size_in_bytes: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Appending
    // -----------------------------------------------------------------------

    /// Append `buffers` after the current last buffer.
    ///
    /// The first new buffer must continue the range per
    /// [`is_next_in_sequence`](Self::is_next_in_sequence).
    pub fn append_buffers_to_end(&mut self, buffers: Vec<Buffer>) -> Result<()> {
        let Some(first) = buffers.first() else {
            return Ok(());
        };
        if !self.can_append_buffers_to_end(first) {
            return Err(Error::invariant(format!(
                "buffer at {} does not continue range ending at {}",
                first.decode_timestamp(),
                self.end_timestamp()
            )));
        }
        self.push_buffers(buffers);
        Ok(())
    }

    fn push_buffers(&mut self, buffers: impl IntoIterator<Item = Buffer>) {
        let mut buffers = buffers.into_iter().peekable();
        if let Some(first) = buffers.peek() {
            self.adjust_estimated_duration_for_new_append(first.timestamp());
        }

        for buffer in buffers {
            self.size_in_bytes += buffer.data_size();
            if buffer.is_keyframe() {
                let position = self.buffers.len() + self.keyframe_map_index_base;
                self.keyframe_map
                    .entry(buffer.decode_timestamp())
                    .or_insert(position);
            }
            self.buffers.push_back(buffer);
        }
    }

    /// Replace an estimated duration on the current last buffer with the
    /// presentation delta to the first newly appended buffer.
    fn adjust_estimated_duration_for_new_append(&mut self, next_timestamp: TimeDelta) {
        let Some(last) = self.buffers.back_mut() else {
            return;
        };
        if !last.is_duration_estimated() {
            return;
        }
        let delta = next_timestamp - last.timestamp();
        if delta.is_positive() {
            if last.duration() != delta {
                tracing::trace!(
                    "replacing estimated duration {} with {delta} at {}",
                    last.duration(),
                    last.timestamp()
                );
                last.set_duration(delta);
            }
            last.set_duration_estimated(false);
        }
    }

    /// Move all of `range`'s buffers onto the end of this one.
    ///
    /// With `transfer_current_position` the other range's read cursor carries
    /// over.
    pub fn append_range_to_end(
        &mut self,
        range: SourceBufferRange,
        transfer_current_position: bool,
    ) -> Result<()> {
        if !self.can_append_range_to_end(&range) {
            return Err(Error::invariant("ranges are not adjacent"));
        }
        if transfer_current_position {
            if let Some(index) = range.next_buffer_index {
                self.next_buffer_index = Some(index + self.buffers.len());
            }
        }
        self.push_buffers(range.buffers);
        Ok(())
    }

    pub fn can_append_range_to_end(&self, range: &SourceBufferRange) -> bool {
        range
            .buffers
            .front()
            .is_some_and(|first| self.can_append_buffers_to_end(first))
    }

    pub fn can_append_buffers_to_end(&self, first: &Buffer) -> bool {
        self.is_next_in_sequence(first.decode_timestamp(), first.is_keyframe())
    }

    /// Whether a buffer at `timestamp` would continue this range.
    pub fn is_next_in_sequence(&self, timestamp: DecodeTimestamp, is_keyframe: bool) -> bool {
        let Some(last) = self.buffers.back() else {
            return false;
        };
        let end = last.decode_timestamp();
        if end < timestamp
            && (self.gap_policy == GapPolicy::AllowGaps || timestamp <= end + self.fudge_room())
        {
            return true;
        }
        timestamp == end && allow_same_timestamp(last.is_keyframe(), is_keyframe)
    }

    /// Whether a buffer at `timestamp` continues or falls inside this range.
    pub fn belongs_to_range(&self, timestamp: DecodeTimestamp) -> bool {
        self.is_next_in_sequence(timestamp, false)
            || (self.start_timestamp() <= timestamp && timestamp <= self.end_timestamp())
    }

    // -----------------------------------------------------------------------
    // Cursor
    // -----------------------------------------------------------------------

    /// Position the cursor on the first keyframe at or before `timestamp`.
    pub fn seek(&mut self, timestamp: DecodeTimestamp) -> Result<()> {
        if !self.can_seek_to(timestamp) {
            return Err(Error::invariant(format!("cannot seek range {self} to {timestamp}")));
        }
        let Some((_, position)) = self.first_keyframe_at_or_before(timestamp) else {
            return Err(Error::invariant("range has no keyframes"));
        };
        self.next_buffer_index = Some(position);
        Ok(())
    }

    pub fn seek_to_start(&mut self) {
        if !self.buffers.is_empty() {
            self.next_buffer_index = Some(0);
        }
    }

    /// Move the cursor to the first keyframe at or after `timestamp`, or
    /// clear it when there is none.
    pub fn seek_ahead_to(&mut self, timestamp: DecodeTimestamp) {
        self.seek_ahead(timestamp, false);
    }

    /// Like [`seek_ahead_to`](Self::seek_ahead_to) but skips a keyframe at
    /// exactly `timestamp`.
    pub fn seek_ahead_past(&mut self, timestamp: DecodeTimestamp) {
        self.seek_ahead(timestamp, true);
    }

    fn seek_ahead(&mut self, timestamp: DecodeTimestamp, skip_given_timestamp: bool) {
        self.next_buffer_index = self
            .first_keyframe_at(timestamp, skip_given_timestamp)
            .map(|(_, position)| position);
    }

    pub fn can_seek_to(&self, timestamp: DecodeTimestamp) -> bool {
        if self.keyframe_map.is_empty() {
            return false;
        }
        let start = (self.start_timestamp() - self.fudge_room()).max(DecodeTimestamp::ZERO);
        start <= timestamp && timestamp < self.buffered_end_timestamp()
    }

    /// Hand out the buffer under the cursor and advance it.
    pub fn get_next_buffer(&mut self) -> Option<Buffer> {
        let index = self.next_buffer_index.filter(|&i| i < self.buffers.len())?;
        self.next_buffer_index = Some(index + 1);
        self.buffers.get(index).cloned()
    }

    pub fn has_next_buffer(&self) -> bool {
        self.next_buffer_index.is_some_and(|i| i < self.buffers.len())
    }

    pub fn has_next_buffer_position(&self) -> bool {
        self.next_buffer_index.is_some()
    }

    pub fn reset_next_buffer_position(&mut self) {
        self.next_buffer_index = None;
    }

    /// Config id the next buffer will be decoded with.
    pub fn next_config_id(&self) -> Option<usize> {
        self.next_buffer()
            .map(|buffer| buffer.splice_buffer_config_id(0))
    }

    /// Decode timestamp under the cursor; `None` when there is no cursor or
    /// it sits past the end.
    pub fn next_timestamp(&self) -> Option<DecodeTimestamp> {
        self.next_buffer().map(Buffer::decode_timestamp)
    }

    fn next_buffer(&self) -> Option<&Buffer> {
        self.next_buffer_index.and_then(|i| self.buffers.get(i))
    }

    // -----------------------------------------------------------------------
    // Splitting and truncation
    // -----------------------------------------------------------------------

    /// Move everything from the first keyframe at or after `timestamp` into a
    /// new range.
    ///
    /// Returns `None` when there is no such keyframe. The read cursor moves
    /// with the buffers it points into.
    pub fn split_range(&mut self, timestamp: DecodeTimestamp) -> Option<SourceBufferRange> {
        let (keyframe_timestamp, keyframe_index) = self.first_keyframe_at(timestamp, false)?;
        let first_timestamp = self.buffers.front()?.decode_timestamp();

        // Keep the part of the leading gap that lies after the split point.
        let new_range_start = (self.start_timestamp() < first_timestamp
            && timestamp < keyframe_timestamp)
            .then_some(timestamp);

        self.keyframe_map.split_off(&keyframe_timestamp);
        let removed = self.buffers.split_off(keyframe_index);
        self.size_in_bytes -= removed.iter().map(Buffer::data_size).sum::<usize>();

        let mut split = Self::empty(self.gap_policy, new_range_start, self.approximate_duration);
        split.push_buffers(removed);

        if let Some(index) = self.next_buffer_index {
            if index >= self.buffers.len() {
                split.next_buffer_index = Some(index - keyframe_index);
                self.next_buffer_index = None;
            }
        }
        tracing::trace!("split range at {timestamp}: {self} + {split}");
        Some(split)
    }

    /// Delete every buffer at or after `timestamp` (strictly after when
    /// `exclusive`).
    ///
    /// If the read cursor pointed into the deleted part it is cleared and the
    /// buffers from the cursor onwards are returned. The flag reports whether
    /// the range is now empty.
    pub fn truncate_at(
        &mut self,
        timestamp: DecodeTimestamp,
        exclusive: bool,
    ) -> (Vec<Buffer>, bool) {
        let index = self.buffer_index_at(timestamp, exclusive);
        self.truncate_from(index)
    }

    /// Delete everything, returning the buffers from the cursor onwards.
    pub fn delete_all(&mut self) -> Vec<Buffer> {
        self.truncate_from(0).0
    }

    fn truncate_from(&mut self, index: usize) -> (Vec<Buffer>, bool) {
        let Some(cut_timestamp) = self.buffers.get(index).map(Buffer::decode_timestamp) else {
            return (Vec::new(), self.buffers.is_empty());
        };

        let mut removed = self.buffers.split_off(index);
        self.size_in_bytes -= removed.iter().map(Buffer::data_size).sum::<usize>();
        self.keyframe_map.split_off(&cut_timestamp);

        let mut saved = Vec::new();
        if let Some(next) = self.next_buffer_index {
            let next_timestamp = if next < index {
                self.buffers.get(next).map(Buffer::decode_timestamp)
            } else {
                removed.get(next - index).map(Buffer::decode_timestamp)
            };
            if next_timestamp.map_or(true, |t| t >= cut_timestamp) {
                let offset = next.saturating_sub(index);
                if offset < removed.len() {
                    saved = removed.split_off(offset).into();
                }
                self.next_buffer_index = None;
            }
        }
        (saved, self.buffers.is_empty())
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    /// Remove the first GOP, returning the bytes freed and the buffers
    /// deleted. Does nothing if the GOP holds the read cursor.
    pub fn delete_gop_from_front(&mut self) -> (usize, Vec<Buffer>) {
        if self.first_gop_contains_next_buffer_position() {
            return (0, Vec::new());
        }
        let Some((&first_keyframe, _)) = self.keyframe_map.iter().next() else {
            return (0, Vec::new());
        };
        self.keyframe_map.remove(&first_keyframe);

        let end_index = self
            .keyframe_map
            .values()
            .next()
            .map_or(self.buffers.len(), |&position| position - self.keyframe_map_index_base);

        let deleted: Vec<Buffer> = self.buffers.drain(..end_index).collect();
        let bytes = deleted.iter().map(Buffer::data_size).sum::<usize>();
        self.size_in_bytes -= bytes;
        self.keyframe_map_index_base += end_index;

        if let Some(next) = self.next_buffer_index {
            self.next_buffer_index = Some(next.saturating_sub(end_index));
        }
        if end_index > 0 {
            self.media_segment_start_time = None;
        }
        (bytes, deleted)
    }

    /// Remove the last GOP, returning the bytes freed and the buffers deleted
    /// in decode order. Does nothing if the GOP holds the read cursor.
    pub fn delete_gop_from_back(&mut self) -> (usize, Vec<Buffer>) {
        if self.last_gop_contains_next_buffer_position() {
            return (0, Vec::new());
        }
        let Some((&last_keyframe, &position)) = self.keyframe_map.iter().next_back() else {
            return (0, Vec::new());
        };
        self.keyframe_map.remove(&last_keyframe);

        let goal_size = position - self.keyframe_map_index_base;
        let deleted: Vec<Buffer> = self.buffers.split_off(goal_size).into();
        let bytes = deleted.iter().map(Buffer::data_size).sum::<usize>();
        self.size_in_bytes -= bytes;
        (bytes, deleted)
    }

    /// Dry run: how many bytes removing whole GOPs from the first keyframe at
    /// or after `start` towards `end` would free, stopping once
    /// `total_bytes_to_free` is reached. Also returns where such a removal
    /// would end.
    pub fn get_removal_gop(
        &self,
        start: DecodeTimestamp,
        end: DecodeTimestamp,
        total_bytes_to_free: usize,
    ) -> (usize, Option<DecodeTimestamp>) {
        let Some((gop_timestamp, gop_index)) = self.first_keyframe_at(start, false) else {
            return (0, None);
        };

        // `None` stands for the end of the keyframe map.
        let mut gop_end = if end < self.buffered_end_timestamp() {
            self.first_keyframe_at_or_before(end).map(|(t, _)| t)
        } else {
            None
        };

        // [keyframe]...[start]...[end]...[keyframe]: nothing whole to remove.
        let previous = self.keyframe_map.range(..gop_timestamp).next_back();
        if previous.is_some_and(|(&t, _)| Some(t) == gop_end) {
            gop_end = Some(gop_timestamp);
        }

        let mut bytes_to_free = total_bytes_to_free;
        let mut bytes_removed = 0;
        let mut buffer_index = gop_index;
        let mut current = Some(gop_timestamp);

        while current != gop_end && bytes_to_free > 0 {
            let Some(current_timestamp) = current else {
                break;
            };
            let next = self
                .keyframe_map
                .range((Excluded(current_timestamp), Unbounded))
                .next()
                .map(|(&t, &p)| (t, p - self.keyframe_map_index_base));
            let next_gop_index = next.map_or(self.buffers.len(), |(_, index)| index);

            let gop_size = self
                .buffers
                .range(buffer_index..next_gop_index)
                .map(Buffer::data_size)
                .sum::<usize>();
            buffer_index = next_gop_index;

            bytes_removed += gop_size;
            bytes_to_free -= gop_size.min(bytes_to_free);
            current = next.map(|(t, _)| t);
        }

        let removal_end =
            (bytes_removed > 0).then(|| current.unwrap_or_else(|| self.buffered_end_timestamp()));
        (bytes_removed, removal_end)
    }

    pub fn first_gop_contains_next_buffer_position(&self) -> bool {
        let Some(next) = self.next_buffer_index else {
            return false;
        };
        match self.keyframe_map.values().nth(1) {
            Some(&second) => next < second - self.keyframe_map_index_base,
            None => true,
        }
    }

    pub fn last_gop_contains_next_buffer_position(&self) -> bool {
        let Some(next) = self.next_buffer_index else {
            return false;
        };
        if self.keyframe_map.len() <= 1 {
            return true;
        }
        self.keyframe_map
            .values()
            .next_back()
            .is_some_and(|&last| last - self.keyframe_map_index_base <= next)
    }

    /// Whether the whole first GOP lies before `media_time`.
    pub fn first_gop_earlier_than_media_time(&self, media_time: DecodeTimestamp) -> bool {
        if self.keyframe_map.len() == 1 {
            return self.end_timestamp() < media_time;
        }
        self.keyframe_map
            .keys()
            .nth(1)
            .is_some_and(|&second| second <= media_time)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// First keyframe at or after `timestamp` within
    /// `[start_timestamp, buffered_end_timestamp)`.
    ///
    /// A timestamp inside the gap before the first buffer is returned as is.
    pub fn next_keyframe_timestamp(&self, timestamp: DecodeTimestamp) -> Option<DecodeTimestamp> {
        if timestamp < self.start_timestamp() || timestamp >= self.buffered_end_timestamp() {
            return None;
        }
        let (keyframe_timestamp, _) = self.first_keyframe_at(timestamp, false)?;
        let is_first = self
            .keyframe_map
            .keys()
            .next()
            .is_some_and(|&first| first == keyframe_timestamp);
        if is_first
            && self.media_segment_start_time.map_or(true, |s| timestamp > s)
            && timestamp < keyframe_timestamp
        {
            return Some(timestamp);
        }
        Some(keyframe_timestamp)
    }

    /// Last keyframe at or before `timestamp`, within the buffered window.
    pub fn keyframe_before_timestamp(&self, timestamp: DecodeTimestamp) -> Option<DecodeTimestamp> {
        if timestamp < self.start_timestamp() || timestamp >= self.buffered_end_timestamp() {
            return None;
        }
        self.first_keyframe_at_or_before(timestamp).map(|(t, _)| t)
    }

    /// Copies of the buffers presenting within `[start, end)`, starting from
    /// the keyframe before `start`.
    ///
    /// Returns `None` if none overlap, or if a candidate lacks a positive,
    /// exact duration.
    pub fn get_buffers_in_range(
        &self,
        start: DecodeTimestamp,
        end: DecodeTimestamp,
    ) -> Option<Vec<Buffer>> {
        let first_timestamp = self.keyframe_before_timestamp(start)?;
        let from = self.buffer_index_at(first_timestamp, false);
        let start_pts = start.to_presentation_time();
        let end_pts = end.to_presentation_time();

        let mut found = Vec::new();
        for buffer in self.buffers.range(from..) {
            if !buffer.has_positive_duration() || buffer.is_duration_estimated() {
                return None;
            }
            if buffer.timestamp() >= end_pts {
                break;
            }
            if buffer.timestamp() + buffer.duration() <= start_pts {
                continue;
            }
            found.push(buffer.clone());
        }
        (!found.is_empty()).then_some(found)
    }

    /// Whether this range covers all of `range`.
    pub fn completely_overlaps(&self, range: &SourceBufferRange) -> bool {
        self.start_timestamp() <= range.start_timestamp()
            && self.end_timestamp() >= range.end_timestamp()
    }

    /// Whether the end of this range overlaps the start of `range`.
    pub fn end_overlaps(&self, range: &SourceBufferRange) -> bool {
        range.start_timestamp() <= self.end_timestamp()
            && self.end_timestamp() < range.end_timestamp()
    }

    /// Explicit start time if set, else the first buffer's decode timestamp.
    pub fn start_timestamp(&self) -> DecodeTimestamp {
        self.media_segment_start_time
            .or_else(|| self.buffers.front().map(Buffer::decode_timestamp))
            .unwrap_or_default()
    }

    /// Decode timestamp of the last buffer.
    pub fn end_timestamp(&self) -> DecodeTimestamp {
        self.buffers
            .back()
            .map(Buffer::decode_timestamp)
            .unwrap_or_default()
    }

    /// End of the last buffer, using the approximate duration when its own
    /// duration is unknown or zero.
    pub fn buffered_end_timestamp(&self) -> DecodeTimestamp {
        let Some(last) = self.buffers.back() else {
            return DecodeTimestamp::ZERO;
        };
        let mut duration = last.duration();
        if duration.is_no_timestamp() || duration == TimeDelta::ZERO {
            duration = self.approximate_duration;
        }
        last.decode_timestamp() + duration
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter()
    }

    pub fn keyframe_timestamps(&self) -> impl Iterator<Item = DecodeTimestamp> + '_ {
        self.keyframe_map.keys().copied()
    }

    pub fn gap_policy(&self) -> GapPolicy {
        self.gap_policy
    }

    pub fn approximate_duration(&self) -> TimeDelta {
        self.approximate_duration
    }

    pub fn set_approximate_duration(&mut self, duration: TimeDelta) {
        self.approximate_duration = duration;
    }

    pub fn fudge_room(&self) -> TimeDelta {
        self.approximate_duration * 2
    }

    /// Verify byte accounting, keyframe index coherence, decode order and
    /// cursor bounds.
    pub fn check_invariants(&self) -> Result<()> {
        let bytes = self.buffers.iter().map(Buffer::data_size).sum::<usize>();
        if bytes != self.size_in_bytes {
            return Err(Error::invariant(format!(
                "size_in_bytes {} != sum of buffer sizes {bytes}",
                self.size_in_bytes
            )));
        }
        for (timestamp, &position) in &self.keyframe_map {
            let buffer = position
                .checked_sub(self.keyframe_map_index_base)
                .and_then(|i| self.buffers.get(i));
            match buffer {
                Some(b) if b.is_keyframe() && b.decode_timestamp() == *timestamp => {}
                _ => {
                    return Err(Error::invariant(format!(
                        "keyframe index entry {timestamp} -> {position} is stale"
                    )))
                }
            }
        }
        for pair in self.buffers.iter().zip(self.buffers.iter().skip(1)) {
            if pair.1.decode_timestamp() < pair.0.decode_timestamp() {
                return Err(Error::invariant(format!(
                    "decode order broken at {}",
                    pair.1.decode_timestamp()
                )));
            }
        }
        if self.next_buffer_index.is_some_and(|i| i > self.buffers.len()) {
            return Err(Error::invariant("read cursor out of bounds"));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Keyframe index helpers
    // -----------------------------------------------------------------------

    /// Keyframe at or before `timestamp`, or the first keyframe if
    /// `timestamp` precedes all of them. Yields the buffer position.
    fn first_keyframe_at_or_before(
        &self,
        timestamp: DecodeTimestamp,
    ) -> Option<(DecodeTimestamp, usize)> {
        self.keyframe_map
            .range(..=timestamp)
            .next_back()
            .or_else(|| self.keyframe_map.iter().next())
            .map(|(&t, &p)| (t, p - self.keyframe_map_index_base))
    }

    /// First keyframe at (or strictly after, with `skip_given_timestamp`)
    /// `timestamp`. Yields the buffer position.
    fn first_keyframe_at(
        &self,
        timestamp: DecodeTimestamp,
        skip_given_timestamp: bool,
    ) -> Option<(DecodeTimestamp, usize)> {
        let found = if skip_given_timestamp {
            self.keyframe_map.range((Excluded(timestamp), Unbounded)).next()
        } else {
            self.keyframe_map.range(timestamp..).next()
        };
        found.map(|(&t, &p)| (t, p - self.keyframe_map_index_base))
    }

    /// Index of the first buffer at (or strictly after) `timestamp`.
    fn buffer_index_at(&self, timestamp: DecodeTimestamp, skip_given_timestamp: bool) -> usize {
        if skip_given_timestamp {
            self.buffers.partition_point(|b| b.decode_timestamp() <= timestamp)
        } else {
            self.buffers.partition_point(|b| b.decode_timestamp() < timestamp)
        }
    }
}

impl fmt::Display for SourceBufferRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{};{}({})]",
            self.start_timestamp(),
            self.end_timestamp(),
            self.buffered_end_timestamp()
        )
    }
}
