//! Stream controller.
//!
//! [`SourceBufferStream`] owns the sorted, non-overlapping list of
//! [`SourceBufferRange`]s for one elementary track, plus the playback cursor:
//! the selected range, the track buffer and any splice or preroll buffer
//! being handed out piecewise. Appends, removals and seeks go through here;
//! interval-local work is delegated to the ranges.
//!
//! The controller is single-threaded and synchronous. Callers that share a
//! stream across threads must serialize access themselves.

mod gc;
mod read;
mod splice;

use msb_core::{
    AppendError, AudioDecoderConfig, DecodeTimestamp, Error, MediaLog, MediaLogEvent, Result,
    StreamConfig, StreamType, TextTrackConfig, TimeDelta, TimeRanges, VideoDecoderConfig,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::buffer::Buffer;
use crate::range::{allow_same_timestamp, SourceBufferRange};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Stable handle for a range within one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeId(u64);

/// Outcome of [`SourceBufferStream::get_next_buffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Buffer(Buffer),
    /// Nothing buffered at the read position yet.
    NeedMoreData,
    /// The next buffer needs a different decoder config. Fetch it (which
    /// acknowledges the change) before reading on.
    ConfigChange,
    EndOfStream,
}

/// Where the next read will come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CursorState {
    Unseeked,
    SeekPending,
    SelectedRange,
    TrackBuffer,
    /// Seeked, but neither a range nor the track buffer holds the cursor.
    AwaitingData,
    DeliveringSplice { index: usize },
    DeliveringPreroll,
    AwaitingConfigAck,
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unseeked => write!(f, "unseeked"),
            Self::SeekPending => write!(f, "seek pending"),
            Self::SelectedRange => write!(f, "selected range"),
            Self::TrackBuffer => write!(f, "track buffer"),
            Self::AwaitingData => write!(f, "awaiting data"),
            Self::DeliveringSplice { index } => write!(f, "delivering splice component {index}"),
            Self::DeliveringPreroll => write!(f, "delivering preroll"),
            Self::AwaitingConfigAck => write!(f, "awaiting config ack"),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekState {
    Unseeked,
    Pending(TimeDelta),
    Seeked(TimeDelta),
}

impl SeekState {
    fn timestamp(self) -> Option<TimeDelta> {
        match self {
            Self::Unseeked => None,
            Self::Pending(t) | Self::Seeked(t) => Some(t),
        }
    }
}

/// A buffer handed out in several reads.
#[derive(Debug, Default)]
enum PendingDelivery {
    #[default]
    Idle,
    Splice {
        buffer: Buffer,
        next_index: usize,
        fade_in_ready: bool,
    },
    Preroll {
        buffer: Buffer,
        preroll_sent: bool,
    },
}

#[derive(Debug, Clone, Copy)]
struct LastAppended {
    timestamp: DecodeTimestamp,
    is_keyframe: bool,
}

#[derive(Debug, Clone)]
enum DecoderConfigs {
    Audio(Vec<AudioDecoderConfig>),
    Video(Vec<VideoDecoderConfig>),
    Text(TextTrackConfig),
}

#[derive(Debug)]
struct RangeSlot {
    id: RangeId,
    range: SourceBufferRange,
}

// ---------------------------------------------------------------------------
// SourceBufferStream
// ---------------------------------------------------------------------------

/// Buffered media for one track.
pub struct SourceBufferStream {
    stream_type: StreamType,
    media_log: Arc<dyn MediaLog>,

    configs: DecoderConfigs,
    append_config_index: usize,
    current_config_index: usize,

    memory_limit: usize,
    seek_to_start_fudge_room: TimeDelta,
    default_buffer_duration: TimeDelta,
    splice_frames_enabled: bool,
    crossfade_duration: TimeDelta,
    min_splice_duration: TimeDelta,

    /// Sorted by start timestamp, never overlapping.
    ranges: Vec<RangeSlot>,
    next_range_id: u64,
    selected_range: Option<RangeId>,
    range_for_next_append: Option<RangeId>,
    /// Buffers displaced from under the read cursor, played before the
    /// selected range.
    track_buffer: VecDeque<Buffer>,

    seek_state: SeekState,
    pending: PendingDelivery,
    config_change_pending: bool,
    just_exhausted_track_buffer: bool,
    last_output_buffer_timestamp: Option<DecodeTimestamp>,

    coded_frame_group_start_time: Option<DecodeTimestamp>,
    new_coded_frame_group: bool,
    last_appended: Option<LastAppended>,
    max_interbuffer_distance: Option<TimeDelta>,
    end_of_stream: bool,
}

impl SourceBufferStream {
    pub fn new_audio(
        config: AudioDecoderConfig,
        settings: &StreamConfig,
        media_log: Arc<dyn MediaLog>,
    ) -> Self {
        Self::with_configs(StreamType::Audio, DecoderConfigs::Audio(vec![config]), settings, media_log)
    }

    pub fn new_video(
        config: VideoDecoderConfig,
        settings: &StreamConfig,
        media_log: Arc<dyn MediaLog>,
    ) -> Self {
        Self::with_configs(StreamType::Video, DecoderConfigs::Video(vec![config]), settings, media_log)
    }

    pub fn new_text(
        config: TextTrackConfig,
        settings: &StreamConfig,
        media_log: Arc<dyn MediaLog>,
    ) -> Self {
        Self::with_configs(StreamType::Text, DecoderConfigs::Text(config), settings, media_log)
    }

    fn with_configs(
        stream_type: StreamType,
        configs: DecoderConfigs,
        settings: &StreamConfig,
        media_log: Arc<dyn MediaLog>,
    ) -> Self {
        Self {
            stream_type,
            media_log,
            configs,
            append_config_index: 0,
            current_config_index: 0,
            memory_limit: settings.memory_limit_for(stream_type),
            seek_to_start_fudge_room: settings.seek_to_start_fudge_room(),
            default_buffer_duration: settings.default_buffer_duration(),
            splice_frames_enabled: settings.splice_frames_enabled,
            crossfade_duration: settings.crossfade_duration(),
            min_splice_duration: settings.min_splice_duration(),
            ranges: Vec::new(),
            next_range_id: 0,
            selected_range: None,
            range_for_next_append: None,
            track_buffer: VecDeque::new(),
            seek_state: SeekState::Unseeked,
            pending: PendingDelivery::Idle,
            config_change_pending: false,
            just_exhausted_track_buffer: false,
            last_output_buffer_timestamp: None,
            coded_frame_group_start_time: None,
            new_coded_frame_group: false,
            last_appended: None,
            max_interbuffer_distance: None,
            end_of_stream: false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    pub fn set_memory_limit(&mut self, memory_limit: usize) {
        self.memory_limit = memory_limit;
    }

    /// Read-only view of the buffered ranges, in timeline order.
    pub fn ranges(&self) -> impl Iterator<Item = &SourceBufferRange> {
        self.ranges.iter().map(|slot| &slot.range)
    }

    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn track_buffer_len(&self) -> usize {
        self.track_buffer.len()
    }

    pub fn is_end_of_stream_marked(&self) -> bool {
        self.end_of_stream
    }

    /// Presentation intervals currently buffered.
    pub fn get_buffered_time(&self) -> TimeRanges {
        let mut buffered = TimeRanges::new();
        for slot in &self.ranges {
            buffered.add(
                slot.range.start_timestamp().to_presentation_time(),
                slot.range.buffered_end_timestamp().to_presentation_time(),
            );
        }
        buffered
    }

    /// End of the last buffered range, or zero when nothing is buffered.
    pub fn get_buffered_duration(&self) -> TimeDelta {
        self.ranges.last().map_or(TimeDelta::ZERO, |slot| {
            slot.range.buffered_end_timestamp().to_presentation_time()
        })
    }

    pub fn get_buffered_size(&self) -> usize {
        self.ranges.iter().map(|slot| slot.range.size_in_bytes()).sum()
    }

    pub fn cursor_state(&self) -> CursorState {
        if self.config_change_pending {
            return CursorState::AwaitingConfigAck;
        }
        match self.pending {
            PendingDelivery::Splice { next_index, .. } => {
                return CursorState::DeliveringSplice { index: next_index }
            }
            PendingDelivery::Preroll { .. } => return CursorState::DeliveringPreroll,
            PendingDelivery::Idle => {}
        }
        match self.seek_state {
            SeekState::Unseeked => CursorState::Unseeked,
            SeekState::Pending(_) => CursorState::SeekPending,
            SeekState::Seeked(_) if !self.track_buffer.is_empty() => CursorState::TrackBuffer,
            SeekState::Seeked(_) if self.selected_range.is_some() => CursorState::SelectedRange,
            SeekState::Seeked(_) => CursorState::AwaitingData,
        }
    }

    // -----------------------------------------------------------------------
    // Decoder configs
    // -----------------------------------------------------------------------

    /// Register the config for upcoming appends.
    ///
    /// Codec and encryption changes are rejected. A config equal to a known
    /// one reuses its id.
    pub fn update_audio_config(&mut self, config: AudioDecoderConfig) -> Result<()> {
        let stream_type = self.stream_type;
        let DecoderConfigs::Audio(configs) = &mut self.configs else {
            return Err(Error::invariant(format!(
                "audio config update on a {stream_type} stream"
            )));
        };
        if let Some(current) = configs.first() {
            if current.codec != config.codec {
                return Err(config_change_rejected(
                    self.media_log.as_ref(),
                    "Audio codec changes not allowed.",
                ));
            }
            if current.is_encrypted != config.is_encrypted {
                return Err(config_change_rejected(
                    self.media_log.as_ref(),
                    "Audio encryption changes not allowed.",
                ));
            }
        }
        tracing::debug!(%config, "audio config update");
        self.append_config_index = select_config(configs, config);
        Ok(())
    }

    pub fn update_video_config(&mut self, config: VideoDecoderConfig) -> Result<()> {
        let stream_type = self.stream_type;
        let DecoderConfigs::Video(configs) = &mut self.configs else {
            return Err(Error::invariant(format!(
                "video config update on a {stream_type} stream"
            )));
        };
        if let Some(current) = configs.first() {
            if current.codec != config.codec {
                return Err(config_change_rejected(
                    self.media_log.as_ref(),
                    "Video codec changes not allowed.",
                ));
            }
            if current.is_encrypted != config.is_encrypted {
                return Err(config_change_rejected(
                    self.media_log.as_ref(),
                    "Video encryption changes not allowed.",
                ));
            }
        }
        tracing::debug!(%config, "video config update");
        self.append_config_index = select_config(configs, config);
        Ok(())
    }

    /// Config for the read position. Completes a pending config change.
    pub fn get_current_audio_decoder_config(&mut self) -> Option<&AudioDecoderConfig> {
        if self.config_change_pending {
            self.complete_config_change();
        }
        match &self.configs {
            DecoderConfigs::Audio(configs) => configs.get(self.current_config_index),
            _ => None,
        }
    }

    /// Config for the read position. Completes a pending config change.
    pub fn get_current_video_decoder_config(&mut self) -> Option<&VideoDecoderConfig> {
        if self.config_change_pending {
            self.complete_config_change();
        }
        match &self.configs {
            DecoderConfigs::Video(configs) => configs.get(self.current_config_index),
            _ => None,
        }
    }

    pub fn get_current_text_track_config(&self) -> Option<&TextTrackConfig> {
        match &self.configs {
            DecoderConfigs::Text(config) => Some(config),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Append
    // -----------------------------------------------------------------------

    /// Signal that the following appends form a new coded frame group
    /// starting at `start`.
    pub fn on_start_of_coded_frame_group(&mut self, start: DecodeTimestamp) {
        self.coded_frame_group_start_time = Some(start);
        self.new_coded_frame_group = true;
        self.range_for_next_append = self.find_existing_range_for(start);

        // Keep the last-appended state only when the new group directly
        // continues the previous append.
        let adjacent = self.range_for_next_append.is_some()
            && self
                .last_appended
                .is_some_and(|last| self.are_adjacent_in_sequence(last.timestamp, start));
        if !adjacent {
            self.last_appended = None;
        }
        tracing::debug!(%start, adjacent, "start of coded frame group");
    }

    /// Add a decode-ordered batch of buffers.
    ///
    /// On error the batch has to be retried as a whole; no guarantee is
    /// made about partial changes.
    pub fn append(&mut self, mut buffers: Vec<Buffer>) -> Result<()> {
        if self.end_of_stream {
            return Err(self.append_rejected(AppendError::EndOfStream));
        }
        let Some(first) = buffers.first() else {
            return Err(self.append_rejected(AppendError::EmptyBatch));
        };
        let Some(group_start) = self.coded_frame_group_start_time else {
            return Err(self.append_rejected(AppendError::NoCodedFrameGroup));
        };
        if self.new_coded_frame_group && !first.is_keyframe() {
            return Err(self.append_rejected(AppendError::MissingKeyframe));
        }
        self.check_monotonically_increasing(&buffers)?;

        let (first_timestamp, first_is_keyframe) = (first.decode_timestamp(), first.is_keyframe());
        if group_start < DecodeTimestamp::ZERO || first_timestamp < DecodeTimestamp::ZERO {
            return Err(self.append_rejected(AppendError::NegativeTimestamp));
        }
        if !self.is_next_timestamp_valid(first_timestamp, first_is_keyframe) {
            return Err(self.append_rejected(AppendError::InvalidSameTimestamp {
                timestamp: first_timestamp,
            }));
        }

        self.update_max_interbuffer_distance(&buffers);
        for buffer in &mut buffers {
            buffer.set_config_id(self.append_config_index);
        }

        // Read position before any range changes.
        let next_buffer_timestamp = self.get_next_buffer_timestamp();

        let mut deleted_buffers = Vec::new();
        self.prepare_ranges_for_next_append(&mut buffers, &mut deleted_buffers);

        let target = self.range_for_next_append.and_then(|id| self.position_of(id));
        if let Some(index) = target {
            let last = buffers.last().map(|b| LastAppended {
                timestamp: b.decode_timestamp(),
                is_keyframe: b.is_keyframe(),
            });
            if let Err(error) = self.ranges[index].range.append_buffers_to_end(buffers) {
                // Overlap removal already ran; keep the read position alive.
                tracing::error!(%error, "append target cannot take the batch after overlap removal");
                self.move_to_track_buffer(deleted_buffers);
                self.set_selected_range_if_needed(next_buffer_timestamp)?;
                return Err(error);
            }
            self.last_appended = last;
        } else {
            let mut new_range_start =
                group_start.min(buffers.first().map_or(group_start, Buffer::decode_timestamp));

            if !self.new_coded_frame_group {
                // The GOP this append continues may have been removed. Start
                // the new range at the next keyframe, or drop the batch.
                let keyframe = buffers.iter().position(Buffer::is_keyframe);
                let Some(keyframe) = keyframe else {
                    if let (Some(first), Some(last)) = (buffers.first(), buffers.last()) {
                        self.last_appended = Some(LastAppended {
                            timestamp: last.decode_timestamp(),
                            is_keyframe: last.is_keyframe(),
                        });
                        self.media_log.log(MediaLogEvent::SkippedOrphanGop {
                            timestamp: first.timestamp(),
                        });
                    }
                    return Ok(());
                };
                buffers.drain(..keyframe);
                if let Some(first) = buffers.first() {
                    new_range_start = first.decode_timestamp();
                }
            }

            let last = buffers.last().map(|b| LastAppended {
                timestamp: b.decode_timestamp(),
                is_keyframe: b.is_keyframe(),
            });
            let range = self.new_range(buffers, Some(new_range_start))?;
            tracing::debug!(%range, "created range");
            self.range_for_next_append = Some(self.add_to_ranges(range));
            self.last_appended = last;
        }

        self.new_coded_frame_group = false;

        if let Some(id) = self.range_for_next_append {
            self.merge_with_adjacent_range_if_necessary(id)?;
        }

        // Retry a seek that was waiting for data.
        if let SeekState::Pending(timestamp) = self.seek_state {
            self.seek(timestamp)?;
        }

        self.move_to_track_buffer(deleted_buffers);

        // Newly appended keyframes supersede the tail of the track buffer.
        if let Some(front) = self.track_buffer.front().map(Buffer::decode_timestamp) {
            if let Some(keyframe) = self.find_keyframe_after_timestamp(front) {
                self.prune_track_buffer(keyframe);
            }
        }

        self.set_selected_range_if_needed(next_buffer_timestamp)?;
        Ok(())
    }

    fn append_rejected(&self, error: AppendError) -> Error {
        tracing::debug!(stream = %self.stream_type, %error, "append rejected");
        self.media_log.log(MediaLogEvent::AppendRejected {
            reason: error.to_string(),
        });
        Error::Append(error)
    }

    fn check_monotonically_increasing(&self, buffers: &[Buffer]) -> Result<()> {
        let mut prev = self.last_appended.map(|l| (l.timestamp, l.is_keyframe));
        for buffer in buffers {
            let current = buffer.decode_timestamp();
            if let Some((prev_timestamp, prev_is_keyframe)) = prev {
                if current < prev_timestamp {
                    return Err(
                        self.append_rejected(AppendError::NonMonotonic { timestamp: current })
                    );
                }
                if current == prev_timestamp
                    && !allow_same_timestamp(prev_is_keyframe, buffer.is_keyframe())
                {
                    return Err(self.append_rejected(AppendError::InvalidSameTimestamp {
                        timestamp: current,
                    }));
                }
            }
            prev = Some((current, buffer.is_keyframe()));
        }
        Ok(())
    }

    fn is_next_timestamp_valid(&self, next: DecodeTimestamp, next_is_keyframe: bool) -> bool {
        match self.last_appended {
            Some(last) if last.timestamp == next => {
                self.new_coded_frame_group || allow_same_timestamp(last.is_keyframe, next_is_keyframe)
            }
            _ => true,
        }
    }

    fn update_max_interbuffer_distance(&mut self, buffers: &[Buffer]) {
        let mut prev = self.last_appended.map(|l| l.timestamp);
        for buffer in buffers {
            let current = buffer.decode_timestamp();
            let mut distance = buffer.duration();
            if let Some(prev) = prev {
                distance = distance.max(current - prev);
            }
            if distance.is_positive() {
                let max = self.max_interbuffer_distance.map_or(distance, |m| m.max(distance));
                self.max_interbuffer_distance = Some(max);
            }
            prev = Some(current);
        }

        let approximate_duration = self.max_interbuffer_distance();
        for slot in &mut self.ranges {
            slot.range.set_approximate_duration(approximate_duration);
        }
    }

    /// Clear out what the batch overwrites: everything between the last
    /// append and the batch start, then the span the batch itself covers.
    fn prepare_ranges_for_next_append(
        &mut self,
        buffers: &mut [Buffer],
        deleted_buffers: &mut Vec<Buffer>,
    ) {
        if self.splice_frames_enabled {
            self.generate_splice_frame(buffers);
        }
        let (Some(first), Some(last)) = (buffers.first(), buffers.last()) else {
            return;
        };

        let next_timestamp = first.decode_timestamp();
        let next_is_keyframe = first.is_keyframe();
        if let Some(prev) = self.last_appended {
            if prev.timestamp < next_timestamp {
                self.remove_internal(prev.timestamp, next_timestamp, true, deleted_buffers);
            }
        }

        // Keep the previous append's last buffer when the batch legally
        // shares its timestamp. Splices never share a timestamp.
        let exclude_start = first.splice_buffers().is_empty()
            && self.last_appended.is_some_and(|prev| {
                prev.timestamp == next_timestamp
                    && allow_same_timestamp(prev.is_keyframe, next_is_keyframe)
            });

        let start = first.decode_timestamp();
        let mut end = last.decode_timestamp();
        if last.has_positive_duration() {
            end += last.duration();
        } else {
            end += TimeDelta::from_microseconds(1);
        }
        self.remove_internal(start, end, exclude_start, deleted_buffers);
    }

    /// Queue buffers removed from under the read cursor so playback can
    /// continue through them.
    ///
    /// Anything already queued at or after the first removed buffer is
    /// superseded and dropped, which keeps the track buffer in decode order.
    fn move_to_track_buffer(&mut self, deleted_buffers: Vec<Buffer>) {
        let Some(start) = deleted_buffers.first().map(Buffer::decode_timestamp) else {
            return;
        };
        self.prune_track_buffer(start);
        tracing::debug!(
            count = deleted_buffers.len(),
            %start,
            "moving buffers removed from under the read cursor to the track buffer"
        );
        self.track_buffer.extend(deleted_buffers);
    }

    fn prune_track_buffer(&mut self, timestamp: DecodeTimestamp) {
        while self
            .track_buffer
            .back()
            .is_some_and(|b| b.decode_timestamp() >= timestamp)
        {
            self.track_buffer.pop_back();
        }
        tracing::trace!(remaining = self.track_buffer.len(), %timestamp, "pruned track buffer");
    }

    // -----------------------------------------------------------------------
    // Remove
    // -----------------------------------------------------------------------

    /// Remove buffered data in `[start, end)`.
    ///
    /// The end snaps forward to the next keyframe so no range is left
    /// holding orphaned non-keyframes; without one it is clamped to
    /// `duration`.
    pub fn remove(&mut self, start: TimeDelta, end: TimeDelta, duration: TimeDelta) -> Result<()> {
        if start.is_negative() {
            return Err(Error::invariant(format!("remove start {start} is negative")));
        }
        if start >= end {
            return Err(Error::invariant(format!(
                "remove start {start} is not before end {end}"
            )));
        }
        if duration.is_no_timestamp() {
            return Err(Error::invariant("remove needs a known duration"));
        }

        let start_dts = DecodeTimestamp::from_presentation_time(start);
        let end_dts = DecodeTimestamp::from_presentation_time(end);
        let remove_end = match self.find_keyframe_after_timestamp(end_dts) {
            Some(keyframe) => keyframe,
            None => end_dts.min(DecodeTimestamp::from_presentation_time(duration)),
        };
        tracing::debug!(%start_dts, %remove_end, "remove");

        let mut deleted_buffers = Vec::new();
        self.remove_internal(start_dts, remove_end, false, &mut deleted_buffers);

        if let Some(first) = deleted_buffers.first().map(Buffer::decode_timestamp) {
            self.move_to_track_buffer(deleted_buffers);
            self.set_selected_range_if_needed(Some(first))?;
            if self.last_output_buffer_timestamp.is_none() {
                // Nothing was read since the last seek; seek again so the
                // read resumes once the data is re-appended.
                if let Some(timestamp) = self.seek_state.timestamp() {
                    tracing::debug!(%timestamp, "re-seeking after removing the read position");
                    self.seek(timestamp)?;
                }
            }
        }
        Ok(())
    }

    fn remove_internal(
        &mut self,
        start: DecodeTimestamp,
        end: DecodeTimestamp,
        exclude_start: bool,
        deleted_buffers: &mut Vec<Buffer>,
    ) {
        let mut index = 0;
        while index < self.ranges.len() {
            if self.ranges[index].range.start_timestamp() >= end {
                break;
            }
            let id = self.ranges[index].id;

            if let Some(split) = self.ranges[index].range.split_range(end) {
                let has_position = split.has_next_buffer_position();
                let split_id = self.insert_range_at(index + 1, split);
                if has_position {
                    self.set_selected_range(Some(split_id));
                }
            }

            let (saved, delete_range) = self.ranges[index].range.truncate_at(start, exclude_start);
            deleted_buffers.extend(saved);

            if self.selected_range == Some(id)
                && !self.ranges[index].range.has_next_buffer_position()
            {
                self.set_selected_range(None);
            }

            if delete_range {
                self.delete_and_remove_range(index);
                continue;
            }

            // The removal may leave the next append unable to land here.
            if self.range_for_next_append == Some(id) {
                if let Some(last) = self.last_appended {
                    let next_append = last.timestamp + TimeDelta::from_microseconds(1);
                    if !self.ranges[index].range.belongs_to_range(next_append) {
                        tracing::debug!("next append can no longer extend the current range");
                        self.range_for_next_append = self.find_existing_range_for(next_append);
                    }
                }
            }
            index += 1;
        }
    }

    /// Drop everything at or after `duration`.
    pub fn on_set_duration(&mut self, duration: TimeDelta) {
        let duration_dts = DecodeTimestamp::from_presentation_time(duration);
        let Some(mut index) = self
            .ranges
            .iter()
            .position(|slot| slot.range.end_timestamp() > duration_dts)
        else {
            return;
        };

        if self.ranges[index].range.start_timestamp() < duration_dts {
            let id = self.ranges[index].id;
            let (_, delete_range) = self.ranges[index].range.truncate_at(duration_dts, false);
            if self.selected_range == Some(id)
                && !self.ranges[index].range.has_next_buffer_position()
            {
                self.set_selected_range(None);
            }
            if delete_range {
                self.delete_and_remove_range(index);
            } else {
                index += 1;
            }
        }

        while index < self.ranges.len() {
            if self.selected_range == Some(self.ranges[index].id) {
                self.reset_seek_state();
            }
            self.delete_and_remove_range(index);
        }
    }

    // -----------------------------------------------------------------------
    // Seek and end of stream
    // -----------------------------------------------------------------------

    /// Move the read position to `timestamp`.
    ///
    /// Lands on the keyframe at or before `timestamp`. If nothing buffered
    /// covers it the seek stays pending until an append supplies the data.
    pub fn seek(&mut self, timestamp: TimeDelta) -> Result<()> {
        if timestamp.is_negative() {
            return Err(Error::invariant(format!("seek to negative time {timestamp}")));
        }
        self.reset_seek_state();
        self.seek_state = SeekState::Pending(timestamp);

        if self.should_seek_to_start_of_buffered(timestamp) {
            if let Some(first) = self.ranges.first_mut() {
                first.range.seek_to_start();
                let id = first.id;
                self.set_selected_range(Some(id));
            }
            self.seek_state = SeekState::Seeked(timestamp);
            return Ok(());
        }

        let seek_dts = DecodeTimestamp::from_presentation_time(timestamp);
        let Some(id) = self
            .ranges
            .iter()
            .find(|slot| slot.range.can_seek_to(seek_dts))
            .map(|slot| slot.id)
        else {
            tracing::debug!(%timestamp, "seek pending");
            return Ok(());
        };
        self.seek_and_set_selected_range(id, seek_dts)?;
        self.seek_state = SeekState::Seeked(timestamp);
        Ok(())
    }

    /// Whether a seek is waiting for data that can still arrive.
    pub fn is_seek_pending(&self) -> bool {
        matches!(self.seek_state, SeekState::Pending(_))
            && !(self.end_of_stream && self.is_end_selected())
    }

    pub fn mark_end_of_stream(&mut self) {
        self.end_of_stream = true;
    }

    pub fn unmark_end_of_stream(&mut self) {
        self.end_of_stream = false;
    }

    /// Whether the read position is in, or seeking past, the last range.
    pub fn is_end_selected(&self) -> bool {
        let Some(last) = self.ranges.last() else {
            return true;
        };
        if let SeekState::Pending(timestamp) = self.seek_state {
            return timestamp >= last.range.buffered_end_timestamp().to_presentation_time();
        }
        match self.selected_range {
            Some(id) => id == last.id,
            None => true,
        }
    }

    fn is_end_of_stream_reached(&self) -> bool {
        self.end_of_stream && self.track_buffer.is_empty() && self.is_end_selected()
    }

    fn reset_seek_state(&mut self) {
        self.set_selected_range(None);
        self.track_buffer.clear();
        self.config_change_pending = false;
        self.last_output_buffer_timestamp = None;
        self.just_exhausted_track_buffer = false;
        self.pending = PendingDelivery::Idle;
    }

    fn should_seek_to_start_of_buffered(&self, timestamp: TimeDelta) -> bool {
        let Some(first) = self.ranges.first() else {
            return false;
        };
        let beginning = first.range.start_timestamp().to_presentation_time();
        timestamp <= beginning && beginning < self.seek_to_start_fudge_room
    }

    fn seek_and_set_selected_range(&mut self, id: RangeId, timestamp: DecodeTimestamp) -> Result<()> {
        if let Some(range) = self.range_mut(id) {
            range.seek(timestamp)?;
        }
        self.set_selected_range(Some(id));
        Ok(())
    }

    fn set_selected_range(&mut self, id: Option<RangeId>) {
        if let Some(current) = self.selected_range.filter(|&current| Some(current) != id) {
            if let Some(range) = self.range_mut(current) {
                range.reset_next_buffer_position();
            }
        }
        self.selected_range = id;
    }

    // -----------------------------------------------------------------------
    // Range list helpers
    // -----------------------------------------------------------------------

    fn max_interbuffer_distance(&self) -> TimeDelta {
        self.max_interbuffer_distance
            .unwrap_or(self.default_buffer_duration)
    }

    fn fudge_room(&self) -> TimeDelta {
        self.max_interbuffer_distance() * 2
    }

    fn are_adjacent_in_sequence(&self, first: DecodeTimestamp, second: DecodeTimestamp) -> bool {
        first < second && second <= first + self.fudge_room()
    }

    fn new_range(
        &self,
        buffers: Vec<Buffer>,
        media_segment_start_time: Option<DecodeTimestamp>,
    ) -> Result<SourceBufferRange> {
        SourceBufferRange::new(
            self.stream_type.gap_policy(),
            buffers,
            media_segment_start_time,
            self.max_interbuffer_distance(),
        )
    }

    fn position_of(&self, id: RangeId) -> Option<usize> {
        self.ranges.iter().position(|slot| slot.id == id)
    }

    fn range(&self, id: RangeId) -> Option<&SourceBufferRange> {
        self.ranges
            .iter()
            .find(|slot| slot.id == id)
            .map(|slot| &slot.range)
    }

    fn range_mut(&mut self, id: RangeId) -> Option<&mut SourceBufferRange> {
        self.ranges
            .iter_mut()
            .find(|slot| slot.id == id)
            .map(|slot| &mut slot.range)
    }

    fn selected(&self) -> Option<&SourceBufferRange> {
        self.selected_range.and_then(|id| self.range(id))
    }

    fn insert_range_at(&mut self, index: usize, range: SourceBufferRange) -> RangeId {
        let id = RangeId(self.next_range_id);
        self.next_range_id += 1;
        self.ranges.insert(index, RangeSlot { id, range });
        id
    }

    fn add_to_ranges(&mut self, range: SourceBufferRange) -> RangeId {
        let start = range.start_timestamp();
        let index = self
            .ranges
            .iter()
            .position(|slot| slot.range.start_timestamp() > start)
            .unwrap_or(self.ranges.len());
        self.insert_range_at(index, range)
    }

    fn delete_and_remove_range(&mut self, index: usize) -> SourceBufferRange {
        let id = self.ranges[index].id;
        tracing::trace!(range = %self.ranges[index].range, "deleting range");
        if self.selected_range == Some(id) {
            self.set_selected_range(None);
        }
        if self.range_for_next_append == Some(id) {
            self.range_for_next_append = None;
            self.last_appended = None;
        }
        self.ranges.remove(index).range
    }

    fn find_existing_range_for(&self, timestamp: DecodeTimestamp) -> Option<RangeId> {
        self.ranges
            .iter()
            .find(|slot| slot.range.belongs_to_range(timestamp))
            .map(|slot| slot.id)
    }

    fn find_keyframe_after_timestamp(&self, timestamp: DecodeTimestamp) -> Option<DecodeTimestamp> {
        self.find_existing_range_for(timestamp)
            .and_then(|id| self.range(id))
            .and_then(|range| range.next_keyframe_timestamp(timestamp))
    }

    fn get_next_buffer_timestamp(&self) -> Option<DecodeTimestamp> {
        if let Some(front) = self.track_buffer.front() {
            return Some(front.decode_timestamp());
        }
        self.selected().and_then(SourceBufferRange::next_timestamp)
    }

    /// Fold the range after `id` into it when the two are now contiguous.
    fn merge_with_adjacent_range_if_necessary(&mut self, id: RangeId) -> Result<()> {
        let Some(index) = self.position_of(id) else {
            return Ok(());
        };
        let next_index = index + 1;
        let Some(next) = self.ranges.get(next_index) else {
            return Ok(());
        };
        if !self.ranges[index].range.can_append_range_to_end(&next.range) {
            return Ok(());
        }

        let next_id = next.id;
        let transfer_current_position = self.selected_range == Some(next_id);
        let next = self.ranges.remove(next_index).range;
        tracing::trace!(into = %self.ranges[index].range, merging = %next, "merging ranges");
        self.ranges[index]
            .range
            .append_range_to_end(next, transfer_current_position)?;

        if transfer_current_position {
            self.selected_range = Some(id);
        }
        if self.range_for_next_append == Some(next_id) {
            self.range_for_next_append = Some(id);
        }
        Ok(())
    }

    /// Verify range ordering, cursor exclusivity and every range's own
    /// invariants.
    pub fn check_invariants(&self) -> Result<()> {
        for slot in &self.ranges {
            slot.range.check_invariants()?;
            if slot.range.has_next_buffer_position() && self.selected_range != Some(slot.id) {
                return Err(Error::invariant(format!(
                    "unselected range {} holds a read position",
                    slot.range
                )));
            }
        }
        for pair in self.ranges.windows(2) {
            if pair[0].range.end_timestamp() >= pair[1].range.start_timestamp() {
                return Err(Error::invariant(format!(
                    "ranges {} and {} overlap or are out of order",
                    pair[0].range, pair[1].range
                )));
            }
        }
        if self.selected_range.is_some() && !self.track_buffer.is_empty() {
            return Err(Error::invariant(
                "selected range and track buffer both hold the cursor",
            ));
        }
        Ok(())
    }
}

fn config_change_rejected(media_log: &dyn MediaLog, reason: &str) -> Error {
    media_log.log(MediaLogEvent::ConfigChangeRejected {
        reason: reason.to_string(),
    });
    Error::config_change(reason)
}

/// Index of `config` in `configs`, appending it when new.
fn select_config<C: PartialEq>(configs: &mut Vec<C>, config: C) -> usize {
    match configs.iter().position(|c| *c == config) {
        Some(index) => index,
        None => {
            configs.push(config);
            configs.len() - 1
        }
    }
}
