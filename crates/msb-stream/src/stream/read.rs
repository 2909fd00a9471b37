//! Read-out: the track buffer, the selected range and piecewise delivery of
//! splice and preroll buffers.

use msb_core::{DecodeTimestamp, Error, MediaLogEvent, Result, TimeDelta};
use std::mem;

use super::{PendingDelivery, RangeId, SourceBufferStream, StreamStatus};
use crate::buffer::Buffer;

impl SourceBufferStream {
    /// Hand out the next buffer in decode order, or the reason there is
    /// none.
    ///
    /// A splice buffer is delivered as its pre-splice components, a
    /// [`StreamStatus::ConfigChange`], then the post-splice buffer. A buffer
    /// with preroll is delivered as the preroll followed by the buffer.
    pub fn get_next_buffer(&mut self) -> Result<StreamStatus> {
        if self.config_change_pending {
            return Err(Error::invariant(
                "get_next_buffer called before the pending config change was completed",
            ));
        }

        if matches!(self.pending, PendingDelivery::Idle) {
            let status = self.get_next_buffer_internal()?;
            let StreamStatus::Buffer(buffer) = status else {
                return Ok(status);
            };
            if let Some(plain) = self.set_pending_buffer(buffer) {
                return Ok(StreamStatus::Buffer(plain));
            }
        }

        match self.pending {
            PendingDelivery::Splice { .. } => Ok(self.handle_next_buffer_with_splice()),
            PendingDelivery::Preroll { .. } => Ok(self.handle_next_buffer_with_preroll()),
            PendingDelivery::Idle => Ok(StreamStatus::NeedMoreData),
        }
    }

    /// Acknowledge a [`StreamStatus::ConfigChange`] by switching the current
    /// config to the one the next buffer needs.
    pub fn complete_config_change(&mut self) {
        self.config_change_pending = false;

        match &self.pending {
            PendingDelivery::Splice {
                buffer, next_index, ..
            } => {
                self.current_config_index = buffer.splice_buffer_config_id(*next_index);
                return;
            }
            PendingDelivery::Preroll { buffer, .. } => {
                self.current_config_index = buffer.splice_buffer_config_id(0);
                return;
            }
            PendingDelivery::Idle => {}
        }

        if let Some(front) = self.track_buffer.front() {
            self.current_config_index = front.splice_buffer_config_id(0);
            return;
        }
        if let Some(config_id) = self
            .selected()
            .filter(|range| range.has_next_buffer())
            .and_then(|range| range.next_config_id())
        {
            self.current_config_index = config_id;
        }
    }

    /// Park `buffer` for piecewise delivery, or give it back if it is a
    /// plain buffer.
    fn set_pending_buffer(&mut self, buffer: Buffer) -> Option<Buffer> {
        if !buffer.splice_buffers().is_empty() {
            self.pending = PendingDelivery::Splice {
                buffer,
                next_index: 0,
                fade_in_ready: false,
            };
            None
        } else if buffer.preroll_buffer().is_some() {
            self.pending = PendingDelivery::Preroll {
                buffer,
                preroll_sent: false,
            };
            None
        } else {
            Some(buffer)
        }
    }

    fn handle_next_buffer_with_splice(&mut self) -> StreamStatus {
        let PendingDelivery::Splice {
            buffer,
            next_index,
            fade_in_ready,
        } = &mut self.pending
        else {
            return StreamStatus::NeedMoreData;
        };
        let components = buffer.splice_buffers();
        let last_index = components.len().saturating_sub(1);

        // Pre-splice components first; the last one is the fade-in buffer.
        if *next_index < last_index {
            let component = &components[*next_index];
            if component.config_id() != self.current_config_index {
                self.config_change_pending = true;
                return StreamStatus::ConfigChange;
            }
            let out = component.clone();
            *next_index += 1;
            return StreamStatus::Buffer(out);
        }

        if !*fade_in_ready {
            *fade_in_ready = true;
            self.config_change_pending = true;
            tracing::debug!("issuing config change after splice");
            return StreamStatus::ConfigChange;
        }

        let last = components.last().cloned();
        self.pending = PendingDelivery::Idle;
        let Some(last) = last else {
            return StreamStatus::NeedMoreData;
        };
        match self.set_pending_buffer(last) {
            Some(plain) => StreamStatus::Buffer(plain),
            None => self.handle_next_buffer_with_preroll(),
        }
    }

    fn handle_next_buffer_with_preroll(&mut self) -> StreamStatus {
        let PendingDelivery::Preroll {
            buffer,
            preroll_sent,
        } = &mut self.pending
        else {
            return StreamStatus::NeedMoreData;
        };

        if !*preroll_sent {
            *preroll_sent = true;
            if let Some(preroll) = buffer.preroll_buffer() {
                return StreamStatus::Buffer(preroll.clone());
            }
        }

        match mem::take(&mut self.pending) {
            PendingDelivery::Preroll { buffer, .. } => StreamStatus::Buffer(buffer),
            _ => StreamStatus::NeedMoreData,
        }
    }

    fn get_next_buffer_internal(&mut self) -> Result<StreamStatus> {
        if let Some(front) = self.track_buffer.front() {
            if front.splice_buffer_config_id(0) != self.current_config_index {
                self.config_change_pending = true;
                return Ok(StreamStatus::ConfigChange);
            }
            let Some(buffer) = self.track_buffer.pop_front() else {
                return Ok(StreamStatus::NeedMoreData);
            };
            self.warn_if_track_buffer_exhaustion_skips_forward(&buffer);
            self.last_output_buffer_timestamp = Some(buffer.decode_timestamp());

            // Fall back to the ranges once the track buffer runs dry.
            if self.track_buffer.is_empty() {
                self.just_exhausted_track_buffer = true;
                self.set_selected_range_if_needed(self.last_output_buffer_timestamp)?;
            }
            return Ok(StreamStatus::Buffer(buffer));
        }

        let next_config_id = self
            .selected()
            .filter(|range| range.has_next_buffer())
            .and_then(|range| range.next_config_id());
        let Some(next_config_id) = next_config_id else {
            if self.is_end_of_stream_reached() {
                return Ok(StreamStatus::EndOfStream);
            }
            return Ok(StreamStatus::NeedMoreData);
        };

        if next_config_id != self.current_config_index {
            self.config_change_pending = true;
            return Ok(StreamStatus::ConfigChange);
        }

        let buffer = self
            .selected_range
            .and_then(|id| self.range_mut(id))
            .and_then(|range| range.get_next_buffer());
        let Some(buffer) = buffer else {
            return Ok(StreamStatus::NeedMoreData);
        };
        self.warn_if_track_buffer_exhaustion_skips_forward(&buffer);
        self.last_output_buffer_timestamp = Some(buffer.decode_timestamp());
        Ok(StreamStatus::Buffer(buffer))
    }

    fn warn_if_track_buffer_exhaustion_skips_forward(&mut self, next: &Buffer) {
        if !self.just_exhausted_track_buffer {
            return;
        }
        self.just_exhausted_track_buffer = false;
        let Some(last_output) = self.last_output_buffer_timestamp else {
            return;
        };
        let gap = next.decode_timestamp() - last_output;
        if gap > self.max_interbuffer_distance() {
            self.media_log.log(MediaLogEvent::TrackBufferGap { gap });
        }
    }

    /// Select a range for reading when neither a range nor the track buffer
    /// holds the cursor.
    ///
    /// Without `timestamp`, reading resumes just after the last buffer
    /// handed out.
    pub(super) fn set_selected_range_if_needed(
        &mut self,
        timestamp: Option<DecodeTimestamp>,
    ) -> Result<()> {
        if self.selected_range.is_some() || !self.track_buffer.is_empty() {
            return Ok(());
        }
        let start = match timestamp {
            Some(timestamp) => timestamp,
            None => match self.last_output_buffer_timestamp {
                Some(last) => last + TimeDelta::from_microseconds(1),
                None => return Ok(()),
            },
        };

        let Some((id, seek_timestamp)) = self.find_new_selected_range_seek_timestamp(start) else {
            return Ok(());
        };
        if self
            .range(id)
            .is_some_and(|range| range.can_seek_to(seek_timestamp))
        {
            tracing::debug!(%seek_timestamp, "selecting range to continue reading");
            self.seek_and_set_selected_range(id, seek_timestamp)?;
        }
        Ok(())
    }

    /// Keyframe to resume reading from at or after `start`: in the range
    /// covering `start`, or at the head of the first range after `start` if
    /// that begins within fudge room.
    fn find_new_selected_range_seek_timestamp(
        &self,
        start: DecodeTimestamp,
    ) -> Option<(RangeId, DecodeTimestamp)> {
        let index = self
            .ranges
            .iter()
            .position(|slot| slot.range.end_timestamp() >= start)?;

        let current = &self.ranges[index];
        if let Some(keyframe) = current.range.next_keyframe_timestamp(start) {
            return Some((current.id, keyframe));
        }

        let end = start + self.fudge_room();
        let next = if current.range.start_timestamp() > start {
            current
        } else {
            self.ranges.get(index + 1)?
        };
        if next.range.start_timestamp() >= end {
            return None;
        }
        next.range
            .next_keyframe_timestamp(next.range.start_timestamp())
            .filter(|&keyframe| start < keyframe && keyframe <= end)
            .map(|keyframe| (next.id, keyframe))
    }
}
