//! Eviction under the memory limit.
//!
//! Whole GOPs are freed, never single buffers, and never the GOP holding
//! the read cursor. The GOP that received the most recent append is kept by
//! moving it into a range of its own so the next append can continue it.

use msb_core::{DecodeTimestamp, Error, MediaLogEvent, Result, TimeDelta};

use super::{SeekState, SourceBufferStream};
use crate::range::SourceBufferRange;

impl SourceBufferStream {
    /// Make room for `new_data_size` more bytes.
    ///
    /// `media_time` is the current playback position, or the seek target
    /// while a seek is pending. Fails with [`Error::QuotaExceeded`] when the
    /// incoming data can never fit, or when not enough GOPs can be freed
    /// without touching the read position.
    pub fn garbage_collect_if_needed(
        &mut self,
        media_time: TimeDelta,
        new_data_size: usize,
    ) -> Result<()> {
        if media_time.is_no_timestamp() {
            return Err(Error::invariant("garbage collection needs a media time"));
        }
        let buffered = self.get_buffered_size();
        let total = match buffered.checked_add(new_data_size) {
            Some(total) if new_data_size <= self.memory_limit => total,
            _ => return Err(self.quota_exceeded(new_data_size)),
        };
        if total <= self.memory_limit {
            return Ok(());
        }

        let bytes_to_free = total - self.memory_limit;
        let mut media_time = DecodeTimestamp::from_presentation_time(media_time);
        let mut bytes_freed = 0;
        tracing::debug!(
            stream = %self.stream_type,
            buffered,
            new_data_size,
            bytes_to_free,
            %media_time,
            "garbage collection"
        );

        // Playback has moved past the last append: data in between will not
        // be played.
        if self
            .last_appended
            .is_some_and(|last| last.timestamp < media_time)
        {
            bytes_freed += self.free_buffers_after_last_appended(bytes_to_free, media_time)?;

            // Protect the range being appended to, which may hold data
            // prebuffered for a seek that has not been issued yet. Never
            // move past the playback position.
            if let Some(range) = self.range_for_next_append.and_then(|id| self.range(id)) {
                media_time = media_time.min(range.start_timestamp());
            }
        }

        if bytes_freed < bytes_to_free && matches!(self.seek_state, SeekState::Pending(_)) {
            bytes_freed += self.free_buffers(bytes_to_free - bytes_freed, media_time, false)?;
            if bytes_freed < bytes_to_free {
                bytes_freed += self.free_buffers(bytes_to_free - bytes_freed, media_time, true)?;
            }
            if bytes_freed < bytes_to_free {
                if let Some(end) = self.ranges.last().map(|slot| slot.range.end_timestamp()) {
                    bytes_freed += self.free_buffers(bytes_to_free - bytes_freed, end, false)?;
                }
            }
        }

        if bytes_freed < bytes_to_free {
            bytes_freed += self.free_buffers(bytes_to_free - bytes_freed, media_time, false)?;
        }
        if bytes_freed < bytes_to_free {
            bytes_freed += self.free_buffers(bytes_to_free - bytes_freed, media_time, true)?;
        }

        tracing::debug!(bytes_freed, bytes_to_free, "garbage collection done");
        if bytes_freed < bytes_to_free {
            return Err(self.quota_exceeded(new_data_size));
        }
        Ok(())
    }

    fn quota_exceeded(&self, requested: usize) -> Error {
        let buffered = self.get_buffered_size();
        self.media_log.log(MediaLogEvent::GarbageCollectionFailed {
            requested,
            buffered,
            limit: self.memory_limit,
        });
        Error::QuotaExceeded {
            requested,
            buffered,
            limit: self.memory_limit,
        }
    }

    /// Free whole GOPs between the last appended buffer and `media_time`.
    fn free_buffers_after_last_appended(
        &mut self,
        total_bytes_to_free: usize,
        media_time: DecodeTimestamp,
    ) -> Result<usize> {
        let (Some(last), Some(next)) = (self.last_appended, self.get_next_buffer_timestamp())
        else {
            return Ok(0);
        };
        if last.timestamp >= next {
            return Ok(0);
        }

        let mut start = last.timestamp;
        if last.is_keyframe {
            start += self.max_interbuffer_distance();
        }
        if let Some(keyframe) = self.find_keyframe_after_timestamp(start) {
            start = keyframe;
        }
        if start >= media_time {
            return Ok(0);
        }

        let (bytes_freed, removal_end) = self.get_removal_range(start, media_time, total_bytes_to_free);
        if let Some(end) = removal_end.filter(|&end| bytes_freed > 0 && end > start) {
            tracing::debug!(%start, %end, bytes_freed, "freeing data after the last append");
            self.remove(
                start.to_presentation_time(),
                end.to_presentation_time(),
                media_time.to_presentation_time(),
            )?;
        }
        Ok(bytes_freed)
    }

    /// Bytes that removing whole GOPs in `[start, end)` would free, up to
    /// `total_bytes_to_free`, and where that removal would end.
    fn get_removal_range(
        &self,
        start: DecodeTimestamp,
        end: DecodeTimestamp,
        total_bytes_to_free: usize,
    ) -> (usize, Option<DecodeTimestamp>) {
        let mut bytes_freed = 0;
        let mut removal_end = None;
        for slot in &self.ranges {
            if bytes_freed >= total_bytes_to_free || slot.range.start_timestamp() >= end {
                break;
            }
            if slot.range.end_timestamp() < start {
                continue;
            }
            let (bytes, range_end) =
                slot.range
                    .get_removal_gop(start, end, total_bytes_to_free - bytes_freed);
            bytes_freed += bytes;
            if range_end.is_some() {
                removal_end = range_end;
            }
        }
        (bytes_freed, removal_end)
    }

    /// Delete GOPs from the front of the first range (only those wholly
    /// before `media_time`) or from the back of the last range, until
    /// `total_bytes_to_free` bytes are gone.
    fn free_buffers(
        &mut self,
        total_bytes_to_free: usize,
        media_time: DecodeTimestamp,
        reverse_direction: bool,
    ) -> Result<usize> {
        let mut bytes_freed = 0;
        let mut new_range_for_append: Option<SourceBufferRange> = None;

        while bytes_freed < total_bytes_to_free {
            let index = if reverse_direction {
                match self.ranges.len().checked_sub(1) {
                    Some(index) => index,
                    None => break,
                }
            } else if self.ranges.is_empty() {
                break;
            } else {
                0
            };

            let range = &mut self.ranges[index].range;
            let (bytes_deleted, buffers) = if reverse_direction {
                if range.last_gop_contains_next_buffer_position() {
                    break;
                }
                range.delete_gop_from_back()
            } else {
                if !range.first_gop_earlier_than_media_time(media_time)
                    || range.first_gop_contains_next_buffer_position()
                {
                    break;
                }
                range.delete_gop_from_front()
            };
            let Some(last_deleted) = buffers.last().map(|b| b.decode_timestamp()) else {
                break;
            };

            let is_last_appended = self
                .last_appended
                .is_some_and(|last| last.timestamp == last_deleted);
            if is_last_appended && new_range_for_append.is_none() {
                tracing::debug!(%last_deleted, "keeping the last appended GOP in its own range");
                new_range_for_append = Some(self.new_range(buffers, None)?);
                self.range_for_next_append = None;
            } else {
                bytes_freed += bytes_deleted;
            }

            if self.ranges[index].range.is_empty() {
                let slot = self.ranges.remove(index);
                if self.selected_range == Some(slot.id) {
                    self.selected_range = None;
                }
                if self.range_for_next_append == Some(slot.id) {
                    self.range_for_next_append = None;
                }
            }

            // Going further back would leave a hole before the kept GOP.
            if reverse_direction && new_range_for_append.is_some() {
                break;
            }
        }

        if let Some(range) = new_range_for_append {
            let id = self.add_to_ranges(range);
            self.range_for_next_append = Some(id);

            // Rejoin the neighbours if only a little was deleted around it.
            if let Some(index) = self.position_of(id).filter(|&index| index > 0) {
                let before = self.ranges[index - 1].id;
                self.merge_with_adjacent_range_if_necessary(before)?;
            }
            if let Some(id) = self.range_for_next_append {
                self.merge_with_adjacent_range_if_necessary(id)?;
            }
        }
        Ok(bytes_freed)
    }
}
