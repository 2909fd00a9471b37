//! Audio splice generation.
//!
//! When a new audio append starts inside an already buffered sample, the
//! overlapped samples are folded into the first new sample so a decoder can
//! crossfade across the seam instead of cutting.

use msb_core::{DecodeTimestamp, MediaLogEvent, StreamType, TimeDelta};

use super::{DecoderConfigs, SourceBufferStream};
use crate::buffer::Buffer;

impl SourceBufferStream {
    /// Turn the first of `buffers` into a splice buffer if it overlaps
    /// buffered audio long enough to crossfade.
    ///
    /// Nothing happens for non-audio streams, when no buffered sample starts
    /// before the splice point within the crossfade window, or when the new
    /// sample exactly replaces an existing one.
    pub(super) fn generate_splice_frame(&mut self, buffers: &mut [Buffer]) {
        if self.stream_type != StreamType::Audio {
            return;
        }
        let Some(first) = buffers.first_mut() else {
            return;
        };

        let splice_timestamp = first.timestamp();
        let splice_dts = DecodeTimestamp::from_presentation_time(splice_timestamp);
        let Some(pre_splice_buffers) = self
            .find_existing_range_for(splice_dts)
            .and_then(|id| self.range(id))
            .and_then(|range| {
                range.get_buffers_in_range(splice_dts, splice_dts + self.crossfade_duration)
            })
        else {
            return;
        };

        // Only buffers after the splice point within the window, or an exact
        // replacement.
        if pre_splice_buffers
            .first()
            .map_or(true, |b| b.timestamp() >= splice_timestamp)
        {
            return;
        }

        let skip = |reason: &str| MediaLogEvent::SpliceSkipped {
            timestamp: splice_timestamp,
            reason: reason.to_string(),
        };

        if pre_splice_buffers.iter().any(|b| !b.splice_buffers().is_empty()) {
            self.media_log
                .log(skip("overlapped buffers contain a pre-existing splice"));
            return;
        }
        if pre_splice_buffers.iter().any(|b| b.preroll_buffer().is_some()) {
            self.media_log
                .log(skip("overlapped buffers contain preroll"));
            return;
        }

        let Some(last) = pre_splice_buffers.last() else {
            return;
        };
        let splice_duration = last.timestamp() + last.duration() - splice_timestamp;
        let minimum = self.minimum_splice_duration();
        if splice_duration < minimum {
            tracing::debug!(%splice_duration, %minimum, "splice too short");
            self.media_log.log(skip(&format!(
                "overlap of {splice_duration} is shorter than {minimum}"
            )));
            return;
        }

        if let Err(error) = first.convert_to_splice_buffer(&pre_splice_buffers) {
            self.media_log.log(skip(&error.to_string()));
            return;
        }
        tracing::debug!(
            %splice_timestamp,
            pre_splice_buffers = pre_splice_buffers.len(),
            "generated splice"
        );
        self.media_log.log(MediaLogEvent::SpliceGenerated {
            timestamp: splice_timestamp,
            pre_splice_buffers: pre_splice_buffers.len(),
        });
    }

    /// At least the configured floor, and at least two samples at the append
    /// config's sample rate.
    fn minimum_splice_duration(&self) -> TimeDelta {
        let samples_per_second = match &self.configs {
            DecoderConfigs::Audio(configs) => configs
                .get(self.append_config_index)
                .map_or(0, |c| c.samples_per_second),
            _ => 0,
        };
        if samples_per_second == 0 {
            return self.min_splice_duration;
        }
        self.min_splice_duration
            .max(TimeDelta::from_seconds_f64(2.0 / f64::from(samples_per_second)))
    }
}
