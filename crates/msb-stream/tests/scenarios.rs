//! End-to-end playback scenarios through the public stream API.

mod common;

use common::{dts, ms, parse_buffers, StreamHarness};
use msb_core::{AppendError, Error, GapPolicy, StreamConfig, StreamType, TimeDelta};
use msb_stream::{CursorState, SourceBufferRange};

#[test]
fn two_batches_in_one_group_make_one_range() {
    let mut h = StreamHarness::video();
    h.new_group("0K 10 20");
    h.append("30 40 50");

    assert_eq!(h.buffered(), "[0,60)");
    let range = h.stream.ranges().next().unwrap();
    assert_eq!(range.keyframe_timestamps().collect::<Vec<_>>(), vec![dts(0)]);
}

#[test]
fn remove_inside_single_gop_keeps_the_head() {
    let mut h = StreamHarness::video();
    h.new_group("0K 10 20");
    h.append("30 40 50");

    h.stream.remove(ms(15), ms(35), ms(60)).unwrap();
    assert_eq!(h.buffered(), "[0,20)");
    h.stream.check_invariants().unwrap();
}

#[test]
fn seek_then_read_starts_at_keyframe() {
    let mut h = StreamHarness::video();
    h.new_group("0K 10 20");
    h.append("30 40 50");

    h.stream.seek(ms(5)).unwrap();
    assert_eq!(h.read(10), "0K 10 20 30 40 50 need");
}

#[test]
fn same_timestamp_rules_on_append() {
    let mut h = StreamHarness::video();
    h.new_group("100K");
    h.append("100");
    assert_eq!(h.stream.get_buffered_size(), 200);

    let mut h = StreamHarness::video();
    h.new_group("90K 100");
    let result = h
        .stream
        .append(parse_buffers(StreamType::Video, "100K"));
    assert!(matches!(
        result,
        Err(Error::Append(AppendError::InvalidSameTimestamp { .. }))
    ));
    assert_eq!(h.log.count_of("append_rejected"), 1);
}

#[test]
fn same_timestamp_after_non_keyframe_is_rejected() {
    let mut h = StreamHarness::video();
    h.new_group("0K 10");
    let result = h.stream.append(parse_buffers(StreamType::Video, "10"));
    assert!(matches!(
        result,
        Err(Error::Append(AppendError::InvalidSameTimestamp { timestamp })) if timestamp == dts(10)
    ));
    assert_eq!(h.log.count_of("append_rejected"), 1);
    assert_eq!(h.buffered(), "[0,20)");
}

#[test]
fn split_in_leading_gap_starts_at_split_point() {
    let mut range = SourceBufferRange::new(
        GapPolicy::NoGapsAllowed,
        parse_buffers(StreamType::Video, "20K 30 40K 50"),
        Some(dts(0)),
        TimeDelta::from_milliseconds(10),
    )
    .unwrap();
    let split = range.split_range(dts(35)).unwrap();
    assert_eq!(split.start_timestamp(), dts(35));
    assert_eq!(range.start_timestamp(), dts(0));
}

#[test]
fn evicts_whole_gop_before_playback() {
    let mut h = StreamHarness::video();
    h.stream.set_memory_limit(600);
    h.new_group("0K 10 30K 40 60K 70");

    h.stream.garbage_collect_if_needed(ms(50), 150).unwrap();
    assert_eq!(h.buffered(), "[30,80)");

    // Budget plus one can never fit.
    let limit = h.stream.memory_limit();
    assert!(h.stream.garbage_collect_if_needed(ms(50), limit + 1).is_err());
}

#[test]
fn playback_across_append_gaps_and_seeks() {
    let mut h = StreamHarness::video();
    h.new_group("0K 10 20 30K 40 50");
    h.new_group("200K 210 220");
    assert_eq!(h.buffered(), "[0,60) [200,230)");

    h.stream.seek(ms(0)).unwrap();
    assert_eq!(h.read(10), "0K 10 20 30K 40 50 need");

    // Filling the hole lets playback continue into the later range.
    h.new_group("60K 70 80 90 100 110 120 130 140 150 160 170 180 190");
    assert_eq!(h.stream.range_count(), 1);
    assert_eq!(h.read(3), "60K 70 80");

    h.stream.seek(ms(205)).unwrap();
    assert_eq!(h.read(10), "200K 210 220 need");

    h.stream.mark_end_of_stream();
    assert_eq!(h.read(1), "eos");
    h.stream.check_invariants().unwrap();
}

#[test]
fn overwrite_ahead_of_playback_goes_through_track_buffer() {
    let mut h = StreamHarness::video();
    h.new_group("0K 10 20 30K 40 50 60K 70 80");
    h.stream.seek(ms(0)).unwrap();
    assert_eq!(h.read(4), "0K 10 20 30K");

    h.new_group("30K 40 50 60K 70 80");
    assert_eq!(h.stream.cursor_state(), CursorState::TrackBuffer);
    assert_eq!(h.read(10), "40 50 60K 70 80 need");
    h.stream.check_invariants().unwrap();
}

#[test]
fn audio_overlap_is_delivered_as_splice() {
    let mut h = StreamHarness::audio();
    h.new_group("0K 10K 20K 30K 40K");
    h.new_group("25K 35K 45K");
    assert_eq!(h.log.count_of("splice_generated"), 1);

    h.stream.seek(ms(0)).unwrap();
    assert_eq!(h.read(10), "0K 10K 20K config");
    assert!(h.stream.get_current_audio_decoder_config().is_some());
    assert_eq!(h.read(10), "25K 35K 45K need");
}

#[test]
fn overlap_without_splicing_truncates() {
    let config = StreamConfig {
        splice_frames_enabled: false,
        ..StreamConfig::default()
    };
    let mut h = StreamHarness::video_with(config);
    h.new_group("0K 10 20");
    h.new_group("15K 25");
    assert_eq!(h.log.count_of("splice_generated"), 0);
    assert_eq!(h.buffered(), "[0,35)");
}

#[test]
fn removing_the_read_position_continues_through_track_buffer() {
    let mut h = StreamHarness::video();
    h.new_group("0K 10 20 30K 40 50");
    h.stream.seek(ms(0)).unwrap();
    assert_eq!(h.read(1), "0K");

    h.stream.remove(ms(5), ms(25), ms(60)).unwrap();
    assert_eq!(h.buffered(), "[0,10) [30,60)");
    assert_eq!(h.stream.cursor_state(), CursorState::TrackBuffer);
    assert_eq!(h.stream.track_buffer_len(), 2);
    h.stream.check_invariants().unwrap();

    assert_eq!(h.read(10), "10 20 30K 40 50 need");
    h.stream.check_invariants().unwrap();
}

#[test]
fn short_overlap_splice_spans_the_overlapped_buffer() {
    let mut h = StreamHarness::audio();
    h.new_group("0K 10K");

    let mut overlap = parse_buffers(StreamType::Audio, "12K");
    overlap[0].set_duration(ms(5));
    h.stream.on_start_of_coded_frame_group(dts(12));
    h.stream.append(overlap).unwrap();
    assert_eq!(h.log.count_of("splice_generated"), 1);

    assert_eq!(h.buffered(), "[0,20)");
    let range = h.stream.ranges().next().unwrap();
    let splice = range.buffers().nth(1).unwrap();
    assert_eq!(splice.timestamp(), ms(10));
    assert_eq!(splice.duration(), ms(10));
    assert_eq!(splice.splice_timestamp(), Some(ms(12)));

    h.stream.seek(ms(0)).unwrap();
    assert_eq!(h.read(10), "0K 10K config");
    assert!(h.stream.get_current_audio_decoder_config().is_some());
    assert_eq!(h.read(10), "12K need");
}
