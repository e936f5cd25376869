//! Encoder session integration tests
//!
//! Drives `EncoderSession` against the scripted backend, whose completions run
//! on a separate worker thread per handle.

mod common;

use std::sync::Arc;
use std::time::Duration;

use layercast::bitstream::{ANNEX_B_START_CODE, split_annex_b};
use layercast::{
    ChannelSink, EncodedFrameSink, EncoderConfig, EncoderSession, ProfileLevel, SessionState,
    VideoCodec,
};

use common::{Script, ScriptedBackend, collect, frame_sequence, raw_frame};

const TIMEOUT: Duration = Duration::from_secs(5);

fn open(
    backend: &ScriptedBackend,
    config: EncoderConfig,
) -> (EncoderSession, layercast::crossbeam_channel::Receiver<layercast::LayerFrame>) {
    let (sink, rx) = ChannelSink::unbounded();
    let sink: Arc<dyn EncodedFrameSink> = Arc::new(sink);
    let session = EncoderSession::create(config, backend, sink).expect("session opens");
    (session, rx)
}

#[test]
fn test_h264_first_frame_is_keyframe_with_sps_pps() {
    let backend = ScriptedBackend::healthy();
    let (session, rx) = open(&backend, EncoderConfig::new(1280, 720));

    for i in 0..3 {
        session.submit(&raw_frame(i));
    }

    let frames = collect(&rx, 3, TIMEOUT);
    assert_eq!(frames.len(), 3);

    let first = &frames[0].frame;
    let sets = first.param_sets.as_ref().expect("first frame carries CSD");
    assert_eq!(sets.len(), 2);
    assert_eq!(&sets[0][..5], &[0x00, 0x00, 0x00, 0x01, 0x67]);
    assert_eq!(&sets[1][..5], &[0x00, 0x00, 0x00, 0x01, 0x68]);

    assert!(frames[1..].iter().all(|f| f.frame.param_sets.is_none()));
    assert_eq!(backend.forced_keyframes(None), vec![true, false, false]);
}

#[test]
fn test_hevc_keyframe_carries_vps_sps_pps() {
    let backend = ScriptedBackend::healthy();
    let config = EncoderConfig::new(1920, 1080)
        .with_codec(VideoCodec::Hevc)
        .with_profile_level(ProfileLevel::Auto);
    let (session, rx) = open(&backend, config);

    session.submit(&raw_frame(0));

    let frames = collect(&rx, 1, TIMEOUT);
    let sets = frames[0].frame.param_sets.as_ref().expect("CSD present");
    assert_eq!(sets.len(), 3);
    let types: Vec<u8> = sets.iter().map(|s| (s[4] >> 1) & 0x3F).collect();
    assert_eq!(types, vec![32, 33, 34]);
}

#[test]
fn test_every_nal_unit_is_annex_b_framed() {
    let backend = ScriptedBackend::healthy();
    let (session, rx) = open(&backend, EncoderConfig::default());

    session.submit(&raw_frame(0));
    session.submit(&raw_frame(1));

    for item in collect(&rx, 2, TIMEOUT) {
        assert_eq!(item.frame.nalus.len(), 2);
        for nal in &item.frame.nalus {
            assert!(nal.starts_with(&ANNEX_B_START_CODE));
        }
    }
}

#[test]
fn test_keyframe_stream_splits_back_into_units() {
    let backend = ScriptedBackend::healthy();
    let (session, rx) = open(&backend, EncoderConfig::default());

    session.submit(&raw_frame(0));
    let frame = collect(&rx, 1, TIMEOUT).remove(0).frame;

    let mut stream = frame.param_sets_annex_b().expect("keyframe CSD").to_vec();
    stream.extend_from_slice(&frame.to_annex_b());

    let units = split_annex_b(&stream);
    let mut expected = common::parameter_sets(VideoCodec::H264);
    expected.extend(frame.nalus.iter().map(|nal| nal.slice(ANNEX_B_START_CODE.len()..)));
    assert_eq!(units, expected);
    assert_eq!(units[2].as_ref(), &[0x09, 0xf0]);
}

#[test]
fn test_output_order_matches_submission_order() {
    let backend = ScriptedBackend::healthy();
    let (session, rx) = open(&backend, EncoderConfig::default().with_layer("f"));

    for i in 0..50 {
        session.submit(&raw_frame(i));
    }

    let sequences: Vec<u64> = collect(&rx, 50, TIMEOUT)
        .iter()
        .map(|item| frame_sequence(&item.frame))
        .collect();
    assert_eq!(sequences, (0..50).collect::<Vec<_>>());
}

#[test]
fn test_short_parameter_set_table_forwards_frame_without_csd() {
    let backend = ScriptedBackend::new(Script {
        parameter_set_count: Some(2),
        ..Default::default()
    });
    let (session, rx) = open(&backend, EncoderConfig::default().with_codec(VideoCodec::Hevc));

    session.submit(&raw_frame(0));

    let frames = collect(&rx, 1, TIMEOUT);
    assert_eq!(frames.len(), 1);
    assert!(frames[0].frame.param_sets.is_none());
    assert_eq!(frames[0].frame.nalus.len(), 2);
}

#[test]
fn test_failed_completion_is_dropped() {
    let backend = ScriptedBackend::new(Script {
        fail_completion: Some(-12911),
        ..Default::default()
    });
    let (session, rx) = open(&backend, EncoderConfig::default());

    session.submit(&raw_frame(0));
    session.stop();

    assert!(rx.is_empty());
    assert_eq!(session.frames_submitted(), 1);
    assert_eq!(session.frames_delivered(), 0);
}

#[test]
fn test_sync_submission_failure_still_counts_frame() {
    let backend = ScriptedBackend::new(Script {
        fail_encode: Some(-12902),
        ..Default::default()
    });
    let (session, rx) = open(&backend, EncoderConfig::default());

    session.submit(&raw_frame(0));
    session.submit(&raw_frame(1));

    assert_eq!(session.frames_submitted(), 2);
    assert_eq!(session.state(), SessionState::Encoding);
    assert!(rx.is_empty());
}

#[test]
fn test_stop_drains_in_flight_frames() {
    let backend = ScriptedBackend::new(Script {
        completion_delay: Some(Duration::from_millis(5)),
        ..Default::default()
    });
    let (session, rx) = open(&backend, EncoderConfig::default());

    for i in 0..10 {
        session.submit(&raw_frame(i));
    }
    session.stop();

    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(rx.len(), 10);
    assert_eq!(backend.invalidated(), 1);
}

#[test]
fn test_stop_is_idempotent_and_final() {
    let backend = ScriptedBackend::healthy();
    let (session, rx) = open(&backend, EncoderConfig::default());

    session.stop();
    session.stop();
    session.submit(&raw_frame(0));

    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.frames_submitted(), 0);
    assert!(rx.is_empty());
    assert_eq!(backend.invalidated(), 1);
}

#[test]
fn test_late_completion_after_stop_is_discarded() {
    let backend = ScriptedBackend::new(Script {
        hold_completions: true,
        ..Default::default()
    });
    let (session, rx) = open(&backend, EncoderConfig::default());

    session.submit(&raw_frame(0));
    session.submit(&raw_frame(1));
    session.stop();
    assert_eq!(backend.held_count(), 2);

    backend.release_held();
    assert!(rx.is_empty());
}

#[test]
fn test_late_completion_after_drop_is_harmless() {
    let backend = ScriptedBackend::new(Script {
        hold_completions: true,
        ..Default::default()
    });
    let (session, rx) = open(&backend, EncoderConfig::default());

    session.submit(&raw_frame(0));
    drop(session);

    backend.release_held();
    assert!(rx.is_empty());
}

#[test]
fn test_stop_races_submitters() {
    let backend = ScriptedBackend::healthy();
    let (session, rx) = open(&backend, EncoderConfig::default());
    let session = Arc::new(session);

    let submitters: Vec<_> = (0..4)
        .map(|t| {
            let session = Arc::clone(&session);
            std::thread::spawn(move || {
                for i in 0..200 {
                    session.submit(&raw_frame(t * 1000 + i));
                }
            })
        })
        .collect();

    std::thread::sleep(Duration::from_millis(2));
    session.stop();

    for handle in submitters {
        handle.join().expect("submitter panicked");
    }

    assert_eq!(session.state(), SessionState::Stopped);
    let delivered = rx.len() as u64;
    assert_eq!(delivered, session.frames_delivered());
    assert!(delivered <= session.frames_submitted());
    // Only the very first accepted submission forces a keyframe.
    let forced = backend.forced_keyframes(None);
    assert!(forced.iter().filter(|f| **f).count() <= 1);
    if let Some(first) = forced.first() {
        assert!(*first);
    }
}

#[test]
fn test_dimensions_past_encoder_range_never_reach_backend() {
    let backend = ScriptedBackend::healthy();
    let (sink, _rx) = ChannelSink::unbounded();

    let result = EncoderSession::create(
        EncoderConfig::new(i32::MAX as u32 + 1, 720).with_layer("f"),
        &*backend,
        Arc::new(sink),
    );

    assert!(matches!(
        result,
        Err(layercast::EncodeError::SessionCreationFailed { ref layer, .. }) if layer == "f"
    ));
    assert!(backend.opened().is_empty());
}

#[test]
fn test_properties_applied_at_open() {
    let backend = ScriptedBackend::healthy();
    let (_session, _rx) = open(&backend, EncoderConfig::new(640, 360).with_fps(15));

    let opened = backend.opened();
    let (_, props) = &opened[0];
    assert!(props.realtime);
    assert!(!props.allow_frame_reordering);
    assert_eq!(props.max_keyframe_interval, 30);
    assert_eq!(props.expected_frame_rate, 15);
}
