use std::sync::Arc;
use std::time::Duration;

use alerting::{ChannelAlertSink, LogAlertSink};
use camera_capture::{CameraConfig, Plane, RawFrame, Rotation, SyntheticCamera};
use dms::{
    DmsConfig, FrameFeed, MonitorSession, ScriptStep, ScriptedDetector, StateEvent, StatusMessage,
};

/// ~30 fps
const FRAME: Duration = Duration::from_millis(33);

fn frame(sequence: u64) -> RawFrame {
    let config = CameraConfig {
        width: 16,
        height: 12,
        ..Default::default()
    };
    SyntheticCamera::frame(&config, Rotation::Deg270, sequence)
}

/// Offer `count` frames one interval apart
async fn drive(feed: &FrameFeed, sequence: &mut u64, count: u64) {
    for _ in 0..count {
        feed.offer(frame(*sequence));
        *sequence += 1;
        tokio::time::sleep(FRAME).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_ten_seconds_closed_dispatches_twice() {
    let (sink, mut alerts) = ChannelAlertSink::channel(8);
    let handle = MonitorSession::spawn(
        DmsConfig::default(),
        ScriptedDetector::constant(0.05, 0.05),
        sink,
    )
    .unwrap();
    let feed = handle.feed();

    let mut sequence = 0;
    drive(&feed, &mut sequence, 301).await;
    let summary = handle.shutdown().await.unwrap();

    assert_eq!(summary.alerts_dispatched, 2);
    assert_eq!(summary.frames_processed, 301);
    assert_eq!(summary.frames_dropped, 0);

    let first = alerts.recv().await.unwrap();
    let second = alerts.recv().await.unwrap();
    assert_eq!(first.sequence, 1);
    assert!((2000..2100).contains(&first.closed_for_ms));
    assert_eq!(second.sequence, 2);
    assert!((8000..8100).contains(&second.closed_for_ms));
    assert!(alerts.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_slow_detector_drops_instead_of_queueing() {
    let detector = Arc::new(
        ScriptedDetector::constant(0.9, 0.9).with_latency(Duration::from_millis(100)),
    );
    let handle =
        MonitorSession::spawn(DmsConfig::default(), detector.clone(), LogAlertSink).unwrap();
    let feed = handle.feed();

    let mut sequence = 0;
    drive(&feed, &mut sequence, 30).await;
    // let the last admitted frame finish
    tokio::time::sleep(Duration::from_millis(200)).await;
    let summary = handle.shutdown().await.unwrap();

    assert_eq!(detector.max_in_flight(), 1);
    assert!(summary.frames_dropped > 0);
    assert_eq!(summary.frames_processed + summary.frames_dropped, 30);
    assert_eq!(detector.calls(), summary.frames_processed);
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_restarts_closure_timer() {
    let handle = MonitorSession::spawn(
        DmsConfig::default(),
        ScriptedDetector::constant(0.05, 0.05),
        LogAlertSink,
    )
    .unwrap();
    let feed = handle.feed();
    let snapshots = handle.snapshots();

    let mut sequence = 0;
    drive(&feed, &mut sequence, 76).await;
    assert!(snapshots.borrow().alert_dialog_visible);
    assert_eq!(
        snapshots.borrow().status,
        StatusMessage::EyesClosed { seconds: 2 }
    );

    handle.dismiss().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!snapshots.borrow().alert_dialog_visible);
    assert_eq!(snapshots.borrow().status, StatusMessage::Awake);

    // countdown starts again from the next closed frame
    drive(&feed, &mut sequence, 58).await;
    assert!(!snapshots.borrow().alert_dialog_visible);

    drive(&feed, &mut sequence, 5).await;
    assert!(snapshots.borrow().alert_dialog_visible);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_face_loss_resets_frame_verdict() {
    let handle = MonitorSession::spawn(
        DmsConfig::default(),
        ScriptedDetector::new([ScriptStep::eyes(0.05, 0.05), ScriptStep::no_face()]),
        LogAlertSink,
    )
    .unwrap();
    let feed = handle.feed();
    let snapshots = handle.snapshots();

    let mut sequence = 0;
    drive(&feed, &mut sequence, 1).await;
    {
        let analysis = snapshots.borrow();
        assert!(analysis.is_drowsy);
        assert!(analysis.both_eyes_closed);
        assert!(analysis.face_detected());
        assert!(analysis.left_eye_percent < 10.0);
    }

    drive(&feed, &mut sequence, 1).await;
    {
        let analysis = snapshots.borrow();
        assert_eq!(analysis.sequence, 1);
        assert!(!analysis.is_drowsy);
        assert!(!analysis.face_detected());
        assert_eq!(analysis.left_eye_percent, 100.0);
        assert_eq!(analysis.right_eye_percent, 100.0);
        assert_eq!(analysis.rotation, Rotation::Deg270);
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_status_event_after_drowsy_streak() {
    let handle = MonitorSession::spawn(
        DmsConfig::default(),
        ScriptedDetector::constant(0.1, 0.6),
        LogAlertSink,
    )
    .unwrap();
    let feed = handle.feed();
    let mut events = handle.subscribe();

    let mut sequence = 0;
    drive(&feed, &mut sequence, 2).await;
    assert!(events.try_recv().is_err());

    drive(&feed, &mut sequence, 1).await;
    assert!(matches!(
        events.try_recv(),
        Ok(StateEvent::StatusChanged(StatusMessage::Drowsy))
    ));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failures_do_not_stop_the_session() {
    let handle = MonitorSession::spawn(
        DmsConfig::default(),
        ScriptedDetector::new([ScriptStep::fail("model crashed"), ScriptStep::eyes(0.9, 0.9)]),
        LogAlertSink,
    )
    .unwrap();
    let feed = handle.feed();
    let snapshots = handle.snapshots();

    let mut sequence = 0;
    drive(&feed, &mut sequence, 1).await;
    assert!(!snapshots.borrow().face_detected());

    // unconvertible frame: skipped, snapshot untouched
    let broken = RawFrame::new(vec![Plane::packed(vec![0; 4], 16)], 16, 12).with_sequence(99, 0);
    assert!(feed.offer(broken));
    tokio::time::sleep(FRAME).await;
    assert_eq!(snapshots.borrow().sequence, 0);

    drive(&feed, &mut sequence, 1).await;
    assert!(snapshots.borrow().face_detected());
    assert_eq!(snapshots.borrow().sequence, 1);

    let summary = handle.shutdown().await.unwrap();
    assert_eq!(summary.frames_processed, 2);
    assert_eq!(summary.frames_skipped, 1);
}

#[tokio::test]
async fn test_invalid_config_refused() {
    let mut config = DmsConfig::default();
    config.thresholds.both_closed = 2.0;
    assert!(MonitorSession::spawn(config, ScriptedDetector::constant(1.0, 1.0), LogAlertSink)
        .is_err());
}

#[tokio::test]
async fn test_offer_after_shutdown_is_counted() {
    let handle = MonitorSession::spawn(
        DmsConfig::default(),
        ScriptedDetector::constant(0.9, 0.9),
        LogAlertSink,
    )
    .unwrap();
    let feed = handle.feed();
    handle.shutdown().await.unwrap();

    assert!(!feed.offer(frame(0)));
    assert_eq!(feed.rejected(), 1);
    // the permit is released, so the next frame is not a busy drop
    assert!(!feed.offer(frame(1)));
    assert_eq!(feed.rejected(), 2);
    assert_eq!(feed.dropped(), 0);
}
