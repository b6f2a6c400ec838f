//! End-to-end scan flows through the `Scanner` facade with scripted
//! camera, linear and matrix backends.
//!
//! Run: `cargo test -p optiscan-engine --test scan_flow`

mod common;

use std::sync::atomic::Ordering;

use optiscan_core::{CodeKind, DetectionSource, ErrorKind, Facing, RacePhase, ScanMode};
use optiscan_engine::{EngineError, ScannerConfig};

use common::{
    blank_png, eventually, settle, CameraEvent, FakeCamera, Harness, ReentrantHarness,
};

// ── Live barcode ─────────────────────────────────────────────────────

#[tokio::test]
async fn live_barcode_is_reported_once_and_camera_released() {
    let h = Harness::new();
    let session = h
        .scanner
        .start_camera_scan(Facing::Environment)
        .await
        .unwrap();

    assert!(h.linear.emit("ABC-123"));
    eventually("barcode detection", || h.sink.detections().len() == 1).await;

    let detected = h.sink.detections();
    assert_eq!(detected[0].text, "ABC-123");
    assert_eq!(detected[0].kind, CodeKind::Barcode);
    assert_eq!(detected[0].source, DetectionSource::LiveLinear);
    assert_eq!(detected[0].session_id, session);

    assert_eq!(h.camera.log.releases(), 1);
    assert_eq!(h.linear.stop_count(), 1);
    assert_eq!(h.scanner.status().phase, RacePhase::Resolved);

    // the backend keeps its sink, but nothing gets through any more
    assert!(!h.linear.emit("XYZ-999"));
    settle().await;
    assert_eq!(h.sink.detections().len(), 1);
    assert!(h.sink.error_kinds().is_empty());
}

#[tokio::test]
async fn live_barcode_is_normalized() {
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();

    h.linear.emit("  inv-0042\n");
    eventually("barcode detection", || h.sink.detections().len() == 1).await;
    assert_eq!(h.sink.detections()[0].text, "INV-0042");
}

#[tokio::test]
async fn invalid_candidate_does_not_stop_the_race() {
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();

    h.linear.emit("not a code!");
    h.linear.emit("");
    settle().await;

    assert!(h.sink.detections().is_empty());
    assert_eq!(h.scanner.status().phase, RacePhase::Scanning);
    assert_eq!(h.camera.log.releases(), 0);

    h.linear.emit("PC-7");
    eventually("valid candidate wins", || h.sink.detections().len() == 1).await;
    assert_eq!(h.sink.detections()[0].text, "PC-7");
}

// ── Live QR ──────────────────────────────────────────────────────────

#[tokio::test]
async fn live_qr_wins_and_linear_is_stopped() {
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();

    h.matrix.show("https://example.com/asset/42");
    eventually("qr detection", || h.sink.detections().len() == 1).await;

    let detected = h.sink.detections();
    assert_eq!(detected[0].kind, CodeKind::QrCode);
    assert_eq!(detected[0].text, "https://example.com/asset/42");
    assert_eq!(detected[0].source, DetectionSource::LivePoll);

    assert_eq!(h.linear.stop_count(), 1);
    assert!(!h.linear.sink(0).is_bound());
    assert!(!h.linear.emit("ABC-123"));
    assert_eq!(h.camera.log.releases(), 1);

    settle().await;
    assert_eq!(h.sink.detections().len(), 1);
}

#[tokio::test]
async fn simultaneous_reports_resolve_exactly_once() {
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();

    h.matrix.show("QR-PAYLOAD");
    for _ in 0..10 {
        h.linear.emit("ABC-123");
    }

    eventually("one detection", || h.sink.detections().len() == 1).await;
    settle().await;

    assert_eq!(h.sink.detections().len(), 1);
    assert_eq!(h.camera.log.releases(), 1);
    assert_eq!(h.linear.stop_count(), 1);
}

// ── Cancellation ─────────────────────────────────────────────────────

#[tokio::test]
async fn stop_releases_once_and_silences_both_decoders() {
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();

    assert!(h.scanner.stop_camera_scan().await);
    assert_eq!(h.camera.log.releases(), 1);
    assert_eq!(h.scanner.status().phase, RacePhase::Cancelled);

    assert!(!h.linear.emit("ABC-123"));
    h.matrix.show("late");
    settle().await;

    assert!(h.sink.detections().is_empty());
    assert!(h.sink.error_kinds().is_empty());

    assert!(!h.scanner.stop_camera_scan().await);
    assert_eq!(h.camera.log.releases(), 1);
}

#[tokio::test]
async fn poll_loop_stops_after_cancel() {
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();
    settle().await;

    // stop returns only after the poll loop has exited
    assert!(h.scanner.stop_camera_scan().await);
    let calls = h.matrix.calls.load(Ordering::SeqCst);
    settle().await;

    assert_eq!(h.matrix.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn switch_joins_the_old_poll_loop() {
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();
    settle().await;
    h.scanner.switch_facing().await.unwrap();
    h.scanner.shutdown().await;

    let calls = h.matrix.calls.load(Ordering::SeqCst);
    settle().await;
    assert_eq!(h.matrix.calls.load(Ordering::SeqCst), calls);
}

// ── Facing switch ────────────────────────────────────────────────────

#[tokio::test]
async fn switch_releases_old_stream_before_acquiring_new() {
    let h = Harness::new();
    let first = h.scanner.start_camera_scan(Facing::Environment).await.unwrap();
    let second = h.scanner.switch_facing().await.unwrap();
    assert_ne!(first, second);

    assert_eq!(
        h.camera.log.events(),
        vec![
            CameraEvent::Acquire(Facing::Environment),
            CameraEvent::Release(Facing::Environment),
            CameraEvent::Acquire(Facing::User),
        ]
    );
    assert_eq!(h.camera.log.max_open.load(Ordering::SeqCst), 1);

    // old binding is dead, new binding reports into the new session
    assert!(!h.linear.sink(0).detected("OLD-1"));
    assert!(h.linear.sink(1).detected("NEW-1"));

    eventually("detection on new stream", || h.sink.detections().len() == 1).await;
    let detected = h.sink.detections();
    assert_eq!(detected[0].text, "NEW-1");
    assert_eq!(detected[0].session_id, second);
    assert_eq!(h.scanner.status().facing, Facing::User);
}

#[tokio::test]
async fn n_switches_mean_n_releases_and_n_plus_one_acquires() {
    const N: usize = 5;
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();

    for _ in 0..N {
        h.scanner.switch_facing().await.unwrap();
    }

    assert_eq!(h.camera.log.acquires(), N + 1);
    assert_eq!(h.camera.log.releases(), N);
    assert_eq!(h.camera.log.max_open.load(Ordering::SeqCst), 1);
    assert_eq!(h.linear.bindings(), N + 1);
    assert_eq!(h.linear.stop_count(), N);

    // odd number of switches ends on the front camera
    assert_eq!(h.scanner.status().facing, Facing::User);

    h.scanner.stop_camera_scan().await;
    assert_eq!(h.camera.log.releases(), N + 1);
    assert!(h.sink.detections().is_empty());
}

// ── Camera failures ──────────────────────────────────────────────────

#[tokio::test]
async fn camera_denied_starts_nothing() {
    let h = Harness::with(FakeCamera::denied(), ScannerConfig::default());

    let err = h
        .scanner
        .start_camera_scan(Facing::Environment)
        .await
        .unwrap_err();
    assert_eq!(err.error_kind(), Some(ErrorKind::CameraAccessError));
    assert_eq!(h.sink.error_kinds(), vec![ErrorKind::CameraAccessError]);

    settle().await;
    assert_eq!(h.linear.bindings(), 0);
    assert_eq!(h.matrix.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.scanner.status().phase, RacePhase::Idle);
}

// ── Torch ────────────────────────────────────────────────────────────

#[tokio::test]
async fn torch_unsupported_is_reported_and_scan_continues() {
    let h = Harness::with(FakeCamera::without_torch(), ScannerConfig::default());
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();

    let err = h.scanner.toggle_torch().unwrap_err();
    assert_eq!(err.error_kind(), Some(ErrorKind::TorchUnsupported));
    assert_eq!(h.sink.error_kinds(), vec![ErrorKind::TorchUnsupported]);

    let status = h.scanner.status();
    assert!(!status.torch.on);
    assert_eq!(status.torch.supported, Some(false));
    assert_eq!(status.phase, RacePhase::Scanning);
    assert_eq!(h.camera.log.releases(), 0);

    h.linear.emit("ABC-123");
    eventually("scan still resolves", || h.sink.detections().len() == 1).await;
}

#[tokio::test]
async fn torch_toggles_and_resets_with_the_camera() {
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();

    assert!(h.scanner.toggle_torch().unwrap());
    assert!(h.scanner.status().torch.on);
    assert!(!h.scanner.toggle_torch().unwrap());
    assert!(h.scanner.toggle_torch().unwrap());

    h.scanner.switch_facing().await.unwrap();
    let status = h.scanner.status();
    assert!(!status.torch.on);
    assert_eq!(status.torch.supported, None);
    assert_eq!(h.camera.log.torch_applied(), vec![true, false, true, false]);
}

#[tokio::test]
async fn stop_switches_torch_off_before_release() {
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();
    assert!(h.scanner.toggle_torch().unwrap());

    h.scanner.stop_camera_scan().await;
    assert_eq!(h.camera.log.torch_applied(), vec![true, false]);
    assert_eq!(h.camera.log.releases(), 1);
}

#[tokio::test]
async fn detection_switches_torch_off() {
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();
    assert!(h.scanner.toggle_torch().unwrap());

    h.linear.emit("ABC-123");
    eventually("barcode detection", || h.sink.detections().len() == 1).await;
    assert_eq!(h.camera.log.torch_applied(), vec![true, false]);
}

#[tokio::test]
async fn torch_left_off_is_not_touched_on_stop() {
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();
    h.scanner.stop_camera_scan().await;
    assert!(h.camera.log.torch_applied().is_empty());
}

#[tokio::test]
async fn torch_without_camera() {
    let h = Harness::new();
    let err = h.scanner.toggle_torch().unwrap_err();
    assert_eq!(err.error_kind(), Some(ErrorKind::NoActiveCamera));
    assert!(!err.is_fatal());
}

// ── Uploads ──────────────────────────────────────────────────────────

#[tokio::test]
async fn uploaded_qr_skips_linear_decoder() {
    let h = Harness::new();
    h.matrix.show("https://example.com");

    let result = h.scanner.decode_uploaded_image(blank_png()).await.unwrap();
    assert_eq!(result.kind, CodeKind::QrCode);
    assert_eq!(result.text, "https://example.com");
    assert_eq!(result.source, DetectionSource::Upload);

    assert_eq!(h.linear.single_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.sink.detections(), vec![result]);
    assert!(h.sink.error_kinds().is_empty());
}

#[tokio::test]
async fn uploaded_barcode_uses_single_shot_decoder() {
    let h = Harness::new();
    *h.linear.single_answer.lock().unwrap() = Some("asset-77".to_string());

    let result = h.scanner.decode_uploaded_image(blank_png()).await.unwrap();
    assert_eq!(result.kind, CodeKind::Barcode);
    assert_eq!(result.text, "ASSET-77");
    assert_eq!(h.linear.single_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn uploaded_image_without_code_is_unrecognized() {
    let h = Harness::new();

    let err = h.scanner.decode_uploaded_image(blank_png()).await.unwrap_err();
    assert_eq!(err.error_kind(), Some(ErrorKind::UnrecognizedImage));
    assert_eq!(h.sink.error_kinds(), vec![ErrorKind::UnrecognizedImage]);
    assert!(h.sink.detections().is_empty());
}

#[tokio::test]
async fn uploaded_garbage_and_oversized_files_are_unrecognized() {
    let mut config = ScannerConfig::default();
    config.upload.max_bytes = 48;
    let h = Harness::with(FakeCamera::new(), config);
    h.matrix.show("never reached");

    let err = h
        .scanner
        .decode_uploaded_image(b"GIF89a but not really".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ImageDecode(_)));

    let err = h.scanner.decode_uploaded_image(blank_png()).await.unwrap_err();
    assert_eq!(err.error_kind(), Some(ErrorKind::UnrecognizedImage));

    let err = h.scanner.decode_uploaded_image(Vec::new()).await.unwrap_err();
    assert_eq!(err.error_kind(), Some(ErrorKind::UnrecognizedImage));

    assert_eq!(h.sink.error_kinds().len(), 3);
    assert!(h.sink.detections().is_empty());
}

#[tokio::test]
async fn upload_cancels_live_scan() {
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();
    h.matrix.show("from-upload");

    // the live race may not see the QR first: the upload stops it
    let result = h.scanner.decode_uploaded_image(blank_png()).await;
    settle().await;

    assert_eq!(h.camera.log.releases(), 1);
    assert_eq!(h.scanner.status().mode, ScanMode::Upload);
    assert!(!h.linear.emit("ABC-123"));

    // either the live poll won before the upload started, or the upload did
    let detections = h.sink.detections();
    assert!(!detections.is_empty() && detections.len() <= 2);
    if let Ok(result) = result {
        assert_eq!(result.source, DetectionSource::Upload);
    }
}

// ── Poll cutoff ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn poll_bound_times_out_with_full_teardown() {
    let mut config = ScannerConfig::default();
    config.poll.max_ticks = 30;
    let h = Harness::with(FakeCamera::new(), config);

    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();
    eventually("scan timeout", || !h.sink.error_kinds().is_empty()).await;

    assert_eq!(h.sink.error_kinds(), vec![ErrorKind::ScanTimeout]);
    assert!(h.sink.detections().is_empty());
    assert_eq!(h.camera.log.releases(), 1);
    assert_eq!(h.linear.stop_count(), 1);
    assert_eq!(h.scanner.status().phase, RacePhase::Cancelled);

    assert!(!h.linear.emit("ABC-123"));
}

#[tokio::test(start_paused = true)]
async fn unbounded_poll_keeps_scanning() {
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_secs(120)).await;

    assert_eq!(h.scanner.status().phase, RacePhase::Scanning);
    assert!(h.sink.error_kinds().is_empty());
    assert!(h.matrix.calls.load(Ordering::SeqCst) > 1000);
}

// ── Lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn restart_replaces_running_session() {
    let h = Harness::new();
    let first = h.scanner.start_camera_scan(Facing::Environment).await.unwrap();
    let second = h.scanner.start_camera_scan(Facing::Environment).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(h.camera.log.acquires(), 2);
    assert_eq!(h.camera.log.releases(), 1);
    assert_eq!(h.scanner.status().session_id, Some(second));
}

#[tokio::test]
async fn shutdown_refuses_further_scans() {
    let h = Harness::new();
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();
    h.scanner.shutdown().await;

    assert_eq!(h.camera.log.releases(), 1);
    assert!(matches!(
        h.scanner.start_camera_scan(Facing::User).await,
        Err(EngineError::ShuttingDown)
    ));
    assert!(matches!(
        h.scanner.decode_uploaded_image(blank_png()).await,
        Err(EngineError::ShuttingDown)
    ));
}

// ── Re-entrant sink ──────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn sink_reads_status_during_upload_callback() {
    let h = ReentrantHarness::with(FakeCamera::new());
    h.matrix.show("https://example.com");

    h.scanner.decode_uploaded_image(blank_png()).await.unwrap();

    let reads = h.sink.reads();
    assert_eq!(reads.len(), 1);
    let status = reads[0].clone().expect("status blocked inside on_barcode_detected");
    assert_eq!(status.mode, ScanMode::Upload);
}

#[tokio::test(flavor = "multi_thread")]
async fn sink_reads_status_during_upload_that_cancels_live_scan() {
    let h = ReentrantHarness::with(FakeCamera::new());
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();

    let _ = h.scanner.decode_uploaded_image(blank_png()).await;

    assert_eq!(h.sink.events.error_kinds(), vec![ErrorKind::UnrecognizedImage]);
    assert_eq!(h.sink.reads().len(), 1);
    assert!(h.sink.reads()[0].is_some(), "status blocked inside on_error");
}

#[tokio::test(flavor = "multi_thread")]
async fn sink_reads_status_during_live_detection() {
    let h = ReentrantHarness::with(FakeCamera::new());
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();

    h.linear.emit("ABC-123");
    eventually("barcode detection", || h.sink.events.detections().len() == 1).await;

    let reads = h.sink.reads();
    assert_eq!(reads.len(), 1);
    let status = reads[0].clone().expect("status blocked inside on_barcode_detected");
    assert_eq!(status.phase, RacePhase::Resolved);
}

#[tokio::test(flavor = "multi_thread")]
async fn sink_reads_status_during_camera_error() {
    let h = ReentrantHarness::with(FakeCamera::denied());

    assert!(h.scanner.start_camera_scan(Facing::Environment).await.is_err());

    let reads = h.sink.reads();
    assert_eq!(reads.len(), 1);
    let status = reads[0].clone().expect("status blocked inside on_error");
    assert_eq!(status.phase, RacePhase::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn sink_reads_status_during_torch_error() {
    let h = ReentrantHarness::with(FakeCamera::without_torch());
    h.scanner.start_camera_scan(Facing::Environment).await.unwrap();

    assert!(h.scanner.toggle_torch().is_err());
    assert_eq!(h.sink.reads().len(), 1);
    assert!(h.sink.reads()[0].is_some(), "status blocked inside on_error");
}
