//! Scripted fakes for the camera, both decoders and the host sink.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use image::RgbaImage;
use optiscan_core::{
    CameraConstraints, CoreResult, DecodeResult, ErrorKind, Facing, FrameSize, ScanError,
    ScanStatus,
};
use optiscan_engine::{
    CameraBackend, CameraStream, DetectionSink, EngineResult, LinearDecoder, LiveDecodeConfig,
    LiveHandle, MatrixDecoder, ScanEventSink, Scanner, ScannerConfig, SingleShotConfig,
};

// ── Camera ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraEvent {
    Acquire(Facing),
    Release(Facing),
}

#[derive(Default)]
pub struct CameraLog {
    pub events: Mutex<Vec<CameraEvent>>,
    pub open: AtomicUsize,
    pub max_open: AtomicUsize,
    pub torch: Mutex<Vec<bool>>,
}

impl CameraLog {
    pub fn events(&self) -> Vec<CameraEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn acquires(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, CameraEvent::Acquire(_)))
            .count()
    }

    pub fn releases(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, CameraEvent::Release(_)))
            .count()
    }

    /// Every torch state applied to any stream, in order.
    pub fn torch_applied(&self) -> Vec<bool> {
        self.torch.lock().unwrap().clone()
    }
}

pub struct FakeStream {
    facing: Facing,
    warm_reads: AtomicU64,
    stopped: AtomicBool,
    torch: bool,
    log: Arc<CameraLog>,
}

impl CameraStream for FakeStream {
    fn frame_size(&self) -> FrameSize {
        let warming = self
            .warm_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if warming {
            FrameSize::default()
        } else {
            FrameSize::new(64, 48)
        }
    }

    fn read_frame(&self, _target: &mut RgbaImage) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    fn torch_capability(&self) -> bool {
        self.torch
    }

    fn apply_torch(&self, on: bool) -> CoreResult<()> {
        if self.torch {
            self.log.torch.lock().unwrap().push(on);
            Ok(())
        } else {
            Err(ScanError::TorchUnsupported)
        }
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.log.open.fetch_sub(1, Ordering::SeqCst);
            self.log
                .events
                .lock()
                .unwrap()
                .push(CameraEvent::Release(self.facing));
        }
    }

    fn is_live(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }
}

pub struct FakeCamera {
    pub log: Arc<CameraLog>,
    pub deny: AtomicBool,
    pub torch: bool,
    pub warm_reads: u64,
}

impl FakeCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeCamera {
            log: Arc::new(CameraLog::default()),
            deny: AtomicBool::new(false),
            torch: true,
            warm_reads: 2,
        })
    }

    pub fn without_torch() -> Arc<Self> {
        Arc::new(FakeCamera {
            log: Arc::new(CameraLog::default()),
            deny: AtomicBool::new(false),
            torch: false,
            warm_reads: 2,
        })
    }

    pub fn denied() -> Arc<Self> {
        let camera = Self::new();
        camera.deny.store(true, Ordering::SeqCst);
        camera
    }
}

impl CameraBackend for FakeCamera {
    fn acquire(&self, constraints: &CameraConstraints) -> CoreResult<Arc<dyn CameraStream>> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(ScanError::camera_access("permission denied"));
        }

        let open = self.log.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_open.fetch_max(open, Ordering::SeqCst);
        self.log
            .events
            .lock()
            .unwrap()
            .push(CameraEvent::Acquire(constraints.facing));

        Ok(Arc::new(FakeStream {
            facing: constraints.facing,
            warm_reads: AtomicU64::new(self.warm_reads),
            stopped: AtomicBool::new(false),
            torch: self.torch,
            log: Arc::clone(&self.log),
        }))
    }
}

// ── Linear decoder ───────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeLinear {
    next: AtomicU64,
    sinks: Mutex<Vec<DetectionSink>>,
    pub stopped: Mutex<Vec<LiveHandle>>,
    pub single_answer: Mutex<Option<String>>,
    pub single_calls: AtomicUsize,
}

impl FakeLinear {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeLinear::default())
    }

    /// Sink handed to the `index`-th live binding.
    pub fn sink(&self, index: usize) -> DetectionSink {
        self.sinks.lock().unwrap()[index].clone()
    }

    pub fn bindings(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    /// Emits through the most recent binding, the way a backend would.
    pub fn emit(&self, raw: &str) -> bool {
        let sink = self.sinks.lock().unwrap().last().cloned();
        sink.map(|s| s.detected(raw)).unwrap_or(false)
    }

    pub fn stop_count(&self) -> usize {
        self.stopped.lock().unwrap().len()
    }
}

impl LinearDecoder for FakeLinear {
    fn start_live(
        &self,
        _stream: Arc<dyn CameraStream>,
        _config: &LiveDecodeConfig,
        sink: DetectionSink,
    ) -> EngineResult<LiveHandle> {
        self.sinks.lock().unwrap().push(sink);
        Ok(LiveHandle(self.next.fetch_add(1, Ordering::SeqCst)))
    }

    fn stop_live(&self, handle: LiveHandle) {
        self.stopped.lock().unwrap().push(handle);
    }

    fn decode_single(&self, _image: &RgbaImage, _config: &SingleShotConfig) -> Option<String> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.single_answer.lock().unwrap().clone()
    }
}

// ── Matrix decoder ───────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeMatrix {
    payload: Mutex<Option<String>>,
    pub calls: AtomicUsize,
}

impl FakeMatrix {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeMatrix::default())
    }

    /// Every later frame decodes to `payload`.
    pub fn show(&self, payload: &str) {
        *self.payload.lock().unwrap() = Some(payload.to_string());
    }
}

impl MatrixDecoder for FakeMatrix {
    fn decode(&self, _pixels: &[u8], _width: u32, _height: u32) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payload.lock().unwrap().clone()
    }
}

// ── Host sink ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub detections: Mutex<Vec<DecodeResult>>,
    pub errors: Mutex<Vec<(ErrorKind, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingSink::default())
    }

    pub fn detections(&self) -> Vec<DecodeResult> {
        self.detections.lock().unwrap().clone()
    }

    pub fn error_kinds(&self) -> Vec<ErrorKind> {
        self.errors.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }
}

impl ScanEventSink for RecordingSink {
    fn on_barcode_detected(&self, result: &DecodeResult) {
        self.detections.lock().unwrap().push(result.clone());
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        self.errors.lock().unwrap().push((kind, message.to_string()));
    }
}

/// Sink that reads [`Scanner::status`] from a helper thread inside every
/// callback and records what came back within 500 ms.
///
/// A read that times out shows the callback ran under a scanner lock.
#[derive(Default)]
pub struct StatusReadingSink {
    scanner: OnceLock<Weak<Scanner>>,
    pub reads: Mutex<Vec<Option<ScanStatus>>>,
    pub events: RecordingSink,
}

impl StatusReadingSink {
    pub fn attach(&self, scanner: &Arc<Scanner>) {
        let _ = self.scanner.set(Arc::downgrade(scanner));
    }

    pub fn reads(&self) -> Vec<Option<ScanStatus>> {
        self.reads.lock().unwrap().clone()
    }

    fn read_status(&self) {
        let Some(scanner) = self.scanner.get().and_then(Weak::upgrade) else {
            return;
        };

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(scanner.status());
        });
        let read = rx.recv_timeout(Duration::from_millis(500)).ok();
        self.reads.lock().unwrap().push(read);
    }
}

impl ScanEventSink for StatusReadingSink {
    fn on_barcode_detected(&self, result: &DecodeResult) {
        self.read_status();
        self.events.on_barcode_detected(result);
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        self.read_status();
        self.events.on_error(kind, message);
    }
}

// ── Harness ──────────────────────────────────────────────────────────

pub struct Harness {
    pub scanner: Scanner,
    pub camera: Arc<FakeCamera>,
    pub linear: Arc<FakeLinear>,
    pub matrix: Arc<FakeMatrix>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeCamera::new(), ScannerConfig::default())
    }

    pub fn with(camera: Arc<FakeCamera>, config: ScannerConfig) -> Self {
        let linear = FakeLinear::new();
        let matrix = FakeMatrix::new();
        let sink = RecordingSink::new();

        let scanner = Scanner::builder(config)
            .with_camera(camera.clone())
            .with_linear_decoder(linear.clone())
            .with_matrix_decoder(matrix.clone())
            .with_sink(sink.clone())
            .build()
            .unwrap();

        Harness {
            scanner,
            camera,
            linear,
            matrix,
            sink,
        }
    }
}

/// A scanner shared with a sink that calls back into it.
pub struct ReentrantHarness {
    pub scanner: Arc<Scanner>,
    pub camera: Arc<FakeCamera>,
    pub linear: Arc<FakeLinear>,
    pub matrix: Arc<FakeMatrix>,
    pub sink: Arc<StatusReadingSink>,
}

impl ReentrantHarness {
    pub fn with(camera: Arc<FakeCamera>) -> Self {
        let linear = FakeLinear::new();
        let matrix = FakeMatrix::new();
        let sink = Arc::new(StatusReadingSink::default());

        let scanner = Arc::new(
            Scanner::builder(ScannerConfig::default())
                .with_camera(camera.clone())
                .with_linear_decoder(linear.clone())
                .with_matrix_decoder(matrix.clone())
                .with_sink(sink.clone())
                .build()
                .unwrap(),
        );
        sink.attach(&scanner);

        ReentrantHarness {
            scanner,
            camera,
            linear,
            matrix,
            sink,
        }
    }
}

/// Polls `cond` until it holds, yielding to spawned tasks in between.
pub async fn eventually(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("timed out waiting for: {}", what);
}

/// Lets spawned tasks run for a while without expecting anything.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

/// A blank white PNG.
pub fn blank_png() -> Vec<u8> {
    let image = RgbaImage::from_pixel(32, 32, image::Rgba([255, 255, 255, 255]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .unwrap();
    bytes
}
