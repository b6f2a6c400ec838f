//! # Scanner
//!
//! The host-facing facade. One `Scanner` per scan screen.
//!
//! ## Control Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Scanner Controls                               │
//! │                                                                         │
//! │  start_camera_scan(facing)                                             │
//! │    1. cancel the current session (if any), release its camera          │
//! │    2. CameraSource::acquire ── CameraAccess ──► on_error, Err           │
//! │    3. LinearEngine::bind(stream, DetectionSink)                         │
//! │    4. QrPollLoop::spawn(stream)                                         │
//! │    5. DecodeArbiter::start + router task                               │
//! │    6. join the old session's router and poll loop                      │
//! │                                                                         │
//! │  switch_facing()        = start_camera_scan(opposite)                  │
//! │  stop_camera_scan()     = step 1 + step 6                              │
//! │  decode_uploaded_image  = step 1 + StaticImageDecodePath + step 6      │
//! │  toggle_torch()         = TorchController on the open session          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking
//!
//! Controls are serialized by an async `control` mutex, so a switch never
//! interleaves with a stop and the old camera is released before the new
//! one is acquired. Scanner state sits behind a plain mutex that is only
//! held for field reads and writes. Host callbacks fire after both are
//! released, so a sink may call [`Scanner::status`] or
//! [`Scanner::toggle_torch`] from inside a callback.
//!
//! Lock order when nested: state, then arbiter, then camera.

use std::sync::{Arc, Mutex, MutexGuard};

use optiscan_core::{DecodeResult, Facing, RacePhase, ScanMode, ScanStatus};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::arbiter::{ArbiterHandle, DecodeArbiter, Teardown};
use crate::camera::{lock_camera, CameraBackend, CameraSource, SharedCamera};
use crate::config::ScannerConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{NoOpSink, ScanEventSink};
use crate::linear::{DetectionSink, LinearDecoder, LinearEngine};
use crate::matrix::MatrixDecoder;
use crate::poll_loop::{QrPollHandle, QrPollLoop};
use crate::static_path::StaticImageDecodePath;
use crate::torch::TorchController;

// =============================================================================
// Scanner State
// =============================================================================

/// Tasks spawned for one camera session.
struct SessionTasks {
    router: JoinHandle<()>,
    poll: QrPollHandle,
}

impl SessionTasks {
    /// Waits for the router and the poll loop to exit.
    async fn join(mut self) {
        if let Err(e) = self.router.await {
            error!(error = %e, "Arbiter router task failed");
        }
        match self.poll.shutdown().await {
            Some(outcome) => debug!(?outcome, "QR poll loop joined"),
            None => warn!("QR poll loop ended without an outcome"),
        }
    }
}

/// A camera session. Tasks are taken out once the session is retired.
struct ActiveScan {
    arbiter: ArbiterHandle,
    tasks: Option<SessionTasks>,
}

struct ScannerState {
    mode: ScanMode,
    facing: Facing,
    session_id: Option<String>,
    active: Option<ActiveScan>,
    shut_down: bool,
}

// =============================================================================
// Scanner
// =============================================================================

/// Live and static decode controls for one host screen.
pub struct Scanner {
    config: Arc<ScannerConfig>,
    camera: SharedCamera,
    linear: Arc<LinearEngine>,
    matrix: Arc<dyn MatrixDecoder>,
    uploads: StaticImageDecodePath,
    sink: Arc<dyn ScanEventSink>,
    control: tokio::sync::Mutex<()>,
    state: Mutex<ScannerState>,
}

impl Scanner {
    /// Creates a scanner over the given capabilities.
    pub fn new(
        config: ScannerConfig,
        camera: Arc<dyn CameraBackend>,
        linear: Arc<dyn LinearDecoder>,
        matrix: Arc<dyn MatrixDecoder>,
        sink: Arc<dyn ScanEventSink>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let linear = Arc::new(LinearEngine::new(linear));
        let uploads = StaticImageDecodePath::new(
            Arc::clone(&matrix),
            Arc::clone(&linear),
            config.upload.max_bytes,
        );
        let state = ScannerState {
            mode: ScanMode::Camera,
            facing: config.camera.facing,
            session_id: None,
            active: None,
            shut_down: false,
        };

        Ok(Scanner {
            config: Arc::new(config),
            camera: Arc::new(Mutex::new(CameraSource::new(camera))),
            linear,
            matrix,
            uploads,
            sink,
            control: tokio::sync::Mutex::new(()),
            state: Mutex::new(state),
        })
    }

    /// Returns a builder.
    pub fn builder(config: ScannerConfig) -> ScannerBuilder {
        ScannerBuilder::new(config)
    }

    /// Active configuration.
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    // =========================================================================
    // Camera Controls
    // =========================================================================

    /// Starts a live scan, replacing any running one.
    ///
    /// Returns the new session id. If the camera cannot be opened the host
    /// gets `on_error(CAMERA_ACCESS_ERROR)` and nothing is started.
    pub async fn start_camera_scan(&self, facing: Facing) -> EngineResult<String> {
        let (started, retired) = {
            let _control = self.control.lock().await;
            self.start_session(facing)
        };

        join_retired(retired).await;
        self.surface_start(started)
    }

    /// Cancels the running live scan.
    ///
    /// Returns true once the session's tasks have exited, if a scan was
    /// running. Never emits a result.
    pub async fn stop_camera_scan(&self) -> bool {
        let (cancelled, retired) = {
            let _control = self.control.lock().await;
            self.retire_active()
        };

        join_retired(retired).await;
        if cancelled {
            info!(session_id = ?self.lock_state().session_id, "Camera scan stopped");
        }
        cancelled
    }

    /// Restarts the live scan on the other camera.
    pub async fn switch_facing(&self) -> EngineResult<String> {
        let (started, retired) = {
            let _control = self.control.lock().await;
            let current = self.lock_state().facing;
            let next = current.opposite();
            info!(from = %current, to = %next, "Switching camera facing");
            self.start_session(next)
        };

        join_retired(retired).await;
        self.surface_start(started)
    }

    /// Toggles the torch of the open camera. Returns the new torch state.
    ///
    /// Failures are reported to the host and leave the scan running.
    pub fn toggle_torch(&self) -> EngineResult<bool> {
        let toggled = {
            let mut camera = lock_camera(&self.camera);
            TorchController::toggle(&mut camera)
        };

        toggled.map_err(|e| {
            let err = EngineError::from(e);
            self.surface(&err);
            err
        })
    }

    // =========================================================================
    // Upload Control
    // =========================================================================

    /// Decodes an uploaded image file.
    ///
    /// Cancels any live scan first. Exactly one of `on_barcode_detected`
    /// or `on_error` is invoked.
    pub async fn decode_uploaded_image(&self, bytes: Vec<u8>) -> EngineResult<DecodeResult> {
        let (outcome, retired) = {
            let _control = self.control.lock().await;
            let (session_id, retired) = self.begin_upload()?;

            info!(session_id = %session_id, bytes = bytes.len(), "Decoding uploaded image");
            let uploads = self.uploads.clone();
            let outcome = tokio::task::spawn_blocking(move || uploads.decode(&bytes, &session_id))
                .await
                .map_err(EngineError::from)
                .and_then(|result| result);
            (outcome, retired)
        };

        join_retired(retired).await;
        match outcome {
            Ok(result) => {
                self.sink.on_barcode_detected(&result);
                Ok(result)
            }
            Err(err) => {
                self.surface(&err);
                Err(err)
            }
        }
    }

    // =========================================================================
    // Status & Lifecycle
    // =========================================================================

    /// Snapshot for the host UI.
    pub fn status(&self) -> ScanStatus {
        let (mode, facing, session_id, arbiter) = {
            let state = self.lock_state();
            (
                state.mode,
                state.facing,
                state.session_id.clone(),
                state.active.as_ref().map(|active| active.arbiter.clone()),
            )
        };

        ScanStatus {
            mode,
            facing,
            phase: arbiter.map_or(RacePhase::Idle, |arbiter| arbiter.phase()),
            torch: lock_camera(&self.camera).torch(),
            session_id,
        }
    }

    /// Stops everything. Later controls fail with `ShuttingDown`.
    pub async fn shutdown(&self) {
        let retired = {
            let _control = self.control.lock().await;
            let (_, retired) = self.retire_active();
            lock_camera(&self.camera).release_current();
            self.lock_state().shut_down = true;
            retired
        };

        join_retired(retired).await;
        info!("Scanner shut down");
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Retires the running session and opens a new one. Caller holds `control`.
    fn start_session(&self, facing: Facing) -> (EngineResult<String>, Option<SessionTasks>) {
        if self.lock_state().shut_down {
            return (Err(EngineError::ShuttingDown), None);
        }

        let (_, retired) = self.retire_active();
        {
            let mut state = self.lock_state();
            state.mode = ScanMode::Camera;
            state.facing = facing;
            state.active = None;
        }

        (self.open_session(facing), retired)
    }

    /// Retires the running session and switches to upload mode. Caller holds
    /// `control`.
    fn begin_upload(&self) -> EngineResult<(String, Option<SessionTasks>)> {
        if self.lock_state().shut_down {
            return Err(EngineError::ShuttingDown);
        }

        let (cancelled, retired) = self.retire_active();
        if cancelled {
            info!("Camera scan cancelled for image upload");
        }

        let session_id = Uuid::new_v4().to_string();
        let mut state = self.lock_state();
        state.mode = ScanMode::Upload;
        state.session_id = Some(session_id.clone());
        state.active = None;
        Ok((session_id, retired))
    }

    /// Acquires the camera and wires both decoders to a fresh arbiter.
    fn open_session(&self, facing: Facing) -> EngineResult<String> {
        let lease = lock_camera(&self.camera).acquire(&self.config.constraints(facing))?;

        let session_id = Uuid::new_v4().to_string();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();

        let bound = self.linear.bind(
            lease.stream(),
            &self.config.live_decode(),
            DetectionSink::new(&session_id, reports_tx.clone()),
        );
        let live = match bound {
            Ok(live) => live,
            Err(err) => {
                lock_camera(&self.camera).release(&lease);
                return Err(err);
            }
        };

        let poll = QrPollLoop::spawn(
            lease.stream(),
            Arc::clone(&self.matrix),
            self.config.poll_loop(),
            reports_tx,
        );

        let teardown = Teardown::new(
            poll.canceller(),
            Arc::clone(&self.linear),
            live,
            Arc::clone(&self.camera),
            lease,
        );
        let arbiter = ArbiterHandle::new(
            DecodeArbiter::new(session_id.clone(), teardown),
            Arc::clone(&self.sink),
        );

        if let Err(e) = arbiter.start() {
            arbiter.cancel();
            return Err(e.into());
        }

        let router = arbiter.spawn_router(reports_rx);
        {
            let mut state = self.lock_state();
            state.active = Some(ActiveScan {
                arbiter,
                tasks: Some(SessionTasks { router, poll }),
            });
            state.session_id = Some(session_id.clone());
        }

        info!(session_id = %session_id, facing = %facing, "Camera scan started");
        Ok(session_id)
    }

    /// Cancels the active session and hands back its tasks for joining.
    ///
    /// The arbiter stays in place so `status` keeps reporting its phase.
    fn retire_active(&self) -> (bool, Option<SessionTasks>) {
        let (arbiter, tasks) = {
            let mut state = self.lock_state();
            match state.active.as_mut() {
                Some(active) => (active.arbiter.clone(), active.tasks.take()),
                None => return (false, None),
            }
        };

        (arbiter.cancel(), tasks)
    }

    fn surface_start(&self, started: EngineResult<String>) -> EngineResult<String> {
        started.map_err(|err| {
            if !matches!(err, EngineError::ShuttingDown) {
                self.surface(&err);
            }
            err
        })
    }

    fn surface(&self, err: &EngineError) {
        match err.error_kind() {
            Some(kind) => {
                warn!(kind = %kind, error = %err, "Reporting scan error to host");
                self.sink.on_error(kind, &err.to_string());
            }
            None => error!(error = %err, "Scanner error with no host-facing kind"),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ScannerState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Scanner state lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

async fn join_retired(retired: Option<SessionTasks>) {
    if let Some(tasks) = retired {
        tasks.join().await;
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("config", &self.config)
            .field("camera", &self.camera)
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Scanner`].
pub struct ScannerBuilder {
    config: ScannerConfig,
    camera: Option<Arc<dyn CameraBackend>>,
    linear: Option<Arc<dyn LinearDecoder>>,
    matrix: Option<Arc<dyn MatrixDecoder>>,
    sink: Arc<dyn ScanEventSink>,
}

impl ScannerBuilder {
    /// Creates a new builder.
    pub fn new(config: ScannerConfig) -> Self {
        ScannerBuilder {
            config,
            camera: None,
            linear: None,
            matrix: None,
            sink: Arc::new(NoOpSink),
        }
    }

    /// Sets the camera backend.
    pub fn with_camera(mut self, camera: Arc<dyn CameraBackend>) -> Self {
        self.camera = Some(camera);
        self
    }

    /// Sets the linear decoder.
    pub fn with_linear_decoder(mut self, linear: Arc<dyn LinearDecoder>) -> Self {
        self.linear = Some(linear);
        self
    }

    /// Sets the matrix decoder.
    pub fn with_matrix_decoder(mut self, matrix: Arc<dyn MatrixDecoder>) -> Self {
        self.matrix = Some(matrix);
        self
    }

    /// Sets the event sink.
    pub fn with_sink(mut self, sink: Arc<dyn ScanEventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Builds the scanner.
    pub fn build(self) -> EngineResult<Scanner> {
        let camera = self
            .camera
            .ok_or_else(|| EngineError::InvalidConfig("Camera backend required".into()))?;
        let linear = self
            .linear
            .ok_or_else(|| EngineError::InvalidConfig("Linear decoder required".into()))?;
        let matrix = match self.matrix {
            Some(matrix) => matrix,
            None => default_matrix()?,
        };

        Scanner::new(self.config, camera, linear, matrix, self.sink)
    }
}

#[cfg(feature = "rqrr")]
fn default_matrix() -> EngineResult<Arc<dyn MatrixDecoder>> {
    Ok(Arc::new(crate::matrix::RqrrMatrixDecoder::new()))
}

#[cfg(not(feature = "rqrr"))]
fn default_matrix() -> EngineResult<Arc<dyn MatrixDecoder>> {
    Err(EngineError::InvalidConfig(
        "Matrix decoder required (built without the rqrr feature)".into(),
    ))
}
