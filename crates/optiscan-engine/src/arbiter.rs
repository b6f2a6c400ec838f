//! # Decode Arbiter
//!
//! The single place where "first successful decode wins" is decided.
//!
//! ## Race Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Decode Race                                    │
//! │                                                                         │
//! │  LinearEngine ── DetectionSink ──┐                                     │
//! │                                  │  mpsc (RaceReport)                   │
//! │  QrPollLoop ─────────────────────┤                                     │
//! │                                  ▼                                      │
//! │                           ┌─────────────┐                               │
//! │                           │   router    │  one task per session         │
//! │                           └──────┬──────┘                               │
//! │                                  │ lock                                 │
//! │                                  ▼                                      │
//! │                        ┌──────────────────┐                             │
//! │   Scanner::stop ─────► │  DecodeArbiter   │                             │
//! │   (cancel)             │  RaceState       │                             │
//! │                        │  Teardown (once) │                             │
//! │                        └────────┬─────────┘                             │
//! │                                 │ Verdict (after unlock)                │
//! │                                 ▼                                       │
//! │                          ScanEventSink                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//! - At most one [`Verdict`] per session: only the call that moves the race
//!   out of `Scanning` produces one.
//! - Teardown runs exactly once, on whichever exit path gets there first.
//!   It signals the poll loop, unbinds the linear decoder, switches the
//!   torch off and releases the camera. Joining the poll task is left to
//!   the owner of its handle.
//! - `cancel()` never produces a verdict.
//! - Reports arriving after the race is terminal are dropped.

use std::sync::{Arc, Mutex, MutexGuard};

use optiscan_core::validation::normalize_barcode;
use optiscan_core::{CoreResult, DecodeResult, DetectionSource, RacePhase, RaceState, ScanError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::camera::{lock_camera, SharedCamera, StreamLease};
use crate::events::{ScanEventSink, Verdict};
use crate::linear::{LinearEngine, LiveHandle};
use crate::poll_loop::PollCanceller;
use crate::torch::TorchController;

// =============================================================================
// Race Reports
// =============================================================================

/// What the two decoders send to the arbiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceReport {
    /// Raw linear candidate, not yet normalized.
    Barcode(String),
    /// QR payload.
    QrCode(String),
    /// The poll loop hit its configured bound.
    PollExhausted { ticks: u64, elapsed_ms: u64 },
}

// =============================================================================
// Teardown
// =============================================================================

/// Everything a live session holds, released together.
pub struct Teardown {
    poll: PollCanceller,
    linear: Arc<LinearEngine>,
    live: LiveHandle,
    camera: SharedCamera,
    lease: StreamLease,
}

impl Teardown {
    pub fn new(
        poll: PollCanceller,
        linear: Arc<LinearEngine>,
        live: LiveHandle,
        camera: SharedCamera,
        lease: StreamLease,
    ) -> Self {
        Teardown {
            poll,
            linear,
            live,
            camera,
            lease,
        }
    }

    /// Stops the poll loop, unbinds the linear decoder, turns the torch off
    /// and releases the camera.
    ///
    /// The poll task itself is joined by whoever owns its handle.
    fn run(self) {
        self.poll.cancel();
        let unbound = self.linear.unbind(self.live);

        let mut camera = lock_camera(&self.camera);
        let ours = camera.current().map(|lease| lease.seq()) == Some(self.lease.seq());
        if ours {
            if let Err(e) = TorchController::turn_off(&mut camera) {
                debug!(error = %e, "Torch could not be switched off before release");
            }
        }
        let released = camera.release(&self.lease);
        debug!(unbound, released, seq = self.lease.seq(), "Session resources released");
    }
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Teardown")
            .field("live", &self.live)
            .field("lease", &self.lease)
            .finish()
    }
}

// =============================================================================
// Decode Arbiter
// =============================================================================

/// Per-session race state plus the session's teardown.
#[derive(Debug)]
pub struct DecodeArbiter {
    session_id: String,
    race: RaceState,
    teardown: Option<Teardown>,
    closed_tx: watch::Sender<bool>,
}

impl DecodeArbiter {
    /// Creates an idle arbiter owning `teardown`.
    pub fn new(session_id: impl Into<String>, teardown: Teardown) -> Self {
        let (closed_tx, _) = watch::channel(false);
        DecodeArbiter {
            session_id: session_id.into(),
            race: RaceState::new(),
            teardown: Some(teardown),
            closed_tx,
        }
    }

    /// `Idle → Scanning`.
    pub fn start(&mut self) -> CoreResult<()> {
        self.race.start()?;
        info!(session_id = %self.session_id, "Scan race started");
        Ok(())
    }

    /// Offers a raw linear candidate.
    ///
    /// Candidates failing normalization are dropped and the race continues.
    pub fn report_barcode(&mut self, raw: &str) -> Option<Verdict> {
        if !self.race.is_scanning() {
            debug!(session_id = %self.session_id, phase = %self.race.phase(), "Late barcode report ignored");
            return None;
        }

        let text = match normalize_barcode(raw) {
            Ok(text) => text,
            Err(e) => {
                debug!(session_id = %self.session_id, raw, error = %e, "Barcode candidate rejected");
                return None;
            }
        };

        if !self.race.try_resolve() {
            return None;
        }

        info!(session_id = %self.session_id, text = %text, "Barcode won the race");
        self.finish();
        Some(Verdict::Detected(DecodeResult::barcode(
            text,
            DetectionSource::LiveLinear,
            &self.session_id,
        )))
    }

    /// Offers a QR payload. Payloads are accepted verbatim.
    pub fn report_qr(&mut self, payload: String) -> Option<Verdict> {
        if !self.race.try_resolve() {
            debug!(session_id = %self.session_id, phase = %self.race.phase(), "Late QR report ignored");
            return None;
        }

        info!(session_id = %self.session_id, len = payload.len(), "QR code won the race");
        self.finish();
        Some(Verdict::Detected(DecodeResult::qr_code(
            payload,
            DetectionSource::LivePoll,
            &self.session_id,
        )))
    }

    /// The poll loop gave up: tear down and surface a timeout.
    pub fn report_exhausted(&mut self, ticks: u64, elapsed_ms: u64) -> Option<Verdict> {
        if !self.race.cancel() {
            return None;
        }

        info!(session_id = %self.session_id, ticks, elapsed_ms, "Scan timed out");
        self.finish();
        Some(Verdict::Failed(ScanError::ScanTimeout { elapsed_ms, ticks }))
    }

    /// Applies any report.
    pub fn apply(&mut self, report: RaceReport) -> Option<Verdict> {
        match report {
            RaceReport::Barcode(raw) => self.report_barcode(&raw),
            RaceReport::QrCode(payload) => self.report_qr(payload),
            RaceReport::PollExhausted { ticks, elapsed_ms } => {
                self.report_exhausted(ticks, elapsed_ms)
            }
        }
    }

    /// Stops the session without a result.
    ///
    /// Returns true if this call ended the race; later calls are no-ops.
    pub fn cancel(&mut self) -> bool {
        if !self.race.cancel() {
            return false;
        }

        info!(session_id = %self.session_id, "Scan cancelled");
        self.finish();
        true
    }

    /// Current race phase.
    pub fn phase(&self) -> RacePhase {
        self.race.phase()
    }

    /// Session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Receiver that flips to true when the race becomes terminal.
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }

    fn finish(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown.run();
        }
        self.closed_tx.send_replace(true);
    }
}

// =============================================================================
// Arbiter Handle
// =============================================================================

/// Shared handle to a session's arbiter.
///
/// Every state change happens under the lock; the resulting [`Verdict`] is
/// delivered to the sink after the lock is released.
#[derive(Clone)]
pub struct ArbiterHandle {
    inner: Arc<Mutex<DecodeArbiter>>,
    sink: Arc<dyn ScanEventSink>,
    session_id: Arc<str>,
}

impl ArbiterHandle {
    /// Wraps an arbiter.
    pub fn new(arbiter: DecodeArbiter, sink: Arc<dyn ScanEventSink>) -> Self {
        let session_id = Arc::from(arbiter.session_id());
        ArbiterHandle {
            inner: Arc::new(Mutex::new(arbiter)),
            sink,
            session_id,
        }
    }

    /// Starts the race.
    pub fn start(&self) -> CoreResult<()> {
        self.lock().start()
    }

    /// Applies a report and delivers any verdict. Returns true if it won.
    pub fn report(&self, report: RaceReport) -> bool {
        let verdict = self.lock().apply(report);
        match verdict {
            Some(verdict) => {
                verdict.deliver(self.sink.as_ref());
                true
            }
            None => false,
        }
    }

    /// Offers a raw linear candidate.
    pub fn report_barcode(&self, raw: &str) -> bool {
        self.report(RaceReport::Barcode(raw.to_string()))
    }

    /// Offers a QR payload.
    pub fn report_qr(&self, payload: &str) -> bool {
        self.report(RaceReport::QrCode(payload.to_string()))
    }

    /// Cancels the session. Never delivers anything.
    pub fn cancel(&self) -> bool {
        self.lock().cancel()
    }

    /// Current race phase.
    pub fn phase(&self) -> RacePhase {
        self.lock().phase()
    }

    /// Session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Spawns the task that feeds `reports` into the arbiter.
    ///
    /// The task ends when the race becomes terminal or every sender is gone.
    pub fn spawn_router(&self, reports: mpsc::UnboundedReceiver<RaceReport>) -> JoinHandle<()> {
        tokio::spawn(self.clone().route(reports))
    }

    async fn route(self, mut reports: mpsc::UnboundedReceiver<RaceReport>) {
        let mut closed = self.lock().closed();

        loop {
            if *closed.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = closed.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                report = reports.recv() => match report {
                    Some(report) => {
                        self.report(report);
                    }
                    None => {
                        debug!(session_id = %self.session_id, "All decoders hung up");
                        break;
                    }
                },
            }
        }

        debug!(session_id = %self.session_id, phase = %self.phase(), "Arbiter router stopped");
    }

    fn lock(&self) -> MutexGuard<'_, DecodeArbiter> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!(session_id = %self.session_id, "Arbiter lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl std::fmt::Debug for ArbiterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbiterHandle")
            .field("session_id", &self.session_id)
            .finish()
    }
}
