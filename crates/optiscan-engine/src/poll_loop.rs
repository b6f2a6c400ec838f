//! # QR Poll Loop
//!
//! Cancellable task that samples the live stream and asks the matrix
//! decoder for a QR code, once per tick.
//!
//! ## Tick Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          One Tick                                       │
//! │                                                                         │
//! │  cancelled? ── yes ──► exit (Cancelled)                                │
//! │      │ no                                                               │
//! │      ▼                                                                  │
//! │  frame size 0? ── yes ──► skip decode (Warming)                        │
//! │      │ no                                                               │
//! │      ▼                                                                  │
//! │  sample frame ──► matrix decode ── payload ──► report QrCode, exit     │
//! │      │ none                                                             │
//! │      ▼                                                                  │
//! │  tick/duration bound hit? ── yes ──► report PollExhausted, exit        │
//! │      │ no                                                               │
//! │      ▼                                                                  │
//! │  sleep(tick_interval) or cancel signal ──► next tick                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The sample and decode of a tick run on the blocking pool, so a slow
//! matrix decode never stalls the arbiter router on the same runtime.
//! Cancellation is checked at every tick boundary; a matrix decode already
//! in progress finishes first.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};

use crate::arbiter::RaceReport;
use crate::camera::CameraStream;
use crate::matrix::{decode_image, MatrixDecoder};
use crate::sampler::FrameSampler;

// =============================================================================
// Configuration
// =============================================================================

/// Pacing and optional cutoff of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between ticks.
    pub tick_interval: Duration,
    /// Give up after this many ticks.
    pub max_ticks: Option<u64>,
    /// Give up after this much time.
    pub max_duration: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            tick_interval: Duration::from_millis(16),
            max_ticks: None,
            max_duration: None,
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Stream has no dimensions yet; nothing was decoded.
    Warming,
    /// A frame was decoded and held no QR code.
    Miss,
    /// A QR payload was found.
    Decoded(String),
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Found a payload and reported it.
    Decoded { ticks: u64 },
    /// Cancel signal observed.
    Cancelled { ticks: u64 },
    /// Hit the configured bound and reported it.
    Exhausted { ticks: u64, elapsed_ms: u64 },
    /// The arbiter's channel closed before the loop could report.
    Disconnected { ticks: u64 },
    /// A tick never came back from the blocking pool (decoder panic or
    /// runtime shutdown).
    Aborted { ticks: u64 },
}

// =============================================================================
// Frame Worker
// =============================================================================

/// Everything one tick needs. Moved onto the blocking pool and back.
struct FrameWorker {
    stream: Arc<dyn CameraStream>,
    matrix: Arc<dyn MatrixDecoder>,
    sampler: FrameSampler,
}

impl FrameWorker {
    fn tick(&mut self) -> TickOutcome {
        let Some(frame) = self.sampler.sample(self.stream.as_ref()) else {
            return TickOutcome::Warming;
        };

        match decode_image(self.matrix.as_ref(), frame) {
            Some(payload) => TickOutcome::Decoded(payload),
            None => TickOutcome::Miss,
        }
    }
}

// =============================================================================
// Poll Loop
// =============================================================================

/// The QR side of the race.
pub struct QrPollLoop {
    worker: FrameWorker,
    config: PollConfig,
    reports: mpsc::UnboundedSender<RaceReport>,
    cancel_rx: watch::Receiver<bool>,
}

impl QrPollLoop {
    /// Creates a loop and the canceller that stops it.
    pub fn new(
        stream: Arc<dyn CameraStream>,
        matrix: Arc<dyn MatrixDecoder>,
        config: PollConfig,
        reports: mpsc::UnboundedSender<RaceReport>,
    ) -> (Self, PollCanceller) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let poll = QrPollLoop {
            worker: FrameWorker {
                stream,
                matrix,
                sampler: FrameSampler::new(),
            },
            config,
            reports,
            cancel_rx,
        };
        (poll, PollCanceller(Arc::new(cancel_tx)))
    }

    /// Spawns the loop on the current runtime.
    pub fn spawn(
        stream: Arc<dyn CameraStream>,
        matrix: Arc<dyn MatrixDecoder>,
        config: PollConfig,
        reports: mpsc::UnboundedSender<RaceReport>,
    ) -> QrPollHandle {
        let (poll, canceller) = Self::new(stream, matrix, config, reports);
        let join = tokio::spawn(poll.run());
        QrPollHandle {
            canceller,
            join: Some(join),
        }
    }

    /// Runs one tick inline: sample, then decode.
    pub fn tick(&mut self) -> TickOutcome {
        self.worker.tick()
    }

    /// Runs until a payload is found, the loop is cancelled, or a bound is hit.
    pub async fn run(self) -> PollOutcome {
        let QrPollLoop {
            mut worker,
            config,
            reports,
            mut cancel_rx,
        } = self;

        let started = Instant::now();
        let mut ticks: u64 = 0;

        debug!(
            tick_interval_ms = config.tick_interval.as_millis() as u64,
            max_ticks = ?config.max_ticks,
            max_duration_ms = ?config.max_duration.map(|d| d.as_millis() as u64),
            "QR poll loop started"
        );

        let outcome = loop {
            if *cancel_rx.borrow() {
                break PollOutcome::Cancelled { ticks };
            }

            ticks += 1;
            let ticked = tokio::task::spawn_blocking(move || {
                let outcome = worker.tick();
                (worker, outcome)
            })
            .await;

            let outcome = match ticked {
                Ok((returned, outcome)) => {
                    worker = returned;
                    outcome
                }
                Err(e) => {
                    error!(ticks, error = %e, "QR poll tick did not complete");
                    return PollOutcome::Aborted { ticks };
                }
            };

            match outcome {
                TickOutcome::Decoded(payload) => {
                    info!(ticks, "QR code decoded");
                    if reports.send(RaceReport::QrCode(payload)).is_err() {
                        break PollOutcome::Disconnected { ticks };
                    }
                    break PollOutcome::Decoded { ticks };
                }
                TickOutcome::Warming => trace!(ticks, "Skipping tick, camera warming up"),
                TickOutcome::Miss => trace!(ticks, "No QR code in frame"),
            }

            let elapsed = started.elapsed();
            if bound_reached(&config, ticks, elapsed) {
                let elapsed_ms = elapsed.as_millis() as u64;
                info!(ticks, elapsed_ms, "QR poll loop reached its bound");
                if reports
                    .send(RaceReport::PollExhausted { ticks, elapsed_ms })
                    .is_err()
                {
                    break PollOutcome::Disconnected { ticks };
                }
                break PollOutcome::Exhausted { ticks, elapsed_ms };
            }

            tokio::select! {
                _ = tokio::time::sleep(config.tick_interval) => {}
                changed = cancel_rx.changed() => {
                    if changed.is_err() {
                        debug!(ticks, "QR poll loop canceller dropped");
                        break PollOutcome::Cancelled { ticks };
                    }
                }
            }
        };

        debug!(?outcome, frames = worker.sampler.frames(), "QR poll loop stopped");
        outcome
    }
}

fn bound_reached(config: &PollConfig, ticks: u64, elapsed: Duration) -> bool {
    let ticks_hit = config.max_ticks.is_some_and(|max| ticks >= max);
    let time_hit = config.max_duration.is_some_and(|max| elapsed >= max);
    ticks_hit || time_hit
}

// =============================================================================
// Cancellation & Handle
// =============================================================================

/// Cloneable stop signal for one poll loop.
///
/// The loop also stops once every canceller is dropped.
#[derive(Debug, Clone)]
pub struct PollCanceller(Arc<watch::Sender<bool>>);

impl PollCanceller {
    /// Signals the loop to stop at its next tick boundary. Idempotent.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Owner-side handle of a spawned [`QrPollLoop`].
#[derive(Debug)]
pub struct QrPollHandle {
    canceller: PollCanceller,
    join: Option<JoinHandle<PollOutcome>>,
}

impl QrPollHandle {
    /// A canceller for whoever tears the session down.
    pub fn canceller(&self) -> PollCanceller {
        self.canceller.clone()
    }

    /// Signals the loop to stop.
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// Cancels and waits for the loop to exit, releasing its stream.
    ///
    /// Returns `None` if the outcome was already taken or the task panicked.
    pub async fn shutdown(&mut self) -> Option<PollOutcome> {
        self.cancel();
        let join = self.join.take()?;
        join.await.ok()
    }
}
