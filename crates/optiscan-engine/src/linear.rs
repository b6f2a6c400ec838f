//! # Linear Decode Engine
//!
//! The 1D barcode capability, in live and single-shot form.
//!
//! ## Live Binding
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Live Binding Lifecycle                           │
//! │                                                                         │
//! │  LinearEngine::bind(stream, config, sink)                              │
//! │       │                                                                 │
//! │       ├── previous binding? ──► unbind it first (flag + stop_live)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LinearDecoder::start_live(...) ──► LiveHandle                         │
//! │       │                                                                 │
//! │       │  backend thread/callback                                       │
//! │       ▼                                                                 │
//! │  DetectionSink::detected("raw text") ──► arbiter channel               │
//! │                                                                         │
//! │  LinearEngine::unbind(handle)                                          │
//! │       ├── sink marked unbound: later detected() calls are dropped      │
//! │       └── LinearDecoder::stop_live(handle)                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! At most one live binding exists at any time. A backend that keeps a sink
//! clone after `stop_live` cannot reach the arbiter through it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use image::RgbaImage;
use optiscan_core::{RegionOfInterest, Symbology};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::arbiter::RaceReport;
use crate::camera::CameraStream;
use crate::error::EngineResult;

// =============================================================================
// Decode Configuration
// =============================================================================

/// Settings for a live binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveDecodeConfig {
    /// Centered window the backend scans.
    pub region: RegionOfInterest,
    /// Symbologies to look for.
    pub symbologies: Vec<Symbology>,
    /// Worker hint. Throughput only.
    pub workers: usize,
}

impl Default for LiveDecodeConfig {
    fn default() -> Self {
        LiveDecodeConfig {
            region: RegionOfInterest::default(),
            symbologies: Symbology::LIVE.to_vec(),
            workers: 2,
        }
    }
}

/// Settings for a single-shot decode of a still image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleShotConfig {
    /// Symbologies to look for.
    pub symbologies: Vec<Symbology>,
    /// Whether the backend should search for the code's bounding box
    /// instead of assuming it is centered.
    pub locate: bool,
}

impl SingleShotConfig {
    /// Every supported symbology with localization on, as used for uploads.
    pub fn full() -> Self {
        SingleShotConfig {
            symbologies: Symbology::ALL.to_vec(),
            locate: true,
        }
    }
}

/// Opaque id of a live binding, issued by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LiveHandle(pub u64);

// =============================================================================
// Detection Sink
// =============================================================================

/// Where a live backend delivers raw candidates.
///
/// Cloneable so backends can hand it to worker threads. Every clone shares
/// one bound flag.
#[derive(Debug, Clone)]
pub struct DetectionSink {
    session_id: Arc<str>,
    reports: mpsc::UnboundedSender<RaceReport>,
    bound: Arc<AtomicBool>,
}

impl DetectionSink {
    /// Creates a bound sink feeding `reports`.
    pub fn new(session_id: &str, reports: mpsc::UnboundedSender<RaceReport>) -> Self {
        DetectionSink {
            session_id: Arc::from(session_id),
            reports,
            bound: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Delivers a raw candidate.
    ///
    /// Returns false if the sink is unbound or the session is gone.
    pub fn detected(&self, raw: &str) -> bool {
        if !self.bound.load(Ordering::Acquire) {
            trace!(session_id = %self.session_id, "Dropping detection from unbound sink");
            return false;
        }
        self.reports
            .send(RaceReport::Barcode(raw.to_string()))
            .is_ok()
    }

    /// Session this sink reports into.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// False once unbound.
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    fn unbind(&self) {
        self.bound.store(false, Ordering::Release);
    }
}

// =============================================================================
// Linear Decoder Capability
// =============================================================================

/// External 1D barcode decoder.
pub trait LinearDecoder: Send + Sync {
    /// Starts continuous decoding of `stream`, delivering candidates to
    /// `sink` until [`LinearDecoder::stop_live`] is called.
    fn start_live(
        &self,
        stream: Arc<dyn CameraStream>,
        config: &LiveDecodeConfig,
        sink: DetectionSink,
    ) -> EngineResult<LiveHandle>;

    /// Stops a live binding. Unknown or already-stopped handles are ignored.
    fn stop_live(&self, handle: LiveHandle);

    /// Decodes one still image.
    fn decode_single(&self, image: &RgbaImage, config: &SingleShotConfig) -> Option<String>;
}

// =============================================================================
// Linear Engine
// =============================================================================

struct LiveBinding {
    handle: LiveHandle,
    sink: DetectionSink,
}

/// Enforces the single live binding over a [`LinearDecoder`].
pub struct LinearEngine {
    decoder: Arc<dyn LinearDecoder>,
    binding: Mutex<Option<LiveBinding>>,
}

impl LinearEngine {
    /// Wraps a decoder.
    pub fn new(decoder: Arc<dyn LinearDecoder>) -> Self {
        LinearEngine {
            decoder,
            binding: Mutex::new(None),
        }
    }

    /// Starts a live binding, unbinding any previous one first.
    pub fn bind(
        &self,
        stream: Arc<dyn CameraStream>,
        config: &LiveDecodeConfig,
        sink: DetectionSink,
    ) -> EngineResult<LiveHandle> {
        let mut binding = self.lock_binding();

        if let Some(previous) = binding.take() {
            warn!(
                session_id = %previous.sink.session_id(),
                "Rebinding linear decoder, unbinding previous session"
            );
            previous.sink.unbind();
            self.decoder.stop_live(previous.handle);
        }

        let handle = self.decoder.start_live(stream, config, sink.clone())?;
        info!(
            session_id = %sink.session_id(),
            handle = handle.0,
            symbologies = config.symbologies.len(),
            workers = config.workers,
            "Linear decoder bound"
        );
        *binding = Some(LiveBinding { handle, sink });
        Ok(handle)
    }

    /// Unbinds `handle` if it is the current binding.
    ///
    /// Returns true if this call stopped it.
    pub fn unbind(&self, handle: LiveHandle) -> bool {
        let mut binding = self.lock_binding();
        if binding.as_ref().map(|b| b.handle) != Some(handle) {
            return false;
        }

        match binding.take() {
            Some(current) => {
                current.sink.unbind();
                self.decoder.stop_live(current.handle);
                debug!(session_id = %current.sink.session_id(), "Linear decoder unbound");
                true
            }
            None => false,
        }
    }

    /// True while a live binding exists.
    pub fn is_bound(&self) -> bool {
        self.lock_binding().is_some()
    }

    /// Single-shot decode through the wrapped decoder.
    pub fn decode_single(&self, image: &RgbaImage, config: &SingleShotConfig) -> Option<String> {
        self.decoder.decode_single(image, config)
    }

    fn lock_binding(&self) -> MutexGuard<'_, Option<LiveBinding>> {
        self.binding.lock().unwrap_or_else(|poisoned| {
            warn!("Linear binding lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
