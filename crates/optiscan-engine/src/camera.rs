//! # Camera Source
//!
//! Owns the one camera session the engine may hold at any time.
//!
//! ## Ownership Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Camera Ownership                                 │
//! │                                                                         │
//! │  CameraBackend (platform)                                              │
//! │       │ acquire(constraints)                                            │
//! │       ▼                                                                 │
//! │  ┌──────────────────────────────┐                                      │
//! │  │ CameraSource                 │   Arc<Mutex<CameraSource>>           │
//! │  │   session: Option<Session>   │◄── scanner (acquire)                 │
//! │  │   torch:   TorchState        │◄── torch controller                  │
//! │  └──────────────┬───────────────┘◄── arbiter teardown (release)       │
//! │                 │                                                       │
//! │                 ▼ StreamLease { seq, stream }                          │
//! │        linear decoder + poll loop read frames from `stream`            │
//! │                                                                         │
//! │  acquire() while a session is open releases the old one FIRST, so     │
//! │  two streams are never open at the same time.                          │
//! │                                                                         │
//! │  release(lease) only acts if `lease.seq` is the current session: a    │
//! │  late teardown from an old scan can never stop a newer stream.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use image::RgbaImage;
use optiscan_core::{CameraConstraints, CoreResult, Facing, FrameSize, ScanError, TorchState};
use tracing::{debug, info, warn};

// =============================================================================
// Capability Traits
// =============================================================================

/// A live camera stream handed out by a [`CameraBackend`].
///
/// Implementations wrap a platform media stream. All methods are cheap and
/// non-blocking; `read_frame` copies whatever frame is current.
pub trait CameraStream: Send + Sync {
    /// Native frame dimensions. Zero on either axis while the camera warms up.
    fn frame_size(&self) -> FrameSize;

    /// Copies the current frame into `target`.
    ///
    /// `target` is already sized to [`CameraStream::frame_size`]. Returns false
    /// if no frame could be read this time.
    fn read_frame(&self, target: &mut RgbaImage) -> bool;

    /// Whether the video track advertises a torch.
    fn torch_capability(&self) -> bool;

    /// Applies the torch constraint to the video track.
    fn apply_torch(&self, on: bool) -> CoreResult<()>;

    /// Stops every track. Must tolerate being called on a stopped stream.
    fn stop(&self);

    /// False once the stream has been stopped.
    fn is_live(&self) -> bool;
}

/// Platform camera access.
pub trait CameraBackend: Send + Sync {
    /// Opens a stream matching `constraints`.
    ///
    /// Fails with [`ScanError::CameraAccess`] on permission denial or when
    /// no device matches.
    fn acquire(&self, constraints: &CameraConstraints) -> CoreResult<Arc<dyn CameraStream>>;
}

// =============================================================================
// Stream Lease
// =============================================================================

/// A stream plus the sequence number of the session it belongs to.
#[derive(Clone)]
pub struct StreamLease {
    seq: u64,
    stream: Arc<dyn CameraStream>,
}

impl StreamLease {
    /// Session sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The underlying stream.
    pub fn stream(&self) -> Arc<dyn CameraStream> {
        Arc::clone(&self.stream)
    }
}

impl std::fmt::Debug for StreamLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamLease")
            .field("seq", &self.seq)
            .field("live", &self.stream.is_live())
            .finish()
    }
}

// =============================================================================
// Camera Session
// =============================================================================

/// The open camera session. Exists only while active.
struct CameraSession {
    seq: u64,
    stream: Arc<dyn CameraStream>,
    constraints: CameraConstraints,
}

// =============================================================================
// Camera Source
// =============================================================================

/// Exclusive owner of the camera session and its torch state.
pub struct CameraSource {
    backend: Arc<dyn CameraBackend>,
    session: Option<CameraSession>,
    torch: TorchState,
    next_seq: u64,
}

impl CameraSource {
    /// Creates a source with no open session.
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        CameraSource {
            backend,
            session: None,
            torch: TorchState::default(),
            next_seq: 1,
        }
    }

    /// Opens a camera matching `constraints`.
    ///
    /// Any open session is released before the backend is asked for a new
    /// stream. On failure nothing is left open.
    pub fn acquire(&mut self, constraints: &CameraConstraints) -> CoreResult<StreamLease> {
        if self.session.is_some() {
            warn!("Camera acquire while a session is open, releasing it first");
            self.release_current();
        }

        let stream = self.backend.acquire(constraints).map_err(|e| {
            warn!(facing = %constraints.facing, error = %e, "Camera acquire failed");
            match e {
                ScanError::CameraAccess { .. } => e,
                other => ScanError::camera_access(other.to_string()),
            }
        })?;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.torch.reset();
        self.session = Some(CameraSession {
            seq,
            stream: Arc::clone(&stream),
            constraints: *constraints,
        });

        info!(
            seq,
            facing = %constraints.facing,
            min_width = constraints.min_width,
            min_height = constraints.min_height,
            "Camera session opened"
        );

        Ok(StreamLease { seq, stream })
    }

    /// Releases the session `lease` came from.
    ///
    /// Returns true if a session was stopped. Calling it again, or with a
    /// lease from an older session, is a no-op.
    pub fn release(&mut self, lease: &StreamLease) -> bool {
        match self.session.as_ref().map(|s| s.seq) {
            Some(seq) if seq == lease.seq => self.release_current(),
            Some(seq) => {
                debug!(
                    lease_seq = lease.seq,
                    current_seq = seq,
                    "Ignoring release for a superseded camera session"
                );
                false
            }
            None => false,
        }
    }

    /// Releases whatever session is open. Idempotent.
    pub fn release_current(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                session.stream.stop();
                self.torch.reset();
                info!(seq = session.seq, facing = %session.constraints.facing, "Camera session released");
                true
            }
            None => false,
        }
    }

    /// True while a session is open.
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Facing of the open session.
    pub fn facing(&self) -> Option<Facing> {
        self.session.as_ref().map(|s| s.constraints.facing)
    }

    /// Lease for the open session.
    pub fn current(&self) -> Option<StreamLease> {
        self.session.as_ref().map(|s| StreamLease {
            seq: s.seq,
            stream: Arc::clone(&s.stream),
        })
    }

    /// Torch state of the open session (default when none is open).
    pub fn torch(&self) -> TorchState {
        self.torch
    }

    // =========================================================================
    // Torch Capability
    // =========================================================================

    /// Asks the open stream whether it has a torch, caching the answer.
    pub fn query_torch_capability(&mut self) -> CoreResult<bool> {
        let session = self.session.as_ref().ok_or(ScanError::NoActiveCamera)?;

        if let Some(known) = self.torch.supported {
            return Ok(known);
        }

        let supported = session.stream.torch_capability();
        debug!(seq = session.seq, supported, "Torch capability queried");
        self.torch.supported = Some(supported);
        Ok(supported)
    }

    /// Applies the torch constraint to the open stream.
    ///
    /// `on` is recorded only after the stream accepts it.
    pub fn apply_torch(&mut self, on: bool) -> CoreResult<()> {
        let session = self.session.as_ref().ok_or(ScanError::NoActiveCamera)?;
        session.stream.apply_torch(on)?;
        self.torch.on = on;
        Ok(())
    }
}

impl std::fmt::Debug for CameraSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSource")
            .field("active", &self.is_active())
            .field("facing", &self.facing())
            .field("torch", &self.torch)
            .finish()
    }
}

/// Shared handle to the camera source.
pub type SharedCamera = Arc<Mutex<CameraSource>>;

/// Locks the camera source, recovering from a poisoned lock.
///
/// A panic while holding the lock leaves the session in a consistent state
/// (every mutation is a single assignment), so the guard is reused.
pub fn lock_camera(camera: &Mutex<CameraSource>) -> MutexGuard<'_, CameraSource> {
    camera.lock().unwrap_or_else(|poisoned| {
        warn!("Camera lock was poisoned, recovering");
        poisoned.into_inner()
    })
}
