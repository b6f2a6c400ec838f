//! # Torch Controller
//!
//! Toggles the flashlight of the open camera session.
//!
//! ```text
//! toggle()
//!   │
//!   ├── no session ─────────────────► Err(NoActiveCamera)
//!   │
//!   ├── capability unknown ──► query once, cache in TorchState
//!   │
//!   ├── unsupported ────────────────► Err(TorchUnsupported), torch stays off
//!   │
//!   └── supported ──► apply(!on) ───► Ok(new state)
//! ```
//!
//! Torch failures never touch the running scan.

use optiscan_core::{CoreResult, ScanError};
use tracing::{debug, warn};

use crate::camera::CameraSource;

/// Stateless torch operations over a [`CameraSource`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TorchController;

impl TorchController {
    /// Flips the torch and returns its new state.
    pub fn toggle(camera: &mut CameraSource) -> CoreResult<bool> {
        if !camera.query_torch_capability()? {
            warn!("Torch toggle requested but the camera has no torch");
            return Err(ScanError::TorchUnsupported);
        }

        let target = !camera.torch().on;
        camera.apply_torch(target)?;
        debug!(on = target, "Torch toggled");
        Ok(target)
    }

    /// Turns the torch off if it is on. No-op without a session.
    pub fn turn_off(camera: &mut CameraSource) -> CoreResult<()> {
        if camera.is_active() && camera.torch().on {
            camera.apply_torch(false)?;
        }
        Ok(())
    }
}
