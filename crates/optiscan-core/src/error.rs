//! # Error Types
//!
//! Domain-specific error types for optiscan-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  optiscan-core errors (this file)                                      │
//! │  ├── ScanError        - Terminal scan failures surfaced to the host    │
//! │  ├── ValidationError  - Barcode candidate rejected by the charset      │
//! │  └── ErrorKind        - What the host's onError receives (serialized)  │
//! │                                                                         │
//! │  optiscan-engine errors (separate crate)                               │
//! │  └── EngineError      - Config, image, backend failures                │
//! │                                                                         │
//! │  Flow: ValidationError → ScanError → EngineError → ErrorKind → Host    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## What Is NOT an Error
//! A poll tick that finds nothing, or a barcode candidate that fails the
//! charset, is the expected steady state of a live scan. Neither is ever
//! surfaced to the host.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Error Kind (host-facing)
// =============================================================================

/// Machine-readable error code passed to the host's `on_error`.
///
/// ## Usage in Frontend
/// ```typescript
/// onError((kind, message) => {
///   switch (kind) {
///     case 'CAMERA_ACCESS_ERROR':
///       showPermissionHelp();
///       break;
///     case 'TORCH_UNSUPPORTED':
///       hideTorchButton();
///       break;
///     default:
///       toast(message);
///   }
/// });
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Permission denied or no camera device.
    CameraAccessError,
    /// Neither decoder found a payload in an uploaded image.
    UnrecognizedImage,
    /// The active track cannot toggle its torch.
    TorchUnsupported,
    /// The QR poll loop hit its configured tick/duration bound.
    ScanTimeout,
    /// A camera-only control was used while no camera session is open.
    NoActiveCamera,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::CameraAccessError => write!(f, "CAMERA_ACCESS_ERROR"),
            ErrorKind::UnrecognizedImage => write!(f, "UNRECOGNIZED_IMAGE"),
            ErrorKind::TorchUnsupported => write!(f, "TORCH_UNSUPPORTED"),
            ErrorKind::ScanTimeout => write!(f, "SCAN_TIMEOUT"),
            ErrorKind::NoActiveCamera => write!(f, "NO_ACTIVE_CAMERA"),
        }
    }
}

// =============================================================================
// Scan Error
// =============================================================================

/// Terminal scan failures.
///
/// Each variant maps to exactly one [`ErrorKind`] and is surfaced once,
/// after every resource of the failed attempt has been released.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// Camera could not be opened.
    ///
    /// ## When This Occurs
    /// - User denied the camera permission prompt
    /// - No device matches the facing/resolution constraints
    /// - Device is held by another application
    ///
    /// Fatal to the current attempt; the decode loops are never started.
    #[error("Camera unavailable: {reason}")]
    CameraAccess { reason: String },

    /// Torch toggle requested on a track without the capability.
    ///
    /// Non-fatal: the scan keeps running and the torch stays off.
    #[error("Torch is not supported by the active camera")]
    TorchUnsupported,

    /// Uploaded image could not be read or contained no code.
    #[error("No barcode or QR code recognized: {reason}")]
    UnrecognizedImage { reason: String },

    /// The poll loop gave up after its configured bound.
    #[error("No code detected after {ticks} ticks ({elapsed_ms} ms)")]
    ScanTimeout { elapsed_ms: u64, ticks: u64 },

    /// Camera-only control used with no open session.
    #[error("No active camera session")]
    NoActiveCamera,

    /// A terminal scan session was asked to start again.
    #[error("Scan session is already {phase}")]
    SessionClosed { phase: String },

    /// Candidate rejected by validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl ScanError {
    /// Returns the host-facing error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::CameraAccess { .. } => ErrorKind::CameraAccessError,
            ScanError::TorchUnsupported => ErrorKind::TorchUnsupported,
            ScanError::UnrecognizedImage { .. } => ErrorKind::UnrecognizedImage,
            ScanError::ScanTimeout { .. } => ErrorKind::ScanTimeout,
            ScanError::NoActiveCamera | ScanError::SessionClosed { .. } => {
                ErrorKind::NoActiveCamera
            }
            ScanError::Validation(_) => ErrorKind::UnrecognizedImage,
        }
    }

    /// Returns true if the error ends the current scan attempt.
    ///
    /// Torch and no-camera errors leave any running scan untouched.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ScanError::TorchUnsupported
                | ScanError::NoActiveCamera
                | ScanError::SessionClosed { .. }
        )
    }

    /// Shorthand for an unrecognized-image error.
    pub fn unrecognized(reason: impl Into<String>) -> Self {
        ScanError::UnrecognizedImage {
            reason: reason.into(),
        }
    }

    /// Shorthand for a camera access error.
    pub fn camera_access(reason: impl Into<String>) -> Self {
        ScanError::CameraAccess {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Barcode candidate validation errors.
///
/// These never reach the host during a live scan: a rejected candidate is
/// dropped and the race continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Candidate is empty after trimming.
    #[error("{field} is required")]
    Required { field: String },

    /// Candidate exceeds the maximum length.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Candidate contains characters outside the allowed charset.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with ScanError.
pub type CoreResult<T> = Result<T, ScanError>;

// =============================================================================
// Unit Tests
// =============================================================================
