//! # Engine Error Types
//!
//! Error types for engine operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │      Scan       │  │       Image             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Scan(ScanError)│  │  ImageDecode            │ │
//! │  │  ConfigLoad...  │  │  camera, torch, │  │  (unreadable upload)    │ │
//! │  │  ConfigSave...  │  │  timeout, ...   │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Backend      │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  Backend        │  │  ShuttingDown   │                              │
//! │  │  (decoder start │  │  Internal       │                              │
//! │  │   refused)      │  │                 │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use optiscan_core::{ErrorKind, ScanError};
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type covering every failure a control can return.
///
/// ## Design Principles
/// - Scan failures keep their core [`ScanError`] so the host-facing
///   [`ErrorKind`] is never lost
/// - Everything else is categorized for logging and config tooling
/// - All errors are `Send + Sync` so they cross task boundaries
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid scanner configuration.
    #[error("Invalid scanner configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Scan Errors
    // =========================================================================
    /// A scan-level failure (camera, torch, timeout, unrecognized image).
    #[error(transparent)]
    Scan(#[from] ScanError),

    // =========================================================================
    // Image Errors
    // =========================================================================
    /// Uploaded bytes could not be decoded into pixels.
    #[error("Image could not be decoded: {0}")]
    ImageDecode(String),

    // =========================================================================
    // Backend Errors
    // =========================================================================
    /// A decoder backend refused to start.
    #[error("Decoder backend error: {0}")]
    Backend(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Scanner is shutting down.
    #[error("Scanner is shutting down")]
    ShuttingDown,

    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

impl From<image::ImageError> for EngineError {
    fn from(err: image::ImageError) -> Self {
        EngineError::ImageDecode(err.to_string())
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::Internal(format!("decode task failed: {}", err))
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl EngineError {
    /// Returns the host-facing error kind, if this error is reported to the
    /// host at all.
    ///
    /// Configuration and internal errors are operator problems and have no
    /// `on_error` code.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            EngineError::Scan(e) => Some(e.kind()),
            EngineError::ImageDecode(_) => Some(ErrorKind::UnrecognizedImage),
            EngineError::Backend(_) => Some(ErrorKind::CameraAccessError),
            EngineError::InvalidConfig(_)
            | EngineError::ConfigLoadFailed(_)
            | EngineError::ConfigSaveFailed(_)
            | EngineError::ShuttingDown
            | EngineError::Internal(_) => None,
        }
    }

    /// Returns true if this error ends the current scan attempt.
    ///
    /// ## Non-Fatal Errors
    /// - Torch unsupported (scan keeps running)
    /// - Torch toggled with no camera open
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::Scan(e) => e.is_fatal(),
            _ => true,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::ConfigSaveFailed(_)
        )
    }
}
