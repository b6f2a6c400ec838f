//! # optiscan-core: Pure Scan Domain for Optiscan
//!
//! This crate is the **heart** of Optiscan. It contains the data model and
//! the rules every decode path must obey, as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Optiscan Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Host Screen (out of scope)                   │   │
//! │  │    Scan button ──► Camera view ──► Asset lookup ──► Popup       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ ScanEventSink / controls               │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    optiscan-engine                              │   │
//! │  │    camera, linear/matrix decoders, poll loop, arbiter           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ optiscan-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   race    │  │ validation│  │   error   │  │   │
//! │  │   │DecodeRes. │  │ RaceState │  │ normalize │  │ ScanError │  │   │
//! │  │   │ Symbology │  │ RacePhase │  │  charset  │  │ ErrorKind │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO CAMERA • NO DECODERS • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (DecodeResult, Facing, Symbology, etc.)
//! - [`race`] - The per-session first-match-wins state machine
//! - [`error`] - Domain error types and caller-facing error kinds
//! - [`validation`] - Barcode normalization and charset rules
//!
//! ## Example Usage
//!
//! ```rust
//! use optiscan_core::race::RaceState;
//! use optiscan_core::validation::normalize_barcode;
//!
//! let mut race = RaceState::new();
//! race.start().unwrap();
//!
//! let text = normalize_barcode("  abc-123 ").unwrap();
//! assert_eq!(text, "ABC-123");
//!
//! // First report wins, the second one is a no-op
//! assert!(race.try_resolve());
//! assert!(!race.try_resolve());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod race;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use optiscan_core::RaceState` instead of
// `use optiscan_core::race::RaceState`

pub use error::{CoreResult, ErrorKind, ScanError, ValidationError};
pub use race::{RacePhase, RaceState};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default minimum stream width requested from the camera.
pub const DEFAULT_MIN_WIDTH: u32 = 1280;

/// Default minimum stream height requested from the camera.
pub const DEFAULT_MIN_HEIGHT: u32 = 720;

/// Default live-mode region of interest, as a percentage of each frame axis.
///
/// The linear decoder only looks at the centered 60% x 60% window, which is
/// where the on-screen aiming guide sits.
pub const DEFAULT_REGION_PCT: u8 = 60;

/// Maximum accepted length of a barcode candidate after normalization.
pub const MAX_BARCODE_LEN: usize = 64;
