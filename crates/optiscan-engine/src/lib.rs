//! # optiscan-engine: Live & Static Decode Engine for Optiscan
//!
//! This crate runs the camera, the two decoders and the race between them,
//! and decodes uploaded images through the same decoder capabilities.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Scan Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                     Scanner (Host Facade)                        │  │
//! │  │                                                                  │  │
//! │  │  start_camera_scan / stop_camera_scan / switch_facing           │  │
//! │  │  toggle_torch / decode_uploaded_image / status                  │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ CameraSource   │  │ LinearEngine   │  │  QrPollLoop            │    │
//! │  │                │  │                │  │                        │    │
//! │  │ One session    │  │ Live binding   │  │ FrameSampler +         │    │
//! │  │ TorchState     │  │ DetectionSink  │  │ MatrixDecoder per tick │    │
//! │  └────────────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │                              │  RaceReport            │                 │
//! │                              └──────────┬─────────────┘                 │
//! │                                         ▼                               │
//! │                          ┌─────────────────────────────┐                │
//! │                          │       DecodeArbiter         │                │
//! │                          │ first match wins, teardown  │                │
//! │                          │ exactly once, then Verdict  │                │
//! │                          └──────────────┬──────────────┘                │
//! │                                         ▼                               │
//! │                                  ScanEventSink (host)                   │
//! │                                                                         │
//! │  UPLOADS: StaticImageDecodePath → MatrixDecoder, then                  │
//! │           LinearDecoder::decode_single(all symbologies)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Capabilities
//! - [`camera`] - `CameraBackend`/`CameraStream` traits and `CameraSource`
//! - [`linear`] - `LinearDecoder` trait, `LinearEngine` binding guard
//! - [`matrix`] - `MatrixDecoder` trait and the `rqrr` adapter
//!
//! ### Live Race
//! - [`sampler`] - Off-screen frame buffer
//! - [`poll_loop`] - Cancellable QR polling task
//! - [`arbiter`] - Race resolution and teardown
//! - [`torch`] - Torch toggling
//!
//! ### Host Surface
//! - [`scanner`] - `Scanner` controls and builder
//! - [`events`] - `ScanEventSink` callbacks
//! - [`static_path`] - Uploaded image decoding
//! - [`config`] - `ScannerConfig` (TOML + env)
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use optiscan_engine::{Scanner, ScannerConfig};
//! use optiscan_core::Facing;
//!
//! let config = ScannerConfig::load_or_default(None);
//!
//! let scanner = Scanner::builder(config)
//!     .with_camera(platform_camera)
//!     .with_linear_decoder(platform_barcode_reader)
//!     .with_sink(screen_events)
//!     .build()?;
//!
//! scanner.start_camera_scan(Facing::Environment).await?;
//! // ... screen_events.on_barcode_detected fires once
//!
//! scanner.switch_facing().await?;
//! scanner.stop_camera_scan().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Capabilities
pub mod camera;
pub mod linear;
pub mod matrix;

// Live race
pub mod arbiter;
pub mod poll_loop;
pub mod sampler;
pub mod torch;

// Host surface
pub mod config;
pub mod error;
pub mod events;
pub mod scanner;
pub mod static_path;

// =============================================================================
// Re-exports
// =============================================================================

pub use arbiter::{ArbiterHandle, DecodeArbiter, RaceReport};
pub use camera::{CameraBackend, CameraSource, CameraStream, StreamLease};
pub use config::ScannerConfig;
pub use error::{EngineError, EngineResult};
pub use events::{NoOpSink, ScanEventSink, Verdict};
pub use linear::{
    DetectionSink, LinearDecoder, LinearEngine, LiveDecodeConfig, LiveHandle, SingleShotConfig,
};
pub use matrix::MatrixDecoder;
#[cfg(feature = "rqrr")]
pub use matrix::RqrrMatrixDecoder;
pub use poll_loop::{PollCanceller, PollConfig, PollOutcome, QrPollHandle, QrPollLoop};
pub use scanner::{Scanner, ScannerBuilder};
pub use static_path::StaticImageDecodePath;
pub use torch::TorchController;
