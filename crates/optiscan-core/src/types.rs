//! # Domain Types
//!
//! Core domain types used throughout Optiscan.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  DecodeResult   │   │     Facing      │   │    Symbology    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  kind           │   │  Environment    │   │  Code128        │       │
//! │  │  text           │   │  User           │   │  Ean13 ...      │       │
//! │  │  source         │   └─────────────────┘   └─────────────────┘       │
//! │  │  session_id     │                                                    │
//! │  │  detected_at    │   ┌─────────────────┐   ┌─────────────────┐       │
//! │  └─────────────────┘   │ CameraConstr.   │   │   TorchState    │       │
//! │                        │  facing         │   │  supported?     │       │
//! │  ┌─────────────────┐   │  min_width      │   │  on             │       │
//! │  │    ScanMode     │   │  min_height     │   └─────────────────┘       │
//! │  │  Camera|Upload  │   └─────────────────┘                              │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::race::RacePhase;
use crate::{DEFAULT_MIN_HEIGHT, DEFAULT_MIN_WIDTH, DEFAULT_REGION_PCT};

// =============================================================================
// Facing Mode
// =============================================================================

/// Which physical camera is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    /// Rear camera, pointing away from the user.
    #[default]
    Environment,
    /// Front camera, pointing at the user.
    User,
}

impl Facing {
    /// Returns the other camera.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Facing::Environment => Facing::User,
            Facing::User => Facing::Environment,
        }
    }
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Facing::Environment => write!(f, "environment"),
            Facing::User => write!(f, "user"),
        }
    }
}

impl std::str::FromStr for Facing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "environment" | "back" | "rear" => Ok(Facing::Environment),
            "user" | "front" | "selfie" => Ok(Facing::User),
            other => Err(format!(
                "Unknown facing mode: '{}'. Valid options: environment, user",
                other
            )),
        }
    }
}

// =============================================================================
// Scan Mode
// =============================================================================

/// Which pipeline is active. The two are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Live race between linear and matrix decoders on the camera stream.
    #[default]
    Camera,
    /// Static decode of an uploaded image.
    Upload,
}

// =============================================================================
// Code Kind
// =============================================================================

/// The family of the decoded symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    /// 1D linear barcode (normalized, charset-validated).
    Barcode,
    /// 2D QR matrix code (free-form payload).
    QrCode,
}

impl std::fmt::Display for CodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeKind::Barcode => write!(f, "barcode"),
            CodeKind::QrCode => write!(f, "qr_code"),
        }
    }
}

/// Which decode path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Continuous linear decoder bound to the live stream.
    LiveLinear,
    /// Frame-sampling QR poll loop.
    LivePoll,
    /// Static uploaded image.
    Upload,
}

// =============================================================================
// Symbology
// =============================================================================

/// Linear barcode encoding standards the linear decoder may be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Symbology {
    Code128,
    Code39,
    Code93,
    Codabar,
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Itf,
}

impl Symbology {
    /// Subset used during live scanning.
    ///
    /// Fewer readers per frame keeps the live decoder responsive; these are
    /// the symbologies printed on asset labels in practice.
    pub const LIVE: [Symbology; 6] = [
        Symbology::Code128,
        Symbology::Code39,
        Symbology::Ean13,
        Symbology::Ean8,
        Symbology::UpcA,
        Symbology::UpcE,
    ];

    /// Full set used for single-shot decoding of uploaded images.
    pub const ALL: [Symbology; 9] = [
        Symbology::Code128,
        Symbology::Code39,
        Symbology::Code93,
        Symbology::Codabar,
        Symbology::Ean13,
        Symbology::Ean8,
        Symbology::UpcA,
        Symbology::UpcE,
        Symbology::Itf,
    ];
}

impl std::fmt::Display for Symbology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Symbology::Code128 => "code128",
            Symbology::Code39 => "code39",
            Symbology::Code93 => "code93",
            Symbology::Codabar => "codabar",
            Symbology::Ean13 => "ean13",
            Symbology::Ean8 => "ean8",
            Symbology::UpcA => "upc_a",
            Symbology::UpcE => "upc_e",
            Symbology::Itf => "itf",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for Symbology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "code128" | "code_128" => Ok(Symbology::Code128),
            "code39" | "code_39" => Ok(Symbology::Code39),
            "code93" | "code_93" => Ok(Symbology::Code93),
            "codabar" => Ok(Symbology::Codabar),
            "ean13" | "ean_13" => Ok(Symbology::Ean13),
            "ean8" | "ean_8" => Ok(Symbology::Ean8),
            "upc_a" | "upca" => Ok(Symbology::UpcA),
            "upc_e" | "upce" => Ok(Symbology::UpcE),
            "itf" | "i2of5" => Ok(Symbology::Itf),
            other => Err(format!("Unknown symbology: '{}'", other)),
        }
    }
}

// =============================================================================
// Geometry
// =============================================================================

/// Native pixel dimensions of a frame. Zero while the camera warms up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        FrameSize { width, height }
    }

    /// True once both axes are nonzero.
    #[inline]
    pub const fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// A pixel rectangle inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Centered region of interest expressed as a percentage of each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub width_pct: u8,
    pub height_pct: u8,
}

impl RegionOfInterest {
    pub const fn new(width_pct: u8, height_pct: u8) -> Self {
        RegionOfInterest {
            width_pct,
            height_pct,
        }
    }

    /// Whole frame.
    pub const fn full() -> Self {
        RegionOfInterest::new(100, 100)
    }

    /// Resolves the region against a concrete frame size.
    ///
    /// ## Example
    /// ```rust
    /// use optiscan_core::types::{FrameSize, RegionOfInterest};
    ///
    /// let rect = RegionOfInterest::new(60, 60).rect(FrameSize::new(1000, 500));
    /// assert_eq!((rect.x, rect.y, rect.width, rect.height), (200, 100, 600, 300));
    /// ```
    pub fn rect(&self, frame: FrameSize) -> PixelRect {
        let w_pct = u64::from(self.width_pct.min(100));
        let h_pct = u64::from(self.height_pct.min(100));
        let width = (u64::from(frame.width) * w_pct / 100) as u32;
        let height = (u64::from(frame.height) * h_pct / 100) as u32;

        PixelRect {
            x: (frame.width - width) / 2,
            y: (frame.height - height) / 2,
            width,
            height,
        }
    }
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        RegionOfInterest::new(DEFAULT_REGION_PCT, DEFAULT_REGION_PCT)
    }
}

// =============================================================================
// Camera Constraints
// =============================================================================

/// What the scanner asks of the platform camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConstraints {
    pub facing: Facing,
    pub min_width: u32,
    pub min_height: u32,
}

impl CameraConstraints {
    pub const fn new(facing: Facing, min_width: u32, min_height: u32) -> Self {
        CameraConstraints {
            facing,
            min_width,
            min_height,
        }
    }

    /// Same constraints pointed at the other camera.
    pub const fn flipped(self) -> Self {
        CameraConstraints {
            facing: self.facing.opposite(),
            ..self
        }
    }
}

impl Default for CameraConstraints {
    fn default() -> Self {
        CameraConstraints::new(Facing::default(), DEFAULT_MIN_WIDTH, DEFAULT_MIN_HEIGHT)
    }
}

// =============================================================================
// Torch State
// =============================================================================

/// Flashlight state of the active camera.
///
/// ## Lifecycle
/// ```text
/// camera acquired ──► { supported: None, on: false }
///                           │ first toggle
///                           ▼
///            supported: Some(true|false)
///                           │ camera released
///                           ▼
///                  { supported: None, on: false }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TorchState {
    /// `None` until the capability has been queried.
    pub supported: Option<bool>,
    /// Whether the torch is currently lit.
    pub on: bool,
}

impl TorchState {
    /// Back to off/unknown.
    pub fn reset(&mut self) {
        *self = TorchState::default();
    }
}

// =============================================================================
// Decode Result
// =============================================================================

/// The single accepted outcome of a scan session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DecodeResult {
    /// Symbol family.
    pub kind: CodeKind,

    /// Payload. Normalized for barcodes, verbatim for QR codes.
    pub text: String,

    /// Which decode path produced it.
    pub source: DetectionSource,

    /// Scan session that produced it (UUID v4).
    pub session_id: String,

    /// When the winning report was accepted.
    #[ts(as = "String")]
    pub detected_at: DateTime<Utc>,
}

impl DecodeResult {
    /// Builds a barcode result. `text` must already be normalized.
    pub fn barcode(text: String, source: DetectionSource, session_id: &str) -> Self {
        DecodeResult {
            kind: CodeKind::Barcode,
            text,
            source,
            session_id: session_id.to_string(),
            detected_at: Utc::now(),
        }
    }

    /// Builds a QR result. The payload is kept as-is.
    pub fn qr_code(payload: String, source: DetectionSource, session_id: &str) -> Self {
        DecodeResult {
            kind: CodeKind::QrCode,
            text: payload,
            source,
            session_id: session_id.to_string(),
            detected_at: Utc::now(),
        }
    }
}

// =============================================================================
// Scan Status
// =============================================================================

/// Snapshot of the scanner for the host UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatus {
    pub mode: ScanMode,
    pub facing: Facing,
    pub phase: RacePhase,
    pub torch: TorchState,
    pub session_id: Option<String>,
}

impl Default for ScanStatus {
    fn default() -> Self {
        ScanStatus {
            mode: ScanMode::Camera,
            facing: Facing::Environment,
            phase: RacePhase::Idle,
            torch: TorchState::default(),
            session_id: None,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facing_opposite() {
        assert_eq!(Facing::Environment.opposite(), Facing::User);
        assert_eq!(Facing::User.opposite(), Facing::Environment);
        assert_eq!(Facing::default(), Facing::Environment);
    }

    #[test]
    fn test_facing_parsing() {
        assert_eq!("environment".parse::<Facing>().unwrap(), Facing::Environment);
        assert_eq!("FRONT".parse::<Facing>().unwrap(), Facing::User);
        assert!("sideways".parse::<Facing>().is_err());
    }

    #[test]
    fn test_symbology_sets() {
        for s in Symbology::LIVE {
            assert!(Symbology::ALL.contains(&s));
        }
        assert!(Symbology::ALL.len() > Symbology::LIVE.len());
    }

    #[test]
    fn test_symbology_round_trip_names() {
        for s in Symbology::ALL {
            assert_eq!(s.to_string().parse::<Symbology>().unwrap(), s);
        }
        let json = serde_json::to_string(&Symbology::UpcA).unwrap();
        assert_eq!(json, "\"upc_a\"");
    }

    #[test]
    fn test_region_rect_centered() {
        let rect = RegionOfInterest::default().rect(FrameSize::new(1280, 720));
        assert_eq!(rect.width, 768);
        assert_eq!(rect.height, 432);
        assert_eq!(rect.x, 256);
        assert_eq!(rect.y, 144);

        let full = RegionOfInterest::full().rect(FrameSize::new(640, 480));
        assert_eq!((full.x, full.y, full.width, full.height), (0, 0, 640, 480));
    }

    #[test]
    fn test_region_clamps_over_100() {
        let rect = RegionOfInterest::new(250, 250).rect(FrameSize::new(100, 100));
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (0, 0, 100, 100));
    }

    #[test]
    fn test_frame_size_ready() {
        assert!(!FrameSize::default().is_ready());
        assert!(!FrameSize::new(640, 0).is_ready());
        assert!(FrameSize::new(640, 480).is_ready());
    }

    #[test]
    fn test_constraints_flipped() {
        let c = CameraConstraints::default();
        let flipped = c.flipped();
        assert_eq!(flipped.facing, Facing::User);
        assert_eq!(flipped.min_width, c.min_width);
    }

    #[test]
    fn test_torch_reset() {
        let mut torch = TorchState {
            supported: Some(true),
            on: true,
        };
        torch.reset();
        assert_eq!(torch, TorchState::default());
        assert!(torch.supported.is_none());
    }

    #[test]
    fn test_decode_result_json_shape() {
        let result = DecodeResult::qr_code(
            "https://example.com".to_string(),
            DetectionSource::Upload,
            "session-1",
        );
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"kind\":\"qr_code\""));
        assert!(json.contains("\"sessionId\":\"session-1\""));
        assert!(json.contains("\"detectedAt\""));
    }
}
