//! # Static Image Decode Path
//!
//! Decodes an uploaded image with the same two capabilities the live race
//! uses, in a fixed order.
//!
//! ```text
//! bytes ──► size checks ──► image::load_from_memory ──► RGBA buffer (once)
//!                                                          │
//!              ┌───────────────────────────────────────────┘
//!              ▼
//!        MatrixDecoder ── payload ──► QrCode result
//!              │ none
//!              ▼
//!        LinearDecoder::decode_single(ALL symbologies, locate) ──► Barcode result
//!              │ none / fails charset
//!              ▼
//!        UnrecognizedImage
//! ```
//!
//! Exactly one outcome per call: a result or an error, never both.

use std::sync::Arc;

use image::RgbaImage;
use optiscan_core::validation::normalize_barcode;
use optiscan_core::{DecodeResult, DetectionSource, ScanError};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::linear::{LinearEngine, SingleShotConfig};
use crate::matrix::{decode_image, MatrixDecoder};

/// Upload decoder.
#[derive(Clone)]
pub struct StaticImageDecodePath {
    matrix: Arc<dyn MatrixDecoder>,
    linear: Arc<LinearEngine>,
    max_bytes: usize,
}

impl StaticImageDecodePath {
    pub fn new(matrix: Arc<dyn MatrixDecoder>, linear: Arc<LinearEngine>, max_bytes: usize) -> Self {
        StaticImageDecodePath {
            matrix,
            linear,
            max_bytes,
        }
    }

    /// Decodes an encoded image file (PNG, JPEG, ...).
    pub fn decode(&self, bytes: &[u8], session_id: &str) -> EngineResult<DecodeResult> {
        if bytes.is_empty() {
            return Err(ScanError::unrecognized("uploaded file is empty").into());
        }

        if bytes.len() > self.max_bytes {
            return Err(ScanError::unrecognized(format!(
                "uploaded file is {} bytes, limit is {}",
                bytes.len(),
                self.max_bytes
            ))
            .into());
        }

        let image = image::load_from_memory(bytes)
            .map_err(EngineError::from)?
            .to_rgba8();
        debug!(
            session_id,
            width = image.width(),
            height = image.height(),
            "Uploaded image decoded to pixels"
        );

        self.decode_pixels(&image, session_id)
    }

    /// Decodes an already-loaded RGBA image.
    pub fn decode_pixels(&self, image: &RgbaImage, session_id: &str) -> EngineResult<DecodeResult> {
        if let Some(payload) = decode_image(self.matrix.as_ref(), image) {
            info!(session_id, "QR code found in uploaded image");
            return Ok(DecodeResult::qr_code(
                payload,
                DetectionSource::Upload,
                session_id,
            ));
        }

        let raw = self
            .linear
            .decode_single(image, &SingleShotConfig::full())
            .ok_or_else(|| ScanError::unrecognized("no barcode or QR code found"))?;

        let text = normalize_barcode(&raw).map_err(|e| {
            debug!(session_id, raw = %raw, error = %e, "Uploaded barcode failed validation");
            ScanError::unrecognized(format!("barcode rejected: {}", e))
        })?;

        info!(session_id, text = %text, "Barcode found in uploaded image");
        Ok(DecodeResult::barcode(text, DetectionSource::Upload, session_id))
    }
}

impl std::fmt::Debug for StaticImageDecodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticImageDecodePath")
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}
