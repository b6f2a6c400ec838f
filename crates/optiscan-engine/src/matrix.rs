//! # Matrix Decode Engine
//!
//! The 2D (QR) capability: one synchronous call per pixel buffer.
//!
//! ```text
//! RGBA pixels (w x h x 4) ──► MatrixDecoder::decode ──► Some(payload) | None
//! ```
//!
//! `None` is the normal answer for a frame without a code and is never an
//! error. With the `rqrr` feature (on by default) [`RqrrMatrixDecoder`]
//! provides a working implementation.

use image::RgbaImage;

/// External QR decoder.
pub trait MatrixDecoder: Send + Sync {
    /// Decodes an RGBA8 buffer of `width * height` pixels.
    fn decode(&self, pixels: &[u8], width: u32, height: u32) -> Option<String>;
}

/// Runs `decoder` over a whole image.
pub fn decode_image(decoder: &dyn MatrixDecoder, image: &RgbaImage) -> Option<String> {
    decoder.decode(image.as_raw(), image.width(), image.height())
}

/// Number of bytes an RGBA8 buffer of the given size must hold.
pub(crate) fn rgba_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(4)
}

// =============================================================================
// rqrr Adapter
// =============================================================================

#[cfg(feature = "rqrr")]
pub use rqrr_adapter::RqrrMatrixDecoder;

#[cfg(feature = "rqrr")]
mod rqrr_adapter {
    use tracing::{debug, trace};

    use super::{rgba_len, MatrixDecoder};

    /// [`MatrixDecoder`] backed by the `rqrr` crate.
    ///
    /// Converts to luma, then returns the first grid that decodes.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RqrrMatrixDecoder;

    impl RqrrMatrixDecoder {
        pub fn new() -> Self {
            RqrrMatrixDecoder
        }
    }

    impl MatrixDecoder for RqrrMatrixDecoder {
        fn decode(&self, pixels: &[u8], width: u32, height: u32) -> Option<String> {
            let expected = rgba_len(width, height)?;
            if expected == 0 || pixels.len() < expected {
                debug!(
                    width,
                    height,
                    len = pixels.len(),
                    "Pixel buffer smaller than its dimensions"
                );
                return None;
            }

            // ITU-R BT.601 luma in fixed point
            let luma: Vec<u8> = pixels[..expected]
                .chunks_exact(4)
                .map(|px| {
                    let (r, g, b) = (u32::from(px[0]), u32::from(px[1]), u32::from(px[2]));
                    ((r * 77 + g * 150 + b * 29) >> 8) as u8
                })
                .collect();

            let w = width as usize;
            let mut prepared =
                rqrr::PreparedImage::prepare_from_greyscale(w, height as usize, |x, y| {
                    luma[y * w + x]
                });

            for grid in prepared.detect_grids() {
                match grid.decode() {
                    Ok((_meta, content)) => return Some(content),
                    Err(e) => trace!(error = ?e, "QR grid found but not decodable"),
                }
            }

            None
        }
    }
}
