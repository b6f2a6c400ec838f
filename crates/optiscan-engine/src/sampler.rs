//! # Frame Sampler
//!
//! Copies the live frame into an off-screen buffer for the matrix decoder.
//!
//! The buffer is kept across ticks and only reallocated when the stream's
//! native size changes (first frame, or a rotated device).

use image::RgbaImage;
use tracing::{debug, trace};

use crate::camera::CameraStream;

/// Off-screen RGBA buffer sized to the stream's native resolution.
#[derive(Debug)]
pub struct FrameSampler {
    buffer: RgbaImage,
    frames: u64,
}

impl FrameSampler {
    /// Creates a sampler with an empty buffer.
    pub fn new() -> Self {
        FrameSampler {
            buffer: RgbaImage::new(0, 0),
            frames: 0,
        }
    }

    /// Captures the current frame.
    ///
    /// Returns `None` while the stream reports a zero dimension (warming up)
    /// or when no frame could be read.
    pub fn sample(&mut self, stream: &dyn CameraStream) -> Option<&RgbaImage> {
        let size = stream.frame_size();
        if !size.is_ready() {
            trace!("Camera warming up, frame size not known yet");
            return None;
        }

        if self.buffer.dimensions() != (size.width, size.height) {
            debug!(
                width = size.width,
                height = size.height,
                "Resizing sampler buffer to native frame size"
            );
            self.buffer = RgbaImage::new(size.width, size.height);
        }

        if !stream.read_frame(&mut self.buffer) {
            return None;
        }

        self.frames += 1;
        Some(&self.buffer)
    }

    /// Frames captured so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new()
    }
}
