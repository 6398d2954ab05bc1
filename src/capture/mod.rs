mod sequence;
mod v4l_capture;

pub use sequence::ImageSequence;
pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use image::DynamicImage;

/// Trait for frame sources feeding the background estimators
pub trait CaptureSource {
    /// Capture the next frame, `None` once the source is exhausted
    fn capture_frame(&mut self) -> Result<Option<DynamicImage>>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}
