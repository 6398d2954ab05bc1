use image::{ColorType, DynamicImage, GrayImage};
use thiserror::Error;

/// Binary foreground mask: 255 = likely foreground, 0 = likely background
/// Dimensions match the input frame dimensions
pub type ForegroundMask = GrayImage;

pub type Result<T> = std::result::Result<T, SubtractorError>;

/// Precondition violations reported by background subtractors
///
/// These are caller errors: the offending call is aborted and the
/// subtractor keeps the state it had before the call.
#[derive(Debug, Error)]
pub enum SubtractorError {
    #[error("frame depth must be 8 bits per channel, got {0:?}")]
    UnsupportedDepth(ColorType),

    #[error("frame must have 1 or 3 channels, got {0}")]
    UnsupportedChannels(u8),

    #[error("frame has {found} channel(s) but the background model was initialized with {expected}")]
    ChannelMismatch { expected: u8, found: u8 },

    #[error("frame is {}x{} but the background model is {}x{}", .found.0, .found.1, .expected.0, .expected.1)]
    ShapeMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("blur size must be positive, got {0}")]
    InvalidBlurSize(i32),

    #[error("no frame has been processed yet, background model is not initialized")]
    NotInitialized,

    #[error("frame buffer does not match its dimensions")]
    Layout(#[from] ndarray::ShapeError),
}

/// Trait for background subtraction algorithms
/// Allows swapping between different estimators without touching callers
pub trait BackgroundSubtractor {
    /// Classify a frame against the background model, then adapt the model
    ///
    /// # Arguments
    /// * `frame` - 8-bit grayscale or RGB frame
    /// * `learning_rate` - Steady-state update rate, negative selects the default
    ///
    /// # Returns
    /// * Single-channel mask with the frame's width and height
    fn update(&mut self, frame: &DynamicImage, learning_rate: f64) -> Result<ForegroundMask>;

    /// Copy of the current background model with the frame's pixel layout
    fn snapshot(&self) -> Result<DynamicImage>;

    /// Intensity difference above which a pixel is foreground
    fn threshold(&self) -> f64;
    fn set_threshold(&mut self, threshold: f64);

    /// Extent of the box blur applied to the difference image (1 disables it)
    fn blur_size(&self) -> i32;
    fn set_blur_size(&mut self, blur_size: i32);

    /// Start fast and ramp the learning rate down to the requested one
    fn ramp_init(&self) -> bool;
    fn set_ramp_init(&mut self, ramp_init: bool);

    /// Skip the background update where foreground was detected
    fn masked_update(&self) -> bool;
    fn set_masked_update(&mut self, masked_update: bool);
}
