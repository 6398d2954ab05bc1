use super::model::BackgroundModel;
use super::preprocess;
use super::types::{BackgroundSubtractor, ForegroundMask, Result, SubtractorError};
use image::{ColorType, DynamicImage};
use ndarray::ArrayView3;

/// Steady-state learning rate used when the caller passes a negative one
pub const DEFAULT_LEARNING_RATE: f64 = 1.0;

/// Learning rate the ramp starts from
pub const INITIAL_RAMP_RATE: f64 = 5.0;

/// Per-frame divisor of the ramp rate; 5 / 1.016^100 ~= 1
pub const RAMP_DECAY: f64 = 1.016;

/// Hyperparameters of the adaptive median estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmedSettings {
    /// Intensity threshold to segment foreground objects
    pub threshold: f64,
    /// Size of the box blur applied to |frame - background| before
    /// thresholding. Reduces noise but also boundary precision, 1 disables it
    pub blur_size: i32,
    /// Start with a high learning rate and ramp it down, for scenes whose
    /// first frames already contain foreground objects
    pub ramp_init: bool,
    /// Do not update the background where foreground is detected. Only
    /// gradual (below threshold) changes make it into the model, and objects
    /// removed from the scene leave a permanent ghost
    pub masked_update: bool,
}

impl Default for AmedSettings {
    fn default() -> Self {
        Self {
            threshold: 20.0,
            blur_size: 3,
            ramp_init: true,
            masked_update: false,
        }
    }
}

/// Learning rate to use for the next frame
///
/// While ramping and still above `target`, the rate decays geometrically;
/// afterwards (or with ramping disabled) it is exactly `target`.
pub fn next_ramp_rate(previous: f64, target: f64, ramp_init: bool) -> f64 {
    if ramp_init && previous > target {
        previous / RAMP_DECAY
    } else {
        target
    }
}

/// Layout locked in by the first frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameLayout {
    width: u32,
    height: u32,
    channels: u8,
}

impl FrameLayout {
    fn of(frame: &DynamicImage) -> Result<Self> {
        let color = frame.color();
        let channels = color.channel_count();
        if color.bytes_per_pixel() != channels {
            return Err(SubtractorError::UnsupportedDepth(color));
        }
        if !matches!(color, ColorType::L8 | ColorType::Rgb8) {
            return Err(SubtractorError::UnsupportedChannels(channels));
        }

        Ok(Self {
            width: frame.width(),
            height: frame.height(),
            channels,
        })
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

/// Classify a frame against the current (not yet updated) model
fn extract_foreground(
    settings: &AmedSettings,
    model: &BackgroundModel,
    frame: ArrayView3<u8>,
) -> ForegroundMask {
    let _span = tracing::debug_span!("extract_foreground").entered();

    let diff = preprocess::abs_diff(frame, model.display());
    let intensity = preprocess::to_luma(diff.view());
    let blurred = preprocess::box_blur(&intensity, settings.blur_size as u32);
    preprocess::binarize(&blurred, settings.threshold)
}

/// Adaptive median background/foreground segmentation
///
/// Each frame moves every background sample one step towards the observed
/// value, so over time the model settles on the per-pixel median of the
/// stream (McFarlane & Schofield, 1995). The step size is the learning rate,
/// optionally ramped down from a fast start.
///
/// A single estimator is not meant to be shared between threads while
/// updating; independent instances can run side by side.
pub struct AdaptiveMedian {
    settings: AmedSettings,

    // Created by the first update, never reset
    model: Option<BackgroundModel>,
    layout: Option<FrameLayout>,

    learning_rate: f64,
    ramp_learning_rate: f64,
}

impl Default for AdaptiveMedian {
    fn default() -> Self {
        Self::new(AmedSettings::default())
    }
}

impl AdaptiveMedian {
    pub fn new(settings: AmedSettings) -> Self {
        Self {
            settings,
            model: None,
            layout: None,
            learning_rate: DEFAULT_LEARNING_RATE,
            ramp_learning_rate: INITIAL_RAMP_RATE,
        }
    }

    pub fn settings(&self) -> AmedSettings {
        self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    /// Steady-state rate requested by the last update
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Rate actually applied by the last update
    pub fn ramp_learning_rate(&self) -> f64 {
        self.ramp_learning_rate
    }

    /// Check every precondition before any state is touched
    fn validate(&self, frame: &DynamicImage) -> Result<FrameLayout> {
        let layout = FrameLayout::of(frame)?;

        if let Some(locked) = self.layout {
            if locked.channels != layout.channels {
                return Err(SubtractorError::ChannelMismatch {
                    expected: locked.channels,
                    found: layout.channels,
                });
            }
            if (locked.width, locked.height) != (layout.width, layout.height) {
                return Err(SubtractorError::ShapeMismatch {
                    expected: (locked.width, locked.height),
                    found: (layout.width, layout.height),
                });
            }
        }

        if self.settings.blur_size <= 0 {
            return Err(SubtractorError::InvalidBlurSize(self.settings.blur_size));
        }

        Ok(layout)
    }
}

impl BackgroundSubtractor for AdaptiveMedian {
    fn update(&mut self, frame: &DynamicImage, learning_rate: f64) -> Result<ForegroundMask> {
        let _span = tracing::debug_span!("amed_update").entered();

        let layout = self.validate(frame)?;
        let samples = ArrayView3::from_shape(layout.shape(), frame.as_bytes())?;

        self.learning_rate = if learning_rate >= 0.0 {
            learning_rate
        } else {
            DEFAULT_LEARNING_RATE
        };

        let was_ramping = self.ramp_learning_rate != self.learning_rate;
        self.ramp_learning_rate = next_ramp_rate(
            self.ramp_learning_rate,
            self.learning_rate,
            self.settings.ramp_init,
        );
        if was_ramping && self.ramp_learning_rate == self.learning_rate {
            tracing::debug!("Learning rate settled at {}", self.learning_rate);
        }

        self.layout.get_or_insert(layout);
        let model = self.model.get_or_insert_with(|| {
            tracing::debug!(
                "Initializing background model to {}x{} with {} channel(s)",
                layout.width,
                layout.height,
                layout.channels
            );
            BackgroundModel::from_frame(samples)
        });

        let mask = extract_foreground(&self.settings, model, samples);

        let frozen = self.settings.masked_update.then_some(&mask);
        model.nudge(samples, self.ramp_learning_rate as f32, frozen);

        Ok(mask)
    }

    fn snapshot(&self) -> Result<DynamicImage> {
        self.model
            .as_ref()
            .ok_or(SubtractorError::NotInitialized)?
            .to_image()
    }

    fn threshold(&self) -> f64 {
        self.settings.threshold
    }

    fn set_threshold(&mut self, threshold: f64) {
        self.settings.threshold = threshold;
    }

    fn blur_size(&self) -> i32 {
        self.settings.blur_size
    }

    fn set_blur_size(&mut self, blur_size: i32) {
        self.settings.blur_size = blur_size;
    }

    fn ramp_init(&self) -> bool {
        self.settings.ramp_init
    }

    fn set_ramp_init(&mut self, ramp_init: bool) {
        self.settings.ramp_init = ramp_init;
    }

    fn masked_update(&self) -> bool {
        self.settings.masked_update
    }

    fn set_masked_update(&mut self, masked_update: bool) {
        self.settings.masked_update = masked_update;
    }
}
