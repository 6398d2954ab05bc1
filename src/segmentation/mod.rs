mod amed;
mod model;
pub mod preprocess;
pub mod types;

pub use amed::{
    next_ramp_rate, AdaptiveMedian, AmedSettings, DEFAULT_LEARNING_RATE, INITIAL_RAMP_RATE,
    RAMP_DECAY,
};
pub use model::BackgroundModel;
pub use types::{BackgroundSubtractor, ForegroundMask, Result, SubtractorError};

/// Create a default background subtractor (adaptive median)
pub fn create_default_subtractor(settings: AmedSettings) -> Box<dyn BackgroundSubtractor> {
    Box::new(AdaptiveMedian::new(settings))
}
