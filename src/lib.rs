//! Adaptive median background/foreground segmentation for video streams.
//!
//! The [`segmentation`] module holds the estimator itself; [`capture`] and
//! [`output`] are the frame sources and sinks used by the `amed-fx` binary.

pub mod capture;
pub mod output;
pub mod segmentation;
