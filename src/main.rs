use amed_fx::capture::{CaptureSource, ImageSequence, WebcamCapture};
use amed_fx::output::{ImageDirOutput, OutputSink, V4L2Output};
use amed_fx::segmentation::{
    create_default_subtractor, preprocess, AmedSettings, BackgroundSubtractor, ForegroundMask,
};
use anyhow::{Context, Result};
use clap::Parser;
use image::DynamicImage;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Read frames from a directory of images instead of the webcam
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Output v4l2loopback device path (e.g. /dev/video10)
    #[arg(short, long)]
    output_device: Option<String>,

    /// Save output frames as numbered PNGs in this directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output resolution width (defaults to the capture width)
    #[arg(long)]
    output_width: Option<u32>,

    /// Output resolution height (defaults to the capture height)
    #[arg(long)]
    output_height: Option<u32>,

    /// Convert frames to grayscale before segmentation
    #[arg(long)]
    grayscale: bool,

    /// Intensity threshold to segment foreground objects
    #[arg(long, default_value_t = 20.0)]
    threshold: f64,

    /// Blur size of the slow (masked update) model
    #[arg(long, default_value_t = 3)]
    slow_blur: i32,

    /// Learning rate of the slow model
    #[arg(long, default_value_t = 0.1)]
    slow_rate: f64,

    /// Blur size of the fast model
    #[arg(long, default_value_t = 5)]
    fast_blur: i32,

    /// Learning rate of the fast model
    #[arg(long, default_value_t = 2.0)]
    fast_rate: f64,

    /// Disable learning rate ramping (use when the first frame is empty background)
    #[arg(long)]
    no_ramp: bool,

    /// Output the slow model's background instead of the foreground mask
    #[arg(long)]
    show_background: bool,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

/// Two estimators over the same stream, foreground only where both agree
///
/// The slow model skips updates under foreground so it keeps a clean
/// background; the fast one adapts quickly to lighting changes. Their
/// intersection drops most single-model false positives.
struct Ensemble {
    slow: Box<dyn BackgroundSubtractor>,
    slow_rate: f64,
    fast: Box<dyn BackgroundSubtractor>,
    fast_rate: f64,
}

impl Ensemble {
    fn from_args(args: &Args) -> Self {
        let slow = AmedSettings {
            threshold: args.threshold,
            blur_size: args.slow_blur,
            ramp_init: !args.no_ramp,
            masked_update: true,
        };
        let fast = AmedSettings {
            blur_size: args.fast_blur,
            masked_update: false,
            ..slow
        };
        tracing::info!("Slow model: {:?}, rate={}", slow, args.slow_rate);
        tracing::info!("Fast model: {:?}, rate={}", fast, args.fast_rate);

        Self {
            slow: create_default_subtractor(slow),
            slow_rate: args.slow_rate,
            fast: create_default_subtractor(fast),
            fast_rate: args.fast_rate,
        }
    }

    fn apply(&mut self, frame: &DynamicImage) -> Result<ForegroundMask> {
        let slow = self
            .slow
            .update(frame, self.slow_rate)
            .context("Slow model update failed")?;
        let fast = self
            .fast
            .update(frame, self.fast_rate)
            .context("Fast model update failed")?;

        preprocess::intersect(&slow, &fast).context("Model masks differ in size")
    }

    fn background(&self) -> Result<DynamicImage> {
        Ok(self.slow.snapshot()?)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("amed-fx starting");

    // Initialize capture
    let mut capture: Box<dyn CaptureSource> = match &args.input_dir {
        Some(dir) => Box::new(
            ImageSequence::new(dir).context("Failed to open image sequence")?,
        ),
        None => Box::new(
            WebcamCapture::new(args.input_device).context("Failed to initialize webcam capture")?,
        ),
    };
    let (capture_width, capture_height) = capture.resolution();
    tracing::info!("Capture: {}x{}", capture_width, capture_height);

    // Initialize outputs
    let output_width = args.output_width.unwrap_or(capture_width);
    let output_height = args.output_height.unwrap_or(capture_height);
    let mut outputs: Vec<Box<dyn OutputSink>> = Vec::new();
    if let Some(device) = &args.output_device {
        let output = V4L2Output::new(device, output_width, output_height)
            .context("Failed to initialize v4l2loopback output")?;
        outputs.push(Box::new(output));
    }
    if let Some(dir) = &args.output_dir {
        let output = ImageDirOutput::new(dir, output_width, output_height)
            .context("Failed to initialize image output")?;
        outputs.push(Box::new(output));
    }
    if outputs.is_empty() {
        tracing::info!("No output configured, reporting statistics only");
    }

    let mut ensemble = Ensemble::from_args(&args);

    // Main loop
    run_pipeline(capture.as_mut(), &mut outputs, &mut ensemble, &args)?;

    Ok(())
}

fn run_pipeline(
    capture: &mut dyn CaptureSource,
    outputs: &mut [Box<dyn OutputSink>],
    ensemble: &mut Ensemble,
    args: &Args,
) -> Result<()> {
    let mut frame_count = 0u64;
    let mut foreground_pixels = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_segment_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    tracing::info!("Starting main pipeline loop");
    tracing::info!("Press Ctrl+C to stop");

    loop {
        if args.max_frames.is_some_and(|max| frame_count >= max) {
            tracing::info!("Reached frame limit");
            break;
        }

        // Capture frame
        let capture_start = Instant::now();
        let Some(frame) = capture.capture_frame().context("Failed to capture frame")? else {
            tracing::info!("Input exhausted");
            break;
        };
        let frame = if args.grayscale {
            DynamicImage::ImageLuma8(frame.to_luma8())
        } else {
            DynamicImage::ImageRgb8(frame.to_rgb8())
        };
        total_capture_time += capture_start.elapsed();

        // Segmentation
        let segment_start = Instant::now();
        let mask = ensemble.apply(&frame)?;
        foreground_pixels += mask.pixels().filter(|p| p[0] != 0).count() as u64;
        total_segment_time += segment_start.elapsed();

        // Output frame
        let output_start = Instant::now();
        if !outputs.is_empty() {
            let output_frame = if args.show_background {
                ensemble.background()?.to_rgb8()
            } else {
                DynamicImage::ImageLuma8(mask).to_rgb8()
            };
            for output in outputs.iter_mut() {
                output
                    .write_frame(&output_frame)
                    .context("Failed to write frame")?;
            }
        }
        total_output_time += output_start.elapsed();

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_segment_ms = total_segment_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let total_ms = avg_capture_ms + avg_segment_ms + avg_output_ms;
            let actual_fps = 1000.0 / total_ms;

            tracing::info!(
                "Frame {}: capture={:.1}ms, segment={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
                frame_count,
                avg_capture_ms,
                avg_segment_ms,
                avg_output_ms,
                total_ms,
                actual_fps
            );
        }
    }

    tracing::info!(
        "Processed {} frames, {} foreground pixels",
        frame_count,
        foreground_pixels
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["amed-fx"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn cli_defaults_match_demo_models() {
        let args = args(&[]);
        assert_eq!(args.threshold, 20.0);
        assert_eq!((args.slow_blur, args.slow_rate), (3, 0.1));
        assert_eq!((args.fast_blur, args.fast_rate), (5, 2.0));
        assert!(!args.no_ramp);
        assert!(args.input_dir.is_none());
    }

    #[test]
    fn ensemble_reports_only_agreed_foreground() {
        let args = args(&["--no-ramp", "--slow-blur", "1", "--fast-blur", "1"]);
        let mut ensemble = Ensemble::from_args(&args);

        let empty = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 1, Luma([0])));
        assert!(ensemble.apply(&empty).unwrap().pixels().all(|p| p[0] == 0));

        let mut object = GrayImage::from_pixel(2, 1, Luma([0]));
        object.put_pixel(1, 0, Luma([200]));
        let mask = ensemble.apply(&DynamicImage::ImageLuma8(object)).unwrap();
        assert_eq!(mask.as_raw(), &vec![0, 255]);

        let background = ensemble.background().unwrap();
        assert_eq!(background.as_luma8().unwrap().as_raw(), &vec![0, 0]);
    }
}
