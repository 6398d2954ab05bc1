use super::CaptureSource;
use anyhow::{bail, Context, Result};
use image::DynamicImage;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "pgm", "ppm", "tif", "tiff"];

/// Still images from a directory, played back in file name order
///
/// Useful for recorded footage and for running the pipeline without a camera.
pub struct ImageSequence {
    frames: VecDeque<PathBuf>,
    width: u32,
    height: u32,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl ImageSequence {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        tracing::info!("Reading image sequence from {}", dir.display());

        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                frames.push(path);
            }
        }
        frames.sort();

        let Some(first) = frames.first() else {
            bail!("No images found in {}", dir.display());
        };
        let (width, height) = image::image_dimensions(first)
            .with_context(|| format!("Failed to read {}", first.display()))?;

        tracing::info!("Found {} frames at {}x{}", frames.len(), width, height);

        Ok(Self {
            frames: frames.into(),
            width,
            height,
        })
    }

    /// Frames not yet delivered
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl CaptureSource for ImageSequence {
    fn capture_frame(&mut self) -> Result<Option<DynamicImage>> {
        let Some(path) = self.frames.pop_front() else {
            return Ok(None);
        };

        let frame =
            image::open(&path).with_context(|| format!("Failed to load {}", path.display()))?;
        tracing::debug!("Loaded {}", path.display());

        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("amed-fx-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn plays_frames_in_name_order() {
        let dir = scratch_dir("sequence");
        for (name, value) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
            GrayImage::from_pixel(4, 3, Luma([value]))
                .save(dir.join(name))
                .unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();

        let mut sequence = ImageSequence::new(&dir).unwrap();
        assert_eq!(sequence.resolution(), (4, 3));
        assert_eq!(sequence.remaining(), 3);

        let mut values = Vec::new();
        while let Some(frame) = sequence.capture_frame().unwrap() {
            values.push(frame.to_luma8().get_pixel(0, 0)[0]);
        }
        assert_eq!(values, vec![10, 20, 30]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = scratch_dir("empty");
        assert!(ImageSequence::new(&dir).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
