use super::OutputSink;
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Saves every frame as a numbered PNG (`frame_000001.png`, ...)
pub struct ImageDirOutput {
    dir: PathBuf,
    width: u32,
    height: u32,
    written: u64,
}

impl ImageDirOutput {
    pub fn new<P: AsRef<Path>>(dir: P, width: u32, height: u32) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        tracing::info!("Writing frames to {}", dir.display());

        Ok(Self {
            dir,
            width,
            height,
            written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl OutputSink for ImageDirOutput {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        self.written += 1;
        let path = self.dir.join(format!("frame_{:06}.png", self.written));
        let saved = if frame.dimensions() != (self.width, self.height) {
            imageops::resize(frame, self.width, self.height, FilterType::Nearest).save(&path)
        } else {
            frame.save(&path)
        };
        saved.with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
