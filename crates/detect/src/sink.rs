use anyhow::Context;
use image::RgbImage;
use pipeline::{Frame, FrameSink};
use std::fs;
use std::path::PathBuf;

fn to_image(frame: &Frame) -> anyhow::Result<RgbImage> {
    RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .context("Frame buffer does not match its dimensions")
}

/// Writes the annotated still image. The format follows the file extension.
pub struct ImageFileSink {
    path: PathBuf,
}

impl ImageFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FrameSink for ImageFileSink {
    fn write(&mut self, frame: &Frame) -> anyhow::Result<()> {
        to_image(frame)?
            .save(&self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), "Image written");
        Ok(())
    }
}

/// Writes each frame as `frame_NNNNNN.png` under one directory.
pub struct FrameDirectorySink {
    dir: PathBuf,
    written: u64,
}

impl FrameDirectorySink {
    pub fn create(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        Ok(Self { dir, written: 0 })
    }

    fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.png"))
    }
}

impl FrameSink for FrameDirectorySink {
    fn write(&mut self, frame: &Frame) -> anyhow::Result<()> {
        let path = self.frame_path(self.written);
        to_image(frame)?
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::trace!(frame = self.written, path = %path.display(), "Frame written");
        self.written += 1;
        Ok(())
    }
}
