use anyhow::Context;
use pipeline::{Frame, FrameSource};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FRAME_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("No frames found in {0}")]
    Empty(PathBuf),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Decode an image file into an RGB frame.
pub fn load_frame(path: &Path) -> anyhow::Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("Failed to decode {}", path.display()))?
        .to_rgb8();
    let (width, height) = image.dimensions();
    Ok(Frame::new(width, height, image.into_raw())?)
}

/// A single image, decoded when the source is opened.
pub struct StillImageSource {
    frame: Option<Frame>,
}

impl StillImageSource {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let frame = load_frame(path)?;
        tracing::info!(
            path = %path.display(),
            width = frame.width(),
            height = frame.height(),
            "Image loaded"
        );
        Ok(Self { frame: Some(frame) })
    }
}

impl FrameSource for StillImageSource {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        Ok(self.frame.take())
    }

    fn reported_frame_count(&self) -> Option<u64> {
        Some(1)
    }
}

/// Image files of one directory played back in file name order. Files are
/// decoded lazily, one per `next_frame`.
pub struct FrameDirectorySource {
    pending: VecDeque<PathBuf>,
    total: u64,
}

impl FrameDirectorySource {
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        if !dir.is_dir() {
            return Err(SourceError::NotADirectory(dir.to_path_buf()).into());
        }

        let escaped = glob::Pattern::escape(&dir.to_string_lossy());
        let mut paths = Vec::new();
        for entry in glob::glob(&format!("{escaped}/*")).map_err(SourceError::from)? {
            let path = entry?;
            if is_frame_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(SourceError::Empty(dir.to_path_buf()).into());
        }

        tracing::info!(dir = %dir.display(), frames = paths.len(), "Frame directory opened");
        Ok(Self {
            total: paths.len() as u64,
            pending: paths.into(),
        })
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

impl FrameSource for FrameDirectorySource {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        tracing::trace!(path = %path.display(), "Reading frame");
        load_frame(&path).map(Some)
    }

    fn reported_frame_count(&self) -> Option<u64> {
        Some(self.total)
    }
}
