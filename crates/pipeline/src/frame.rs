use crate::errors::FrameError;
use ndarray::ArrayD;
use std::fmt;

/// Packed RGB8 image. Frames carry no identity of their own; their position
/// in a queue is their sequence number. They are moved between stages,
/// never copied.
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * Self::CHANNELS;
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with a single color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * Self::CHANNELS)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        let idx = self.index(x, y)?;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Write one pixel; coordinates outside the frame are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if let Some(idx) = self.index(x, y) {
            self.data[idx..idx + Self::CHANNELS].copy_from_slice(&rgb);
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| (y as usize * self.width as usize + x as usize) * Self::CHANNELS)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Raw per-layer detector output for exactly one frame.
#[derive(Default)]
pub struct TensorBatch {
    outputs: Vec<ArrayD<f32>>,
}

impl TensorBatch {
    pub fn new(outputs: Vec<ArrayD<f32>>) -> Self {
        Self { outputs }
    }

    pub fn outputs(&self) -> &[ArrayD<f32>] {
        &self.outputs
    }
}

impl fmt::Debug for TensorBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.outputs.iter().map(|o| o.shape().to_vec()))
            .finish()
    }
}

/// A frame paired with the output inferred from it. Travelling as one value
/// keeps the pair in lockstep through the result queue.
#[derive(Debug)]
pub struct Inferred {
    pub frame: Frame,
    pub batch: TensorBatch,
}

/// Corner-format box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &Detection) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum class confidence for a detection to be kept.
    pub confidence: f32,
    /// IoU above which the weaker of two overlapping boxes is suppressed.
    pub nms: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            nms: 0.3,
        }
    }
}
