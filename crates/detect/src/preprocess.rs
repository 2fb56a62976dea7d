use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use ndarray::{Array, ArrayD, IxDyn};
use pipeline::Frame;

pub const YOLO_INPUT_SIZE: u32 = 416;

/// Stretches a frame to the square network input and scales it to `[0, 1]`
/// in RGB planar order, shaped `[1, 3, size, size]`.
pub struct BlobPreprocessor {
    size: u32,
    resizer: Resizer,
}

impl BlobPreprocessor {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            resizer: Resizer::new(),
        }
    }

    pub fn blob(&mut self, frame: &Frame) -> anyhow::Result<ArrayD<f32>> {
        let src = ImageRef::new(frame.width(), frame.height(), frame.data(), PixelType::U8x3)?;
        let mut resized = Image::new(self.size, self.size, PixelType::U8x3);

        self.resizer.resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        Self::normalize(resized.buffer(), self.size as usize)
    }

    fn normalize(pixels: &[u8], size: usize) -> anyhow::Result<ArrayD<f32>> {
        let spatial = size * size;
        let mut output = vec![0.0f32; 3 * spatial];

        for (i, px) in pixels.chunks_exact(3).enumerate() {
            output[i] = px[0] as f32 / 255.0;
            output[i + spatial] = px[1] as f32 / 255.0;
            output[i + 2 * spatial] = px[2] as f32 / 255.0;
        }

        Ok(Array::from_shape_vec(IxDyn(&[1, 3, size, size]), output)?)
    }
}

impl Default for BlobPreprocessor {
    fn default() -> Self {
        Self::new(YOLO_INPUT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_shape() {
        let frame = Frame::filled(640, 480, [0, 0, 0]);
        let blob = BlobPreprocessor::default().blob(&frame).unwrap();
        assert_eq!(blob.shape(), &[1, 3, 416, 416]);
    }

    #[test]
    fn test_blob_scales_and_splits_channels() {
        let frame = Frame::filled(8, 6, [255, 0, 51]);
        let blob = BlobPreprocessor::new(4).blob(&frame).unwrap();

        assert_eq!(blob.shape(), &[1, 3, 4, 4]);
        // Resampling a flat color may round by one step.
        let step = 1.5 / 255.0;
        assert!((blob[[0, 0, 2, 1]] - 1.0).abs() < step, "red plane first");
        assert!(blob[[0, 1, 2, 1]].abs() < step);
        assert!((blob[[0, 2, 2, 1]] - 0.2).abs() < step);
    }

    #[test]
    fn test_normalize_is_planar() {
        let pixels = [0, 51, 255, 255, 0, 0, 0, 0, 0, 0, 0, 0];
        let blob = BlobPreprocessor::normalize(&pixels, 2).unwrap();

        assert_eq!(blob[[0, 0, 0, 0]], 0.0);
        assert_eq!(blob[[0, 1, 0, 0]], 0.2);
        assert_eq!(blob[[0, 2, 0, 0]], 1.0);
        assert_eq!(blob[[0, 0, 0, 1]], 1.0);
    }
}
