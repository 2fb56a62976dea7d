use crate::font::LabelFont;
use crate::labels::Labels;
use anyhow::Context;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use ndarray::ArrayD;
use pipeline::{Detection, Frame, PostProcessor, TensorBatch, Thresholds};
use std::cmp::Ordering;

/// Leading columns of a YOLO row before the class scores.
const BOX_COLUMNS: usize = 5;
const BOX_THICKNESS: u32 = 2;
/// Gap between a caption's baseline area and the top edge of its box.
const CAPTION_GAP: i32 = 5;

/// Decodes YOLOv3 rows, suppresses overlaps and draws the survivors with a
/// `"<label>: <confidence>"` caption.
///
/// Each row holds `cx, cy, w, h, objectness` relative to the frame size,
/// followed by one score per class. A row's confidence is its best class
/// score.
pub struct YoloPostProcessor {
    labels: Labels,
    font: LabelFont,
}

impl YoloPostProcessor {
    pub fn new(labels: Labels, font: LabelFont) -> Self {
        Self { labels, font }
    }
}

impl PostProcessor for YoloPostProcessor {
    fn run(
        &mut self,
        batch: &TensorBatch,
        frame: &mut Frame,
        thresholds: &Thresholds,
    ) -> anyhow::Result<Vec<Detection>> {
        let mut candidates = Vec::new();
        for layer in batch.outputs() {
            decode_layer(layer, frame.width(), frame.height(), thresholds.confidence, &mut candidates)?;
        }
        let candidate_count = candidates.len();
        let detections = suppress(candidates, thresholds.nms);

        if !detections.is_empty() {
            with_image(frame, |image| {
                for det in &detections {
                    let color = Rgb(self.labels.color(det.class_id));
                    let caption = format!("{}: {:.3}", self.labels.name(det.class_id), det.confidence);
                    draw_box(image, det, color);
                    draw_caption(image, det, &caption, color, &self.font);
                    tracing::trace!(caption = %caption, x = det.x1, y = det.y1, "Detection");
                }
            })?;
        }
        tracing::trace!(
            candidates = candidate_count,
            kept = detections.len(),
            "Frame post-processed"
        );

        Ok(detections)
    }
}

/// Append every row of `layer` whose best class score exceeds `confidence`.
/// Rows with a non-finite box are skipped.
pub fn decode_layer(
    layer: &ArrayD<f32>,
    width: u32,
    height: u32,
    confidence: f32,
    out: &mut Vec<Detection>,
) -> anyhow::Result<()> {
    let cols = layer.shape().last().copied().unwrap_or(0);
    if cols <= BOX_COLUMNS {
        anyhow::bail!(
            "Unexpected output shape {:?}: rows need more than {BOX_COLUMNS} columns",
            layer.shape()
        );
    }

    let (w, h) = (width as f32, height as f32);
    for row in layer.rows() {
        let Some((class_id, score)) = row
            .iter()
            .skip(BOX_COLUMNS)
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        else {
            continue;
        };
        if score.is_nan() || score <= confidence {
            continue;
        }

        // Whole pixels, truncated toward zero.
        let center_x = (row[[0]] * w).trunc();
        let center_y = (row[[1]] * h).trunc();
        let box_w = (row[[2]] * w).trunc();
        let box_h = (row[[3]] * h).trunc();
        let left = center_x - (box_w / 2.0).trunc();
        let top = center_y - (box_h / 2.0).trunc();
        let (right, bottom) = (left + box_w, top + box_h);
        if ![left, top, right, bottom].iter().all(|v| v.is_finite()) {
            tracing::trace!(class_id, score, "Skipping row with a non-finite box");
            continue;
        }

        out.push(Detection {
            x1: left,
            y1: top,
            x2: right,
            y2: bottom,
            confidence: score,
            class_id: class_id as u32,
        });
    }
    Ok(())
}

/// Greedy non-maximum suppression across all classes: strongest first, a
/// box is dropped when its IoU with a kept box exceeds `threshold`.
pub fn suppress(mut candidates: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));

    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Lends the frame's pixels to `draw` as an [`RgbImage`].
fn with_image(frame: &mut Frame, draw: impl FnOnce(&mut RgbImage)) -> anyhow::Result<()> {
    let (width, height) = (frame.width(), frame.height());
    let data = std::mem::replace(frame, Frame::filled(0, 0, [0; 3])).into_data();
    let mut image = RgbImage::from_raw(width, height, data)
        .context("Frame buffer does not match its dimensions")?;
    draw(&mut image);
    *frame = Frame::new(width, height, image.into_raw())?;
    Ok(())
}

/// Pins a coordinate just outside `[0, extent]`, so edges off the image stay
/// off it without overflowing the integer math below.
fn pin(value: f32, extent: u32) -> i32 {
    let margin = BOX_THICKNESS as f32 + 1.0;
    value.clamp(-margin, extent as f32 + margin) as i32
}

/// Two pixel rectangle outline; the parts outside the image are skipped.
pub fn draw_box(image: &mut RgbImage, det: &Detection, color: Rgb<u8>) {
    let (left, top) = (pin(det.x1, image.width()), pin(det.y1, image.height()));
    let (right, bottom) = (pin(det.x2, image.width()), pin(det.y2, image.height()));

    for inset in 0..BOX_THICKNESS as i32 {
        let width = right - left + 1 - 2 * inset;
        let height = bottom - top + 1 - 2 * inset;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at(left + inset, top + inset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Caption text ending just above the box's top edge.
pub fn draw_caption(
    image: &mut RgbImage,
    det: &Detection,
    text: &str,
    color: Rgb<u8>,
    font: &LabelFont,
) {
    let (_, text_height) = text_size(font.scale(), font.font(), text);
    let x = pin(det.x1, image.width());
    let y = pin(det.y1, image.height()) - CAPTION_GAP - text_height as i32;
    draw_text_mut(image, color, x, y, font.scale(), font.font(), text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    const BLACK: [u8; 3] = [0, 0, 0];

    fn labels() -> Labels {
        Labels::with_names(vec!["person".into(), "dog".into()], Some(1))
    }

    fn post() -> YoloPostProcessor {
        YoloPostProcessor::new(labels(), LabelFont::bundled().unwrap())
    }

    /// One `[1, rows, 7]` layer: box, objectness, two class scores.
    fn layer(rows: &[[f32; 7]]) -> ArrayD<f32> {
        let data: Vec<f32> = rows.iter().flatten().copied().collect();
        Array::from_shape_vec(IxDyn(&[1, rows.len(), 7]), data).unwrap()
    }

    fn det(x1: f32, confidence: f32) -> Detection {
        Detection {
            x1,
            y1: 0.0,
            x2: x1 + 10.0,
            y2: 10.0,
            confidence,
            class_id: 0,
        }
    }

    fn painted(frame: &Frame, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> usize {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .filter(|&(x, y)| frame.pixel(x, y) != Some(BLACK))
            .count()
    }

    #[test]
    fn test_decode_scales_to_frame_and_picks_best_class() {
        let output = layer(&[
            [0.5, 0.5, 0.2, 0.4, 0.9, 0.1, 0.8],
            [0.5, 0.5, 0.2, 0.4, 0.9, 0.3, 0.2],
        ]);
        let mut out = Vec::new();
        decode_layer(&output, 100, 50, 0.5, &mut out).unwrap();

        assert_eq!(out.len(), 1, "second row is below the threshold");
        let d = out[0];
        assert_eq!(d.class_id, 1);
        assert_eq!(d.confidence, 0.8);
        assert_eq!((d.x1, d.y1, d.x2, d.y2), (40.0, 15.0, 60.0, 35.0));
    }

    #[test]
    fn test_decode_truncates_like_integer_pixels() {
        // cx 10.5 -> 10, w 5.5 -> 5, half width 2.5 -> 2
        let output = layer(&[[0.105, 0.105, 0.055, 0.055, 1.0, 0.9, 0.0]]);
        let mut out = Vec::new();
        decode_layer(&output, 100, 100, 0.5, &mut out).unwrap();

        assert_eq!((out[0].x1, out[0].x2), (8.0, 13.0));
    }

    #[test]
    fn test_decode_rejects_narrow_rows() {
        let narrow = Array::from_shape_vec(IxDyn(&[2, 5]), vec![0.0; 10]).unwrap();
        assert!(decode_layer(&narrow, 10, 10, 0.5, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_confidence_equal_to_threshold_is_dropped() {
        let output = layer(&[[0.5, 0.5, 0.1, 0.1, 1.0, 0.5, 0.0]]);
        let mut out = Vec::new();
        decode_layer(&output, 10, 10, 0.5, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_decode_skips_non_finite_rows() {
        let output = layer(&[
            [0.5, 0.5, f32::INFINITY, 0.1, 1.0, 0.9, 0.0],
            [f32::MAX, 0.5, f32::MAX, 0.1, 1.0, 0.9, 0.0],
            [0.5, 0.5, 0.1, 0.1, 1.0, f32::NAN, 0.0],
            [0.5, 0.5, 0.2, 0.2, 1.0, 0.9, 0.0],
        ]);
        let mut out = Vec::new();
        decode_layer(&output, 1920, 1080, 0.5, &mut out).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].x1, 768.0);
    }

    #[test]
    fn test_suppress_keeps_strongest_of_overlapping_boxes() {
        let kept = suppress(vec![det(0.0, 0.6), det(1.0, 0.9), det(50.0, 0.7)], 0.3);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].x1, 50.0);
    }

    #[test]
    fn test_draw_box_outline_is_clipped() {
        let mut image = RgbImage::new(20, 20);
        let d = Detection {
            x1: -5.0,
            y1: 5.0,
            x2: 10.0,
            y2: 30.0,
            confidence: 1.0,
            class_id: 0,
        };
        draw_box(&mut image, &d, Rgb([255, 0, 0]));

        assert_eq!(image.get_pixel(0, 5).0, [255, 0, 0]);
        assert_eq!(image.get_pixel(0, 6).0, [255, 0, 0], "second pixel of the top edge");
        assert_eq!(image.get_pixel(10, 19).0, [255, 0, 0]);
        assert_eq!(image.get_pixel(9, 19).0, [255, 0, 0], "second pixel of the right edge");
        assert_eq!(image.get_pixel(0, 10).0, BLACK, "left edge lies off the image");
        assert_eq!(image.get_pixel(5, 10).0, BLACK, "interior untouched");
    }

    #[test]
    fn test_draw_box_survives_extreme_coordinates() {
        let mut image = RgbImage::new(8, 8);
        let d = Detection {
            x1: -1.0e30,
            y1: 2.0,
            x2: 1.0e30,
            y2: 4.0,
            confidence: 1.0,
            class_id: 0,
        };
        draw_box(&mut image, &d, Rgb([0, 255, 0]));

        assert_eq!(image.get_pixel(7, 2).0, [0, 255, 0]);
        assert_eq!(image.get_pixel(3, 4).0, [0, 255, 0]);
    }

    #[test]
    fn test_run_draws_in_label_color() {
        let mut post = post();
        let color = post.labels.color(0);
        let mut frame = Frame::filled(100, 100, BLACK);
        let batch = TensorBatch::new(vec![layer(&[
            [0.5, 0.5, 0.2, 0.2, 0.9, 0.95, 0.0],
            [0.51, 0.5, 0.2, 0.2, 0.9, 0.90, 0.0],
        ])]);

        let detections = post.run(&batch, &mut frame, &Thresholds::default()).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(frame.pixel(40, 40), Some(color));
        assert_eq!(frame.pixel(50, 50), Some(BLACK));
    }

    #[test]
    fn test_run_writes_caption_above_the_box() {
        let mut post = post();
        let mut frame = Frame::filled(100, 100, BLACK);
        let batch = TensorBatch::new(vec![layer(&[[0.5, 0.5, 0.2, 0.2, 0.9, 0.95, 0.0]])]);

        post.run(&batch, &mut frame, &Thresholds::default()).unwrap();

        // Box top edge is at y = 40; the caption sits in the 16 px band
        // ending 5 px above it.
        assert!(painted(&frame, 40..100, 19..35) > 20, "caption pixels expected");
        assert_eq!(painted(&frame, 0..40, 0..40), 0, "nothing left of the caption");
        assert_eq!(painted(&frame, 42..59, 42..59), 0, "box interior untouched");
    }

    #[test]
    fn test_run_without_detections_leaves_frame_alone() {
        let mut post = post();
        let mut frame = Frame::filled(10, 10, BLACK);
        let batch = TensorBatch::new(vec![layer(&[[0.5, 0.5, 0.2, 0.2, 0.9, 0.1, 0.0]])]);

        let detections = post.run(&batch, &mut frame, &Thresholds::default()).unwrap();

        assert!(detections.is_empty());
        assert_eq!(painted(&frame, 0..10, 0..10), 0);
    }
}
