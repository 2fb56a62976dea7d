use crate::frame::{Detection, Frame, TensorBatch, Thresholds};
use anyhow::Result;
use ndarray::ArrayD;
use std::path::{Path, PathBuf};

pub const MODEL_FILE: &str = "yolov3.onnx";
pub const LABELS_FILE: &str = "coco.names";

/// Files a detector needs, resolved from one model directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub model: PathBuf,
    pub labels: PathBuf,
}

impl ModelPaths {
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            model: dir.join(MODEL_FILE),
            labels: dir.join(LABELS_FILE),
        }
    }
}

/// Turns one frame into raw network output.
///
/// `preprocess` and `forward` are split so the pipeline can time them
/// separately; both run on the inference thread.
pub trait Detector: Send {
    fn load_model(paths: &ModelPaths) -> Result<Self>
    where
        Self: Sized;

    fn preprocess(&mut self, frame: &Frame) -> Result<ArrayD<f32>>;

    fn forward(&mut self, input: &ArrayD<f32>) -> Result<TensorBatch>;

    fn detect(&mut self, frame: &Frame) -> Result<TensorBatch> {
        let input = self.preprocess(frame)?;
        self.forward(&input)
    }
}

/// Decodes raw output into detections and draws them onto the frame.
pub trait PostProcessor {
    fn run(
        &mut self,
        batch: &TensorBatch,
        frame: &mut Frame,
        thresholds: &Thresholds,
    ) -> Result<Vec<Detection>>;
}

pub trait FrameSource: Send {
    /// Next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Frame count announced by the source up front, when it knows one.
    fn reported_frame_count(&self) -> Option<u64> {
        None
    }
}

pub trait FrameSink {
    fn write(&mut self, frame: &Frame) -> Result<()>;

    fn display(&mut self, _frame: &Frame) -> Result<()> {
        Ok(())
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn reported_frame_count(&self) -> Option<u64> {
        (**self).reported_frame_count()
    }
}

impl<K: FrameSink + ?Sized> FrameSink for Box<K> {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        (**self).write(frame)
    }

    fn display(&mut self, frame: &Frame) -> Result<()> {
        (**self).display(frame)
    }
}

impl<P: PostProcessor + ?Sized> PostProcessor for Box<P> {
    fn run(
        &mut self,
        batch: &TensorBatch,
        frame: &mut Frame,
        thresholds: &Thresholds,
    ) -> Result<Vec<Detection>> {
        (**self).run(batch, frame, thresholds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown(u32);

    impl FrameSource for Countdown {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.0 == 0 {
                return Ok(None);
            }
            self.0 -= 1;
            Ok(Some(Frame::filled(2, 2, [0, 0, 0])))
        }
    }

    #[test]
    fn test_model_paths_from_dir() {
        let paths = ModelPaths::from_dir("/models/yolo");
        assert_eq!(paths.model, PathBuf::from("/models/yolo/yolov3.onnx"));
        assert_eq!(paths.labels, PathBuf::from("/models/yolo/coco.names"));
    }

    #[test]
    fn test_boxed_source_forwards() {
        let mut source: Box<dyn FrameSource> = Box::new(Countdown(2));
        assert_eq!(source.reported_frame_count(), None);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }
}
