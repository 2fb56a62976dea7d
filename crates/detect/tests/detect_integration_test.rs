use clap::Parser;
use detect::{BlobPreprocessor, Cli, DetectConfig, Environment, Input, Labels, app};
use image::{Rgb, RgbImage};
use ndarray::{Array, ArrayD, IxDyn};
use pipeline::{Detector, ExecutionMode, Frame, ModelPaths, PipelineConfig, StopReason, TensorBatch};
use std::path::Path;
use std::sync::atomic::AtomicBool;

/// Runs the real preprocessing and reports one fixed box covering the
/// centre quarter of every frame.
struct CentreBoxDetector {
    preprocessor: BlobPreprocessor,
}

impl Detector for CentreBoxDetector {
    fn load_model(_paths: &ModelPaths) -> anyhow::Result<Self> {
        Ok(Self {
            preprocessor: BlobPreprocessor::default(),
        })
    }

    fn preprocess(&mut self, frame: &Frame) -> anyhow::Result<ArrayD<f32>> {
        self.preprocessor.blob(frame)
    }

    fn forward(&mut self, input: &ArrayD<f32>) -> anyhow::Result<TensorBatch> {
        assert_eq!(input.shape(), &[1, 3, 416, 416]);
        let row = vec![0.5, 0.5, 0.5, 0.5, 1.0, 0.9, 0.1];
        let layer = Array::from_shape_vec(IxDyn(&[1, 1, 7]), row)?;
        Ok(TensorBatch::new(vec![layer]))
    }
}

fn detector() -> CentreBoxDetector {
    CentreBoxDetector::load_model(&ModelPaths::from_dir("unused")).unwrap()
}

fn labels() -> Labels {
    Labels::with_names(vec!["person".into(), "car".into()], Some(3))
}

fn config(args: &[&str]) -> DetectConfig {
    let cli = Cli::try_parse_from(std::iter::once("detect").chain(args.iter().copied())).unwrap();
    DetectConfig::resolve(cli, PipelineConfig::default(), Environment::Development).unwrap()
}

fn write_frame(path: &Path, shade: u8) {
    RgbImage::from_pixel(40, 20, Rgb([shade, shade, shade]))
        .save(path)
        .unwrap();
}

#[test]
fn test_still_image_is_annotated() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("street.png");
    write_frame(&input, 0);
    let input_arg = input.to_string_lossy().into_owned();

    let config = config(&["--image", &input_arg, "--yolo", "models"]);
    assert_eq!(config.input, Input::Image(input.clone()));

    let labels = labels();
    let color = labels.color(0);
    let summary = app::run(&config, detector(), labels, &AtomicBool::new(false)).unwrap();

    assert_eq!(summary.frames, 1);
    assert_eq!(summary.stop, StopReason::EndOfStream);
    assert_eq!(summary.budget_mismatch(), None);

    let output = image::open(dir.path().join("street_out.png")).unwrap().to_rgb8();
    // Box spans x 10..30, y 5..15 on a 40x20 frame.
    assert_eq!(output.get_pixel(10, 5).0, color);
    assert_eq!(output.get_pixel(20, 10).0, [0, 0, 0]);
}

#[test]
fn test_frame_directory_runs_in_both_modes() {
    for mode in ["true", "false"] {
        let dir = tempfile::tempdir().unwrap();
        let frames = dir.path().join("frames");
        std::fs::create_dir(&frames).unwrap();
        for i in 0..6u8 {
            write_frame(&frames.join(format!("{i:03}.png")), i * 10);
        }
        let out = dir.path().join("out");
        let frames_arg = frames.to_string_lossy().into_owned();
        let out_arg = out.to_string_lossy().into_owned();

        let config = config(&[
            "--video",
            &frames_arg,
            "--output",
            &out_arg,
            "--yolo",
            "models",
            "--async",
            mode,
        ]);
        let expected_mode = if mode == "true" {
            ExecutionMode::Async
        } else {
            ExecutionMode::Sync
        };
        assert_eq!(config.pipeline.mode, expected_mode);

        let summary = app::run(&config, detector(), labels(), &AtomicBool::new(false)).unwrap();

        assert_eq!(summary.frames, 6, "{mode}");
        assert_eq!(summary.stop, StopReason::EndOfStream);
        assert_eq!(summary.budget_mismatch(), None);
        for i in 0..6u8 {
            let written = image::open(out.join(format!("frame_{i:06}.png")))
                .unwrap()
                .to_rgb8();
            assert_eq!(written.get_pixel(20, 10).0, [i * 10; 3], "frame order kept");
        }
    }
}

#[test]
fn test_unreadable_input_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.png").to_string_lossy().into_owned();
    let config = config(&["--image", &missing, "--yolo", "models"]);

    let err = app::run(&config, detector(), labels(), &AtomicBool::new(false)).unwrap_err();
    assert!(format!("{err:#}").contains("Unable to load image"));
}

#[test]
fn test_unreadable_font_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("street.png");
    write_frame(&input, 0);
    let input_arg = input.to_string_lossy().into_owned();
    let font_arg = dir.path().join("missing.ttf").to_string_lossy().into_owned();

    let config = config(&["--image", &input_arg, "--yolo", "models", "--font", &font_arg]);
    let err = app::run(&config, detector(), labels(), &AtomicBool::new(false)).unwrap_err();

    assert!(format!("{err:#}").contains("Failed to read font"));
    assert!(!dir.path().join("street_out.png").exists());
}
