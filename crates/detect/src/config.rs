use crate::backend::ExecutionProvider;
use clap::{Args, Parser};
use pipeline::{ExecutionMode, FullPolicy, ModelPaths, PipelineConfig, QueuePolicy, parse_full_policy};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn from_env() -> Self {
        Self::parse(&env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()))
    }

    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Run YOLOv3 object detection over a still image or a directory of frames.
#[derive(Debug, Parser)]
#[command(name = "detect", version)]
pub struct Cli {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output image (for --image) or output frame directory (for --video)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Model directory containing yolov3.onnx and coco.names
    #[arg(short = 'd', long)]
    pub yolo: PathBuf,

    /// Minimum probability to keep a detection [default: 0.5]
    #[arg(short, long)]
    pub confidence: Option<f32>,

    /// IoU threshold for non-maximum suppression [default: 0.3]
    #[arg(short, long)]
    pub threshold: Option<f32>,

    /// Overlap capture, inference and rendering on separate threads [default: true]
    #[arg(short = 'a', long = "async")]
    pub async_mode: Option<bool>,

    /// Capacity of each inter-stage queue; 0 means unbounded [default: 16]
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// What a full queue does with a new frame: block, drop-newest, drop-oldest
    #[arg(long, value_parser = parse_full_policy)]
    pub full_policy: Option<FullPolicy>,

    /// Stop after this many frames
    #[arg(long)]
    pub frame_limit: Option<u64>,

    /// Run the model on the CPU execution provider only
    #[arg(long)]
    pub cpu: bool,

    /// Seed for the per-class box colors
    #[arg(long)]
    pub color_seed: Option<u64>,

    /// TrueType/OpenType font for detection captions [default: bundled DejaVu Sans]
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// OTLP collector endpoint, e.g. http://localhost:4317
    #[arg(long)]
    pub otel_endpoint: Option<String>,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct InputArgs {
    /// Path to an image file
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// Path to a directory of frames, read in file name order
    #[arg(short, long)]
    pub video: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Image(PathBuf),
    FrameDirectory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct DetectConfig {
    pub environment: Environment,
    pub input: Input,
    pub output: PathBuf,
    pub model: ModelPaths,
    pub provider: ExecutionProvider,
    pub color_seed: Option<u64>,
    pub font: Option<PathBuf>,
    pub otel_endpoint: Option<String>,
    pub pipeline: PipelineConfig,
}

impl DetectConfig {
    /// Environment variables first, then command line flags on top.
    pub fn load(cli: Cli) -> anyhow::Result<Self> {
        Self::resolve(cli, PipelineConfig::from_env(), Environment::from_env())
    }

    pub fn resolve(
        cli: Cli,
        mut pipeline: PipelineConfig,
        environment: Environment,
    ) -> anyhow::Result<Self> {
        let (input, output) = match (cli.input.image, cli.input.video) {
            (Some(image), _) => {
                let output = cli.output.unwrap_or_else(|| default_image_output(&image));
                (Input::Image(image), output)
            }
            (None, Some(video)) => {
                let Some(output) = cli.output else {
                    anyhow::bail!("--video requires --output <directory>");
                };
                (Input::FrameDirectory(video), output)
            }
            (None, None) => anyhow::bail!("one of --image or --video is required"),
        };

        if let Some(confidence) = cli.confidence {
            pipeline.thresholds.confidence = confidence;
        }
        if let Some(nms) = cli.threshold {
            pipeline.thresholds.nms = nms;
        }
        if let Some(async_mode) = cli.async_mode {
            pipeline.mode = if async_mode {
                ExecutionMode::Async
            } else {
                ExecutionMode::Sync
            };
        }
        if cli.queue_capacity.is_some() || cli.full_policy.is_some() {
            let current = match pipeline.frame_queue {
                QueuePolicy::Unbounded => (0, FullPolicy::default()),
                QueuePolicy::Bounded { capacity, on_full } => (capacity, on_full),
            };
            let queue = QueuePolicy::bounded(
                cli.queue_capacity.unwrap_or(current.0),
                cli.full_policy.unwrap_or(current.1),
            );
            pipeline.frame_queue = queue;
            pipeline.result_queue = queue;
        }
        if cli.frame_limit.is_some() {
            pipeline.frame_limit = cli.frame_limit;
        }

        let provider = if cli.cpu {
            ExecutionProvider::Cpu
        } else {
            ExecutionProvider::Cuda
        };

        let font = cli.font.or_else(|| env::var("LABEL_FONT").ok().map(PathBuf::from));
        let otel_endpoint = cli
            .otel_endpoint
            .or_else(|| env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok());

        Ok(Self {
            environment,
            input,
            output,
            model: ModelPaths::from_dir(&cli.yolo),
            provider,
            color_seed: cli.color_seed,
            font,
            otel_endpoint,
            pipeline,
        })
    }
}

/// `photo.jpg` is annotated into `photo_out.jpg` next to it.
fn default_image_output(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let ext = image
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
    image.with_file_name(format!("{stem}_out.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("detect").chain(args.iter().copied())).unwrap()
    }

    fn resolve(args: &[&str]) -> anyhow::Result<DetectConfig> {
        DetectConfig::resolve(parse(args), PipelineConfig::default(), Environment::Development)
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("PROD"), Environment::Production);
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse("staging"), Environment::Development);
        assert_eq!(Environment::Production.as_str(), "production");
    }

    #[test]
    fn test_image_defaults() {
        let config = resolve(&["--image", "/data/street.jpg", "--yolo", "/models/yolo"]).unwrap();

        assert_eq!(config.input, Input::Image(PathBuf::from("/data/street.jpg")));
        assert_eq!(config.output, PathBuf::from("/data/street_out.jpg"));
        assert_eq!(config.model.model, PathBuf::from("/models/yolo/yolov3.onnx"));
        assert_eq!(config.provider, ExecutionProvider::Cuda);
        assert_eq!(config.pipeline.mode, ExecutionMode::Async);
        assert_eq!(config.pipeline.thresholds.confidence, 0.5);
        assert_eq!(config.pipeline.thresholds.nms, 0.3);
        assert_eq!(config.pipeline.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_flags_override_pipeline_config() {
        let config = resolve(&[
            "--video",
            "/data/frames",
            "--output",
            "/tmp/out",
            "--yolo",
            "/models/yolo",
            "--confidence",
            "0.6",
            "--threshold",
            "0.4",
            "--async",
            "false",
            "--queue-capacity",
            "2",
            "--full-policy",
            "drop-oldest",
            "--frame-limit",
            "12",
            "--cpu",
            "--font",
            "/fonts/mono.ttf",
        ])
        .unwrap();

        assert_eq!(config.input, Input::FrameDirectory(PathBuf::from("/data/frames")));
        assert_eq!(config.output, PathBuf::from("/tmp/out"));
        assert_eq!(config.pipeline.mode, ExecutionMode::Sync);
        assert_eq!(config.pipeline.thresholds.confidence, 0.6);
        assert_eq!(config.pipeline.thresholds.nms, 0.4);
        assert_eq!(
            config.pipeline.frame_queue,
            QueuePolicy::bounded(2, FullPolicy::DropOldest)
        );
        assert_eq!(config.pipeline.result_queue, config.pipeline.frame_queue);
        assert_eq!(config.pipeline.frame_limit, Some(12));
        assert_eq!(config.provider, ExecutionProvider::Cpu);
        assert_eq!(config.font, Some(PathBuf::from("/fonts/mono.ttf")));
    }

    #[test]
    fn test_video_requires_output() {
        let err = resolve(&["--video", "/data/frames", "--yolo", "/models"]).unwrap_err();
        assert!(err.to_string().contains("--output"));
    }

    #[test]
    fn test_missing_input_is_a_usage_error() {
        let result = Cli::try_parse_from(["detect", "--yolo", "/models"]);
        assert!(result.is_err(), "an input is required");

        let result = Cli::try_parse_from(["detect", "--image", "a.jpg", "--video", "b", "--yolo", "m"]);
        assert!(result.is_err(), "--image and --video are exclusive");
    }
}
