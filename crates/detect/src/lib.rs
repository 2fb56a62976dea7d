//! YOLOv3 object detection over still images and frame directories, built
//! on the [`pipeline`] crate.

pub mod app;
pub mod backend;
pub mod config;
pub mod font;
pub mod labels;
pub mod logging;
pub mod postprocess;
pub mod preprocess;
pub mod sink;
pub mod source;
pub mod telemetry;

pub use config::{Cli, DetectConfig, Environment, Input};
pub use font::LabelFont;
pub use labels::Labels;
pub use postprocess::YoloPostProcessor;
pub use preprocess::BlobPreprocessor;
pub use sink::{FrameDirectorySink, ImageFileSink};
pub use source::{FrameDirectorySource, SourceError, StillImageSource};
pub use telemetry::TelemetryGuard;
