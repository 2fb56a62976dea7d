//! Three-stage frame pipeline: capture, inference, render.
//!
//! A [`Pipeline`] pulls frames from a [`FrameSource`], runs them through a
//! [`Detector`], and hands the raw output with its frame to a
//! [`PostProcessor`] and a [`FrameSink`]. The async mode overlaps the three
//! stages on separate threads joined by rate-tracked queues; the sync mode
//! runs them one after another and produces the same detections.

pub mod cancel;
pub mod config;
pub mod errors;
pub mod frame;
pub mod metrics;
pub mod orchestrator;
mod render;
pub mod stage;
pub mod summary;
mod sync;

pub use cancel::CancellationToken;
pub use config::{ExecutionMode, PipelineConfig, parse_full_policy};
pub use errors::{FrameError, PipelineError, Stage};
pub use frame::{Detection, Frame, Inferred, TensorBatch, Thresholds};
pub use metrics::PipelineMetrics;
pub use orchestrator::{Pipeline, PipelineState};
pub use stage::{Detector, FrameSink, FrameSource, ModelPaths, PostProcessor};
pub use summary::{BudgetMismatch, FrameBudget, RunSummary, StopReason};

pub use queue::{FullPolicy, QueuePolicy};
