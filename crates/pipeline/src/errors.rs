use std::fmt;
use thiserror::Error;

/// The three threads of an async run. Sync mode reports failures with the
/// same labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Inference,
    Render,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Capture => "capture",
            Stage::Inference => "inference",
            Stage::Render => "render",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage} stage failed: {error:#}")]
    StageFailed { stage: Stage, error: anyhow::Error },

    #[error("{0} stage panicked")]
    StagePanicked(Stage),

    #[error("Failed to spawn {stage} thread: {source}")]
    Spawn {
        stage: Stage,
        #[source]
        source: std::io::Error,
    },

    #[error("Pipeline has already run")]
    AlreadyStopped,
}

impl PipelineError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::StageFailed { stage, .. }
            | PipelineError::Spawn { stage, .. }
            | PipelineError::StagePanicked(stage) => Some(*stage),
            PipelineError::AlreadyStopped => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}
