use crate::config::ExecutionMode;
use std::fmt;
use std::time::Duration;

/// How many frames a run expects to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBudget {
    /// Run until the source ends or the run is interrupted.
    Unknown,
    /// Count announced by the source. Advisory only: the run still goes on
    /// until end of stream and a different actual count is a mismatch.
    Reported(u64),
    /// Configured cap. The run stops once this many frames are rendered.
    Limit(u64),
}

impl FrameBudget {
    /// A configured limit wins over the count the source reports.
    pub fn resolve(limit: Option<u64>, reported: Option<u64>) -> Self {
        match (limit, reported) {
            (Some(n), _) => FrameBudget::Limit(n),
            (None, Some(n)) => FrameBudget::Reported(n),
            (None, None) => FrameBudget::Unknown,
        }
    }

    pub fn expected(&self) -> Option<u64> {
        match self {
            FrameBudget::Unknown => None,
            FrameBudget::Reported(n) | FrameBudget::Limit(n) => Some(*n),
        }
    }

    /// Only a configured limit stops a run early.
    pub fn is_reached(&self, rendered: u64) -> bool {
        match self {
            FrameBudget::Limit(n) => rendered >= *n,
            FrameBudget::Unknown | FrameBudget::Reported(_) => false,
        }
    }
}

impl fmt::Display for FrameBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameBudget::Unknown => f.write_str("unknown"),
            FrameBudget::Reported(n) => write!(f, "{n} reported"),
            FrameBudget::Limit(n) => write!(f, "{n} limit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source ran out of frames and every frame was rendered.
    EndOfStream,
    /// The configured frame limit was rendered.
    BudgetReached,
    /// The external shutdown flag was raised.
    Interrupted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::EndOfStream => "end_of_stream",
            StopReason::BudgetReached => "budget_reached",
            StopReason::Interrupted => "interrupted",
        }
    }
}

/// The source ended after more or fewer frames than it announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetMismatch {
    pub expected: u64,
    pub actual: u64,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: ExecutionMode,
    /// Frames rendered and written to the sink.
    pub frames: u64,
    /// Frames pulled from the source.
    pub captured: u64,
    pub budget: FrameBudget,
    pub stop: StopReason,
    pub elapsed: Duration,
    /// Average rate of the frame queue; `None` in sync mode.
    pub capture_fps: Option<f64>,
    /// Average rate of the result queue; `None` in sync mode.
    pub inference_fps: Option<f64>,
    /// Frames discarded by a bounded drop policy.
    pub dropped_frames: u64,
}

impl RunSummary {
    pub fn budget_mismatch(&self) -> Option<BudgetMismatch> {
        if self.stop != StopReason::EndOfStream {
            return None;
        }
        self.budget
            .expected()
            .filter(|expected| *expected != self.captured)
            .map(|expected| BudgetMismatch {
                expected,
                actual: self.captured,
            })
    }

    /// Rendered frames per second over the whole run.
    pub fn average_fps(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (self.frames > 0 && secs > 0.0).then(|| self.frames as f64 / secs)
    }
}
