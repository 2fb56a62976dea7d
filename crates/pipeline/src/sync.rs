use crate::config::ExecutionMode;
use crate::errors::{PipelineError, Stage};
use crate::frame::Inferred;
use crate::orchestrator::{Pipeline, PipelineState, transition};
use crate::render::{Renderer, report_progress};
use crate::stage::{Detector, FrameSink, FrameSource, PostProcessor};
use crate::summary::{FrameBudget, RunSummary, StopReason};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

impl<S, D, P, K> Pipeline<S, D, P, K>
where
    S: FrameSource,
    D: Detector,
    P: PostProcessor,
    K: FrameSink,
{
    /// Capture, infer and render one frame at a time on the calling thread.
    pub(crate) fn run_sync(
        &mut self,
        budget: FrameBudget,
        shutdown: &AtomicBool,
    ) -> Result<RunSummary, PipelineError> {
        let Self {
            source,
            detector,
            postprocessor,
            sink,
            config,
            state,
            metrics,
        } = self;
        let metrics = &*metrics;
        let started = Instant::now();

        let mut renderer = Renderer {
            postprocessor,
            sink,
            thresholds: config.thresholds,
            metrics,
        };
        let mut rendered = 0u64;
        transition(state, PipelineState::Running);

        let stop = loop {
            if shutdown.load(Ordering::Relaxed) {
                tracing::info!("Shutdown requested");
                break StopReason::Interrupted;
            }
            if budget.is_reached(rendered) {
                break StopReason::BudgetReached;
            }

            let capture_started = Instant::now();
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StopReason::EndOfStream,
                Err(error) => {
                    transition(state, PipelineState::Draining);
                    return Err(PipelineError::StageFailed {
                        stage: Stage::Capture,
                        error: error.context("Failed to read frame"),
                    });
                }
            };
            metrics.record_stage(Stage::Capture, capture_started.elapsed());

            let inference_started = Instant::now();
            let batch = match detector.detect(&frame) {
                Ok(batch) => batch,
                Err(error) => {
                    transition(state, PipelineState::Draining);
                    return Err(PipelineError::StageFailed {
                        stage: Stage::Inference,
                        error: error.context(format!("Inference failed on frame {rendered}")),
                    });
                }
            };
            metrics.record_stage(Stage::Inference, inference_started.elapsed());

            if let Err(error) = renderer.render(Inferred { frame, batch }) {
                transition(state, PipelineState::Draining);
                return Err(PipelineError::StageFailed {
                    stage: Stage::Render,
                    error,
                });
            }
            rendered += 1;

            if rendered.is_multiple_of(config.report_interval) {
                report_progress(rendered, None, None, metrics);
            }
        };
        transition(state, PipelineState::Draining);

        Ok(RunSummary {
            mode: ExecutionMode::Sync,
            frames: rendered,
            // Every captured frame is rendered before the next is read.
            captured: rendered,
            budget,
            stop,
            elapsed: started.elapsed(),
            capture_fps: None,
            inference_fps: None,
            dropped_frames: 0,
        })
    }
}
