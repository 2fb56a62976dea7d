use crate::cancel::CancellationToken;
use crate::config::{ExecutionMode, PipelineConfig};
use crate::errors::{PipelineError, Stage};
use crate::frame::{Frame, Inferred};
use crate::metrics::PipelineMetrics;
use crate::render::{Renderer, report_progress};
use crate::stage::{Detector, FrameSink, FrameSource, PostProcessor};
use crate::summary::{FrameBudget, RunSummary, StopReason};
use anyhow::Context;
use queue::{RateTrackedQueue, RecvError, RecvTimeoutError, SendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ScopedJoinHandle};
use std::time::Instant;

/// Lifecycle of a [`Pipeline`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Stopped,
}

pub(crate) fn transition(state: &mut PipelineState, next: PipelineState) {
    tracing::debug!(from = ?state, to = ?next, "Pipeline state transition");
    *state = next;
}

/// Wires a source, a detector, a post-processor and a sink into one run.
///
/// In [`ExecutionMode::Async`] capture and inference get their own threads
/// and hand frames over through two [`RateTrackedQueue`]s while the calling
/// thread renders. In [`ExecutionMode::Sync`] every stage runs in turn on
/// the calling thread. A pipeline runs once.
pub struct Pipeline<S, D, P, K> {
    pub(crate) source: S,
    pub(crate) detector: D,
    pub(crate) postprocessor: P,
    pub(crate) sink: K,
    pub(crate) config: PipelineConfig,
    pub(crate) state: PipelineState,
    pub(crate) metrics: PipelineMetrics,
}

impl<S, D, P, K> Pipeline<S, D, P, K>
where
    S: FrameSource,
    D: Detector,
    P: PostProcessor,
    K: FrameSink,
{
    pub fn new(source: S, detector: D, postprocessor: P, sink: K, config: PipelineConfig) -> Self {
        Self {
            source,
            detector,
            postprocessor,
            sink,
            config,
            state: PipelineState::Idle,
            metrics: PipelineMetrics::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_parts(self) -> (S, D, P, K) {
        (self.source, self.detector, self.postprocessor, self.sink)
    }

    /// Frames this run expects: the configured limit, else the source's
    /// reported count. Only the limit cuts a run short.
    pub fn budget(&self) -> FrameBudget {
        FrameBudget::resolve(self.config.frame_limit, self.source.reported_frame_count())
    }

    /// Run until end of stream, the frame budget, a stage failure, or until
    /// `shutdown` is raised.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<RunSummary, PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::AlreadyStopped);
        }

        let budget = self.budget();
        tracing::info!(
            mode = %self.config.mode,
            budget = %budget,
            confidence = self.config.thresholds.confidence,
            nms = self.config.thresholds.nms,
            "Pipeline starting"
        );

        let result = match self.config.mode {
            ExecutionMode::Async => self.run_async(budget, shutdown),
            ExecutionMode::Sync => self.run_sync(budget, shutdown),
        };
        transition(&mut self.state, PipelineState::Stopped);

        match &result {
            Ok(summary) => log_summary(summary),
            Err(e) => tracing::error!(error = %e, stage = ?e.stage(), "Pipeline failed"),
        }
        result
    }

    fn run_async(
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

        let frames: RateTrackedQueue<Frame> = RateTrackedQueue::with_policy(config.frame_queue);
        let results: RateTrackedQueue<Inferred> =
            RateTrackedQueue::with_policy(config.result_queue);
        let token = CancellationToken::new();
        let captured = AtomicU64::new(0);
        let (frames, results, token, captured) = (&frames, &results, &token, &captured);
        let drain = Drain {
            frames,
            results,
            token,
        };

        thread::scope(|scope| {
            let capture = thread::Builder::new()
                .name("capture".into())
                .spawn_scoped(scope, move || {
                    capture_stage(source, frames, token, captured, budget, metrics)
                })
                .map_err(|source| PipelineError::Spawn {
                    stage: Stage::Capture,
                    source,
                })?;

            let inference = match thread::Builder::new()
                .name("inference".into())
                .spawn_scoped(scope, move || {
                    inference_stage(detector, frames, results, token, metrics)
                }) {
                Ok(handle) => handle,
                Err(source) => {
                    drain.run();
                    let _ = join_stage(Stage::Capture, capture);
                    return Err(PipelineError::Spawn {
                        stage: Stage::Inference,
                        source,
                    });
                }
            };
            transition(state, PipelineState::Running);

            let mut renderer = Renderer {
                postprocessor,
                sink,
                thresholds: config.thresholds,
                metrics,
            };
            let mut rendered = 0u64;

            // Unblocks the stage threads if rendering unwinds.
            let outcome = {
                let _guard = DrainOnDrop(&drain);
                loop {
                    if shutdown.load(Ordering::Relaxed) {
                        tracing::info!("Shutdown requested");
                        break Ok(StopReason::Interrupted);
                    }
                    if budget.is_reached(rendered) {
                        break Ok(StopReason::BudgetReached);
                    }

                    let item = match results.recv_timeout(config.poll_interval) {
                        Ok(item) => item,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Closed) => break Ok(StopReason::EndOfStream),
                    };
                    if let Err(error) = renderer.render(item) {
                        break Err(error);
                    }
                    rendered += 1;

                    if rendered.is_multiple_of(config.report_interval) {
                        report_progress(rendered, frames.rate(), results.rate(), metrics);
                    }
                }
            };

            transition(state, PipelineState::Draining);
            drain.run();
            let capture_result = join_stage(Stage::Capture, capture);
            let inference_result = join_stage(Stage::Inference, inference);

            let stop = outcome.map_err(|error| PipelineError::StageFailed {
                stage: Stage::Render,
                error,
            })?;
            capture_result?;
            inference_result?;

            Ok(RunSummary {
                mode: ExecutionMode::Async,
                frames: rendered,
                captured: captured.load(Ordering::Relaxed),
                budget,
                stop,
                elapsed: started.elapsed(),
                capture_fps: frames.rate(),
                inference_fps: results.rate(),
                dropped_frames: frames.dropped() + results.dropped(),
            })
        })
    }
}

/// Tear-down shared by the normal exit and the unwinding one.
struct Drain<'a> {
    frames: &'a RateTrackedQueue<Frame>,
    results: &'a RateTrackedQueue<Inferred>,
    token: &'a CancellationToken,
}

impl Drain<'_> {
    fn run(&self) {
        self.token.cancel();
        self.frames.close();
        self.frames.clear();
        self.results.close();
        self.results.clear();
    }
}

struct DrainOnDrop<'a, 'b>(&'a Drain<'b>);

impl Drop for DrainOnDrop<'_, '_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.run();
        }
    }
}

/// Closes a stage's output queue however the stage exits, so the consumer
/// sees end of stream instead of waiting forever.
struct CloseOnDrop<'a, T> {
    queue: &'a RateTrackedQueue<T>,
    token: &'a CancellationToken,
}

impl<T> Drop for CloseOnDrop<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.token.cancel();
        }
        self.queue.close();
    }
}

fn capture_stage<S: FrameSource>(
    source: &mut S,
    frames: &RateTrackedQueue<Frame>,
    token: &CancellationToken,
    captured: &AtomicU64,
    budget: FrameBudget,
    metrics: &PipelineMetrics,
) -> anyhow::Result<()> {
    let _close = CloseOnDrop {
        queue: frames,
        token,
    };
    let result = capture_loop(source, frames, token, captured, budget, metrics);
    if result.is_err() {
        token.cancel();
    }
    result
}

fn capture_loop<S: FrameSource>(
    source: &mut S,
    frames: &RateTrackedQueue<Frame>,
    token: &CancellationToken,
    captured: &AtomicU64,
    budget: FrameBudget,
    metrics: &PipelineMetrics,
) -> anyhow::Result<()> {
    while !token.is_cancelled() {
        if budget.is_reached(captured.load(Ordering::Relaxed)) {
            tracing::debug!("Capture reached the frame limit");
            break;
        }

        let started = Instant::now();
        let Some(frame) = source.next_frame().context("Failed to read frame")? else {
            tracing::debug!("Source reached end of stream");
            break;
        };
        metrics.record_stage(Stage::Capture, started.elapsed());
        let index = captured.fetch_add(1, Ordering::Relaxed);

        match frames.send(frame) {
            Ok(()) => tracing::trace!(frame = index, "Frame captured"),
            Err(SendError::Full(_)) => tracing::trace!(frame = index, "Frame queue full, dropping frame"),
            Err(SendError::Closed(_)) => break,
        }
    }
    Ok(())
}

fn inference_stage<D: Detector>(
    detector: &mut D,
    frames: &RateTrackedQueue<Frame>,
    results: &RateTrackedQueue<Inferred>,
    token: &CancellationToken,
    metrics: &PipelineMetrics,
) -> anyhow::Result<()> {
    let _close = CloseOnDrop {
        queue: results,
        token,
    };
    let result = inference_loop(detector, frames, results, token, metrics);
    if result.is_err() {
        token.cancel();
    }
    result
}

fn inference_loop<D: Detector>(
    detector: &mut D,
    frames: &RateTrackedQueue<Frame>,
    results: &RateTrackedQueue<Inferred>,
    token: &CancellationToken,
    metrics: &PipelineMetrics,
) -> anyhow::Result<()> {
    let mut processed = 0u64;
    while !token.is_cancelled() {
        let frame = match frames.recv() {
            Ok(frame) => frame,
            Err(RecvError::Closed) => break,
        };

        let started = Instant::now();
        let batch = detector
            .detect(&frame)
            .with_context(|| format!("Inference failed on frame {processed}"))?;
        metrics.record_stage(Stage::Inference, started.elapsed());
        processed += 1;

        match results.send(Inferred { frame, batch }) {
            Ok(()) => {}
            Err(SendError::Full(_)) => tracing::trace!("Result queue full, dropping frame"),
            Err(SendError::Closed(_)) => break,
        }
    }
    tracing::debug!(frames = processed, "Inference stage finished");
    Ok(())
}

fn join_stage(
    stage: Stage,
    handle: ScopedJoinHandle<'_, anyhow::Result<()>>,
) -> Result<(), PipelineError> {
    match handle.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(PipelineError::StageFailed { stage, error }),
        Err(_) => Err(PipelineError::StagePanicked(stage)),
    }
}

fn log_summary(summary: &RunSummary) {
    tracing::info!(
        mode = %summary.mode,
        frames = summary.frames,
        captured = summary.captured,
        stop = summary.stop.as_str(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        average_fps = ?summary.average_fps(),
        capture_fps = ?summary.capture_fps,
        inference_fps = ?summary.inference_fps,
        dropped_frames = summary.dropped_frames,
        "Pipeline finished"
    );
    if let Some(mismatch) = summary.budget_mismatch() {
        tracing::warn!(
            expected = mismatch.expected,
            actual = mismatch.actual,
            "Source frame count differs from the expected count"
        );
    }
}
