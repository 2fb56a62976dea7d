use crate::errors::Stage;
use crate::frame::{Inferred, Thresholds};
use crate::metrics::PipelineMetrics;
use crate::stage::{FrameSink, PostProcessor};
use anyhow::{Context, Result};
use std::time::Instant;

/// The last stage, shared by both execution modes: decode, draw, write.
pub(crate) struct Renderer<'a, P, K> {
    pub postprocessor: &'a mut P,
    pub sink: &'a mut K,
    pub thresholds: Thresholds,
    pub metrics: &'a PipelineMetrics,
}

impl<P: PostProcessor, K: FrameSink> Renderer<'_, P, K> {
    /// Returns the number of detections drawn.
    pub fn render(&mut self, item: Inferred) -> Result<usize> {
        let Inferred { mut frame, batch } = item;
        let started = Instant::now();

        let detections = self
            .postprocessor
            .run(&batch, &mut frame, &self.thresholds)
            .context("Post-processing failed")?;
        self.sink.write(&frame).context("Failed to write frame")?;
        self.sink.display(&frame).context("Failed to display frame")?;

        self.metrics.record_stage(Stage::Render, started.elapsed());
        self.metrics.record_frame(detections.len());
        tracing::trace!(detections = detections.len(), "Frame rendered");

        Ok(detections.len())
    }
}

pub(crate) fn report_progress(
    rendered: u64,
    capture_fps: Option<f64>,
    inference_fps: Option<f64>,
    metrics: &PipelineMetrics,
) {
    if let Some(fps) = capture_fps {
        metrics.record_throughput("frames", fps);
    }
    if let Some(fps) = inference_fps {
        metrics.record_throughput("results", fps);
    }
    tracing::debug!(
        frames = rendered,
        capture_fps = ?capture_fps,
        inference_fps = ?inference_fps,
        "Pipeline progress"
    );
}
