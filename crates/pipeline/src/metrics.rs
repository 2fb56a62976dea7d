use crate::errors::Stage;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Gauge, Histogram},
};
use std::time::Duration;

/// Instruments recorded by both execution modes. They are no-ops until a
/// meter provider is installed.
#[derive(Clone)]
pub struct PipelineMetrics {
    frames: Counter<u64>,
    detections: Counter<u64>,
    stage_duration: Histogram<f64>,
    throughput: Gauge<f64>,
}

impl PipelineMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.001, 0.002, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0,
        ];
        let stage_duration: Histogram<f64> = meter
            .f64_histogram("pipeline_stage_duration_seconds")
            .with_description("Time spent in one stage for a single frame")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build();
        let frames: Counter<u64> = meter
            .u64_counter("pipeline_frames_total")
            .with_description("Total frames rendered")
            .build();
        let detections: Counter<u64> = meter
            .u64_counter("pipeline_detections_total")
            .with_description("Total detections drawn")
            .build();
        let throughput: Gauge<f64> = meter
            .f64_gauge("pipeline_throughput_fps")
            .with_description("Average items per second through a stage queue")
            .build();

        Self {
            frames,
            detections,
            stage_duration,
            throughput,
        }
    }

    pub fn record_frame(&self, detections: usize) {
        self.frames.add(1, &[]);
        self.detections.add(detections as u64, &[]);
    }

    pub fn record_stage(&self, stage: Stage, elapsed: Duration) {
        self.stage_duration.record(
            elapsed.as_secs_f64(),
            &[KeyValue::new("stage", stage.as_str())],
        );
    }

    pub fn record_throughput(&self, queue: &'static str, fps: f64) {
        self.throughput.record(fps, &[KeyValue::new("queue", queue)]);
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new("pipeline")
    }
}
