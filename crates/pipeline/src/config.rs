use crate::frame::Thresholds;
use queue::{FullPolicy, QueuePolicy};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Capture, inference and render on three threads joined by queues.
    #[default]
    Async,
    /// Every stage in turn on the calling thread.
    Sync,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Async => "async",
            ExecutionMode::Sync => "sync",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "async" => Ok(ExecutionMode::Async),
            "sync" => Ok(ExecutionMode::Sync),
            other => Err(format!("unknown pipeline mode: {other}")),
        }
    }
}

pub fn parse_full_policy(s: &str) -> Result<FullPolicy, String> {
    match s.to_lowercase().as_str() {
        "block" => Ok(FullPolicy::Block),
        "drop-newest" => Ok(FullPolicy::DropNewest),
        "drop-oldest" => Ok(FullPolicy::DropOldest),
        other => Err(format!("unknown queue full policy: {other}")),
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: ExecutionMode,
    pub thresholds: Thresholds,
    pub frame_queue: QueuePolicy,
    pub result_queue: QueuePolicy,
    /// How long the render loop waits for a result before re-checking the
    /// shutdown flag.
    pub poll_interval: Duration,
    /// Overrides the source's reported frame count.
    pub frame_limit: Option<u64>,
    /// Frames between progress logs.
    pub report_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let queue = QueuePolicy::bounded(16, FullPolicy::Block);
        Self {
            mode: ExecutionMode::Async,
            thresholds: Thresholds::default(),
            frame_queue: queue,
            result_queue: queue,
            poll_interval: Duration::from_millis(10),
            frame_limit: None,
            report_interval: 30,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable lookup.
    /// Unparseable values fall back to their default.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let mode = lookup("PIPELINE_MODE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.mode);

        let confidence = lookup("CONFIDENCE_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.thresholds.confidence);

        let nms = lookup("NMS_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.thresholds.nms);

        let capacity = lookup("QUEUE_CAPACITY")
            .and_then(|s| s.parse().ok())
            .unwrap_or(16);

        let on_full = lookup("QUEUE_FULL_POLICY")
            .and_then(|s| parse_full_policy(&s).ok())
            .unwrap_or(FullPolicy::Block);

        let poll_interval = lookup("POLL_INTERVAL_MS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        let frame_limit = lookup("FRAME_LIMIT").and_then(|s| s.parse().ok());

        let report_interval = lookup("REPORT_INTERVAL")
            .and_then(|s| s.parse().ok())
            .filter(|n: &u64| *n > 0)
            .unwrap_or(defaults.report_interval);

        let queue = QueuePolicy::bounded(capacity, on_full);

        Self {
            mode,
            thresholds: Thresholds { confidence, nms },
            frame_queue: queue,
            result_queue: queue,
            poll_interval,
            frame_limit,
            report_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> PipelineConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = from_map(&[]);
        assert_eq!(config.mode, ExecutionMode::Async);
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.frame_queue, QueuePolicy::bounded(16, FullPolicy::Block));
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.frame_limit, None);
        assert_eq!(config.report_interval, 30);
    }

    #[test]
    fn test_reads_overrides() {
        let config = from_map(&[
            ("PIPELINE_MODE", "SYNC"),
            ("CONFIDENCE_THRESHOLD", "0.7"),
            ("NMS_THRESHOLD", "0.45"),
            ("QUEUE_CAPACITY", "4"),
            ("QUEUE_FULL_POLICY", "drop-oldest"),
            ("POLL_INTERVAL_MS", "25"),
            ("FRAME_LIMIT", "100"),
            ("REPORT_INTERVAL", "5"),
        ]);
        assert_eq!(config.mode, ExecutionMode::Sync);
        assert_eq!(config.thresholds.confidence, 0.7);
        assert_eq!(config.thresholds.nms, 0.45);
        assert_eq!(
            config.result_queue,
            QueuePolicy::bounded(4, FullPolicy::DropOldest)
        );
        assert_eq!(config.poll_interval, Duration::from_millis(25));
        assert_eq!(config.frame_limit, Some(100));
        assert_eq!(config.report_interval, 5);
    }

    #[test]
    fn test_zero_capacity_is_unbounded_and_garbage_falls_back() {
        let config = from_map(&[
            ("QUEUE_CAPACITY", "0"),
            ("PIPELINE_MODE", "parallel"),
            ("REPORT_INTERVAL", "0"),
            ("CONFIDENCE_THRESHOLD", "high"),
        ]);
        assert_eq!(config.frame_queue, QueuePolicy::Unbounded);
        assert_eq!(config.mode, ExecutionMode::Async);
        assert_eq!(config.report_interval, 30);
        assert_eq!(config.thresholds.confidence, 0.5);
    }

    #[test]
    fn test_parse_full_policy() {
        assert_eq!(parse_full_policy("Block"), Ok(FullPolicy::Block));
        assert_eq!(parse_full_policy("drop-newest"), Ok(FullPolicy::DropNewest));
        assert!(parse_full_policy("spill").is_err());
    }
}
