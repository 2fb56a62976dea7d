use anyhow::Context;
use clap::Parser;
use detect::{Cli, DetectConfig, Labels, TelemetryGuard, logging::setup_logging};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

#[cfg(feature = "ort-backend")]
use detect::backend::ort::OrtDetector;

#[cfg(not(feature = "ort-backend"))]
compile_error!("The 'ort-backend' feature is required to build the detect binary");

fn main() -> anyhow::Result<()> {
    let config = DetectConfig::load(Cli::parse())?;

    // The OTLP exporters need a Tokio runtime; it is declared first so it
    // outlives the guard that flushes them.
    let (_runtime, telemetry) = if let Some(endpoint) = config.otel_endpoint.as_deref() {
        let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
        let guard = rt.block_on(async { TelemetryGuard::init("detect", endpoint) })?;
        (Some(rt), Some(guard))
    } else {
        (None, None)
    };

    setup_logging(config.environment, telemetry.is_some())?;
    tracing::info!(config = ?config, "Loaded configuration");

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;
    tracing::info!("Signal handlers registered (SIGTERM, SIGINT)");

    let labels = Labels::load(&config.model.labels, config.color_seed)?;
    tracing::info!(classes = labels.class_count(), "Loading model");
    let detector = OrtDetector::load_with_provider(&config.model, config.provider)
        .context("Failed to load model - check the --yolo directory")?;

    if let Err(e) = detect::app::run(&config, detector, labels, &shutdown) {
        tracing::error!("Detection failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}
