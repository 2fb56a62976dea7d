use crate::config::{DetectConfig, Input};
use crate::font::LabelFont;
use crate::labels::Labels;
use crate::postprocess::YoloPostProcessor;
use crate::sink::{FrameDirectorySink, ImageFileSink};
use crate::source::{FrameDirectorySource, StillImageSource};
use anyhow::Context;
use pipeline::{Detector, FrameSink, FrameSource, Pipeline, RunSummary};
use std::path::Path;
use std::sync::atomic::AtomicBool;

pub fn open_source(input: &Input) -> anyhow::Result<Box<dyn FrameSource>> {
    Ok(match input {
        Input::Image(path) => Box::new(
            StillImageSource::open(path)
                .with_context(|| format!("Unable to load image at {}", path.display()))?,
        ),
        Input::FrameDirectory(dir) => Box::new(
            FrameDirectorySource::open(dir)
                .with_context(|| format!("Unable to open frames at {}", dir.display()))?,
        ),
    })
}

pub fn open_sink(input: &Input, output: &Path) -> anyhow::Result<Box<dyn FrameSink>> {
    Ok(match input {
        Input::Image(_) => Box::new(ImageFileSink::new(output)),
        Input::FrameDirectory(_) => Box::new(FrameDirectorySink::create(output)?),
    })
}

/// Open the input and output, then run the whole pipeline with `detector`.
/// Everything that can fail up front fails before any thread is started.
pub fn run<D: Detector>(
    config: &DetectConfig,
    detector: D,
    labels: Labels,
    shutdown: &AtomicBool,
) -> anyhow::Result<RunSummary> {
    let font = LabelFont::load(config.font.as_deref())?;
    let source = open_source(&config.input)?;
    let sink = open_sink(&config.input, &config.output)?;

    let mut pipeline = Pipeline::new(
        source,
        detector,
        YoloPostProcessor::new(labels, font),
        sink,
        config.pipeline.clone(),
    );
    let summary = pipeline.run(shutdown)?;

    tracing::info!(
        output = %config.output.display(),
        frames = summary.frames,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        "Done processing"
    );
    Ok(summary)
}
