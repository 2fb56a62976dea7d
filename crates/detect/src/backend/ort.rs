use super::ExecutionProvider;
use crate::preprocess::BlobPreprocessor;
use anyhow::Context;
use ndarray::ArrayD;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use pipeline::{Detector, Frame, ModelPaths, TensorBatch};
use std::path::Path;

/// YOLOv3 on ONNX Runtime. Every model output is returned, in the order the
/// model declares them.
pub struct OrtDetector {
    session: Session,
    input_name: String,
    output_names: Vec<String>,
    preprocessor: BlobPreprocessor,
}

impl OrtDetector {
    pub fn load_with_provider(
        paths: &ModelPaths,
        provider: ExecutionProvider,
    ) -> anyhow::Result<Self> {
        let path: &Path = &paths.model;
        if !path.is_file() {
            anyhow::bail!("Model file not found: {}", path.display());
        }

        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        match provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build(),
                ])?;
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .context("Model declares no inputs")?;
        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|output| output.name().to_string())
            .collect();

        tracing::info!(
            model = %path.display(),
            input = %input_name,
            outputs = ?output_names,
            "Model loaded"
        );

        Ok(Self {
            session,
            input_name,
            output_names,
            preprocessor: BlobPreprocessor::default(),
        })
    }
}

impl Detector for OrtDetector {
    fn load_model(paths: &ModelPaths) -> anyhow::Result<Self> {
        Self::load_with_provider(paths, ExecutionProvider::Cuda)
    }

    fn preprocess(&mut self, frame: &Frame) -> anyhow::Result<ArrayD<f32>> {
        self.preprocessor.blob(frame)
    }

    fn forward(&mut self, input: &ArrayD<f32>) -> anyhow::Result<TensorBatch> {
        let outputs = self.session.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(input.view())?
        ])?;

        let mut layers = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let layer = outputs[name.as_str()]
                .try_extract_array::<f32>()
                .with_context(|| format!("Output {name} is not an f32 tensor"))?;
            layers.push(layer.into_owned());
        }

        Ok(TensorBatch::new(layers))
    }
}
