#[cfg(feature = "ort-backend")]
pub mod ort;

/// Where the network runs. CUDA falls back to the CPU when the provider
/// cannot be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
}
