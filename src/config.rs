//! Runtime configuration module.
//!
//! Contains the runtime configuration for the generator, including
//! execution device selection, thread count, and path overrides.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[cfg(feature = "coreml")]
use ort::execution_providers::CoreMLExecutionProvider;
#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;
use ort::execution_providers::ExecutionProviderDispatch;

/// Execution device for ONNX inference.
///
/// Determines which hardware backend to use for model inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Automatically detect and use the best available device.
    /// Priority: Metal (macOS) > CUDA (Linux/Windows) > CPU
    #[default]
    Auto,

    /// Force CPU execution.
    /// Slowest but universally available.
    Cpu,

    /// Use CUDA for NVIDIA GPU acceleration.
    /// Requires CUDA toolkit and compatible GPU.
    Cuda,

    /// Use Metal/CoreML for Apple Silicon acceleration.
    /// Only available on macOS with Apple Silicon.
    Metal,
}

impl Device {
    /// Returns the string representation of the device.
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
            Device::Metal => "metal",
        }
    }

    /// Parses a device from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Device::Auto),
            "cpu" => Some(Device::Cpu),
            "cuda" => Some(Device::Cuda),
            "metal" | "coreml" => Some(Device::Metal),
            _ => None,
        }
    }

    /// Execution providers to register for this device, in priority order.
    ///
    /// Accelerated providers require the matching crate feature (`cuda`,
    /// `coreml`); an empty list means inference stays on ONNX Runtime's
    /// default CPU provider.
    pub fn execution_providers(&self) -> Vec<ExecutionProviderDispatch> {
        match self {
            Device::Cpu => Vec::new(),
            Device::Cuda => cuda_providers(),
            Device::Metal => coreml_providers(),
            Device::Auto => {
                let mut providers = coreml_providers();
                providers.extend(cuda_providers());
                providers
            }
        }
    }
}

fn cuda_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(feature = "cuda")]
    {
        vec![CUDAExecutionProvider::default().build()]
    }
    #[cfg(not(feature = "cuda"))]
    {
        Vec::new()
    }
}

fn coreml_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(feature = "coreml")]
    {
        vec![CoreMLExecutionProvider::default().build()]
    }
    #[cfg(not(feature = "coreml"))]
    {
        Vec::new()
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runtime configuration for the generator.
///
/// Loaded from environment variables at startup; CLI options take
/// precedence over the values here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path to the checkpoint directory.
    /// If None, uses the platform-specific default cache location.
    pub model_path: Option<PathBuf>,

    /// Execution device for inference.
    pub device: Device,

    /// Number of threads for intra-op parallelism in ONNX Runtime.
    /// If None, uses ONNX Runtime's default (typically number of CPU cores).
    pub threads: Option<u32>,
}

impl RuntimeConfig {
    /// Creates a new RuntimeConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a RuntimeConfig from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `PERFRNN_MODEL_PATH` - Path to the checkpoint directory
    /// - `PERFRNN_DEVICE` - Device selection (auto, cpu, cuda, metal)
    /// - `PERFRNN_THREADS` - Number of threads for CPU execution
    ///
    /// Falls back to defaults for unset variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("PERFRNN_MODEL_PATH") {
            config.model_path = Some(PathBuf::from(path));
        }

        if let Ok(device_str) = std::env::var("PERFRNN_DEVICE") {
            if let Some(device) = Device::parse(&device_str) {
                config.device = device;
            }
        }

        if let Ok(threads_str) = std::env::var("PERFRNN_THREADS") {
            if let Ok(threads) = threads_str.parse::<u32>() {
                if threads > 0 {
                    config.threads = Some(threads);
                }
            }
        }

        config
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if let Some(threads) = self.threads {
            if threads == 0 {
                return Some("threads must be > 0".to_string());
            }
            if threads > 256 {
                return Some(format!("threads too high: {} (max 256)", threads));
            }
        }

        None
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            device: Device::Auto,
            threads: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_parsing() {
        assert_eq!(Device::parse("auto"), Some(Device::Auto));
        assert_eq!(Device::parse("CPU"), Some(Device::Cpu));
        assert_eq!(Device::parse("cuda"), Some(Device::Cuda));
        assert_eq!(Device::parse("metal"), Some(Device::Metal));
        assert_eq!(Device::parse("coreml"), Some(Device::Metal));
        assert_eq!(Device::parse("invalid"), None);
    }

    #[test]
    fn device_display() {
        assert_eq!(Device::Auto.to_string(), "auto");
        assert_eq!(Device::Cpu.to_string(), "cpu");
    }

    #[test]
    fn execution_provider_mapping_covers_every_device() {
        for device in [Device::Auto, Device::Cpu, Device::Cuda, Device::Metal] {
            let providers = device.execution_providers();
            // Without accelerated features every device resolves to the
            // default CPU provider
            if !cfg!(any(feature = "cuda", feature = "coreml")) {
                assert!(providers.is_empty(), "{} registered providers", device);
            }
        }
        // CPU never registers an accelerated provider
        assert!(Device::Cpu.execution_providers().is_empty());
    }

    #[test]
    fn config_validation() {
        let mut config = RuntimeConfig::new();
        assert!(config.validate().is_none());

        config.threads = Some(0);
        assert!(config.validate().is_some());

        config.threads = Some(4);
        assert!(config.validate().is_none());
    }
}
