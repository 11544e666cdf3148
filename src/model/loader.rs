//! Checkpoint loader.
//!
//! Handles loading the exported ONNX sessions and configuration that make
//! up one Performance RNN checkpoint.

use std::path::Path;

use ort::session::Session;

use crate::config::{Device, RuntimeConfig};
use crate::error::{GenError, Result};
use crate::model::config::ModelConfig;
use crate::model::decoder::PerformanceDecoder;
use crate::model::quantize::Quantizer;

/// Required checkpoint files.
pub const REQUIRED_MODEL_FILES: &[&str] = &["config.json", "init.onnx", "step.onnx"];

/// Checks if all required checkpoint files exist in the directory.
///
/// Returns Ok(()) if all files exist, or an error listing missing files.
pub fn check_models(model_dir: &Path) -> Result<()> {
    let mut missing = Vec::new();

    for file in REQUIRED_MODEL_FILES {
        let path = model_dir.join(file);
        if !path.exists() {
            missing.push(*file);
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(GenError::model_not_found(format!(
            "Missing checkpoint files in {}: {}",
            model_dir.display(),
            missing.join(", ")
        )))
    }
}

/// Builds one ONNX session, honoring the configured execution device and
/// intra-op thread count.
fn build_session(path: &Path, runtime: &RuntimeConfig) -> Result<Session> {
    let mut builder = Session::builder()
        .map_err(|e| GenError::model_load_failed(format!("failed to create session: {}", e)))?;

    let providers = runtime.device.execution_providers();
    if !providers.is_empty() {
        builder = builder.with_execution_providers(providers).map_err(|e| {
            GenError::model_load_failed(format!("failed to set execution providers: {}", e))
        })?;
    }

    if let Some(threads) = runtime.threads {
        builder = builder.with_intra_threads(threads as usize).map_err(|e| {
            GenError::model_load_failed(format!("failed to set thread count: {}", e))
        })?;
    }

    builder.commit_from_file(path).map_err(|e| {
        GenError::model_load_failed(format!("failed to load {}: {}", path.display(), e))
    })
}

/// Loads a decoder from a checkpoint directory.
///
/// The directory must contain:
/// - `config.json` - shape metadata for the exported graphs
/// - `init.onnx` - initial hidden-state projection
/// - `step.onnx` - one recurrent decode step
///
/// A quantizer, when given, fake-quantizes the hidden state and logits
/// between steps.
pub fn load_decoder(
    model_dir: &Path,
    runtime: &RuntimeConfig,
    quantizer: Option<Quantizer>,
) -> Result<PerformanceDecoder> {
    check_models(model_dir)?;

    if !matches!(runtime.device, Device::Auto | Device::Cpu)
        && runtime.device.execution_providers().is_empty()
    {
        eprintln!(
            "Warning: {} support is not compiled in, falling back to CPU.",
            runtime.device
        );
    }

    let config = ModelConfig::load(model_dir)?;

    eprintln!("Loading init projection...");
    let init_session = build_session(&model_dir.join("init.onnx"), runtime)?;

    eprintln!("Loading step graph...");
    let step_session = build_session(&model_dir.join("step.onnx"), runtime)?;

    eprintln!("Checkpoint loaded successfully.");

    Ok(PerformanceDecoder::new(
        init_session,
        step_session,
        config,
        quantizer,
    ))
}
