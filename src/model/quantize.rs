//! Post-training quantization pass.
//!
//! Reads per-tensor activation ranges from a stats file and fake-quantizes
//! the host-visible tensors to the int8 grid between decode steps: values
//! are clamped to the recorded range, snapped to one of 256 levels, and
//! dequantized back to f32. This reproduces reduced-precision inference
//! without touching the exported graphs.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ErrorCode, GenError, Result};

/// Stats name of the recurrent hidden state.
pub const HIDDEN_TENSOR: &str = "hidden";
/// Stats name of the output logits.
pub const LOGITS_TENSOR: &str = "logits";

/// Number of quantization levels (int8 grid).
const LEVELS: f32 = 255.0;

/// Recorded activation range of one tensor.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TensorStats {
    /// Smallest observed activation.
    pub min: f32,
    /// Largest observed activation.
    pub max: f32,
}

/// Contents of a quantization stats file.
#[derive(Debug, Clone, Deserialize)]
pub struct QuantStats {
    /// Activation ranges keyed by tensor name.
    pub tensors: HashMap<String, TensorStats>,
}

/// Applies the quantization pass to named tensors.
#[derive(Debug, Clone)]
pub struct Quantizer {
    stats: QuantStats,
}

impl Quantizer {
    /// Loads a quantizer from a JSON stats file.
    pub fn from_stats_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GenError::with_source(
                ErrorCode::ModelLoadFailed,
                format!("failed to read stats file {}", path.display()),
                e,
            )
        })?;
        let stats: QuantStats = serde_json::from_str(&content).map_err(|e| {
            GenError::with_source(
                ErrorCode::ModelLoadFailed,
                format!("failed to parse stats file {}", path.display()),
                e,
            )
        })?;

        for (name, tensor) in &stats.tensors {
            if !tensor.min.is_finite() || !tensor.max.is_finite() || tensor.max < tensor.min {
                return Err(GenError::model_load_failed(format!(
                    "invalid activation range for \"{}\": [{}, {}]",
                    name, tensor.min, tensor.max
                )));
            }
        }

        Ok(Self { stats })
    }

    /// Creates a quantizer directly from parsed stats.
    pub fn new(stats: QuantStats) -> Self {
        Self { stats }
    }

    /// Returns true when stats exist for the named tensor.
    pub fn covers(&self, name: &str) -> bool {
        self.stats.tensors.contains_key(name)
    }

    /// Fake-quantizes the named tensor in place.
    ///
    /// Tensors without recorded stats are left untouched.
    pub fn apply(&self, name: &str, data: &mut [f32]) {
        let Some(tensor) = self.stats.tensors.get(name) else {
            return;
        };
        fake_quantize(data, tensor.min, tensor.max);
    }
}

/// Snaps every value onto the 256-level grid spanning `[min, max]`.
fn fake_quantize(data: &mut [f32], min: f32, max: f32) {
    let scale = (max - min) / LEVELS;
    if scale <= 0.0 {
        for x in data.iter_mut() {
            *x = min;
        }
        return;
    }
    for x in data.iter_mut() {
        let q = ((x.clamp(min, max) - min) / scale).round();
        *x = min + q * scale;
    }
}
