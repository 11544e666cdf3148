//! Checkpoint configuration.
//!
//! Shape and dimension metadata needed to drive the exported ONNX graphs.
//! Loaded from the checkpoint directory's `config.json`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, GenError, Result};
use crate::sequence::{CONTROL_DIM, EVENT_DIM};

/// Configuration parameters for a Performance RNN checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Event vocabulary size. Must match the crate's vocabulary.
    pub event_dim: u32,

    /// Control vector dimension. Must match histogram + density bins.
    pub control_dim: u32,

    /// Dimension of the initial hidden-state projection input.
    pub init_dim: u32,

    /// Hidden state size per recurrent layer.
    pub hidden_dim: u32,

    /// Number of stacked recurrent layers.
    pub gru_layers: u32,

    /// Event index fed as the first decoder input.
    #[serde(default = "default_primary_event")]
    pub primary_event: u32,
}

fn default_primary_event() -> u32 {
    (EVENT_DIM - 1) as u32
}

impl ModelConfig {
    /// The standard Performance RNN architecture.
    pub fn performance_default() -> Self {
        Self {
            event_dim: EVENT_DIM as u32,
            control_dim: CONTROL_DIM as u32,
            init_dim: 32,
            hidden_dim: 512,
            gru_layers: 3,
            primary_event: default_primary_event(),
        }
    }

    /// Loads a config.json from the checkpoint directory.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let path = model_dir.join("config.json");
        let content = std::fs::read_to_string(&path).map_err(|e| {
            GenError::with_source(
                ErrorCode::ModelLoadFailed,
                format!("failed to read {}", path.display()),
                e,
            )
        })?;
        let config: ModelConfig = serde_json::from_str(&content).map_err(|e| {
            GenError::with_source(
                ErrorCode::ModelLoadFailed,
                format!("failed to parse {}", path.display()),
                e,
            )
        })?;

        if let Some(problem) = config.validate() {
            return Err(GenError::model_load_failed(format!(
                "invalid config.json: {}",
                problem
            )));
        }
        Ok(config)
    }

    /// Validates the configuration for consistency.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if self.event_dim as usize != EVENT_DIM {
            return Some(format!(
                "event_dim must be {}, got {}",
                EVENT_DIM, self.event_dim
            ));
        }

        if self.control_dim as usize != CONTROL_DIM {
            return Some(format!(
                "control_dim must be {}, got {}",
                CONTROL_DIM, self.control_dim
            ));
        }

        if self.init_dim == 0 {
            return Some("init_dim must be > 0".to_string());
        }

        if self.hidden_dim == 0 {
            return Some("hidden_dim must be > 0".to_string());
        }

        if self.gru_layers == 0 {
            return Some("gru_layers must be > 0".to_string());
        }

        if self.primary_event >= self.event_dim {
            return Some(format!(
                "primary_event ({}) must be < event_dim ({})",
                self.primary_event, self.event_dim
            ));
        }

        None
    }

    /// Total element count of one hidden state for a given batch size.
    pub fn hidden_len(&self, batch: usize) -> usize {
        self.gru_layers as usize * batch * self.hidden_dim as usize
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::performance_default()
    }
}
