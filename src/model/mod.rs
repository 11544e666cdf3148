//! Checkpoint loading and decoding.
//!
//! This module contains the ONNX-backed model components:
//! - [`ModelConfig`](config::ModelConfig): checkpoint shape metadata
//! - [`PerformanceDecoder`](decoder::PerformanceDecoder): autoregressive decode loop
//! - [`beam_search`](beam::beam_search): beam search over the step graph
//! - [`Logits`](logits::Logits): logits processing and sampling
//! - [`Quantizer`](quantize::Quantizer): post-training quantization pass

pub mod beam;
pub mod config;
pub mod decoder;
pub mod loader;
pub mod logits;
pub mod quantize;

// Re-export commonly used types
pub use beam::beam_search;
pub use config::ModelConfig;
pub use decoder::PerformanceDecoder;
pub use loader::{check_models, load_decoder, REQUIRED_MODEL_FILES};
pub use logits::Logits;
pub use quantize::{QuantStats, Quantizer, TensorStats};
