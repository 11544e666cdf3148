//! perfrnn: Performance RNN symbolic music generation using ONNX Runtime.
//!
//! This library drives a trained Performance-RNN-style checkpoint through
//! autoregressive sampling or beam search, optionally steered by a
//! pitch-histogram/note-density control or a seed MIDI file, and writes
//! the generated event sequences as MIDI files.
//!
//! # Modules
//!
//! - [`sequence`]: event vocabulary and control conditioning
//! - [`model`]: checkpoint loading, decode loops, quantization pass
//! - [`midi`]: MIDI file input and output
//! - [`generation`]: the single-pass generation pipeline
//! - [`config`]: runtime configuration (device, threads, paths)
//! - [`error`]: error codes and types
//!
//! # Example
//!
//! ```rust,ignore
//! use perfrnn::sequence::resolve_control;
//!
//! let mut rng = rand::thread_rng();
//! // "2,0,1,1,0,1,0,1,1,0,0,1;4" -> C-major-ish histogram, density bucket 4
//! let (source, max_len) =
//!     resolve_control(Some("2,0,1,1,0,1,0,1,1,0,0,1;4"), 1000, &mut rng)?;
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod midi;
pub mod model;
pub mod sequence;

// Re-export commonly used types at crate root for convenience
pub use config::{Device, RuntimeConfig};
pub use error::{ErrorCode, GenError, Result};
pub use sequence::{Control, ControlSource, ResolvedControl};
