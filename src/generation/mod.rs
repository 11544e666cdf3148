//! Generation pipeline module.
//!
//! Provides the single-pass generation run: control resolution, model
//! loading, decode dispatch, and MIDI output.

pub mod pipeline;

// Re-export commonly used items
pub use pipeline::{run_generation, write_outputs};
