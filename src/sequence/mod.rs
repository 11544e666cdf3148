//! Event vocabulary and control conditioning.
//!
//! - [`event`]: the performance event vocabulary and its index mapping
//! - [`control`]: Control, compressed control sequences, processed data files
//! - [`resolver`]: turning the `--control` argument into usable conditioning

pub mod control;
pub mod event;
pub mod resolver;

// Re-export commonly used items
pub use control::{
    CompressedControl, Control, ProcessedData, CONTROL_DIM, NOTE_DENSITY_BINS, PITCH_CLASSES,
};
pub use event::{Event, EVENT_DIM};
pub use resolver::{resolve_control, ControlSource, ResolvedControl, DATA_EXTENSION};
