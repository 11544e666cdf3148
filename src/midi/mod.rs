//! MIDI input and output.
//!
//! Provides MIDI file writing for generated sequences and seed MIDI
//! reading via `midly`.

pub mod reader;
pub mod writer;

// Re-export commonly used items
pub use reader::read_midi_file;
pub use writer::{write_midi_file, TICKS_PER_QUARTER};
