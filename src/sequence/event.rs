//! Performance event vocabulary.
//!
//! Generated sequences are indices into a fixed vocabulary of performance
//! events: note-on and note-off over the 88 piano keys, quantized velocity
//! changes, and quantized time shifts. The mapping between events and
//! indices is a bijection over `0..EVENT_DIM`.

use crate::error::{GenError, Result};

/// Lowest MIDI pitch in the vocabulary (A0).
pub const PITCH_LOW: u8 = 21;
/// Highest MIDI pitch in the vocabulary (C8).
pub const PITCH_HIGH: u8 = 108;
/// Number of distinct pitches (88 piano keys).
pub const NOTE_DIM: usize = (PITCH_HIGH - PITCH_LOW + 1) as usize;

/// Number of quantized velocity bins.
pub const VELOCITY_BINS: usize = 32;
/// Number of quantized time-shift bins.
pub const TIME_SHIFT_BINS: usize = 100;
/// Milliseconds per time-shift increment; bin `b` shifts `(b + 1) * 10` ms.
pub const TIME_SHIFT_MS: u32 = 10;

const NOTE_ON_OFFSET: usize = 0;
const NOTE_OFF_OFFSET: usize = NOTE_DIM;
const VELOCITY_OFFSET: usize = NOTE_DIM * 2;
const TIME_SHIFT_OFFSET: usize = NOTE_DIM * 2 + VELOCITY_BINS;

/// Total vocabulary size (308).
pub const EVENT_DIM: usize = NOTE_DIM * 2 + VELOCITY_BINS + TIME_SHIFT_BINS;

/// One performance event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Start sounding a pitch at the running velocity.
    NoteOn { pitch: u8 },
    /// Stop sounding a pitch.
    NoteOff { pitch: u8 },
    /// Change the running velocity to the given bin.
    Velocity { bin: u8 },
    /// Advance time by `(bin + 1) * TIME_SHIFT_MS` milliseconds.
    TimeShift { bin: u8 },
}

impl Event {
    /// Returns the vocabulary index of this event.
    pub fn to_index(self) -> usize {
        match self {
            Event::NoteOn { pitch } => NOTE_ON_OFFSET + (pitch - PITCH_LOW) as usize,
            Event::NoteOff { pitch } => NOTE_OFF_OFFSET + (pitch - PITCH_LOW) as usize,
            Event::Velocity { bin } => VELOCITY_OFFSET + bin as usize,
            Event::TimeShift { bin } => TIME_SHIFT_OFFSET + bin as usize,
        }
    }

    /// Decodes a vocabulary index back into an event.
    ///
    /// Fails for indices outside `0..EVENT_DIM`.
    pub fn from_index(index: usize) -> Result<Self> {
        if index < NOTE_OFF_OFFSET {
            Ok(Event::NoteOn {
                pitch: PITCH_LOW + (index - NOTE_ON_OFFSET) as u8,
            })
        } else if index < VELOCITY_OFFSET {
            Ok(Event::NoteOff {
                pitch: PITCH_LOW + (index - NOTE_OFF_OFFSET) as u8,
            })
        } else if index < TIME_SHIFT_OFFSET {
            Ok(Event::Velocity {
                bin: (index - VELOCITY_OFFSET) as u8,
            })
        } else if index < EVENT_DIM {
            Ok(Event::TimeShift {
                bin: (index - TIME_SHIFT_OFFSET) as u8,
            })
        } else {
            Err(GenError::model_inference_failed(format!(
                "event index {} outside vocabulary of size {}",
                index, EVENT_DIM
            )))
        }
    }
}

/// Quantizes a MIDI velocity (1..=127) to a bin index.
pub fn velocity_to_bin(velocity: u8) -> u8 {
    let v = velocity.clamp(1, 127) as f32;
    ((v - 1.0) * (VELOCITY_BINS as f32 - 1.0) / 126.0).round() as u8
}

/// Maps a velocity bin back to a MIDI velocity.
pub fn bin_to_velocity(bin: u8) -> u8 {
    let bin = (bin as usize).min(VELOCITY_BINS - 1) as f32;
    (1.0 + bin * 126.0 / (VELOCITY_BINS as f32 - 1.0)).round() as u8
}

/// Duration in milliseconds represented by a time-shift bin.
pub fn time_shift_bin_ms(bin: u8) -> u32 {
    (bin as u32 + 1) * TIME_SHIFT_MS
}

/// Quantizes a gap in milliseconds to a run of time-shift bins.
///
/// Full one-second shifts are emitted first, then the remainder rounded to
/// the nearest increment. Gaps shorter than half an increment yield no
/// events.
pub fn ms_to_time_shift_bins(mut ms: u32) -> Vec<u8> {
    let max_ms = TIME_SHIFT_BINS as u32 * TIME_SHIFT_MS;
    let mut bins = Vec::new();
    while ms >= max_ms {
        bins.push((TIME_SHIFT_BINS - 1) as u8);
        ms -= max_ms;
    }
    let steps = (ms + TIME_SHIFT_MS / 2) / TIME_SHIFT_MS;
    if steps > 0 {
        bins.push((steps - 1) as u8);
    }
    bins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_size() {
        assert_eq!(EVENT_DIM, 308);
        assert_eq!(NOTE_DIM, 88);
    }

    #[test]
    fn index_mapping_is_bijective() {
        for index in 0..EVENT_DIM {
            let event = Event::from_index(index).unwrap();
            assert_eq!(event.to_index(), index);
        }
    }

    #[test]
    fn out_of_range_index_fails() {
        assert!(Event::from_index(EVENT_DIM).is_err());
    }

    #[test]
    fn index_layout() {
        assert_eq!(Event::NoteOn { pitch: PITCH_LOW }.to_index(), 0);
        assert_eq!(Event::NoteOff { pitch: PITCH_LOW }.to_index(), 88);
        assert_eq!(Event::Velocity { bin: 0 }.to_index(), 176);
        assert_eq!(Event::TimeShift { bin: 0 }.to_index(), 208);
        assert_eq!(Event::TimeShift { bin: 99 }.to_index(), 307);
    }

    #[test]
    fn velocity_bins_cover_midi_range() {
        assert_eq!(velocity_to_bin(1), 0);
        assert_eq!(velocity_to_bin(127), (VELOCITY_BINS - 1) as u8);
        assert_eq!(bin_to_velocity(0), 1);
        assert_eq!(bin_to_velocity((VELOCITY_BINS - 1) as u8), 127);
        // Round trip stays within one quantization step
        for v in [1u8, 30, 64, 100, 127] {
            let back = bin_to_velocity(velocity_to_bin(v));
            assert!((back as i16 - v as i16).abs() <= 3);
        }
    }

    #[test]
    fn time_shift_quantization() {
        assert_eq!(ms_to_time_shift_bins(0), Vec::<u8>::new());
        assert_eq!(ms_to_time_shift_bins(10), vec![0]);
        assert_eq!(ms_to_time_shift_bins(995), vec![99]);
        // 2.35s = two full seconds plus a 350ms shift
        assert_eq!(ms_to_time_shift_bins(2350), vec![99, 99, 34]);
        assert_eq!(time_shift_bin_ms(34), 350);
    }
}
