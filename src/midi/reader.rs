//! Seed MIDI input.
//!
//! Parses a user-supplied MIDI file into an event-index sequence that can
//! seed generation. Tracks are merged on absolute time, note events
//! outside the vocabulary's pitch range are skipped, and gaps are
//! quantized to time-shift bins.

use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::error::{GenError, Result};
use crate::sequence::event::{
    ms_to_time_shift_bins, velocity_to_bin, Event, PITCH_HIGH, PITCH_LOW,
};

/// Default tempo when no tempo meta event is present (120 BPM).
const DEFAULT_TEMPO_MICROSECONDS: u32 = 500_000;

/// A note message at an absolute tick, merged across tracks.
#[derive(Debug, Clone, Copy)]
enum TimedMessage {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8 },
    Tempo { microseconds: u32 },
}

/// Reads a MIDI file into an event-index sequence.
pub fn read_midi_file(path: &Path) -> Result<Vec<i64>> {
    let bytes = std::fs::read(path).map_err(|e| {
        GenError::with_source(
            crate::error::ErrorCode::InvalidMidi,
            format!("failed to read {}", path.display()),
            e,
        )
    })?;
    let smf = Smf::parse(&bytes)
        .map_err(|e| GenError::invalid_midi(format!("{}: {}", path.display(), e)))?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) => tpq.as_int() as u32,
        Timing::Timecode(..) => {
            return Err(GenError::invalid_midi(format!(
                "{}: SMPTE timecode timing is not supported",
                path.display()
            )));
        }
    };
    if ticks_per_quarter == 0 {
        return Err(GenError::invalid_midi(format!(
            "{}: zero ticks per quarter note",
            path.display()
        )));
    }

    let timed = merge_tracks(&smf);
    Ok(timed_to_events(&timed, ticks_per_quarter))
}

/// Merges all tracks into one stream sorted by absolute tick.
fn merge_tracks(smf: &Smf) -> Vec<(u64, TimedMessage)> {
    let mut merged = Vec::new();

    for track in &smf.tracks {
        let mut abs_tick: u64 = 0;
        for event in track {
            abs_tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Midi { message, .. } => match message {
                    MidiMessage::NoteOn { key, vel } => {
                        let message = if vel.as_int() == 0 {
                            // Running-status shorthand for note-off
                            TimedMessage::NoteOff { pitch: key.as_int() }
                        } else {
                            TimedMessage::NoteOn {
                                pitch: key.as_int(),
                                velocity: vel.as_int(),
                            }
                        };
                        merged.push((abs_tick, message));
                    }
                    MidiMessage::NoteOff { key, .. } => {
                        merged.push((abs_tick, TimedMessage::NoteOff { pitch: key.as_int() }));
                    }
                    _ => {}
                },
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    merged.push((
                        abs_tick,
                        TimedMessage::Tempo {
                            microseconds: tempo.as_int(),
                        },
                    ));
                }
                _ => {}
            }
        }
    }

    merged.sort_by_key(|(tick, _)| *tick);
    merged
}

/// Converts the merged stream into event indices.
fn timed_to_events(timed: &[(u64, TimedMessage)], ticks_per_quarter: u32) -> Vec<i64> {
    let mut events = Vec::new();
    let mut tempo = DEFAULT_TEMPO_MICROSECONDS as u64;
    let mut prev_tick: u64 = 0;
    let mut pending_ms: f64 = 0.0;
    let mut velocity_bin: Option<u8> = None;
    let mut sounding = [false; 128];

    for &(tick, message) in timed {
        let delta_ticks = tick - prev_tick;
        prev_tick = tick;
        pending_ms += delta_ticks as f64 * tempo as f64 / ticks_per_quarter as f64 / 1000.0;

        match message {
            TimedMessage::Tempo { microseconds } => {
                tempo = microseconds as u64;
            }
            TimedMessage::NoteOn { pitch, velocity } => {
                if !(PITCH_LOW..=PITCH_HIGH).contains(&pitch) {
                    continue;
                }
                flush_time(&mut events, &mut pending_ms);
                let bin = velocity_to_bin(velocity);
                if velocity_bin != Some(bin) {
                    events.push(Event::Velocity { bin }.to_index() as i64);
                    velocity_bin = Some(bin);
                }
                events.push(Event::NoteOn { pitch }.to_index() as i64);
                sounding[pitch as usize] = true;
            }
            TimedMessage::NoteOff { pitch } => {
                if !(PITCH_LOW..=PITCH_HIGH).contains(&pitch) || !sounding[pitch as usize] {
                    continue;
                }
                flush_time(&mut events, &mut pending_ms);
                events.push(Event::NoteOff { pitch }.to_index() as i64);
                sounding[pitch as usize] = false;
            }
        }
    }

    events
}

/// Emits time-shift events for the pending gap.
fn flush_time(events: &mut Vec<i64>, pending_ms: &mut f64) {
    let ms = pending_ms.round().max(0.0) as u32;
    for bin in ms_to_time_shift_bins(ms) {
        events.push(Event::TimeShift { bin }.to_index() as i64);
    }
    *pending_ms = 0.0;
}
