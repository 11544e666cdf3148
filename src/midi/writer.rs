//! MIDI output for generated event sequences.
//!
//! Converts a sequence of event indices into a Standard MIDI File
//! (SMF format 0) and reports how many notes were written.
//!
//! Uses the `midly` crate for MIDI writing.

use std::path::Path;

use midly::{
    num::{u15, u24, u28, u4, u7},
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
};

use crate::error::{GenError, Result};
use crate::sequence::event::{bin_to_velocity, time_shift_bin_ms, Event};

/// Ticks per quarter note in MIDI output.
pub const TICKS_PER_QUARTER: u16 = 480;

/// Output tempo in microseconds per quarter note (120 BPM).
const TEMPO_MICROSECONDS: u32 = 500_000;

/// Ticks per second at the output tempo.
const TICKS_PER_SECOND: u32 = TICKS_PER_QUARTER as u32 * 1_000_000 / TEMPO_MICROSECONDS;

/// MIDI velocity used before the first velocity event.
const DEFAULT_VELOCITY: u8 = 64;

/// Writes an event-index sequence to a MIDI file.
///
/// Returns the number of notes written. Notes still sounding at the end
/// of the sequence are closed at the final tick.
pub fn write_midi_file(events: &[i64], path: &Path) -> Result<usize> {
    let (smf, note_count) = events_to_smf(events)?;

    let mut buf = Vec::new();
    smf.write(&mut buf)
        .map_err(|e| GenError::output_write_failed(format!("{}: {}", path.display(), e)))?;
    std::fs::write(path, &buf).map_err(|e| {
        GenError::with_source(
            crate::error::ErrorCode::OutputWriteFailed,
            format!("failed to write {}", path.display()),
            e,
        )
    })?;

    Ok(note_count)
}

/// Converts an event-index sequence to an in-memory SMF.
fn events_to_smf(events: &[i64]) -> Result<(Smf<'static>, usize)> {
    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    let mut track: Track<'static> = Vec::new();
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(TEMPO_MICROSECONDS))),
    });

    let channel = u4::new(0);
    let mut velocity = DEFAULT_VELOCITY;
    let mut elapsed_ms: u64 = 0;
    let mut last_emit_tick: u32 = 0;
    let mut active = [false; 128];
    let mut note_count = 0usize;

    let mut emit = |track: &mut Track<'static>, elapsed_ms: u64, last_emit_tick: &mut u32, message: MidiMessage| {
        let tick = ms_to_ticks(elapsed_ms);
        let delta = tick - *last_emit_tick;
        *last_emit_tick = tick;
        track.push(TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi { channel, message },
        });
    };

    for &index in events {
        if index < 0 {
            return Err(GenError::model_inference_failed(format!(
                "negative event index {}",
                index
            )));
        }
        match Event::from_index(index as usize)? {
            Event::TimeShift { bin } => {
                elapsed_ms += time_shift_bin_ms(bin) as u64;
            }
            Event::Velocity { bin } => {
                velocity = bin_to_velocity(bin);
            }
            Event::NoteOn { pitch } => {
                emit(
                    &mut track,
                    elapsed_ms,
                    &mut last_emit_tick,
                    MidiMessage::NoteOn {
                        key: u7::new(pitch),
                        vel: u7::new(velocity),
                    },
                );
                active[pitch as usize] = true;
                note_count += 1;
            }
            Event::NoteOff { pitch } => {
                // Ignore note-offs for pitches that are not sounding
                if active[pitch as usize] {
                    emit(
                        &mut track,
                        elapsed_ms,
                        &mut last_emit_tick,
                        MidiMessage::NoteOff {
                            key: u7::new(pitch),
                            vel: u7::new(0),
                        },
                    );
                    active[pitch as usize] = false;
                }
            }
        }
    }

    // Close anything still sounding at the final tick
    for pitch in 0..active.len() {
        if active[pitch] {
            emit(
                &mut track,
                elapsed_ms,
                &mut last_emit_tick,
                MidiMessage::NoteOff {
                    key: u7::new(pitch as u8),
                    vel: u7::new(0),
                },
            );
        }
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    Ok((smf, note_count))
}

/// Converts elapsed milliseconds to an absolute tick at the output tempo.
fn ms_to_ticks(ms: u64) -> u32 {
    (ms * TICKS_PER_SECOND as u64 / 1000) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::event::{Event, PITCH_LOW};
    use tempfile::tempdir;

    fn index(event: Event) -> i64 {
        event.to_index() as i64
    }

    #[test]
    fn ticks_per_second_at_120_bpm() {
        assert_eq!(TICKS_PER_SECOND, 960);
        assert_eq!(ms_to_ticks(1000), 960);
        assert_eq!(ms_to_ticks(500), 480);
    }

    #[test]
    fn note_count_matches_note_ons() {
        let events = vec![
            index(Event::Velocity { bin: 20 }),
            index(Event::NoteOn { pitch: 60 }),
            index(Event::TimeShift { bin: 49 }),
            index(Event::NoteOn { pitch: 64 }),
            index(Event::TimeShift { bin: 49 }),
            index(Event::NoteOff { pitch: 60 }),
            index(Event::NoteOff { pitch: 64 }),
        ];
        let (smf, notes) = events_to_smf(&events).unwrap();
        assert_eq!(notes, 2);
        assert_eq!(smf.tracks.len(), 1);
    }

    #[test]
    fn dangling_notes_are_closed() {
        let events = vec![
            index(Event::NoteOn { pitch: 72 }),
            index(Event::TimeShift { bin: 9 }),
        ];
        let (smf, notes) = events_to_smf(&events).unwrap();
        assert_eq!(notes, 1);
        let offs = smf.tracks[0]
            .iter()
            .filter(|ev| {
                matches!(
                    ev.kind,
                    TrackEventKind::Midi {
                        message: MidiMessage::NoteOff { .. },
                        ..
                    }
                )
            })
            .count();
        assert_eq!(offs, 1);
    }

    #[test]
    fn unmatched_note_off_is_ignored() {
        let events = vec![index(Event::NoteOff { pitch: PITCH_LOW })];
        let (smf, notes) = events_to_smf(&events).unwrap();
        assert_eq!(notes, 0);
        // Tempo meta + end of track only
        assert_eq!(smf.tracks[0].len(), 2);
    }

    #[test]
    fn time_shifts_produce_deltas() {
        let events = vec![
            index(Event::NoteOn { pitch: 60 }),
            index(Event::TimeShift { bin: 99 }), // 1 second
            index(Event::NoteOff { pitch: 60 }),
        ];
        let (smf, _) = events_to_smf(&events).unwrap();
        let deltas: Vec<u32> = smf.tracks[0].iter().map(|ev| ev.delta.as_int()).collect();
        assert!(deltas.contains(&960));
    }

    #[test]
    fn write_creates_parseable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mid");
        let events = vec![
            index(Event::NoteOn { pitch: 60 }),
            index(Event::TimeShift { bin: 49 }),
            index(Event::NoteOff { pitch: 60 }),
        ];
        let notes = write_midi_file(&events, &path).unwrap();
        assert_eq!(notes, 1);

        let bytes = std::fs::read(&path).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 1);
    }

    #[test]
    fn out_of_vocabulary_index_fails() {
        let events = vec![crate::sequence::EVENT_DIM as i64];
        assert!(events_to_smf(&events).is_err());
        assert!(events_to_smf(&[-1]).is_err());
    }
}
