// Melody model and Standard MIDI File I/O.
//
// A `Melody` is a flat, monophonic list of notes plus the ticks-per-beat
// resolution it was authored at. Each `NoteEvent` stores its pitch, the
// gap in ticks since the previous note ended (`on_tick_offset`), and how
// many ticks it sounds (`duration_ticks`). That layout maps one-to-one
// onto SMF delta times: a note-on after `on_tick_offset` ticks, then a
// note-off after `duration_ticks` ticks.
//
// Reading: the first track that contains a sounding note-on (velocity > 0)
// is used. Notes are closed by a matching note-off or zero-velocity
// note-on on the same channel and key; notes still open at end of track
// run to the last event. Only metrical timing is accepted.
//
// Writing: a single-track (format 0) file with velocity-64 note pairs.
//
// Source melodies are never rewritten in place; `adjust.rs` always builds
// a fresh `Melody`.
//
// Uses the `midly` crate for parsing and writing.

use crate::error::MusicError;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u28},
};
use std::path::Path;

/// Velocity written on every emitted note-on and note-off.
pub const NOTE_VELOCITY: u8 = 64;

/// Largest delta time a MIDI variable-length quantity can hold.
const MAX_DELTA: u32 = 0x0FFF_FFFF;

/// One note of a monophonic melody.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    /// MIDI key number, 0..=127.
    pub pitch: u8,
    /// Ticks between the end of the previous note and this note's onset.
    pub on_tick_offset: u32,
    /// Ticks the note sounds for.
    pub duration_ticks: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Melody {
    /// Where the melody came from, for diagnostics.
    pub name: String,
    pub ticks_per_beat: u16,
    pub notes: Vec<NoteEvent>,
}

impl Melody {
    pub fn new(name: impl Into<String>, ticks_per_beat: u16, notes: Vec<NoteEvent>) -> Self {
        Self {
            name: name.into(),
            ticks_per_beat,
            notes,
        }
    }

    /// Parse a melody from an SMF file on disk.
    pub fn read_smf(path: &Path) -> Result<Self, MusicError> {
        let bytes = std::fs::read(path).map_err(|e| MusicError::io(path, e))?;
        Self::from_smf_bytes(&path.display().to_string(), &bytes)
    }

    /// Parse a melody from in-memory SMF bytes.
    pub fn from_smf_bytes(name: &str, bytes: &[u8]) -> Result<Self, MusicError> {
        let smf = Smf::parse(bytes)?;
        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(tpb) => tpb.as_int(),
            Timing::Timecode(..) => {
                return Err(MusicError::InvalidInput(format!(
                    "{name}: SMPTE timecode timing is not supported"
                )));
            }
        };

        let notes = smf
            .tracks
            .iter()
            .map(Vec::as_slice)
            .map(notes_from_track)
            .find(|notes| !notes.is_empty())
            .unwrap_or_default();

        Ok(Self::new(name, ticks_per_beat, notes))
    }

    /// Pitches of every sounding note, in order.
    pub fn sounding_pitches(&self) -> Vec<u8> {
        self.notes.iter().map(|n| n.pitch).collect()
    }

    /// Total length in ticks, offsets included.
    pub fn total_ticks(&self) -> u64 {
        self.notes
            .iter()
            .map(|n| n.on_tick_offset as u64 + n.duration_ticks as u64)
            .sum()
    }

    /// Serialize to a single-track SMF in memory.
    pub fn to_smf_bytes(&self) -> Result<Vec<u8>, MusicError> {
        let smf = self.to_smf();
        let mut buf = Vec::new();
        smf.write(&mut buf)
            .map_err(|e| MusicError::Encode(format!("{}: {e:?}", self.name)))?;
        Ok(buf)
    }

    /// Convert to SMF and write to `path`.
    pub fn write_smf(&self, path: &Path) -> Result<(), MusicError> {
        let buf = self.to_smf_bytes()?;
        std::fs::write(path, &buf).map_err(|e| MusicError::io(path, e))?;
        Ok(())
    }

    fn to_smf(&self) -> Smf<'static> {
        let mut smf = Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::new(self.ticks_per_beat.min(0x7FFF))),
        ));

        let channel = u4::new(0);
        let vel = u7::new(NOTE_VELOCITY);
        let mut track: Track<'static> = Vec::with_capacity(self.notes.len() * 2 + 1);
        for note in &self.notes {
            let key = u7::new(note.pitch.min(127));
            track.push(TrackEvent {
                delta: u28::new(note.on_tick_offset.min(MAX_DELTA)),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn { key, vel },
                },
            });
            track.push(TrackEvent {
                delta: u28::new(note.duration_ticks.min(MAX_DELTA)),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff { key, vel },
                },
            });
        }
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
        smf
    }
}

/// A note that has started but not yet been closed.
struct OpenNote {
    channel: u8,
    key: u8,
    start: u64,
    index: usize,
}

/// Reconstruct notes from one track. Returns them ordered by onset.
fn notes_from_track(track: &[TrackEvent<'_>]) -> Vec<NoteEvent> {
    // (pitch, start tick, end tick)
    let mut spans: Vec<(u8, u64, Option<u64>)> = Vec::new();
    let mut open: Vec<OpenNote> = Vec::new();
    let mut tick: u64 = 0;

    for event in track {
        tick += event.delta.as_int() as u64;
        let TrackEventKind::Midi { channel, message } = event.kind else {
            continue;
        };
        let channel = channel.as_int();
        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                open.push(OpenNote {
                    channel,
                    key: key.as_int(),
                    start: tick,
                    index: spans.len(),
                });
                spans.push((key.as_int(), tick, None));
            }
            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                let key = key.as_int();
                if let Some(pos) = open.iter().position(|n| n.channel == channel && n.key == key) {
                    let note = open.remove(pos);
                    spans[note.index].2 = Some(tick.max(note.start));
                }
            }
            _ => {}
        }
    }

    let mut notes = Vec::with_capacity(spans.len());
    let mut previous_end: u64 = 0;
    for (pitch, start, end) in spans {
        let end = end.unwrap_or(tick);
        notes.push(NoteEvent {
            pitch,
            on_tick_offset: clamp_ticks(start.saturating_sub(previous_end)),
            duration_ticks: clamp_ticks(end - start),
        });
        previous_end = previous_end.max(end);
    }
    notes
}

fn clamp_ticks(ticks: u64) -> u32 {
    ticks.min(MAX_DELTA as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn midi(delta: u32, message: MidiMessage) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message,
            },
        }
    }

    fn on(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
        midi(
            delta,
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            },
        )
    }

    fn off(delta: u32, key: u8) -> TrackEvent<'static> {
        midi(
            delta,
            MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            },
        )
    }

    fn encode(tracks: Vec<Track<'static>>, tpb: u16) -> Vec<u8> {
        let format = if tracks.len() == 1 {
            Format::SingleTrack
        } else {
            Format::Parallel
        };
        let mut smf = Smf::new(Header::new(format, Timing::Metrical(u15::new(tpb))));
        smf.tracks = tracks;
        let mut buf = Vec::new();
        smf.write(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_reads_notes_with_gaps() {
        let bytes = encode(
            vec![vec![
                on(0, 60, 80),
                off(480, 60),
                on(240, 62, 80),
                on(480, 62, 0),
            ]],
            480,
        );
        let melody = Melody::from_smf_bytes("test", &bytes).unwrap();
        assert_eq!(melody.ticks_per_beat, 480);
        assert_eq!(
            melody.notes,
            vec![
                NoteEvent {
                    pitch: 60,
                    on_tick_offset: 0,
                    duration_ticks: 480
                },
                NoteEvent {
                    pitch: 62,
                    on_tick_offset: 240,
                    duration_ticks: 480
                },
            ]
        );
        assert_eq!(melody.sounding_pitches(), vec![60, 62]);
        assert_eq!(melody.total_ticks(), 1200);
    }

    #[test]
    fn test_skips_tempo_track_without_notes() {
        let tempo_track: Track<'static> = vec![TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        }];
        let bytes = encode(vec![tempo_track, vec![on(0, 67, 90), off(96, 67)]], 96);
        let melody = Melody::from_smf_bytes("two-track", &bytes).unwrap();
        assert_eq!(melody.sounding_pitches(), vec![67]);
    }

    #[test]
    fn test_zero_velocity_only_yields_no_notes() {
        let bytes = encode(vec![vec![on(0, 60, 0), off(10, 60)]], 480);
        let melody = Melody::from_smf_bytes("silent", &bytes).unwrap();
        assert!(melody.notes.is_empty());
    }

    #[test]
    fn test_unclosed_note_runs_to_end_of_track() {
        let bytes = encode(vec![vec![on(0, 64, 80), off(100, 99)]], 480);
        let melody = Melody::from_smf_bytes("dangling", &bytes).unwrap();
        assert_eq!(melody.notes[0].duration_ticks, 100);
    }

    #[test]
    fn test_written_file_reads_back_identically() {
        let melody = Melody::new(
            "written",
            480,
            vec![
                NoteEvent {
                    pitch: 60,
                    on_tick_offset: 0,
                    duration_ticks: 720,
                },
                NoteEvent {
                    pitch: 65,
                    on_tick_offset: 0,
                    duration_ticks: 240,
                },
            ],
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("melody.mid");
        melody.write_smf(&path).unwrap();

        let back = Melody::read_smf(&path).unwrap();
        assert_eq!(back.ticks_per_beat, 480);
        assert_eq!(back.notes, melody.notes);
    }

    #[test]
    fn test_garbage_is_a_midi_error() {
        let err = Melody::from_smf_bytes("junk", b"not a midi file").unwrap_err();
        assert!(matches!(err, MusicError::Midi(_)));
    }
}
