// Chanson music layer.
//
// Turns a lyric line and a source melody into a melody whose rhythm fits
// the line: one note per syllable, one measure long. Everything here is
// pure computation plus MIDI file I/O; audio and external tools live in
// the `chanson_audio` and `chanson_pipeline` crates.
//
// Architecture:
// - syllables.rs: LyricLine analysis and the SyllableCounter seam
//   (heuristic English counter, JSON lexicon overrides)
// - quantize.rs: syllable count -> DurationPlan (stress, snap to canonical
//   note lengths, drift correction on the last note)
// - melody.rs: Melody/NoteEvent model, SMF read and write via midly
// - adjust.rs: rewrite a melody onto a DurationPlan with cyclic pitch
//   reuse, plus the deterministic pitch-variation series
// - error.rs: MusicError
//
// All operations are deterministic: the same line, melody and parameters
// always produce the same output.

pub mod adjust;
pub mod error;
pub mod melody;
pub mod quantize;
pub mod syllables;

pub use error::MusicError;
