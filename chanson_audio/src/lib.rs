// Chanson audio layer.
//
// Clip-level operations on synthesized vocals: read and write WAV files,
// trim silence, force a clip to an exact duration, convert clips to one
// shared format, and concatenate clips into the final song. Every operation
// takes a clip (or paths) and returns a new one; nothing edits a file in
// place.
//
// Architecture:
// - clip.rs: AudioClip (interleaved f32 samples + ClipFormat), WAV I/O
//   via hound
// - trim.rs: RMS-window silence detection, trim and re-pad
// - stretch.rs: duration normalization by linear resampling
// - uniform.rs: channel remap + sample-rate conversion to a shared format
// - concat.rs: header-checked streaming concatenation
// - error.rs: AudioError, FormatField

pub mod clip;
pub mod concat;
pub mod error;
pub mod stretch;
pub mod trim;
pub mod uniform;

pub use clip::{AudioClip, ClipFormat, SampleKind};
pub use error::{AudioError, FormatField};
