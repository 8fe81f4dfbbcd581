// Melody rewriting: fit a source melody to a duration plan.
//
// The adjuster keeps the source melody's pitch sequence but throws away its
// rhythm. Each entry of a `DurationPlan` becomes one note; pitches are taken
// from the source's sounding notes in order, wrapping around when the plan
// is longer than the melody (`pitches[i % k]`). The source is read-only and
// every operation returns a new value.
//
// Variation: `add_variation` nudges each assigned pitch by a fixed cyclic
// offset pattern (-2, -1, 0, +1, +2, repeat) and clamps to the MIDI key
// range. It is a pure function of (melody, plan); `apply_variation` then
// lays the varied pitches onto the plan's rhythm.
//
// Timing: each emitted note has an onset offset of 0 and lasts
// `round(beats * ticks_per_beat)` ticks. Onsets are relative to the end of
// the previous note, so notes play back to back. A plan entry that the
// quantizer's drift correction pushed to zero or below becomes a 0-tick
// note rather than failing.
//
// See also: `quantize.rs` for how plans are built, `melody.rs` for the
// note and SMF representation.

use crate::error::MusicError;
use crate::melody::{Melody, NoteEvent};
use crate::quantize::DurationPlan;
use tracing::warn;

/// Period of the variation offset pattern.
pub const VARIATION_PERIOD: usize = 5;

/// Pitch offset applied to the note at plan index `index`.
pub fn variation_offset(index: usize) -> i32 {
    (index % VARIATION_PERIOD) as i32 - 2
}

/// Pitches aligned one-to-one with a duration plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteVariationSeries(Vec<u8>);

impl NoteVariationSeries {
    pub fn pitches(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Convert a beat duration into ticks, rounding to nearest. Non-positive
/// durations yield zero.
pub fn beats_to_ticks(beats: f64, ticks_per_beat: u16) -> u32 {
    let ticks = (beats * ticks_per_beat as f64).round();
    if ticks <= 0.0 {
        0
    } else {
        ticks.min(u32::MAX as f64) as u32
    }
}

fn source_pitches(melody: &Melody) -> Result<Vec<u8>, MusicError> {
    let pitches = melody.sounding_pitches();
    if pitches.is_empty() {
        return Err(MusicError::NoPitchesFound {
            source_name: melody.name.clone(),
        });
    }
    Ok(pitches)
}

/// Cyclic pitch assignment: one pitch per plan entry.
fn cyclic_pitches(pitches: &[u8], count: usize) -> impl Iterator<Item = u8> + '_ {
    (0..count).map(move |i| pitches[i % pitches.len()])
}

fn build_melody(source: &Melody, plan: &DurationPlan, pitches: impl Iterator<Item = u8>) -> Melody {
    let notes = plan
        .durations()
        .iter()
        .zip(pitches)
        .enumerate()
        .map(|(i, (&beats, pitch))| {
            if beats <= 0.0 {
                warn!(
                    melody = %source.name,
                    index = i,
                    beats,
                    "non-positive duration in plan, emitting zero-length note"
                );
            }
            NoteEvent {
                pitch,
                on_tick_offset: 0,
                duration_ticks: beats_to_ticks(beats, source.ticks_per_beat),
            }
        })
        .collect();
    Melody::new(
        format!("{} (adjusted)", source.name),
        source.ticks_per_beat,
        notes,
    )
}

/// Rewrite `melody` so that it has one note per plan entry, reusing the
/// source pitches cyclically.
pub fn adjust(melody: &Melody, plan: &DurationPlan) -> Result<Melody, MusicError> {
    let pitches = source_pitches(melody)?;
    Ok(build_melody(melody, plan, cyclic_pitches(&pitches, plan.len())))
}

/// Cyclically assigned source pitches with the variation pattern applied,
/// clamped to 0..=127.
pub fn add_variation(
    melody: &Melody,
    plan: &DurationPlan,
) -> Result<NoteVariationSeries, MusicError> {
    let pitches = source_pitches(melody)?;
    let varied = cyclic_pitches(&pitches, plan.len())
        .enumerate()
        .map(|(i, pitch)| (pitch as i32 + variation_offset(i)).clamp(0, 127) as u8)
        .collect();
    Ok(NoteVariationSeries(varied))
}

/// Lay a variation series onto the plan's rhythm. The series must have
/// exactly one pitch per plan entry.
pub fn apply_variation(
    source: &Melody,
    plan: &DurationPlan,
    variation: &NoteVariationSeries,
) -> Result<Melody, MusicError> {
    if variation.len() != plan.len() {
        return Err(MusicError::InvalidInput(format!(
            "variation has {} pitches but the plan has {} durations",
            variation.len(),
            plan.len()
        )));
    }
    Ok(build_melody(
        source,
        plan,
        variation.pitches().iter().copied(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::{StressMap, quantize};

    fn melody(pitches: &[u8]) -> Melody {
        Melody::new(
            "source",
            480,
            pitches
                .iter()
                .map(|&pitch| NoteEvent {
                    pitch,
                    on_tick_offset: 0,
                    duration_ticks: 480,
                })
                .collect(),
        )
    }

    fn plan(n: usize) -> DurationPlan {
        quantize(n, &StressMap::new(), 4.0).unwrap()
    }

    #[test]
    fn test_cyclic_pitch_reuse() {
        let source = melody(&[60, 64, 67]);
        let adjusted = adjust(&source, &plan(8)).unwrap();
        let pitches = adjusted.sounding_pitches();
        assert_eq!(pitches.len(), 8);
        for (i, &p) in pitches.iter().enumerate() {
            assert_eq!(p, pitches[i % 3]);
        }
        assert_eq!(pitches, vec![60, 64, 67, 60, 64, 67, 60, 64]);
    }

    #[test]
    fn test_adjust_does_not_touch_source() {
        let source = melody(&[60, 62]);
        let before = source.clone();
        let _ = adjust(&source, &plan(4)).unwrap();
        assert_eq!(source, before);
    }

    #[test]
    fn test_ticks_follow_plan() {
        let source = melody(&[60]);
        let adjusted = adjust(&source, &plan(3)).unwrap();
        let ticks: Vec<u32> = adjusted.notes.iter().map(|n| n.duration_ticks).collect();
        // Plan is [1.5, 1.5, 1.0] beats.
        assert_eq!(ticks, vec![720, 720, 480]);
        assert!(adjusted.notes.iter().all(|n| n.on_tick_offset == 0));
    }

    #[test]
    fn test_negative_plan_entry_becomes_zero_ticks() {
        let source = melody(&[60]);
        let stressed: StressMap = [0, 2].into_iter().collect();
        let plan = quantize(5, &stressed, 4.0).unwrap();
        let adjusted = adjust(&source, &plan).unwrap();
        assert_eq!(adjusted.notes[4].duration_ticks, 0);
    }

    #[test]
    fn test_no_pitches_found() {
        let source = melody(&[]);
        assert!(matches!(
            adjust(&source, &plan(2)),
            Err(MusicError::NoPitchesFound { .. })
        ));
        assert!(matches!(
            add_variation(&source, &plan(2)),
            Err(MusicError::NoPitchesFound { .. })
        ));
    }

    #[test]
    fn test_variation_pattern() {
        let source = melody(&[60]);
        let series = add_variation(&source, &plan(7)).unwrap();
        assert_eq!(series.pitches(), &[58, 59, 60, 61, 62, 58, 59]);
    }

    #[test]
    fn test_variation_clamps_to_midi_range() {
        let low = add_variation(&melody(&[0, 1]), &plan(10)).unwrap();
        let high = add_variation(&melody(&[127, 126]), &plan(10)).unwrap();
        for &p in low.pitches().iter().chain(high.pitches()) {
            assert!(p <= 127);
        }
        assert_eq!(low.pitches()[0], 0);
        assert_eq!(high.pitches()[4], 127);
    }

    #[test]
    fn test_apply_variation_uses_series_pitches() {
        let source = melody(&[60, 65]);
        let p = plan(4);
        let series = add_variation(&source, &p).unwrap();
        let varied = apply_variation(&source, &p, &series).unwrap();
        assert_eq!(varied.sounding_pitches(), series.pitches());
        assert_eq!(varied.notes.len(), 4);
    }

    #[test]
    fn test_apply_variation_length_mismatch() {
        let source = melody(&[60]);
        let series = add_variation(&source, &plan(3)).unwrap();
        assert!(matches!(
            apply_variation(&source, &plan(4), &series),
            Err(MusicError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_beats_to_ticks_rounds() {
        assert_eq!(beats_to_ticks(0.33, 480), 158);
        assert_eq!(beats_to_ticks(1.5, 96), 144);
        assert_eq!(beats_to_ticks(-0.5, 480), 0);
    }
}
