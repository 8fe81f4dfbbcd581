// Duration quantization: syllable count to note lengths in one measure.
//
// Given the number of syllables in a lyric line, produce one duration (in
// beats) per syllable such that the durations sum to exactly one measure.
// The algorithm runs in four passes:
//
// 1. Base allocation: every syllable gets `beats_per_measure / n`.
// 2. Stress: each stressed index gains a fixed increment (0.5 beat by
//    default). The plan is NOT renormalized here.
// 3. Snap: every duration is rounded UP to the nearest canonical note
//    length from `NOTE_LENGTHS` (the smallest table value >= the input).
//    Values above the largest table entry clamp to that entry.
// 4. Drift correction: `beats_per_measure - sum` is added to the last
//    duration only.
//
// Pass 4 is what makes the sum invariant hold, and it concentrates all
// rounding error in the final syllable. Because pass 3 always rounds up,
// the correction is usually negative and can drive the last duration to
// zero or below (e.g. 5 syllables with stress on 0 and 2). The plan keeps
// that value as computed; `adjust.rs` clamps it to zero ticks when the
// melody is written.
//
// See also: `adjust.rs`, which turns a `DurationPlan` into MIDI ticks.

use crate::error::MusicError;
use std::collections::BTreeSet;

/// Canonical note lengths in beats, longest first.
pub const NOTE_LENGTHS: [f64; 11] = [6.0, 4.0, 3.0, 2.0, 1.5, 1.0, 0.5, 0.33, 0.25, 0.125, 0.0625];

/// Beats in one measure of 4/4.
pub const DEFAULT_BEATS_PER_MEASURE: f64 = 4.0;

/// Extra beats granted to a stressed syllable before snapping.
pub const DEFAULT_STRESS_INCREMENT: f64 = 0.5;

/// Slack used when comparing a duration against a table entry, so that a
/// base share of exactly 1.0 snaps to 1.0 rather than 1.5.
const SNAP_EPSILON: f64 = 1e-9;

/// Zero-based syllable indices that receive extra duration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StressMap(BTreeSet<usize>);

impl StressMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<usize> for StressMap {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Per-syllable durations in beats. Sums to the measure length it was
/// quantized against.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationPlan {
    durations: Vec<f64>,
    beats_per_measure: f64,
}

impl DurationPlan {
    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    pub fn beats_per_measure(&self) -> f64 {
        self.beats_per_measure
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    pub fn total_beats(&self) -> f64 {
        self.durations.iter().sum()
    }
}

/// Quantizer parameters. `Default` gives 4/4 with a half-beat stress bonus
/// and the standard note-length table.
#[derive(Debug, Clone)]
pub struct Quantizer {
    beats_per_measure: f64,
    stress_increment: f64,
    table: Vec<f64>,
}

impl Default for Quantizer {
    fn default() -> Self {
        Self {
            beats_per_measure: DEFAULT_BEATS_PER_MEASURE,
            stress_increment: DEFAULT_STRESS_INCREMENT,
            table: NOTE_LENGTHS.to_vec(),
        }
    }
}

impl Quantizer {
    /// Build a quantizer with a custom measure length and stress increment.
    pub fn new(beats_per_measure: f64, stress_increment: f64) -> Result<Self, MusicError> {
        if !beats_per_measure.is_finite() || beats_per_measure <= 0.0 {
            return Err(MusicError::InvalidInput(format!(
                "beats per measure must be positive, got {beats_per_measure}"
            )));
        }
        if !stress_increment.is_finite() || stress_increment < 0.0 {
            return Err(MusicError::InvalidInput(format!(
                "stress increment must be non-negative, got {stress_increment}"
            )));
        }
        Ok(Self {
            beats_per_measure,
            stress_increment,
            table: NOTE_LENGTHS.to_vec(),
        })
    }

    pub fn beats_per_measure(&self) -> f64 {
        self.beats_per_measure
    }

    /// Map `syllable_count` syllables onto one measure.
    pub fn quantize(
        &self,
        syllable_count: usize,
        stressed: &StressMap,
    ) -> Result<DurationPlan, MusicError> {
        if syllable_count == 0 {
            return Err(MusicError::InvalidInput(
                "cannot quantize a line with zero syllables".into(),
            ));
        }

        let base = self.beats_per_measure / syllable_count as f64;
        let mut durations: Vec<f64> = (0..syllable_count)
            .map(|i| {
                let stressed_value = if stressed.contains(i) {
                    base + self.stress_increment
                } else {
                    base
                };
                snap_to_note_length(stressed_value, &self.table)
            })
            .collect();

        let drift = self.beats_per_measure - durations.iter().sum::<f64>();
        if let Some(last) = durations.last_mut() {
            *last += drift;
        }

        Ok(DurationPlan {
            durations,
            beats_per_measure: self.beats_per_measure,
        })
    }
}

/// Quantize with the default table and stress increment.
pub fn quantize(
    syllable_count: usize,
    stressed: &StressMap,
    beats_per_measure: f64,
) -> Result<DurationPlan, MusicError> {
    Quantizer::new(beats_per_measure, DEFAULT_STRESS_INCREMENT)?.quantize(syllable_count, stressed)
}

/// Round `value` up to the nearest entry of `table`, clamping to the
/// largest entry when nothing is long enough.
pub fn snap_to_note_length(value: f64, table: &[f64]) -> f64 {
    let at_least = table
        .iter()
        .copied()
        .filter(|&len| len >= value - SNAP_EPSILON)
        .min_by(|a, b| (a - value).abs().total_cmp(&(b - value).abs()));
    match at_least {
        Some(len) => len,
        None => table.iter().copied().fold(0.0, f64::max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    fn stress(indices: &[usize]) -> StressMap {
        indices.iter().copied().collect()
    }

    #[test]
    fn test_zero_syllables_is_invalid() {
        let err = quantize(0, &StressMap::new(), 4.0).unwrap_err();
        assert!(matches!(err, MusicError::InvalidInput(_)));
    }

    #[test]
    fn test_four_syllables_stressed_zero_and_two() {
        let plan = quantize(4, &stress(&[0, 2]), 4.0).unwrap();
        assert_eq!(plan.len(), 4);
        assert_close(plan.total_beats(), 4.0);
        // 1.5, 1.0, 1.5 are canonical; the last absorbs the -1 beat drift.
        assert_close(plan.durations()[0], 1.5);
        assert_close(plan.durations()[1], 1.0);
        assert_close(plan.durations()[2], 1.5);
        assert_close(plan.durations()[3], 0.0);
    }

    #[test]
    fn test_single_syllable_fills_measure() {
        let plan = quantize(1, &StressMap::new(), 4.0).unwrap();
        assert_eq!(plan.durations(), &[4.0]);
    }

    #[test]
    fn test_rounds_up_not_to_nearest() {
        // 4/3 = 1.333 is nearer to 1.5 anyway, but 4/12 = 0.333 must go to
        // 0.5 rather than the slightly smaller 0.33.
        assert_close(snap_to_note_length(4.0 / 12.0, &NOTE_LENGTHS), 0.5);
        assert_close(snap_to_note_length(1.1, &NOTE_LENGTHS), 1.5);
        assert_close(snap_to_note_length(1.0, &NOTE_LENGTHS), 1.0);
        assert_close(snap_to_note_length(0.01, &NOTE_LENGTHS), 0.0625);
    }

    #[test]
    fn test_values_beyond_table_clamp_to_longest() {
        assert_close(snap_to_note_length(9.0, &NOTE_LENGTHS), 6.0);
    }

    #[test]
    fn test_three_syllables_drift_on_last() {
        let plan = quantize(3, &StressMap::new(), 4.0).unwrap();
        assert_close(plan.durations()[0], 1.5);
        assert_close(plan.durations()[1], 1.5);
        assert_close(plan.durations()[2], 1.0);
    }

    #[test]
    fn test_last_duration_may_go_negative() {
        // 0.8 / 1.3 beats snap to 1.0 / 1.5, overshooting the measure by two.
        let plan = quantize(5, &stress(&[0, 2]), 4.0).unwrap();
        assert_close(plan.total_beats(), 4.0);
        assert_close(plan.durations()[4], -1.0);
    }

    #[test]
    fn test_out_of_range_stress_is_ignored() {
        let plain = quantize(2, &StressMap::new(), 4.0).unwrap();
        let stressed = quantize(2, &stress(&[7]), 4.0).unwrap();
        assert_eq!(plain, stressed);
    }

    #[test]
    fn test_sum_and_length_invariants_hold_everywhere() {
        for n in 1..=40 {
            for pattern in [vec![], vec![0], vec![0, 2], (0..n).collect::<Vec<_>>()] {
                let stressed: StressMap = pattern.into_iter().filter(|&i| i < n).collect();
                let plan = quantize(n, &stressed, 4.0).unwrap();
                assert_eq!(plan.len(), n);
                assert_close(plan.total_beats(), 4.0);
            }
        }
    }

    #[test]
    fn test_custom_measure_length() {
        let quantizer = Quantizer::new(3.0, 0.5).unwrap();
        let plan = quantizer.quantize(6, &StressMap::new()).unwrap();
        assert_eq!(plan.beats_per_measure(), 3.0);
        assert_close(plan.total_beats(), 3.0);
    }

    #[test]
    fn test_rejects_nonpositive_measure() {
        assert!(Quantizer::new(0.0, 0.5).is_err());
        assert!(Quantizer::new(4.0, -1.0).is_err());
    }
}
