// Silence trimming.
//
// Finds the non-silent region of a clip and re-pads it with a fixed margin
// of digital silence on both ends. Detection slides a window of
// `min_silence_run_ms` across the clip in 1 ms steps; a window whose RMS
// level is at or below `silence_threshold_db` (dBFS) is silent, and the
// union of silent windows is the clip's silence. Whatever is left is
// non-silent, split into contiguous spans.
//
// The kept region runs from the start of the first non-silent span to the
// end of the last one, so pauses inside a phrase survive. A clip with no
// non-silent span at all is returned untouched as
// `TrimOutcome::SilenceDetectionEmpty`; that is advisory, and callers
// should expect later duration checks on such a clip to fail.
//
// Trimming is close to idempotent: the padding is digital silence, so a
// second pass finds the same span and re-applies the same padding.

use crate::clip::AudioClip;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimParams {
    /// Windows at or below this level (dBFS) count as silence.
    pub silence_threshold_db: f64,
    /// Length of the detection window in milliseconds.
    pub min_silence_run_ms: u32,
    /// Silence added before and after the kept region, in milliseconds.
    pub padding_ms: u32,
}

impl Default for TrimParams {
    fn default() -> Self {
        Self {
            silence_threshold_db: -40.0,
            min_silence_run_ms: 10,
            padding_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrimOutcome {
    /// The clip was cut to `span` (in source frames) and padded.
    Trimmed { clip: AudioClip, span: Range<usize> },
    /// Nothing above the threshold; the original clip, unchanged.
    SilenceDetectionEmpty(AudioClip),
}

impl TrimOutcome {
    pub fn clip(&self) -> &AudioClip {
        match self {
            TrimOutcome::Trimmed { clip, .. } | TrimOutcome::SilenceDetectionEmpty(clip) => clip,
        }
    }

    pub fn into_clip(self) -> AudioClip {
        match self {
            TrimOutcome::Trimmed { clip, .. } | TrimOutcome::SilenceDetectionEmpty(clip) => clip,
        }
    }

    pub fn is_empty_detection(&self) -> bool {
        matches!(self, TrimOutcome::SilenceDetectionEmpty(_))
    }
}

/// Trim leading and trailing silence and re-pad.
pub fn trim(clip: &AudioClip, params: &TrimParams) -> TrimOutcome {
    let spans = detect_nonsilent(clip, params);
    let (Some(first), Some(last)) = (spans.first(), spans.last()) else {
        return TrimOutcome::SilenceDetectionEmpty(clip.clone());
    };
    let span = first.start..last.end;

    let pad_frames = ms_to_frames(params.padding_ms, clip.format.sample_rate);
    let ch = clip.channel_count();
    let kept = clip.slice_frames(span.start, span.end);

    let mut samples = Vec::with_capacity(kept.samples.len() + 2 * pad_frames * ch);
    samples.resize(pad_frames * ch, 0.0);
    samples.extend_from_slice(&kept.samples);
    samples.resize(samples.len() + pad_frames * ch, 0.0);

    TrimOutcome::Trimmed {
        clip: AudioClip::new(clip.name.clone(), clip.format, samples),
        span,
    }
}

/// Contiguous non-silent frame ranges, in order.
pub fn detect_nonsilent(clip: &AudioClip, params: &TrimParams) -> Vec<Range<usize>> {
    let frames = clip.frames();
    if frames == 0 {
        return Vec::new();
    }
    let rate = clip.format.sample_rate;
    let window = ms_to_frames(params.min_silence_run_ms, rate).clamp(1, frames);
    let step = ms_to_frames(1, rate).max(1);
    let energy = FrameEnergy::new(clip);

    // Window starts, always including the final window flush with the end.
    let last_start = frames - window;
    let mut starts: Vec<usize> = (0..=last_start).step_by(step).collect();
    if starts.last() != Some(&last_start) {
        starts.push(last_start);
    }

    let mut silent: Vec<Range<usize>> = Vec::new();
    for start in starts {
        let end = start + window;
        if energy.level_db(start, end) > params.silence_threshold_db {
            continue;
        }
        match silent.last_mut() {
            Some(prev) if start <= prev.end => prev.end = prev.end.max(end),
            _ => silent.push(start..end),
        }
    }

    let mut nonsilent = Vec::new();
    let mut cursor = 0;
    for range in silent {
        if range.start > cursor {
            nonsilent.push(cursor..range.start);
        }
        cursor = cursor.max(range.end);
    }
    if cursor < frames {
        nonsilent.push(cursor..frames);
    }
    nonsilent
}

fn ms_to_frames(ms: u32, sample_rate: u32) -> usize {
    (ms as f64 * sample_rate as f64 / 1000.0).round() as usize
}

/// Prefix sums of per-frame energy, for O(1) window RMS.
struct FrameEnergy {
    prefix: Vec<f64>,
    channels: usize,
}

impl FrameEnergy {
    fn new(clip: &AudioClip) -> Self {
        let channels = clip.channel_count();
        let mut prefix = Vec::with_capacity(clip.frames() + 1);
        let mut total = 0.0f64;
        prefix.push(total);
        for frame in clip.samples.chunks_exact(channels) {
            total += frame.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>();
            prefix.push(total);
        }
        Self { prefix, channels }
    }

    /// RMS level of frames `[start, end)` in dBFS.
    fn level_db(&self, start: usize, end: usize) -> f64 {
        let count = ((end - start) * self.channels) as f64;
        let mean_square = (self.prefix[end] - self.prefix[start]) / count;
        if mean_square <= 0.0 {
            f64::NEG_INFINITY
        } else {
            10.0 * mean_square.log10()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipFormat;

    const RATE: u32 = 8000;

    /// `lead` seconds of silence, `tone` seconds of a 440 Hz sine at half
    /// scale, `tail` seconds of silence.
    fn framed_tone(lead: f64, tone: f64, tail: f64) -> AudioClip {
        let secs = |s: f64| (s * RATE as f64).round() as usize;
        let mut samples = vec![0.0f32; secs(lead)];
        samples.extend((0..secs(tone)).map(|i| {
            let t = i as f32 / RATE as f32;
            0.5 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
        }));
        samples.extend(std::iter::repeat_n(0.0, secs(tail)));
        AudioClip::new("tone", ClipFormat::pcm16(1, RATE), samples)
    }

    #[test]
    fn test_trims_and_pads() {
        let clip = framed_tone(0.3, 0.4, 0.3);
        let outcome = trim(&clip, &TrimParams::default());
        let TrimOutcome::Trimmed { clip: trimmed, span } = &outcome else {
            panic!("expected a trimmed clip");
        };
        // Span hugs the tone to within one detection window.
        assert!(span.start.abs_diff(2400) <= 80, "start {}", span.start);
        assert!(span.end.abs_diff(5600) <= 80, "end {}", span.end);
        assert!((trimmed.duration_secs() - 0.9).abs() < 0.02);
        // Padding is digital silence.
        assert!(trimmed.samples[..2000].iter().all(|&s| s == 0.0));
        assert!(trimmed.samples[trimmed.samples.len() - 2000..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_all_silent_is_advisory_and_unchanged() {
        let clip = AudioClip::silent("quiet", ClipFormat::pcm16(2, RATE), 4000);
        let outcome = trim(&clip, &TrimParams::default());
        assert!(outcome.is_empty_detection());
        assert_eq!(outcome.into_clip(), clip);
    }

    #[test]
    fn test_below_threshold_noise_counts_as_silence() {
        // -60 dBFS constant level is under the -40 dB threshold.
        let clip = AudioClip::new("hiss", ClipFormat::pcm16(1, RATE), vec![0.001; 8000]);
        assert!(trim(&clip, &TrimParams::default()).is_empty_detection());
    }

    #[test]
    fn test_inner_pause_is_kept() {
        let mut clip = framed_tone(0.1, 0.2, 0.2);
        let second = framed_tone(0.0, 0.2, 0.1);
        clip.samples.extend_from_slice(&second.samples);
        let spans = detect_nonsilent(&clip, &TrimParams::default());
        assert_eq!(spans.len(), 2);
        let outcome = trim(&clip, &TrimParams::default());
        // 0.2 tone + 0.2 pause + 0.2 tone + 2 * 0.25 padding.
        assert!((outcome.clip().duration_secs() - 1.1).abs() < 0.02);
    }

    #[test]
    fn test_trim_is_stable_when_repeated() {
        let params = TrimParams::default();
        let once = trim(&framed_tone(0.5, 0.6, 0.7), &params).into_clip();
        let twice = trim(&once, &params).into_clip();
        assert!((once.duration_secs() - twice.duration_secs()).abs() < 0.01);
    }

    #[test]
    fn test_clip_shorter_than_window() {
        let clip = AudioClip::new("blip", ClipFormat::pcm16(1, RATE), vec![0.5; 20]);
        let spans = detect_nonsilent(&clip, &TrimParams::default());
        assert_eq!(spans, vec![0..20]);
    }

    #[test]
    fn test_empty_clip() {
        let clip = AudioClip::new("none", ClipFormat::pcm16(1, RATE), Vec::new());
        assert!(trim(&clip, &TrimParams::default()).is_empty_detection());
    }
}
