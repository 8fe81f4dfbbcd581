// Syllable analysis for lyric lines.
//
// A lyric line is split on whitespace into words, each word is stripped of
// surrounding punctuation, and a `SyllableCounter` assigns it a syllable
// count. The resulting `LyricLine` is immutable: the pipeline reads its
// total syllable count to size the duration plan, and nothing downstream
// rewrites the text.
//
// Counting is a lexical-resource lookup behind the `SyllableCounter` trait.
// Two implementations ship here:
// - `HeuristicCounter`: English vowel-group counting with a handful of
//   suffix rules (silent final e, -ed, -es). Good enough for sung lyrics,
//   where a singer stretches or merges syllables anyway.
// - `LexiconCounter`: exact per-word overrides loaded from JSON, falling
//   back to the heuristic for words it does not know.
//
// Tokens with no letters at all (dashes, digits, stray punctuation) count
// as zero syllables and are dropped from the analyzed line.

use crate::error::MusicError;
use std::collections::HashMap;
use std::path::Path;

/// Source of per-word syllable counts.
pub trait SyllableCounter: Send + Sync {
    /// Number of syllables in `word`. Zero means "not a singable word".
    fn count(&self, word: &str) -> u32;
}

/// A word and the number of syllables it contributes to the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordSyllables {
    pub word: String,
    pub syllables: u32,
}

/// An analyzed lyric line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    /// The raw text as supplied by the caller.
    pub text: String,
    /// Singable words in order, with their syllable counts.
    pub words: Vec<WordSyllables>,
}

impl LyricLine {
    /// Split `text` into words and count each word's syllables.
    pub fn analyze(text: &str, counter: &dyn SyllableCounter) -> Self {
        let words = text
            .split_whitespace()
            .filter_map(|token| {
                let word = strip_punctuation(token);
                let syllables = counter.count(word);
                (syllables > 0).then(|| WordSyllables {
                    word: word.to_string(),
                    syllables,
                })
            })
            .collect();
        Self {
            text: text.to_string(),
            words,
        }
    }

    /// Sum of syllables across all words.
    pub fn total_syllables(&self) -> usize {
        self.words.iter().map(|w| w.syllables as usize).sum()
    }
}

fn strip_punctuation(token: &str) -> &str {
    token.trim_matches(|c: char| !c.is_alphanumeric())
}

// ---------------------------------------------------------------------------
// Heuristic counter
// ---------------------------------------------------------------------------

/// English syllable estimate from vowel groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl SyllableCounter for HeuristicCounter {
    fn count(&self, word: &str) -> u32 {
        count_vowel_groups(word)
    }
}

fn is_vowel(c: char, position: usize) -> bool {
    match c {
        'a' | 'e' | 'i' | 'o' | 'u' => true,
        // A leading y is a consonant ("yellow"); elsewhere it sings as a vowel.
        'y' => position > 0,
        _ => false,
    }
}

fn count_vowel_groups(word: &str) -> u32 {
    let letters: Vec<char> = word
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();
    if letters.is_empty() {
        return 0;
    }

    let mut groups = 0u32;
    let mut in_group = false;
    for (i, &c) in letters.iter().enumerate() {
        let vowel = is_vowel(c, i);
        if vowel && !in_group {
            groups += 1;
        }
        in_group = vowel;
    }

    if groups > 1 && has_silent_ending(&letters) {
        groups -= 1;
    }
    groups.max(1)
}

/// Whether the word ends in a vowel letter that is not pronounced as its
/// own syllable: "make", "jumped", "makes" (but not "table", "wanted",
/// "boxes", "agree").
fn has_silent_ending(letters: &[char]) -> bool {
    let n = letters.len();
    if n < 3 {
        return false;
    }
    let last = letters[n - 1];
    let prev = letters[n - 2];
    let before = letters[n - 3];

    match (prev, last) {
        ('e', 'd') => !matches!(before, 't' | 'd') && !is_vowel(before, n - 3),
        ('e', 's') => {
            !matches!(before, 's' | 'x' | 'z' | 'c' | 'g' | 'h') && !is_vowel(before, n - 3)
        }
        (_, 'e') => {
            if is_vowel(prev, n - 2) {
                return false;
            }
            // Consonant + "le" keeps its syllable ("ta-ble").
            !(prev == 'l' && !is_vowel(before, n - 3))
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Lexicon counter
// ---------------------------------------------------------------------------

/// Exact syllable counts for known words, heuristic for everything else.
#[derive(Debug, Clone, Default)]
pub struct LexiconCounter {
    entries: HashMap<String, u32>,
    fallback: HeuristicCounter,
}

impl LexiconCounter {
    /// Build from an in-memory map. Keys are matched case-insensitively.
    pub fn from_map(entries: HashMap<String, u32>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(word, count)| (word.to_lowercase(), count))
            .collect();
        Self {
            entries,
            fallback: HeuristicCounter,
        }
    }

    /// Load overrides from a JSON object of the form `{"word": count}`.
    pub fn load(path: &Path) -> Result<Self, MusicError> {
        let json = std::fs::read_to_string(path).map_err(|e| MusicError::io(path, e))?;
        let entries: HashMap<String, u32> =
            serde_json::from_str(&json).map_err(|source| MusicError::Lexicon {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_map(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SyllableCounter for LexiconCounter {
    fn count(&self, word: &str) -> u32 {
        match self.entries.get(&word.to_lowercase()) {
            Some(&count) => count,
            None => self.fallback.count(word),
        }
    }
}
