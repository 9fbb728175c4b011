#![forbid(unsafe_code)]

use std::collections::BTreeMap;

pub const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Raw counts for one text. Everything the feature families need is computed
/// in a single pass over the characters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextStats {
    pub char_count: usize,
    /// Lowercased words in text order.
    pub words: Vec<String>,
    /// Alphanumeric characters that belong to words.
    pub letter_count: usize,
    pub sentence_count: usize,
    pub syllable_count: usize,
}

impl TextStats {
    pub fn analyze(text: &str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let mut words = Vec::new();
        let mut current = String::new();
        let mut letter_count = 0usize;
        let mut sentence_count = 0usize;
        let mut sentence_has_word = false;

        for (i, &c) in chars.iter().enumerate() {
            if c.is_alphanumeric() {
                current.extend(c.to_lowercase());
                letter_count += 1;
                sentence_has_word = true;
                continue;
            }
            let joins_word = is_apostrophe(c)
                && !current.is_empty()
                && chars.get(i + 1).is_some_and(|n| n.is_alphanumeric());
            if joins_word {
                current.push('\'');
                continue;
            }
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            if SENTENCE_TERMINATORS.contains(&c) && sentence_has_word {
                sentence_count += 1;
                sentence_has_word = false;
            }
        }
        if !current.is_empty() {
            words.push(current);
        }
        if sentence_has_word {
            sentence_count += 1;
        }

        let syllable_count = words.iter().map(|w| count_syllables(w)).sum();
        Self {
            char_count: chars.len(),
            words,
            letter_count,
            sentence_count,
            syllable_count,
        }
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Occurrences per distinct word, in lexicographic order.
    pub fn term_counts(&self) -> BTreeMap<&str, u32> {
        let mut counts = BTreeMap::new();
        for w in &self.words {
            *counts.entry(w.as_str()).or_insert(0u32) += 1;
        }
        counts
    }
}

fn is_apostrophe(c: char) -> bool {
    c == '\'' || c == '\u{2019}'
}

/// Vowel-group heuristic: one syllable per run of vowels, a trailing silent
/// `e` dropped (but not in `-le`), at least one per word.
pub fn count_syllables(word: &str) -> usize {
    let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return 1;
    }
    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut groups = 0usize;
    let mut prev_vowel = false;
    for &c in &letters {
        let v = is_vowel(c);
        if v && !prev_vowel {
            groups += 1;
        }
        prev_vowel = v;
    }
    let n = letters.len();
    if groups > 1 && letters[n - 1] == 'e' && !(n >= 2 && letters[n - 2] == 'l') {
        groups -= 1;
    }
    groups.max(1)
}

/// Count of each symbol in `symbols`, returned in the same order.
pub fn symbol_counts(text: &str, symbols: &[char]) -> Vec<usize> {
    let mut counts = vec![0usize; symbols.len()];
    for c in text.chars() {
        if let Some(pos) = symbols.iter().position(|s| *s == c) {
            counts[pos] += 1;
        }
    }
    counts
}
