//! Overlap deduplication
//!
//! Adjacent windows produced by the overlapping policy transcribe the same
//! few seconds twice. This component removes the duplicated leading text
//! from each window when, and only when, it truly repeats the previous
//! window's trailing text. Detection escalates through three stages:
//! exact suffix/prefix match, similarity over the time-proportional spans,
//! and a flexible descending-length scan. When nothing matches, the window
//! is left untouched: leaving a duplicate beats losing speech.

pub mod text;

use crate::adapters::{SpeechSegment, WindowTranscript};
use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Longest exact suffix/prefix candidate considered, in chars.
const MAX_EXACT_OVERLAP_CHARS: usize = 100;

/// Deduplication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Shortest overlap worth trimming, in chars
    pub min_overlap_chars: usize,
    /// Similarity needed for the time-proportional match
    pub similarity_threshold: f64,
    /// Similarity needed for the descending-length match
    pub flex_similarity_threshold: f64,
    /// Words that alone never constitute an overlap
    pub stop_phrases: Vec<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            min_overlap_chars: 6,
            similarity_threshold: 0.7,
            flex_similarity_threshold: 0.6,
            stop_phrases: [
                "the", "and", "a", "an", "of", "to", "in", "so", "yes", "no", "okay", "um", "uh",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl DedupConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_overlap_chars == 0 {
            return Err(ConfigError::InvalidDedup {
                message: "min_overlap_chars must be at least 1".to_string(),
            });
        }
        for (name, value) in [
            ("similarity_threshold", self.similarity_threshold),
            ("flex_similarity_threshold", self.flex_similarity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidDedup {
                    message: format!("{} must be in [0, 1], got {}", name, value),
                });
            }
        }
        Ok(())
    }
}

/// Removes duplicated overlap text between adjacent window transcripts.
pub struct OverlapDeduplicator {
    config: DedupConfig,
    stop_phrases: HashSet<String>,
}

impl OverlapDeduplicator {
    pub fn new(config: DedupConfig) -> Self {
        let stop_phrases = config
            .stop_phrases
            .iter()
            .map(|p| text::normalize(p))
            .collect();
        Self {
            config,
            stop_phrases,
        }
    }

    /// Deduplicate a chronologically sorted transcript sequence.
    ///
    /// Only the head of each window is ever trimmed; the previous window
    /// is emitted unchanged. Running the pass twice yields the same
    /// output as running it once.
    pub fn deduplicate(&self, transcripts: Vec<WindowTranscript>) -> Vec<WindowTranscript> {
        let mut result: Vec<WindowTranscript> = Vec::with_capacity(transcripts.len());

        for current in transcripts {
            let Some(previous) = result.last() else {
                result.push(current);
                continue;
            };

            let temporal_overlap = previous.end_seconds - current.start_seconds;
            if temporal_overlap <= 0.0 {
                result.push(current);
                continue;
            }

            let overlap_chars = self.find_overlap_chars(previous, &current, temporal_overlap);
            if overlap_chars > 0 {
                debug!(
                    "window {}: trimming {} overlap chars repeated from window {}",
                    current.index, overlap_chars, previous.index
                );
                result.push(trim_head(current, overlap_chars));
            } else {
                result.push(current);
            }
        }

        result
    }

    /// Number of chars to trim from the head of `current.text`; zero when
    /// no true repetition was detected.
    fn find_overlap_chars(
        &self,
        previous: &WindowTranscript,
        current: &WindowTranscript,
        temporal_overlap: f64,
    ) -> usize {
        let prev_chars: Vec<char> = previous.text.chars().collect();
        let curr_chars: Vec<char> = current.text.chars().collect();
        if prev_chars.is_empty() || curr_chars.is_empty() {
            return 0;
        }

        if let Some(len) = self.find_exact(&prev_chars, &curr_chars) {
            return len;
        }

        let prev_duration = previous.duration_seconds();
        if prev_duration <= 0.0 {
            return 0;
        }
        let ratio = (temporal_overlap / prev_duration).clamp(0.0, 1.0);
        let estimated = ((prev_chars.len() as f64 * ratio).round() as usize)
            .min(prev_chars.len())
            .min(curr_chars.len());

        if let Some(len) = self.find_similar(&prev_chars, &curr_chars, estimated) {
            return len;
        }
        self.find_flexible(&prev_chars, &curr_chars, estimated)
            .unwrap_or(0)
    }

    /// Longest suffix of `prev` that is literally the prefix of `curr`.
    fn find_exact(&self, prev: &[char], curr: &[char]) -> Option<usize> {
        let max_len = prev.len().min(curr.len()).min(MAX_EXACT_OVERLAP_CHARS);
        for len in (self.config.min_overlap_chars..=max_len).rev() {
            if prev[prev.len() - len..] != curr[..len] {
                continue;
            }
            let candidate: String = curr[..len].iter().collect();
            if candidate.trim().chars().count() < self.config.min_overlap_chars {
                continue;
            }
            if self.is_stop_phrases_only(&candidate) {
                continue;
            }
            return Some(len);
        }
        None
    }

    /// Compare the time-proportional suffix of `prev` against the equally
    /// long prefix of `curr`.
    fn find_similar(&self, prev: &[char], curr: &[char], estimated: usize) -> Option<usize> {
        if estimated < self.config.min_overlap_chars {
            return None;
        }
        let prev_span: String = prev[prev.len() - estimated..].iter().collect();
        let curr_span: String = curr[..estimated].iter().collect();
        let score = similarity(&prev_span, &curr_span);
        if score >= self.config.similarity_threshold {
            debug!("similarity overlap accepted at {} chars ({:.2})", estimated, score);
            Some(estimated)
        } else {
            None
        }
    }

    /// Walk candidate lengths down from the estimate, accepting the first
    /// span that clears the looser flexible threshold.
    fn find_flexible(&self, prev: &[char], curr: &[char], estimated: usize) -> Option<usize> {
        let upper = estimated.min(prev.len()).min(curr.len());
        if upper < self.config.min_overlap_chars {
            return None;
        }
        for len in (self.config.min_overlap_chars..=upper).rev() {
            let prev_span: String = prev[prev.len() - len..].iter().collect();
            let curr_span: String = curr[..len].iter().collect();
            let score = similarity(&prev_span, &curr_span);
            if score >= self.config.flex_similarity_threshold {
                debug!("flexible overlap accepted at {} chars ({:.2})", len, score);
                return Some(len);
            }
        }
        None
    }

    fn is_stop_phrases_only(&self, candidate: &str) -> bool {
        let normalized = text::normalize(candidate);
        let mut words = normalized.split_whitespace().peekable();
        if words.peek().is_none() {
            return true;
        }
        words.all(|w| self.stop_phrases.contains(w))
    }
}

/// Combined similarity in `[0, 1]`: word-set Jaccard weighted 0.7 plus
/// character-frequency overlap weighted 0.3.
fn similarity(a: &str, b: &str) -> f64 {
    let a = text::normalize(a);
    let b = text::normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    let common = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    let word_similarity = if union > 0 {
        common as f64 / union as f64
    } else {
        0.0
    };

    word_similarity * 0.7 + char_frequency_overlap(&a, &b) * 0.3
}

fn char_frequency_overlap(a: &str, b: &str) -> f64 {
    let count = |s: &str| {
        let mut counts: HashMap<char, usize> = HashMap::new();
        for c in s.chars() {
            *counts.entry(c).or_default() += 1;
        }
        counts
    };
    let counts_a = count(a);
    let counts_b = count(b);

    let common: usize = counts_a
        .iter()
        .map(|(c, n)| n.min(counts_b.get(c).unwrap_or(&0)))
        .sum();
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 0.0;
    }
    2.0 * common as f64 / total as f64
}

/// Remove `overlap_chars` from the head of the window text and trim the
/// leading segments by the same number of characters.
fn trim_head(mut transcript: WindowTranscript, overlap_chars: usize) -> WindowTranscript {
    let chars: Vec<char> = transcript.text.chars().collect();
    let cut = overlap_chars.min(chars.len());
    transcript.text = chars[cut..].iter().collect::<String>().trim_start().to_string();

    let mut remaining = cut;
    let mut segments: Vec<SpeechSegment> = Vec::with_capacity(transcript.segments.len());
    for mut segment in transcript.segments.into_iter() {
        if remaining == 0 {
            segments.push(segment);
            continue;
        }
        let segment_chars = segment.text.chars().count();
        if remaining >= segment_chars {
            remaining -= segment_chars;
            // Account for the separator the window text carried
            remaining = remaining.saturating_sub(1);
            continue;
        }
        let seg_chars: Vec<char> = segment.text.chars().collect();
        segment.text = seg_chars[remaining..]
            .iter()
            .collect::<String>()
            .trim_start()
            .to_string();
        remaining = 0;
        if !segment.text.is_empty() {
            segments.push(segment);
        }
    }
    transcript.segments = segments;
    transcript
}
