//! Text utilities for transcript comparison and quality checks
//!
//! Comparison always runs over normalized text; the canonical transcript
//! text is never normalized, only trimmed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Normalize for comparison: strip punctuation, collapse whitespace,
/// lowercase. Works on any script; alphanumeric characters survive.
pub fn normalize(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Collapse runs of three or more identical words down to one occurrence.
/// ASR decoders occasionally loop on a word; shorter repeats are usually
/// legitimate speech.
pub fn collapse_repeated_words(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 3 {
        return text.trim().to_string();
    }

    let mut kept: Vec<&str> = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        let run_end = words[i..]
            .iter()
            .position(|w| *w != words[i])
            .map(|offset| i + offset)
            .unwrap_or(words.len());
        let run_len = run_end - i;
        if run_len >= 3 {
            kept.push(words[i]);
        } else {
            kept.extend(&words[i..run_end]);
        }
        i = run_end;
    }
    kept.join(" ")
}

/// Transcript quality summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub quality_score: f64,
    pub total_words: usize,
    pub unique_words: usize,
    pub repetition_ratio: f64,
    pub suspicious_patterns: Vec<String>,
    pub is_acceptable: bool,
}

/// Validate transcript quality: repetition ratio plus detection of a
/// single word dominating the text, which indicates decoder looping.
pub fn validate_quality(text: &str) -> QualityReport {
    let normalized = normalize(text);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let total_words = words.len();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in &words {
        *counts.entry(word).or_default() += 1;
    }
    let unique_words = counts.len();

    let repetition_ratio = if total_words > 0 {
        unique_words as f64 / total_words as f64
    } else {
        1.0
    };

    let mut suspicious_patterns = Vec::new();
    for (word, count) in &counts {
        if total_words >= 10 && *count as f64 > total_words as f64 * 0.3 {
            suspicious_patterns.push(format!(
                "'{}' appears {} times ({:.1}%)",
                word,
                count,
                *count as f64 / total_words as f64 * 100.0
            ));
        }
    }
    suspicious_patterns.sort();

    let quality_score = repetition_ratio * 100.0;
    QualityReport {
        quality_score,
        total_words,
        unique_words,
        repetition_ratio,
        is_acceptable: quality_score > 50.0 && suspicious_patterns.is_empty(),
        suspicious_patterns,
    }
}
