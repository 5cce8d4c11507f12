//! Transcript assembly
//!
//! Takes the deduplicated, chronologically sorted window transcripts and
//! produces the single run output: ordered segments, a per-speaker index,
//! and the contiguous full-text rendering.

use crate::adapters::{SpeechSegment, WindowTranscript};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Speaker id assigned when no diarizer was configured.
pub const DEFAULT_SPEAKER_ID: &str = "speaker_0";

/// Merged run output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// All speech segments, ascending by start time
    pub segments: Vec<SpeechSegment>,
    /// Segments grouped by speaker; the key set equals the speaker ids
    /// present in `segments`
    pub speakers: BTreeMap<String, Vec<SpeechSegment>>,
    /// Space-joined segment texts in chronological order, trimmed
    pub full_text: String,
    pub metadata: TranscriptMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMetadata {
    pub generated_at: DateTime<Utc>,
    pub total_windows: usize,
    /// Human-readable windowing summary, e.g. `"30s windows with 5s overlap"`
    pub windowing_summary: String,
}

/// Merge deduplicated window transcripts into the final transcript.
///
/// Speaker ids provided by the diarizer are preserved verbatim; segments
/// without one fall back to [`DEFAULT_SPEAKER_ID`]. Ids are not unified
/// across windows.
pub fn merge_transcripts(
    transcripts: Vec<WindowTranscript>,
    windowing_summary: impl Into<String>,
) -> Transcript {
    let total_windows = transcripts.len();

    let mut segments: Vec<SpeechSegment> = Vec::new();
    for window in transcripts {
        for mut segment in window.segments {
            if segment.text.trim().is_empty() {
                continue;
            }
            if segment.speaker_id.is_none() {
                segment.speaker_id = Some(DEFAULT_SPEAKER_ID.to_string());
            }
            segments.push(segment);
        }
    }
    segments.sort_by(|a, b| a.start_seconds.total_cmp(&b.start_seconds));

    let mut speakers: BTreeMap<String, Vec<SpeechSegment>> = BTreeMap::new();
    for segment in &segments {
        let speaker = segment
            .speaker_id
            .clone()
            .unwrap_or_else(|| DEFAULT_SPEAKER_ID.to_string());
        speakers.entry(speaker).or_default().push(segment.clone());
    }

    let full_text = segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string();

    info!(
        "merged {} windows into {} segments across {} speaker(s)",
        total_windows,
        segments.len(),
        speakers.len()
    );

    Transcript {
        segments,
        speakers,
        full_text,
        metadata: TranscriptMetadata {
            generated_at: Utc::now(),
            total_windows,
            windowing_summary: windowing_summary.into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(index: usize, start: f64, end: f64, segments: Vec<SpeechSegment>) -> WindowTranscript {
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        WindowTranscript {
            index,
            start_seconds: start,
            end_seconds: end,
            text,
            segments,
        }
    }

    #[test]
    fn segments_sort_chronologically_across_windows() {
        let transcript = merge_transcripts(
            vec![
                window(1, 0.0, 30.0, vec![SpeechSegment::new(0.0, 10.0, "first")]),
                window(2, 25.0, 55.0, vec![SpeechSegment::new(26.0, 40.0, "second")]),
            ],
            "30s windows with 5s overlap",
        );

        assert_eq!(transcript.segments.len(), 2);
        assert!(transcript
            .segments
            .windows(2)
            .all(|pair| pair[0].start_seconds <= pair[1].start_seconds));
        assert_eq!(transcript.full_text, "first second");
    }

    #[test]
    fn missing_speakers_collapse_to_the_default() {
        let transcript = merge_transcripts(
            vec![window(
                1,
                0.0,
                30.0,
                vec![SpeechSegment::new(0.0, 10.0, "hello there")],
            )],
            "fixed 30s windows",
        );

        assert_eq!(transcript.speakers.len(), 1);
        assert!(transcript.speakers.contains_key(DEFAULT_SPEAKER_ID));
    }

    #[test]
    fn diarized_speaker_ids_are_preserved_verbatim() {
        let mut seg_a = SpeechSegment::new(0.0, 10.0, "question");
        seg_a.speaker_id = Some("SPEAKER_01".to_string());
        let mut seg_b = SpeechSegment::new(10.0, 20.0, "answer");
        seg_b.speaker_id = Some("SPEAKER_02".to_string());

        let transcript = merge_transcripts(
            vec![window(1, 0.0, 30.0, vec![seg_a, seg_b])],
            "fixed 30s windows",
        );

        let speakers: Vec<&String> = transcript.speakers.keys().collect();
        assert_eq!(speakers, vec!["SPEAKER_01", "SPEAKER_02"]);
        assert_eq!(transcript.speakers["SPEAKER_01"].len(), 1);
    }

    #[test]
    fn speaker_set_matches_segment_speakers() {
        let mut seg = SpeechSegment::new(5.0, 9.0, "solo");
        seg.speaker_id = Some("SPEAKER_07".to_string());
        let transcript = merge_transcripts(
            vec![window(1, 0.0, 30.0, vec![seg])],
            "fixed 30s windows",
        );

        let from_segments: std::collections::BTreeSet<_> = transcript
            .segments
            .iter()
            .filter_map(|s| s.speaker_id.clone())
            .collect();
        let from_map: std::collections::BTreeSet<_> =
            transcript.speakers.keys().cloned().collect();
        assert_eq!(from_segments, from_map);
    }

    #[test]
    fn empty_segments_are_dropped_from_output() {
        let transcript = merge_transcripts(
            vec![window(
                1,
                0.0,
                30.0,
                vec![
                    SpeechSegment::new(0.0, 5.0, "   "),
                    SpeechSegment::new(5.0, 10.0, "kept"),
                ],
            )],
            "fixed 30s windows",
        );

        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.full_text, "kept");
    }

    #[test]
    fn full_text_is_trimmed_joined_segment_text() {
        let transcript = merge_transcripts(
            vec![
                window(1, 0.0, 30.0, vec![SpeechSegment::new(0.0, 10.0, " alpha ")]),
                window(2, 25.0, 55.0, vec![SpeechSegment::new(30.0, 40.0, "beta ")]),
            ],
            "30s windows with 5s overlap",
        );
        assert_eq!(transcript.full_text, "alpha beta");
    }

    #[test]
    fn metadata_records_window_count() {
        let transcript = merge_transcripts(
            vec![window(1, 0.0, 30.0, vec![SpeechSegment::new(0.0, 10.0, "x")])],
            "30s windows with 5s overlap",
        );
        assert_eq!(transcript.metadata.total_windows, 1);
        assert_eq!(
            transcript.metadata.windowing_summary,
            "30s windows with 5s overlap"
        );
    }
}
