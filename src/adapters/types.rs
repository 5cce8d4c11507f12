//! Adapter-facing type definitions
//!
//! The transcript and speaker types exchanged with ASR and diarization
//! back-ends, and the error taxonomy the scheduler matches on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One span of transcribed speech. Times are absolute source seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSegment {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl SpeechSegment {
    pub fn new(start_seconds: f64, end_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            start_seconds,
            end_seconds,
            text: text.into(),
            speaker_id: None,
            confidence: None,
        }
    }
}

/// Per-window ASR output prior to merging.
///
/// Segment times are absolute: the adapter shifts them by the window start
/// before returning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowTranscript {
    pub index: usize,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
    pub segments: Vec<SpeechSegment>,
}

impl WindowTranscript {
    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

/// One diarized speaker turn inside a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerSegment {
    pub speaker_id: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

/// Request context handed to the ASR adapter alongside the audio slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeRequest {
    pub model_id: String,
    pub window_index: usize,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

/// ASR adapter failures. The scheduler decides retry behavior by variant,
/// never by inspecting messages.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// Retryable failure; consumes one attempt
    #[error("transient adapter failure: {message}")]
    Transient { message: String },

    /// Non-retryable failure; fails the window and halts the schedule
    #[error("fatal adapter failure: {message}")]
    Fatal { message: String },

    /// The adapter produced no usable text; consumes one attempt
    #[error("adapter produced empty output")]
    EmptyOutput,
}

impl AdapterError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AdapterError::Fatal { .. })
    }
}

/// Diarizer failures are never fatal to a window.
#[derive(Debug, Clone, Error)]
#[error("diarization failed: {message}")]
pub struct DiarizerError {
    pub message: String,
}
