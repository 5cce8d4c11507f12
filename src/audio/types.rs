//! Audio-related type definitions
//!
//! Common types used throughout the transcription pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed pipeline sample rate. Every slice handed to an adapter is mono
/// PCM at this rate.
pub const SAMPLE_RATE: u32 = 16_000;

/// Audio data structure containing samples and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u8,
    pub duration_seconds: f64,
}

impl AudioData {
    pub fn from_samples(samples: Vec<f32>) -> Self {
        let duration_seconds = samples.len() as f64 / SAMPLE_RATE as f64;
        Self {
            samples,
            sample_rate: SAMPLE_RATE,
            channels: 1,
            duration_seconds,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Audio processing errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio decode failed: {message}")]
    Decode { message: String },

    #[error("slice bounds [{start:.3}, {end:.3}) out of range for duration {duration:.3}")]
    Range { start: f64, end: f64, duration: f64 },

    #[error("audio processing failed: {message}")]
    Processing { message: String },
}
