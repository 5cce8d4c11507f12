//! ASR and diarization back-end interfaces
//!
//! The pipeline consumes back-ends exclusively through these capability
//! traits. Concrete implementations (in-process model, remote RPC, test
//! mock) are independent types selected at construction, not a hierarchy.

pub mod types;

pub use types::*;

use crate::audio::AudioData;
use async_trait::async_trait;

/// Speech-to-text capability for one audio window.
#[async_trait]
pub trait AsrAdapter: Send + Sync {
    /// Transcribe a mono 16 kHz slice. Returned segment times must be
    /// absolute (shifted by `request.start_seconds`).
    async fn transcribe(
        &self,
        audio: &AudioData,
        request: &TranscribeRequest,
    ) -> Result<WindowTranscript, AdapterError>;

    /// Release transient model memory. Idempotent; must not invalidate
    /// loaded models.
    async fn release_memory(&self);
}

/// Speaker segmentation capability for one audio window.
#[async_trait]
pub trait DiarizerAdapter: Send + Sync {
    /// Segment a slice into ordered speaker turns with window-relative
    /// times. An empty result is valid (silence, single indistinct voice).
    async fn segment(&self, audio: &AudioData) -> Result<Vec<SpeakerSegment>, DiarizerError>;
}
