//! Shared test fixtures: a synthetic audio source and scripted adapters.

use async_trait::async_trait;
use chunkscribe::adapters::{
    AdapterError, AsrAdapter, DiarizerAdapter, DiarizerError, SpeakerSegment, TranscribeRequest,
    WindowTranscript,
};
use chunkscribe::audio::{AudioData, AudioError, AudioSource, SAMPLE_RATE};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// In-memory source producing a quiet tone of the given duration.
pub struct SyntheticSource {
    duration_seconds: f64,
}

impl SyntheticSource {
    pub fn new(duration_seconds: f64) -> Self {
        Self { duration_seconds }
    }
}

impl AudioSource for SyntheticSource {
    fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    fn slice(&self, start_seconds: f64, end_seconds: f64) -> Result<AudioData, AudioError> {
        if start_seconds < 0.0
            || end_seconds <= start_seconds
            || end_seconds > self.duration_seconds + 1e-6
        {
            return Err(AudioError::Range {
                start: start_seconds,
                end: end_seconds,
                duration: self.duration_seconds,
            });
        }
        let samples =
            ((end_seconds - start_seconds) * SAMPLE_RATE as f64).round() as usize;
        Ok(AudioData::from_samples(vec![0.05; samples]))
    }
}

/// One scripted response for a transcription attempt.
#[derive(Clone)]
pub enum Attempt {
    Text(&'static str),
    /// Sleep before answering, to scramble completion order
    Delayed(&'static str, u64),
    Transient(&'static str),
    Fatal(&'static str),
    /// Sleep, then fail fatally
    DelayedFatal(&'static str, u64),
    Empty,
}

/// ASR mock replaying a per-window script of attempt outcomes. The last
/// entry repeats once the script is exhausted.
pub struct ScriptedAsr {
    script: Mutex<HashMap<usize, Vec<Attempt>>>,
    attempt_counts: Mutex<HashMap<usize, usize>>,
    release_calls: AtomicUsize,
    /// Window the adapter should pause on, if any
    gate_window: Option<usize>,
    pub gate_reached: Notify,
    pub gate_release: Notify,
}

impl ScriptedAsr {
    pub fn new(script: HashMap<usize, Vec<Attempt>>) -> Self {
        Self {
            script: Mutex::new(script),
            attempt_counts: Mutex::new(HashMap::new()),
            release_calls: AtomicUsize::new(0),
            gate_window: None,
            gate_reached: Notify::new(),
            gate_release: Notify::new(),
        }
    }

    /// Repeat the same text for every window.
    pub fn uniform(text: &'static str) -> Self {
        let mut script = HashMap::new();
        script.insert(0, vec![Attempt::Text(text)]);
        Self::new(script)
    }

    pub fn with_gate(mut self, window_index: usize) -> Self {
        self.gate_window = Some(window_index);
        self
    }

    pub fn release_memory_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    pub fn attempts_for(&self, window_index: usize) -> usize {
        *self
            .attempt_counts
            .lock()
            .unwrap()
            .get(&window_index)
            .unwrap_or(&0)
    }

    fn next_attempt(&self, window_index: usize) -> Attempt {
        let script = self.script.lock().unwrap();
        let mut counts = self.attempt_counts.lock().unwrap();
        let attempt_number = counts.entry(window_index).or_insert(0);
        *attempt_number += 1;

        let entries = script
            .get(&window_index)
            .or_else(|| script.get(&0))
            .cloned()
            .unwrap_or_else(|| vec![Attempt::Empty]);
        entries
            .get(*attempt_number - 1)
            .cloned()
            .unwrap_or_else(|| entries.last().cloned().unwrap())
    }
}

#[async_trait]
impl AsrAdapter for ScriptedAsr {
    async fn transcribe(
        &self,
        _audio: &AudioData,
        request: &TranscribeRequest,
    ) -> Result<WindowTranscript, AdapterError> {
        if self.gate_window == Some(request.window_index) {
            self.gate_reached.notify_one();
            self.gate_release.notified().await;
        }

        match self.next_attempt(request.window_index) {
            Attempt::Text(text) => Ok(WindowTranscript {
                index: request.window_index,
                start_seconds: request.start_seconds,
                end_seconds: request.end_seconds,
                text: text.to_string(),
                segments: Vec::new(),
            }),
            Attempt::Delayed(text, millis) => {
                tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
                Ok(WindowTranscript {
                    index: request.window_index,
                    start_seconds: request.start_seconds,
                    end_seconds: request.end_seconds,
                    text: text.to_string(),
                    segments: Vec::new(),
                })
            }
            Attempt::Transient(message) => Err(AdapterError::Transient {
                message: message.to_string(),
            }),
            Attempt::Fatal(message) => Err(AdapterError::Fatal {
                message: message.to_string(),
            }),
            Attempt::DelayedFatal(message, millis) => {
                tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
                Err(AdapterError::Fatal {
                    message: message.to_string(),
                })
            }
            Attempt::Empty => Err(AdapterError::EmptyOutput),
        }
    }

    async fn release_memory(&self) {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Diarizer mock splitting every window into two equal speaker turns with
/// window-relative times.
pub struct SplitDiarizer;

#[async_trait]
impl DiarizerAdapter for SplitDiarizer {
    async fn segment(&self, audio: &AudioData) -> Result<Vec<SpeakerSegment>, DiarizerError> {
        let half = audio.duration_seconds / 2.0;
        Ok(vec![
            SpeakerSegment {
                speaker_id: "SPEAKER_00".to_string(),
                start_seconds: 0.0,
                end_seconds: half,
            },
            SpeakerSegment {
                speaker_id: "SPEAKER_01".to_string(),
                start_seconds: half,
                end_seconds: audio.duration_seconds,
            },
        ])
    }
}

/// Diarizer mock that always fails.
pub struct FailingDiarizer;

#[async_trait]
impl DiarizerAdapter for FailingDiarizer {
    async fn segment(&self, _audio: &AudioData) -> Result<Vec<SpeakerSegment>, DiarizerError> {
        Err(DiarizerError {
            message: "embedding model unavailable".to_string(),
        })
    }
}
