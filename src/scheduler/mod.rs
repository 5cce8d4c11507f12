//! Window scheduling
//!
//! Drives every planned window through its lifecycle: create the durable
//! record, materialize the audio slice, transcribe with retry and memory
//! discipline, optionally diarize, and persist the terminal state. The
//! scheduler is the only writer to the chunk store during a run.

use crate::adapters::{
    AdapterError, AsrAdapter, DiarizerAdapter, SpeakerSegment, SpeechSegment, TranscribeRequest,
    WindowTranscript,
};
use crate::audio::{slices, AudioSource};
use crate::cleanup::CleanupCoordinator;
use crate::config::ConfigError;
use crate::dedup::text;
use crate::pipeline::progress::{ProgressEvent, ProgressSink};
use crate::store::{ChunkRecord, ChunkStatus, ChunkStore, StoreError};
use crate::windowing::WindowSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Transcription attempts per window
    pub max_attempts: u32,
    /// Upper bound on the exponential backoff between attempts
    pub backoff_cap_seconds: f64,
    /// Per adapter call; exceeding it consumes an attempt
    pub per_window_timeout_seconds: f64,
    /// Unconditional memory release every N windows
    pub cleanup_period: usize,
    /// Windows processed in parallel; 1 keeps the run deterministic
    pub max_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_cap_seconds: 30.0,
            per_window_timeout_seconds: 300.0,
            cleanup_period: 5,
            max_concurrency: 1,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidScheduler {
                message: "max_attempts must be at least 1".to_string(),
            });
        }
        if self.backoff_cap_seconds <= 0.0 {
            return Err(ConfigError::InvalidScheduler {
                message: "backoff_cap_seconds must be positive".to_string(),
            });
        }
        if self.per_window_timeout_seconds <= 0.0 {
            return Err(ConfigError::InvalidScheduler {
                message: "per_window_timeout_seconds must be positive".to_string(),
            });
        }
        if self.cleanup_period == 0 {
            return Err(ConfigError::InvalidScheduler {
                message: "cleanup_period must be at least 1".to_string(),
            });
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidScheduler {
                message: "max_concurrency must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// A window that reached the `error` state, with its recorded reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowFailure {
    pub index: usize,
    pub error_message: String,
}

/// Aggregate result of driving the full window list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulingSummary {
    pub completed: usize,
    pub failed: Vec<WindowFailure>,
    /// Windows recorded `empty_slice`; the run proceeds past them
    pub skipped: usize,
    pub cancelled: bool,
    /// Set when a fatal adapter error halted the schedule early
    pub fatal: Option<String>,
}

enum WindowOutcome {
    Completed,
    Failed { message: String },
    Skipped,
    Fatal { message: String },
    Cancelled,
    /// Never entered its lifecycle; no record exists
    NotStarted,
}

/// Drives windows to their terminal state.
pub struct WindowScheduler {
    config: SchedulerConfig,
    model_id: String,
    store: Arc<ChunkStore>,
    source: Arc<dyn AudioSource>,
    asr: Arc<dyn AsrAdapter>,
    diarizer: Option<Arc<dyn DiarizerAdapter>>,
    cleanup: Arc<CleanupCoordinator>,
    slice_dir: PathBuf,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    /// Slice artifacts belonging to windows still mid-lifecycle; the
    /// periodic sweep must not touch these
    in_flight_slices: Mutex<HashSet<PathBuf>>,
}

impl WindowScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SchedulerConfig,
        model_id: String,
        store: Arc<ChunkStore>,
        source: Arc<dyn AudioSource>,
        asr: Arc<dyn AsrAdapter>,
        diarizer: Option<Arc<dyn DiarizerAdapter>>,
        cleanup: Arc<CleanupCoordinator>,
        slice_dir: PathBuf,
        progress: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            model_id,
            store,
            source,
            asr,
            diarizer,
            cleanup,
            slice_dir,
            progress,
            cancel,
            in_flight_slices: Mutex::new(HashSet::new()),
        }
    }

    async fn slices_in_flight(&self) -> Vec<PathBuf> {
        self.in_flight_slices.lock().await.iter().cloned().collect()
    }

    /// Drive every window to `completed` or `error`.
    ///
    /// Windows not yet started when cancellation or a fatal error is
    /// observed are left without records; the partially populated store is
    /// preserved either way.
    pub async fn run(
        self: &Arc<Self>,
        windows: &[WindowSpec],
    ) -> Result<SchedulingSummary, StoreError> {
        if self.config.max_concurrency > 1 {
            self.run_concurrent(windows).await
        } else {
            self.run_sequential(windows).await
        }
    }

    async fn run_sequential(
        self: &Arc<Self>,
        windows: &[WindowSpec],
    ) -> Result<SchedulingSummary, StoreError> {
        let total = windows.len();
        let mut summary = SchedulingSummary::default();

        for (position, spec) in windows.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("cancellation observed; {} window(s) not started", total - position);
                summary.cancelled = true;
                break;
            }

            let halt = self
                .drive_window(spec, total, &mut summary)
                .await?;
            if halt {
                break;
            }

            if (position + 1) % self.config.cleanup_period == 0 {
                debug!("periodic resource cleanup after window {}", spec.index);
                self.asr.release_memory().await;
                let keep = self.slices_in_flight().await;
                self.cleanup.sweep_slices(&self.slice_dir, &keep);
            }
        }

        self.progress.on_event(&ProgressEvent::RunFinished {
            completed: summary.completed,
            failed: summary.failed.len(),
        });
        Ok(summary)
    }

    async fn run_concurrent(
        self: &Arc<Self>,
        windows: &[WindowSpec],
    ) -> Result<SchedulingSummary, StoreError> {
        let total = windows.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let halted = Arc::new(AtomicBool::new(false));
        let processed = Arc::new(AtomicUsize::new(0));
        let mut tasks: JoinSet<Result<(usize, WindowOutcome), StoreError>> = JoinSet::new();

        for spec in windows.iter().cloned() {
            let scheduler = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let halted = Arc::clone(&halted);
            let processed = Arc::clone(&processed);

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("scheduler semaphore closed");
                if halted.load(Ordering::SeqCst) || scheduler.cancel.is_cancelled() {
                    return Ok((spec.index, WindowOutcome::NotStarted));
                }

                let outcome = scheduler.process_window(&spec, total).await?;
                if matches!(outcome, WindowOutcome::Fatal { .. }) {
                    halted.store(true, Ordering::SeqCst);
                }

                let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                if done % scheduler.config.cleanup_period == 0 {
                    scheduler.asr.release_memory().await;
                    let keep = scheduler.slices_in_flight().await;
                    scheduler.cleanup.sweep_slices(&scheduler.slice_dir, &keep);
                }
                Ok((spec.index, outcome))
            });
        }

        let mut summary = SchedulingSummary::default();
        let mut outcomes: Vec<(usize, WindowOutcome)> = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| {
                StoreError::Io(std::io::Error::other(format!("scheduler task panicked: {e}")))
            })?;
            outcomes.push(result?);
        }
        outcomes.sort_by_key(|(index, _)| *index);

        for (index, outcome) in outcomes {
            match outcome {
                WindowOutcome::Completed => summary.completed += 1,
                WindowOutcome::Skipped => summary.skipped += 1,
                WindowOutcome::Failed { message } => summary.failed.push(WindowFailure {
                    index,
                    error_message: message,
                }),
                WindowOutcome::Fatal { message } => {
                    summary.failed.push(WindowFailure {
                        index,
                        error_message: message.clone(),
                    });
                    summary.fatal = Some(message);
                }
                WindowOutcome::Cancelled => {
                    summary.failed.push(WindowFailure {
                        index,
                        error_message: "cancelled".to_string(),
                    });
                    summary.cancelled = true;
                }
                WindowOutcome::NotStarted => {}
            }
        }
        summary.cancelled |= self.cancel.is_cancelled();

        self.progress.on_event(&ProgressEvent::RunFinished {
            completed: summary.completed,
            failed: summary.failed.len(),
        });
        Ok(summary)
    }

    /// Process one window inside the sequential loop, folding its outcome
    /// into the summary. Returns `true` when scheduling must halt.
    async fn drive_window(
        &self,
        spec: &WindowSpec,
        total: usize,
        summary: &mut SchedulingSummary,
    ) -> Result<bool, StoreError> {
        match self.process_window(spec, total).await? {
            WindowOutcome::Completed => {
                summary.completed += 1;
                Ok(false)
            }
            WindowOutcome::Skipped => {
                summary.skipped += 1;
                Ok(false)
            }
            WindowOutcome::Failed { message } => {
                summary.failed.push(WindowFailure {
                    index: spec.index,
                    error_message: message,
                });
                Ok(false)
            }
            WindowOutcome::Fatal { message } => {
                error!("fatal adapter failure on window {}: {}", spec.index, message);
                summary.failed.push(WindowFailure {
                    index: spec.index,
                    error_message: message.clone(),
                });
                summary.fatal = Some(message);
                Ok(true)
            }
            WindowOutcome::Cancelled => {
                summary.failed.push(WindowFailure {
                    index: spec.index,
                    error_message: "cancelled".to_string(),
                });
                summary.cancelled = true;
                Ok(true)
            }
            WindowOutcome::NotStarted => Ok(false),
        }
    }

    async fn process_window(
        &self,
        spec: &WindowSpec,
        total: usize,
    ) -> Result<WindowOutcome, StoreError> {
        let mut record = self.store.create(spec)?;
        self.progress.on_event(&ProgressEvent::WindowStarted {
            index: spec.index,
            total_windows: total,
            start_seconds: spec.start_seconds,
            end_seconds: spec.end_seconds,
        });

        let audio = match self.source.slice(spec.start_seconds, spec.end_seconds) {
            Ok(audio) => audio,
            Err(e) => {
                let message = e.to_string();
                self.mark_error(&mut record, &message)?;
                self.progress.on_event(&ProgressEvent::WindowFailed {
                    index: spec.index,
                    error: message.clone(),
                });
                return Ok(WindowOutcome::Failed { message });
            }
        };

        if audio.is_empty() {
            // A rounding sliver at the tail carries no speech; record it
            // and move on without failing the run.
            warn!("window {} produced an empty slice; skipping", spec.index);
            self.mark_error(&mut record, "empty_slice")?;
            return Ok(WindowOutcome::Skipped);
        }

        // Register the artifact before it exists so a concurrent sweep
        // can never observe the file without its in-flight entry.
        let slice_target = self.slice_dir.join(slices::slice_file_name(
            spec.index,
            spec.start_seconds,
            spec.end_seconds,
        ));
        self.in_flight_slices.lock().await.insert(slice_target.clone());
        let mut slice_path: Option<PathBuf> = None;
        match slices::write_slice(
            &self.slice_dir,
            spec.index,
            spec.start_seconds,
            spec.end_seconds,
            &audio,
        ) {
            Ok(path) => {
                record.audio_chunk_file = Some(path.to_string_lossy().into_owned());
                slice_path = Some(path);
            }
            Err(e) => {
                warn!("failed to write slice artifact for window {}: {e}", spec.index);
                self.in_flight_slices.lock().await.remove(&slice_target);
            }
        }

        record.status = ChunkStatus::Processing;
        record.started_at = Some(unix_now());
        self.store.update(&record)?;

        let request = TranscribeRequest {
            model_id: self.model_id.clone(),
            window_index: spec.index,
            start_seconds: spec.start_seconds,
            end_seconds: spec.end_seconds,
        };

        let outcome = async {
            match self.transcribe_with_retries(spec, &audio, &request).await {
                AttemptResult::Success(transcript) => {
                    let word_count = self
                        .finish_window(spec, &mut record, transcript, &audio)
                        .await?;
                    self.progress.on_event(&ProgressEvent::WindowCompleted {
                        index: spec.index,
                        total_windows: total,
                        word_count,
                    });
                    Ok(WindowOutcome::Completed)
                }
                AttemptResult::Exhausted { last_error } => {
                    let message = format!(
                        "transcription_failed_after_{}_attempts: {}",
                        self.config.max_attempts, last_error
                    );
                    self.mark_error(&mut record, &message)?;
                    self.progress.on_event(&ProgressEvent::WindowFailed {
                        index: spec.index,
                        error: message.clone(),
                    });
                    Ok(WindowOutcome::Failed { message })
                }
                AttemptResult::Fatal { message } => {
                    self.mark_error(&mut record, &message)?;
                    self.progress.on_event(&ProgressEvent::WindowFailed {
                        index: spec.index,
                        error: message.clone(),
                    });
                    Ok(WindowOutcome::Fatal { message })
                }
                AttemptResult::Cancelled => {
                    self.mark_error(&mut record, "cancelled")?;
                    Ok(WindowOutcome::Cancelled)
                }
            }
        }
        .await;

        if let Some(path) = &slice_path {
            self.in_flight_slices.lock().await.remove(path);
        }
        outcome
    }

    async fn transcribe_with_retries(
        &self,
        spec: &WindowSpec,
        audio: &crate::audio::AudioData,
        request: &TranscribeRequest,
    ) -> AttemptResult {
        let timeout = Duration::from_secs_f64(self.config.per_window_timeout_seconds);
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            if self.cancel.is_cancelled() {
                return AttemptResult::Cancelled;
            }

            if attempt > 1 {
                let backoff = 2f64
                    .powi(attempt as i32 - 2)
                    .min(self.config.backoff_cap_seconds);
                self.progress.on_event(&ProgressEvent::WindowRetry {
                    index: spec.index,
                    attempt: attempt - 1,
                    backoff_seconds: backoff,
                });
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs_f64(backoff)) => {}
                    _ = self.cancel.cancelled() => return AttemptResult::Cancelled,
                }
                self.asr.release_memory().await;
            }

            let outcome = tokio::time::timeout(timeout, self.asr.transcribe(audio, request)).await;
            // In-flight calls are never preempted; a cancellation that
            // arrived while this window was processing wins over the result.
            if self.cancel.is_cancelled() {
                return AttemptResult::Cancelled;
            }
            match outcome {
                Err(_elapsed) => {
                    last_error = format!(
                        "timed out after {:.0}s",
                        self.config.per_window_timeout_seconds
                    );
                    debug!("window {} attempt {}: {}", spec.index, attempt, last_error);
                }
                Ok(Err(AdapterError::Fatal { message })) => {
                    return AttemptResult::Fatal { message };
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    debug!("window {} attempt {}: {}", spec.index, attempt, last_error);
                }
                Ok(Ok(transcript)) => {
                    if transcript.text.trim().is_empty() {
                        last_error = "empty transcription result".to_string();
                        debug!("window {} attempt {}: {}", spec.index, attempt, last_error);
                    } else {
                        return AttemptResult::Success(transcript);
                    }
                }
            }
        }

        AttemptResult::Exhausted { last_error }
    }

    /// Persist the completed record, attaching diarization when
    /// configured. Returns the recorded word count.
    async fn finish_window(
        &self,
        spec: &WindowSpec,
        record: &mut ChunkRecord,
        transcript: WindowTranscript,
        audio: &crate::audio::AudioData,
    ) -> Result<usize, StoreError> {
        let text = text::collapse_repeated_words(transcript.text.trim());
        let quality = text::validate_quality(&text);
        if !quality.is_acceptable {
            warn!(
                "window {} transcript quality is low ({:.0}/100): {}",
                spec.index,
                quality.quality_score,
                quality.suspicious_patterns.join("; ")
            );
        }

        let mut segments = transcript.segments;
        if segments.is_empty() {
            segments.push(SpeechSegment::new(
                spec.start_seconds,
                spec.end_seconds,
                text.clone(),
            ));
        }

        if let Some(diarizer) = &self.diarizer {
            let timeout = Duration::from_secs_f64(self.config.per_window_timeout_seconds);
            match tokio::time::timeout(timeout, diarizer.segment(audio)).await {
                Ok(Ok(turns)) => {
                    let turns: Vec<SpeakerSegment> = turns
                        .into_iter()
                        .map(|t| SpeakerSegment {
                            speaker_id: t.speaker_id,
                            start_seconds: t.start_seconds + spec.start_seconds,
                            end_seconds: t.end_seconds + spec.start_seconds,
                        })
                        .collect();
                    assign_speakers(&mut segments, &turns);
                    let mut ids: Vec<&str> =
                        turns.iter().map(|t| t.speaker_id.as_str()).collect();
                    ids.sort_unstable();
                    ids.dedup();
                    record.speaker_count = Some(ids.len());
                    record.speaker_segments = Some(turns);
                }
                Ok(Err(e)) => {
                    warn!("diarization failed on window {}: {e}; keeping transcript", spec.index);
                    record.diarization_failed = true;
                }
                Err(_elapsed) => {
                    warn!("diarization timed out on window {}; keeping transcript", spec.index);
                    record.diarization_failed = true;
                }
            }
        }

        record.status = ChunkStatus::Completed;
        record.word_count = text.split_whitespace().count();
        record.text = text;
        record.segments = segments;
        record.completed_at = Some(unix_now());
        self.store.update(record)?;
        Ok(record.word_count)
    }

    fn mark_error(&self, record: &mut ChunkRecord, message: &str) -> Result<(), StoreError> {
        record.status = ChunkStatus::Error;
        record.error_message = Some(message.to_string());
        record.completed_at = Some(unix_now());
        self.store.update(record)
    }
}

enum AttemptResult {
    Success(WindowTranscript),
    Exhausted { last_error: String },
    Fatal { message: String },
    Cancelled,
}

/// Give each speech segment the diarized speaker it overlaps most.
fn assign_speakers(segments: &mut [SpeechSegment], turns: &[SpeakerSegment]) {
    for segment in segments.iter_mut() {
        let mut best: Option<(&SpeakerSegment, f64)> = None;
        for turn in turns {
            let overlap = segment.end_seconds.min(turn.end_seconds)
                - segment.start_seconds.max(turn.start_seconds);
            if overlap <= 0.0 {
                continue;
            }
            if best.map_or(true, |(_, current)| overlap > current) {
                best = Some((turn, overlap));
            }
        }
        if let Some((turn, _)) = best {
            segment.speaker_id = Some(turn.speaker_id.clone());
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
