//! Run orchestration
//!
//! Wires the components into the single `run` operation: cleanup, window
//! planning, scheduling, coverage verification, deduplication, and the
//! final merge. Construction is acyclic; every component receives what it
//! needs explicitly and nothing reaches back into the pipeline.

pub mod progress;

pub use progress::{NullProgressSink, ProgressEvent, ProgressSink, TracingProgressSink};

use crate::adapters::{AsrAdapter, DiarizerAdapter, SpeechSegment, WindowTranscript};
use crate::audio::AudioSource;
use crate::cleanup::CleanupCoordinator;
use crate::config::{ConfigError, RunContext};
use crate::coverage::{verify_coverage, CoverageReport};
use crate::dedup::OverlapDeduplicator;
use crate::merge::{merge_transcripts, Transcript};
use crate::scheduler::{SchedulingSummary, WindowFailure, WindowScheduler};
use crate::store::{ChunkRecord, ChunkStatus, ChunkStore, StoreError};
use crate::windowing::{plan_windows, WindowPolicy};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run-level failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(
        "coverage incomplete: {:.3}% covered, {} gap(s), {} failed window(s)",
        .report.coverage_fraction * 100.0,
        .report.gaps.len(),
        .failed_windows.len()
    )]
    CoverageIncomplete {
        report: CoverageReport,
        failed_windows: Vec<WindowFailure>,
    },

    #[error(
        "run cancelled with {} chunk(s) recorded ({:.1}% coverage)",
        .report.total_chunks,
        .report.coverage_fraction * 100.0
    )]
    Cancelled { report: CoverageReport },

    #[error("adapter failed fatally: {message}")]
    Fatal {
        message: String,
        report: CoverageReport,
        failed_windows: Vec<WindowFailure>,
    },
}

/// Successful run output.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub transcript: Transcript,
    pub coverage: CoverageReport,
    pub scheduling: SchedulingSummary,
}

/// The chunked transcription pipeline.
pub struct TranscriptionPipeline {
    ctx: RunContext,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl TranscriptionPipeline {
    pub fn new(ctx: RunContext) -> Self {
        Self {
            ctx,
            progress: Arc::new(TracingProgressSink),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Token observed between windows and between retry attempts.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the full run: schedule every window, verify coverage,
    /// deduplicate overlap text, and merge.
    pub async fn run(
        &self,
        source: Arc<dyn AudioSource>,
        asr: Arc<dyn AsrAdapter>,
        diarizer: Option<Arc<dyn DiarizerAdapter>>,
    ) -> Result<RunOutcome, RunError> {
        let config = &self.ctx.config;
        config.validate()?;

        let cleanup = Arc::new(CleanupCoordinator::new(config.cleanup.clone()));
        cleanup.before_run(&self.ctx);

        let duration = source.duration_seconds();
        let windows = plan_windows(duration, &config.windowing)?;
        info!(
            "run {}: {} window(s) over {:.1}s",
            self.ctx.run_id,
            windows.len(),
            duration
        );
        self.progress.on_event(&ProgressEvent::RunStarted {
            total_windows: windows.len(),
            source_duration_seconds: duration,
        });

        let store = Arc::new(ChunkStore::open(&self.ctx.state_dir)?);
        let scheduler = Arc::new(WindowScheduler::new(
            config.scheduler.clone(),
            config.model_id.clone(),
            Arc::clone(&store),
            source,
            asr,
            diarizer,
            Arc::clone(&cleanup),
            self.ctx.audio_slice_dir.clone(),
            Arc::clone(&self.progress),
            self.cancel.clone(),
        ));
        let scheduling = scheduler.run(&windows).await?;

        let records = store.list()?;
        let coverage = verify_coverage(&records, duration, &config.verifier);

        if scheduling.cancelled {
            return Err(RunError::Cancelled { report: coverage });
        }
        if let Some(message) = scheduling.fatal.clone() {
            return Err(RunError::Fatal {
                message,
                report: coverage,
                failed_windows: scheduling.failed,
            });
        }
        if !coverage.verified {
            return Err(RunError::CoverageIncomplete {
                report: coverage,
                failed_windows: scheduling.failed,
            });
        }

        let transcripts = materialize_transcripts(&records);
        let deduplicated = OverlapDeduplicator::new(config.dedup.clone()).deduplicate(transcripts);
        let transcript = merge_transcripts(deduplicated, windowing_summary(config));

        cleanup.after_run(&self.ctx);

        Ok(RunOutcome {
            transcript,
            coverage,
            scheduling,
        })
    }
}

/// Rebuild the per-window transcripts from completed records, sorted by
/// start time. Errored windows contribute nothing.
fn materialize_transcripts(records: &[ChunkRecord]) -> Vec<WindowTranscript> {
    let mut transcripts: Vec<WindowTranscript> = records
        .iter()
        .filter(|r| r.status == ChunkStatus::Completed)
        .map(|r| {
            let segments = if r.segments.is_empty() {
                vec![SpeechSegment::new(r.start_time, r.end_time, r.text.clone())]
            } else {
                r.segments.clone()
            };
            WindowTranscript {
                index: r.chunk_number,
                start_seconds: r.start_time,
                end_seconds: r.end_time,
                text: r.text.clone(),
                segments,
            }
        })
        .collect();
    transcripts.sort_by(|a, b| {
        a.start_seconds
            .total_cmp(&b.start_seconds)
            .then(a.index.cmp(&b.index))
    });
    transcripts
}

fn windowing_summary(config: &crate::config::PipelineConfig) -> String {
    match config.windowing.policy {
        WindowPolicy::Fixed => format!("fixed {}s windows", config.windowing.window_seconds),
        WindowPolicy::Overlapping => format!(
            "{}s windows with {}s overlap",
            config.windowing.window_seconds, config.windowing.stride_overlap_seconds
        ),
    }
}
