//! Progress reporting
//!
//! Observers receive scheduling progress through this narrow interface;
//! the scheduler holds no reference back to whoever is listening.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Progress notifications emitted while a run executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProgressEvent {
    RunStarted {
        total_windows: usize,
        source_duration_seconds: f64,
    },
    WindowStarted {
        index: usize,
        total_windows: usize,
        start_seconds: f64,
        end_seconds: f64,
    },
    WindowRetry {
        index: usize,
        attempt: u32,
        backoff_seconds: f64,
    },
    WindowCompleted {
        index: usize,
        total_windows: usize,
        word_count: usize,
    },
    WindowFailed {
        index: usize,
        error: String,
    },
    RunFinished {
        completed: usize,
        failed: usize,
    },
}

/// Receiver for progress events.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Discards every event.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// Default sink: renders progress through the tracing subscriber.
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted {
                total_windows,
                source_duration_seconds,
            } => info!(
                "run started: {} windows over {:.1}s of audio",
                total_windows, source_duration_seconds
            ),
            ProgressEvent::WindowStarted {
                index,
                total_windows,
                start_seconds,
                end_seconds,
            } => info!(
                "window {}/{}: [{:.1}s, {:.1}s)",
                index, total_windows, start_seconds, end_seconds
            ),
            ProgressEvent::WindowRetry {
                index,
                attempt,
                backoff_seconds,
            } => warn!(
                "window {}: attempt {} failed, retrying after {:.0}s",
                index, attempt, backoff_seconds
            ),
            ProgressEvent::WindowCompleted {
                index,
                total_windows,
                word_count,
            } => info!(
                "window {}/{} completed ({} words, {:.0}% done)",
                index,
                total_windows,
                word_count,
                *index as f64 / *total_windows as f64 * 100.0
            ),
            ProgressEvent::WindowFailed { index, error } => {
                warn!("window {} failed: {}", index, error)
            }
            ProgressEvent::RunFinished { completed, failed } => {
                info!("run finished: {} completed, {} failed", completed, failed)
            }
        }
    }
}
