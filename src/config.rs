//! Run-level configuration
//!
//! Aggregates the per-component configuration structs and the explicit
//! `RunContext` that is passed down the call stack. There is no global
//! configuration state anywhere in the crate.

use crate::cleanup::CleanupConfig;
use crate::coverage::VerifierConfig;
use crate::dedup::DedupConfig;
use crate::scheduler::SchedulerConfig;
use crate::windowing::WindowingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Configuration validation errors. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid windowing configuration: {message}")]
    InvalidWindowing { message: String },

    #[error("invalid scheduler configuration: {message}")]
    InvalidScheduler { message: String },

    #[error("invalid verifier configuration: {message}")]
    InvalidVerifier { message: String },

    #[error("invalid deduplication configuration: {message}")]
    InvalidDedup { message: String },
}

/// Complete configuration for a transcription run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Identifier of the ASR model, passed through to the adapter
    pub model_id: String,
    pub windowing: WindowingConfig,
    pub scheduler: SchedulerConfig,
    pub verifier: VerifierConfig,
    pub dedup: DedupConfig,
    pub cleanup: CleanupConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_id: "default".to_string(),
            windowing: WindowingConfig::default(),
            scheduler: SchedulerConfig::default(),
            verifier: VerifierConfig::default(),
            dedup: DedupConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Validate every component configuration. Called once at run start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.windowing.validate()?;
        self.scheduler.validate()?;
        self.verifier.validate()?;
        self.dedup.validate()?;
        Ok(())
    }
}

/// Per-run context carrying the run identity and the directories the
/// pipeline is allowed to touch. Owned by the caller, shared by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Uuid,
    /// Directory holding the per-window chunk records (`chunks/` inside)
    pub state_dir: PathBuf,
    /// Directory for transient audio slice artifacts
    pub audio_slice_dir: PathBuf,
    /// Directory for final output files, subject to retention pruning
    pub output_dir: PathBuf,
    pub config: PipelineConfig,
}

impl RunContext {
    pub fn new(base_dir: impl AsRef<Path>, config: PipelineConfig) -> Self {
        let base = base_dir.as_ref();
        Self {
            run_id: Uuid::new_v4(),
            state_dir: base.join("state"),
            audio_slice_dir: base.join("audio_chunks"),
            output_dir: base.join("output"),
            config,
        }
    }

    /// Directory containing the chunk record documents.
    pub fn chunks_dir(&self) -> PathBuf {
        self.state_dir.join("chunks")
    }
}
