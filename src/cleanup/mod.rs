//! Cleanup and retention policy
//!
//! Stateless coordinator invoked at fixed lifecycle points: before the run
//! (clear stale transients), periodically during scheduling (sweep slice
//! artifacts already consumed), and after the run (clear transients, prune
//! old outputs). Every operation is best-effort: failures are logged and
//! swallowed, never propagated into the run.

use crate::config::RunContext;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Cleanup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Output files retained after a run; older ones are pruned
    pub max_output_files: usize,
    /// Clear prior per-window state before starting
    pub clear_state_before_run: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_output_files: 5,
            clear_state_before_run: false,
        }
    }
}

/// Counters describing what a cleanup pass actually did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub slices_removed: usize,
    pub records_removed: usize,
    pub outputs_pruned: usize,
}

/// Lifecycle cleanup executor.
pub struct CleanupCoordinator {
    config: CleanupConfig,
}

impl CleanupCoordinator {
    pub fn new(config: CleanupConfig) -> Self {
        Self { config }
    }

    /// Pre-run pass: stale slice artifacts always go; chunk records go
    /// only when configured; final outputs are never touched here.
    pub fn before_run(&self, ctx: &RunContext) -> CleanupSummary {
        let mut summary = CleanupSummary {
            slices_removed: self.remove_slice_artifacts(&ctx.audio_slice_dir, &[]),
            ..Default::default()
        };

        if self.config.clear_state_before_run {
            match remove_matching(&ctx.chunks_dir(), |name| {
                name.starts_with("chunk_") && name.ends_with(".json")
            }) {
                Ok(count) => summary.records_removed = count,
                Err(e) => warn!("pre-run state cleanup failed: {e:#}"),
            }
        }

        info!(
            "pre-run cleanup: {} slice(s), {} record(s) removed",
            summary.slices_removed, summary.records_removed
        );
        summary
    }

    /// Periodic pass during scheduling: drop slice artifacts except the
    /// ones still in flight.
    pub fn sweep_slices(&self, slice_dir: &Path, keep: &[PathBuf]) -> usize {
        self.remove_slice_artifacts(slice_dir, keep)
    }

    /// Post-run pass: clear remaining transients and apply output
    /// retention. Chunk records are preserved.
    pub fn after_run(&self, ctx: &RunContext) -> CleanupSummary {
        let mut summary = CleanupSummary {
            slices_removed: self.remove_slice_artifacts(&ctx.audio_slice_dir, &[]),
            ..Default::default()
        };

        match self.prune_outputs(&ctx.output_dir) {
            Ok(count) => summary.outputs_pruned = count,
            Err(e) => warn!("output retention pruning failed: {e:#}"),
        }

        info!(
            "post-run cleanup: {} slice(s) removed, {} output(s) pruned",
            summary.slices_removed, summary.outputs_pruned
        );
        summary
    }

    fn remove_slice_artifacts(&self, slice_dir: &Path, keep: &[PathBuf]) -> usize {
        if !slice_dir.exists() {
            return 0;
        }
        let entries = match fs::read_dir(slice_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("slice cleanup failed to read {}: {e}", slice_dir.display());
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !(name.starts_with("audio_chunk_") && name.ends_with(".wav")) {
                continue;
            }
            if keep.iter().any(|kept| kept == &path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("removed slice artifact {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("failed to remove {}: {e}", path.display()),
            }
        }
        removed
    }

    fn prune_outputs(&self, output_dir: &Path) -> Result<usize> {
        if !output_dir.exists() {
            return Ok(0);
        }
        let mut files: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
        for entry in fs::read_dir(output_dir).context("reading output directory")? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            files.push((modified, path));
        }

        // Newest first; everything past the retention cap is removed
        files.sort_by(|a, b| b.0.cmp(&a.0));
        let mut pruned = 0;
        for (_, path) in files.into_iter().skip(self.config.max_output_files) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("pruned output {}", path.display());
                    pruned += 1;
                }
                Err(e) => warn!("failed to prune {}: {e}", path.display()),
            }
        }
        Ok(pruned)
    }
}

fn remove_matching(dir: &Path, matches: impl Fn(&str) -> bool) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !matches(name) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("failed to remove {}: {e}", path.display()),
        }
    }
    Ok(removed)
}
