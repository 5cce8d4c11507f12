//! Coverage verification
//!
//! Certifies that the chunk records account for the whole source before
//! any merging happens. A missed span larger than the gap tolerance fails
//! the run; overlap between adjacent windows counts once.

use crate::config::ConfigError;
use crate::store::{ChunkRecord, ChunkStatus};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Verifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Minimum acceptable covered fraction of the source
    pub coverage_threshold: f64,
    /// Uncovered runs at or below this length are not gaps
    pub gap_tolerance_seconds: f64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: 0.999,
            gap_tolerance_seconds: 0.1,
        }
    }
}

impl VerifierConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.coverage_threshold <= 0.0 || self.coverage_threshold > 1.0 {
            return Err(ConfigError::InvalidVerifier {
                message: format!(
                    "coverage_threshold must be in (0, 1], got {}",
                    self.coverage_threshold
                ),
            });
        }
        if self.gap_tolerance_seconds < 0.0 {
            return Err(ConfigError::InvalidVerifier {
                message: "gap_tolerance_seconds must not be negative".to_string(),
            });
        }
        Ok(())
    }
}

/// A span of the source not covered by any counted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub start: f64,
    pub end: f64,
    pub duration: f64,
}

/// Result of a coverage pass over the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub source_duration: f64,
    pub covered_duration: f64,
    pub coverage_fraction: f64,
    pub gaps: Vec<CoverageGap>,
    pub total_chunks: usize,
    pub verified: bool,
    pub missing_duration: f64,
}

/// Walk the records and compute the coverage report.
///
/// Only `completed` and `processing` records count toward coverage;
/// errored windows contribute gaps. The walk accumulates the union of the
/// covered spans, so window overlap neither inflates nor reduces the
/// fraction.
pub fn verify_coverage(
    records: &[ChunkRecord],
    source_duration: f64,
    config: &VerifierConfig,
) -> CoverageReport {
    let mut counted: Vec<&ChunkRecord> = records
        .iter()
        .filter(|r| matches!(r.status, ChunkStatus::Completed | ChunkStatus::Processing))
        .collect();
    counted.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    let mut covered_duration = 0.0;
    let mut gaps = Vec::new();
    let mut cursor = 0.0;

    for record in &counted {
        let uncovered = record.start_time - cursor;
        if uncovered > config.gap_tolerance_seconds {
            gaps.push(CoverageGap {
                start: cursor,
                end: record.start_time,
                duration: uncovered,
            });
        }

        let span_start = record.start_time.max(cursor);
        if record.end_time > span_start {
            covered_duration += record.end_time - span_start;
        }
        cursor = cursor.max(record.end_time);
    }

    let trailing = source_duration - cursor;
    if trailing > config.gap_tolerance_seconds {
        gaps.push(CoverageGap {
            start: cursor,
            end: source_duration,
            duration: trailing,
        });
    }

    let coverage_fraction = if source_duration > 0.0 {
        covered_duration / source_duration
    } else {
        0.0
    };
    let verified = coverage_fraction >= config.coverage_threshold && gaps.is_empty();

    if verified {
        info!(
            "coverage verified: {:.3}% over {} chunks",
            coverage_fraction * 100.0,
            counted.len()
        );
    } else {
        warn!(
            "coverage incomplete: {:.3}% with {} gap(s), {:.3}s missing",
            coverage_fraction * 100.0,
            gaps.len(),
            source_duration - covered_duration
        );
    }

    CoverageReport {
        source_duration,
        covered_duration,
        coverage_fraction,
        gaps,
        total_chunks: counted.len(),
        verified,
        missing_duration: (source_duration - covered_duration).max(0.0),
    }
}
