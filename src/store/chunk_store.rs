//! Chunk record store
//!
//! The canonical unit of resumability: every window has exactly one JSON
//! document keyed by index and time range. The scheduler is the only
//! writer during a run; readers may be concurrent and may run in other
//! processes.

use crate::adapters::{SpeakerSegment, SpeechSegment};
use crate::windowing::WindowSpec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Store access errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk record is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("chunk record {index} already exists")]
    AlreadyExists { index: usize },

    #[error("chunk record {index} not found")]
    NotFound { index: usize },

    #[error("invalid status transition for chunk {index}: {from:?} -> {to:?}")]
    InvalidTransition {
        index: usize,
        from: ChunkStatus,
        to: ChunkStatus,
    },
}

/// Per-record lifecycle state. Transitions are monotonic within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Created,
    Processing,
    Completed,
    Error,
}

impl ChunkStatus {
    fn rank(self) -> u8 {
        match self {
            ChunkStatus::Created => 0,
            ChunkStatus::Processing => 1,
            ChunkStatus::Completed | ChunkStatus::Error => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

/// The durable per-window state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// 1-based window index
    pub chunk_number: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub status: ChunkStatus,
    /// Transcribed text; empty until the record completes
    pub text: String,
    pub word_count: usize,
    /// Unix seconds; set when processing starts
    pub started_at: Option<f64>,
    /// Unix seconds; set on completion or error
    pub completed_at: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_chunk_file: Option<String>,
    /// Speech segments with absolute times, recorded on completion
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<SpeechSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_segments: Option<Vec<SpeakerSegment>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub diarization_failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Free-form metadata attached by post-processing passes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhancement: Option<serde_json::Value>,
    /// Window artifact stem that produced this record
    pub produced_by: String,
}

impl ChunkRecord {
    fn initial(spec: &WindowSpec) -> Self {
        Self {
            chunk_number: spec.index,
            start_time: spec.start_seconds,
            end_time: spec.end_seconds,
            status: ChunkStatus::Created,
            text: String::new(),
            word_count: 0,
            started_at: None,
            completed_at: None,
            audio_chunk_file: None,
            segments: Vec::new(),
            speaker_count: None,
            speaker_segments: None,
            diarization_failed: false,
            error_message: None,
            enhancement: None,
            produced_by: spec.artifact_stem(),
        }
    }

    fn file_name(&self) -> String {
        format!(
            "chunk_{:03}_{}s_{}s.json",
            self.chunk_number,
            self.start_time.round() as u64,
            self.end_time.round() as u64
        )
    }
}

/// Filesystem-backed chunk record store.
pub struct ChunkStore {
    chunks_dir: PathBuf,
}

impl ChunkStore {
    /// Open (creating if needed) the store under `state_dir/chunks`.
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let chunks_dir = state_dir.as_ref().join("chunks");
        fs::create_dir_all(&chunks_dir)?;
        Ok(Self { chunks_dir })
    }

    pub fn chunks_dir(&self) -> &Path {
        &self.chunks_dir
    }

    /// Create the initial record for a window. Fails if a record for the
    /// index already exists.
    pub fn create(&self, spec: &WindowSpec) -> Result<ChunkRecord, StoreError> {
        if self.find_path(spec.index)?.is_some() {
            return Err(StoreError::AlreadyExists { index: spec.index });
        }
        let record = ChunkRecord::initial(spec);
        self.write_atomic(&record)?;
        debug!("created chunk record {}", record.produced_by);
        Ok(record)
    }

    /// Atomically replace a record, enforcing monotonic status
    /// transitions. Concurrent writers to the same index are a programming
    /// error, not a race this store resolves.
    pub fn update(&self, record: &ChunkRecord) -> Result<(), StoreError> {
        let existing = self.read(record.chunk_number)?;
        let regression = record.status.rank() < existing.status.rank();
        let rewrite_terminal = existing.status.is_terminal() && record.status.is_terminal();
        if regression || rewrite_terminal {
            return Err(StoreError::InvalidTransition {
                index: record.chunk_number,
                from: existing.status,
                to: record.status,
            });
        }
        self.write_atomic(record)
    }

    /// Read one record by window index.
    pub fn read(&self, index: usize) -> Result<ChunkRecord, StoreError> {
        let path = self
            .find_path(index)?
            .ok_or(StoreError::NotFound { index })?;
        let data = fs::read(&path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// All records, sorted by window index. Temp files and foreign files
    /// are ignored; a record that is absent simply was never created.
    pub fn list(&self) -> Result<Vec<ChunkRecord>, StoreError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.chunks_dir)? {
            let path = entry?.path();
            if !is_record_file(&path) {
                continue;
            }
            let data = fs::read(&path)?;
            records.push(serde_json::from_slice::<ChunkRecord>(&data)?);
        }
        records.sort_by_key(|r| r.chunk_number);
        Ok(records)
    }

    fn find_path(&self, index: usize) -> Result<Option<PathBuf>, StoreError> {
        let prefix = format!("chunk_{:03}_", index);
        for entry in fs::read_dir(&self.chunks_dir)? {
            let path = entry?.path();
            if !is_record_file(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with(&prefix) {
                    return Ok(Some(path));
                }
            }
        }
        Ok(None)
    }

    /// Write to `*.tmp`, flush to disk, then rename into place so readers
    /// never observe a partially written document.
    fn write_atomic(&self, record: &ChunkRecord) -> Result<(), StoreError> {
        let final_path = self.chunks_dir.join(record.file_name());
        let tmp_path = final_path.with_extension("json.tmp");

        let data = serde_json::to_vec_pretty(record)?;
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }
}

fn is_record_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with("chunk_") && name.ends_with(".json")
}
