//! Durable per-window state
//!
//! One JSON document per window under `chunks/`, written with an atomic
//! temp-file-then-rename protocol so a fresh process can always read a
//! consistent view.

pub mod chunk_store;

pub use chunk_store::{ChunkRecord, ChunkStatus, ChunkStore, StoreError};
