//! Audio handling module
//!
//! Provides source decoding, random-access slicing, resampling to the
//! pipeline sample rate, and transient slice artifacts.

pub mod resampler;
pub mod slices;
pub mod source;
pub mod types;

pub use source::{AudioSource, WavAudioSource};
pub use types::*;
