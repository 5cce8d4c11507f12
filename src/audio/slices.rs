//! Transient audio slice artifacts
//!
//! Each window's slice can be materialized as a mono 16 kHz PCM WAV file
//! next to the state directory. Slice files are produced on demand and are
//! eligible for cleanup at any lifecycle point.

use crate::audio::types::{AudioData, AudioError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name for a window's slice artifact, e.g.
/// `audio_chunk_003_50s_62s.wav`.
pub fn slice_file_name(index: usize, start_seconds: f64, end_seconds: f64) -> String {
    format!(
        "audio_chunk_{:03}_{}s_{}s.wav",
        index,
        start_seconds.round() as u64,
        end_seconds.round() as u64
    )
}

/// Write a slice to `dir`, returning the artifact path.
pub fn write_slice(
    dir: &Path,
    index: usize,
    start_seconds: f64,
    end_seconds: f64,
    audio: &AudioData,
) -> Result<PathBuf, AudioError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(slice_file_name(index, start_seconds, end_seconds));

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec).map_err(map_write_error)?;
    for sample in &audio.samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).map_err(map_write_error)?;
    }
    writer.finalize().map_err(map_write_error)?;

    debug!("wrote slice artifact {}", path.display());
    Ok(path)
}

fn map_write_error(err: hound::Error) -> AudioError {
    match err {
        hound::Error::IoError(io) => AudioError::Io(io),
        other => AudioError::Processing {
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_file_names_are_zero_padded() {
        assert_eq!(slice_file_name(3, 50.0, 62.0), "audio_chunk_003_50s_62s.wav");
        assert_eq!(slice_file_name(12, 0.0, 30.0), "audio_chunk_012_0s_30s.wav");
    }

    #[test]
    fn written_slice_round_trips_through_hound() {
        let dir = tempfile::tempdir().unwrap();
        let audio = AudioData::from_samples(vec![0.0, 0.25, -0.25, 0.5]);

        let path = write_slice(dir.path(), 1, 0.0, 1.0, &audio).unwrap();
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.len(), 4);
    }
}
