//! Audio source access
//!
//! Opens the source artifact once, normalizes it to mono 16 kHz, and
//! serves random-access slices out of the cached buffer. Safe to share
//! across concurrent slice requests.

use crate::audio::resampler::LinearResampler;
use crate::audio::types::{AudioData, AudioError, SAMPLE_RATE};
use hound::SampleFormat;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Random-access view over a finite audio artifact of known duration.
pub trait AudioSource: Send + Sync {
    /// Total duration in seconds, measured once at open time.
    fn duration_seconds(&self) -> f64;

    /// Return the mono 16 kHz PCM slice `[start, end)`.
    ///
    /// The returned buffer holds `round((end - start) * 16000)` samples,
    /// give or take one sample at the source tail.
    fn slice(&self, start_seconds: f64, end_seconds: f64) -> Result<AudioData, AudioError>;
}

/// File-backed source decoded eagerly via `hound`.
pub struct WavAudioSource {
    path: PathBuf,
    samples: Vec<f32>,
    duration_seconds: f64,
}

impl WavAudioSource {
    /// Decode a WAV file into the cached mono 16 kHz buffer.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AudioError> {
        let path = path.as_ref().to_path_buf();
        let mut reader = hound::WavReader::open(&path).map_err(map_hound_error)?;
        let spec = reader.spec();

        if spec.channels == 0 {
            return Err(AudioError::Decode {
                message: format!("no channels in {}", path.display()),
            });
        }

        let interleaved = read_samples(&mut reader, spec)?;
        let mono = downmix(&interleaved, spec.channels);

        let resampler = LinearResampler::new(spec.sample_rate, SAMPLE_RATE)?;
        let samples = resampler.resample(&mono);
        let duration_seconds = samples.len() as f64 / SAMPLE_RATE as f64;

        info!(
            "opened audio source {}: {:.2}s at {} Hz ({} ch)",
            path.display(),
            duration_seconds,
            spec.sample_rate,
            spec.channels
        );

        Ok(Self {
            path,
            samples,
            duration_seconds,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioSource for WavAudioSource {
    fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    fn slice(&self, start_seconds: f64, end_seconds: f64) -> Result<AudioData, AudioError> {
        if start_seconds < 0.0
            || end_seconds <= start_seconds
            || end_seconds > self.duration_seconds + 1.0 / SAMPLE_RATE as f64
        {
            return Err(AudioError::Range {
                start: start_seconds,
                end: end_seconds,
                duration: self.duration_seconds,
            });
        }

        let start_sample =
            ((start_seconds * SAMPLE_RATE as f64).round() as usize).min(self.samples.len());
        let end_sample =
            ((end_seconds * SAMPLE_RATE as f64).round() as usize).min(self.samples.len());

        debug!(
            "slicing [{:.2}s, {:.2}s) -> samples [{}, {})",
            start_seconds, end_seconds, start_sample, end_sample
        );

        Ok(AudioData::from_samples(
            self.samples[start_sample..end_sample].to_vec(),
        ))
    }
}

fn read_samples(
    reader: &mut hound::WavReader<std::io::BufReader<std::fs::File>>,
    spec: hound::WavSpec,
) -> Result<Vec<f32>, AudioError> {
    match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(map_hound_error),
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<f32>, _>>()
                .map_err(map_hound_error)
        }
    }
}

fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

fn map_hound_error(err: hound::Error) -> AudioError {
    match err {
        hound::Error::IoError(io) => AudioError::Io(io),
        other => AudioError::Decode {
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_wav(path: &Path, seconds: f64, sample_rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let frames = (seconds * sample_rate as f64).round() as usize;
        for i in 0..frames {
            let value = ((i as f32 / 50.0).sin() * 8000.0) as i16;
            for _ in 0..channels {
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn open_measures_duration_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 2.0, 16_000, 1);

        let source = WavAudioSource::open(&path).unwrap();
        assert!((source.duration_seconds() - 2.0).abs() < 0.01);
    }

    #[test]
    fn stereo_input_is_downmixed_and_resampled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_test_wav(&path, 1.0, 44_100, 2);

        let source = WavAudioSource::open(&path).unwrap();
        assert!((source.duration_seconds() - 1.0).abs() < 0.01);

        let slice = source.slice(0.0, 1.0).unwrap();
        assert_eq!(slice.channels, 1);
        assert_eq!(slice.sample_rate, SAMPLE_RATE);
    }

    #[test]
    fn slice_length_matches_requested_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 3.0, 16_000, 1);

        let source = WavAudioSource::open(&path).unwrap();
        let slice = source.slice(0.5, 1.5).unwrap();
        let expected = SAMPLE_RATE as usize;
        assert!((slice.samples.len() as i64 - expected as i64).abs() <= 1);
    }

    #[test]
    fn out_of_range_bounds_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 1.0, 16_000, 1);

        let source = WavAudioSource::open(&path).unwrap();
        assert!(matches!(
            source.slice(-0.1, 0.5),
            Err(AudioError::Range { .. })
        ));
        assert!(matches!(
            source.slice(0.5, 0.5),
            Err(AudioError::Range { .. })
        ));
        assert!(matches!(
            source.slice(0.5, 2.0),
            Err(AudioError::Range { .. })
        ));
    }

    #[test]
    fn truncated_file_reports_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"RIFF0000WAVE").unwrap();

        assert!(WavAudioSource::open(&path).is_err());
    }
}
