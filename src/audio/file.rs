use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;
use tracing::info;

/// A WAV file loaded into memory, used as the microphone source for the
/// fixture-backed device provider and for integration tests.
pub struct AudioFixture {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFixture {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio fixture: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Fixture loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Build a fixture directly from mono float samples (tests).
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        let ints: Vec<i16> = samples
            .iter()
            .map(|&s| ((s.clamp(-1.0, 1.0) * 32768.0) as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
            .collect();
        let duration_seconds = ints.len() as f64 / sample_rate as f64;
        Self {
            path: "<memory>".to_string(),
            duration_seconds,
            sample_rate,
            channels: 1,
            samples: ints,
        }
    }

    /// Mono float samples at the requested rate.
    ///
    /// Stereo input is averaged; rate conversion is by decimation, so the
    /// fixture rate must be an integer multiple of the target.
    pub fn mono_f32_at(&self, target_rate: u32) -> Result<Vec<f32>> {
        let mono: Vec<f32> = if self.channels == 2 {
            self.samples
                .chunks_exact(2)
                .map(|pair| (pair[0] as f32 + pair[1] as f32) / 2.0 / 32768.0)
                .collect()
        } else {
            self.samples.iter().map(|&s| s as f32 / 32768.0).collect()
        };

        if self.sample_rate == target_rate {
            return Ok(mono);
        }

        if self.sample_rate % target_rate != 0 {
            anyhow::bail!(
                "Cannot decimate {}Hz fixture to {}Hz (non-integer ratio)",
                self.sample_rate,
                target_rate
            );
        }

        let ratio = (self.sample_rate / target_rate) as usize;
        Ok(mono.into_iter().step_by(ratio).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimates_48k_to_16k() {
        let fixture = AudioFixture {
            path: "<test>".into(),
            duration_seconds: 0.0,
            sample_rate: 48_000,
            channels: 1,
            samples: (0..12).map(|i| i as i16).collect(),
        };
        let out = fixture.mono_f32_at(16_000).unwrap();
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn rejects_non_integer_ratio() {
        let fixture = AudioFixture {
            path: "<test>".into(),
            duration_seconds: 0.0,
            sample_rate: 44_100,
            channels: 1,
            samples: vec![0; 100],
        };
        assert!(fixture.mono_f32_at(16_000).is_err());
    }
}
