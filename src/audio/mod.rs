//! Audio input: decoding to mono PCM and resampling.
//!
//! The rest of the crate only sees [`AudioDecoder`]; format handling stays
//! behind it.

mod decoder;
mod resample;

pub use decoder::SymphoniaDecoder;
pub use resample::resample;

use std::path::Path;

use crate::error::ExtractError;

/// Mono PCM decoded from one file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Channel-averaged samples in [-1, 1]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Opens an audio file and returns mono samples with their sample rate.
pub trait AudioDecoder: Send + Sync {
    /// Decode at most `max_duration_secs` seconds from the start of the file.
    fn open(&self, path: &Path, max_duration_secs: u32) -> Result<DecodedAudio, ExtractError>;
}

/// Average interleaved frames down to one channel.
pub fn downmix_interleaved(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo_averages_channels() {
        let mono = downmix_interleaved(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_downmix_mono_is_identity() {
        assert_eq!(downmix_interleaved(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn test_duration_secs() {
        let audio = DecodedAudio {
            samples: vec![0.0; 16000],
            sample_rate: 8000,
        };
        assert!((audio.duration_secs() - 2.0).abs() < 1e-9);
    }
}
