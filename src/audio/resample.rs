use rubato::{FftFixedIn, Resampler};

use crate::error::ExtractError;

/// Input chunk size fed to the FFT resampler
const CHUNK_FRAMES: usize = 1024;

/// Resample a whole mono signal from `from_rate` to `to_rate`.
///
/// The output is trimmed of the resampler's delay and has
/// `ceil(len * to_rate / from_rate)` samples.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, ExtractError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(ExtractError::Resample(format!(
            "invalid sample rates {} -> {}",
            from_rate, to_rate
        )));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_FRAMES,
        2, // sub_chunks for quality
        1, // mono
    )
    .map_err(|e| ExtractError::Resample(e.to_string()))?;

    let expected = (samples.len() as f64 * to_rate as f64 / from_rate as f64).ceil() as usize;
    let delay = resampler.output_delay();
    let mut output: Vec<f32> = Vec::with_capacity(expected + delay);

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let n = resampler.input_frames_next();
        let input = [&samples[pos..pos + n]];
        let chunk = resampler
            .process(&input[..], None)
            .map_err(|e| ExtractError::Resample(e.to_string()))?;
        output.extend_from_slice(&chunk[0]);
        pos += n;
    }

    if pos < samples.len() {
        let input = [&samples[pos..]];
        let chunk = resampler
            .process_partial(Some(&input[..]), None)
            .map_err(|e| ExtractError::Resample(e.to_string()))?;
        output.extend_from_slice(&chunk[0]);
    }

    // Zero chunks push out what is still buffered. With coprime rates one FFT
    // block spans several chunks, so single chunks may come back empty.
    let zeros = vec![0.0f32; CHUNK_FRAMES];
    let max_flush = 2 * CHUNK_FRAMES + 4 * (delay + 1) * from_rate as usize / to_rate as usize;
    let mut flushed = 0;
    while output.len() < expected + delay && flushed < max_flush {
        let n = resampler.input_frames_next();
        let input = [&zeros[..n]];
        let chunk = resampler
            .process(&input[..], None)
            .map_err(|e| ExtractError::Resample(e.to_string()))?;
        output.extend_from_slice(&chunk[0]);
        flushed += n;
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, rate: u32, secs: f32) -> Vec<f32> {
        let n = (rate as f32 * secs) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_same_rate_is_passthrough() {
        let input = sine(440.0, 8000, 0.1);
        assert_eq!(resample(&input, 8000, 8000).unwrap(), input);
    }

    #[test]
    fn test_48k_to_8k_length() {
        let input = sine(440.0, 48000, 1.0);
        let output = resample(&input, 48000, 8000).unwrap();
        assert_eq!(output.len(), 8000);
    }

    #[test]
    fn test_44100_to_8k_preserves_energy() {
        let input = sine(300.0, 44100, 1.0);
        let output = resample(&input, 44100, 8000).unwrap();
        assert_eq!(output.len(), 8000);

        // Ignore edges; a full-scale sine has RMS ~0.707
        let middle = &output[1000..7000];
        let rms = (middle.iter().map(|s| s * s).sum::<f32>() / middle.len() as f32).sqrt();
        assert!((rms - 0.707).abs() < 0.05, "rms was {rms}");
    }

    fn middle_rms(output: &[f32]) -> f32 {
        let middle = &output[output.len() / 4..3 * output.len() / 4];
        (middle.iter().map(|s| s * s).sum::<f32>() / middle.len() as f32).sqrt()
    }

    #[test]
    fn test_coprime_rate_keeps_full_length() {
        // 44056 Hz shares only a factor of 8 with 8 kHz: FFT blocks of 5507 frames
        for (secs, expected) in [(0.05, 400), (0.5, 4000), (30.0, 240_000)] {
            let input = sine(300.0, 44056, secs);
            let output = resample(&input, 44056, 8000).unwrap();
            assert_eq!(output.len(), expected, "{secs}s clip");
            assert!(middle_rms(&output) > 0.5, "{secs}s clip came out silent");
        }
    }

    #[test]
    fn test_clip_shorter_than_one_chunk() {
        for rate in [7999, 8001] {
            let input = sine(300.0, rate, 0.05);
            assert!(input.len() < CHUNK_FRAMES);
            let output = resample(&input, rate, 8000).unwrap();
            assert_eq!(output.len(), 400, "{rate} Hz");
            assert!(middle_rms(&output) > 0.3, "{rate} Hz clip came out silent");
        }
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(resample(&[0.0; 10], 0, 8000).is_err());
    }
}
