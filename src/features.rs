//! Acoustic fingerprint: short-time cepstral coefficients.
//!
//! Pipeline per track: decode to mono, resample to the target rate,
//! pre-emphasis, peak normalization, then for each centered frame a
//! Hann-windowed power spectrum, Slaney mel filterbank, log power (dB) and an
//! orthonormal DCT-II. The coefficient matrix is flattened coefficient-major,
//! so the vector length grows with track duration.

use realfft::{RealFftPlanner, RealToComplex};
use std::f64::consts::PI;
use std::path::Path;
use std::sync::Arc;

use crate::audio::{resample, AudioDecoder};
use crate::config::FeatureConfig;
use crate::error::ExtractError;

pub const PREEMPHASIS_COEF: f32 = 0.97;

/// Power floor before taking the log
const AMIN: f32 = 1e-10;
/// Dynamic range kept below the loudest mel bin
const TOP_DB: f32 = 80.0;

/// `y[n] - coef * y[n-1]`; the sample before the first is linearly extrapolated.
pub fn preemphasis(samples: &[f32], coef: f32) -> Vec<f32> {
    let Some(&first) = samples.first() else {
        return Vec::new();
    };
    let before_first = match samples.get(1) {
        Some(&second) => 2.0 * first - second,
        None => first,
    };

    let mut out = Vec::with_capacity(samples.len());
    out.push(first - coef * before_first);
    out.extend(samples.windows(2).map(|w| w[1] - coef * w[0]));
    out
}

/// Scale so the largest absolute sample is 1. Silence is left untouched.
pub fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > f32::MIN_POSITIVE && peak.is_finite() {
        for s in samples.iter_mut() {
            *s /= peak;
        }
    }
}

/// Number of centered frames produced for `len` samples.
pub fn frame_count(len: usize, hop_length: usize) -> usize {
    1 + len / hop_length
}

fn hz_to_mel(hz: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    let logstep = 6.4f64.ln() / 27.0;
    if hz >= MIN_LOG_HZ {
        MIN_LOG_HZ / F_SP + (hz / MIN_LOG_HZ).ln() / logstep
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;
    if mel >= min_log_mel {
        MIN_LOG_HZ * (logstep * (mel - min_log_mel)).exp()
    } else {
        F_SP * mel
    }
}

/// One triangular mel filter, stored from its first non-zero FFT bin.
#[derive(Debug, Clone)]
struct MelFilter {
    start_bin: usize,
    weights: Vec<f32>,
}

/// Slaney-scale, area-normalized triangular filters over `0..sample_rate/2`.
fn mel_filterbank(n_mels: usize, n_fft: usize, sample_rate: u32) -> Vec<MelFilter> {
    let n_bins = n_fft / 2 + 1;
    let fmax = sample_rate as f64 / 2.0;
    let mel_max = hz_to_mel(fmax);
    let hz_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();
    let bin_hz = |k: usize| k as f64 * sample_rate as f64 / n_fft as f64;

    (0..n_mels)
        .map(|m| {
            let (left, center, right) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
            let norm = 2.0 / (right - left);
            let weights: Vec<(usize, f32)> = (0..n_bins)
                .filter_map(|k| {
                    let f = bin_hz(k);
                    let lower = (f - left) / (center - left);
                    let upper = (right - f) / (right - center);
                    let w = lower.min(upper).max(0.0) * norm;
                    (w > 0.0).then_some((k, w as f32))
                })
                .collect();
            match weights.first() {
                Some(&(start_bin, _)) => MelFilter {
                    start_bin,
                    weights: weights.iter().map(|&(_, w)| w).collect(),
                },
                None => MelFilter {
                    start_bin: 0,
                    weights: Vec::new(),
                },
            }
        })
        .collect()
}

/// Orthonormal DCT-II basis, `n_coefficients` rows of `n_mels`.
fn dct_basis(n_coefficients: usize, n_mels: usize) -> Vec<Vec<f32>> {
    let n = n_mels as f64;
    (0..n_coefficients)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_mels)
                .map(|i| (scale * (PI * k as f64 * (2 * i + 1) as f64 / (2.0 * n)).cos()) as f32)
                .collect()
        })
        .collect()
}

/// Precomputed window, filterbank, DCT basis and FFT plan. Shared by all
/// workers; scratch buffers are allocated per call.
pub struct FeatureExtractor {
    config: FeatureConfig,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    mel_filters: Vec<MelFilter>,
    dct: Vec<Vec<f32>>,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        let n_fft = config.frame_size;
        let window: Vec<f32> = (0..n_fft)
            .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / n_fft as f64).cos()) as f32)
            .collect();
        let mel_filters = mel_filterbank(config.mel_bands, n_fft, config.target_sample_rate);
        let dct = dct_basis(config.n_coefficients, config.mel_bands);
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(n_fft);

        Self {
            config,
            fft,
            window,
            mel_filters,
            dct,
        }
    }

    /// Decode `path` and compute its fingerprint.
    pub fn extract_file<D: AudioDecoder + ?Sized>(
        &self,
        decoder: &D,
        path: &Path,
    ) -> Result<Vec<f32>, ExtractError> {
        let decoded = decoder.open(path, self.config.max_duration_secs)?;
        if decoded.samples.is_empty() {
            return Err(ExtractError::EmptyAudio);
        }
        tracing::debug!(
            "Decoded {} ({:.1}s at {} Hz)",
            path.display(),
            decoded.duration_secs(),
            decoded.sample_rate
        );
        let resampled = resample(
            &decoded.samples,
            decoded.sample_rate,
            self.config.target_sample_rate,
        )?;
        self.extract(&resampled)
    }

    /// Fingerprint of a mono signal already at the target sample rate.
    pub fn extract(&self, samples: &[f32]) -> Result<Vec<f32>, ExtractError> {
        if samples.is_empty() {
            return Err(ExtractError::EmptyAudio);
        }
        let mut signal = preemphasis(samples, PREEMPHASIS_COEF);
        normalize_peak(&mut signal);

        let mel_db = self.log_mel_spectrogram(&signal)?;
        Ok(self.cepstrum(&mel_db))
    }

    /// Per-frame log mel energies (dB), clamped to `TOP_DB` below the maximum.
    fn log_mel_spectrogram(&self, signal: &[f32]) -> Result<Vec<Vec<f32>>, ExtractError> {
        let n_fft = self.config.frame_size;
        let hop = self.config.hop_length;
        let half = n_fft / 2;
        let n_frames = frame_count(signal.len(), hop);

        let mut input = self.fft.make_input_vec();
        let mut spectrum = self.fft.make_output_vec();
        let mut power = vec![0.0f32; spectrum.len()];
        let mut frames = Vec::with_capacity(n_frames);
        let mut max_db = f32::NEG_INFINITY;

        for t in 0..n_frames {
            // Frame t is centered on sample t * hop; outside the signal is zero
            let origin = (t * hop) as isize - half as isize;
            for (i, slot) in input.iter_mut().enumerate() {
                let idx = origin + i as isize;
                *slot = if idx >= 0 && (idx as usize) < signal.len() {
                    signal[idx as usize] * self.window[i]
                } else {
                    0.0
                };
            }

            self.fft
                .process(&mut input, &mut spectrum)
                .map_err(|e| ExtractError::Feature(format!("FFT failed: {}", e)))?;
            for (p, c) in power.iter_mut().zip(spectrum.iter()) {
                *p = c.re * c.re + c.im * c.im;
            }

            let frame: Vec<f32> = self
                .mel_filters
                .iter()
                .map(|filter| {
                    let energy: f32 = filter
                        .weights
                        .iter()
                        .zip(&power[filter.start_bin..])
                        .map(|(w, p)| w * p)
                        .sum();
                    10.0 * energy.max(AMIN).log10()
                })
                .collect();
            max_db = frame.iter().fold(max_db, |m, &v| m.max(v));
            frames.push(frame);
        }

        let floor = max_db - TOP_DB;
        for frame in frames.iter_mut() {
            for v in frame.iter_mut() {
                *v = v.max(floor);
            }
        }
        Ok(frames)
    }

    /// DCT of every frame, flattened coefficient-major.
    fn cepstrum(&self, mel_db: &[Vec<f32>]) -> Vec<f32> {
        let n_frames = mel_db.len();
        let mut out = vec![0.0f32; self.dct.len() * n_frames];
        for (k, basis) in self.dct.iter().enumerate() {
            for (t, frame) in mel_db.iter().enumerate() {
                out[k * n_frames + t] = basis.iter().zip(frame).map(|(b, v)| b * v).sum();
            }
        }
        out
    }
}
