//! Engine configuration.
//!
//! Every field has a default; a JSON file may override any subset of them.
//! The 0.12 threshold and the 20-tracks-per-bucket heuristic are empirical
//! tuning knobs, not derived constants.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// Default location of the fingerprint cache, relative to the working directory.
pub const DEFAULT_CACHE_FILE: &str = "fingerprint_cache.sqlite3";

/// Parameters of the cepstral feature extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Every file is resampled to this rate before analysis (Hz)
    pub target_sample_rate: u32,
    /// Cepstral coefficients kept per frame
    pub n_coefficients: usize,
    /// Mel filterbank size
    pub mel_bands: usize,
    /// Analysis frame length in samples (also the FFT size)
    pub frame_size: usize,
    /// Samples between successive frames
    pub hop_length: usize,
    /// Decoding stops after this many seconds of source audio
    pub max_duration_secs: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 8000,
            n_coefficients: 30,
            mel_bands: 128,
            frame_size: 16384,
            hop_length: 2048,
            max_duration_secs: 600,
        }
    }
}

/// Full configuration for one duplicate-finding run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub features: FeatureConfig,
    /// Size of the extraction worker pool
    pub workers: usize,
    /// Fine clustering cut height; practical range is roughly 0.1 to 0.2
    pub distance_threshold: f64,
    /// Keep singleton clusters in the output
    pub debug: bool,
    /// Target tracks per coarse bucket
    pub tracks_per_bucket: usize,
    /// Seed for k-means++ initialization
    pub partition_seed: u64,
    pub max_kmeans_iterations: usize,
    pub cache_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            workers: 8,
            distance_threshold: 0.12,
            debug: false,
            tracks_per_bucket: 20,
            partition_seed: 0,
            max_kmeans_iterations: 300,
            cache_path: PathBuf::from(DEFAULT_CACHE_FILE),
        }
    }
}

impl EngineConfig {
    /// Load config from a JSON file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let f = &self.features;
        let invalid = |msg: &str| Err(EngineError::InvalidConfig(msg.to_string()));

        if f.target_sample_rate == 0 {
            return invalid("target_sample_rate must be positive");
        }
        if f.n_coefficients == 0 || f.mel_bands == 0 {
            return invalid("n_coefficients and mel_bands must be positive");
        }
        if f.n_coefficients > f.mel_bands {
            return invalid("n_coefficients cannot exceed mel_bands");
        }
        if f.frame_size < 2 || f.hop_length == 0 {
            return invalid("frame_size must be at least 2 and hop_length positive");
        }
        if f.hop_length > f.frame_size {
            return invalid("hop_length cannot exceed frame_size");
        }
        if f.max_duration_secs == 0 {
            return invalid("max_duration_secs must be positive");
        }
        if self.workers == 0 {
            return invalid("workers must be positive");
        }
        if !self.distance_threshold.is_finite() || self.distance_threshold < 0.0 {
            return invalid("distance_threshold must be a finite, non-negative number");
        }
        if self.tracks_per_bucket == 0 {
            return invalid("tracks_per_bucket must be positive");
        }
        Ok(())
    }
}
