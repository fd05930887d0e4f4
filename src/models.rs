//! Core data models for the duplicate finder.
//!
//! This module contains the struct definitions, type aliases, and enums
//! shared across the extraction and clustering pipeline.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Type Aliases
// ============================================================================

/// Acoustic fingerprint. Shared between the cache and every track with the
/// same content hash.
pub type FeatureVector = Arc<[f32]>;

/// Ordered list of paths judged to be the same recording.
pub type DuplicateCluster = Vec<PathBuf>;

// ============================================================================
// Tracks
// ============================================================================

/// Where a track's feature vector came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Pending,
    Cached,
    Computed,
    Failed,
}

/// One audio file in the current run.
#[derive(Debug, Clone)]
pub struct Track {
    pub path: PathBuf,
    pub content_hash: Option<String>,
    pub features: Option<FeatureVector>,
    pub status: TrackStatus,
}

impl Track {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            content_hash: None,
            features: None,
            status: TrackStatus::Pending,
        }
    }

    /// Track whose features are known; used when clustering precomputed vectors.
    pub fn with_features(path: PathBuf, features: FeatureVector) -> Self {
        Self {
            path,
            content_hash: None,
            features: Some(features),
            status: TrackStatus::Computed,
        }
    }
}

/// A track that could not be fingerprinted. Excluded from clustering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub path: PathBuf,
    /// Absent when the file could not even be read
    pub content_hash: Option<String>,
    pub reason: String,
}

// ============================================================================
// Clustering
// ============================================================================

/// Coarse partition: tracks that will be compared pairwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub id: usize,
    /// Indices into the partitioned track list, in input order
    pub members: Vec<usize>,
}

impl Bucket {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Square symmetric matrix of pairwise similarities within one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    size: usize,
    values: Vec<f64>,
}

impl SimilarityMatrix {
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            values: vec![0.0; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.size + j]
    }

    /// Sets both (i, j) and (j, i).
    pub fn set_symmetric(&mut self, i: usize, j: usize, value: f64) {
        self.values[i * self.size + j] = value;
        self.values[j * self.size + i] = value;
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.size..(i + 1) * self.size]
    }
}

// ============================================================================
// Report
// ============================================================================

/// Counters collected over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub scanned: usize,
    pub cached: usize,
    pub computed: usize,
    pub failed: usize,
    pub buckets: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Result of one run, handed to whatever lists or acts on the duplicates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupReport {
    pub clusters: Vec<DuplicateCluster>,
    pub failures: Vec<FailureRecord>,
    pub stats: RunStats,
}
