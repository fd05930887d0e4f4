//! End-to-end duplicate finding: scan, extract, partition, cluster, assemble.

use rayon::prelude::*;
use std::path::Path;
use std::time::Instant;

use crate::assemble::assemble;
use crate::audio::{AudioDecoder, SymphoniaDecoder};
use crate::cache::FingerprintCache;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::extract::extract_all;
use crate::hierarchy::fine_cluster;
use crate::models::{DedupReport, DuplicateCluster, RunStats, Track};
use crate::partition::{bucket_count, partition};
use crate::progress::{clustering_spinner, format_duration};
use crate::scan::scan_library;
use crate::similarity::similarity_matrix;

/// Clustering result before singleton filtering.
#[derive(Debug, Clone, Default)]
pub struct Clustering {
    /// Sub-clusters of each bucket, buckets in partition order
    pub sub_clusters: Vec<Vec<DuplicateCluster>>,
    pub buckets: usize,
}

/// Partition and fine-cluster every track that has features.
///
/// Tracks are sorted by path first, so the outcome does not depend on the
/// order extraction finished in. The bucket count is derived from the tracks
/// that were fingerprinted; failed tracks do not count towards it.
pub fn cluster_tracks(tracks: &[Track], config: &EngineConfig) -> Clustering {
    let mut usable: Vec<&Track> = tracks.iter().filter(|t| t.features.is_some()).collect();
    usable.sort_by(|a, b| a.path.cmp(&b.path));

    let vectors: Vec<&[f32]> = usable
        .iter()
        .filter_map(|t| t.features.as_deref())
        .collect();
    if vectors.is_empty() {
        return Clustering::default();
    }

    let k = bucket_count(vectors.len(), config.tracks_per_bucket);
    let buckets = partition(
        &vectors,
        k,
        config.partition_seed,
        config.max_kmeans_iterations,
    );
    tracing::info!(
        "Partitioned {} tracks into {} buckets (k = {})",
        vectors.len(),
        buckets.len(),
        k
    );

    let sub_clusters: Vec<Vec<DuplicateCluster>> = buckets
        .par_iter()
        .map(|bucket| {
            let path_of = |i: usize| usable[i].path.clone();
            if bucket.len() <= 1 {
                return vec![bucket.members.iter().map(|&i| path_of(i)).collect()];
            }

            let members: Vec<&[f32]> = bucket.members.iter().map(|&i| vectors[i]).collect();
            let matrix = similarity_matrix(&members);
            let groups = fine_cluster(&matrix, config.distance_threshold);
            tracing::debug!(
                "Bucket {}: {} tracks -> {} sub-clusters",
                bucket.id,
                bucket.len(),
                groups.len()
            );
            groups
                .into_iter()
                .map(|group| {
                    group
                        .into_iter()
                        .map(|local| path_of(bucket.members[local]))
                        .collect()
                })
                .collect()
        })
        .collect();

    Clustering {
        buckets: buckets.len(),
        sub_clusters,
    }
}

/// Finds duplicate recordings under a library root.
pub struct DuplicateFinder<D: AudioDecoder = SymphoniaDecoder> {
    config: EngineConfig,
    decoder: D,
}

impl DuplicateFinder<SymphoniaDecoder> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_decoder(config, SymphoniaDecoder)
    }
}

impl<D: AudioDecoder> DuplicateFinder<D> {
    pub fn with_decoder(config: EngineConfig, decoder: D) -> Self {
        Self { config, decoder }
    }

    /// Run the whole pipeline over `root`.
    ///
    /// Only setup problems are errors: files that cannot be decoded end up in
    /// the report's failures, and a cache that cannot be saved is logged.
    pub fn find_duplicates(&self, root: &Path) -> Result<DedupReport, EngineError> {
        self.config.validate()?;
        let start = Instant::now();

        let paths = scan_library(root)?;
        tracing::info!("Found {} audio files under {}", paths.len(), root.display());

        let mut cache = FingerprintCache::load(&self.config.cache_path);
        let extraction = extract_all(&paths, &mut cache, &self.decoder, &self.config)?;

        if let Err(e) = cache.persist() {
            tracing::warn!(
                "Failed to save fingerprint cache {}: {}",
                cache.path().display(),
                e
            );
        }

        let spinner = clustering_spinner();
        let clustering = cluster_tracks(&extraction.tracks, &self.config);
        spinner.finish_and_clear();

        let mut report = assemble(
            clustering.sub_clusters,
            extraction.failures,
            self.config.debug,
        );
        report.stats = RunStats {
            scanned: paths.len(),
            cached: extraction.cached,
            computed: extraction.computed,
            failed: report.failures.len(),
            buckets: clustering.buckets,
            elapsed: start.elapsed(),
        };

        tracing::info!(
            "Found {} duplicate groups in {}",
            report.clusters.len(),
            format_duration(report.stats.elapsed)
        );
        Ok(report)
    }
}
