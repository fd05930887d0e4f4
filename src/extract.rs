//! Parallel fingerprint extraction.
//!
//! Tracks are fanned out to a fixed-size worker pool. Each worker hashes its
//! file, checks a read-only snapshot of the cache, and otherwise decodes and
//! fingerprints it. Results come back over a channel to the calling thread,
//! which is the only place the cache, counters and progress bar are mutated.

use crossbeam_channel::{unbounded, Sender};
use rayon::ThreadPoolBuilder;
use std::any::Any;
use std::convert::Infallible;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use crate::audio::AudioDecoder;
use crate::cache::{content_hash, FingerprintCache, FingerprintMap};
use crate::config::EngineConfig;
use crate::error::{EngineError, ExtractError};
use crate::features::FeatureExtractor;
use crate::models::{FailureRecord, FeatureVector, Track, TrackStatus};
use crate::progress::ExtractionProgress;

/// What a worker found out about one track.
#[derive(Debug)]
enum Outcome {
    Cached {
        hash: String,
        features: FeatureVector,
    },
    Computed {
        hash: String,
        features: Vec<f32>,
    },
    Failed {
        hash: Option<String>,
        reason: String,
    },
}

#[derive(Debug)]
struct TaskResult {
    index: usize,
    outcome: Outcome,
}

/// All tracks of a run after extraction, in input order.
#[derive(Debug, Default)]
pub struct Extraction {
    pub tracks: Vec<Track>,
    pub failures: Vec<FailureRecord>,
    pub cached: usize,
    pub computed: usize,
}

impl Extraction {
    /// Tracks that have a feature vector, in input order.
    pub fn successful(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.features.is_some())
    }
}

fn process_track<D: AudioDecoder + ?Sized>(
    path: &std::path::Path,
    snapshot: &FingerprintMap,
    decoder: &D,
    extractor: &FeatureExtractor,
) -> Outcome {
    let hash = match content_hash(path) {
        Ok(h) => h,
        Err(source) => {
            let err = ExtractError::Io {
                path: path.to_path_buf(),
                source,
            };
            return Outcome::Failed {
                hash: None,
                reason: err.to_string(),
            };
        }
    };

    if let Some(features) = snapshot.get(&hash) {
        tracing::debug!("Cache hit for {}", path.display());
        return Outcome::Cached {
            hash,
            features: Arc::clone(features),
        };
    }

    match extractor.extract_file(decoder, path) {
        Ok(features) => Outcome::Computed { hash, features },
        Err(e) => Outcome::Failed {
            hash: Some(hash),
            reason: e.to_string(),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", s)
    } else {
        "worker panicked".to_string()
    }
}

fn run_task<D: AudioDecoder + ?Sized>(
    index: usize,
    path: &std::path::Path,
    snapshot: &FingerprintMap,
    decoder: &D,
    extractor: &FeatureExtractor,
    tx: &Sender<TaskResult>,
) {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        process_track(path, snapshot, decoder, extractor)
    }))
    .unwrap_or_else(|payload| Outcome::Failed {
        hash: None,
        reason: panic_message(payload.as_ref()),
    });

    // The receiver outlives every task; a send error only means the run is unwinding
    let _ = tx.send(TaskResult { index, outcome });
}

/// Single-writer side of the pipeline.
struct ExtractionAccumulator<'a> {
    cache: &'a mut FingerprintCache,
    tracks: Vec<Track>,
    failures: Vec<(usize, FailureRecord)>,
    cached: usize,
    computed: usize,
}

impl<'a> ExtractionAccumulator<'a> {
    fn new(cache: &'a mut FingerprintCache, paths: &[PathBuf]) -> Self {
        Self {
            cache,
            tracks: paths.iter().cloned().map(Track::new).collect(),
            failures: Vec::new(),
            cached: 0,
            computed: 0,
        }
    }

    fn record(&mut self, result: TaskResult) {
        let track = &mut self.tracks[result.index];
        match result.outcome {
            Outcome::Cached { hash, features } => {
                track.features = Some(features);
                track.content_hash = Some(hash);
                track.status = TrackStatus::Cached;
                self.cached += 1;
            }
            Outcome::Computed { hash, features } => {
                // Another worker may already have stored the same content
                let mut fresh = false;
                let stored = match self.cache.get_or_compute(&hash, || {
                    fresh = true;
                    Ok::<_, Infallible>(Arc::from(features))
                }) {
                    Ok(v) => v,
                    Err(never) => match never {},
                };
                track.features = Some(stored);
                track.content_hash = Some(hash);
                if fresh {
                    track.status = TrackStatus::Computed;
                    self.computed += 1;
                } else {
                    track.status = TrackStatus::Cached;
                    self.cached += 1;
                }
            }
            Outcome::Failed { hash, reason } => {
                tracing::warn!("Skipping {}: {}", track.path.display(), reason);
                track.content_hash = hash.clone();
                track.status = TrackStatus::Failed;
                self.failures.push((
                    result.index,
                    FailureRecord {
                        path: track.path.clone(),
                        content_hash: hash,
                        reason,
                    },
                ));
            }
        }
    }

    fn finish(mut self) -> Extraction {
        self.failures.sort_by_key(|(index, _)| *index);
        Extraction {
            tracks: self.tracks,
            failures: self.failures.into_iter().map(|(_, f)| f).collect(),
            cached: self.cached,
            computed: self.computed,
        }
    }
}

/// Fingerprint every path using `config.workers` threads.
///
/// Per-track failures are recorded, never returned as `Err`. New vectors are
/// added to `cache` in memory; persisting it is the caller's job.
pub fn extract_all<D: AudioDecoder + ?Sized>(
    paths: &[PathBuf],
    cache: &mut FingerprintCache,
    decoder: &D,
    config: &EngineConfig,
) -> Result<Extraction, EngineError> {
    config.validate()?;
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .thread_name(|i| format!("extract-{}", i))
        .build()?;

    let extractor = FeatureExtractor::new(config.features.clone());
    let snapshot = cache.snapshot();
    let mut progress = ExtractionProgress::new(paths.len() as u64);
    let mut acc = ExtractionAccumulator::new(cache, paths);

    tracing::info!(
        "Extracting fingerprints for {} tracks with {} workers ({} cached entries)",
        paths.len(),
        config.workers,
        snapshot.len()
    );

    pool.in_place_scope(|s| {
        let (tx, rx) = unbounded::<TaskResult>();
        for (index, path) in paths.iter().enumerate() {
            let tx = tx.clone();
            let snapshot = &snapshot;
            let extractor = &extractor;
            s.spawn(move |_| run_task(index, path, snapshot, decoder, extractor, &tx));
        }
        drop(tx);

        for result in rx {
            acc.record(result);
            progress.track_done();
        }
    });

    progress.finish();
    let extraction = acc.finish();
    tracing::info!(
        "Extraction done: {} cached, {} computed, {} failed",
        extraction.cached,
        extraction.computed,
        extraction.failures.len()
    );
    Ok(extraction)
}
