//! Error types for the duplicate finder.
//!
//! Per-track problems ([`ExtractError`]) and cache problems ([`CacheError`])
//! are recoverable and never reach the caller as `Err`; only setup problems
//! ([`EngineError`]) abort a run.

use std::path::PathBuf;
use thiserror::Error;

/// Why a single track could not be fingerprinted.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported or unrecognized format: {0}")]
    Unsupported(String),

    #[error("no decodable audio track found")]
    NoAudioTrack,

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("feature computation failed: {0}")]
    Feature(String),

    #[error("file contains no audio samples")]
    EmptyAudio,
}

/// Fingerprint cache could not be read or written.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cache file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt cache entry for {hash}: blob of {len} bytes")]
    CorruptEntry { hash: String, len: usize },
}

/// Setup errors that stop a run before any track is processed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("library directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to scan library: {0}")]
    Scan(#[from] walkdir::Error),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
