//! Persistent fingerprint cache keyed by content hash.
//!
//! The whole cache is loaded into memory when a run starts and written back
//! when it ends. Writing removes the old file first, so a crash mid-write
//! loses the cache; the next run recomputes every fingerprint.
//!
//! ```sql
//! CREATE TABLE fingerprints (
//!     content_hash TEXT PRIMARY KEY,
//!     features     BLOB NOT NULL   -- little-endian f32 sequence
//! );
//! ```

use rusqlite::{params, Connection};
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::CacheError;
use crate::models::FeatureVector;

const WRITE_BATCH_SIZE: usize = 1_000;

/// Content hash → feature vector map.
pub type FingerprintMap = FxHashMap<String, FeatureVector>;

/// SHA-256 of the file's bytes, hex encoded.
pub fn content_hash(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::with_capacity(64 * 1024, File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub struct FingerprintCache {
    path: PathBuf,
    entries: FingerprintMap,
}

impl FingerprintCache {
    /// Empty cache that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: FingerprintMap::default(),
        }
    }

    /// Load the cache at `path`. A missing, unreadable or corrupt file gives
    /// an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !path.exists() {
            tracing::debug!("No fingerprint cache at {}", path.display());
            return Self::new(path);
        }

        match read_entries(&path) {
            Ok(entries) => {
                tracing::info!(
                    "Loaded {} cached fingerprints from {}",
                    entries.len(),
                    path.display()
                );
                Self { path, entries }
            }
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable fingerprint cache {}: {}",
                    path.display(),
                    e
                );
                Self::new(path)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, hash: &str) -> Option<&FeatureVector> {
        self.entries.get(hash)
    }

    /// Return the vector cached under `hash`, or compute, store and return it.
    /// A failed computation stores nothing.
    pub fn get_or_compute<F, E>(&mut self, hash: &str, compute: F) -> Result<FeatureVector, E>
    where
        F: FnOnce() -> Result<FeatureVector, E>,
    {
        if let Some(existing) = self.entries.get(hash) {
            return Ok(Arc::clone(existing));
        }
        let computed = compute()?;
        self.entries.insert(hash.to_string(), Arc::clone(&computed));
        Ok(computed)
    }

    /// Read-only copy of the entries for worker threads. Vectors are shared, not copied.
    pub fn snapshot(&self) -> FingerprintMap {
        self.entries.clone()
    }

    /// Overwrite the cache file with every entry.
    pub fn persist(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }

        let mut conn = Connection::open(&self.path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = OFF;
             PRAGMA synchronous = OFF;

             CREATE TABLE fingerprints (
                 content_hash TEXT PRIMARY KEY,
                 features     BLOB NOT NULL
             );",
        )?;

        // Sorted so identical caches produce identical files
        let mut hashes: Vec<&String> = self.entries.keys().collect();
        hashes.sort_unstable();

        for chunk in hashes.chunks(WRITE_BATCH_SIZE) {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO fingerprints (content_hash, features) VALUES (?1, ?2)",
                )?;
                for hash in chunk {
                    stmt.execute(params![hash, encode_features(&self.entries[*hash])])?;
                }
            }
            tx.commit()?;
        }

        tracing::info!(
            "Saved {} fingerprints to {}",
            self.entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<FingerprintMap, CacheError> {
    let conn = Connection::open(path)?;
    let mut stmt = conn.prepare("SELECT content_hash, features FROM fingerprints")?;
    let mut rows = stmt.query([])?;

    let mut entries = FingerprintMap::default();
    while let Some(row) = rows.next()? {
        let hash: String = row.get(0)?;
        let blob: Vec<u8> = row.get(1)?;
        let features = decode_features(&blob).ok_or_else(|| CacheError::CorruptEntry {
            hash: hash.clone(),
            len: blob.len(),
        })?;
        entries.insert(hash, features);
    }
    Ok(entries)
}

fn encode_features(features: &[f32]) -> Vec<u8> {
    features.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_features(blob: &[u8]) -> Option<FeatureVector> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f32]) -> FeatureVector {
        Arc::from(values)
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FingerprintCache::load(dir.path().join("absent.sqlite3"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite3");
        std::fs::write(&path, b"definitely not a sqlite database, just some bytes").unwrap();

        let cache = FingerprintCache::load(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.sqlite3");

        let mut cache = FingerprintCache::new(&path);
        cache
            .get_or_compute("abc", || Ok::<_, ()>(vector(&[1.0, -2.5, 3.25])))
            .unwrap();
        cache
            .get_or_compute("def", || Ok::<_, ()>(vector(&[])))
            .unwrap();
        cache.persist().unwrap();

        let reloaded = FingerprintCache::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(&**reloaded.get("abc").unwrap(), &[1.0, -2.5, 3.25]);
        assert!(reloaded.get("def").unwrap().is_empty());
    }

    #[test]
    fn test_persist_overwrites_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite3");

        let mut first = FingerprintCache::new(&path);
        first.get_or_compute("old", || Ok::<_, ()>(vector(&[1.0]))).unwrap();
        first.persist().unwrap();

        let mut second = FingerprintCache::new(&path);
        second.get_or_compute("new", || Ok::<_, ()>(vector(&[2.0]))).unwrap();
        second.persist().unwrap();

        let reloaded = FingerprintCache::load(&path);
        assert!(reloaded.get("old").is_none());
        assert!(reloaded.get("new").is_some());
    }

    #[test]
    fn test_get_or_compute_reuses_existing_entry() {
        let mut cache = FingerprintCache::new("unused.sqlite3");
        let first = cache
            .get_or_compute("h", || Ok::<_, ()>(vector(&[0.5, 0.5])))
            .unwrap();
        let second = cache
            .get_or_compute("h", || -> Result<FeatureVector, ()> {
                panic!("compute must not run on a cache hit")
            })
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_get_or_compute_failure_stores_nothing() {
        let mut cache = FingerprintCache::new("unused.sqlite3");
        let result = cache.get_or_compute("h", || Err::<FeatureVector, _>("boom"));
        assert_eq!(result.unwrap_err(), "boom");
        assert!(cache.get("h").is_none());
    }

    #[test]
    fn test_content_hash_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.mp3");
        let b = dir.path().join("b.flac");
        let c = dir.path().join("c.mp3");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();
        std::fs::write(&c, b"other bytes").unwrap();

        let ha = content_hash(&a).unwrap();
        assert_eq!(ha, content_hash(&b).unwrap());
        assert_ne!(ha, content_hash(&c).unwrap());
        assert_eq!(ha.len(), 64);
    }

    #[test]
    fn test_decode_rejects_truncated_blob() {
        assert!(decode_features(&[0, 0, 0]).is_none());
        assert_eq!(&*decode_features(&encode_features(&[1.5])).unwrap(), &[1.5]);
    }
}
