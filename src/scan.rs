//! Library scanning: find the audio files under a directory tree.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::EngineError;

static AUDIO_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(wav|mp3|flac|ogg|aac|m4a)$").expect("valid regex"));

/// True if the file name carries one of the supported audio extensions.
pub fn is_audio_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| AUDIO_EXTENSION.is_match(n))
}

/// Recursively collect audio files under `root`, sorted by path.
///
/// Unreadable entries below the root are skipped; an unreadable root is an error.
pub fn scan_library(root: &Path) -> Result<Vec<PathBuf>, EngineError> {
    if !root.is_dir() {
        return Err(EngineError::MissingDirectory(root.to_path_buf()));
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_audio_file(entry.path()) {
            paths.push(entry.into_path());
        }
    }

    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_audio_file_case_insensitive() {
        assert!(is_audio_file(Path::new("/music/Track.FLAC")));
        assert!(is_audio_file(Path::new("song.m4a")));
        assert!(!is_audio_file(Path::new("cover.jpg")));
        assert!(!is_audio_file(Path::new("notes.mp3.txt")));
        assert!(!is_audio_file(Path::new("wav")));
    }

    #[test]
    fn test_scan_library_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("album");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("b.mp3"), b"x").unwrap();
        fs::write(nested.join("a.ogg"), b"x").unwrap();
        fs::write(dir.path().join("folder.jpg"), b"x").unwrap();

        let paths = scan_library(dir.path()).unwrap();
        assert_eq!(paths, vec![nested.join("a.ogg"), dir.path().join("b.mp3")]);
    }

    #[test]
    fn test_scan_library_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            scan_library(&missing),
            Err(EngineError::MissingDirectory(_))
        ));
    }
}
