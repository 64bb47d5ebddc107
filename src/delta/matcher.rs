// src/delta/matcher.rs

//! Locate an installed pre-image for a delta

use crate::hash::{self, ContentHash};
use crate::manifest::ManifestFile;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Find an installed file whose content hashes to `from`
///
/// Candidates are manifest entries that are regular, live, not ghosted and
/// list `from` as their hash, tried in manifest order. Each candidate is
/// hashed on disk under `root`, and the first that verifies is returned.
/// Candidates that are missing or modified locally are skipped with a
/// warning.
pub fn find_source_file(files: &[ManifestFile], root: &Path, from: &ContentHash) -> Option<PathBuf> {
    // Linear scan per delta; sorting both sides and merging would avoid the
    // quadratic case for large delta sets.
    for file in files {
        if !file.is_live() || !file.is_file() {
            continue;
        }
        if !hash::hashes_equal(file.hash.as_str(), from.as_str()) {
            continue;
        }

        let path = installed_path(root, &file.filename);
        match hash::compute_hash(&path) {
            Ok(actual) if hash::hashes_equal(actual.as_str(), from.as_str()) => return Some(path),
            _ => warn!("File \"{}\" is missing or corrupted", path.display()),
        }
    }

    None
}

pub(crate) fn installed_path(root: &Path, filename: &str) -> PathBuf {
    root.join(filename.trim_start_matches('/'))
}
