// src/filesystem/staged.rs

//! Content-addressed staged file store
//!
//! Files are staged under their own content hash: `staged/{hash}`. A
//! staged entry is only ever created by renaming a fully written and
//! verified temporary file into place, so presence of `staged/H` implies
//! the content hashes to `H` once verification has run.

use crate::error::{Error, Result};
use crate::hash::{self, ContentHash};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Staged file store manager
#[derive(Debug, Clone)]
pub struct StagedStore {
    /// Directory holding staged files (e.g., /var/lib/tpupd/3rd-party/repo/staged)
    staged_dir: PathBuf,
}

impl StagedStore {
    /// Create a staged store rooted at the given directory
    ///
    /// No I/O happens until something is written.
    pub fn new<P: AsRef<Path>>(staged_dir: P) -> Self {
        Self {
            staged_dir: staged_dir.as_ref().to_path_buf(),
        }
    }

    /// Get the staged directory path
    pub fn staged_dir(&self) -> &Path {
        &self.staged_dir
    }

    /// Create the staged directory if it doesn't exist
    pub fn ensure_dir(&self) -> Result<()> {
        if !self.staged_dir.exists() {
            fs::create_dir_all(&self.staged_dir)?;
            debug!("Created staged directory: {}", self.staged_dir.display());
        }
        Ok(())
    }

    /// Get the filesystem path for a given hash (no I/O)
    #[inline]
    pub fn path_for(&self, hash: &ContentHash) -> PathBuf {
        self.staged_dir.join(hash.as_str())
    }

    /// Check if a staged file exists for the hash
    ///
    /// Uses lstat, so a staged symlink counts even if dangling.
    pub fn exists(&self, hash: &ContentHash) -> bool {
        fs::symlink_metadata(self.path_for(hash)).is_ok()
    }

    /// Check that the staged file exists and hashes to its name
    pub fn verify(&self, hash: &ContentHash) -> bool {
        match hash::compute_hash(&self.path_for(hash)) {
            Ok(actual) => hash::hashes_equal(actual.as_str(), hash.as_str()),
            Err(_) => false,
        }
    }

    /// Remove a staged file, if present
    pub fn remove(&self, hash: &ContentHash) -> Result<()> {
        remove_path(&self.path_for(hash))
    }

    /// Create a temporary file inside the staged directory
    ///
    /// Temporary files start with a dot so they never collide with a hash.
    pub fn temp_file(&self) -> Result<NamedTempFile> {
        self.ensure_dir()?;
        tempfile::Builder::new()
            .prefix(".staging-")
            .tempfile_in(&self.staged_dir)
            .map_err(|e| Error::IoError(format!("Failed to create staging file: {}", e)))
    }

    /// Atomically move a verified file into place under `hash`
    pub fn commit(&self, temp: NamedTempFile, hash: &ContentHash) -> Result<PathBuf> {
        let path = self.path_for(hash);
        temp.persist(&path)
            .map_err(|e| Error::IoError(format!("Failed to commit {}: {}", path.display(), e)))?;
        debug!("Staged {}", hash);
        Ok(path)
    }

    /// Remove every staged entry
    pub fn clear(&self) -> Result<()> {
        clear_dir(&self.staged_dir)
    }
}

/// Remove a file, symlink or directory tree; absence is not an error
pub fn remove_path(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Remove the contents of a directory, keeping the directory itself
pub fn clear_dir(dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        if let Err(e) = remove_path(&entry.path()) {
            warn!("Failed to remove {}: {}", entry.path().display(), e);
        }
    }
    Ok(())
}
