// src/delta/applier.rs

//! Delta applier to reconstruct a new file from its pre-image + delta
//!
//! The reconstructed file is written to a temporary file in the staged
//! store, given the source's owner, permission bits and extended attributes,
//! hashed, and only renamed to `staged/{hash}` if the hash matches.
//! Acceptance depends on the final hash alone, not on whether the patch
//! tool reported success.

use crate::error::{Error, Result};
use crate::filesystem::{copy_ownership, StagedStore};
use crate::hash::{self, ContentHash};
use crate::xattrs;
use std::fs::{self, Permissions};
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Binary patch tool
pub trait Patcher {
    /// Reconstruct the post-image from the pre-image and a delta payload
    fn patch(&self, source: &[u8], delta: &[u8]) -> Result<Vec<u8>>;
}

/// zstd dictionary decompression with the pre-image as dictionary
#[derive(Debug, Default, Clone, Copy)]
pub struct ZstdPatcher;

impl Patcher for ZstdPatcher {
    fn patch(&self, source: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
        // Create decoder dictionary from old version (copied for 'static lifetime)
        let decoder_dict = zstd::dict::DecoderDictionary::copy(source);

        let mut decoder = zstd::Decoder::with_prepared_dictionary(delta, &decoder_dict)
            .map_err(|e| Error::DeltaError(format!("Failed to create decoder: {}", e)))?;

        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| Error::DeltaError(format!("Failed to read decompressed data: {}", e)))?;

        Ok(decompressed)
    }
}

/// Result of one delta application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// The verified post-image is staged at this path
    Applied(PathBuf),
    /// Nothing was staged
    Rejected(String),
}

impl DeltaOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Delta applier committing verified results into the staged store
pub struct DeltaApplier<P: Patcher = ZstdPatcher> {
    staged: StagedStore,
    patcher: P,
}

impl DeltaApplier {
    /// Create a new delta applier using the zstd patch format
    pub fn new(staged: StagedStore) -> Self {
        Self::with_patcher(staged, ZstdPatcher)
    }
}

impl<P: Patcher> DeltaApplier<P> {
    pub fn with_patcher(staged: StagedStore, patcher: P) -> Self {
        Self { staged, patcher }
    }

    pub fn staged(&self) -> &StagedStore {
        &self.staged
    }

    pub fn patcher(&self) -> &P {
        &self.patcher
    }

    /// Apply a delta to create `staged/{expected_to_hash}`
    ///
    /// # Arguments
    /// * `from_path` - Verified pre-image on disk
    /// * `delta_path` - Path to delta file
    /// * `expected_to_hash` - Hash the result must have to be accepted
    pub fn apply(
        &self,
        from_path: &Path,
        delta_path: &Path,
        expected_to_hash: &ContentHash,
    ) -> DeltaOutcome {
        match self.try_apply(from_path, delta_path, expected_to_hash) {
            Ok(path) => {
                info!(
                    "Applied delta {} -> {}",
                    from_path.display(),
                    expected_to_hash.short()
                );
                DeltaOutcome::Applied(path)
            }
            Err(e) => {
                warn!("Couldn't use delta file {}: {}", delta_path.display(), e);
                DeltaOutcome::Rejected(e.to_string())
            }
        }
    }

    fn try_apply(
        &self,
        from_path: &Path,
        delta_path: &Path,
        expected_to_hash: &ContentHash,
    ) -> Result<PathBuf> {
        let source = fs::read(from_path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", from_path.display(), e)))?;
        let delta = fs::read(delta_path)
            .map_err(|e| Error::IoError(format!("Failed to read delta file: {}", e)))?;
        debug!(
            "Patching {} ({} bytes) with {} byte delta",
            from_path.display(),
            source.len(),
            delta.len()
        );

        let content = self.patcher.patch(&source, &delta)?;

        // The temp file is removed when dropped on any early return below
        let mut temp = self.staged.temp_file()?;
        temp.write_all(&content)?;
        temp.as_file().sync_all()?;

        // chown clears setuid/setgid, so ownership goes first
        copy_ownership(from_path, temp.path())?;
        let mode = fs::metadata(from_path)?.permissions().mode() & 0o7777;
        fs::set_permissions(temp.path(), Permissions::from_mode(mode))?;
        xattrs::copy(from_path, temp.path());

        let actual = hash::compute_hash(temp.path())?;
        if !hash::hashes_equal(actual.as_str(), expected_to_hash.as_str()) {
            return Err(Error::ChecksumMismatch {
                expected: expected_to_hash.to_string(),
                actual: actual.to_string(),
            });
        }

        self.staged.commit(temp, expected_to_hash)
    }
}
