// src/delta/generator.rs

//! Delta producer for the zstd patch format
//!
//! The post-image is compressed with the pre-image as dictionary. Used to
//! publish deltas into a mirror and by the test fixtures.

use super::catalog::delta_file_name;
use crate::error::{Error, Result};
use crate::hash::{self, ContentHash};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default zstd compression level (3 = fast, good compression)
const COMPRESSION_LEVEL: i32 = 3;

/// Sizes involved in one generated delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaSizes {
    pub old_size: u64,
    pub new_size: u64,
    pub delta_size: u64,
}

impl DeltaSizes {
    /// Fraction of the post-image size saved by shipping the delta
    pub fn savings(&self) -> f64 {
        if self.new_size == 0 {
            return 0.0;
        }
        1.0 - self.delta_size as f64 / self.new_size as f64
    }
}

#[derive(Debug, Clone)]
pub struct DeltaGenerator {
    level: i32,
}

impl Default for DeltaGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaGenerator {
    pub fn new() -> Self {
        Self {
            level: COMPRESSION_LEVEL,
        }
    }

    pub fn with_level(level: i32) -> Self {
        Self { level }
    }

    /// Write a delta turning `old_path` into `new_path` to `output_path`
    pub fn generate(&self, old_path: &Path, new_path: &Path, output_path: &Path) -> Result<DeltaSizes> {
        let old_content = fs::read(old_path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", old_path.display(), e)))?;
        let new_content = fs::read(new_path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", new_path.display(), e)))?;

        let delta = self.compress_with_dictionary(&new_content, &old_content)?;

        let mut file = fs::File::create(output_path)
            .map_err(|e| Error::IoError(format!("Failed to create delta file: {}", e)))?;
        file.write_all(&delta)
            .map_err(|e| Error::IoError(format!("Failed to write delta file: {}", e)))?;

        let sizes = DeltaSizes {
            old_size: old_content.len() as u64,
            new_size: new_content.len() as u64,
            delta_size: delta.len() as u64,
        };
        debug!(
            "Delta {}: {} -> {} bytes via {} byte delta",
            output_path.display(),
            sizes.old_size,
            sizes.new_size,
            sizes.delta_size
        );
        Ok(sizes)
    }

    /// Write a delta into `delta_dir` under its hash-pair name
    ///
    /// Both hashes are computed from the files on disk.
    pub fn generate_named(&self, old_path: &Path, new_path: &Path, delta_dir: &Path) -> Result<PathBuf> {
        let from: ContentHash = hash::compute_hash(old_path)?;
        let to: ContentHash = hash::compute_hash(new_path)?;
        fs::create_dir_all(delta_dir)?;

        let output = delta_dir.join(delta_file_name(&from, &to));
        let sizes = self.generate(old_path, new_path, &output)?;
        info!(
            "Generated delta {} -> {} ({:.1}% saved)",
            from.short(),
            to.short(),
            sizes.savings() * 100.0
        );
        Ok(output)
    }

    fn compress_with_dictionary(&self, data: &[u8], dictionary: &[u8]) -> Result<Vec<u8>> {
        // Copied for 'static lifetime
        let encoder_dict = zstd::dict::EncoderDictionary::copy(dictionary, self.level);

        let mut encoder = zstd::Encoder::with_prepared_dictionary(Vec::new(), &encoder_dict)
            .map_err(|e| Error::DeltaError(format!("Failed to create encoder: {}", e)))?;

        encoder
            .write_all(data)
            .map_err(|e| Error::DeltaError(format!("Failed to write data: {}", e)))?;

        encoder
            .finish()
            .map_err(|e| Error::DeltaError(format!("Failed to finish compression: {}", e)))
    }
}
