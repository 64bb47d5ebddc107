// src/delta/mod.rs

//! Delta reconstruction for efficient updates
//!
//! A delta turns one installed file (the pre-image) into the file an
//! update needs (the post-image) without downloading the latter in full.
//! Deltas are matched to installed files purely by content hash, and every
//! reconstructed file is hash-verified before it enters the staged store.
//!
//! # Architecture
//!
//! - **DeltaCatalog**: enumerates the delta directory and parses names
//! - **find_source_file**: locates and verifies the pre-image on disk
//! - **DeltaApplier**: patches, verifies and commits the post-image
//! - **DeltaGenerator**: produces deltas for publishing
//!
//! # Delta Format
//!
//! ```text
//! delta = zstd_compress(new_content, dictionary=old_content)
//! ```
//!
//! Each delta file is attempted at most once and removed afterwards,
//! whatever the outcome. A rejected delta just means the file is
//! downloaded in full later on.

mod applier;
mod catalog;
mod generator;
mod matcher;

pub use applier::{DeltaApplier, DeltaOutcome, Patcher, ZstdPatcher};
pub use catalog::{
    delta_file_name, parse_delta_name, DeltaCatalog, DeltaFile, DeltaName, SEPARATOR,
};
pub use generator::{DeltaGenerator, DeltaSizes};
pub use matcher::find_source_file;
pub(crate) use matcher::installed_path;

use crate::error::Result;
use crate::manifest::ManifestFile;
use std::path::Path;
use tracing::{debug, info, warn};

/// What happened to the deltas of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaReport {
    pub applied: usize,
    pub rejected: usize,
    pub already_staged: usize,
    pub invalid_name: usize,
    pub missing_source: usize,
}

impl DeltaReport {
    /// Number of delta files processed
    pub fn total(&self) -> usize {
        self.applied + self.rejected + self.already_staged + self.invalid_name + self.missing_source
    }
}

/// Apply every delta found in `delta_dir`
///
/// `files` is the consolidated manifest of the installed version and
/// `root` the directory it is installed under. Nothing here is fatal to
/// the update; only failing to read the delta directory is an error.
pub fn apply_deltas<P: Patcher>(
    files: &[ManifestFile],
    root: &Path,
    delta_dir: &Path,
    applier: &DeltaApplier<P>,
) -> Result<DeltaReport> {
    let mut report = DeltaReport::default();

    for delta in DeltaCatalog::open(delta_dir)? {
        apply_one(&delta, files, root, applier, &mut report);
        // `delta` is dropped here, removing it from disk
    }

    if report.total() > 0 {
        info!(
            "Deltas: {} applied, {} rejected, {} already staged, {} invalid, {} without source",
            report.applied,
            report.rejected,
            report.already_staged,
            report.invalid_name,
            report.missing_source
        );
    }
    Ok(report)
}

fn apply_one<P: Patcher>(
    delta: &DeltaFile,
    files: &[ManifestFile],
    root: &Path,
    applier: &DeltaApplier<P>,
    report: &mut DeltaReport,
) {
    let Some(name) = delta.parse() else {
        warn!("Invalid name for delta file {}", delta.path().display());
        report.invalid_name += 1;
        return;
    };

    if applier.staged().exists(&name.to) {
        debug!("{} is already staged, skipping delta", name.to.short());
        report.already_staged += 1;
        return;
    }

    let Some(source) = find_source_file(files, root, &name.from) else {
        warn!(
            "Couldn't find a valid source for delta {}",
            delta.path().display()
        );
        info!("Consider running a repair to restore corrupted files");
        report.missing_source += 1;
        return;
    };

    match applier.apply(&source, delta.path(), &name.to) {
        DeltaOutcome::Applied(_) => report.applied += 1,
        DeltaOutcome::Rejected(_) => report.rejected += 1,
    }
}
