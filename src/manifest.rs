// src/manifest.rs

//! Manifest abstraction consumed by the update engine
//!
//! A manifest lists the files of one bundle at one version. The manifest
//! of record (MoM) is a manifest whose entries name bundles: each entry's
//! `filename` is a bundle name and its `last_change` is the version of
//! that bundle's manifest.
//!
//! Manifests are read-only input to the core. Parsing them is the job of
//! an [`UpdateBackend`]; the JSON helpers here serve the local mirror.

use crate::error::{Error, Result};
use crate::hash::ContentHash;
use crate::repository::{Repository, UpdateBackend};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Kind of filesystem object a manifest entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[default]
    File,
    Directory,
    Symlink,
}

/// One file tracked by a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Path relative to the install root (leading slash allowed)
    pub filename: String,

    /// Expected content hash
    pub hash: ContentHash,

    /// Version in which the entry last changed
    #[serde(default)]
    pub last_change: u32,

    #[serde(default)]
    pub kind: FileKind,

    #[serde(default)]
    pub is_deleted: bool,

    #[serde(default)]
    pub is_ghosted: bool,

    /// The same file's entry in the previously installed version
    #[serde(skip)]
    pub peer: Option<Box<ManifestFile>>,
}

impl ManifestFile {
    /// Create a live regular file entry
    pub fn new(filename: impl Into<String>, hash: ContentHash, last_change: u32) -> Self {
        Self {
            filename: filename.into(),
            hash,
            last_change,
            kind: FileKind::File,
            is_deleted: false,
            is_ghosted: false,
            peer: None,
        }
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    /// Whether the entry describes something present on disk
    #[inline]
    pub fn is_live(&self) -> bool {
        !self.is_deleted && !self.is_ghosted
    }
}

/// A bundle manifest, or the manifest of record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,

    pub version: u32,

    /// Bundles this bundle always pulls in
    #[serde(default)]
    pub includes: Vec<String>,

    /// Bundles pulled in unless optional bundles are skipped
    #[serde(default)]
    pub optional: Vec<String>,

    #[serde(default)]
    pub files: Vec<ManifestFile>,
}

impl Manifest {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            includes: Vec::new(),
            optional: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Parse a manifest from JSON
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Find an entry by filename
    pub fn find(&self, filename: &str) -> Option<&ManifestFile> {
        self.files.iter().find(|f| f.filename == filename)
    }
}

/// Merge the file lists of several bundle manifests
///
/// The result is sorted by filename with one entry per filename. When
/// bundles disagree, a live entry wins over a deleted one, then the most
/// recent `last_change` wins.
pub fn consolidate_files(manifests: &[Manifest]) -> Vec<ManifestFile> {
    let mut merged: BTreeMap<&str, &ManifestFile> = BTreeMap::new();

    for file in manifests.iter().flat_map(|m| m.files.iter()) {
        match merged.get(file.filename.as_str()) {
            Some(existing) if !prefer(file, existing) => {}
            _ => {
                merged.insert(file.filename.as_str(), file);
            }
        }
    }

    merged.into_values().cloned().collect()
}

fn prefer(candidate: &ManifestFile, existing: &ManifestFile) -> bool {
    match (candidate.is_deleted, existing.is_deleted) {
        (false, true) => true,
        (true, false) => false,
        _ => candidate.last_change > existing.last_change,
    }
}

/// Compute the files an update must install
///
/// Returns target entries that are new or whose content changed, each
/// linked through `peer` to the live entry of the current version. Deleted
/// target entries are kept only if the file is live in the current
/// version, and ghosted entries are never installed.
pub fn link_update_set(current: &[ManifestFile], target: &[ManifestFile]) -> Vec<ManifestFile> {
    let current_by_name: HashMap<&str, &ManifestFile> = current
        .iter()
        .map(|f| (f.filename.as_str(), f))
        .collect();

    let mut updates = Vec::new();
    for file in target {
        if file.is_ghosted {
            continue;
        }

        let previous = current_by_name
            .get(file.filename.as_str())
            .copied()
            .filter(|prev| !prev.is_deleted);

        match previous {
            None if file.is_deleted => continue,
            Some(prev) if prev.hash == file.hash && !file.is_deleted => continue,
            _ => {}
        }

        let mut update = file.clone();
        update.peer = previous.map(|prev| Box::new(prev.clone()));
        updates.push(update);
    }

    debug!("Update set has {} file(s)", updates.len());
    updates
}

/// Load the manifests of the given bundles and everything they include
///
/// Bundles not listed in the MoM are skipped with a warning. Optional
/// includes are followed unless `skip_optional` is set.
pub fn recurse_manifests<B: UpdateBackend + ?Sized>(
    backend: &B,
    repo: &Repository,
    mom: &Manifest,
    bundles: &[String],
    skip_optional: bool,
) -> Result<Vec<Manifest>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = bundles.iter().cloned().collect();
    let mut manifests = Vec::new();

    while let Some(bundle) = queue.pop_front() {
        if !seen.insert(bundle.clone()) {
            continue;
        }

        let Some(entry) = mom.find(&bundle) else {
            warn!(
                "Bundle \"{}\" is not available in repository {} version {}, skipping",
                bundle, repo.name, mom.version
            );
            continue;
        };

        let manifest = backend
            .load_bundle_manifest(repo, entry.last_change, &bundle)
            .map_err(|e| {
                Error::RecurseManifest(format!("bundle {} in {}: {}", bundle, repo.name, e))
            })?;

        queue.extend(manifest.includes.iter().cloned());
        if !skip_optional {
            queue.extend(manifest.optional.iter().cloned());
        }
        manifests.push(manifest);
    }

    Ok(manifests)
}
