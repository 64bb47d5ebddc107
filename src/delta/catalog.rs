// src/delta/catalog.rs

//! Delta file enumeration and name parsing
//!
//! Delta files are named after the hashes they connect:
//!
//! ```text
//! [FROM_VERSION-TO_VERSION-]FROM_HASH-TO_HASH
//! ```
//!
//! The version prefix is a legacy form that is still accepted and then
//! ignored; deltas are matched by hash only. Legacy names are recognised
//! by length alone (longer than two hashes plus a separator), which is a
//! compatibility heuristic rather than a strict format rule.

use crate::error::Result;
use crate::filesystem::remove_path;
use crate::hash::{ContentHash, HASH_LEN};
use std::fs::{self, ReadDir};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Separator between name segments
pub const SEPARATOR: char = '-';

/// Length of a current-form delta name
const NAME_LEN: usize = HASH_LEN * 2 + 1;

/// The hash pair encoded in a delta file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaName {
    pub from: ContentHash,
    pub to: ContentHash,
}

/// Build the current-form file name for a delta
pub fn delta_file_name(from: &ContentHash, to: &ContentHash) -> String {
    format!("{}{}{}", from, SEPARATOR, to)
}

/// Parse a delta file name into its hash pair
///
/// Returns `None` for any name that is not exactly two hashes joined by
/// the separator, after stripping two leading version segments from
/// legacy names.
pub fn parse_delta_name(name: &str) -> Option<DeltaName> {
    if !name.is_ascii() {
        return None;
    }

    let mut rest = name;
    if rest.len() > NAME_LEN {
        for _ in 0..2 {
            let idx = rest.find(SEPARATOR)?;
            rest = &rest[idx + 1..];
        }
    }

    if rest.len() != NAME_LEN || rest.as_bytes()[HASH_LEN] != SEPARATOR as u8 {
        return None;
    }

    let from = ContentHash::parse(&rest[..HASH_LEN]).ok()?;
    let to = ContentHash::parse(&rest[HASH_LEN + 1..]).ok()?;
    Some(DeltaName { from, to })
}

/// One enumerated delta directory entry
///
/// The entry is deleted from disk when the value is dropped, whatever
/// happened to it in between.
#[derive(Debug)]
pub struct DeltaFile {
    path: PathBuf,
    name: String,
}

impl DeltaFile {
    fn new(path: PathBuf, name: String) -> Self {
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parse this entry's name
    pub fn parse(&self) -> Option<DeltaName> {
        parse_delta_name(&self.name)
    }
}

impl Drop for DeltaFile {
    fn drop(&mut self) {
        match remove_path(&self.path) {
            Ok(()) => debug!("Removed delta file {}", self.path.display()),
            Err(e) => warn!("Failed to remove delta file {}: {}", self.path.display(), e),
        }
    }
}

/// Single-pass enumeration of a delta directory
///
/// A missing directory means no deltas are available and yields nothing.
#[derive(Debug)]
pub struct DeltaCatalog {
    dir: PathBuf,
    entries: Option<ReadDir>,
}

impl DeltaCatalog {
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => Some(entries),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No delta directory at {}", dir.display());
                None
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            entries,
        })
    }
}

impl Iterator for DeltaCatalog {
    type Item = DeltaFile;

    fn next(&mut self) -> Option<Self::Item> {
        let entries = self.entries.as_mut()?;
        loop {
            match entries.next()? {
                Ok(entry) => {
                    let name = entry.file_name().to_string_lossy().to_string();
                    return Some(DeltaFile::new(entry.path(), name));
                }
                Err(e) => warn!("Error reading delta directory {}: {}", self.dir.display(), e),
            }
        }
    }
}
