// src/repository/backend.rs

//! Collaborator seam for everything outside the update core
//!
//! Version lookup, manifest parsing, content transport and script
//! execution live behind [`UpdateBackend`]. The core only ever sees parsed
//! [`Manifest`] values and local files.

use super::{RepoContext, Repository};
use crate::error::Result;
use crate::manifest::Manifest;
use std::fmt;
use std::path::Path;

/// When update scripts run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPhase {
    PreUpdate,
    PostUpdate,
}

impl fmt::Display for ScriptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreUpdate => write!(f, "pre-update"),
            Self::PostUpdate => write!(f, "post-update"),
        }
    }
}

/// Source of repository content
pub trait UpdateBackend {
    /// Latest version published by the repository
    fn latest_version(&self, repo: &Repository) -> Result<u32>;

    /// Load the manifest of record for a version
    fn load_mom(&self, repo: &Repository, version: u32) -> Result<Manifest>;

    /// Load one bundle manifest
    fn load_bundle_manifest(&self, repo: &Repository, version: u32, bundle: &str)
        -> Result<Manifest>;

    /// Fetch a repository-relative path into a local file
    fn fetch(&self, repo: &Repository, remote: &str, dest: &Path) -> Result<()>;

    /// Run the update scripts for a phase
    fn run_scripts(&self, ctx: &RepoContext, phase: ScriptPhase) -> Result<()>;
}
