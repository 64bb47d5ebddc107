// src/repository/mod.rs

//! Third-party repository management
//!
//! Repositories are listed in `<prefix>/opt/3rd-party/repo.toml`:
//!
//! ```toml
//! [[repo]]
//! name = "extras"
//! url = "file:///srv/mirrors/extras"
//! ```
//!
//! Each repository installs into its own root and keeps its own state
//! directory, installed version and tracked bundle list.

mod backend;
mod mirror;

pub use backend::{ScriptPhase, UpdateBackend};
pub use mirror::LocalMirror;

use crate::error::{Error, Result};
use crate::paths::{Paths, RepoPaths};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use tracing::debug;

/// A named third-party content source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub url: String,
}

impl Repository {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepoList {
    #[serde(default, rename = "repo")]
    repos: Vec<Repository>,
}

/// A repository together with the paths scoped to it
#[derive(Debug, Clone)]
pub struct RepoContext {
    pub repo: Repository,
    pub paths: RepoPaths,
}

impl RepoContext {
    pub fn new(repo: Repository, paths: &Paths) -> Self {
        let repo_paths = paths.repo(&repo.name);
        Self {
            repo,
            paths: repo_paths,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.repo.name
    }
}

/// Load the configured repositories
///
/// A missing repository list means no repositories are configured.
pub fn load_repos(paths: &Paths) -> Result<Vec<Repository>> {
    let path = paths.repo_config();
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No repository list at {}", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    parse_repos(&content)
}

/// Parse a repository list, rejecting duplicate names
pub fn parse_repos(content: &str) -> Result<Vec<Repository>> {
    let list: RepoList = toml::from_str(content)?;

    let mut names = HashSet::new();
    for repo in &list.repos {
        if repo.name.is_empty() || repo.name.contains('/') {
            return Err(Error::Config(format!(
                "Invalid repository name: '{}'",
                repo.name
            )));
        }
        if !names.insert(repo.name.as_str()) {
            return Err(Error::Config(format!(
                "Duplicate repository name: {}",
                repo.name
            )));
        }
    }

    Ok(list.repos)
}

/// Write the repository list
pub fn save_repos(paths: &Paths, repos: &[Repository]) -> Result<()> {
    let list = RepoList {
        repos: repos.to_vec(),
    };
    let content = toml::to_string(&list)
        .map_err(|e| Error::Config(format!("Failed to serialize repository list: {}", e)))?;

    let path = paths.repo_config();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, content).map_err(|source| Error::WriteFile { path, source })
}

/// Find a repository by name
pub fn find_repo<'a>(repos: &'a [Repository], name: &str) -> Result<&'a Repository> {
    repos
        .iter()
        .find(|r| r.name == name)
        .ok_or_else(|| Error::InvalidRepository(name.to_string()))
}

/// Read the bundles tracked as installed in a repository, sorted
pub fn read_subscriptions(paths: &RepoPaths) -> Result<Vec<String>> {
    let dir = paths.bundles_dir();
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut bundles = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        bundles.push(name);
    }
    bundles.sort();
    Ok(bundles)
}

/// Read the installed version of a repository
pub fn read_current_version(paths: &RepoPaths) -> Result<u32> {
    let path = paths.version_file();
    let content = fs::read_to_string(&path)
        .map_err(|e| Error::CurrentVersionUnknown(format!("{}: {}", path.display(), e)))?;

    content.trim().parse::<u32>().map_err(|_| {
        Error::CurrentVersionUnknown(format!(
            "{}: invalid version '{}'",
            path.display(),
            content.trim()
        ))
    })
}

/// Record the installed version of a repository
pub fn write_current_version(paths: &RepoPaths, version: u32) -> Result<()> {
    let path = paths.version_file();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, format!("{}\n", version)).map_err(|source| Error::WriteFile { path, source })
}
