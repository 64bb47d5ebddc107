// src/repository/mirror.rs

//! Local mirror backend
//!
//! Serves repository content from a directory tree, addressed by a
//! `file://` URL or an absolute path:
//!
//! ```text
//! <mirror>/version/latest
//! <mirror>/<v>/Manifest.MoM.json
//! <mirror>/<v>/Manifest.<bundle>.json
//! <mirror>/<v>/pack-<bundle>-from-<old>.tar
//! <mirror>/<v>/files/<hash>.tar
//! ```
//!
//! Network transport is not provided; other URL schemes are rejected.

use super::{RepoContext, Repository, ScriptPhase, UpdateBackend};
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Backend reading repository content from local directories
#[derive(Debug, Default, Clone)]
pub struct LocalMirror;

impl LocalMirror {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a repository URL to its mirror directory
    pub fn mirror_dir(repo: &Repository) -> Result<PathBuf> {
        if repo.url.starts_with('/') {
            return Ok(PathBuf::from(&repo.url));
        }

        let url = Url::parse(&repo.url)
            .map_err(|e| Error::Fetch(format!("invalid URL for {}: {}", repo.name, e)))?;
        if url.scheme() != "file" {
            return Err(Error::Fetch(format!(
                "{}: unsupported URL scheme '{}'",
                repo.url,
                url.scheme()
            )));
        }
        url.to_file_path()
            .map_err(|_| Error::Fetch(format!("{}: not a local path", repo.url)))
    }

    fn remote_path(repo: &Repository, remote: &str) -> Result<PathBuf> {
        let relative = Path::new(remote);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::Fetch(format!("{}: invalid remote path", remote)));
        }
        Ok(Self::mirror_dir(repo)?.join(relative))
    }
}

impl UpdateBackend for LocalMirror {
    fn latest_version(&self, repo: &Repository) -> Result<u32> {
        let path = Self::remote_path(repo, "version/latest")?;
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Fetch(format!("{}: {}", path.display(), e)))?;
        content
            .trim()
            .parse()
            .map_err(|_| Error::Fetch(format!("{}: invalid version", path.display())))
    }

    fn load_mom(&self, repo: &Repository, version: u32) -> Result<Manifest> {
        let load = || -> Result<Manifest> {
            let path = Self::remote_path(repo, &format!("{}/Manifest.MoM.json", version))?;
            let content = fs::read_to_string(&path)?;
            Manifest::from_json(&content)
        };
        load().map_err(|e| Error::MomLoad {
            version,
            reason: e.to_string(),
        })
    }

    fn load_bundle_manifest(
        &self,
        repo: &Repository,
        version: u32,
        bundle: &str,
    ) -> Result<Manifest> {
        let load = || -> Result<Manifest> {
            let path = Self::remote_path(repo, &format!("{}/Manifest.{}.json", version, bundle))?;
            let content = fs::read_to_string(&path)?;
            Manifest::from_json(&content)
        };
        load().map_err(|e| Error::ManifestLoad {
            name: bundle.to_string(),
            reason: e.to_string(),
        })
    }

    /// Copy `remote` to `dest` through a temp file in the same directory,
    /// so `dest` only ever appears complete
    fn fetch(&self, repo: &Repository, remote: &str, dest: &Path) -> Result<()> {
        let source = Self::remote_path(repo, remote)?;
        let parent = dest.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent)?;

        let fetch_error = |e: io::Error| Error::Fetch(format!("{}: {}", source.display(), e));
        let mut input = File::open(&source).map_err(fetch_error)?;
        let mut temp = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempfile_in(parent)?;
        io::copy(&mut input, &mut temp).map_err(fetch_error)?;
        temp.as_file().sync_all()?;
        temp.persist(dest).map_err(|e| e.error)?;

        debug!("Fetched {} -> {}", source.display(), dest.display());
        Ok(())
    }

    fn run_scripts(&self, ctx: &RepoContext, phase: ScriptPhase) -> Result<()> {
        info!(
            "No {} scripts are provided by local mirror for {}",
            phase,
            ctx.name()
        );
        Ok(())
    }
}
