// src/update/wrapper.rs

//! Wrapper scripts exporting third-party binaries
//!
//! Every executable a third-party repository installs under a `bin`
//! directory gets a small script in `<prefix>/opt/3rd-party/bin` that sets
//! up the environment for the repository root and execs the binary. The
//! scripts are rendered from [`SCRIPT_TEMPLATE`]; a persisted copy of the
//! template tells whether all scripts must be regenerated after an
//! upgrade of the updater itself.

use crate::error::Result;
use crate::filesystem::{remove_path, write_atomic};
use crate::manifest::{consolidate_files, recurse_manifests, ManifestFile};
use crate::paths::{Paths, RepoPaths};
use crate::repository::{read_current_version, read_subscriptions, RepoContext, UpdateBackend};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Canonical wrapper script template
pub const SCRIPT_TEMPLATE: &str = r#"#!/bin/bash
# Generated by tpupd, changes will be overwritten

export PATH="{{REPO_ROOT}}/usr/bin:{{REPO_ROOT}}/usr/local/bin:{{REPO_ROOT}}/bin${PATH:+:$PATH}"
export LD_LIBRARY_PATH="{{REPO_ROOT}}/usr/lib64:{{REPO_ROOT}}/usr/lib${LD_LIBRARY_PATH:+:$LD_LIBRARY_PATH}"
export XDG_DATA_DIRS="{{REPO_ROOT}}/usr/share:${XDG_DATA_DIRS:-/usr/local/share:/usr/share}"

exec "{{REPO_ROOT}}{{BINARY}}" "$@"
"#;

const BIN_DIRS: [&str; 3] = ["/usr/bin/", "/usr/local/bin/", "/bin/"];

const WRAPPER_MODE: u32 = 0o755;

/// Render the wrapper for `binary` installed under `repo_root`
pub fn render_script(repo_root: &Path, binary: &str) -> String {
    SCRIPT_TEMPLATE
        .replace("{{REPO_ROOT}}", &repo_root.to_string_lossy())
        .replace("{{BINARY}}", binary)
}

/// Whether a manifest entry is exported through a wrapper
///
/// Only regular, non-ghosted files directly inside a `bin` directory
/// qualify. Whether the installed copy is executable is checked
/// separately.
pub fn is_eligible(file: &ManifestFile) -> bool {
    if !file.is_file() || file.is_ghosted {
        return false;
    }
    BIN_DIRS.iter().any(|dir| {
        file.filename
            .strip_prefix(dir)
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
    })
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

/// Generates and removes wrapper scripts
#[derive(Debug, Clone)]
pub struct WrapperScriptManager {
    paths: Paths,
}

impl WrapperScriptManager {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    /// Wrapper location for a binary
    pub fn wrapper_path(&self, binary: &str) -> PathBuf {
        let name = binary.rsplit('/').next().unwrap_or(binary);
        self.paths.bin_dir().join(name)
    }

    /// True if the persisted template is missing or differs from the
    /// canonical one
    pub fn needs_regeneration(&self) -> bool {
        match fs::read(self.paths.template_file()) {
            Ok(content) => content != SCRIPT_TEMPLATE.as_bytes(),
            Err(_) => true,
        }
    }

    /// Persist the canonical template
    pub fn persist_template(&self) -> Result<()> {
        write_atomic(
            &self.paths.template_file(),
            SCRIPT_TEMPLATE.as_bytes(),
            0o644,
        )
    }

    /// Create, refresh or remove the wrapper for one file
    pub fn update_wrapper_script(&self, repo: &RepoPaths, file: &ManifestFile) -> Result<()> {
        if !is_eligible(file) {
            return Ok(());
        }

        let wrapper = self.wrapper_path(&file.filename);
        if file.is_deleted {
            debug!("Removing wrapper {}", wrapper.display());
            return remove_path(&wrapper);
        }

        if !is_executable(&repo.installed(&file.filename)) {
            debug!("{} is not executable, not exported", file.filename);
            return Ok(());
        }

        let script = render_script(repo.runtime_root(), &file.filename);
        write_atomic(&wrapper, script.as_bytes(), WRAPPER_MODE)?;
        debug!("Wrote wrapper {}", wrapper.display());
        Ok(())
    }

    /// Apply [`Self::update_wrapper_script`] to a list of files
    pub fn update_wrapper_scripts(&self, repo: &RepoPaths, files: &[ManifestFile]) -> Result<()> {
        for file in files {
            self.update_wrapper_script(repo, file)?;
        }
        Ok(())
    }

    /// Regenerate the wrappers of everything a repository has installed
    ///
    /// The file list is rebuilt from the installed version's manifests.
    pub fn regenerate_repo<B: UpdateBackend + ?Sized>(
        &self,
        backend: &B,
        ctx: &RepoContext,
    ) -> Result<()> {
        let subscriptions = read_subscriptions(&ctx.paths)?;
        if subscriptions.is_empty() {
            debug!("Nothing installed from {}", ctx.name());
            return Ok(());
        }
        let version = read_current_version(&ctx.paths)?;
        let mom = backend.load_mom(&ctx.repo, version)?;

        let manifests = recurse_manifests(backend, &ctx.repo, &mom, &subscriptions, true)?;
        let files = consolidate_files(&manifests);

        self.update_wrapper_scripts(&ctx.paths, &files)?;
        info!("Scripts regenerated successfully for {}", ctx.name());
        Ok(())
    }
}
