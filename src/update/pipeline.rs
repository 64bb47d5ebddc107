// src/update/pipeline.rs

//! Per-repository update pipeline
//!
//! Stages, in order:
//!
//! 1. load manifests of the installed and target versions
//! 2. run pre-update scripts
//! 3. download packs
//! 4. extract packs (deltas and staged files)
//! 5. prepare: apply deltas against the installed files
//! 6. validate fullfiles: find what is still missing from the staged store
//! 7. download fullfiles
//! 8. extract fullfiles (download-only runs stop here)
//! 9. update files, after the permission check
//! 10. update wrapper scripts of exported binaries
//! 11. run post-update scripts
//!
//! Packs are an optimization only: any failure around them is a warning
//! and the content is fetched in full instead.

use super::permissions::{resolve_permission_report, validate_all};
use super::wrapper::WrapperScriptManager;
use super::{Stage, UpdateMode, UpdateOptions, VersionTarget};
use crate::delta::{apply_deltas, DeltaApplier};
use crate::error::{Error, Result, UpdateCode};
use crate::filesystem::{clear_dir, FileInstaller, StagedStore};
use crate::hash::{self, ContentHash};
use crate::manifest::{consolidate_files, link_update_set, recurse_manifests, Manifest, ManifestFile};
use crate::progress::ProgressTracker;
use crate::prompt::Confirm;
use crate::repository::{
    read_current_version, read_subscriptions, write_current_version, RepoContext, ScriptPhase,
    UpdateBackend,
};
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Installed and latest version of a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionStatus {
    pub current: u32,
    pub latest: u32,
}

impl VersionStatus {
    pub fn update_available(&self) -> bool {
        self.latest > self.current
    }

    /// `Ok` when there is something to update to, `No` otherwise
    pub fn code(&self) -> UpdateCode {
        if self.update_available() {
            UpdateCode::Ok
        } else {
            UpdateCode::No
        }
    }
}

/// Compare the installed version with the latest one published
pub fn check_update<B: UpdateBackend + ?Sized>(backend: &B, ctx: &RepoContext) -> Result<VersionStatus> {
    let current = read_current_version(&ctx.paths)?;
    let latest = backend.latest_version(&ctx.repo)?;
    let status = VersionStatus { current, latest };

    info!("Current version: {}", current);
    info!("Latest server version: {}", latest);
    if status.update_available() {
        info!("There is a new version available: {}", latest);
    } else {
        info!("There are no updates available");
    }
    Ok(status)
}

/// Everything the stages after loading the manifests work from
#[derive(Debug)]
struct Plan {
    current_version: u32,
    target_version: u32,
    target_manifests: Vec<Manifest>,
    /// Consolidated files of the installed version
    current_files: Vec<ManifestFile>,
    /// Target files that are new, changed or deleted
    update_set: Vec<ManifestFile>,
    packs: Vec<PathBuf>,
    /// (hash, version) of content to fetch in full
    fullfiles: Vec<(ContentHash, u32)>,
    downloads: Vec<(ContentHash, PathBuf)>,
}

/// One repository's update
pub struct UpdatePipeline<'a, B: UpdateBackend + ?Sized> {
    backend: &'a B,
    ctx: &'a RepoContext,
    options: &'a UpdateOptions,
    confirm: &'a dyn Confirm,
    progress: &'a dyn ProgressTracker,
    wrappers: &'a WrapperScriptManager,
    staged: StagedStore,
}

impl<'a, B: UpdateBackend + ?Sized> UpdatePipeline<'a, B> {
    pub fn new(
        backend: &'a B,
        ctx: &'a RepoContext,
        options: &'a UpdateOptions,
        confirm: &'a dyn Confirm,
        progress: &'a dyn ProgressTracker,
        wrappers: &'a WrapperScriptManager,
    ) -> Self {
        Self {
            backend,
            ctx,
            options,
            confirm,
            progress,
            wrappers,
            staged: StagedStore::new(ctx.paths.staged_dir()),
        }
    }

    /// Run every stage of the configured mode
    ///
    /// Status mode runs no stages; use [`check_update`] for it.
    pub fn run(&self) -> Result<()> {
        let stages = Stage::for_mode(self.options.mode);
        let Some((first, rest)) = stages.split_first() else {
            return Ok(());
        };

        self.begin(*first);
        let Some(mut plan) = self.load_manifests()? else {
            self.progress.increment(stages.len() as u64);
            return Ok(());
        };
        self.progress.increment(1);

        for stage in rest {
            self.begin(*stage);
            match stage {
                Stage::LoadManifests => {}
                Stage::RunPreupdateScripts => self.run_scripts(ScriptPhase::PreUpdate)?,
                Stage::DownloadPacks => self.download_packs(&mut plan),
                Stage::ExtractPacks => self.extract_packs(&plan),
                Stage::PrepareForUpdate => self.prepare(&plan)?,
                Stage::ValidateFullfiles => self.validate_fullfiles(&mut plan),
                Stage::DownloadFullfiles => self.download_fullfiles(&mut plan)?,
                Stage::ExtractFullfiles => self.extract_fullfiles(&plan)?,
                Stage::UpdateFiles => self.update_files(&plan)?,
                Stage::UpdateBinaries => self
                    .wrappers
                    .update_wrapper_scripts(&self.ctx.paths, &plan.update_set)?,
                Stage::RunPostupdateScripts => self.run_scripts(ScriptPhase::PostUpdate)?,
            }
            self.progress.increment(1);
        }

        if self.options.mode == UpdateMode::Full {
            info!(
                "Update of {} successful: version {} -> {}",
                self.ctx.name(),
                plan.current_version,
                plan.target_version
            );
            if !self.options.keep_cache {
                self.clean_cache();
            }
        } else {
            info!(
                "Content for {} version {} downloaded",
                self.ctx.name(),
                plan.target_version
            );
        }
        Ok(())
    }

    fn begin(&self, stage: Stage) {
        debug!("{}: {}", self.ctx.name(), stage);
        self.progress.set_message(&stage.to_string());
    }

    /// Returns `None` when the target is the installed version
    fn load_manifests(&self) -> Result<Option<Plan>> {
        let repo = &self.ctx.repo;
        let current_version = read_current_version(&self.ctx.paths)?;
        let target_version = match self.options.target {
            VersionTarget::Version(v) => v,
            VersionTarget::Latest => self.backend.latest_version(repo)?,
        };

        if target_version == current_version {
            info!(
                "Version {} of {} is already installed, nothing to update",
                current_version,
                self.ctx.name()
            );
            return Ok(None);
        }
        if target_version < current_version {
            return Err(Error::InvalidOption(format!(
                "Requested version {} is lower than the installed version {}",
                target_version, current_version
            )));
        }
        info!(
            "Preparing to update {} from {} to {}",
            self.ctx.name(),
            current_version,
            target_version
        );

        let bundles = read_subscriptions(&self.ctx.paths)?;
        let skip_optional = self.options.skip_optional;

        let current_mom = self.backend.load_mom(repo, current_version)?;
        let current_manifests =
            recurse_manifests(self.backend, repo, &current_mom, &bundles, skip_optional)?;
        let target_mom = self.backend.load_mom(repo, target_version)?;
        let target_manifests =
            recurse_manifests(self.backend, repo, &target_mom, &bundles, skip_optional)?;

        let current_files = consolidate_files(&current_manifests);
        let target_files = consolidate_files(&target_manifests);
        let update_set = link_update_set(&current_files, &target_files);
        info!("{} file(s) to update", update_set.len());

        Ok(Some(Plan {
            current_version,
            target_version,
            target_manifests,
            current_files,
            update_set,
            packs: Vec::new(),
            fullfiles: Vec::new(),
            downloads: Vec::new(),
        }))
    }

    fn run_scripts(&self, phase: ScriptPhase) -> Result<()> {
        if !self.options.run_scripts {
            debug!("Skipping {} scripts", phase);
            return Ok(());
        }
        self.backend.run_scripts(self.ctx, phase)
    }

    fn download_packs(&self, plan: &mut Plan) {
        let packs_dir = self.ctx.paths.packs_dir();
        for manifest in &plan.target_manifests {
            if manifest.version <= plan.current_version {
                continue;
            }
            let name = format!("pack-{}-from-{}.tar", manifest.name, plan.current_version);
            let dest = packs_dir.join(&name);
            if dest.exists() {
                debug!("Pack {} already downloaded", name);
                plan.packs.push(dest);
                continue;
            }

            let remote = format!("{}/{}", manifest.version, name);
            match self.backend.fetch(&self.ctx.repo, &remote, &dest) {
                Ok(()) => plan.packs.push(dest),
                Err(e) => warn!("Pack {} not available, using fullfiles: {}", name, e),
            }
        }
    }

    fn extract_packs(&self, plan: &Plan) {
        for pack in &plan.packs {
            if let Err(e) = self.extract_pack(pack) {
                warn!("Failed to extract pack {}: {}", pack.display(), e);
            }
        }
    }

    /// Unpack the `delta/` and `staged/` entries of one pack
    fn extract_pack(&self, pack: &Path) -> Result<()> {
        let delta_dir = self.ctx.paths.delta_dir();
        fs::create_dir_all(&delta_dir)?;
        self.staged.ensure_dir()?;

        let mut archive = tar::Archive::new(File::open(pack)?);
        archive.set_preserve_permissions(true);
        archive.set_preserve_ownerships(true);
        archive.set_unpack_xattrs(true);

        let mut extracted = 0usize;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();
            let Some((dir, name)) = pack_entry(&path) else {
                debug!("Skipping pack entry {}", path.display());
                continue;
            };

            let dest = match dir {
                "delta" => delta_dir.join(name),
                _ => self.staged.staged_dir().join(name),
            };
            entry.unpack(&dest)?;
            extracted += 1;
        }

        debug!("Extracted {} entries from {}", extracted, pack.display());
        Ok(())
    }

    fn prepare(&self, plan: &Plan) -> Result<()> {
        let applier = DeltaApplier::new(self.staged.clone());
        apply_deltas(
            &plan.current_files,
            self.ctx.paths.root(),
            &self.ctx.paths.delta_dir(),
            &applier,
        )?;
        Ok(())
    }

    fn validate_fullfiles(&self, plan: &mut Plan) {
        let mut seen = HashSet::new();
        for file in &plan.update_set {
            if file.is_deleted || !seen.insert(file.hash.clone()) {
                continue;
            }
            if self.staged.exists(&file.hash) {
                if self.staged.verify(&file.hash) {
                    continue;
                }
                warn!("Staged file {} is corrupted, removing", file.hash.short());
                if let Err(e) = self.staged.remove(&file.hash) {
                    warn!("Failed to remove {}: {}", file.hash.short(), e);
                }
            }
            plan.fullfiles.push((file.hash.clone(), file.last_change));
        }
        info!("{} file(s) to download in full", plan.fullfiles.len());
    }

    fn download_fullfiles(&self, plan: &mut Plan) -> Result<()> {
        let download_dir = self.ctx.paths.download_dir();
        for (hash, version) in &plan.fullfiles {
            let dest = download_dir.join(format!("{}.tar", hash));
            let remote = format!("{}/files/{}.tar", version, hash);
            self.backend.fetch(&self.ctx.repo, &remote, &dest)?;
            plan.downloads.push((hash.clone(), dest));
        }
        Ok(())
    }

    fn extract_fullfiles(&self, plan: &Plan) -> Result<()> {
        for (hash, archive) in &plan.downloads {
            self.extract_fullfile(hash, archive)?;
        }
        Ok(())
    }

    /// Unpack a fullfile archive and stage its single entry after
    /// verifying it
    fn extract_fullfile(&self, hash: &ContentHash, archive_path: &Path) -> Result<()> {
        self.staged.ensure_dir()?;
        let scratch = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(self.staged.staged_dir())?;

        let mut archive = tar::Archive::new(File::open(archive_path)?);
        archive.set_preserve_permissions(true);
        archive.set_preserve_ownerships(true);
        archive.set_unpack_xattrs(true);

        let mut unpacked = None;
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.path()?.as_ref() != Path::new(hash.as_str()) {
                continue;
            }
            let dest = scratch.path().join(hash.as_str());
            entry.unpack(&dest)?;
            unpacked = Some(dest);
            break;
        }

        let Some(path) = unpacked else {
            return Err(Error::Fetch(format!(
                "{} does not contain {}",
                archive_path.display(),
                hash
            )));
        };

        let actual = hash::compute_hash(&path)?;
        if !hash::hashes_equal(actual.as_str(), hash.as_str()) {
            return Err(Error::ChecksumMismatch {
                expected: hash.to_string(),
                actual: actual.to_string(),
            });
        }

        let staged_path = self.staged.path_for(hash);
        fs::rename(&path, &staged_path).map_err(|source| Error::WriteFile {
            path: staged_path,
            source,
        })?;
        debug!("Staged fullfile {}", hash.short());
        Ok(())
    }

    fn update_files(&self, plan: &Plan) -> Result<()> {
        let root = self.ctx.paths.root();
        let report = validate_all(&plan.update_set, &self.staged, root);
        resolve_permission_report(&report, self.confirm)?;

        let installer = FileInstaller::new(&self.staged, root);
        // Sorted by filename, so directories come before their contents
        for file in plan.update_set.iter().filter(|f| !f.is_deleted) {
            installer.install(&file.filename, &file.hash)?;
        }
        for file in plan.update_set.iter().rev().filter(|f| f.is_deleted) {
            installer.remove(&file.filename)?;
        }

        write_current_version(&self.ctx.paths, plan.target_version)?;
        info!(
            "Installed {} file(s) for {}",
            plan.update_set.len(),
            self.ctx.name()
        );
        Ok(())
    }

    fn clean_cache(&self) {
        let paths = &self.ctx.paths;
        for dir in [
            paths.staged_dir(),
            paths.delta_dir(),
            paths.packs_dir(),
            paths.download_dir(),
        ] {
            if let Err(e) = clear_dir(&dir) {
                warn!("Failed to clean {}: {}", dir.display(), e);
            }
        }
    }
}

/// Accept `delta/<name>` and `staged/<name>` pack entries only
fn pack_entry(path: &Path) -> Option<(&'static str, String)> {
    let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));
    let dir = match components.next()? {
        Component::Normal(d) if d == "delta" => "delta",
        Component::Normal(d) if d == "staged" => "staged",
        _ => return None,
    };
    let name = match components.next()? {
        Component::Normal(n) => n.to_str()?.to_string(),
        _ => return None,
    };
    if components.next().is_some() || name.starts_with('.') {
        return None;
    }
    Some((dir, name))
}
