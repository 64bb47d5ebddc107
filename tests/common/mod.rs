// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.
//!
//! A [`MirrorFixture`] lays out a system prefix, a state directory and a
//! local mirror for one third-party repository inside a temp dir.

#![allow(dead_code)]

use std::fs::{self, File, Permissions};
use std::os::unix::fs::{lchown, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tpupd::delta::DeltaGenerator;
use tpupd::filesystem::copy_ownership;
use tpupd::manifest::{Manifest, ManifestFile};
use tpupd::paths::{Paths, RepoPaths};
use tpupd::repository::{save_repos, write_current_version, Repository};
use tpupd::{compute_hash, ContentHash};

pub struct MirrorFixture {
    /// Keep alive to prevent cleanup
    pub temp: TempDir,
    pub paths: Paths,
    pub repos: Vec<Repository>,
    work: PathBuf,
}

impl MirrorFixture {
    /// Fixture with one repository named `name`
    pub fn new(name: &str) -> Self {
        Self::with_repos(&[name])
    }

    pub fn with_repos(names: &[&str]) -> Self {
        let temp = TempDir::new().unwrap();
        let paths = Paths::new(temp.path().join("root"), temp.path().join("state"));
        let work = temp.path().join("work");
        fs::create_dir_all(&work).unwrap();

        let repos: Vec<Repository> = names
            .iter()
            .map(|name| {
                let mirror = temp.path().join("mirror").join(name);
                fs::create_dir_all(&mirror).unwrap();
                Repository::new(*name, mirror.to_string_lossy().to_string())
            })
            .collect();
        save_repos(&paths, &repos).unwrap();

        Self {
            temp,
            paths,
            repos,
            work,
        }
    }

    pub fn repo(&self, name: &str) -> &Repository {
        self.repos.iter().find(|r| r.name == name).unwrap()
    }

    pub fn repo_paths(&self, name: &str) -> RepoPaths {
        self.paths.repo(name)
    }

    pub fn mirror(&self, name: &str) -> PathBuf {
        PathBuf::from(&self.repo(name).url)
    }

    /// Write content with a mode into the scratch area and hash it
    pub fn make_file(&self, label: &str, content: &[u8], mode: u32) -> (PathBuf, ContentHash) {
        let path = self.work.join(label);
        fs::write(&path, content).unwrap();
        fs::set_permissions(&path, Permissions::from_mode(mode)).unwrap();
        let hash = compute_hash(&path).unwrap();
        (path, hash)
    }

    /// Like [`make_file`](Self::make_file) but owned by `uid:gid`
    ///
    /// Returns `None` when the caller may not give files away, which is
    /// the case unless running as root.
    pub fn make_owned_file(
        &self,
        label: &str,
        content: &[u8],
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> Option<(PathBuf, ContentHash)> {
        let path = self.work.join(label);
        fs::write(&path, content).unwrap();
        lchown(&path, Some(uid), Some(gid)).ok()?;
        fs::set_permissions(&path, Permissions::from_mode(mode)).unwrap();
        let hash = compute_hash(&path).unwrap();
        Some((path, hash))
    }

    /// Place a file in a repository root as if it were installed
    pub fn install(&self, repo: &str, filename: &str, source: &Path) {
        let dest = self.repo_paths(repo).installed(filename);
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::copy(source, &dest).unwrap();
        copy_ownership(source, &dest).unwrap();
        let mode = fs::metadata(source).unwrap().permissions().mode();
        fs::set_permissions(&dest, Permissions::from_mode(mode & 0o7777)).unwrap();
    }

    /// Record the installed version and tracked bundles of a repository
    pub fn set_installed(&self, repo: &str, version: u32, bundles: &[&str]) {
        let paths = self.repo_paths(repo);
        write_current_version(&paths, version).unwrap();
        fs::create_dir_all(paths.bundles_dir()).unwrap();
        for bundle in bundles {
            fs::write(paths.bundles_dir().join(bundle), "").unwrap();
        }
    }

    /// Publish a version: its MoM, its bundle manifests and the latest
    /// version marker
    pub fn publish(&self, repo: &str, version: u32, bundles: &[Manifest]) {
        let mirror = self.mirror(repo);
        let mut mom = Manifest::new("MoM", version);
        for bundle in bundles {
            let dir = mirror.join(bundle.version.to_string());
            fs::create_dir_all(&dir).unwrap();
            fs::write(
                dir.join(format!("Manifest.{}.json", bundle.name)),
                bundle.to_json().unwrap(),
            )
            .unwrap();
            mom.files.push(ManifestFile::new(
                bundle.name.clone(),
                ContentHash::parse("0".repeat(64)).unwrap(),
                bundle.version,
            ));
        }

        let dir = mirror.join(version.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Manifest.MoM.json"), mom.to_json().unwrap()).unwrap();

        fs::create_dir_all(mirror.join("version")).unwrap();
        fs::write(mirror.join("version/latest"), format!("{}\n", version)).unwrap();
    }

    /// Publish a fullfile archive holding `source` under its hash
    pub fn publish_fullfile(&self, repo: &str, version: u32, hash: &ContentHash, source: &Path) {
        let dir = self.mirror(repo).join(version.to_string()).join("files");
        fs::create_dir_all(&dir).unwrap();
        let file = File::create(dir.join(format!("{}.tar", hash))).unwrap();
        let mut builder = tar::Builder::new(file);
        builder.append_path_with_name(source, hash.as_str()).unwrap();
        builder.finish().unwrap();
    }

    /// Publish a pack with the given deltas and staged files
    pub fn publish_pack(
        &self,
        repo: &str,
        version: u32,
        bundle: &str,
        from: u32,
        deltas: &[PathBuf],
        staged: &[(ContentHash, PathBuf)],
    ) {
        let dir = self.mirror(repo).join(version.to_string());
        fs::create_dir_all(&dir).unwrap();
        let file = File::create(dir.join(format!("pack-{}-from-{}.tar", bundle, from))).unwrap();
        let mut builder = tar::Builder::new(file);
        for delta in deltas {
            let name = delta.file_name().unwrap().to_string_lossy().to_string();
            builder
                .append_path_with_name(delta, format!("delta/{}", name))
                .unwrap();
        }
        for (hash, source) in staged {
            builder
                .append_path_with_name(source, format!("staged/{}", hash))
                .unwrap();
        }
        builder.finish().unwrap();
    }

    /// Generate a delta between two scratch files
    pub fn make_delta(&self, old: &Path, new: &Path) -> PathBuf {
        DeltaGenerator::new()
            .generate_named(old, new, &self.work.join("deltas"))
            .unwrap()
    }
}

/// Bundle manifest with the given files
pub fn bundle(name: &str, version: u32, files: Vec<ManifestFile>) -> Manifest {
    let mut manifest = Manifest::new(name, version);
    manifest.files = files;
    manifest
}

pub fn entry(filename: &str, hash: &ContentHash, last_change: u32) -> ManifestFile {
    ManifestFile::new(filename, hash.clone(), last_change)
}

pub fn deleted(filename: &str, hash: &ContentHash, last_change: u32) -> ManifestFile {
    let mut file = entry(filename, hash, last_change);
    file.is_deleted = true;
    file
}

pub fn mode_of(path: &Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

pub fn owner_of(path: &Path) -> (u32, u32) {
    let metadata = fs::symlink_metadata(path).unwrap();
    (metadata.uid(), metadata.gid())
}
