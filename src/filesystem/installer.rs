// src/filesystem/installer.rs

//! Installation of staged content into a repository root
//!
//! Every file lands through a temporary sibling that is renamed over the
//! target, so an interrupted install leaves either the old or the new
//! file, never a partial one.

use super::StagedStore;
use crate::error::{Error, Result};
use crate::hash::ContentHash;
use crate::xattrs;
use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{lchown, MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Installs staged files under an install root
pub struct FileInstaller<'a> {
    staged: &'a StagedStore,
    install_root: PathBuf,
}

impl<'a> FileInstaller<'a> {
    pub fn new(staged: &'a StagedStore, install_root: impl Into<PathBuf>) -> Self {
        Self {
            staged,
            install_root: install_root.into(),
        }
    }

    /// Validate and compute a safe target path within the install root
    ///
    /// `..` components are rejected outright rather than resolved.
    pub fn safe_target_path(&self, path: &str) -> Result<PathBuf> {
        let mut normalized = PathBuf::new();
        for component in Path::new(path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(c) => normalized.push(c),
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    warn!("Path traversal attempt detected: {}", path);
                    return Err(Error::InvalidFile {
                        path: path.to_string(),
                        reason: "path traversal".to_string(),
                    });
                }
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(Error::InvalidFile {
                path: path.to_string(),
                reason: "empty path".to_string(),
            });
        }

        Ok(self.install_root.join(normalized))
    }

    /// Install the staged content for `hash` at `path`
    ///
    /// The kind of the staged entry decides what is created: a directory,
    /// a symlink or a regular file.
    pub fn install(&self, path: &str, hash: &ContentHash) -> Result<()> {
        let source = self.staged.path_for(hash);
        let metadata = fs::symlink_metadata(&source).map_err(|e| Error::InvalidFile {
            path: path.to_string(),
            reason: format!("staged content {} missing: {}", hash.short(), e),
        })?;
        let target = self.safe_target_path(path)?;

        if metadata.is_dir() {
            self.install_dir(&source, &target, metadata.permissions().mode())?;
        } else if metadata.file_type().is_symlink() {
            self.install_symlink(&source, &target)?;
        } else {
            self.install_file(&source, &target)?;
        }

        debug!("Installed {} ({})", path, hash.short());
        Ok(())
    }

    fn install_dir(&self, source: &Path, target: &Path, mode: u32) -> Result<()> {
        match fs::symlink_metadata(target) {
            Ok(existing) if existing.is_dir() => {}
            Ok(_) => {
                fs::remove_file(target).map_err(|source| write_error(target, source))?;
                fs::create_dir_all(target).map_err(|source| write_error(target, source))?;
            }
            Err(_) => fs::create_dir_all(target).map_err(|source| write_error(target, source))?,
        }
        copy_ownership(source, target).map_err(|e| write_error(target, e))?;
        fs::set_permissions(target, Permissions::from_mode(mode & 0o7777))
            .map_err(|source| write_error(target, source))
    }

    fn install_file(&self, source: &Path, target: &Path) -> Result<()> {
        let temp = sibling_temp(target)?;
        let mode = fs::metadata(source)?.permissions().mode();
        fs::copy(source, temp.path()).map_err(|e| write_error(target, e))?;
        // Writing and chown both drop setuid/setgid, so the mode is
        // applied last
        copy_ownership(source, temp.path()).map_err(|e| write_error(target, e))?;
        fs::set_permissions(temp.path(), Permissions::from_mode(mode & 0o7777))
            .map_err(|e| write_error(target, e))?;
        xattrs::copy(source, temp.path());
        temp.as_file().sync_all()?;
        replace(temp, target)
    }

    fn install_symlink(&self, source: &Path, target: &Path) -> Result<()> {
        let link_target = fs::read_link(source)?;

        // A symlink can't be created in place of a tempfile handle, so
        // reserve a unique name, drop the file and link under that name.
        let temp_path = sibling_temp(target)?.into_temp_path();
        let temp_name = temp_path.to_path_buf();
        temp_path.close()?;

        std::os::unix::fs::symlink(&link_target, &temp_name)
            .map_err(|source| write_error(target, source))?;
        if let Err(e) = copy_ownership(source, &temp_name) {
            let _ = fs::remove_file(&temp_name);
            return Err(write_error(target, e));
        }
        if let Err(e) = rename_over(&temp_name, target) {
            let _ = fs::remove_file(&temp_name);
            return Err(e);
        }
        debug!("Linked {} -> {}", target.display(), link_target.display());
        Ok(())
    }

    /// Remove an installed entry that the update deletes
    ///
    /// Directories are only removed once empty.
    pub fn remove(&self, path: &str) -> Result<()> {
        let target = self.safe_target_path(path)?;
        let metadata = match fs::symlink_metadata(&target) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("File already removed: {}", path);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            match fs::remove_dir(&target) {
                Ok(()) => info!("Removed directory: {}", path),
                Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => {
                    debug!("Directory not empty, skipping: {}", path);
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            fs::remove_file(&target)?;
            info!("Removed file: {}", path);
        }
        Ok(())
    }
}

/// Write `content` to `path` atomically with the given mode
pub fn write_atomic(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    let mut temp = sibling_temp(path)?;
    temp.write_all(content)
        .map_err(|source| write_error(path, source))?;
    fs::set_permissions(temp.path(), Permissions::from_mode(mode))
        .map_err(|source| write_error(path, source))?;
    temp.as_file()
        .sync_all()
        .map_err(|source| write_error(path, source))?;
    replace(temp, path)
}

/// Give `target` the owner and group of `source`
///
/// Symlinks are not followed. Nothing is changed when both already
/// match, so callers that are not root only fail when ownership really
/// has to change.
pub fn copy_ownership(source: &Path, target: &Path) -> io::Result<()> {
    let wanted = fs::symlink_metadata(source)?;
    let current = fs::symlink_metadata(target)?;
    if wanted.uid() == current.uid() && wanted.gid() == current.gid() {
        return Ok(());
    }
    lchown(target, Some(wanted.uid()), Some(wanted.gid()))
}

fn parent_dir(path: &Path) -> Result<&Path> {
    path.parent().ok_or_else(|| Error::InvalidFile {
        path: path.display().to_string(),
        reason: "no parent directory".to_string(),
    })
}

fn sibling_temp(target: &Path) -> Result<NamedTempFile> {
    let parent = parent_dir(target)?;
    fs::create_dir_all(parent).map_err(|source| write_error(target, source))?;
    tempfile::Builder::new()
        .prefix(".tpupd-")
        .tempfile_in(parent)
        .map_err(|source| write_error(target, source))
}

fn replace(temp: NamedTempFile, target: &Path) -> Result<()> {
    // Renaming a file over a directory fails; the directory has to go first
    if fs::symlink_metadata(target).is_ok_and(|m| m.is_dir()) {
        fs::remove_dir_all(target).map_err(|source| write_error(target, source))?;
    }
    temp.persist(target)
        .map_err(|e| write_error(target, e.error))?;
    Ok(())
}

fn rename_over(from: &Path, target: &Path) -> Result<()> {
    if fs::symlink_metadata(target).is_ok_and(|m| m.is_dir()) {
        fs::remove_dir_all(target).map_err(|source| write_error(target, source))?;
    }
    fs::rename(from, target).map_err(|source| write_error(target, source))
}

fn write_error(path: &Path, source: io::Error) -> Error {
    Error::WriteFile {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::compute_hash;
    use tempfile::TempDir;

    fn stage_file(store: &StagedStore, content: &[u8], mode: u32) -> ContentHash {
        let temp = store.temp_file().unwrap();
        fs::write(temp.path(), content).unwrap();
        fs::set_permissions(temp.path(), Permissions::from_mode(mode)).unwrap();
        let hash = compute_hash(temp.path()).unwrap();
        store.commit(temp, &hash).unwrap();
        hash
    }

    #[test]
    fn test_install_file_replaces_atomically() {
        let temp = TempDir::new().unwrap();
        let store = StagedStore::new(temp.path().join("staged"));
        let root = temp.path().join("root");
        let installer = FileInstaller::new(&store, &root);

        fs::create_dir_all(root.join("usr/bin")).unwrap();
        fs::write(root.join("usr/bin/tool"), b"old").unwrap();

        let hash = stage_file(&store, b"#!/bin/sh\necho new\n", 0o755);
        installer.install("/usr/bin/tool", &hash).unwrap();

        let installed = root.join("usr/bin/tool");
        assert_eq!(fs::read(&installed).unwrap(), b"#!/bin/sh\necho new\n");
        assert_eq!(compute_hash(&installed).unwrap(), hash);
        // No leftover temp files
        assert_eq!(fs::read_dir(root.join("usr/bin")).unwrap().count(), 1);
    }

    #[test]
    fn test_install_symlink_and_dir() {
        let temp = TempDir::new().unwrap();
        let store = StagedStore::new(temp.path().join("staged"));
        store.ensure_dir().unwrap();
        let root = temp.path().join("root");
        let installer = FileInstaller::new(&store, &root);

        let link_src = temp.path().join("link");
        std::os::unix::fs::symlink("tool", &link_src).unwrap();
        let link_hash = compute_hash(&link_src).unwrap();
        fs::rename(&link_src, store.path_for(&link_hash)).unwrap();

        let dir_src = temp.path().join("dir");
        fs::create_dir(&dir_src).unwrap();
        fs::set_permissions(&dir_src, Permissions::from_mode(0o750)).unwrap();
        let dir_hash = compute_hash(&dir_src).unwrap();
        fs::rename(&dir_src, store.path_for(&dir_hash)).unwrap();

        installer.install("/usr/share/data", &dir_hash).unwrap();
        installer.install("/usr/bin/alias", &link_hash).unwrap();

        let mode = fs::metadata(root.join("usr/share/data")).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o750);
        assert_eq!(
            fs::read_link(root.join("usr/bin/alias")).unwrap(),
            PathBuf::from("tool")
        );
    }

    #[test]
    fn test_install_keeps_staged_owner() {
        let temp = TempDir::new().unwrap();
        let store = StagedStore::new(temp.path().join("staged"));
        let root = temp.path().join("root");
        let installer = FileInstaller::new(&store, &root);

        let staged = store.temp_file().unwrap();
        fs::write(staged.path(), b"#!/bin/sh
echo owned
").unwrap();
        // Only root can hand a file to another user
        if lchown(staged.path(), Some(1000), Some(1000)).is_err() {
            return;
        }
        fs::set_permissions(staged.path(), Permissions::from_mode(0o4755)).unwrap();
        let hash = compute_hash(staged.path()).unwrap();
        store.commit(staged, &hash).unwrap();

        installer.install("/usr/bin/owned", &hash).unwrap();

        let installed = root.join("usr/bin/owned");
        let metadata = fs::metadata(&installed).unwrap();
        assert_eq!((metadata.uid(), metadata.gid()), (1000, 1000));
        assert_eq!(metadata.permissions().mode() & 0o7777, 0o4755);
        assert_eq!(compute_hash(&installed).unwrap(), hash);
    }

    #[test]
    fn test_copy_ownership_unchanged_is_noop() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();
        copy_ownership(&a, &b).unwrap();
        assert!(copy_ownership(&a, &temp.path().join("missing")).is_err());
    }

    #[test]
    fn test_missing_staged_content() {
        let temp = TempDir::new().unwrap();
        let store = StagedStore::new(temp.path().join("staged"));
        let installer = FileInstaller::new(&store, temp.path().join("root"));
        let hash = ContentHash::parse("a".repeat(64)).unwrap();
        assert!(matches!(
            installer.install("/usr/bin/tool", &hash),
            Err(Error::InvalidFile { .. })
        ));
    }

    #[test]
    fn test_path_traversal_rejected() {
        let temp = TempDir::new().unwrap();
        let store = StagedStore::new(temp.path().join("staged"));
        let installer = FileInstaller::new(&store, temp.path().join("root"));
        assert!(installer.safe_target_path("/../etc/passwd").is_err());
        assert!(installer.safe_target_path("/").is_err());
        assert_eq!(
            installer.safe_target_path("/usr/./bin/tool").unwrap(),
            temp.path().join("root/usr/bin/tool")
        );
    }

    #[test]
    fn test_remove() {
        let temp = TempDir::new().unwrap();
        let store = StagedStore::new(temp.path().join("staged"));
        let root = temp.path().join("root");
        let installer = FileInstaller::new(&store, &root);
        fs::create_dir_all(root.join("usr/lib/full")).unwrap();
        fs::write(root.join("usr/lib/full/file"), b"x").unwrap();

        installer.remove("/usr/lib/full").unwrap();
        assert!(root.join("usr/lib/full").exists());

        installer.remove("/usr/lib/full/file").unwrap();
        installer.remove("/usr/lib/full").unwrap();
        assert!(!root.join("usr/lib/full").exists());

        installer.remove("/usr/lib/missing").unwrap();
    }

    #[test]
    fn test_write_atomic() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bin/wrapper");
        write_atomic(&path, b"#!/bin/bash\n", 0o755).unwrap();
        write_atomic(&path, b"#!/bin/bash\nexit 0\n", 0o755).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"#!/bin/bash\nexit 0\n");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
