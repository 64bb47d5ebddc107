// src/paths.rs
//! Centralized path derivation for third-party update directories

use std::path::{Path, PathBuf};

/// Directory holding third-party content, relative to the path prefix
pub const THIRD_PARTY_DIR: &str = "opt/3rd-party";

/// Repository list file name
pub const REPO_CONFIG_FILE: &str = "repo.toml";

/// Persisted copy of the wrapper script template
pub const TEMPLATE_FILE: &str = ".template";

/// Installed version file, relative to a repository root
pub const VERSION_FILE: &str = "usr/lib/tpupd/version";

/// Tracked bundles directory, relative to a repository root
pub const BUNDLES_DIR: &str = "usr/share/tpupd/bundles";

/// System-wide paths for one updater invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    path_prefix: PathBuf,
    state_dir: PathBuf,
}

impl Paths {
    pub fn new(path_prefix: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            path_prefix: path_prefix.into(),
            state_dir: state_dir.into(),
        }
    }

    /// Root of the system being updated
    pub fn path_prefix(&self) -> &Path {
        &self.path_prefix
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Get the third-party content directory
    pub fn third_party_dir(&self) -> PathBuf {
        self.path_prefix.join(THIRD_PARTY_DIR)
    }

    /// Get the repository list file
    pub fn repo_config(&self) -> PathBuf {
        self.third_party_dir().join(REPO_CONFIG_FILE)
    }

    /// Get the persisted wrapper script template
    pub fn template_file(&self) -> PathBuf {
        self.third_party_dir().join(TEMPLATE_FILE)
    }

    /// Get the directory where wrapper scripts are exported
    pub fn bin_dir(&self) -> PathBuf {
        self.third_party_dir().join("bin")
    }

    /// Get the paths scoped to one repository
    pub fn repo(&self, name: &str) -> RepoPaths {
        RepoPaths {
            root: self.third_party_dir().join("bundles").join(name),
            runtime_root: Path::new("/")
                .join(THIRD_PARTY_DIR)
                .join("bundles")
                .join(name),
            state: self.state_dir.join("3rd-party").join(name),
        }
    }
}

/// Paths scoped to one repository's namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPaths {
    root: PathBuf,
    runtime_root: PathBuf,
    state: PathBuf,
}

impl RepoPaths {
    /// Install root of the repository's content
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Install root as seen by the running system, ignoring the path prefix
    pub fn runtime_root(&self) -> &Path {
        &self.runtime_root
    }

    /// State directory of the repository
    pub fn state(&self) -> &Path {
        &self.state
    }

    /// Content-addressed staged file store
    pub fn staged_dir(&self) -> PathBuf {
        self.state.join("staged")
    }

    /// Delta files extracted from packs
    pub fn delta_dir(&self) -> PathBuf {
        self.state.join("delta")
    }

    /// Downloaded packs
    pub fn packs_dir(&self) -> PathBuf {
        self.state.join("packs")
    }

    /// Downloaded fullfile archives
    pub fn download_dir(&self) -> PathBuf {
        self.state.join("download")
    }

    pub fn version_file(&self) -> PathBuf {
        self.root.join(VERSION_FILE)
    }

    pub fn bundles_dir(&self) -> PathBuf {
        self.root.join(BUNDLES_DIR)
    }

    /// Location of a manifest file name on disk under the repository root
    pub fn installed(&self, filename: &str) -> PathBuf {
        self.root.join(filename.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_third_party_dir() {
        let paths = Paths::new("/", "/var/lib/tpupd");
        assert_eq!(paths.third_party_dir(), PathBuf::from("/opt/3rd-party"));
        assert_eq!(
            paths.template_file(),
            PathBuf::from("/opt/3rd-party/.template")
        );
        assert_eq!(paths.bin_dir(), PathBuf::from("/opt/3rd-party/bin"));
    }

    #[test]
    fn test_repo_paths() {
        let paths = Paths::new("/sysroot", "/var/lib/tpupd");
        let repo = paths.repo("extras");
        assert_eq!(
            repo.root(),
            Path::new("/sysroot/opt/3rd-party/bundles/extras")
        );
        assert_eq!(
            repo.runtime_root(),
            Path::new("/opt/3rd-party/bundles/extras")
        );
        assert_eq!(
            repo.staged_dir(),
            PathBuf::from("/var/lib/tpupd/3rd-party/extras/staged")
        );
        assert_eq!(
            repo.delta_dir(),
            PathBuf::from("/var/lib/tpupd/3rd-party/extras/delta")
        );
    }

    #[test]
    fn test_installed_strips_leading_slash() {
        let paths = Paths::new("/", "/var/lib/tpupd");
        let repo = paths.repo("extras");
        assert_eq!(
            repo.installed("/usr/bin/tool"),
            PathBuf::from("/opt/3rd-party/bundles/extras/usr/bin/tool")
        );
    }
}
