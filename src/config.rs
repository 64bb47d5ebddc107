// src/config.rs
//! Updater configuration
//!
//! Loaded once per run from a TOML file (default `/etc/tpupd/config.toml`)
//! and overridden by command-line flags. A missing file yields defaults.

use crate::error::{Error, Result};
use crate::paths::Paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/tpupd/config.toml";

/// Pre-set answer for confirmation prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Assume {
    Yes,
    No,
}

impl std::str::FromStr for Assume {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" | "y" => Ok(Self::Yes),
            "no" | "n" => Ok(Self::No),
            other => Err(format!("expected yes or no, got '{}'", other)),
        }
    }
}

/// Updater configuration file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Root of the system being updated
    #[serde(default = "default_path_prefix")]
    pub path_prefix: PathBuf,

    /// State directory (staged files, deltas, packs)
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Answer confirmations without prompting
    #[serde(default)]
    pub assume: Option<Assume>,
}

fn default_path_prefix() -> PathBuf {
    PathBuf::from("/")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/tpupd")
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            path_prefix: default_path_prefix(),
            state_dir: default_state_dir(),
            assume: None,
        }
    }
}

impl UpdaterConfig {
    /// Load configuration from a TOML file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&content)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: UpdaterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.path_prefix.is_absolute() {
            return Err(Error::Config(format!(
                "path_prefix must be absolute, got {}",
                self.path_prefix.display()
            )));
        }
        if !self.state_dir.is_absolute() {
            return Err(Error::Config(format!(
                "state_dir must be absolute, got {}",
                self.state_dir.display()
            )));
        }
        Ok(())
    }

    /// Apply command-line overrides
    pub fn with_overrides(
        mut self,
        path_prefix: Option<PathBuf>,
        state_dir: Option<PathBuf>,
        assume: Option<Assume>,
    ) -> Result<Self> {
        if let Some(prefix) = path_prefix {
            self.path_prefix = prefix;
        }
        if let Some(state) = state_dir {
            self.state_dir = state;
        }
        if assume.is_some() {
            self.assume = assume;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn paths(&self) -> Paths {
        Paths::new(&self.path_prefix, &self.state_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = UpdaterConfig::parse("").unwrap();
        assert_eq!(config, UpdaterConfig::default());
        assert_eq!(config.path_prefix, PathBuf::from("/"));
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
path_prefix = "/sysroot"
state_dir = "/sysroot/var/lib/tpupd"
assume = "no"
"#;
        let config = UpdaterConfig::parse(toml_str).unwrap();
        assert_eq!(config.path_prefix, PathBuf::from("/sysroot"));
        assert_eq!(config.assume, Some(Assume::No));
    }

    #[test]
    fn test_relative_paths_rejected() {
        let result = UpdaterConfig::parse("path_prefix = \"relative\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let config = UpdaterConfig::load(&temp.path().join("none.toml")).unwrap();
        assert_eq!(config, UpdaterConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = UpdaterConfig::default()
            .with_overrides(Some(PathBuf::from("/mnt")), None, Some(Assume::Yes))
            .unwrap();
        assert_eq!(config.path_prefix, PathBuf::from("/mnt"));
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/tpupd"));
        assert_eq!(config.assume, Some(Assume::Yes));
    }

    #[test]
    fn test_assume_from_str() {
        assert_eq!("YES".parse::<Assume>(), Ok(Assume::Yes));
        assert_eq!("n".parse::<Assume>(), Ok(Assume::No));
        assert!("maybe".parse::<Assume>().is_err());
    }
}
