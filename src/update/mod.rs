// src/update/mod.rs

//! Third-party repository updates
//!
//! Each repository is updated by its own [`UpdatePipeline`], a fixed
//! sequence of stages driven by an explicit [`UpdateOptions`] value.
//! [`execute_update`] runs the pipeline for one or every configured
//! repository and then refreshes wrapper scripts when the template
//! changed.

mod orchestrator;
mod permissions;
mod pipeline;
mod wrapper;

pub use orchestrator::{execute_update, run_operation};
pub use permissions::{
    resolve_permission_report, validate_all, validate_permissions, PermissionOutcome,
    PermissionReport, DANGEROUS_BITS,
};
pub use pipeline::{check_update, UpdatePipeline, VersionStatus};
pub use wrapper::{is_eligible, render_script, WrapperScriptManager, SCRIPT_TEMPLATE};

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use strum_macros::{Display, EnumIter};

/// What an update run does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// Only compare installed and latest versions
    Status,
    /// Stage everything but install nothing
    DownloadOnly,
    #[default]
    Full,
}

/// Version an update moves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionTarget {
    #[default]
    Latest,
    Version(u32),
}

impl FromStr for VersionTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "latest" {
            return Ok(Self::Latest);
        }
        s.parse::<u32>()
            .map(Self::Version)
            .map_err(|_| Error::InvalidOption(format!("Invalid version '{}'", s)))
    }
}

impl fmt::Display for VersionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Version(v) => write!(f, "{}", v),
        }
    }
}

/// Options for one update run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOptions {
    pub mode: UpdateMode,
    pub target: VersionTarget,
    /// Keep the state directories after a successful update
    pub keep_cache: bool,
    pub run_scripts: bool,
    pub skip_optional: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            mode: UpdateMode::Full,
            target: VersionTarget::Latest,
            keep_cache: false,
            run_scripts: true,
            skip_optional: false,
        }
    }
}

impl UpdateOptions {
    /// Options as applied to a third-party repository
    ///
    /// Bundle scripts never run and optional bundles are never followed,
    /// whatever the caller asked for.
    pub fn third_party(mut self) -> Self {
        self.run_scripts = false;
        self.skip_optional = true;
        self
    }
}

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "title_case")]
pub enum Stage {
    LoadManifests,
    RunPreupdateScripts,
    DownloadPacks,
    ExtractPacks,
    PrepareForUpdate,
    ValidateFullfiles,
    DownloadFullfiles,
    ExtractFullfiles,
    UpdateFiles,
    UpdateBinaries,
    RunPostupdateScripts,
}

impl Stage {
    pub const ALL: [Stage; 11] = [
        Stage::LoadManifests,
        Stage::RunPreupdateScripts,
        Stage::DownloadPacks,
        Stage::ExtractPacks,
        Stage::PrepareForUpdate,
        Stage::ValidateFullfiles,
        Stage::DownloadFullfiles,
        Stage::ExtractFullfiles,
        Stage::UpdateFiles,
        Stage::UpdateBinaries,
        Stage::RunPostupdateScripts,
    ];

    /// Stages run in a mode; status mode runs none of them
    pub fn for_mode(mode: UpdateMode) -> &'static [Stage] {
        match mode {
            UpdateMode::Status => &[],
            UpdateMode::DownloadOnly => &Self::ALL[..8],
            UpdateMode::Full => &Self::ALL,
        }
    }
}

/// Number of progress steps advertised for a mode
pub fn steps_in_update(mode: UpdateMode) -> u64 {
    Stage::for_mode(mode).len() as u64
}
