// src/cli/mod.rs
//! CLI definitions for tpupd
//!
//! This module only declares the command line using clap. The command
//! implementations live in the `commands` module.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tpupd::config::{Assume, DEFAULT_CONFIG_PATH};
use tpupd::update::{UpdateMode, UpdateOptions, VersionTarget};
use tpupd::Error;

#[derive(Parser)]
#[command(name = "tpupd")]
#[command(version)]
#[command(about = "Update content installed from third-party repositories", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Root of the system being updated
    #[arg(long, global = true, value_name = "PATH")]
    pub path_prefix: Option<PathBuf>,

    /// Directory holding staged files, deltas and packs
    #[arg(long, global = true, value_name = "PATH")]
    pub state_dir: Option<PathBuf>,

    /// Configuration file
    #[arg(long, global = true, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Answer confirmation prompts with yes or no
    #[arg(long, global = true, value_name = "yes|no")]
    pub assume: Option<Assume>,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Update content from third-party repositories
    Update(UpdateArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct UpdateArgs {
    /// Repository to update (all repositories if omitted)
    #[arg(short = 'R', long = "repo", value_name = "NAME")]
    pub repo: Option<String>,

    /// Version to update to (requires --repo), or "latest"
    #[arg(short = 'V', long = "version", value_name = "VERSION")]
    pub version: Option<String>,

    /// Only check whether an update is available
    #[arg(short, long, conflicts_with = "download")]
    pub status: bool,

    /// Keep staged content and downloads after updating
    #[arg(short, long = "keepcache")]
    pub keepcache: bool,

    /// Download and stage content without installing it
    #[arg(long)]
    pub download: bool,
}

impl UpdateArgs {
    /// Build the options of an update run
    ///
    /// An explicit version only makes sense for one repository, since
    /// repositories are versioned independently. `latest` is fine for all.
    pub fn options(&self) -> tpupd::Result<UpdateOptions> {
        let target = match &self.version {
            Some(version) => version.parse::<VersionTarget>()?,
            None => VersionTarget::Latest,
        };
        if matches!(target, VersionTarget::Version(_)) && self.repo.is_none() {
            return Err(Error::InvalidOption(
                "a version can only be given together with --repo".to_string(),
            ));
        }

        let mode = if self.status {
            UpdateMode::Status
        } else if self.download {
            UpdateMode::DownloadOnly
        } else {
            UpdateMode::Full
        };

        Ok(UpdateOptions {
            mode,
            target,
            keep_cache: self.keepcache,
            ..Default::default()
        })
    }
}
