// src/commands/update.rs
//! Third-party repository update command

use super::progress::CliProgress;
use crate::cli::{GlobalArgs, UpdateArgs};
use tpupd::config::UpdaterConfig;
use tpupd::progress::{LogProgress, ProgressTracker};
use tpupd::prompt::{AssumeAnswer, Confirm, TerminalPrompt};
use tpupd::repository::LocalMirror;
use tpupd::update::execute_update;
use tpupd::UpdateCode;
use tracing::{error, info};

/// Update one or every third-party repository
pub fn cmd_update(global: &GlobalArgs, args: &UpdateArgs) -> UpdateCode {
    // Rejected before anything touches the system
    let options = match args.options() {
        Ok(options) => options,
        Err(e) => {
            error!("{}", e);
            return e.code();
        }
    };

    let config = match UpdaterConfig::load(&global.config).and_then(|config| {
        config.with_overrides(
            global.path_prefix.clone(),
            global.state_dir.clone(),
            global.assume,
        )
    }) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return e.code();
        }
    };
    info!(
        "Updating third-party content under {}",
        config.path_prefix.display()
    );

    let confirm: Box<dyn Confirm> = match config.assume {
        Some(assume) => Box::new(AssumeAnswer::from(assume)),
        None => Box::new(TerminalPrompt::new()),
    };
    let progress: Box<dyn ProgressTracker> = if global.verbose {
        Box::new(LogProgress::new("update", 0))
    } else {
        Box::new(CliProgress::new("update"))
    };

    let code = execute_update(
        &LocalMirror::new(),
        &config.paths(),
        args.repo.as_deref(),
        options,
        confirm.as_ref(),
        progress.as_ref(),
    );

    if code.is_ok() {
        println!("Update finished");
    } else {
        println!("Update failed: {}", code);
    }
    code
}
