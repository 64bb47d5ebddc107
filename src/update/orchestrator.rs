// src/update/orchestrator.rs

//! Runs operations across third-party repositories

use super::pipeline::{check_update, UpdatePipeline};
use super::wrapper::WrapperScriptManager;
use super::{steps_in_update, UpdateMode, UpdateOptions};
use crate::error::{Result, UpdateCode};
use crate::paths::Paths;
use crate::progress::ProgressTracker;
use crate::prompt::Confirm;
use crate::repository::{find_repo, load_repos, RepoContext, Repository, UpdateBackend};
use tracing::{error, info, warn};

/// Run `op` for one named repository or for every repository
///
/// With a name, the operation's own code is returned. Without one, every
/// repository is processed in order and the first code that is neither
/// `Ok` nor `tolerated` is returned once all of them ran.
pub fn run_operation<F>(
    paths: &Paths,
    repos: &[Repository],
    repo_name: Option<&str>,
    tolerated: UpdateCode,
    operation: &str,
    mut op: F,
) -> UpdateCode
where
    F: FnMut(&RepoContext) -> Result<UpdateCode>,
{
    let mut run = |repo: &Repository| -> UpdateCode {
        let ctx = RepoContext::new(repo.clone(), paths);
        info!("{}: repository {}", operation, ctx.name());
        match op(&ctx) {
            Ok(code) => code,
            Err(e) => {
                error!("{} failed for repository {}: {}", operation, ctx.name(), e);
                e.code()
            }
        }
    };

    if let Some(name) = repo_name {
        return match find_repo(repos, name) {
            Ok(repo) => run(repo),
            Err(e) => {
                error!("{}", e);
                e.code()
            }
        };
    }

    let mut first_failure = None;
    for repo in repos {
        let code = run(repo);
        if code != UpdateCode::Ok && code != tolerated && first_failure.is_none() {
            first_failure = Some(code);
        }
    }
    first_failure.unwrap_or(UpdateCode::Ok)
}

/// Update third-party repositories
///
/// Runs the status check or the update pipeline for `repo_name`, or for
/// every configured repository. After any successful run, every wrapper
/// script is regenerated if the persisted template differs from the
/// current one.
pub fn execute_update<B: UpdateBackend + ?Sized>(
    backend: &B,
    paths: &Paths,
    repo_name: Option<&str>,
    options: UpdateOptions,
    confirm: &dyn Confirm,
    progress: &dyn ProgressTracker,
) -> UpdateCode {
    let options = options.third_party();

    let repos = match load_repos(paths) {
        Ok(repos) => repos,
        Err(e) => {
            error!("Failed to read the repository list: {}", e);
            return e.code();
        }
    };

    let selected = if repo_name.is_some() { 1 } else { repos.len() as u64 };
    progress.set_length(steps_in_update(options.mode) * selected);

    let wrappers = WrapperScriptManager::new(paths.clone());
    let code = if options.mode == UpdateMode::Status {
        run_operation(paths, &repos, repo_name, UpdateCode::No, "check-update", |ctx| {
            check_update(backend, ctx).map(|status| status.code())
        })
    } else {
        info!("Updates from a 3rd-party repository are forced to run without bundle scripts");
        run_operation(paths, &repos, repo_name, UpdateCode::No, "update", |ctx| {
            UpdatePipeline::new(backend, ctx, &options, confirm, progress, &wrappers)
                .run()
                .map(|()| UpdateCode::Ok)
        })
    };

    if !code.is_ok() {
        progress.finish_with_error(&code.to_string());
        return code;
    }
    if repos.is_empty() {
        progress.finish_with_message("Done");
        return code;
    }

    let code = regenerate_if_needed(backend, paths, &repos, &wrappers);
    if code.is_ok() {
        progress.finish_with_message("Done");
    } else {
        progress.finish_with_error(&code.to_string());
    }
    code
}

fn regenerate_if_needed<B: UpdateBackend + ?Sized>(
    backend: &B,
    paths: &Paths,
    repos: &[Repository],
    wrappers: &WrapperScriptManager,
) -> UpdateCode {
    if !wrappers.needs_regeneration() {
        return UpdateCode::Ok;
    }

    info!("The scripts that export binaries from 3rd-party repositories need to be regenerated");
    let code = run_operation(
        paths,
        repos,
        None,
        UpdateCode::Ok,
        "regenerate-scripts",
        |ctx| wrappers.regenerate_repo(backend, ctx).map(|()| UpdateCode::Ok),
    );
    if !code.is_ok() {
        warn!("Wrapper scripts were not all regenerated, the template is left as is");
        return code;
    }

    match wrappers.persist_template() {
        Ok(()) => UpdateCode::Ok,
        Err(e) => {
            error!("The wrapper scripts template failed to be updated: {}", e);
            e.code()
        }
    }
}
