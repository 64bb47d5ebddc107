// src/update/permissions.rs

//! Dangerous permission checks for third-party content
//!
//! A file from a third-party repository must not gain setuid, setgid or
//! sticky bits without the user noticing. Validation itself is pure and
//! returns one outcome per file; asking the user is a separate policy
//! step ([`resolve_permission_report`]).

use crate::delta::installed_path;
use crate::error::{Error, Result};
use crate::filesystem::StagedStore;
use crate::manifest::ManifestFile;
use crate::prompt::Confirm;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{debug, error, warn};

const S_ISUID: u32 = 0o4000;
const S_ISGID: u32 = 0o2000;
const S_ISVTX: u32 = 0o1000;

/// setuid, setgid and sticky
pub const DANGEROUS_BITS: u32 = S_ISUID | S_ISGID | S_ISVTX;

/// Verdict for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionOutcome {
    Ok,
    /// Acceptable only with the user's consent
    Warn(String),
    /// The file cannot be assessed; never acceptable
    Invalid(String),
}

fn describe(bits: u32) -> String {
    let mut names = Vec::new();
    if bits & S_ISUID != 0 {
        names.push("setuid");
    }
    if bits & S_ISGID != 0 {
        names.push("setgid");
    }
    if bits & S_ISVTX != 0 {
        names.push("sticky");
    }
    names.join(", ")
}

/// Check one update-set entry against its staged replacement
///
/// `root` is where the repository's current content is installed. Only
/// bits that the installed file did not already have are reported, so an
/// accepted setuid binary is not flagged again on every update.
pub fn validate_permissions(
    file: Option<&ManifestFile>,
    staged: &StagedStore,
    root: &Path,
) -> PermissionOutcome {
    let Some(file) = file else {
        return PermissionOutcome::Ok;
    };
    if file.is_deleted {
        return PermissionOutcome::Ok;
    }

    let staged_path = staged.path_for(&file.hash);
    let new_mode = match fs::symlink_metadata(&staged_path) {
        Ok(metadata) => metadata.permissions().mode(),
        Err(e) => {
            return PermissionOutcome::Invalid(format!(
                "staged file {} is not available: {}",
                staged_path.display(),
                e
            ))
        }
    };

    let new_bits = new_mode & DANGEROUS_BITS;
    if new_bits == 0 {
        return PermissionOutcome::Ok;
    }

    if file.peer.is_none() {
        return PermissionOutcome::Warn(format!(
            "new file with dangerous permissions ({})",
            describe(new_bits)
        ));
    }

    let current = installed_path(root, &file.filename);
    let old_mode = match fs::symlink_metadata(&current) {
        Ok(metadata) => metadata.permissions().mode(),
        Err(e) => {
            return PermissionOutcome::Invalid(format!(
                "installed file {} is not available: {}",
                current.display(),
                e
            ))
        }
    };

    let escalated = new_bits & !old_mode;
    if escalated == 0 {
        debug!(
            "{} keeps its existing {} bits",
            file.filename,
            describe(new_bits)
        );
        return PermissionOutcome::Ok;
    }

    PermissionOutcome::Warn(format!("permissions escalated ({})", describe(escalated)))
}

/// Outcomes for a whole update set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionReport {
    /// (filename, reason) for files that need consent
    pub warnings: Vec<(String, String)>,
    /// (filename, reason) for files that cannot be installed
    pub invalid: Vec<(String, String)>,
}

impl PermissionReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.invalid.is_empty()
    }

    pub fn needs_confirmation(&self) -> bool {
        self.invalid.is_empty() && !self.warnings.is_empty()
    }
}

/// Validate every entry of an update set
pub fn validate_all(files: &[ManifestFile], staged: &StagedStore, root: &Path) -> PermissionReport {
    let mut report = PermissionReport::default();
    for file in files {
        match validate_permissions(Some(file), staged, root) {
            PermissionOutcome::Ok => {}
            PermissionOutcome::Warn(reason) => {
                report.warnings.push((file.filename.clone(), reason))
            }
            PermissionOutcome::Invalid(reason) => {
                report.invalid.push((file.filename.clone(), reason))
            }
        }
    }
    report
}

/// Turn a report into continue/abort
///
/// Any invalid file aborts without asking. Warnings are listed and the
/// user is asked once; declining aborts the update.
pub fn resolve_permission_report(report: &PermissionReport, confirm: &dyn Confirm) -> Result<()> {
    if let Some((path, reason)) = report.invalid.first() {
        for (path, reason) in &report.invalid {
            error!("{}: {}", path, reason);
        }
        return Err(Error::InvalidFile {
            path: path.clone(),
            reason: reason.clone(),
        });
    }

    if report.warnings.is_empty() {
        return Ok(());
    }

    for (path, reason) in &report.warnings {
        warn!("{}: {}", path, reason);
    }
    let question = format!(
        "{} file(s) from a third-party repository have dangerous permissions.",
        report.warnings.len()
    );
    if confirm.confirm(&question)? {
        return Ok(());
    }

    let (path, reason) = &report.warnings[0];
    Err(Error::InvalidFile {
        path: path.clone(),
        reason: format!("{}; not accepted", reason),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::compute_hash;
    use crate::prompt::AssumeAnswer;
    use std::fs::Permissions;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Env {
        _temp: TempDir,
        root: PathBuf,
        store: StagedStore,
    }

    fn env() -> Env {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        fs::create_dir_all(root.join("usr/bin")).unwrap();
        let store = StagedStore::new(temp.path().join("staged"));
        store.ensure_dir().unwrap();
        Env {
            _temp: temp,
            root,
            store,
        }
    }

    /// Stage a file with `mode` and return its update-set entry
    fn stage(env: &Env, name: &str, mode: u32) -> ManifestFile {
        let temp = env.store.temp_file().unwrap();
        fs::write(temp.path(), name.as_bytes()).unwrap();
        fs::set_permissions(temp.path(), Permissions::from_mode(mode)).unwrap();
        let hash = compute_hash(temp.path()).unwrap();
        env.store.commit(temp, &hash).unwrap();
        ManifestFile::new(name, hash, 20)
    }

    /// Install the current version of `entry` with `mode` and link it as peer
    fn with_installed(env: &Env, mut entry: ManifestFile, mode: u32) -> ManifestFile {
        let path = installed_path(&env.root, &entry.filename);
        fs::write(&path, b"old").unwrap();
        fs::set_permissions(&path, Permissions::from_mode(mode)).unwrap();
        let mut previous = entry.clone();
        previous.hash = compute_hash(&path).unwrap();
        entry.peer = Some(Box::new(previous));
        entry
    }

    #[test]
    fn test_absent_and_deleted_are_ok() {
        let env = env();
        assert_eq!(
            validate_permissions(None, &env.store, &env.root),
            PermissionOutcome::Ok
        );

        let mut entry = stage(&env, "/usr/bin/tool", 0o4755);
        entry.is_deleted = true;
        assert_eq!(
            validate_permissions(Some(&entry), &env.store, &env.root),
            PermissionOutcome::Ok
        );
    }

    #[test]
    fn test_missing_staged_file_is_invalid() {
        let env = env();
        let entry = stage(&env, "/usr/bin/tool", 0o755);
        env.store.remove(&entry.hash).unwrap();
        assert!(matches!(
            validate_permissions(Some(&entry), &env.store, &env.root),
            PermissionOutcome::Invalid(_)
        ));
    }

    #[test]
    fn test_plain_file_is_ok() {
        let env = env();
        let entry = stage(&env, "/usr/bin/tool", 0o755);
        assert_eq!(
            validate_permissions(Some(&entry), &env.store, &env.root),
            PermissionOutcome::Ok
        );
    }

    #[test]
    fn test_setuid_escalation_warns() {
        let env = env();
        let entry = with_installed(&env, stage(&env, "/usr/bin/tool", 0o4755), 0o755);
        assert!(matches!(
            validate_permissions(Some(&entry), &env.store, &env.root),
            PermissionOutcome::Warn(reason) if reason.contains("escalated")
        ));
    }

    #[test]
    fn test_existing_setuid_is_ok() {
        let env = env();
        let entry = with_installed(&env, stage(&env, "/usr/bin/tool", 0o4755), 0o4755);
        assert_eq!(
            validate_permissions(Some(&entry), &env.store, &env.root),
            PermissionOutcome::Ok
        );
    }

    #[test]
    fn test_new_sticky_file_warns() {
        let env = env();
        let entry = stage(&env, "/usr/bin/tool", 0o1755);
        assert!(matches!(
            validate_permissions(Some(&entry), &env.store, &env.root),
            PermissionOutcome::Warn(reason) if reason.contains("sticky")
        ));
    }

    #[test]
    fn test_missing_installed_peer_is_invalid() {
        let env = env();
        let mut entry = stage(&env, "/usr/bin/tool", 0o4755);
        entry.peer = Some(Box::new(entry.clone()));
        assert!(matches!(
            validate_permissions(Some(&entry), &env.store, &env.root),
            PermissionOutcome::Invalid(_)
        ));
    }

    #[test]
    fn test_resolve_report() {
        let env = env();
        let plain = stage(&env, "/usr/bin/plain", 0o755);
        let risky = stage(&env, "/usr/bin/risky", 0o4755);

        let report = validate_all(&[plain.clone(), risky], &env.store, &env.root);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.needs_confirmation());

        assert!(resolve_permission_report(&report, &AssumeAnswer(true)).is_ok());
        assert!(matches!(
            resolve_permission_report(&report, &AssumeAnswer(false)),
            Err(Error::InvalidFile { .. })
        ));

        let clean = validate_all(&[plain], &env.store, &env.root);
        assert!(clean.is_clean());
        assert!(resolve_permission_report(&clean, &AssumeAnswer(false)).is_ok());
    }

    #[test]
    fn test_invalid_is_fatal_without_prompt() {
        struct NeverAsk;
        impl Confirm for NeverAsk {
            fn confirm(&self, _question: &str) -> Result<bool> {
                panic!("must not prompt");
            }
        }

        let report = PermissionReport {
            warnings: vec![("/usr/bin/a".into(), "new file".into())],
            invalid: vec![("/usr/bin/b".into(), "missing".into())],
        };
        assert!(matches!(
            resolve_permission_report(&report, &NeverAsk),
            Err(Error::InvalidFile { path, .. }) if path == "/usr/bin/b"
        ));
    }
}
