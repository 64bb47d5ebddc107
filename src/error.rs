// src/error.rs

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Core error types for tpupd
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error with context
    #[error("I/O error: {0}")]
    IoError(String),

    /// A file could not be stat'ed or read while computing its hash
    #[error("Failed to compute hash of {path}: {source}")]
    HashComputation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Binary patch application failed
    #[error("Delta error: {0}")]
    DeltaError(String),

    /// Content did not hash to the expected value
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The manifest of record could not be loaded
    #[error("Failed to load MoM for version {version}: {reason}")]
    MomLoad { version: u32, reason: String },

    /// A bundle manifest could not be loaded
    #[error("Failed to load manifest {name}: {reason}")]
    ManifestLoad { name: String, reason: String },

    /// Bundle manifests could not be resolved into a full file list
    #[error("Failed to resolve bundle manifests: {0}")]
    RecurseManifest(String),

    /// Invalid combination of options
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Repository not found in the repository list
    #[error("Repository not found: {0}")]
    InvalidRepository(String),

    /// A file that should be assessed or installed is missing or unusable
    #[error("Invalid file {path}: {reason}")]
    InvalidFile { path: String, reason: String },

    /// Failed to persist a file to disk
    #[error("Failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Content could not be fetched from the repository
    #[error("Failed to fetch {0}")]
    Fetch(String),

    /// The installed version of a repository could not be determined
    #[error("Unable to determine current version: {0}")]
    CurrentVersionUnknown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Result code reported for this error
    pub fn code(&self) -> UpdateCode {
        match self {
            Self::MomLoad { .. } => UpdateCode::CouldntLoadMom,
            Self::ManifestLoad { .. } => UpdateCode::CouldntLoadManifest,
            Self::RecurseManifest(_) => UpdateCode::RecurseManifest,
            Self::InvalidOption(_) | Self::Config(_) | Self::Toml(_) => UpdateCode::InvalidOption,
            Self::InvalidRepository(_) => UpdateCode::InvalidRepository,
            Self::InvalidFile { .. } => UpdateCode::InvalidFile,
            Self::WriteFile { .. } => UpdateCode::CouldntWriteFile,
            Self::Fetch(_) | Self::ChecksumMismatch { .. } => UpdateCode::CouldntDownloadFile,
            Self::CurrentVersionUnknown(_) => UpdateCode::CurrentVersionUnknown,
            Self::Io(_)
            | Self::IoError(_)
            | Self::HashComputation { .. }
            | Self::DeltaError(_)
            | Self::Json(_) => UpdateCode::Failed,
        }
    }
}

/// Result type alias using tpupd's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Result codes of an update run, doubling as process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UpdateCode {
    /// Operation succeeded
    Ok = 0,
    /// Negative answer: no update available, or nothing to do
    No = 1,
    /// Generic failure
    Failed = 2,
    /// Invalid command-line option or option combination
    InvalidOption = 3,
    /// The manifest of record could not be loaded
    CouldntLoadMom = 4,
    /// Bundle manifests could not be resolved into a file list
    RecurseManifest = 5,
    /// A bundle manifest could not be loaded
    CouldntLoadManifest = 6,
    /// The requested repository does not exist
    InvalidRepository = 7,
    /// An invalid or corrupted file was detected
    InvalidFile = 8,
    /// A file could not be written to disk
    CouldntWriteFile = 9,
    /// Content could not be downloaded or failed verification
    CouldntDownloadFile = 10,
    /// The installed version could not be determined
    CurrentVersionUnknown = 11,
}

impl UpdateCode {
    /// Numeric exit status
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for UpdateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Ok => "success",
            Self::No => "no",
            Self::Failed => "failure",
            Self::InvalidOption => "invalid option",
            Self::CouldntLoadMom => "couldn't load MoM",
            Self::RecurseManifest => "couldn't resolve manifests",
            Self::CouldntLoadManifest => "couldn't load manifest",
            Self::InvalidRepository => "invalid repository",
            Self::InvalidFile => "invalid file",
            Self::CouldntWriteFile => "couldn't write file",
            Self::CouldntDownloadFile => "couldn't download file",
            Self::CurrentVersionUnknown => "current version unknown",
        };
        write!(f, "{} ({})", text, self.as_u8())
    }
}

impl From<UpdateCode> for std::process::ExitCode {
    fn from(code: UpdateCode) -> Self {
        std::process::ExitCode::from(code.as_u8())
    }
}

impl<T> From<&Result<T>> for UpdateCode {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => UpdateCode::Ok,
            Err(e) => e.code(),
        }
    }
}
