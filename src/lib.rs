// src/lib.rs

//! tpupd: third-party repository update engine
//!
//! Updates content installed from third-party repositories under
//! `/opt/3rd-party`, moving each repository from its installed version to
//! a newer one.
//!
//! # Architecture
//!
//! - Content-addressed: every file is identified by a SHA-256 hash over its
//!   metadata, content and extended attributes
//! - Deltas first: binary deltas against installed files are applied before
//!   anything is fetched in full, and every result is hash-verified
//! - Staged, then installed: content is gathered in a flat staged store and
//!   installed with temp file + rename
//! - Permission gated: new setuid, setgid or sticky bits need confirmation
//! - Exported binaries are reached through generated wrapper scripts

pub mod config;
pub mod delta;
mod error;
pub mod filesystem;
pub mod hash;
pub mod manifest;
pub mod paths;
pub mod progress;
pub mod prompt;
pub mod repository;
pub mod update;
pub mod xattrs;

pub use error::{Error, Result, UpdateCode};
pub use hash::{compute_hash, ContentHash};
pub use progress::{LogProgress, ProgressTracker, SilentProgress};
