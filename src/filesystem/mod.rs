// src/filesystem/mod.rs

//! Filesystem operations for staging and installing content

mod installer;
mod staged;

pub use installer::{copy_ownership, write_atomic, FileInstaller};
pub use staged::{clear_dir, remove_path, StagedStore};
