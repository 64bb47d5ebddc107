// src/commands/mod.rs
//! Command handlers for the tpupd CLI

pub mod progress;
mod update;

pub use update::cmd_update;
