// src/progress.rs

//! Shared progress tracking trait and implementations
//!
//! The update pipeline reports one step per completed stage through
//! [`ProgressTracker`]. Output modes:
//! - `SilentProgress`: No-op for scripted/quiet modes
//! - `LogProgress`: Logs progress to tracing
//!
//! The interactive progress bar lives with the CLI commands.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

/// Core trait for progress tracking
pub trait ProgressTracker: Send + Sync {
    /// Set the current status message
    fn set_message(&self, message: &str);

    /// Increment progress by the given amount
    fn increment(&self, amount: u64);

    /// Set the total (length) of the progress
    fn set_length(&self, length: u64);

    /// Get current position
    fn position(&self) -> u64;

    /// Get total length
    fn length(&self) -> u64;

    /// Finish progress successfully with a message
    fn finish_with_message(&self, message: &str);

    /// Finish progress with an error/abandonment message
    fn finish_with_error(&self, message: &str);

    /// Check if progress is finished
    fn is_finished(&self) -> bool;
}

#[derive(Debug, Default)]
struct Counters {
    position: AtomicU64,
    length: AtomicU64,
    finished: AtomicBool,
}

impl Counters {
    fn with_length(length: u64) -> Self {
        Self {
            length: AtomicU64::new(length),
            ..Default::default()
        }
    }

    fn add(&self, amount: u64) -> u64 {
        self.position.fetch_add(amount, Ordering::Relaxed) + amount
    }
}

/// Silent progress tracker (no-op)
#[derive(Debug, Default)]
pub struct SilentProgress {
    counters: Counters,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressTracker for SilentProgress {
    fn set_message(&self, _message: &str) {}

    fn increment(&self, amount: u64) {
        self.counters.add(amount);
    }

    fn set_length(&self, length: u64) {
        self.counters.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.counters.position.load(Ordering::Relaxed)
    }

    fn length(&self) -> u64 {
        self.counters.length.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, _message: &str) {
        self.counters.finished.store(true, Ordering::Relaxed);
    }

    fn finish_with_error(&self, _message: &str) {
        self.counters.finished.store(true, Ordering::Relaxed);
    }

    fn is_finished(&self) -> bool {
        self.counters.finished.load(Ordering::Relaxed)
    }
}

/// Logging progress tracker
///
/// Logs every step to tracing at info level.
#[derive(Debug)]
pub struct LogProgress {
    name: String,
    counters: Counters,
}

impl LogProgress {
    pub fn new(name: impl Into<String>, length: u64) -> Self {
        Self {
            name: name.into(),
            counters: Counters::with_length(length),
        }
    }
}

impl ProgressTracker for LogProgress {
    fn set_message(&self, message: &str) {
        info!("{}: {}", self.name, message);
    }

    fn increment(&self, amount: u64) {
        let position = self.counters.add(amount);
        let length = self.length();
        if length > 0 {
            info!("{}: step {}/{}", self.name, position, length);
        }
    }

    fn set_length(&self, length: u64) {
        self.counters.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.counters.position.load(Ordering::Relaxed)
    }

    fn length(&self) -> u64 {
        self.counters.length.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, message: &str) {
        self.counters.finished.store(true, Ordering::Relaxed);
        info!("{}: {}", self.name, message);
    }

    fn finish_with_error(&self, message: &str) {
        self.counters.finished.store(true, Ordering::Relaxed);
        info!("{}: ERROR - {}", self.name, message);
    }

    fn is_finished(&self) -> bool {
        self.counters.finished.load(Ordering::Relaxed)
    }
}
