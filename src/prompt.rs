// src/prompt.rs

//! Yes/no confirmation for actions that need the user's consent

use crate::config::Assume;
use crate::error::Result;
use std::io::{self, BufRead, IsTerminal, Write};

/// Something that can answer a yes/no question
pub trait Confirm {
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Fixed answer, for `--assume` and non-interactive callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssumeAnswer(pub bool);

impl From<Assume> for AssumeAnswer {
    fn from(assume: Assume) -> Self {
        Self(matches!(assume, Assume::Yes))
    }
}

impl Confirm for AssumeAnswer {
    fn confirm(&self, question: &str) -> Result<bool> {
        tracing::info!(
            "{} Assuming {}",
            question,
            if self.0 { "yes" } else { "no" }
        );
        Ok(self.0)
    }
}

/// Ask on the controlling terminal
///
/// Defaults to no, including when stdin is not a terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    pub fn new() -> Self {
        Self
    }
}

impl Confirm for TerminalPrompt {
    fn confirm(&self, question: &str) -> Result<bool> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            println!("{}", question);
            println!("Non-interactive input, answering no");
            return Ok(false);
        }

        let mut stdout = io::stdout();
        writeln!(stdout, "{}", question)?;
        write!(stdout, "Do you want to continue? (y/N) ")?;
        stdout.flush()?;

        let mut input = String::new();
        stdin.lock().read_line(&mut input)?;
        Ok(is_yes(&input))
    }
}

fn is_yes(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}
