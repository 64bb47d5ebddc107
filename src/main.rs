// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use std::io::{self, Write};
use std::process::ExitCode;
use tpupd::UpdateCode;

fn run(cli: Cli) -> Result<UpdateCode> {
    match cli.command {
        Commands::Update(args) => Ok(commands::cmd_update(&cli.global, &args)),
        Commands::Completions { shell } => {
            let mut stdout = io::stdout();
            clap_complete::generate(shell, &mut Cli::command(), "tpupd", &mut stdout);
            stdout.flush()?;
            Ok(UpdateCode::Ok)
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version also end up here
            return if e.use_stderr() {
                UpdateCode::InvalidOption.into()
            } else {
                UpdateCode::Ok.into()
            };
        }
    };

    let default_level = if cli.global.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code.into(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            UpdateCode::Failed.into()
        }
    }
}
