// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Global argument: system root
fn path_prefix_arg() -> Arg {
    Arg::new("path_prefix")
        .long("path-prefix")
        .value_name("PATH")
        .global(true)
        .help("Root of the system being updated")
}

/// Global argument: state directory
fn state_dir_arg() -> Arg {
    Arg::new("state_dir")
        .long("state-dir")
        .value_name("PATH")
        .global(true)
        .help("Directory holding staged files, deltas and packs")
}

fn build_cli() -> Command {
    Command::new("tpupd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Update content installed from third-party repositories")
        .arg(path_prefix_arg())
        .arg(state_dir_arg())
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .global(true)
                .default_value("/etc/tpupd/config.toml")
                .help("Configuration file"),
        )
        .arg(
            Arg::new("assume")
                .long("assume")
                .value_name("yes|no")
                .global(true)
                .help("Answer confirmation prompts with yes or no"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log debug output"),
        )
        .subcommand(
            Command::new("update")
                .about("Update content from third-party repositories")
                .arg(
                    Arg::new("repo")
                        .short('R')
                        .long("repo")
                        .value_name("NAME")
                        .help("Repository to update (all repositories if omitted)"),
                )
                .arg(
                    Arg::new("version")
                        .short('V')
                        .long("version")
                        .value_name("VERSION")
                        .help("Version to update to (requires --repo), or \"latest\""),
                )
                .arg(
                    Arg::new("status")
                        .short('s')
                        .long("status")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("download")
                        .help("Only check whether an update is available"),
                )
                .arg(
                    Arg::new("keepcache")
                        .short('k')
                        .long("keepcache")
                        .action(ArgAction::SetTrue)
                        .help("Keep staged content and downloads after updating"),
                )
                .arg(
                    Arg::new("download")
                        .long("download")
                        .action(ArgAction::SetTrue)
                        .help("Download and stage content without installing it"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell", "elvish"])
                        .help("Shell to generate completions for"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("tpupd.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
