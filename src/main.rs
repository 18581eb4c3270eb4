//! Tablekeeper binary entry point.
//!
//! Without a subcommand the scrape pipeline runs over every configured
//! dataset. Administrative subcommands (`list`, `check`, `restore`,
//! `backup`) operate on the persisted spreadsheets and their CSV backups.
//!
//! Exit codes: 0 on success; non-zero when an integrity check fails, a
//! restoration errors, or any dataset fails during a run.

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // CLI output belongs on stdout

mod cli;

use clap::Parser as _;
use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = tablekeeper::logging::init() {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let cli = cli::Cli::parse();
    match cli::run_command(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
