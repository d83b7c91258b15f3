pub mod builtin;
pub mod config;
pub mod error;
pub mod execution;
pub mod extension;
pub mod jobs;
pub mod monitor;
pub mod parser;
pub mod prompt;
pub mod shell;
pub mod sig;

use std::path::PathBuf;
use std::process::ExitCode;

use argh::FromArgs;

use crate::config::Config;
use crate::error::{Result, ShellError};
use crate::extension::NoExtensions;
use crate::shell::Shell;

#[derive(FromArgs)]
/// Interactive command interpreter with pipes, redirection and background jobs.
struct Args {
    /// path to a TOML config file (default: ~/.config/shelter/config.toml)
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// file of commands to run line by line instead of reading from the terminal
    #[argh(positional)]
    batch: Option<PathBuf>,
}

fn run(args: Args) -> Result<()> {
    let config = Config::discover(args.config.as_deref())?;
    sig::install_relay()?;

    let mut shell = Shell::new(config, Box::new(NoExtensions));
    match args.batch {
        Some(path) => shell.run_batch(&path),
        None => shell.run_interactive(),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Args = argh::from_env();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(ShellError::Open { path, source }) => {
            eprintln!("ERROR: could not access command file '{path}': {source}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("shelter: {e}");
            ExitCode::FAILURE
        }
    }
}
