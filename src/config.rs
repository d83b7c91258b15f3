//! TOML configuration.
//!
//! Every field has a default, so an empty or missing file is a valid config.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, ShellError};
use crate::monitor::Metric;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Print the welcome banner on startup.
    pub banner: bool,
    /// Use ANSI colors for the prompt and job lines.
    pub color: bool,
    /// Longer input lines are truncated with a warning.
    pub max_line_length: usize,
    /// Where background jobs capture their output.
    pub job_output_dir: PathBuf,
    pub monitor: MonitorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            banner: true,
            color: true,
            max_line_length: 255,
            job_output_dir: env::temp_dir(),
            monitor: MonitorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Executable launched by `start_monitor`, searched in `PATH`.
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Named pipe the monitor writes its JSON reports to.
    pub fifo: PathBuf,
    /// Metrics shown by `status_monitor` without an argument.
    pub metrics: Vec<Metric>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            program: PathBuf::from("metrics-monitor"),
            args: Vec::new(),
            fifo: PathBuf::from("/tmp/monitor_fifo"),
            metrics: vec![Metric::All],
        }
    }
}

impl Config {
    pub fn parse(toml_str: &str) -> Result<Config> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn load(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ShellError::Config(format!("{}: {e}", path.display())))?;
        Config::parse(&contents)
    }

    /// `$HOME/.config/shelter/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("shelter")
                .join("config.toml")
        })
    }

    /// An explicit path must load; the default location is optional.
    pub fn discover(explicit: Option<&Path>) -> Result<Config> {
        if let Some(path) = explicit {
            return Config::load(path);
        }
        match Config::default_path() {
            Some(path) if path.is_file() => {
                log::debug!("loading config from {}", path.display());
                Config::load(&path)
            }
            _ => Ok(Config::default()),
        }
    }
}
