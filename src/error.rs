use std::io;

use rustyline::error::ReadlineError;

/// Errors produced while reading, parsing and executing command lines.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("{call}: {source}")]
    Syscall {
        call: &'static str,
        source: io::Error,
    },

    #[error("{path}: {source}")]
    Open { path: String, source: io::Error },

    #[error("cd: {path}: {source}")]
    ChangeDir { path: String, source: io::Error },

    #[error("cd: {0} not defined")]
    UndefinedVar(&'static str),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("monitor: {0}")]
    Monitor(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("line editor error: {0}")]
    Readline(#[from] ReadlineError),
}

impl ShellError {
    /// Wraps the current `errno` for the libc call named `call`.
    pub(crate) fn last_os_error(call: &'static str) -> Self {
        ShellError::Syscall {
            call,
            source: io::Error::last_os_error(),
        }
    }

    /// Fatal errors end the interpreter; everything else only ends the
    /// current line.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShellError::Syscall { .. } | ShellError::Readline(_))
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;
