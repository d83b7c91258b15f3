//! Third-party command hook.
//!
//! An [`Extension`] is injected into [`Shell::new`](crate::shell::Shell::new)
//! at startup. Its commands are consulted after the built-ins and before
//! external programs.

use std::io::{self, Write};

/// Receives the tokens after the command name.
pub type ExtensionHandler = fn(&[&str]);

#[derive(Clone)]
pub struct ExtensionCommand {
    pub name: String,
    pub handler: ExtensionHandler,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionStatus {
    Handled,
    NotFound,
}

pub trait Extension {
    /// Called once when the shell is constructed.
    fn register(&mut self) {}

    fn commands(&self) -> &[ExtensionCommand];

    fn dispatch(&self, name: &str, args: &[&str]) -> ExtensionStatus {
        match self.commands().iter().find(|cmd| cmd.name == name) {
            Some(cmd) => {
                (cmd.handler)(args);
                ExtensionStatus::Handled
            }
            None => ExtensionStatus::NotFound,
        }
    }

    fn describe(&self, out: &mut dyn Write) -> io::Result<()> {
        for cmd in self.commands() {
            writeln!(out, "  {:<16}{}", cmd.name, cmd.description)?;
        }
        Ok(())
    }
}

/// The default: no extension commands.
#[derive(Debug, Default)]
pub struct NoExtensions;

impl Extension for NoExtensions {
    fn commands(&self) -> &[ExtensionCommand] {
        &[]
    }
}
