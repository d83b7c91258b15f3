//! Built-in commands, run in-process without forking.

use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

use crate::error::{Result, ShellError};
use crate::shell::Shell;

/// A built-in gets the whole remainder of the line after its name as one
/// optional argument.
pub(crate) type Handler = fn(&mut Shell, Option<&str>, &mut dyn Write) -> Result<()>;

#[derive(Clone, Copy)]
pub(crate) struct Builtin {
    pub name: &'static str,
    pub description: &'static str,
    pub handler: Handler,
}

/// Immutable name to handler mapping, built once at startup.
///
/// Declaration order is kept for listing, and on duplicate names the first
/// declaration wins.
pub(crate) struct CommandTable {
    entries: Vec<Builtin>,
    index: HashMap<&'static str, usize>,
}

impl CommandTable {
    pub(crate) fn new(entries: Vec<Builtin>) -> Self {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            index.entry(entry.name).or_insert(i);
        }
        CommandTable { entries, index }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Handler> {
        self.index.get(name).map(|&i| self.entries[i].handler)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Builtin> {
        self.entries.iter()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        CommandTable::new(vec![
            Builtin {
                name: "cd",
                description: "change directory (no argument: $HOME, '-': $OLDPWD)",
                handler: cd,
            },
            Builtin {
                name: "echo",
                description: "print the argument, or the value of $VAR",
                handler: echo,
            },
            Builtin {
                name: "clr",
                description: "clear the screen",
                handler: clear,
            },
            Builtin {
                name: "quit",
                description: "leave the shell",
                handler: quit,
            },
            Builtin {
                name: "start_monitor",
                description: "launch the metrics monitor",
                handler: start_monitor,
            },
            Builtin {
                name: "stop_monitor",
                description: "terminate the metrics monitor",
                handler: stop_monitor,
            },
            Builtin {
                name: "status_monitor",
                description: "show metrics: cpu memory disk network processes context_switches all",
                handler: status_monitor,
            },
            Builtin {
                name: "help",
                description: "list built-in and extension commands",
                handler: help,
            },
        ])
    }
}

fn cd(_shell: &mut Shell, arg: Option<&str>, out: &mut dyn Write) -> Result<()> {
    let target: OsString = match arg {
        None => env::var_os("HOME").ok_or(ShellError::UndefinedVar("HOME"))?,
        Some("-") => {
            let previous = env::var_os("OLDPWD").ok_or(ShellError::UndefinedVar("OLDPWD"))?;
            writeln!(out, "{}", previous.to_string_lossy())?;
            previous
        }
        Some(dir) => OsString::from(dir),
    };

    let oldpwd = env::var_os("PWD")
        .or_else(|| env::current_dir().ok().map(PathBuf::into_os_string));

    env::set_current_dir(&target).map_err(|source| ShellError::ChangeDir {
        path: target.to_string_lossy().into_owned(),
        source,
    })?;

    let cwd = env::current_dir()?;
    if let Some(oldpwd) = oldpwd {
        env::set_var("OLDPWD", oldpwd);
    }
    env::set_var("PWD", &cwd);
    log::debug!("cwd is now {}", cwd.display());
    Ok(())
}

fn echo(_shell: &mut Shell, arg: Option<&str>, out: &mut dyn Write) -> Result<()> {
    match arg {
        None => writeln!(out)?,
        Some(text) => match text.strip_prefix('$') {
            Some(name) => match env::var(name) {
                Ok(value) => writeln!(out, "{value}")?,
                Err(_) => writeln!(out, "Environment variable not found: {name}")?,
            },
            None => writeln!(out, "{text}")?,
        },
    }
    Ok(())
}

fn clear(_shell: &mut Shell, _arg: Option<&str>, out: &mut dyn Write) -> Result<()> {
    write!(out, "\x1b[H\x1b[J")?;
    out.flush()?;
    Ok(())
}

fn quit(shell: &mut Shell, _arg: Option<&str>, _out: &mut dyn Write) -> Result<()> {
    shell.request_exit();
    Ok(())
}

fn start_monitor(shell: &mut Shell, _arg: Option<&str>, out: &mut dyn Write) -> Result<()> {
    shell.monitor.start(out)
}

fn stop_monitor(shell: &mut Shell, _arg: Option<&str>, out: &mut dyn Write) -> Result<()> {
    shell.monitor.stop(out)
}

fn status_monitor(shell: &mut Shell, arg: Option<&str>, out: &mut dyn Write) -> Result<()> {
    shell.monitor.status(arg, out)
}

fn help(shell: &mut Shell, _arg: Option<&str>, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "Built-in commands:")?;
    for builtin in shell.builtins.iter() {
        writeln!(out, "  {:<16}{}", builtin.name, builtin.description)?;
    }
    if !shell.extension.commands().is_empty() {
        writeln!(out, "Extension commands:")?;
        shell.extension.describe(out)?;
    }
    writeln!(out, "Anything else is run as an external program.")?;
    Ok(())
}
