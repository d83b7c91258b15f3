use std::env;
use std::ffi::CStr;
use std::io::{self, Write};

use libc::c_char;

pub(crate) const RESET: &str = "\x1b[0m";
pub(crate) const BOLD: &str = "\x1b[1m";
pub(crate) const GREEN: &str = "\x1b[32m";
pub(crate) const YELLOW: &str = "\x1b[33m";
pub(crate) const BLUE: &str = "\x1b[34m";

pub(crate) fn paint(text: &str, color: &str, enabled: bool) -> String {
    if enabled {
        format!("{color}{text}{RESET}")
    } else {
        text.to_owned()
    }
}

fn hostname() -> Option<String> {
    let mut buf = [0 as c_char; 256];
    match unsafe { libc::gethostname(buf.as_mut_ptr(), buf.len()) } {
        -1 => None,
        _ => {
            // not guaranteed to be terminated on truncation
            buf[buf.len() - 1] = 0;
            let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
            Some(name.to_string_lossy().into_owned())
        }
    }
}

/// `user@host:cwd$ `
pub(crate) fn render(color: bool) -> String {
    let user = env::var("USER").unwrap_or_else(|_| "survivor".to_owned());
    let host = hostname().unwrap_or_else(|| "unknown-host".to_owned());
    let cwd = env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "?".to_owned());

    let who = paint(&format!("{user}@{host}"), &format!("{BOLD}{GREEN}"), color);
    format!("{who}:{}$ ", paint(&cwd, BLUE, color))
}

pub(crate) fn banner(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "+------------------------------------------------+")?;
    writeln!(out, "|                    shelter                     |")?;
    writeln!(out, "|   interactive command interpreter, v{:<10} |", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "+------------------------------------------------+")?;
    writeln!(out)
}
