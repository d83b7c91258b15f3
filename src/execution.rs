//! The four executors and the process/descriptor plumbing under them.
//!
//! Every executor that forks blocks until its children are reaped, and the
//! child being waited on is registered with the signal relay for the
//! duration of the wait.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr::null;

use libc::{c_char, c_int, pid_t, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};

use crate::error::{Result, ShellError};
use crate::extension::ExtensionStatus;
use crate::jobs::BackgroundJob;
use crate::parser;
use crate::prompt;
use crate::shell::Shell;
use crate::sig;

pub(crate) enum Fork {
    Parent(pid_t),
    Child,
}

fn cvt(call: &'static str, ret: c_int) -> Result<c_int> {
    match ret {
        -1 => Err(ShellError::last_os_error(call)),
        _ => Ok(ret),
    }
}

/// Buffered output must not be duplicated into a child or lost across a
/// descriptor swap.
fn flush_stdio() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

pub(crate) fn fork() -> Result<Fork> {
    flush_stdio();
    match unsafe { libc::fork() } {
        -1 => Err(ShellError::last_os_error("fork")),
        0 => Ok(Fork::Child),
        pid => Ok(Fork::Parent(pid)),
    }
}

/// Leaves a forked child without running destructors.
pub(crate) fn child_exit(code: c_int) -> ! {
    flush_stdio();
    unsafe { libc::_exit(code) }
}

pub(crate) fn wait_for(pid: pid_t) -> Result<c_int> {
    let mut status: c_int = 0;
    loop {
        match unsafe { libc::waitpid(pid, &mut status, 0) } {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ShellError::Syscall {
                    call: "waitpid",
                    source: err,
                });
            }
            _ => {
                log::debug!("pid {pid} finished with status {status:#x}");
                return Ok(status);
            }
        }
    }
}

/// Waits for `pid` while it owns the relayed terminal signals.
pub(crate) fn wait_foreground(pid: pid_t) -> Result<c_int> {
    if let Some(previous) = sig::foreground() {
        log::warn!("foreground slot still held by {previous}, handing it to {pid}");
    }
    sig::set_foreground(pid);
    let status = wait_for(pid);
    sig::clear_foreground();
    status
}

fn dup(fd: RawFd) -> Result<OwnedFd> {
    let new_fd = cvt("dup", unsafe { libc::dup(fd) })?;
    Ok(unsafe { OwnedFd::from_raw_fd(new_fd) })
}

fn dup2(src: RawFd, dst: RawFd) -> Result<()> {
    cvt("dup2", unsafe { libc::dup2(src, dst) }).map(drop)
}

/// Returns (read end, write end).
fn pipe() -> Result<(OwnedFd, OwnedFd)> {
    let mut filedes: [c_int; 2] = [-1, -1];
    cvt("pipe", unsafe { libc::pipe(filedes.as_mut_ptr()) })?;
    Ok(unsafe {
        (
            OwnedFd::from_raw_fd(filedes[0]),
            OwnedFd::from_raw_fd(filedes[1]),
        )
    })
}

/// Replaces the current process image. Only returns by exiting.
pub(crate) fn exec_argv(argv: &[&str]) -> ! {
    let args: std::result::Result<Vec<CString>, _> =
        argv.iter().map(|&arg| CString::new(arg)).collect();
    let args = match args {
        Ok(args) if !args.is_empty() => args,
        Ok(_) => child_exit(127),
        Err(e) => {
            eprintln!("{}: {e}", argv[0]);
            child_exit(127)
        }
    };

    let mut ptrs: Vec<*const c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
    ptrs.push(null());

    unsafe { libc::execvp(ptrs[0], ptrs.as_ptr()) };

    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::NotFound {
        eprintln!("{}: command not found", argv[0]);
        child_exit(127)
    } else {
        eprintln!("{}: {err}", argv[0]);
        child_exit(126)
    }
}

/// Copies of stdin, stdout and stderr, put back and closed on drop.
pub(crate) struct SavedStdio {
    saved: [OwnedFd; 3],
}

impl SavedStdio {
    pub(crate) fn save() -> Result<Self> {
        flush_stdio();
        Ok(SavedStdio {
            saved: [dup(STDIN_FILENO)?, dup(STDOUT_FILENO)?, dup(STDERR_FILENO)?],
        })
    }
}

impl Drop for SavedStdio {
    fn drop(&mut self) {
        flush_stdio();
        for (fd, target) in self
            .saved
            .iter()
            .zip([STDIN_FILENO, STDOUT_FILENO, STDERR_FILENO])
        {
            if let Err(e) = dup2(fd.as_raw_fd(), target) {
                log::warn!("cannot restore descriptor {target}: {e}");
            }
        }
    }
}

fn open_input(path: &str) -> Result<File> {
    File::open(path).map_err(|source| ShellError::Open {
        path: path.to_owned(),
        source,
    })
}

fn open_output(path: &str) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)
        .map_err(|source| ShellError::Open {
            path: path.to_owned(),
            source,
        })
}

impl Shell {
    /// Built-in, then extension, then external program.
    fn run_command(&mut self, name: &str, arg: Option<&str>, argv: &[&str]) -> Result<()> {
        if let Some(handler) = self.builtins.lookup(name) {
            log::debug!("built-in {name}");
            let mut stdout = io::stdout();
            let result = handler(self, arg, &mut stdout);
            stdout.flush()?;
            return result;
        }

        if self.extension.dispatch(name, &argv[1..]) == ExtensionStatus::Handled {
            log::debug!("extension command {name}");
            return Ok(());
        }

        self.spawn_external(argv)
    }

    fn spawn_external(&mut self, argv: &[&str]) -> Result<()> {
        match fork()? {
            Fork::Child => exec_argv(argv),
            Fork::Parent(pid) => {
                log::debug!("forked {pid} for {argv:?}");
                wait_foreground(pid)?;
                Ok(())
            }
        }
    }

    pub(crate) fn execute_plain(&mut self, line: &str) -> Result<()> {
        let (name, arg) = match parser::split_command(line) {
            Some(parts) => parts,
            None => return Ok(()),
        };
        let argv = parser::tokenize(line);
        self.run_command(name, arg, &argv)
    }

    pub(crate) fn execute_pipeline(&mut self, line: &str) -> Result<()> {
        let segments = parser::split_pipeline(line)?;
        let n = segments.len();

        let mut pipes = Vec::with_capacity(n.saturating_sub(1));
        for _ in 1..n {
            pipes.push(pipe()?);
        }

        let mut children: Vec<pid_t> = Vec::with_capacity(n);
        for (i, argv) in segments.iter().enumerate() {
            match fork() {
                Ok(Fork::Child) => {
                    let wired = (|| -> Result<()> {
                        if i + 1 < n {
                            dup2(pipes[i].1.as_raw_fd(), STDOUT_FILENO)?;
                        }
                        if i > 0 {
                            dup2(pipes[i - 1].0.as_raw_fd(), STDIN_FILENO)?;
                        }
                        Ok(())
                    })();
                    // every inherited end must go, or readers never see EOF
                    drop(pipes);
                    if let Err(e) = wired {
                        eprintln!("{e}");
                        child_exit(1);
                    }
                    exec_argv(argv);
                }
                Ok(Fork::Parent(pid)) => children.push(pid),
                Err(e) => {
                    drop(pipes);
                    abort_children(&children);
                    return Err(e);
                }
            }
        }
        drop(pipes);

        log::debug!("pipeline of {n} started: {children:?}");
        for pid in children {
            wait_foreground(pid)?;
        }
        Ok(())
    }

    pub(crate) fn execute_redirection(&mut self, line: &str) -> Result<()> {
        let redirection = parser::parse_redirection(line)?;
        let saved = SavedStdio::save()?;

        if let Some(path) = redirection.input {
            let file = open_input(path)?;
            dup2(file.as_raw_fd(), STDIN_FILENO)?;
        }
        if let Some(path) = redirection.output {
            let file = open_output(path)?;
            dup2(file.as_raw_fd(), STDOUT_FILENO)?;
            dup2(file.as_raw_fd(), STDERR_FILENO)?;
        }

        let argv = &redirection.argv;
        let arg = argv[1..].join(" ");
        let arg = if arg.is_empty() { None } else { Some(arg.as_str()) };
        let result = self.run_command(argv[0], arg, argv);

        drop(saved);
        result
    }

    pub(crate) fn execute_background(&mut self, line: &str) -> Result<BackgroundJob> {
        let command = line.strip_suffix('&').unwrap_or(line).trim_end();
        if command.trim().is_empty() {
            return Err(ShellError::Syntax("missing command before '&'".into()));
        }

        let dir = &self.config.job_output_dir;
        let mut capture = tempfile::Builder::new()
            .prefix(&format!("job{}-", self.jobs.peek()))
            .suffix(".out")
            .tempfile_in(dir)
            .map_err(|source| ShellError::Open {
                path: dir.display().to_string(),
                source,
            })?;

        match fork()? {
            Fork::Child => {
                let code = match self.run_captured(command, capture.as_file()) {
                    Ok(()) => 0,
                    Err(e) => {
                        eprintln!("{e}");
                        1
                    }
                };
                child_exit(code)
            }
            Fork::Parent(pid) => {
                sig::set_foreground(pid);
                let id = self.jobs.next_id();
                let mut stdout = io::stdout();
                let header =
                    prompt::paint(&format!("[{id}] {pid}"), prompt::YELLOW, self.config.color);
                if let Err(e) = writeln!(stdout, "{header}").and_then(|_| stdout.flush()) {
                    log::warn!("cannot print job header: {e}");
                }
                let status = wait_for(pid);
                sig::clear_foreground();
                status?;

                let file = capture.as_file_mut();
                file.seek(SeekFrom::Start(0))?;
                let mut output = Vec::new();
                file.read_to_end(&mut output)?;
                stdout.write_all(&output)?;
                stdout.flush()?;

                Ok(BackgroundJob { id, pid, output })
            }
        }
    }

    /// Child side of a background launch: stdout and stderr go to `capture`.
    fn run_captured(&mut self, command: &str, capture: &File) -> Result<()> {
        let saved = SavedStdio::save()?;
        dup2(capture.as_raw_fd(), STDOUT_FILENO)?;
        dup2(capture.as_raw_fd(), STDERR_FILENO)?;
        let result = self.execute_plain(command);
        drop(saved);
        result
    }
}

/// A pipeline runs whole or not at all.
fn abort_children(children: &[pid_t]) {
    for &pid in children {
        unsafe { libc::kill(pid, libc::SIGKILL) };
        if let Err(e) = wait_for(pid) {
            log::warn!("cannot reap {pid}: {e}");
        }
    }
}
