//! Session state, line dispatch and the two input loops.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::builtin::CommandTable;
use crate::config::Config;
use crate::error::{Result, ShellError};
use crate::extension::Extension;
use crate::jobs::JobCounter;
use crate::monitor::Monitor;
use crate::parser::{self, LineKind};
use crate::prompt;

/// Consecutive failed reads after which the input counts as gone.
const MAX_READ_ERRORS: u32 = 3;

pub struct Shell {
    pub(crate) config: Config,
    pub(crate) builtins: CommandTable,
    pub(crate) extension: Box<dyn Extension>,
    pub(crate) monitor: Monitor,
    pub(crate) jobs: JobCounter,
    exit_requested: bool,
}

/// Cuts `line` at the first newline and drops a trailing carriage return.
pub(crate) fn strip_line_terminator(line: &mut String) {
    if let Some(pos) = line.find('\n') {
        line.truncate(pos);
    }
    if line.ends_with('\r') {
        line.pop();
    }
}

/// Shortens `line` to at most `max` characters. Returns whether it was cut.
pub(crate) fn truncate_line(line: &mut String, max: usize) -> bool {
    match line.char_indices().nth(max) {
        Some((byte_pos, _)) => {
            line.truncate(byte_pos);
            true
        }
        None => false,
    }
}

/// Decodes one raw input line. The flag tells whether bytes were replaced.
pub(crate) fn decode_line(raw: &[u8]) -> (String, bool) {
    match String::from_utf8_lossy(raw) {
        Cow::Borrowed(text) => (text.to_owned(), false),
        Cow::Owned(text) => (text, true),
    }
}

impl Shell {
    pub fn new(config: Config, mut extension: Box<dyn Extension>) -> Self {
        extension.register();
        let monitor = Monitor::new(config.monitor.clone());
        Shell {
            config,
            builtins: CommandTable::default(),
            extension,
            monitor,
            jobs: JobCounter::new(),
            exit_requested: false,
        }
    }

    pub(crate) fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    pub fn should_exit(&self) -> bool {
        self.exit_requested
    }

    /// Strips the line terminator in place, then routes the line to exactly
    /// one executor.
    pub fn dispatch(&mut self, line: &mut String) -> Result<()> {
        strip_line_terminator(line);

        let kind = parser::classify(line);
        log::debug!("{kind:?}: {line:?}");
        match kind {
            LineKind::Empty => Ok(()),
            LineKind::Background => {
                let job = self.execute_background(line)?;
                log::debug!(
                    "job {} (pid {}) produced {} bytes",
                    job.id,
                    job.pid,
                    job.output.len()
                );
                Ok(())
            }
            LineKind::Pipeline => self.execute_pipeline(line),
            LineKind::Redirection => self.execute_redirection(line),
            LineKind::Plain => self.execute_plain(line),
        }
    }

    /// Runs one line; only fatal errors escape, the rest are reported.
    fn run_line(&mut self, line: &mut String) -> Result<()> {
        match self.dispatch(line) {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                eprintln!("{e}");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    fn limit_line(&self, line: &mut String) -> bool {
        truncate_line(line, self.config.max_line_length)
    }

    pub fn run_interactive(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        if self.config.banner {
            prompt::banner(&mut stdout)?;
        }
        writeln!(
            stdout,
            "Interactive mode. Type 'help' for commands, 'quit' to exit.\n"
        )?;

        let mut rl = DefaultEditor::new()?;
        let mut read_errors = 0;
        while !self.should_exit() {
            match rl.readline(&prompt::render(self.config.color)) {
                Ok(mut line) => {
                    read_errors = 0;
                    if let Err(e) = rl.add_history_entry(line.as_str()) {
                        log::warn!("history: {e}");
                    }
                    if self.limit_line(&mut line) {
                        eprintln!(
                            "WARNING: command too long, truncated to {} characters",
                            self.config.max_line_length
                        );
                    }
                    self.run_line(&mut line)?;
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    writeln!(stdout, "\nEnd of input. Closing shelter.")?;
                    break;
                }
                Err(e) => {
                    eprintln!("shelter: cannot read input: {e}");
                    read_errors += 1;
                    if read_errors >= MAX_READ_ERRORS {
                        writeln!(stdout, "\nInput keeps failing. Closing shelter.")?;
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn run_batch(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|source| ShellError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let mut reader = BufReader::new(file);

        let mut stdout = io::stdout();
        if self.config.banner {
            prompt::banner(&mut stdout)?;
        }
        writeln!(stdout, "Executing commands from batch file: {}\n", path.display())?;

        let mut buf = Vec::new();
        let mut line_number = 0;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("ERROR: cannot read batch file after line {line_number}: {e}");
                    break;
                }
            }
            line_number += 1;

            let (mut line, replaced) = decode_line(&buf);
            if replaced {
                eprintln!("WARNING: line {line_number} is not valid UTF-8, bytes replaced");
            }
            strip_line_terminator(&mut line);
            if self.limit_line(&mut line) {
                eprintln!("WARNING: command on line {line_number} is too long, truncated");
            }
            writeln!(stdout, "[Line {line_number}] Executing: {line}")?;

            self.run_line(&mut line)?;
            if self.should_exit() {
                return Ok(());
            }
        }

        writeln!(stdout, "\nBatch execution completed.")?;
        Ok(())
    }
}
