//! Metrics monitor collaborator.
//!
//! The monitor is an external program. We only start it, stop it with
//! SIGTERM, and read one JSON report at a time from its named pipe.

use std::ffi::CString;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::str::FromStr;

use serde::Deserialize;

use crate::config::MonitorConfig;
use crate::error::{Result, ShellError};

const MAX_REPORT_SIZE: usize = 4096;

const METRIC_NAMES: &str = "cpu, memory, disk, network, processes, context_switches, all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cpu,
    Memory,
    Disk,
    Network,
    Processes,
    ContextSwitches,
    All,
}

impl FromStr for Metric {
    type Err = ShellError;

    /// Accepts the metric name or its menu number.
    fn from_str(s: &str) -> Result<Metric> {
        match s {
            "cpu" | "1" => Ok(Metric::Cpu),
            "memory" | "2" => Ok(Metric::Memory),
            "disk" | "3" => Ok(Metric::Disk),
            "network" | "4" => Ok(Metric::Network),
            "processes" | "5" => Ok(Metric::Processes),
            "context_switches" | "6" => Ok(Metric::ContextSwitches),
            "all" | "7" => Ok(Metric::All),
            other => Err(ShellError::Monitor(format!(
                "unknown metric '{other}' ({METRIC_NAMES})"
            ))),
        }
    }
}

/// One report as written by the monitor. Absent fields are skipped on display.
#[derive(Debug, Default, Deserialize)]
pub struct Metrics {
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub disk_usage: Option<f64>,
    pub network_usage: Option<f64>,
    pub process_count: Option<f64>,
    pub context_switches: Option<f64>,
}

impl Metrics {
    pub fn parse(report: &[u8]) -> Result<Metrics> {
        Ok(serde_json::from_slice(report)?)
    }

    fn render_one(&self, metric: Metric, out: &mut dyn Write) -> io::Result<()> {
        match metric {
            Metric::Cpu => {
                if let Some(v) = self.cpu_usage {
                    writeln!(out, "CPU Usage: {v:.2}%")?;
                }
            }
            Metric::Memory => {
                if let Some(v) = self.memory_usage {
                    writeln!(out, "Memory Usage: {v:.2} MB")?;
                }
            }
            Metric::Disk => {
                if let Some(v) = self.disk_usage {
                    writeln!(out, "Disk Usage: {v:.2} GB")?;
                }
            }
            Metric::Network => {
                if let Some(v) = self.network_usage {
                    writeln!(out, "Network Usage: {v:.2} KB/s")?;
                }
            }
            Metric::Processes => {
                if let Some(v) = self.process_count {
                    writeln!(out, "Number of Processes: {}", v as u64)?;
                }
            }
            Metric::ContextSwitches => {
                if let Some(v) = self.context_switches {
                    writeln!(out, "Context Switches: {}", v as u64)?;
                }
            }
            Metric::All => {
                for metric in [
                    Metric::Cpu,
                    Metric::Memory,
                    Metric::Disk,
                    Metric::Network,
                    Metric::Processes,
                    Metric::ContextSwitches,
                ] {
                    self.render_one(metric, out)?;
                }
            }
        }
        Ok(())
    }

    pub fn render(&self, selection: &[Metric], out: &mut dyn Write) -> io::Result<()> {
        for &metric in selection {
            self.render_one(metric, out)?;
        }
        writeln!(out)
    }
}

/// Creates the named pipe unless something already exists at `path`.
pub(crate) fn ensure_fifo(path: &Path) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| ShellError::Monitor(format!("invalid FIFO path: {e}")))?;
    if unsafe { libc::mkfifo(c_path.as_ptr(), 0o666) } == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EEXIST) {
            return Err(ShellError::Monitor(format!(
                "cannot create FIFO {}: {err}",
                path.display()
            )));
        }
    }
    Ok(())
}

pub(crate) struct Monitor {
    config: MonitorConfig,
    child: Option<Child>,
}

impl Monitor {
    pub(crate) fn new(config: MonitorConfig) -> Self {
        Monitor {
            config,
            child: None,
        }
    }

    pub(crate) fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(|child| child.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                log::debug!("monitor exited on its own: {status}");
                self.child = None;
                false
            }
            Some(Err(e)) => {
                log::warn!("cannot query monitor state: {e}");
                true
            }
            None => false,
        }
    }

    pub(crate) fn start(&mut self, out: &mut dyn Write) -> Result<()> {
        if self.is_running() {
            writeln!(out, "The monitor is already running.")?;
            return Ok(());
        }

        let child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                ShellError::Monitor(format!(
                    "cannot start {}: {e}",
                    self.config.program.display()
                ))
            })?;

        log::debug!("monitor started with pid {}", child.id());
        writeln!(out, "Monitor started (pid {}).", child.id())?;
        self.child = Some(child);
        Ok(())
    }

    pub(crate) fn stop(&mut self, out: &mut dyn Write) -> Result<()> {
        match self.child.take() {
            Some(child) => {
                terminate(child)?;
                writeln!(out, "Monitor stopped.")?;
            }
            None => writeln!(out, "The monitor is not running.")?,
        }
        Ok(())
    }

    /// Reads one report from the FIFO and prints the selected metrics.
    pub(crate) fn status(&mut self, selection: Option<&str>, out: &mut dyn Write) -> Result<()> {
        let selection = match selection {
            Some(name) => vec![name.parse::<Metric>()?],
            None => self.config.metrics.clone(),
        };

        if !self.is_running() {
            writeln!(out, "The monitor is not running.")?;
            return Ok(());
        }

        ensure_fifo(&self.config.fifo)?;
        let report = read_report(&self.config.fifo)?;
        Metrics::parse(&report)?.render(&selection, out)?;
        Ok(())
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(child) = self.child.take() {
            if let Err(e) = terminate(child) {
                log::warn!("{e}");
            }
        }
    }
}

fn terminate(mut child: Child) -> Result<()> {
    // the monitor may already be gone; reaping below settles it either way
    unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
    let status = child.wait()?;
    log::debug!("monitor {} ended: {status}", child.id());
    Ok(())
}

fn read_report(fifo: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(fifo).map_err(|source| ShellError::Open {
        path: fifo.display().to_string(),
        source,
    })?;
    let mut buf = vec![0; MAX_REPORT_SIZE];
    let n = file.read(&mut buf)?;
    if n == 0 {
        return Err(ShellError::Monitor("no data received from the monitor".into()));
    }
    buf.truncate(n);
    Ok(buf)
}
