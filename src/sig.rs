//! Terminal signal relay.
//!
//! The interpreter never dies from SIGINT, SIGTSTP or SIGQUIT itself. Those
//! signals are forwarded to the single child currently registered as the
//! foreground process, or dropped when there is none.

use std::mem::MaybeUninit;
use std::ptr::null_mut;
use std::sync::atomic::{AtomicI32, Ordering};

use libc::{c_int, pid_t, sighandler_t};

use crate::error::{Result, ShellError};

/// Signals relayed to the foreground child.
pub(crate) const RELAYED_SIGNALS: [c_int; 3] = [libc::SIGINT, libc::SIGTSTP, libc::SIGQUIT];

const NO_FOREGROUND: pid_t = 0;

/// Single slot, not a stack: a second foreground child overwrites the first.
static FOREGROUND_PID: AtomicI32 = AtomicI32::new(NO_FOREGROUND);

pub(crate) fn set_foreground(pid: pid_t) {
    FOREGROUND_PID.store(pid, Ordering::SeqCst);
}

pub(crate) fn clear_foreground() {
    FOREGROUND_PID.store(NO_FOREGROUND, Ordering::SeqCst);
}

pub(crate) fn foreground() -> Option<pid_t> {
    match FOREGROUND_PID.load(Ordering::SeqCst) {
        NO_FOREGROUND => None,
        pid => Some(pid),
    }
}

#[cfg(target_os = "linux")]
unsafe fn errno_location() -> *mut c_int {
    libc::__errno_location()
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
unsafe fn errno_location() -> *mut c_int {
    libc::__error()
}

/// Async-signal-safe: one atomic load and one kill(2), nothing else.
pub(crate) extern "C" fn relay(sig: c_int) {
    let pid = FOREGROUND_PID.load(Ordering::SeqCst);
    if pid > 0 {
        unsafe {
            // kill(2) may clobber errno under the interrupted code, see
            // https://github.com/vorner/signal-hook/blob/master/signal-hook-registry/src/lib.rs
            let saved_errno = *errno_location();
            libc::kill(pid, sig);
            *errno_location() = saved_errno;
        }
    }
}

pub(crate) fn install_sighandler(signum: c_int, handler: extern "C" fn(c_int)) -> Result<()> {
    let mut sa = unsafe { MaybeUninit::<libc::sigaction>::zeroed().assume_init() };
    sa.sa_sigaction = handler as sighandler_t;
    sa.sa_flags = libc::SA_RESTART;
    unsafe { libc::sigemptyset(&mut sa.sa_mask) };

    match unsafe { libc::sigaction(signum, &sa, null_mut()) } {
        -1 => Err(ShellError::last_os_error("sigaction")),
        _ => Ok(()),
    }
}

/// Routes every relayed signal through [`relay`].
pub(crate) fn install_relay() -> Result<()> {
    for signum in RELAYED_SIGNALS {
        install_sighandler(signum, relay)?;
    }
    log::debug!("signal relay installed for {:?}", RELAYED_SIGNALS);
    Ok(())
}
