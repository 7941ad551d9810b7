//! SIGINT is ignored by the shell, SIGTSTP toggles foreground-only mode.
//!
//! The mode flag is written only by [`handle_sigtstp`] and read by the main
//! loop, so a lock-free atomic is all it needs.

use anyhow::{Context as _, Result};
use libc::{STDOUT_FILENO, c_int};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

pub const ENTER_FOREGROUND_ONLY: &str = "\nEntering foreground-only mode (& is now ignored)\n";
pub const EXIT_FOREGROUND_ONLY: &str = "\nExiting foreground-only mode\n";

/// Process-wide foreground-only mode.
pub static FOREGROUND_ONLY: AtomicBool = AtomicBool::new(false);

/// Flips `flag` and returns the notice for the new mode.
pub fn toggle(flag: &AtomicBool) -> &'static str {
    if flag.fetch_xor(true, Ordering::SeqCst) {
        EXIT_FOREGROUND_ONLY
    } else {
        ENTER_FOREGROUND_ONLY
    }
}

extern "C" fn handle_sigtstp(_: c_int) {
    let notice = toggle(&FOREGROUND_ONLY);
    // write(2) is async-signal-safe; no formatting or allocation here.
    unsafe {
        libc::write(STDOUT_FILENO, notice.as_ptr().cast(), notice.len());
    }
}

/// Installs the shell's own dispositions. Called once at startup.
pub fn install() -> Result<()> {
    // No SA_RESTART: a blocked read or wait returns EINTR and the loop retries.
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::all());
    let toggle = SigAction::new(
        SigHandler::Handler(handle_sigtstp),
        SaFlags::empty(),
        SigSet::all(),
    );
    unsafe {
        sigaction(Signal::SIGINT, &ignore).context("failed to ignore SIGINT")?;
        sigaction(Signal::SIGTSTP, &toggle).context("failed to install SIGTSTP handler")?;
    }
    debug!("signal handlers installed");
    Ok(())
}

/// Dispositions for a freshly forked child, before exec.
///
/// Foreground children get SIGINT back; every child ignores SIGTSTP so
/// toggling the mode never suspends a job.
pub fn reset_for_child(foreground: bool) -> nix::Result<()> {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    unsafe {
        if foreground {
            let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
            sigaction(Signal::SIGINT, &default)?;
        }
        sigaction(Signal::SIGTSTP, &ignore)?;
    }
    Ok(())
}
