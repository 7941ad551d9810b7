use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, execvp, fork};
use std::ffi::CString;
use std::fmt;
use std::io::{self, Write};
use tracing::debug;

use crate::error::{Result, ShellError};
use crate::redirection::{self, Command};
use crate::signals;

/// How a child process finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Signaled(i32),
}

impl Default for ExitStatus {
    fn default() -> Self {
        ExitStatus::Exited(0)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit value {}", code),
            ExitStatus::Signaled(signal) => write!(f, "terminated by signal {}", signal),
        }
    }
}

impl ExitStatus {
    /// Maps a wait result to a completion; `None` while the child is still around.
    pub fn from_wait(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(ExitStatus::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(ExitStatus::Signaled(signal as i32)),
            _ => None,
        }
    }
}

/// The process operations the shell needs, so the loop and the job registry
/// can run against a fake backend in tests.
pub trait Processes {
    /// Starts `command`. With `background` set the child detaches from the
    /// terminal's streams and keeps ignoring SIGINT.
    fn spawn(&mut self, command: &Command, background: bool) -> Result<Pid>;

    /// Blocks until `pid` (and only `pid`) terminates.
    fn wait(&mut self, pid: Pid) -> Result<ExitStatus>;

    /// Polls `pid` without blocking.
    fn try_wait(&mut self, pid: Pid) -> Result<Option<ExitStatus>>;

    /// Asks `pid` to terminate.
    fn terminate(&mut self, pid: Pid) -> Result<()>;
}

/// Real fork/exec/waitpid backend.
#[derive(Debug, Default)]
pub struct SystemProcesses;

impl Processes for SystemProcesses {
    fn spawn(&mut self, command: &Command, background: bool) -> Result<Pid> {
        let argv = command
            .args
            .iter()
            .map(|arg| {
                CString::new(arg.as_str()).map_err(|_| ShellError::NulInArgument(arg.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        // Anything still buffered would be written twice.
        io::stdout().flush()?;

        match unsafe { fork() }.map_err(ShellError::Fork)? {
            ForkResult::Parent { child } => {
                debug!(
                    "forked {} as pid {} background:{}",
                    command.program(),
                    child,
                    background
                );
                Ok(child)
            }
            ForkResult::Child => exec_child(command, background, &argv),
        }
    }

    fn wait(&mut self, pid: Pid) -> Result<ExitStatus> {
        loop {
            match waitpid(pid, None) {
                Ok(status) => {
                    if let Some(status) = ExitStatus::from_wait(status) {
                        debug!("pid {} finished: {}", pid, status);
                        return Ok(status);
                    }
                }
                Err(Errno::EINTR) => debug!("wait for pid {} interrupted, retrying", pid),
                Err(source) => {
                    return Err(ShellError::Wait {
                        pid: pid.as_raw(),
                        source,
                    });
                }
            }
        }
    }

    fn try_wait(&mut self, pid: Pid) -> Result<Option<ExitStatus>> {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => Ok(ExitStatus::from_wait(status)),
            Err(Errno::EINTR) => Ok(None),
            Err(source) => Err(ShellError::Wait {
                pid: pid.as_raw(),
                source,
            }),
        }
    }

    fn terminate(&mut self, pid: Pid) -> Result<()> {
        debug!("sending SIGTERM to pid {}", pid);
        kill(pid, Signal::SIGTERM).map_err(|source| ShellError::Kill {
            pid: pid.as_raw(),
            source,
        })
    }
}

/// Child side of a fork: redirect, fix up signals and exec. Never returns.
fn exec_child(command: &Command, background: bool, argv: &[CString]) -> ! {
    if let Err(err) = redirection::apply_redirects(command, background) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
    if let Err(err) = signals::reset_for_child(!background) {
        eprintln!("{}: {}", command.program(), err);
        std::process::exit(1);
    }

    match execvp(&argv[0], argv) {
        Ok(never) => match never {},
        Err(errno) => {
            eprintln!("{}: {}", command.program(), errno.desc());
            std::process::exit(1);
        }
    }
}
