use libc::{STDIN_FILENO, STDOUT_FILENO};
use nix::fcntl::{OFlag, open};
use nix::sys::stat::Mode;
use nix::unistd::{close, dup2};
use std::os::unix::io::RawFd;
use tracing::debug;

use crate::error::{Result, ShellError};

pub const INPUT_OPERATOR: &str = "<";
pub const OUTPUT_OPERATOR: &str = ">";
pub const BACKGROUND_MARKER: &str = "&";
pub const NULL_DEVICE: &str = "/dev/null";

/// A parsed external command: argv plus where its standard streams go.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Command {
    pub args: Vec<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub background: bool,
}

impl Command {
    pub fn program(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }
}

/// Strips a trailing `&` and reports whether it was there.
pub fn strip_background(tokens: &mut Vec<String>) -> bool {
    if tokens.last().is_some_and(|t| t == BACKGROUND_MARKER) {
        tokens.pop();
        true
    } else {
        false
    }
}

/// Parses tokens into a Command, extracting the background marker and redirection operators.
///
/// Each direction may be redirected once, in any order. An operator with no
/// filename after it, or a repeated operator, is rejected.
pub fn parse_command(mut tokens: Vec<String>) -> Result<Command> {
    let background = strip_background(&mut tokens);
    let mut args = Vec::with_capacity(tokens.len());
    let mut input = None;
    let mut output = None;
    let mut tokens = tokens.into_iter();

    while let Some(token) = tokens.next() {
        let (operator, slot) = match token.as_str() {
            INPUT_OPERATOR => (INPUT_OPERATOR, &mut input),
            OUTPUT_OPERATOR => (OUTPUT_OPERATOR, &mut output),
            _ => {
                args.push(token);
                continue;
            }
        };
        if slot.is_some() {
            return Err(ShellError::DuplicateRedirect(operator));
        }
        let file = tokens
            .next()
            .ok_or(ShellError::MissingRedirectTarget(operator))?;
        *slot = Some(file);
    }

    if args.is_empty() {
        return Err(ShellError::MissingCommand);
    }

    Ok(Command {
        args,
        input,
        output,
        background,
    })
}

/// Rebinds standard input/output of the calling process as `command` asks.
///
/// Only ever called in a forked child. With `detach` set, any direction the
/// user left alone is bound to the null device.
pub fn apply_redirects(command: &Command, detach: bool) -> Result<()> {
    let read_only = OFlag::O_RDONLY;
    let write_trunc = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;

    if let Some(path) = &command.input {
        rebind(path, read_only, STDIN_FILENO, "input")?;
    }
    if let Some(path) = &command.output {
        rebind(path, write_trunc, STDOUT_FILENO, "output")?;
    }
    if detach {
        if command.input.is_none() {
            rebind(NULL_DEVICE, read_only, STDIN_FILENO, "input")?;
        }
        if command.output.is_none() {
            rebind(NULL_DEVICE, write_trunc, STDOUT_FILENO, "output")?;
        }
    }
    Ok(())
}

fn rebind(path: &str, flags: OFlag, target: RawFd, direction: &'static str) -> Result<()> {
    let redirect_error = |source| ShellError::Redirect {
        path: path.to_string(),
        direction,
        source,
    };

    let fd = open(path, flags, Mode::from_bits_truncate(0o644)).map_err(redirect_error)?;
    debug!("redirect {} -> fd {} (opened as {})", path, target, fd);
    if fd != target {
        dup2(fd, target).map_err(redirect_error)?;
        close(fd).map_err(redirect_error)?;
    }
    Ok(())
}
