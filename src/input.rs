use bytes::{Buf, BytesMut};
use libc::STDIN_FILENO;
use nix::errno::Errno;
use nix::unistd::read;
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use std::io::{self, Write};
use std::os::unix::io::RawFd;
use tracing::{debug, warn};

use crate::commands::BUILTINS;
use crate::completion::ShellCompleter;
use crate::error::{Result, ShellError};

/// Outcome of asking for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    Line(String),
    /// A signal arrived mid-read; whatever was typed is gone.
    Interrupted,
    Eof,
}

/// Supplies one line per call, without the trailing newline.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<ReadLine>;
}

const CHUNK: usize = 4096;

/// Reads a descriptor with read(2) directly so EINTR reaches the shell loop.
#[derive(Debug)]
pub struct RawInput {
    fd: RawFd,
    pending: BytesMut,
    eof: bool,
}

impl RawInput {
    pub fn stdin() -> Self {
        Self::from_fd(STDIN_FILENO)
    }

    pub fn from_fd(fd: RawFd) -> Self {
        Self {
            fd,
            pending: BytesMut::with_capacity(CHUNK),
            eof: false,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line = self.pending.split_to(end);
        self.pending.advance(1);
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

impl LineSource for RawInput {
    fn read_line(&mut self, prompt: &str) -> Result<ReadLine> {
        let mut stdout = io::stdout();
        stdout.write_all(prompt.as_bytes())?;
        stdout.flush()?;

        let mut chunk = [0u8; CHUNK];
        loop {
            if let Some(line) = self.take_line() {
                return Ok(ReadLine::Line(line));
            }
            if self.eof {
                if self.pending.is_empty() {
                    return Ok(ReadLine::Eof);
                }
                let rest = self.pending.split();
                return Ok(ReadLine::Line(String::from_utf8_lossy(&rest).into_owned()));
            }
            match read(self.fd, &mut chunk) {
                Ok(0) => self.eof = true,
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(Errno::EINTR) => {
                    debug!("read interrupted, dropping {} bytes", self.pending.len());
                    self.pending.clear();
                    return Ok(ReadLine::Interrupted);
                }
                Err(err) => return Err(ShellError::Input(err.to_string())),
            }
        }
    }
}

/// Interactive line editor with history and completion.
pub struct EditorInput {
    editor: Editor<ShellCompleter, DefaultHistory>,
}

impl EditorInput {
    pub fn new() -> Result<Self> {
        let mut editor = Editor::new().map_err(|e| ShellError::Input(e.to_string()))?;
        let builtins = BUILTINS.iter().map(|b| b.to_string()).collect();
        editor.set_helper(Some(ShellCompleter::new(builtins)));
        Ok(Self { editor })
    }
}

impl LineSource for EditorInput {
    fn read_line(&mut self, prompt: &str) -> Result<ReadLine> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(err) = self.editor.add_history_entry(line.as_str()) {
                        warn!("adding history entry failed: {}", err);
                    }
                }
                Ok(ReadLine::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(ReadLine::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadLine::Eof),
            Err(ReadlineError::Errno(errno)) if errno as i32 == libc::EINTR => {
                Ok(ReadLine::Interrupted)
            }
            Err(ReadlineError::Io(err)) if err.kind() == io::ErrorKind::Interrupted => {
                Ok(ReadLine::Interrupted)
            }
            Err(err) => Err(ShellError::Input(err.to_string())),
        }
    }
}
