use nix::errno::Errno;
use thiserror::Error;

/// Errors raised by the shell itself (never by a forked child).
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("fork failed: {0}")]
    Fork(#[source] Errno),

    #[error("cd: cannot change to {path}: {source}")]
    ChangeDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cd: HOME not set")]
    HomeNotSet,

    #[error("syntax error: `{0}` expects a file name")]
    MissingRedirectTarget(&'static str),

    #[error("syntax error: `{0}` given more than once")]
    DuplicateRedirect(&'static str),

    #[error("syntax error: no command to run")]
    MissingCommand,

    #[error("cannot open {path} for {direction}: {source}")]
    Redirect {
        path: String,
        direction: &'static str,
        #[source]
        source: Errno,
    },

    #[error("argument contains a NUL byte: {0:?}")]
    NulInArgument(String),

    #[error("waiting for pid {pid} failed: {source}")]
    Wait {
        pid: i32,
        #[source]
        source: Errno,
    },

    #[error("signalling pid {pid} failed: {source}")]
    Kill {
        pid: i32,
        #[source]
        source: Errno,
    },

    #[error("too many background jobs (limit {0})")]
    TooManyJobs(usize),

    #[error("reading input failed: {0}")]
    Input(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Whether the error ends the whole shell rather than just the current line.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ShellError::Fork(_)
                | ShellError::ChangeDir { .. }
                | ShellError::HomeNotSet
                | ShellError::Input(_)
                | ShellError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;
