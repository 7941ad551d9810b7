use std::env;
use tracing::debug;

use crate::error::{Result, ShellError};

/// List of builtin commands
pub const BUILTINS: &[&str] = &["exit", "cd", "status"];

pub const COMMENT_MARKER: char = '#';

/// What a line asks the shell to do.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Exit,
    Empty,
    Comment,
    Cd(Option<String>),
    Status,
    External(Vec<String>),
}

/// Classifies a raw line. Blank lines and comments are decided before
/// tokenizing; everything else is looked up by its first token.
pub fn classify(line: &str, tokens: impl FnOnce(&str) -> Vec<String>) -> Action {
    if line.starts_with(COMMENT_MARKER) {
        return Action::Comment;
    }
    let mut tokens = tokens(line);
    match tokens.first().map(String::as_str) {
        None => Action::Empty,
        Some("exit") => Action::Exit,
        Some("status") => Action::Status,
        Some("cd") => Action::Cd(tokens.drain(..).nth(1)),
        Some(_) => Action::External(tokens),
    }
}

/// Changes the working directory to `target`, or to `$HOME` without one.
pub fn execute_cd(target: Option<&str>) -> Result<()> {
    let dir = match target {
        Some(dir) => dir.to_string(),
        None => env::var("HOME").map_err(|_| ShellError::HomeNotSet)?,
    };
    debug!("cd {}", dir);
    env::set_current_dir(&dir).map_err(|source| ShellError::ChangeDir { path: dir, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize::tokenize;

    #[test]
    fn test_classify_builtins() {
        assert_eq!(classify("exit", tokenize), Action::Exit);
        assert_eq!(classify("  exit  ", tokenize), Action::Exit);
        assert_eq!(classify("status", tokenize), Action::Status);
        assert_eq!(classify("cd", tokenize), Action::Cd(None));
        assert_eq!(classify("cd /tmp extra", tokenize), Action::Cd(Some("/tmp".into())));
    }

    #[test]
    fn test_classify_blank_and_comment() {
        assert_eq!(classify("", tokenize), Action::Empty);
        assert_eq!(classify("   \t", tokenize), Action::Empty);
        assert_eq!(classify("# ls -la", tokenize), Action::Comment);
        assert_eq!(classify("#", tokenize), Action::Comment);
    }

    #[test]
    fn test_classify_external() {
        assert_eq!(
            classify("ls -la &", tokenize),
            Action::External(vec!["ls".into(), "-la".into(), "&".into()])
        );
        assert_eq!(
            classify("exitx", tokenize),
            Action::External(vec!["exitx".into()])
        );
        assert_eq!(
            classify(" # not a comment", tokenize),
            Action::External(vec!["#".into(), "not".into(), "a".into(), "comment".into()])
        );
    }

    #[test]
    fn test_cd_failure_is_reported() {
        let err = execute_cd(Some("/smallsh/does/not/exist")).unwrap_err();
        assert!(matches!(err, ShellError::ChangeDir { .. }));
        assert!(err.is_fatal());
    }
}
