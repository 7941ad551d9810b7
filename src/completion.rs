use rustyline::Helper;
use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use std::env;
use std::os::unix::fs::PermissionsExt;

/// Tab completion: programs for the first word, file names everywhere else.
pub struct ShellCompleter {
    builtins: Vec<String>,
    filename_completer: FilenameCompleter,
}

impl ShellCompleter {
    pub fn new(builtins: Vec<String>) -> Self {
        Self {
            builtins,
            filename_completer: FilenameCompleter::new(),
        }
    }

    fn programs(&self, prefix: &str) -> Vec<Pair> {
        let mut names: Vec<String> = self
            .builtins
            .iter()
            .filter(|b| b.starts_with(prefix))
            .cloned()
            .collect();

        if let Ok(path) = env::var("PATH") {
            for dir in path.split(':').filter(|d| !d.is_empty()) {
                let Ok(entries) = std::fs::read_dir(dir) else {
                    continue;
                };
                names.extend(
                    entries
                        .flatten()
                        .filter(|e| {
                            e.metadata()
                                .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
                        })
                        .filter_map(|e| e.file_name().into_string().ok())
                        .filter(|name| name.starts_with(prefix)),
                );
            }
        }

        names.sort();
        names.dedup();
        names
            .into_iter()
            .map(|name| Pair {
                replacement: format!("{} ", name),
                display: name,
            })
            .collect()
    }
}

impl Completer for ShellCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &rustyline::Context<'_>,
    ) -> Result<(usize, Vec<Self::Candidate>), ReadlineError> {
        let before = &line[..pos];
        let start = before.rfind(char::is_whitespace).map_or(0, |i| i + 1);
        if before[..start].trim().is_empty() {
            Ok((start, self.programs(&before[start..])))
        } else {
            self.filename_completer.complete(line, pos, ctx)
        }
    }
}

impl Helper for ShellCompleter {}
impl Hinter for ShellCompleter {
    type Hint = String;
}
impl Highlighter for ShellCompleter {}
impl Validator for ShellCompleter {}
