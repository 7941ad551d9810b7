use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

use crate::commands::{self, Action};
use crate::error::{Result, ShellError};
use crate::input::{LineSource, ReadLine};
use crate::jobs::JobRegistry;
use crate::process::{ExitStatus, Processes};
use crate::redirection::parse_command;
use crate::signals::FOREGROUND_ONLY;
use crate::tokenize::{expand_pid, tokenize};

pub const PROMPT: &str = ": ";

enum Flow {
    Continue,
    Exit,
}

/// The read/classify/dispatch/reap loop plus the state it carries between lines.
pub struct Shell<P: Processes, W: Write> {
    processes: P,
    jobs: JobRegistry,
    status: ExitStatus,
    out: W,
    foreground_only: &'static AtomicBool,
    pid: u32,
}

impl<P: Processes, W: Write> Shell<P, W> {
    pub fn new(processes: P, out: W, max_jobs: usize) -> Self {
        Self {
            processes,
            jobs: JobRegistry::with_capacity(max_jobs),
            status: ExitStatus::default(),
            out,
            foreground_only: &FOREGROUND_ONLY,
            pid: std::process::id(),
        }
    }

    /// Uses `flag` instead of the process-wide foreground-only mode.
    #[cfg(test)]
    pub fn with_mode_flag(mut self, flag: &'static AtomicBool) -> Self {
        self.foreground_only = flag;
        self
    }

    #[cfg(test)]
    pub fn status(&self) -> ExitStatus {
        self.status
    }

    /// Runs until `exit` or end of input, then terminates and reaps every job.
    ///
    /// Errors that escape are fatal to the shell.
    pub fn run<L: LineSource + ?Sized>(&mut self, input: &mut L) -> Result<()> {
        loop {
            let line = match input.read_line(PROMPT)? {
                ReadLine::Line(line) => line,
                ReadLine::Interrupted => continue,
                ReadLine::Eof => {
                    debug!("end of input");
                    break;
                }
            };

            match self.execute_line(&line) {
                Ok(Flow::Exit) => break,
                Ok(Flow::Continue) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    eprintln!("smallsh: {}", err);
                    self.status = ExitStatus::Exited(1);
                }
            }
            self.jobs.reap_once(&mut self.processes, &mut self.out)?;
        }

        self.shutdown();
        Ok(())
    }

    fn execute_line(&mut self, line: &str) -> Result<Flow> {
        let pid = self.pid;
        match commands::classify(line, |line| expand_pid(tokenize(line), pid)) {
            Action::Exit => return Ok(Flow::Exit),
            Action::Empty | Action::Comment => {}
            Action::Cd(target) => commands::execute_cd(target.as_deref())?,
            Action::Status => {
                writeln!(self.out, "{}", self.status)?;
                self.out.flush()?;
            }
            Action::External(tokens) => self.launch(tokens)?,
        }
        Ok(Flow::Continue)
    }

    fn launch(&mut self, tokens: Vec<String>) -> Result<()> {
        let command = parse_command(tokens)?;
        let background = command.background && !self.foreground_only.load(Ordering::SeqCst);
        if background && self.jobs.is_full() {
            return Err(ShellError::TooManyJobs(self.jobs.capacity()));
        }

        let pid = self.processes.spawn(&command, background)?;
        if background {
            writeln!(self.out, "background pid {}", pid)?;
            self.out.flush()?;
            self.jobs.insert(pid)?;
            return Ok(());
        }

        let status = self.processes.wait(pid)?;
        if let ExitStatus::Signaled(_) = status {
            writeln!(self.out, "{}", status)?;
            self.out.flush()?;
        }
        self.status = status;
        Ok(())
    }

    fn shutdown(&mut self) {
        if !self.jobs.is_empty() {
            debug!("terminating {} background jobs", self.jobs.len());
        }
        self.jobs.terminate_all(&mut self.processes);
        self.jobs.reap_all_blocking(&mut self.processes);
        if let Err(err) = self.out.flush() {
            warn!("flushing output at shutdown: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeProcesses;
    use crate::signals::toggle;
    use std::collections::VecDeque;

    struct Script(VecDeque<ReadLine>);

    impl Script {
        fn lines(lines: &[&str]) -> Self {
            Script(lines.iter().map(|l| ReadLine::Line(l.to_string())).collect())
        }
    }

    impl LineSource for Script {
        fn read_line(&mut self, _prompt: &str) -> Result<ReadLine> {
            Ok(self.0.pop_front().unwrap_or(ReadLine::Eof))
        }
    }

    fn run(
        processes: FakeProcesses,
        flag: &'static AtomicBool,
        lines: &[&str],
    ) -> (Shell<FakeProcesses, Vec<u8>>, String) {
        let mut shell = Shell::new(processes, Vec::new(), 50).with_mode_flag(flag);
        shell.run(&mut Script::lines(lines)).unwrap();
        let out = String::from_utf8(shell.out.clone()).unwrap();
        (shell, out)
    }

    #[test]
    fn test_blank_and_comment_lines_do_nothing() {
        static MODE: AtomicBool = AtomicBool::new(false);
        let (shell, out) = run(FakeProcesses::default(), &MODE, &["", "   ", "# echo hi"]);
        assert!(out.is_empty());
        assert!(shell.processes.spawned.is_empty());
    }

    #[test]
    fn test_status_reports_last_foreground_exit() {
        static MODE: AtomicBool = AtomicBool::new(false);
        let processes = FakeProcesses::default().outcome("fail", ExitStatus::Exited(7));
        let (shell, out) = run(processes, &MODE, &["status", "fail", "status", "exit"]);
        assert_eq!(out, "exit value 0\nexit value 7\n");
        assert_eq!(shell.status(), ExitStatus::Exited(7));
    }

    #[test]
    fn test_foreground_signal_is_reported_eagerly() {
        static MODE: AtomicBool = AtomicBool::new(false);
        let processes = FakeProcesses::default().outcome("victim", ExitStatus::Signaled(9));
        let (_, out) = run(processes, &MODE, &["victim", "status"]);
        assert_eq!(out, "terminated by signal 9\nterminated by signal 9\n");
    }

    #[test]
    fn test_background_job_is_announced_and_reaped() {
        static MODE: AtomicBool = AtomicBool::new(false);
        let (shell, out) = run(FakeProcesses::default(), &MODE, &["echo hi &"]);
        assert_eq!(
            out,
            "background pid 1000\nbackground pid 1000 is done: exit value 0\n"
        );
        let (command, background) = &shell.processes.spawned[0];
        assert!(*background);
        assert_eq!(command.args, vec!["echo", "hi"]);
    }

    #[test]
    fn test_background_status_is_not_recorded() {
        static MODE: AtomicBool = AtomicBool::new(false);
        let processes = FakeProcesses::default().outcome("fail", ExitStatus::Exited(3));
        let (_, out) = run(processes, &MODE, &["fail &", "status"]);
        assert!(out.ends_with("exit value 0\n"));
    }

    #[test]
    fn test_exit_terminates_running_jobs() {
        static MODE: AtomicBool = AtomicBool::new(false);
        let processes = FakeProcesses::default().long_running("sleep");
        let (shell, out) = run(processes, &MODE, &["sleep 100 &", "sleep 200 &", "exit"]);
        assert_eq!(out, "background pid 1000\nbackground pid 1001\n");
        assert_eq!(shell.processes.terminated.len(), 2);
        assert!(shell.jobs.is_empty());
        let first = shell.processes.terminated[0];
        assert!(shell.processes.is_reaped(first));
    }

    #[test]
    fn test_foreground_only_mode_ignores_ampersand() {
        static MODE: AtomicBool = AtomicBool::new(false);
        toggle(&MODE);
        let (shell, out) = run(FakeProcesses::default(), &MODE, &["echo hi &"]);
        assert!(out.is_empty());
        let (command, background) = &shell.processes.spawned[0];
        assert!(!*background);
        assert!(command.background);
    }

    #[test]
    fn test_toggling_twice_restores_background() {
        static MODE: AtomicBool = AtomicBool::new(false);
        toggle(&MODE);
        toggle(&MODE);
        let (shell, _) = run(FakeProcesses::default(), &MODE, &["true &"]);
        assert!(shell.processes.spawned[0].1);
    }

    #[test]
    fn test_interrupted_read_is_retried() {
        static MODE: AtomicBool = AtomicBool::new(false);
        let mut shell =
            Shell::new(FakeProcesses::default(), Vec::new(), 50).with_mode_flag(&MODE);
        let mut script = Script(VecDeque::from([
            ReadLine::Interrupted,
            ReadLine::Line("status".into()),
            ReadLine::Line("exit".into()),
        ]));
        shell.run(&mut script).unwrap();
        assert_eq!(String::from_utf8(shell.out).unwrap(), "exit value 0\n");
    }

    #[test]
    fn test_pid_is_expanded() {
        static MODE: AtomicBool = AtomicBool::new(false);
        let (shell, _) = run(FakeProcesses::default(), &MODE, &["echo $$ x$$y"]);
        let pid = std::process::id();
        assert_eq!(
            shell.processes.spawned[0].0.args,
            vec!["echo".to_string(), pid.to_string(), format!("x{}y", pid)]
        );
    }

    #[test]
    fn test_bad_redirect_sets_failure_without_forking() {
        static MODE: AtomicBool = AtomicBool::new(false);
        let (shell, out) = run(FakeProcesses::default(), &MODE, &["cat <", "status"]);
        assert!(shell.processes.spawned.is_empty());
        assert_eq!(out, "exit value 1\n");
    }

    #[test]
    fn test_full_registry_rejects_background() {
        static MODE: AtomicBool = AtomicBool::new(false);
        let processes = FakeProcesses::default().long_running("sleep");
        let mut shell = Shell::new(processes, Vec::new(), 1).with_mode_flag(&MODE);
        shell
            .run(&mut Script::lines(&["sleep 1 &", "sleep 2 &", "status"]))
            .unwrap();
        assert_eq!(shell.processes.spawned.len(), 1);
        assert_eq!(
            String::from_utf8(shell.out).unwrap(),
            "background pid 1000\nexit value 1\n"
        );
    }

    #[test]
    fn test_cd_failure_is_fatal() {
        static MODE: AtomicBool = AtomicBool::new(false);
        let mut shell =
            Shell::new(FakeProcesses::default(), Vec::new(), 50).with_mode_flag(&MODE);
        let err = shell
            .run(&mut Script::lines(&["cd /smallsh/no/such/dir", "status"]))
            .unwrap_err();
        assert!(matches!(err, ShellError::ChangeDir { .. }));
    }
}
