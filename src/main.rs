use anyhow::{Context as _, Result};
use clap::Parser;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::input::{EditorInput, LineSource, RawInput};
use crate::jobs::MAX_JOBS;
use crate::process::SystemProcesses;
use crate::shell::Shell;

mod commands;
mod completion;
mod error;
mod input;
mod jobs;
mod process;
mod redirection;
mod shell;
mod signals;
mod tokenize;

const LOG_ENV: &str = "SMALLSH_LOG";

#[derive(Parser)]
#[command(author, version, about = "A small shell with background jobs", long_about = None)]
struct Cli {
    /// Read input without the line editor, even on a terminal
    #[arg(long)]
    plain: bool,

    /// Append log output to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Maximum number of background jobs
    #[arg(long, default_value_t = MAX_JOBS)]
    max_jobs: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_tracing(cli.log_file.as_deref()) {
        eprintln!("Failed to initialize tracing: {err}");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => {
            println!();
            ExitCode::SUCCESS
        }
        Err(err) => {
            let _ = io::stdout().flush();
            eprintln!("smallsh: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    signals::install()?;

    let mut input: Box<dyn LineSource> = if !cli.plain && io::stdin().is_terminal() {
        Box::new(EditorInput::new()?)
    } else {
        Box::new(RawInput::stdin())
    };
    debug!("starting shell, max_jobs:{}", cli.max_jobs);

    let mut shell = Shell::new(SystemProcesses, io::stdout(), cli.max_jobs);
    shell.run(input.as_mut())?;
    Ok(())
}

fn init_tracing(log_file: Option<&std::path::Path>) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true);

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Arc::new(file))
                .init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}
