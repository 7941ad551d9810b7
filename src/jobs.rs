use indexmap::IndexSet;
use nix::unistd::Pid;
use std::io::Write;
use tracing::{debug, warn};

use crate::error::{Result, ShellError};
use crate::process::Processes;

/// Default number of background jobs tracked at once.
pub const MAX_JOBS: usize = 50;

/// Background processes that were forked and not yet reaped.
#[derive(Debug)]
pub struct JobRegistry {
    pids: IndexSet<Pid>,
    capacity: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_capacity(MAX_JOBS)
    }
}

impl JobRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pids: IndexSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.pids.len() >= self.capacity
    }

    #[cfg(test)]
    pub fn contains(&self, pid: Pid) -> bool {
        self.pids.contains(&pid)
    }

    pub fn insert(&mut self, pid: Pid) -> Result<()> {
        if self.is_full() {
            return Err(ShellError::TooManyJobs(self.capacity));
        }
        self.pids.insert(pid);
        debug!("tracking background pid {} ({} jobs)", pid, self.pids.len());
        Ok(())
    }

    /// One non-blocking pass over every job, reporting and dropping the finished ones.
    pub fn reap_once<P: Processes, W: Write>(
        &mut self,
        processes: &mut P,
        out: &mut W,
    ) -> Result<()> {
        let mut index = 0;
        while let Some(&pid) = self.pids.get_index(index) {
            match processes.try_wait(pid) {
                Ok(None) => index += 1,
                Ok(Some(status)) => {
                    writeln!(out, "background pid {} is done: {}", pid, status)?;
                    out.flush()?;
                    self.pids.shift_remove_index(index);
                }
                Err(err) => {
                    warn!("dropping background pid {}: {}", pid, err);
                    self.pids.shift_remove_index(index);
                }
            }
        }
        Ok(())
    }

    /// Sends SIGTERM to every job. Used at shutdown only.
    pub fn terminate_all<P: Processes>(&self, processes: &mut P) {
        for &pid in &self.pids {
            if let Err(err) = processes.terminate(pid) {
                warn!("{}", err);
            }
        }
    }

    /// Blocks until every job has been reaped. Used at shutdown only, after
    /// [`JobRegistry::terminate_all`].
    pub fn reap_all_blocking<P: Processes>(&mut self, processes: &mut P) {
        for pid in self.pids.drain(..) {
            match processes.wait(pid) {
                Ok(status) => debug!("reaped background pid {} at shutdown: {}", pid, status),
                Err(err) => warn!("{}", err),
            }
        }
    }
}
