use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use std::fmt::Write;
use tracing::{debug, warn};

use crate::common::ShellError;

/// Most jobs the table tracks at once.
pub const MAXJOBS: usize = 16;

pub type Jid = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Foreground,
    Background,
    Stopped,
}

impl State {
    pub fn label(self) -> &'static str {
        match self {
            State::Foreground => "Foreground",
            State::Background => "Running",
            State::Stopped => "Stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub pid: Pid,
    pub jid: Jid,
    pub state: State,
    /// Raw input line, trailing newline included.
    pub cmdline: String,
}

impl Job {
    /// `[jid] (pid) cmdline`, the line echoed when a job starts or resumes in
    /// the background.
    pub fn echo(&self) -> String {
        format!("[{}] ({}) {}", self.jid, self.pid, self.cmdline)
    }
}

/// The jobs of the shell, kept ordered by jid.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        JobTable {
            jobs: Vec::with_capacity(MAXJOBS),
        }
    }

    pub fn is_full(&self) -> bool {
        self.jobs.len() >= MAXJOBS
    }

    /// Registers a freshly spawned process group leader and hands out the
    /// lowest jid no active job holds.
    pub fn add(&mut self, pid: Pid, state: State, cmdline: &str) -> Result<Jid, ShellError> {
        if self.is_full() {
            return Err(ShellError::TooManyJobs);
        }
        debug_assert!(self.lookup_by_pid(pid).is_none(), "pid {} tracked twice", pid);
        debug_assert!(
            state != State::Foreground || self.fg_pid().is_none(),
            "second foreground job"
        );

        let mut jid = 1;
        let mut slot = self.jobs.len();
        for (i, job) in self.jobs.iter().enumerate() {
            if job.jid != jid {
                slot = i;
                break;
            }
            jid += 1;
        }
        self.jobs.insert(
            slot,
            Job {
                pid,
                jid,
                state,
                cmdline: cmdline.to_owned(),
            },
        );
        debug!(jid, pid = pid.as_raw(), ?state, cmdline = cmdline.trim_end(), "added job");
        Ok(jid)
    }

    /// Drops the job owning `pid`. Unknown pids are not an error.
    pub fn remove(&mut self, pid: Pid) -> Option<Job> {
        let idx = self.jobs.iter().position(|job| job.pid == pid)?;
        let job = self.jobs.remove(idx);
        debug!(jid = job.jid, pid = pid.as_raw(), "removed job");
        Some(job)
    }

    pub fn lookup_by_pid(&self, pid: Pid) -> Option<&Job> {
        self.jobs.iter().find(|job| job.pid == pid)
    }

    pub fn lookup_by_jid(&self, jid: Jid) -> Option<&Job> {
        self.jobs.iter().find(|job| job.jid == jid)
    }

    /// Returns the jid of the updated job, `None` if `pid` is not tracked.
    pub fn set_state(&mut self, pid: Pid, state: State) -> Option<Jid> {
        let job = self.jobs.iter_mut().find(|job| job.pid == pid)?;
        debug!(jid = job.jid, pid = pid.as_raw(), from = ?job.state, to = ?state, "job state");
        job.state = state;
        Some(job.jid)
    }

    pub fn list(&self) -> &[Job] {
        &self.jobs
    }

    pub fn fg_pid(&self) -> Option<Pid> {
        self.jobs
            .iter()
            .find(|job| job.state == State::Foreground)
            .map(|job| job.pid)
    }

    /// Output of the `jobs` builtin.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for job in self.list() {
            let _ = write!(
                out,
                "[{}] ({}) {} {}",
                job.jid,
                job.pid,
                job.state.label(),
                job.cmdline
            );
        }
        out
    }

    /// Applies one status collected by the reaper and returns the line to
    /// report, if any. Normal exits are silent.
    pub fn reap(&mut self, status: WaitStatus) -> Option<String> {
        match status {
            WaitStatus::Exited(pid, code) => {
                debug!(pid = pid.as_raw(), code, "child exited");
                if self.remove(pid).is_none() {
                    warn!(pid = pid.as_raw(), "reaped untracked child");
                }
                None
            }
            WaitStatus::Signaled(pid, sig, _) => {
                debug!(pid = pid.as_raw(), ?sig, "child killed");
                match self.remove(pid) {
                    Some(job) => Some(format!(
                        "Job [{}] ({}) terminated by signal {}\n",
                        job.jid, pid, sig as i32
                    )),
                    None => {
                        warn!(pid = pid.as_raw(), "reaped untracked child");
                        None
                    }
                }
            }
            WaitStatus::Stopped(pid, sig) => {
                let jid = self.set_state(pid, State::Stopped)?;
                Some(format!(
                    "Job [{}] ({}) stopped by signal {}\n",
                    jid, pid, sig as i32
                ))
            }
            other => {
                debug!(status = ?other, "ignored wait status");
                None
            }
        }
    }
}
