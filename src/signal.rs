use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use signal_hook::consts::signal::{SIGCHLD, SIGINT, SIGQUIT, SIGTSTP};
use signal_hook::iterator::Signals;
use std::io::{self, Write};
use std::process;
use std::thread;
use tracing::{debug, warn};

use crate::common::emit;
use crate::job::JobTable;
use crate::tsh::Tsh;

/// Takes over SIGCHLD, SIGINT, SIGTSTP and SIGQUIT. The handlers below run
/// on a dedicated thread, one signal at a time, with the job table locked.
pub fn install() -> io::Result<()> {
    let mut signals = Signals::new([SIGCHLD, SIGINT, SIGTSTP, SIGQUIT])?;
    thread::Builder::new()
        .name("signals".to_owned())
        .spawn(move || {
            for sig in signals.forever() {
                match sig {
                    SIGCHLD => handle_sigchld(),
                    SIGINT => handle_sigint(),
                    SIGTSTP => handle_sigtstp(),
                    SIGQUIT => handle_sigquit(),
                    other => debug!(signal = other, "unexpected signal"),
                }
            }
        })?;
    Ok(())
}

/// Reaps every child that has exited or stopped, without waiting for the
/// ones still running.
pub fn handle_sigchld() {
    Tsh::with_jobs(|jobs| loop {
        match wait::waitpid(
            Pid::from_raw(-1),
            Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED),
        ) {
            Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
            Ok(status) => {
                if let Some(line) = jobs.reap(status) {
                    emit(&Ok(line));
                }
            }
            Err(Errno::EINTR) => continue,
            Err(e) => {
                warn!("waitpid: {}", e);
                break;
            }
        }
    });
}

pub fn handle_sigint() {
    Tsh::with_jobs(|jobs| forward(jobs, Signal::SIGINT));
}

pub fn handle_sigtstp() {
    Tsh::with_jobs(|jobs| forward(jobs, Signal::SIGTSTP));
}

pub fn handle_sigquit() {
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "Terminating after receipt of SIGQUIT signal");
    let _ = out.flush();
    process::exit(1);
}

/// Sends `sig` to the foreground job's process group. Returns the group it
/// went to, `None` when nothing is in the foreground.
pub fn forward(jobs: &JobTable, sig: Signal) -> Option<Pid> {
    let pid = jobs.fg_pid()?;
    match signal::killpg(pid, sig) {
        Ok(()) => debug!(pid = pid.as_raw(), ?sig, "forwarded"),
        Err(e) => warn!(pid = pid.as_raw(), ?sig, "kill: {}", e),
    }
    Some(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::State;
    use std::os::unix::process::{CommandExt, ExitStatusExt};
    use std::process::Command;

    #[test]
    fn forward_without_foreground_job_is_noop() {
        let mut jobs = JobTable::new();
        assert_eq!(forward(&jobs, Signal::SIGINT), None);

        jobs.add(Pid::from_raw(1_000_000), State::Stopped, "a\n").unwrap();
        jobs.add(Pid::from_raw(1_000_001), State::Background, "b\n").unwrap();
        assert_eq!(forward(&jobs, Signal::SIGINT), None);
        assert_eq!(forward(&jobs, Signal::SIGTSTP), None);
    }

    #[test]
    fn interrupt_reaches_foreground_group_only() {
        let mut fg = Command::new("sleep").arg("30").process_group(0).spawn().unwrap();
        let mut bg = Command::new("sleep").arg("30").process_group(0).spawn().unwrap();
        let fg_pid = Pid::from_raw(fg.id() as i32);
        let bg_pid = Pid::from_raw(bg.id() as i32);

        let mut jobs = JobTable::new();
        jobs.add(bg_pid, State::Background, "sleep 30 &\n").unwrap();
        jobs.add(fg_pid, State::Foreground, "sleep 30\n").unwrap();
        assert_eq!(forward(&jobs, Signal::SIGINT), Some(fg_pid));

        let status = fg.wait().unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGINT as i32));
        assert_eq!(bg.try_wait().unwrap(), None);

        let _ = bg.kill();
        let _ = bg.wait();
    }
}
