use lazy_static::lazy_static;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::unistd::{self, ForkResult, Pid};
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::common::*;
use crate::job::{Job, JobTable, State};
use crate::sh::Shell;

/// The shell instance shared by the main flow and the signal thread.
struct Shared {
    tsh: Mutex<Tsh>,
    /// Signalled after every change the signal thread makes to the table.
    changed: Condvar,
}

lazy_static! {
    static ref SH: Shared = Shared {
        tsh: Mutex::new(Tsh::default()),
        changed: Condvar::new(),
    };
}

#[derive(Debug, Default)]
pub struct Tsh {
    jobs: JobTable,
}

/// A `bg`/`fg` target: `%N` names a jid, a bare number a pid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobRef {
    Jid(u64),
    Pid(u64),
}

/// Validates a `bg`/`fg` argument without looking at the job table.
pub fn parse_job_ref(verb: &'static str, arg: &str) -> Result<JobRef, ShellError> {
    let (is_jid, digits) = match arg.strip_prefix('%') {
        Some(rest) => (true, rest),
        None => (false, arg),
    };
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ShellError::BadArgument(verb));
    }
    let id = if digits.is_empty() {
        0
    } else {
        // only overflow can fail here
        digits.parse::<u64>().unwrap_or(u64::MAX)
    };
    Ok(if is_jid {
        JobRef::Jid(id)
    } else {
        JobRef::Pid(id)
    })
}

impl Shell for Tsh {
    fn list_job(&self) -> CliResult {
        ok(self.jobs.render())
    }

    fn bg(&mut self, args: &[&str]) -> CliResult {
        self.do_bgfg(args, true)
    }

    fn fg(&mut self, args: &[&str]) -> CliResult {
        self.do_bgfg(args, false)
    }

    fn run(&mut self, cmdline: &str, argv: &[String], bg: bool) -> CliResult {
        if self.jobs.is_full() {
            return Err(ShellError::TooManyJobs);
        }
        // everything the child touches is built before fork
        let args = argv
            .iter()
            .map(|arg| {
                CString::new(arg.as_bytes()).map_err(|_| ShellError::InvalidArgument(arg.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut ptrs: Vec<*const c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
        ptrs.push(ptr::null());
        let not_found = format!("{}: Command not found\n", argv[0]);

        let mut set = SigSet::empty();
        set.add(Signal::SIGCHLD);
        set.add(Signal::SIGTSTP);
        if let Err(e) = signal::pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&set), None) {
            warn!("pthread_sigmask: {}", e);
        }
        let res = match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => exec_child(&ptrs, &set, not_found.as_bytes()),
            Ok(ForkResult::Parent { child }) => {
                // the child does the same; whichever runs first creates the group
                let _ = unistd::setpgid(child, child);
                let state = if bg { State::Background } else { State::Foreground };
                match self.jobs.add(child, state, cmdline) {
                    Ok(jid) if bg => ok(format!("[{}] ({}) {}", jid, child, cmdline)),
                    Ok(_) => ok(""),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(ShellError::Fork(e)),
        };
        if let Err(e) = signal::pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&set), None) {
            warn!("pthread_sigmask: {}", e);
        }
        res
    }
}

/// Child side of a launch. The parent is multithreaded, so only
/// async-signal-safe calls from here on.
fn exec_child(argv: &[*const c_char], set: &SigSet, not_found: &[u8]) -> ! {
    reset_child_signals();
    let _ = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
    let _ = signal::pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(set), None);
    unsafe {
        libc::execvp(argv[0], argv.as_ptr());
        libc::write(libc::STDOUT_FILENO, not_found.as_ptr().cast(), not_found.len());
        libc::_exit(1)
    }
}

/// Puts every signal the shell catches back to its default action. Until
/// setpgid runs the child still shares the shell's process group, so a
/// terminal signal in that window must not reach the shell's handlers.
fn reset_child_signals() {
    let dfl = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for sig in [Signal::SIGINT, Signal::SIGTSTP, Signal::SIGQUIT] {
        unsafe {
            let _ = signal::sigaction(sig, &dfl);
        }
    }
}

impl Tsh {
    fn lock() -> MutexGuard<'static, Tsh> {
        SH.tsh.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs a builtin with the table locked. Output is written before the
    /// lock is released so reap reports cannot overtake it.
    pub fn run_builtin<F>(f: F, args: &[&str]) -> CliResult
    where
        F: Fn(&mut dyn Shell, &[&str]) -> CliResult,
    {
        let mut sh = Tsh::lock();
        let res = f(&mut *sh, args);
        emit(&res);
        res
    }

    pub fn run_non_builtin(cmdline: &str, argv: &[String], bg: bool) -> CliResult {
        let mut sh = Tsh::lock();
        let res = sh.run(cmdline, argv, bg);
        emit(&res);
        res
    }

    pub fn get_fg_pid() -> Option<Pid> {
        Tsh::lock().jobs.fg_pid()
    }

    /// Gives the signal thread the table, then wakes any waiter.
    pub fn with_jobs<R, F>(f: F) -> R
    where
        F: FnOnce(&mut JobTable) -> R,
    {
        let mut sh = Tsh::lock();
        let res = f(&mut sh.jobs);
        SH.changed.notify_all();
        res
    }

    /// Blocks until `pid` is no longer the foreground job, either because it
    /// is gone or because it stopped.
    pub fn wait_fg(pid: Pid) {
        let sh = Tsh::lock();
        let _sh = SH
            .changed
            .wait_while(sh, |sh| {
                sh.jobs
                    .lookup_by_pid(pid)
                    .map_or(false, |job| job.state == State::Foreground)
            })
            .unwrap_or_else(PoisonError::into_inner);
        debug!(pid = pid.as_raw(), "left foreground");
    }

    fn resolve(&self, target: JobRef) -> Result<&Job, ShellError> {
        match target {
            JobRef::Jid(id) => u32::try_from(id)
                .ok()
                .and_then(|jid| self.jobs.lookup_by_jid(jid))
                .ok_or(ShellError::NoSuchJob(id)),
            JobRef::Pid(id) => i32::try_from(id)
                .ok()
                .filter(|pid| *pid > 0)
                .and_then(|pid| self.jobs.lookup_by_pid(Pid::from_raw(pid)))
                .ok_or(ShellError::NoSuchProcess(id)),
        }
    }

    fn do_bgfg(&mut self, args: &[&str], bg: bool) -> CliResult {
        let typ = if bg { "bg" } else { "fg" };
        let arg = args.first().ok_or(ShellError::MissingArgument(typ))?;
        let target = parse_job_ref(typ, arg)?;
        let job = self.resolve(target)?.clone();

        let resume = match job.state {
            State::Stopped => true,
            State::Background => !bg,
            State::Foreground => false,
        };
        if resume {
            signal::killpg(job.pid, Signal::SIGCONT).map_err(ShellError::Kill)?;
            debug!(jid = job.jid, pid = job.pid.as_raw(), "sent SIGCONT");
        }
        if bg {
            self.jobs.set_state(job.pid, State::Background);
            ok(job.echo())
        } else {
            self.jobs.set_state(job.pid, State::Foreground);
            ok("")
        }
    }
}
