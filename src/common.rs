use nix::errno::Errno;
use std::io::{self, Write};
use thiserror::Error;

use crate::job::MAXJOBS;

/// Every line the shell reports back to the user when a command fails.
///
/// The `Display` strings are part of the shell's output format and are
/// matched by scripts driving it, so they must not change.
#[derive(Debug, Error, PartialEq)]
pub enum ShellError {
    #[error("{0} command requires PID or %jobid argument")]
    MissingArgument(&'static str),

    #[error("{0}: argument must be a PID or %jobid")]
    BadArgument(&'static str),

    #[error("%{0}: No such job")]
    NoSuchJob(u64),

    #[error("({0}): No such process")]
    NoSuchProcess(u64),

    #[error("tsh: too many jobs (max {})", MAXJOBS)]
    TooManyJobs,

    #[error("{0}: invalid argument")]
    InvalidArgument(String),

    #[error("fork: {0}")]
    Fork(Errno),

    #[error("kill: {0}")]
    Kill(Errno),
}

pub type CliResult = Result<String, ShellError>;

pub fn ok<T: ToString>(s: T) -> CliResult {
    Ok(s.to_string())
}

/// Writes a command's outcome to stdout. Output text carries its own
/// newlines; error lines get one appended.
pub fn emit(res: &CliResult) {
    let mut out = io::stdout().lock();
    let _ = match res {
        Ok(o) => write!(out, "{}", o),
        Err(e) => writeln!(out, "{}", e),
    };
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_lines_match_output_format() {
        assert_eq!(
            ShellError::MissingArgument("fg").to_string(),
            "fg command requires PID or %jobid argument"
        );
        assert_eq!(
            ShellError::BadArgument("bg").to_string(),
            "bg: argument must be a PID or %jobid"
        );
        assert_eq!(ShellError::NoSuchJob(9).to_string(), "%9: No such job");
        assert_eq!(
            ShellError::NoSuchProcess(1234).to_string(),
            "(1234): No such process"
        );
        assert_eq!(ShellError::TooManyJobs.to_string(), "tsh: too many jobs (max 16)");
    }
}
