use crate::common::CliResult;

/// What the builtins and the dispatcher can ask of the shell. Every call
/// runs with the job table locked.
pub trait Shell {
    fn list_job(&self) -> CliResult;
    fn bg(&mut self, args: &[&str]) -> CliResult;
    fn fg(&mut self, args: &[&str]) -> CliResult;
    /// Launches `argv` as a new job. `cmdline` is the raw input line.
    fn run(&mut self, cmdline: &str, argv: &[String], bg: bool) -> CliResult;
}
