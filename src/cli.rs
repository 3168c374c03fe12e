use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::process;

use crate::common::*;
use crate::sh::Shell;
use crate::tsh::Tsh;

type Builtin<'a> = Box<dyn Fn(&mut dyn Shell, &[&str]) -> CliResult + 'a>;

pub struct Config {
    pub prompt: String,
    pub emit_prompt: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            prompt: "tsh> ".to_owned(),
            emit_prompt: true,
        }
    }
}

pub struct Cli<'a> {
    config: Config,
    builtins: HashMap<String, Builtin<'a>>,
}

/// Splits a command line into words. A single-quoted span is one word; a
/// trailing `&` word asks for a background job and is dropped.
pub fn parse_line(line: &str) -> (Vec<String>, bool) {
    let mut argv = Vec::new();
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        let (word, tail) = match rest.strip_prefix('\'') {
            Some(quoted) => match quoted.find('\'') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted.trim_end(), ""),
            },
            None => {
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                (&rest[..end], &rest[end..])
            }
        };
        argv.push(word.to_owned());
        rest = tail.trim_start();
    }
    let bg = argv.last().map_or(false, |word| word == "&");
    if bg {
        argv.pop();
    }
    (argv, bg)
}

impl<'a> Cli<'a> {
    pub fn new(config: Config) -> Cli<'a> {
        let mut cli = Cli {
            config,
            builtins: HashMap::new(),
        };
        // register builtins
        {
            cli.builtin("exit", |_, _| process::exit(0));
            cli.builtin("jobs", |sh, _| sh.list_job());
            cli.builtin("bg", |sh, args| sh.bg(args));
            cli.builtin("fg", |sh, args| sh.fg(args));
        }
        cli
    }

    fn builtin<F>(&mut self, name: &str, builtin: F)
    where
        F: Fn(&mut dyn Shell, &[&str]) -> CliResult + 'a,
    {
        self.builtins.insert(name.to_owned(), Box::new(builtin));
    }

    /// Evaluates one input line and returns once nothing it started holds
    /// the foreground.
    pub fn dispatch(&mut self, line: &str) -> CliResult {
        let (argv, bg) = parse_line(line);
        if argv.is_empty() {
            return ok("");
        }
        let res = match self.builtins.get(argv[0].as_str()) {
            Some(f) => {
                let args: Vec<&str> = argv[1..].iter().map(String::as_str).collect();
                Tsh::run_builtin(f, &args)
            }
            None => Tsh::run_non_builtin(line, &argv, bg),
        };
        // wait fg job to finish
        if let Some(pid) = Tsh::get_fg_pid() {
            Tsh::wait_fg(pid);
        }
        res
    }

    fn prompt(&self) -> io::Result<()> {
        if self.config.emit_prompt {
            let mut out = io::stdout().lock();
            write!(out, "{}", self.config.prompt)?;
            out.flush()?;
        }
        Ok(())
    }

    /// Read/evaluate loop. Returns at end of input. Bytes that are not
    /// UTF-8 are replaced rather than ending the session.
    pub fn go(&mut self) -> io::Result<()> {
        let mut stdin = io::stdin().lock();
        let mut buf = Vec::new();
        loop {
            self.prompt()?;
            buf.clear();
            if stdin.read_until(b'\n', &mut buf)? == 0 {
                io::stdout().flush()?;
                return Ok(());
            }
            let line = String::from_utf8_lossy(&buf);
            // results were already written while the table was locked
            let _ = self.dispatch(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_foreground_and_background() {
        assert_eq!(parse_line("sleep 5\n"), (words(&["sleep", "5"]), false));
        assert_eq!(parse_line("sleep 5 &\n"), (words(&["sleep", "5"]), true));
        assert_eq!(parse_line("  /bin/echo   a\tb \n"), (words(&["/bin/echo", "a", "b"]), false));
    }

    #[test]
    fn quoted_span_is_one_word() {
        assert_eq!(
            parse_line("echo 'hello  world' x\n"),
            (words(&["echo", "hello  world", "x"]), false)
        );
        assert_eq!(parse_line("echo 'open\n"), (words(&["echo", "open"]), false));
        assert_eq!(parse_line("echo '' &\n"), (words(&["echo", ""]), true));
    }

    #[test]
    fn empty_lines_have_no_words() {
        assert_eq!(parse_line(""), (vec![], false));
        assert_eq!(parse_line("   \n"), (vec![], false));
        assert_eq!(parse_line("&\n"), (vec![], true));
    }

    #[test]
    fn empty_line_dispatches_nothing() {
        let mut cli = Cli::new(Config::default());
        assert_eq!(cli.dispatch("\n"), Ok(String::new()));
        assert_eq!(Tsh::get_fg_pid(), None);
    }
}
