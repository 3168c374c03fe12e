mod cli;
mod common;
mod job;
mod sh;
mod signal;
mod tsh;

use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

/// tsh - a tiny shell with job control
#[derive(Parser, Debug)]
#[command(name = "tsh")]
struct Args {
    /// Print additional diagnostic information
    #[arg(short = 'v')]
    verbose: bool,

    /// Do not emit a command prompt
    #[arg(short = 'p')]
    no_prompt: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over -v
    let level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    signal::install().context("installing signal handlers")?;

    let mut client = Cli::new(Config {
        emit_prompt: !args.no_prompt,
        ..Config::default()
    });
    client.go().context("reading command line")?;
    Ok(())
}
