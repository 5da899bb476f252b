//! vr-grip-tools - headless driver for gesture recognition and grip poses.
//!
//! Reads one s-expression command per line and prints the responses plus
//! any events raised while handling them.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use vr_grip_tools::ipc::handle_message;
use vr_grip_tools::GripState;

#[derive(Parser, Debug)]
#[command(name = "vr-grip-tools", about = "VR gesture recognition and grip pose driver")]
struct Cli {
    /// Read commands from this file instead of stdin
    #[arg(long)]
    script: Option<PathBuf>,

    /// Log every command to stderr
    #[arg(long)]
    trace: bool,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("vr-grip-tools {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vr_grip_tools=info".into()),
        )
        .init();

    info!("vr-grip-tools v{} starting", env!("CARGO_PKG_VERSION"));

    let input: Box<dyn BufRead> = match &cli.script {
        Some(path) => {
            info!("script: {}", path.display());
            let file = File::open(path)
                .with_context(|| format!("failed to open script {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(io::stdin())),
    };

    run(input, cli.trace)
}

fn run(input: Box<dyn BufRead>, trace: bool) -> anyhow::Result<()> {
    let mut state = GripState::new();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (line_no, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", line_no + 1))?;
        let command = line.trim();
        if command.is_empty() || command.starts_with(';') {
            continue;
        }
        if trace {
            eprintln!("<< {}", command);
        }

        if let Some(response) = handle_message(&mut state, command) {
            writeln!(out, "{}", response)?;
        }
        for event in state.drain_events() {
            writeln!(out, "{}", event)?;
        }
    }

    out.flush()?;
    debug!("processed {} ticks", state.ticks);
    info!("vr-grip-tools exiting");
    Ok(())
}
