use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use context_admission::script::{parse_script, replay};
use context_admission::AdmissionConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Replay a script of register/unregister calls against the admission controller.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Script file (JSON). Use `-` to read from stdin.
    script: PathBuf,
    /// Override the number of live contexts allowed
    #[arg(long)]
    capacity: Option<usize>,
    /// Override the near-limit margin
    #[arg(long)]
    margin: Option<usize>,
    /// Config file (JSON) applied before the overrides
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the report on one line
    #[arg(long)]
    compact: bool,
}

fn main() -> ExitCode {
    // Logs go to stderr so stdout stays valid JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI arguments.
    let args = Args::parse();

    match run(&args) {
        Ok(out) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            eprintln!("ctxadm: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> context_admission::errors::Result<String> {
    // Read the script.
    let raw = if args.script.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&args.script)?
    };
    let script = parse_script(&raw)?;

    // Build options: file, then flags. Without either, the script's own config wins.
    let mut config = match args.config.as_ref() {
        Some(path) => Some(AdmissionConfig::from_path(path)?),
        None => None,
    };
    if args.capacity.is_some() || args.margin.is_some() {
        let mut cfg = config.or(script.config).unwrap_or_default();
        if let Some(capacity) = args.capacity {
            cfg.max_contexts = capacity;
        }
        if let Some(margin) = args.margin {
            cfg.near_limit_margin = margin;
        }
        config = Some(cfg);
    }

    let report = replay(&script, config)?;
    info!(steps = report.events.len(), live = report.live.len(), "replay finished");

    // Output result.
    let out = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    Ok(out)
}
