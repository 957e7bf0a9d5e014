//! Couple a model to its coupling participant and record the results.
//!
//! # Usage
//!
//! ```bash
//! cosim demos/increment/model-settings.json demos/increment/coupling-settings.json
//! ```

use clap::Parser;
use cosim::BuiltinModels;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

/// Co-simulate a black-box model against a coupling participant
#[derive(Parser, Debug)]
#[command(name = "cosim")]
#[command(about = "Co-simulate a time-stepped model against a coupling participant")]
struct Args {
    /// Model settings file (.json or .toml)
    model_settings: PathBuf,

    /// Coupling settings file (.json or .toml)
    coupling_settings: PathBuf,

    /// Log every coupling window (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let report = match cosim::run(&args.model_settings, &args.coupling_settings, &BuiltinModels) {
        Ok(report) => report,
        Err(err) => {
            error!("{}", err);
            eprintln!("Error: {}", err);
            return ExitCode::from(1);
        }
    };

    let summary = &report.summary;
    info!(
        "Finished at t={} after {} windows ({} rollbacks)",
        summary.final_time, summary.committed_windows, summary.rollbacks
    );
    match &report.result_file {
        Ok(path) => {
            println!("Results written to {}", path.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(2)
        }
    }
}
