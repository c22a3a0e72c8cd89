mod cli;
mod commands;

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use notedex_core::NotedexError;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

const LOG_ENV: &str = "NOTEDEX_LOG";

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let operation = cli.command.operation();
    match commands::run_from_root(&cli.root, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_failure(operation, &err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Core errors are reported as their JSON payload; anything else as plain text.
fn report_failure(operation: &str, err: &anyhow::Error) {
    let mut stderr = io::stderr().lock();
    if let Some(core) = err.downcast_ref::<NotedexError>() {
        let payload = core.to_payload(operation, None);
        if let Ok(rendered) = serde_json::to_string_pretty(&payload) {
            let _ = writeln!(stderr, "{rendered}");
            return;
        }
    }
    let _ = writeln!(stderr, "error: {err:#}");
}
