use anyhow::{Context, Result};
use clap::Parser;
use eddy_core::{IndexLifecycle, ShutdownReport};
use log::{error, info, warn};
use std::io;
use std::sync::{mpsc, Arc};
use std::thread;

mod commands;
mod config;

use commands::{serve, Handler};
use config::Args;

#[derive(Debug, Clone, Copy)]
enum ShutdownCause {
    Signal,
    EndOfInput,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    info!("Starting EDDY Server...");

    // 1. Load (a corrupt snapshot stops us here)
    let config = args.index_config()?;
    let lifecycle = Arc::new(IndexLifecycle::open(config).context("Failed to open index")?);
    let index = lifecycle.index();
    info!("Index ready: {} vectors (Dim: {})", index.count(), index.dimension());

    // 2. Shutdown triggers
    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    let signal_tx = shutdown_tx.clone();
    ctrlc::set_handler(move || {
        let _ = signal_tx.send(ShutdownCause::Signal);
    })
    .context("Error setting Ctrl-C handler")?;

    // 3. Request loop
    let handler = Handler::new(lifecycle.clone());
    thread::spawn(move || {
        let stdin = io::stdin();
        let stdout = io::stdout();
        if let Err(e) = serve(stdin.lock(), stdout.lock(), &handler) {
            error!("Request loop stopped: {}", e);
        }
        let _ = shutdown_tx.send(ShutdownCause::EndOfInput);
    });

    let cause = shutdown_rx.recv().unwrap_or(ShutdownCause::EndOfInput);
    info!("Shutdown requested ({:?})", cause);

    // 4. Final snapshot; never blocks exit for long, never fails it.
    match lifecycle.shutdown() {
        ShutdownReport::Saved { path, entries } => info!("Saved {} vectors to {}", entries, path.display()),
        ShutdownReport::Skipped { reason } => warn!("Exiting without final snapshot: {}", reason),
    }

    Ok(())
}
