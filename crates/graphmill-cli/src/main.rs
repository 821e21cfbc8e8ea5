#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use anyhow::Context;
use clap::Parser;
use config::{CliArgs, RunConfig};
use graphmill::Runtime;
use telemetry::init_telemetry;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let run = RunConfig::try_from(args)?;

    init_telemetry(run.log_format)?;
    log_startup_info(&run);

    let runtime = Runtime::new(&run.config)?;
    for running in runtime.run_phases(run.phases.iter().copied(), &run.config) {
        let mut running = running?;
        let phase = running.phase();
        let outcome = running.get();
        let totals = running.totals();
        running.close()?;

        let summary = outcome.with_context(|| format!("Phase {phase} failed"))?;
        tracing::info!(
            %phase,
            emitted = summary.emitted,
            failed = summary.failed,
            ?totals,
            "Phase complete"
        );
    }
    Ok(())
}

fn log_startup_info(run: &RunConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting migration with full config: {:#?}", run);
    } else {
        tracing::info!(phases = ?run.phases, "Starting migration");
    }
}
