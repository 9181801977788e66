//! # Sail Check Entry Point
//!
//! Runs a single refresh cycle against the live sources and prints the result.
//!
//! ## Usage
//! ```text
//! sail-check            # terminal summary
//! sail-check --json     # full snapshot as JSON
//! ```
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `sail_check=info`). Network and parse failures never abort the run;
//! they show up as `--` fields in the report.

// Test modules
#[cfg(test)]
mod tests;

use sail_check_lib::config::Config;
use sail_check_lib::fetch::HttpFetcher;
use sail_check_lib::orchestrator::{Orchestrator, RefreshOutcome};
use sail_check_lib::report::render_text;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sail_check=info,sail_check_lib=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    init_tracing();

    let json_mode = env::args().any(|arg| arg == "--json");
    let config = Config::load();

    let transport = HttpFetcher::new(Duration::from_secs(config.sources.attempt_timeout_secs))?;
    let orchestrator = Orchestrator::new(config, Arc::new(transport))?;

    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(orchestrator.refresh());
    if outcome == RefreshOutcome::NoDataSource {
        warn!("showing last known values only");
    }

    let snapshot = orchestrator.snapshot();
    if json_mode {
        println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
    } else {
        print!("{}", render_text(&snapshot));
    }

    Ok(())
}
