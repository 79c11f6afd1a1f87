//! Diagnostic event manager scenario runner
//!
//! Replays a scripted sequence of monitor results, operation cycle restarts
//! and clear requests against a configured event manager, then prints the
//! resulting status bytes, memory entries, permanent DTCs and readiness.
//!
//! # Usage
//!
//! ```bash
//! ./dem-sim --config config/dem.toml --scenario config/scenario-confirm-and-age.toml
//! ./dem-sim -c config/dem.toml -s config/scenario-permanent.toml --output json
//! ```

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dem_core::{Dem, DemConfig, ReadinessTracker};
use tracing::info;

mod output;
mod report;
mod scenario;

use output::{OutputContext, OutputFormat};
use report::Report;
use scenario::Scenario;

#[derive(Parser, Debug)]
#[command(name = "dem-sim")]
#[command(about = "Replay monitor scenarios through the diagnostic event manager")]
struct Args {
    /// Event manager configuration file (TOML format)
    #[arg(short, long, env = "DEM_CONFIG")]
    config: String,

    /// Scenario file (TOML format)
    #[arg(short, long)]
    scenario: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let ctx = OutputContext::new(args.output, args.no_color);

    if let Err(e) = run(args, &ctx) {
        ctx.error(&format!("Error: {:#}", e));
        std::process::exit(1);
    }
}

fn run(args: Args, ctx: &OutputContext) -> Result<()> {
    // Initialize tracing on stderr so JSON output stays clean
    let filter = if args.verbose {
        "dem_sim=debug,dem_core=debug"
    } else {
        "dem_sim=info,dem_core=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Loading config from: {}", args.config);
    let config = DemConfig::load(&args.config)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    let scenario = Scenario::load(&args.scenario)?;

    let readiness = Arc::new(ReadinessTracker::new(&config));
    let dem = Dem::with_readiness(config, readiness.clone())?;

    let steps = scenario::run(&dem, &scenario)?;
    if dem.runtime_violations() > 0 {
        tracing::warn!(
            violations = dem.runtime_violations(),
            "Runtime range checks failed during scenario"
        );
    }

    let report = Report::collect(&dem, &readiness)?;
    ctx.success(&format!(
        "Scenario '{}' completed: {} steps",
        scenario.name, steps
    ));
    ctx.print_report(&report);
    Ok(())
}
