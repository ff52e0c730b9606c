use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use microgrid_ems::config::AppConfig;
use microgrid_ems::domain::Tables;
use microgrid_ems::simulation::SimulationDriver;
use microgrid_ems::telemetry;

/// Hierarchical model-predictive energy controller for a community microgrid
#[derive(Debug, Parser)]
#[command(name = "microgrid-ems", version, about)]
struct Args {
    /// Number of half-hour simulation steps to run
    #[arg(long)]
    steps: Option<u64>,

    /// Configuration file overriding config/default.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to write the results document
    #[arg(long)]
    output: Option<PathBuf>,

    /// Where to write the rendered chart
    #[arg(long)]
    chart: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let args = Args::parse();

    let cfg = AppConfig::load(args.config.as_deref())?;

    let tables = match &cfg.tables.path {
        Some(path) => Tables::load(path)
            .with_context(|| format!("loading tables from {}", path.display()))?,
        None => Tables::builtin(),
    };
    let tables = Arc::new(tables);

    let steps = args.steps.unwrap_or(cfg.simulation.steps);
    let mut driver = SimulationDriver::from_config(&cfg, Arc::clone(&tables));
    let trace = driver.run(steps).await;

    let results_path = args.output.unwrap_or_else(|| cfg.output.results_path.clone());
    trace.write_json(&results_path)?;
    info!(path = %results_path.display(), "results written");

    let chart_path = args.chart.unwrap_or_else(|| cfg.output.chart_path.clone());
    trace.render_chart(
        &chart_path,
        cfg.community.transformer_limit_kw,
        &tables.price_grid_elec,
    )?;
    info!(path = %chart_path.display(), "chart rendered");

    Ok(())
}
