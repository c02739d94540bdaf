use anyhow::{bail, Context, Result};
use clap::Parser;
use ledgrid_planner::config::PlannerConfig;
use ledgrid_planner::domain::NetworkInput;
use ledgrid_planner::routing::StrategyKind;
use ledgrid_planner::{telemetry, Planner};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Plan hubs, data directions and power circuits for an LED network
#[derive(Debug, Parser)]
#[command(name = "ledgrid-planner", version, about)]
struct Args {
    /// Network JSON: `{ "nodes": [...], "edges": [{ "start", "end", "category" }] }`
    #[arg(short, long, required_unless_present = "print_config")]
    input: Option<PathBuf>,

    /// TOML configuration, merged over the defaults
    #[arg(short, long, env = "LEDGRID_CONFIG")]
    config: Option<PathBuf>,

    /// Routing strategy override
    #[arg(short, long)]
    strategy: Option<StrategyKind>,

    /// Random seed override
    #[arg(long)]
    seed: Option<u64>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init_tracing(args.json_logs);

    let mut cfg = match &args.config {
        Some(path) => PlannerConfig::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PlannerConfig::load().context("loading configuration")?,
    };
    if let Some(strategy) = args.strategy {
        cfg.routing.strategy = strategy;
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }

    if args.print_config {
        print!("{}", toml::to_string_pretty(&cfg).context("serializing configuration")?);
        return Ok(());
    }

    let Some(path) = &args.input else {
        bail!("--input is required");
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading network from {}", path.display()))?;
    let input: NetworkInput = serde_json::from_str(&raw)
        .with_context(|| format!("parsing network JSON in {}", path.display()))?;

    info!(
        nodes = input.nodes.len(),
        edges = input.edges.len(),
        strategy = %cfg.routing.strategy,
        seed = cfg.seed,
        "planning network"
    );

    let report = Planner::new(cfg).plan(&input)?;
    if !report.coverage.is_complete() {
        warn!(
            uncovered = report.coverage.uncovered_edges,
            "hub set leaves edges uncovered"
        );
    }
    if !report.balance.satisfied {
        warn!(
            ports = report.port_violations.len(),
            rows = report.row_violations.len(),
            "port or current limits still violated"
        );
    }

    let json = serde_json::to_string_pretty(&report).context("serializing report")?;
    match &args.output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("writing report to {}", path.display()))?,
        None => println!("{json}"),
    }

    info!(
        circuits = report.summary.circuit_count,
        total_cable_length = report.summary.total_cable_length,
        strategy = %report.summary.strategy,
        "plan complete"
    );
    Ok(())
}
