//! Accord Simulator
//!
//! Runs an in-process network of parties and a notary, for trying out
//! issuance from the command line.

use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod network;
mod scenario;

use accord_party::PartyConfig;
use controller::SimulationController;
use scenario::{PartySpec, Scenario};

/// Accord Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Accord in-process issuance simulator")]
struct Args {
    /// Number of simulated parties (PARTY_A, PARTY_B, ...)
    #[arg(short, long, default_value = "3")]
    parties: usize,

    /// Scenario to run
    #[arg(short, long, conflicts_with = "to")]
    scenario: Option<String>,

    /// List scenarios as JSON and exit
    #[arg(long)]
    list: bool,

    /// Issuing party for a single issuance
    #[arg(long, default_value = "PARTY_A")]
    from: String,

    /// Recipient for a single issuance
    #[arg(long)]
    to: Option<String>,

    /// Value for a single issuance
    #[arg(long, default_value = "10")]
    value: i64,

    /// Random issuances to run when no scenario or recipient is given
    #[arg(long, default_value = "10")]
    issuances: usize,

    /// Upper bound for random values
    #[arg(long, default_value = "1000")]
    max_value: i64,

    /// Counterparty response timeout in milliseconds
    #[arg(long)]
    response_timeout_ms: Option<u64>,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

fn party_names(count: usize) -> Vec<PartySpec> {
    (0..count.min(26))
        .map(|i| PartySpec::new(format!("PARTY_{}", (b'A' + i as u8) as char)))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    if args.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if args.list {
        let scenarios = Scenario::NAMES
            .into_iter()
            .map(Scenario::load)
            .collect::<anyhow::Result<Vec<_>>>()?;
        println!("{}", serde_json::to_string_pretty(&scenarios)?);
        return Ok(());
    }

    let mut template = PartyConfig::from_env();
    if let Some(ms) = args.response_timeout_ms {
        template.response_timeout = Duration::from_millis(ms);
    }

    info!("Starting Accord Simulator");

    let scenario = args.scenario.as_deref().map(Scenario::load).transpose()?;
    let parties = match &scenario {
        Some(scenario) => scenario.parties.clone(),
        None => party_names(args.parties),
    };

    let controller = SimulationController::new(&parties, &template, args.seed).await?;

    if let Some(scenario) = &scenario {
        controller.run_scenario(scenario).await?;
        info!("Scenario {} passed", scenario.name);
    } else if let Some(to) = &args.to {
        match controller.issue(&args.from, to, args.value).await? {
            Ok(finalized) => println!("{}", finalized.id()),
            Err(e) => {
                eprintln!("{}: {}", e.error_code(), e);
                controller.stop();
                std::process::exit(1);
            }
        }
    } else {
        controller.run_random(args.issuances, args.max_value).await?;
    }

    controller.report_positions().await?;
    controller.stop();

    let metrics = controller.metrics().await;
    info!("Simulation complete");
    info!("Total issuances: {}", metrics.total_issuances);
    info!("Finalized: {}", metrics.finalized);
    info!("Failed: {} {:?}", metrics.failed, metrics.failures_by_code);
    info!("Success rate: {:.1}%", metrics.success_rate() * 100.0);
    info!(
        "Latency: avg {}ms, p99 {}ms",
        metrics.average_latency_ms(),
        metrics.p99_latency_ms()
    );

    Ok(())
}
