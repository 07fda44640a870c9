use std::sync::Arc;

use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use coherence_oracle::cli::{apply_overrides, Args};
use coherence_oracle::config::OracleConfig;
use coherence_oracle::ledger::EvolutionLedger;
use coherence_oracle::oracle::{CycleOutcome, Oracle};
use coherence_oracle::web;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = apply_overrides(OracleConfig::from_env()?, &args);

    // The ledger is the one unrecoverable dependency: refuse to start
    // without durable storage rather than run an unrecorded oracle.
    let ledger = Arc::new(EvolutionLedger::open(&config.ledger_path)?);

    let port = config.port;
    let oracle = Arc::new(Oracle::new(config, ledger));

    if args.once {
        let outcome = oracle.run_cycle().await?;
        print_outcome(&outcome);
        return Ok(());
    }

    web::serve(port, oracle).await
}

fn print_outcome(outcome: &CycleOutcome) {
    let verdict = if outcome.accepted {
        "ACCEPTED".bright_green()
    } else {
        "REJECTED".bright_red()
    };
    eprintln!(
        "  {} coherence {:.3}{}",
        verdict,
        outcome.fitness,
        if outcome.persisted { "" } else { "  (unpersisted!)" }
    );
    if let Some(ref url) = outcome.pull_request_url {
        eprintln!("  review at {}", url.bright_cyan());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(outcome).unwrap_or_else(|_| "{}".to_string())
    );
}
