use clap::Parser;

use crate::config::OracleConfig;

#[derive(Parser)]
#[command(name = "coherence-oracle")]
#[command(version = "0.3.0")]
#[command(about = "A self-evolving coherence oracle: sample, propose, sandbox, gate, persist, publish")]
pub struct Args {
    /// Run exactly one evolution cycle, print the outcome, and exit
    #[arg(long)]
    pub once: bool,

    /// Port for the trigger HTTP surface
    #[arg(long)]
    pub port: Option<u16>,

    /// Path to the SQLite evolution ledger
    #[arg(long)]
    pub ledger: Option<String>,

    /// Acceptance threshold for the fitness gate
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Sandbox execution timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Interpreter candidate programs are run with
    #[arg(long)]
    pub interpreter: Option<String>,
}

/// Fold CLI overrides into the environment-resolved configuration.
/// Flags win over environment variables; both win over defaults.
pub fn apply_overrides(mut config: OracleConfig, args: &Args) -> OracleConfig {
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(ref path) = args.ledger {
        config.ledger_path = path.clone();
    }
    if let Some(threshold) = args.threshold {
        config.accept_threshold = threshold;
    }
    if let Some(secs) = args.timeout_secs {
        config.sandbox_timeout = std::time::Duration::from_secs(secs.max(1));
    }
    if let Some(ref interpreter) = args.interpreter {
        config.interpreter = interpreter.clone();
    }
    config
}
