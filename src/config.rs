//! Runtime configuration, resolved once at startup from the environment.
//!
//! No module reads the environment after startup; the resolved config is
//! injected into the controller, ledger, and backends it concerns.

use std::env;
use std::time::Duration;

use crate::error::OracleError;

/// Default acceptance threshold for the fitness gate (inclusive).
pub const DEFAULT_ACCEPT_THRESHOLD: f64 = 1.0;
/// Default hard wall-clock timeout for one sandboxed execution.
pub const DEFAULT_SANDBOX_TIMEOUT_SECS: u64 = 6;
/// Default bound on the sensed-state history ring, newest entry included.
pub const DEFAULT_HISTORY_WINDOW: usize = 8;
/// Default ledger file, created on first open.
pub const DEFAULT_LEDGER_PATH: &str = "evolutions.db";
/// Default interpreter used to run candidate programs.
pub const DEFAULT_INTERPRETER: &str = "python3";
/// Default port for the trigger HTTP surface.
pub const DEFAULT_PORT: u16 = 8080;

/// Publication target: repository and credentials for the review system.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// "owner/name" repository slug.
    pub repo: String,
    /// API token with pull-request scope.
    pub token: String,
    /// Branch candidate code is proposed from.
    pub source_branch: String,
    /// Branch the proposal targets.
    pub target_branch: String,
    /// API root, overridable for tests against a local stub.
    pub api_base: String,
}

/// Generative backend endpoint. Absence is not an error — the proposal
/// source falls back to its static program.
#[derive(Debug, Clone)]
pub struct GenerativeConfig {
    /// Base URL of an Ollama-compatible server, e.g. `http://127.0.0.1:11434`.
    pub base_url: String,
    /// Model name passed on each generate call.
    pub model: String,
}

/// The complete resolved configuration.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Accept iff execution succeeded and fitness >= this value.
    pub accept_threshold: f64,
    /// Hard wall-clock limit for one sandboxed run.
    pub sandbox_timeout: Duration,
    /// Sensed-state history bound, newest entry included.
    pub history_window: usize,
    /// SQLite file backing the evolution ledger.
    pub ledger_path: String,
    /// Interpreter the sandbox hands candidate programs to.
    pub interpreter: String,
    /// Trigger surface port.
    pub port: u16,
    /// Publication collaborator; `None` disables publication.
    pub publish: Option<PublishConfig>,
    /// Generative backend; `None` selects the fallback proposal source.
    pub generative: Option<GenerativeConfig>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            accept_threshold: DEFAULT_ACCEPT_THRESHOLD,
            sandbox_timeout: Duration::from_secs(DEFAULT_SANDBOX_TIMEOUT_SECS),
            history_window: DEFAULT_HISTORY_WINDOW,
            ledger_path: DEFAULT_LEDGER_PATH.to_string(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
            port: DEFAULT_PORT,
            publish: None,
            generative: None,
        }
    }
}

impl OracleConfig {
    /// Resolve the configuration from environment variables, falling back to
    /// documented defaults.
    ///
    /// Recognized variables:
    /// - `ORACLE_ACCEPT_THRESHOLD` — gate threshold (f64, default 1.0)
    /// - `ORACLE_SANDBOX_TIMEOUT_SECS` — execution timeout (u64 seconds, default 6)
    /// - `ORACLE_HISTORY_WINDOW` — state history bound (usize, default 8)
    /// - `ORACLE_LEDGER_PATH` — SQLite file (default `evolutions.db`)
    /// - `ORACLE_INTERPRETER` — candidate interpreter (default `python3`)
    /// - `ORACLE_PORT` — trigger surface port (default 8080)
    /// - `GITHUB_TOKEN` + `ORACLE_REPO` — both present enables publication;
    ///   `ORACLE_SOURCE_BRANCH` (default `oracle-branch`),
    ///   `ORACLE_TARGET_BRANCH` (default `main`),
    ///   `ORACLE_GITHUB_API` (default `https://api.github.com`)
    /// - `OLLAMA_URL` enables the generative backend;
    ///   `OLLAMA_MODEL` (default `llama3`)
    ///
    /// # Errors
    /// Returns `OracleError::Config` when a variable is present but
    /// unparseable — a silently ignored typo in a threshold would change
    /// gating behavior.
    pub fn from_env() -> Result<Self, OracleError> {
        let mut cfg = OracleConfig::default();

        if let Ok(raw) = env::var("ORACLE_ACCEPT_THRESHOLD") {
            cfg.accept_threshold = raw
                .parse::<f64>()
                .map_err(|e| OracleError::Config(format!("ORACLE_ACCEPT_THRESHOLD: {e}")))?;
        }
        if let Ok(raw) = env::var("ORACLE_SANDBOX_TIMEOUT_SECS") {
            let secs = raw
                .parse::<u64>()
                .map_err(|e| OracleError::Config(format!("ORACLE_SANDBOX_TIMEOUT_SECS: {e}")))?;
            if secs == 0 {
                return Err(OracleError::Config(
                    "ORACLE_SANDBOX_TIMEOUT_SECS must be positive".to_string(),
                ));
            }
            cfg.sandbox_timeout = Duration::from_secs(secs);
        }
        if let Ok(raw) = env::var("ORACLE_HISTORY_WINDOW") {
            let window = raw
                .parse::<usize>()
                .map_err(|e| OracleError::Config(format!("ORACLE_HISTORY_WINDOW: {e}")))?;
            if window == 0 {
                return Err(OracleError::Config(
                    "ORACLE_HISTORY_WINDOW must be at least 1".to_string(),
                ));
            }
            cfg.history_window = window;
        }
        if let Ok(path) = env::var("ORACLE_LEDGER_PATH") {
            cfg.ledger_path = path;
        }
        if let Ok(interp) = env::var("ORACLE_INTERPRETER") {
            cfg.interpreter = interp;
        }
        if let Ok(raw) = env::var("ORACLE_PORT") {
            cfg.port = raw
                .parse::<u16>()
                .map_err(|e| OracleError::Config(format!("ORACLE_PORT: {e}")))?;
        }

        cfg.publish = match (env::var("GITHUB_TOKEN"), env::var("ORACLE_REPO")) {
            (Ok(token), Ok(repo)) if !token.is_empty() && !repo.is_empty() => {
                Some(PublishConfig {
                    repo,
                    token,
                    source_branch: env::var("ORACLE_SOURCE_BRANCH")
                        .unwrap_or_else(|_| "oracle-branch".to_string()),
                    target_branch: env::var("ORACLE_TARGET_BRANCH")
                        .unwrap_or_else(|_| "main".to_string()),
                    api_base: env::var("ORACLE_GITHUB_API")
                        .unwrap_or_else(|_| "https://api.github.com".to_string()),
                })
            }
            _ => None,
        };

        cfg.generative = env::var("OLLAMA_URL").ok().filter(|u| !u.is_empty()).map(|base_url| {
            GenerativeConfig {
                base_url,
                model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3".to_string()),
            }
        });

        Ok(cfg)
    }
}
