//! Candidate proposal generation: generative backend or static fallback.
//!
//! The variant is chosen once at process start from backend availability
//! and never re-probed mid-cycle. A generative call that fails or times
//! out degrades to the fallback for that cycle only — logged, never fatal.

use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::GenerativeConfig;
use crate::error::OracleError;
use crate::sampler::StateSnapshot;

/// Guidance statements prepended to every generative prompt.
pub const AXIOMS: &[&str] = &[
    "Coherence rises when local structure aligns with the ambient flux.",
    "Every improvement must be expressible as a short, runnable program.",
    "Prefer changes that leave the system observable over clever opacity.",
    "An unverifiable proposal is worth less than a small verified one.",
];

/// The axiom block as one prompt prefix, assembled once.
pub static AXIOM_GUIDANCE: Lazy<String> = Lazy::new(|| AXIOMS.join("\n"));

/// Proposal emitted when no backend is configured or a generative call
/// degrades. Trivial by intent: it runs, exits zero, and emits output.
pub const FALLBACK_PROPOSAL: &str = "def coherence_probe():\n    return \"coherent\"\n\nprint(coherence_probe())";

/// Per-request timeout for one generative call.
const GENERATE_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

/// Where a proposal's code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalOrigin {
    Generative,
    Fallback,
}

impl std::fmt::Display for ProposalOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProposalOrigin::Generative => write!(f, "generative"),
            ProposalOrigin::Fallback => write!(f, "fallback"),
        }
    }
}

/// A candidate program together with what produced it. Consumed exactly
/// once by the executor; persisted only as part of an evolution record.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub code: String,
    pub guidance: String,
    pub snapshot: StateSnapshot,
    pub origin: ProposalOrigin,
}

// ---------------------------------------------------------------------------
// Ollama wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

// ---------------------------------------------------------------------------
// OllamaBackend
// ---------------------------------------------------------------------------

/// Minimal client for an Ollama-compatible `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(config: &GenerativeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(GENERATE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    /// One non-streaming generate call.
    ///
    /// # Errors
    /// `OracleError::GenerativeBackend` on transport failure, non-2xx
    /// status, or an unparseable body.
    pub async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::GenerativeBackend(format!("{url}: {e}")))?;

        if !resp.status().is_success() {
            return Err(OracleError::GenerativeBackend(format!(
                "{url}: HTTP {}",
                resp.status().as_u16()
            )));
        }

        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| OracleError::GenerativeBackend(format!("{url}: bad body: {e}")))?;
        Ok(body.response)
    }
}

// ---------------------------------------------------------------------------
// ProposalSource
// ---------------------------------------------------------------------------

/// Capability-polymorphic proposal source, fixed at startup.
#[derive(Debug, Clone)]
pub enum ProposalSource {
    Generative(OllamaBackend),
    Fallback { code: String },
}

impl ProposalSource {
    /// Select the variant from backend availability. Absence of a backend
    /// is a normal configuration, not an error.
    pub fn from_config(generative: Option<&GenerativeConfig>) -> Self {
        match generative {
            Some(cfg) => {
                info!(url = %cfg.base_url, model = %cfg.model, "generative backend configured");
                ProposalSource::Generative(OllamaBackend::new(cfg))
            }
            None => {
                info!("no generative backend configured, using fallback proposals");
                ProposalSource::fallback()
            }
        }
    }

    /// The static fallback source.
    pub fn fallback() -> Self {
        ProposalSource::Fallback {
            code: FALLBACK_PROPOSAL.to_string(),
        }
    }

    /// Produce a candidate for this cycle. Infallible: a degraded
    /// generative call logs a warning and yields the fallback text.
    pub async fn propose(&self, guidance: &str, snapshot: &StateSnapshot) -> Proposal {
        match self {
            ProposalSource::Fallback { code } => Proposal {
                code: code.clone(),
                guidance: guidance.to_string(),
                snapshot: snapshot.clone(),
                origin: ProposalOrigin::Fallback,
            },
            ProposalSource::Generative(backend) => {
                let prompt = build_prompt(guidance, snapshot);
                match backend.generate(&prompt).await {
                    Ok(code) => Proposal {
                        code,
                        guidance: guidance.to_string(),
                        snapshot: snapshot.clone(),
                        origin: ProposalOrigin::Generative,
                    },
                    Err(e) => {
                        warn!(error = %e, "generative call degraded to fallback");
                        Proposal {
                            code: FALLBACK_PROPOSAL.to_string(),
                            guidance: guidance.to_string(),
                            snapshot: snapshot.clone(),
                            origin: ProposalOrigin::Fallback,
                        }
                    }
                }
            }
        }
    }

    pub fn is_generative(&self) -> bool {
        matches!(self, ProposalSource::Generative(_))
    }
}

fn build_prompt(guidance: &str, snapshot: &StateSnapshot) -> String {
    format!(
        "{guidance}\nState: {}\nPropose a Python improvement of at most 30 lines that raises coherence.",
        snapshot.to_json()
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
