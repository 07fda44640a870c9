//! # Evolution controller
//!
//! ## Responsibility
//! Orchestrates one full cycle — sample → propose → execute → score →
//! gate → persist → publish — and enforces the one-cycle-at-a-time
//! contract. Candidate failures and evaluator failures translate into a
//! rejected outcome at this boundary; they never abort the process.
//!
//! State machine:
//! ```text
//! IDLE -> SAMPLING -> PROPOSING -> EXECUTING -> SCORING -> GATING
//!   GATING -> PERSISTING_ACCEPTED -> PUBLISHING -> DONE   (accepted)
//!   GATING -> PERSISTING_REJECTED -> DONE                 (rejected)
//! DONE -> IDLE
//! ```
//! No phase is skipped; the only branch is at the gate.
//!
//! ## Guarantees
//! - At most one cycle in flight process-wide: the controller core sits
//!   behind a single lock held for the full cycle. A trigger that arrives
//!   while the lock is held fails fast with `CycleBusy` — the caller may
//!   retry; nothing is queued or silently dropped.
//! - Persist-then-publish on acceptance: the ledger row is written first,
//!   and a publication failure leaves it standing with no handle.
//! - A ledger write failure still returns the cycle outcome, flagged
//!   `persisted = false`, so storage problems are distinguishable from
//!   ordinary rejection.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::fitness::{CoherenceInputs, FitnessEvaluator};
use crate::ledger::{EvolutionLedger, EvolutionRecord};
use crate::proposal::{ProposalSource, AXIOM_GUIDANCE};
use crate::publish::PullRequestClient;
use crate::sampler::{now_ms, StateSampler};
use crate::sandbox::SandboxExecutor;

// ---------------------------------------------------------------------------
// CyclePhase
// ---------------------------------------------------------------------------

/// Where the controller is within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Sampling,
    Proposing,
    Executing,
    Scoring,
    Gating,
    PersistingAccepted,
    Publishing,
    PersistingRejected,
    Done,
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CyclePhase::Idle => write!(f, "idle"),
            CyclePhase::Sampling => write!(f, "sampling"),
            CyclePhase::Proposing => write!(f, "proposing"),
            CyclePhase::Executing => write!(f, "executing"),
            CyclePhase::Scoring => write!(f, "scoring"),
            CyclePhase::Gating => write!(f, "gating"),
            CyclePhase::PersistingAccepted => write!(f, "persisting_accepted"),
            CyclePhase::Publishing => write!(f, "publishing"),
            CyclePhase::PersistingRejected => write!(f, "persisting_rejected"),
            CyclePhase::Done => write!(f, "done"),
        }
    }
}

/// The gate: accept iff the candidate ran to completion and the score
/// clears the threshold. Boundary inclusive.
pub fn gate(succeeded: bool, fitness: f64, threshold: f64) -> bool {
    succeeded && fitness >= threshold
}

// ---------------------------------------------------------------------------
// CycleOutcome
// ---------------------------------------------------------------------------

/// Structured result of one cycle, returned to the trigger surface.
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    /// The candidate program text that was evaluated.
    pub proposal: String,
    /// The fitness score the gate saw.
    pub fitness: f64,
    /// Gate decision.
    pub accepted: bool,
    /// Review handle; absent when rejected, publication failed, or no
    /// publication collaborator is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request_url: Option<String>,
    /// False when the ledger append failed — an operator signal, distinct
    /// from rejection.
    pub persisted: bool,
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// Mutable state owned by the in-flight cycle; guarded by the cycle lock.
struct CycleCore {
    sampler: StateSampler,
    phase: CyclePhase,
}

impl CycleCore {
    fn advance(&mut self, to: CyclePhase) {
        debug!(from = %self.phase, to = %to, "cycle transition");
        self.phase = to;
    }
}

/// The evolution controller. Construct once at startup; share via `Arc`.
pub struct Oracle {
    config: OracleConfig,
    evaluator: FitnessEvaluator,
    executor: SandboxExecutor,
    source: ProposalSource,
    publisher: Option<PullRequestClient>,
    ledger: Arc<EvolutionLedger>,
    core: tokio::sync::Mutex<CycleCore>,
}

impl Oracle {
    /// Wire the controller from resolved configuration.
    pub fn new(config: OracleConfig, ledger: Arc<EvolutionLedger>) -> Self {
        let source = ProposalSource::from_config(config.generative.as_ref());
        let publisher = config.publish.as_ref().map(PullRequestClient::new);
        let executor = SandboxExecutor::new(&config.interpreter);
        Self::with_parts(config, ledger, source, executor, publisher)
    }

    /// Construct from explicit parts. Lets tests pin the proposal source,
    /// interpreter, or collaborator endpoints.
    pub fn with_parts(
        config: OracleConfig,
        ledger: Arc<EvolutionLedger>,
        source: ProposalSource,
        executor: SandboxExecutor,
        publisher: Option<PullRequestClient>,
    ) -> Self {
        let sampler = StateSampler::new(config.history_window);
        Self {
            config,
            evaluator: FitnessEvaluator::new(),
            executor,
            source,
            publisher,
            ledger,
            core: tokio::sync::Mutex::new(CycleCore {
                sampler,
                phase: CyclePhase::Idle,
            }),
        }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// True while a cycle holds the lock.
    pub fn busy(&self) -> bool {
        self.core.try_lock().is_err()
    }

    /// The `n` most recent ledger records, most-recent-first.
    pub fn recent(&self, n: usize) -> Result<Vec<EvolutionRecord>, OracleError> {
        self.ledger.list_recent(n)
    }

    /// Run exactly one evolution cycle to completion.
    ///
    /// # Errors
    /// - `OracleError::CycleBusy` when another cycle is in flight (fail-fast
    ///   trigger policy; callers retry at their own cadence).
    ///
    /// All other failures are encoded in the returned [`CycleOutcome`]:
    /// candidate and evaluator failures as `accepted = false`, ledger
    /// failures as `persisted = false`, publication failures as an absent
    /// handle.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, OracleError> {
        let mut core = self.core.try_lock().map_err(|_| OracleError::CycleBusy)?;

        core.advance(CyclePhase::Sampling);
        let snapshot = core.sampler.sample();

        core.advance(CyclePhase::Proposing);
        let proposal = self.source.propose(&AXIOM_GUIDANCE, &snapshot).await;

        core.advance(CyclePhase::Executing);
        let execution = self
            .executor
            .execute(&proposal.code, self.config.sandbox_timeout)
            .await;

        core.advance(CyclePhase::Scoring);
        let (fitness, evaluator_ok) = match self.evaluator.score(&CoherenceInputs::default()) {
            Ok(score) => (score, true),
            Err(e) => {
                warn!(error = %e, "evaluator failed, cycle will be rejected");
                (0.0, false)
            }
        };

        core.advance(CyclePhase::Gating);
        let accepted =
            evaluator_ok && gate(execution.succeeded, fitness, self.config.accept_threshold);
        info!(
            accepted,
            fitness,
            diagnostic = %execution.diagnostic,
            origin = %proposal.origin,
            "gate decision"
        );

        core.advance(if accepted {
            CyclePhase::PersistingAccepted
        } else {
            CyclePhase::PersistingRejected
        });
        let record = EvolutionRecord::new(
            now_ms(),
            proposal.snapshot.to_json(),
            fitness,
            proposal.code.clone(),
            accepted,
        );
        let persisted = match self.ledger.append(&record) {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "ledger append failed, cycle outcome unpersisted");
                false
            }
        };

        // Publish only what the ledger actually holds.
        let mut pull_request_url = None;
        if accepted && persisted {
            if let Some(publisher) = &self.publisher {
                core.advance(CyclePhase::Publishing);
                let (head, base) = self
                    .config
                    .publish
                    .as_ref()
                    .map(|p| (p.source_branch.as_str(), p.target_branch.as_str()))
                    .unwrap_or(("oracle-branch", "main"));
                let title = format!("Oracle proposal (coherence {fitness:.2})");
                match publisher.submit(&title, &proposal.code, head, base).await {
                    Ok(url) => {
                        info!(url = %url, "proposal published for review");
                        pull_request_url = Some(url);
                    }
                    Err(e) => {
                        warn!(error = %e, "publication failed, accepted record stands");
                    }
                }
            }
        }

        core.advance(CyclePhase::Done);
        core.advance(CyclePhase::Idle);

        Ok(CycleOutcome {
            proposal: proposal.code,
            fitness,
            accepted,
            pull_request_url,
            persisted,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // -------------------------------------------------------------------
    // Gate
    // -------------------------------------------------------------------

    #[rstest]
    #[case(true, 1.0, 1.0, true)] // boundary inclusive
    #[case(true, 0.999, 1.0, false)]
    #[case(true, 1.5, 1.0, true)]
    #[case(false, 5.0, 1.0, false)] // execution failure dominates
    #[case(true, 0.0, 0.0, true)]
    fn test_gate_decision(
        #[case] succeeded: bool,
        #[case] fitness: f64,
        #[case] threshold: f64,
        #[case] expected: bool,
    ) {
        assert_eq!(gate(succeeded, fitness, threshold), expected);
    }

    #[test]
    fn test_gate_monotone_across_threshold() {
        // Walking the score up to the threshold flips rejection to
        // acceptance exactly at the boundary, never before.
        let threshold = 1.0;
        let mut previous = gate(true, 0.0, threshold);
        for step in 1..=10 {
            let fitness = step as f64 * 0.1;
            let now = gate(true, fitness, threshold);
            assert!(previous <= now, "gate regressed at fitness {fitness}");
            previous = now;
        }
        assert!(previous, "gate must accept at the threshold");
    }

    // -------------------------------------------------------------------
    // CyclePhase
    // -------------------------------------------------------------------

    #[test]
    fn test_phase_display_names() {
        assert_eq!(CyclePhase::Idle.to_string(), "idle");
        assert_eq!(CyclePhase::Gating.to_string(), "gating");
        assert_eq!(
            CyclePhase::PersistingAccepted.to_string(),
            "persisting_accepted"
        );
        assert_eq!(
            CyclePhase::PersistingRejected.to_string(),
            "persisting_rejected"
        );
    }

    // -------------------------------------------------------------------
    // CycleOutcome serialization
    // -------------------------------------------------------------------

    #[test]
    fn test_outcome_serializes_without_absent_url() {
        let outcome = CycleOutcome {
            proposal: "print(1)".to_string(),
            fitness: 0.4,
            accepted: false,
            pull_request_url: None,
            persisted: true,
        };
        let json = serde_json::to_string(&outcome).expect("serialize");
        assert!(!json.contains("pull_request_url"));
        assert!(json.contains("\"accepted\":false"));
        assert!(json.contains("\"persisted\":true"));
    }

    #[test]
    fn test_outcome_serializes_with_url() {
        let outcome = CycleOutcome {
            proposal: "print(1)".to_string(),
            fitness: 1.4,
            accepted: true,
            pull_request_url: Some("https://github.com/o/r/pull/3".to_string()),
            persisted: true,
        };
        let json = serde_json::to_string(&outcome).expect("serialize");
        assert!(json.contains("pull/3"));
    }
}
