//! A self-evolving "oracle" control loop: sample a small state vector,
//! ask a generation capability for a candidate patch, execute it in strict
//! isolation, score it, gate it against a threshold, persist the outcome,
//! and hand accepted proposals to an external review system.
//!
//! Module map, leaf-first:
//! - [`sampler`] — sensed-state snapshots and the bounded history ring
//! - [`fitness`] — the coherence scoring function with its observer term
//! - [`sandbox`] — isolated execution of untrusted candidate programs
//! - [`proposal`] — generative backend / fallback proposal source
//! - [`ledger`] — durable append-only record of every cycle
//! - [`publish`] — pull-request hand-off to the review collaborator
//! - [`oracle`] — the cycle state machine tying the above together
//! - [`web`] — thin HTTP trigger surface
//! - [`config`], [`cli`], [`error`] — ambient wiring

pub mod cli;
pub mod config;
pub mod error;
pub mod fitness;
pub mod ledger;
pub mod oracle;
pub mod proposal;
pub mod publish;
pub mod sampler;
pub mod sandbox;
pub mod web;

pub use config::OracleConfig;
pub use error::OracleError;
pub use ledger::{EvolutionLedger, EvolutionRecord};
pub use oracle::{CycleOutcome, Oracle};
pub use sandbox::{ExecDiagnostic, ExecutionResult, SandboxExecutor};
