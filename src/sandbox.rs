//! # Sandboxed candidate execution
//!
//! ## Responsibility
//! Runs one untrusted candidate program in a fresh, isolated context with a
//! hard wall-clock timeout, and reports what happened. Candidate code is
//! adversarial by construction: nothing it does — hanging, crashing,
//! flooding stdout — may affect the host process or leak across calls.
//!
//! Isolation per call:
//! - a unique temporary workspace, removed on every exit path (the
//!   [`tempfile::TempDir`] guard owns it, so cleanup is scoped acquisition,
//!   not best-effort);
//! - the child's environment is cleared except for a minimal `PATH` — no
//!   inherited credentials or secrets;
//! - stdin is closed; the workspace is the working directory;
//! - the child is spawned with kill-on-drop, so a timed-out run is
//!   forcibly terminated when its wait future is dropped.
//!
//! Network access is still that of the host user. Denying it outright
//! requires an OS sandbox (namespaces / seccomp) and is a hardening
//! requirement for deployments that run candidates from untrusted models.
//! TODO: grow a `bwrap`-based launcher so candidates run with no network
//! namespace when bubblewrap is present on the host.
//!
//! ## Completion protocol
//! A per-call unique sentinel line is appended to the candidate source.
//! Success requires a zero exit status *and* the sentinel in captured
//! stdout, distinguishing a completed run from silent truncation.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix of every sandbox workspace directory, used to audit for leaks.
pub const WORKSPACE_PREFIX: &str = "oracle-sandbox-";

/// Filename the candidate is materialized under inside the workspace.
const CANDIDATE_FILE: &str = "candidate.py";

/// `PATH` handed to the child after its environment is cleared.
const SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// What ended one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecDiagnostic {
    /// Zero exit status and the sentinel appeared before the deadline.
    Ok,
    /// The wall-clock timeout elapsed; the run was forcibly terminated.
    Timeout,
    /// The candidate itself exited non-zero or swallowed the sentinel.
    RuntimeError,
    /// The isolated context could not be created (workspace or spawn).
    SandboxSetupError,
}

impl std::fmt::Display for ExecDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecDiagnostic::Ok => write!(f, "ok"),
            ExecDiagnostic::Timeout => write!(f, "timeout"),
            ExecDiagnostic::RuntimeError => write!(f, "runtime_error"),
            ExecDiagnostic::SandboxSetupError => write!(f, "sandbox_setup_error"),
        }
    }
}

/// Immutable outcome of one sandboxed run.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub succeeded: bool,
    /// Captured stdout followed by stderr, truncated to the configured
    /// bound. Empty after a timeout — partial output is not trusted.
    pub combined_output: String,
    pub diagnostic: ExecDiagnostic,
}

impl ExecutionResult {
    fn failure(diagnostic: ExecDiagnostic, output: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            combined_output: output.into(),
            diagnostic,
        }
    }
}

// ---------------------------------------------------------------------------
// SandboxExecutor
// ---------------------------------------------------------------------------

/// Executes candidate programs. Stateless between calls; safe to share.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    interpreter: String,
    max_output_len: usize,
}

impl Default for SandboxExecutor {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl SandboxExecutor {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            max_output_len: 10_000,
        }
    }

    /// Override the captured-output bound (default 10 000 bytes).
    pub fn with_max_output_len(mut self, len: usize) -> Self {
        self.max_output_len = len;
        self
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    /// Run `code` in a fresh workspace with a hard `timeout`.
    ///
    /// Never returns an error and never panics: every failure mode —
    /// including the sandbox's own setup failing — is reported as an
    /// [`ExecutionResult`] diagnostic, because a candidate's fate is a
    /// normal cycle outcome, not an exceptional condition.
    ///
    /// Spawns at most one child process per call; the workspace is removed
    /// on every exit path when the `TempDir` guard drops.
    pub async fn execute(&self, code: &str, timeout: Duration) -> ExecutionResult {
        let workspace = match tempfile::Builder::new().prefix(WORKSPACE_PREFIX).tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "sandbox workspace allocation failed");
                return ExecutionResult::failure(
                    ExecDiagnostic::SandboxSetupError,
                    format!("workspace allocation failed: {e}"),
                );
            }
        };

        let sentinel = format!("ORACLE_RUN_COMPLETE_{}", Uuid::new_v4().simple());
        let source = harnessed_source(code, &sentinel);
        let candidate_path = workspace.path().join(CANDIDATE_FILE);
        if let Err(e) = tokio::fs::write(&candidate_path, source).await {
            warn!(error = %e, "candidate materialization failed");
            return ExecutionResult::failure(
                ExecDiagnostic::SandboxSetupError,
                format!("candidate write failed: {e}"),
            );
        }

        let child = Command::new(&self.interpreter)
            .arg(CANDIDATE_FILE)
            .current_dir(workspace.path())
            .env_clear()
            .env("PATH", SANDBOX_PATH)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(interpreter = %self.interpreter, error = %e, "candidate spawn failed");
                return ExecutionResult::failure(
                    ExecDiagnostic::SandboxSetupError,
                    format!("spawn of '{}' failed: {e}", self.interpreter),
                );
            }
        };

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            // Dropping the wait future kills the child (kill_on_drop).
            Err(_elapsed) => {
                debug!(timeout_ms = timeout.as_millis() as u64, "candidate timed out");
                return ExecutionResult::failure(ExecDiagnostic::Timeout, "");
            }
            Ok(Err(e)) => {
                warn!(error = %e, "candidate wait failed");
                return ExecutionResult::failure(
                    ExecDiagnostic::SandboxSetupError,
                    format!("wait failed: {e}"),
                );
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = truncate(&format!("{stdout}{stderr}"), self.max_output_len);

        let succeeded = output.status.success() && stdout.contains(&sentinel);
        let diagnostic = if succeeded {
            ExecDiagnostic::Ok
        } else {
            ExecDiagnostic::RuntimeError
        };
        debug!(
            exit = output.status.code().unwrap_or(-1),
            %diagnostic,
            "candidate finished"
        );

        ExecutionResult {
            succeeded,
            combined_output: combined,
            diagnostic,
        }
    }
}

/// Append the sentinel emission so completion is observable in stdout.
fn harnessed_source(code: &str, sentinel: &str) -> String {
    format!("{code}\nprint(\"{sentinel}\")\n")
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...[truncated]", &s[..end])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
