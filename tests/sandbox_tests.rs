//! External tests for the sandboxed executor — timeout enforcement,
//! diagnostics, and workspace cleanup across every exit path.
//!
//! The deterministic tests use POSIX tools as interpreters: `cat` echoes
//! the harnessed source (sentinel included) and exits zero, so a candidate
//! "succeeds" without any real interpreter; `sh` and `false` drive the
//! failure paths. Tests that exercise real candidate programs are guarded
//! on `python3` being present and skip quietly otherwise.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use coherence_oracle::sandbox::{ExecDiagnostic, SandboxExecutor, WORKSPACE_PREFIX};

// Workspace-count assertions require that no other test in this binary is
// mid-execution, so every test serializes on this lock.
static SANDBOX_LOCK: Mutex<()> = Mutex::new(());

fn guard() -> std::sync::MutexGuard<'static, ()> {
    SANDBOX_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .is_ok()
}

fn count_workspaces() -> usize {
    std::fs::read_dir(std::env::temp_dir())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| {
                    e.file_name()
                        .to_string_lossy()
                        .starts_with(WORKSPACE_PREFIX)
                })
                .count()
        })
        .unwrap_or(0)
}

// -- Deterministic paths ---------------------------------------------------

#[tokio::test]
async fn test_echoing_interpreter_succeeds_with_sentinel() {
    let _guard = guard();
    let executor = SandboxExecutor::new("cat");
    let result = executor.execute("any text at all", Duration::from_secs(2)).await;
    assert!(result.succeeded);
    assert_eq!(result.diagnostic, ExecDiagnostic::Ok);
    assert!(result.combined_output.contains("any text at all"));
}

#[tokio::test]
async fn test_zero_exit_without_sentinel_is_runtime_error() {
    let _guard = guard();
    // `true` exits zero but emits nothing: completion cannot be confirmed.
    let executor = SandboxExecutor::new("true");
    let result = executor.execute("ignored", Duration::from_secs(2)).await;
    assert!(!result.succeeded);
    assert_eq!(result.diagnostic, ExecDiagnostic::RuntimeError);
}

#[tokio::test]
async fn test_nonzero_exit_is_runtime_error() {
    let _guard = guard();
    let executor = SandboxExecutor::new("sh");
    let result = executor.execute("exit 3", Duration::from_secs(2)).await;
    assert!(!result.succeeded);
    assert_eq!(result.diagnostic, ExecDiagnostic::RuntimeError);
}

#[tokio::test]
async fn test_hanging_candidate_times_out_within_bound() {
    let _guard = guard();
    let executor = SandboxExecutor::new("sh");
    let timeout = Duration::from_millis(500);
    let start = Instant::now();
    let result = executor.execute("sleep 30", timeout).await;
    let elapsed = start.elapsed();

    assert!(!result.succeeded);
    assert_eq!(result.diagnostic, ExecDiagnostic::Timeout);
    assert!(
        elapsed < timeout + Duration::from_secs(2),
        "timeout enforcement took {elapsed:?}"
    );
    // Partial output is not trusted after a kill.
    assert!(result.combined_output.is_empty());
}

#[tokio::test]
async fn test_missing_interpreter_is_setup_error() {
    let _guard = guard();
    let executor = SandboxExecutor::new("no-such-interpreter-exists");
    let result = executor.execute("print(1)", Duration::from_secs(2)).await;
    assert_eq!(result.diagnostic, ExecDiagnostic::SandboxSetupError);
    assert!(!result.succeeded);
}

#[tokio::test]
async fn test_repeated_executions_leave_no_workspaces() {
    let _guard = guard();
    let before = count_workspaces();
    let sh = SandboxExecutor::new("sh");
    let cat = SandboxExecutor::new("cat");
    let missing = SandboxExecutor::new("no-such-interpreter-exists");

    // Success, runtime failure, timeout, setup failure — all must clean up.
    cat.execute("ok", Duration::from_secs(2)).await;
    sh.execute("exit 1", Duration::from_secs(2)).await;
    sh.execute("sleep 30", Duration::from_millis(300)).await;
    missing.execute("x", Duration::from_secs(2)).await;

    // The timed-out child is killed on drop; give reaping a moment.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(count_workspaces(), before, "residual sandbox workspaces");
}

#[tokio::test]
async fn test_output_truncated_at_configured_bound() {
    let _guard = guard();
    let executor = SandboxExecutor::new("sh").with_max_output_len(64);
    let result = executor
        .execute("yes coherence | head -n 1000; exit 1", Duration::from_secs(5))
        .await;
    assert!(result.combined_output.len() < 64 + 32);
    assert!(result.combined_output.ends_with("...[truncated]"));
}

// -- Real interpreter paths (skipped when python3 is absent) ---------------

#[tokio::test]
async fn test_python_candidate_runs_to_completion() {
    let _guard = guard();
    if !python3_available() {
        eprintln!("skipping: python3 not on PATH");
        return;
    }
    let executor = SandboxExecutor::new("python3");
    let result = executor
        .execute("print(\"hello from candidate\")", Duration::from_secs(5))
        .await;
    assert!(result.succeeded, "output: {}", result.combined_output);
    assert_eq!(result.diagnostic, ExecDiagnostic::Ok);
    assert!(result.combined_output.contains("hello from candidate"));
}

#[tokio::test]
async fn test_python_exception_is_runtime_error_with_traceback() {
    let _guard = guard();
    if !python3_available() {
        eprintln!("skipping: python3 not on PATH");
        return;
    }
    let executor = SandboxExecutor::new("python3");
    let result = executor
        .execute("raise RuntimeError(\"candidate misbehaved\")", Duration::from_secs(5))
        .await;
    assert!(!result.succeeded);
    assert_eq!(result.diagnostic, ExecDiagnostic::RuntimeError);
    assert!(result.combined_output.contains("candidate misbehaved"));
}

#[tokio::test]
async fn test_python_sleep_hits_timeout() {
    let _guard = guard();
    if !python3_available() {
        eprintln!("skipping: python3 not on PATH");
        return;
    }
    let executor = SandboxExecutor::new("python3");
    let result = executor
        .execute("import time\ntime.sleep(30)", Duration::from_millis(800))
        .await;
    assert_eq!(result.diagnostic, ExecDiagnostic::Timeout);
}

#[tokio::test]
async fn test_python_environment_is_cleared() {
    let _guard = guard();
    if !python3_available() {
        eprintln!("skipping: python3 not on PATH");
        return;
    }
    std::env::set_var("ORACLE_TEST_SECRET", "leak-me");
    let executor = SandboxExecutor::new("python3");
    let result = executor
        .execute(
            "import os\nprint(sorted(k for k in os.environ if k == \"ORACLE_TEST_SECRET\"))",
            Duration::from_secs(5),
        )
        .await;
    assert!(result.succeeded);
    assert!(
        result.combined_output.contains("[]"),
        "secret leaked into sandbox: {}",
        result.combined_output
    );
}
