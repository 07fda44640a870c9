//! Trigger HTTP surface: thin request/response wrapper over the controller.
//!
//! ## Routes
//! - `POST /oracle/evolve` — run one cycle; 200 with the structured
//!   outcome, 409 while a cycle is in flight (fail-fast busy policy)
//! - `GET /oracle/history?n=N` — most recent ledger records
//! - `GET /health` — liveness probe
//!
//! No business logic lives here; errors from the controller are encoded
//! as JSON bodies with a matching status code, never as a crash.

use std::collections::HashMap;
use std::sync::Arc;

use colored::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::warn;

use crate::oracle::Oracle;

/// Default number of records returned by the history route.
const DEFAULT_HISTORY_N: usize = 20;
/// Cap on `?n=` so a stray query cannot dump the whole ledger.
const MAX_HISTORY_N: usize = 500;

/// Percent-decode a query value.
fn url_decode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                let hex: String = chars.by_ref().take(2).collect();
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    result.push(byte as char);
                } else {
                    result.push('%');
                    result.push_str(&hex);
                }
            }
            '+' => result.push(' '),
            _ => result.push(c),
        }
    }
    result
}

/// Parse a query string into key-value pairs.
fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let val = parts.next().unwrap_or("");
            Some((key.to_string(), url_decode(val)))
        })
        .collect()
}

/// Start the trigger server; runs until the process exits.
pub async fn serve(port: u16, oracle: Arc<Oracle>) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;

    eprintln!(
        "{}",
        format!("  Oracle trigger surface at http://localhost:{port}").bright_green()
    );
    eprintln!("{}", "  POST /oracle/evolve to run one cycle.".bright_blue());

    loop {
        let (stream, _addr) = listener.accept().await?;
        let oracle = Arc::clone(&oracle);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, oracle).await {
                warn!(error = %e, "connection error");
            }
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    oracle: Arc<Oracle>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);

    // Parse the request line: "POST /path?query HTTP/1.1"
    let first_line = request.lines().next().unwrap_or("");
    let mut parts = first_line.split_whitespace();
    let (Some(method), Some(path_and_query)) = (parts.next(), parts.next()) else {
        return Ok(());
    };

    let (path, query_str) = match path_and_query.find('?') {
        Some(idx) => (&path_and_query[..idx], &path_and_query[idx + 1..]),
        None => (path_and_query, ""),
    };

    let (status, body) = route(method, path, query_str, &oracle).await;
    respond_json(&mut stream, status, &body).await
}

/// Dispatch one request to a `(status line, JSON body)` pair.
async fn route(
    method: &str,
    path: &str,
    query_str: &str,
    oracle: &Oracle,
) -> (&'static str, String) {
    match (method, path) {
        ("POST", "/oracle/evolve") => match oracle.run_cycle().await {
            Ok(outcome) => {
                let body = serde_json::to_string(&outcome)
                    .unwrap_or_else(|e| format!(r#"{{"error":"serialization: {e}"}}"#));
                ("200 OK", body)
            }
            Err(e) if e.is_busy() => ("409 Conflict", format!(r#"{{"error":"{e}"}}"#)),
            Err(e) => ("500 Internal Server Error", format!(r#"{{"error":"{e}"}}"#)),
        },
        ("GET", "/oracle/history") => {
            let params = parse_query(query_str);
            let n = params
                .get("n")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(DEFAULT_HISTORY_N)
                .min(MAX_HISTORY_N);
            match oracle.recent(n) {
                Ok(records) => {
                    let body = serde_json::to_string(&records)
                        .unwrap_or_else(|e| format!(r#"{{"error":"serialization: {e}"}}"#));
                    ("200 OK", body)
                }
                Err(e) => ("500 Internal Server Error", format!(r#"{{"error":"{e}"}}"#)),
            }
        }
        ("GET", "/health") => {
            let body = if oracle.busy() {
                r#"{"status":"ok","cycle":"in_flight"}"#
            } else {
                r#"{"status":"ok","cycle":"idle"}"#
            };
            ("200 OK", body.to_string())
        }
        _ => ("404 Not Found", r#"{"error":"no such route"}"#.to_string()),
    }
}

async fn respond_json(
    stream: &mut TcpStream,
    status: &str,
    body: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len(),
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OracleConfig;
    use crate::ledger::EvolutionLedger;
    use crate::proposal::ProposalSource;
    use crate::sandbox::SandboxExecutor;

    fn test_oracle() -> Arc<Oracle> {
        let ledger = Arc::new(EvolutionLedger::open_in_memory().expect("ledger"));
        Arc::new(Oracle::with_parts(
            OracleConfig::default(),
            ledger,
            ProposalSource::fallback(),
            // `cat` echoes the harnessed source (sentinel included) and
            // exits zero, so every candidate "succeeds" deterministically.
            SandboxExecutor::new("cat"),
            None,
        ))
    }

    #[test]
    fn test_url_decode_percent_sequences() {
        assert_eq!(url_decode("a%20b"), "a b");
        assert_eq!(url_decode("a+b"), "a b");
        assert_eq!(url_decode("plain"), "plain");
    }

    #[test]
    fn test_url_decode_invalid_hex_kept_literal() {
        assert_eq!(url_decode("a%zzb"), "a%zzb");
    }

    #[test]
    fn test_parse_query_pairs() {
        let params = parse_query("n=5&verbose=1");
        assert_eq!(params.get("n").map(String::as_str), Some("5"));
        assert_eq!(params.get("verbose").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_parse_query_missing_value() {
        let params = parse_query("flag");
        assert_eq!(params.get("flag").map(String::as_str), Some(""));
    }

    #[tokio::test]
    async fn test_route_health_reports_idle() {
        let oracle = test_oracle();
        let (status, body) = route("GET", "/health", "", &oracle).await;
        assert_eq!(status, "200 OK");
        assert!(body.contains("\"idle\""));
    }

    #[tokio::test]
    async fn test_route_unknown_path_is_404() {
        let oracle = test_oracle();
        let (status, _) = route("GET", "/nope", "", &oracle).await;
        assert_eq!(status, "404 Not Found");
    }

    #[tokio::test]
    async fn test_route_evolve_returns_outcome_json() {
        let oracle = test_oracle();
        let (status, body) = route("POST", "/oracle/evolve", "", &oracle).await;
        assert_eq!(status, "200 OK");
        let v: serde_json::Value = serde_json::from_str(&body).expect("json");
        assert!(v["fitness"].is_number());
        assert!(v["accepted"].is_boolean());
        assert_eq!(v["persisted"], true);
    }

    #[tokio::test]
    async fn test_route_history_returns_appended_cycle() {
        let oracle = test_oracle();
        let _ = route("POST", "/oracle/evolve", "", &oracle).await;
        let (status, body) = route("GET", "/oracle/history", "n=5", &oracle).await;
        assert_eq!(status, "200 OK");
        let v: serde_json::Value = serde_json::from_str(&body).expect("json");
        assert_eq!(v.as_array().map(|a| a.len()), Some(1));
    }

    #[tokio::test]
    async fn test_route_history_bad_n_uses_default() {
        let oracle = test_oracle();
        let (status, body) = route("GET", "/oracle/history", "n=banana", &oracle).await;
        assert_eq!(status, "200 OK");
        assert!(body.starts_with('['));
    }
}
