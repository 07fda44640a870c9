//! HTTP client for the external code-review collaborator.
//!
//! Accepted proposals are handed off as pull requests for human
//! verification. Publication is best-effort downstream notification: a
//! failure here never retracts a ledger row and never aborts a cycle.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PublishConfig;
use crate::error::OracleError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct PullRequestBody<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Debug, Deserialize)]
struct PullRequestCreated {
    html_url: String,
}

// ---------------------------------------------------------------------------
// PullRequestClient
// ---------------------------------------------------------------------------

/// Authenticated client for the review system's pulls endpoint.
#[derive(Debug, Clone)]
pub struct PullRequestClient {
    client: reqwest::Client,
    api_base: String,
    repo: String,
    token: String,
}

impl PullRequestClient {
    pub fn new(config: &PublishConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent("coherence-oracle")
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            repo: config.repo.clone(),
            token: config.token.clone(),
        }
    }

    /// Open a pull request and return its handle (the review URL).
    ///
    /// # Errors
    /// - `OracleError::PublicationTransport` when the collaborator is
    ///   unreachable.
    /// - `OracleError::Publication` on any non-2xx response, carrying the
    ///   status and response body for operator diagnosis.
    pub async fn submit(
        &self,
        title: &str,
        body: &str,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<String, OracleError> {
        let url = format!("{}/repos/{}/pulls", self.api_base, self.repo);
        let payload = PullRequestBody {
            title,
            body,
            head: source_branch,
            base: target_branch,
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| OracleError::PublicationTransport(format!("{url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Publication {
                status: status.as_u16(),
                body,
            });
        }

        let created: PullRequestCreated = resp.json().await.map_err(|e| {
            OracleError::PublicationTransport(format!("{url}: bad body: {e}"))
        })?;
        Ok(created.html_url)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
