use crate::metrics_defs::ATLASSIAN_RETRIES;
use crate::types::CredentialSet;
use reqwest::{RequestBuilder, Response, StatusCode};
use shared::counter;
use std::time::Duration;
use tokio::time::sleep;

const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
    StatusCode::TOO_MANY_REQUESTS,     // 429
    StatusCode::INTERNAL_SERVER_ERROR, // 500
    StatusCode::BAD_GATEWAY,           // 502
    StatusCode::SERVICE_UNAVAILABLE,   // 503
    StatusCode::GATEWAY_TIMEOUT,       // 504
];

#[derive(thiserror::Error, Debug)]
pub enum AtlassianError {
    #[error("authentication failed for {0}")]
    Unauthorized(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{what} returned {status} after {attempts} attempts")]
    RetriesExceeded {
        what: String,
        status: StatusCode,
        attempts: u32,
    },
    #[error("{what} returned unexpected status {status}: {body}")]
    UnexpectedStatus {
        what: String,
        status: StatusCode,
        body: String,
    },
    #[error("request to {0} timed out")]
    Timeout(String),
    #[error("invalid response from {what}: {reason}")]
    InvalidResponse { what: String, reason: String },
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl AtlassianError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AtlassianError::Unauthorized(_))
    }
}

/// Backoff schedule for retriable status codes: `base_delay * 2^n` before retry `n`.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Thin wrapper over a shared `reqwest::Client`. Credentials are supplied per
/// call since every request may carry its own.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl RestClient {
    pub fn new(request_timeout: Duration, retry: RetryPolicy) -> Result<Self, AtlassianError> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(RestClient { http, retry })
    }

    pub fn get(&self, creds: &CredentialSet, url: &str) -> RequestBuilder {
        self.authed(self.http.get(url), creds)
    }

    pub fn post(&self, creds: &CredentialSet, url: &str) -> RequestBuilder {
        self.authed(self.http.post(url), creds)
    }

    pub fn put(&self, creds: &CredentialSet, url: &str) -> RequestBuilder {
        self.authed(self.http.put(url), creds)
    }

    fn authed(&self, builder: RequestBuilder, creds: &CredentialSet) -> RequestBuilder {
        builder
            .basic_auth(&creds.username, Some(&creds.api_key))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Sends the request produced by `build`, rebuilding it for every retry.
    /// `what` names the resource in errors and logs; it must not contain secrets.
    pub async fn execute<F>(&self, what: &str, build: F) -> Result<Response, AtlassianError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;

        loop {
            let response = build().send().await.map_err(|e| {
                if e.is_timeout() {
                    AtlassianError::Timeout(what.to_string())
                } else {
                    AtlassianError::Reqwest(e)
                }
            })?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(AtlassianError::Unauthorized(what.to_string()));
                }
                StatusCode::NOT_FOUND => return Err(AtlassianError::NotFound(what.to_string())),
                s if RETRIABLE_STATUS_CODES.contains(&s) => {
                    if retries >= self.retry.max_retries {
                        return Err(AtlassianError::RetriesExceeded {
                            what: what.to_string(),
                            status,
                            attempts: retries + 1,
                        });
                    }
                    let delay = self.retry.base_delay * 2_u32.pow(retries);
                    tracing::warn!(what, %status, ?delay, retry = retries + 1, "Retrying request");
                    counter!(ATLASSIAN_RETRIES).increment(1);
                    sleep(delay).await;
                    retries += 1;
                }
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(AtlassianError::UnexpectedStatus {
                        what: what.to_string(),
                        status,
                        body,
                    });
                }
            }
        }
    }
}
