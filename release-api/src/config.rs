use crate::batch::BatchSettings;
use analyzer::AnalyzerConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Upper bound accepted for `max_results`, both in requests and as the default.
pub const MAX_RESULTS_LIMIT: u32 = 1000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("batch.max_concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("batch.batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("{0} must be greater than 0")]
    ZeroTimeout(&'static str),

    #[error("default_max_results must be between 1 and {MAX_RESULTS_LIMIT}, got {0}")]
    MaxResultsOutOfRange(u32),

    #[error("hosting_indicator cannot be empty")]
    EmptyHostingIndicator,
}

fn default_hosting_indicator() -> String {
    "WEBSITE_SITE_NAME".into()
}

fn default_max_results() -> u32 {
    2
}

fn default_single_issue_timeout_secs() -> u64 {
    300
}

fn default_diagnostics_timeout_secs() -> u64 {
    60
}

fn default_publish_pages() -> bool {
    true
}

/// Release notes API configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for incoming requests
    pub listener: Listener,
    /// Admin listener for health and readiness endpoints
    pub admin_listener: Listener,
    /// Environment variable whose presence marks a hosted deployment.
    #[serde(default = "default_hosting_indicator")]
    pub hosting_indicator: String,
    /// Cap applied to batch requests that do not carry `max_results`.
    #[serde(default = "default_max_results")]
    pub default_max_results: u32,
    #[serde(default = "default_single_issue_timeout_secs")]
    pub single_issue_timeout_secs: u64,
    /// Deadline for the processing step of a diagnostics run.
    #[serde(default = "default_diagnostics_timeout_secs")]
    pub diagnostics_timeout_secs: u64,
    /// When false, analyses are returned but no wiki pages are written.
    #[serde(default = "default_publish_pages")]
    pub publish_pages: bool,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub atlassian: AtlassianClientConfig,
    pub analyzer: AnalyzerConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.hosting_indicator.trim().is_empty() {
            return Err(ValidationError::EmptyHostingIndicator);
        }
        if !(1..=MAX_RESULTS_LIMIT).contains(&self.default_max_results) {
            return Err(ValidationError::MaxResultsOutOfRange(
                self.default_max_results,
            ));
        }
        if self.single_issue_timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout("single_issue_timeout_secs"));
        }
        if self.diagnostics_timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout("diagnostics_timeout_secs"));
        }

        if self.batch.max_concurrency == 0 {
            return Err(ValidationError::ZeroConcurrency);
        }
        if self.batch.batch_size == 0 {
            return Err(ValidationError::ZeroBatchSize);
        }
        if self.batch.per_call_timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout("batch.per_call_timeout_secs"));
        }
        if self.batch.overall_timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout("batch.overall_timeout_secs"));
        }
        if self.atlassian.request_timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout("atlassian.request_timeout_secs"));
        }
        if self.analyzer.request_timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout("analyzer.request_timeout_secs"));
        }

        Ok(())
    }

    pub fn single_issue_timeout(&self) -> Duration {
        Duration::from_secs(self.single_issue_timeout_secs)
    }

    pub fn diagnostics_timeout(&self) -> Duration {
        Duration::from_secs(self.diagnostics_timeout_secs)
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

/// Settings for the shared Jira/Confluence HTTP client.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AtlassianClientConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for AtlassianClientConfig {
    fn default() -> Self {
        AtlassianClientConfig {
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl AtlassianClientConfig {
    pub fn retry_policy(&self) -> atlassian::RetryPolicy {
        atlassian::RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
