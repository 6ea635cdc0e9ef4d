//! Structured analysis of Jira issues by a chat-completions model.

pub mod azure;
pub mod metrics_defs;
pub mod types;

#[cfg(test)]
mod testutils;

use async_trait::async_trait;
use atlassian::Issue;

pub use azure::{AnalyzerConfig, AzureOpenAiAnalyzer};
pub use types::{Analysis, AnalysisKind, BugAnalysis, EpicAnalysis, IssueAnalysis};

#[derive(thiserror::Error, Debug)]
pub enum AnalyzerError {
    #[error("model endpoint rejected the API key")]
    Unauthorized,
    #[error("model deployment not found")]
    NotFound,
    #[error("model endpoint rate limited the request")]
    RateLimited,
    #[error("model call timed out")]
    Timeout,
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
    #[error("analyzer API key variable {0} is not set")]
    MissingApiKey(String),
    #[error("invalid analyzer configuration: {0}")]
    InvalidConfig(String),
    #[error("HTTP client error: {0}")]
    Request(#[from] reqwest::Error),
}

impl AnalyzerError {
    /// Transient failures worth another attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AnalyzerError::RateLimited
                | AnalyzerError::Timeout
                | AnalyzerError::InvalidResponse(_)
                | AnalyzerError::Request(_)
        )
    }
}

#[async_trait]
pub trait IssueAnalyzer: Send + Sync {
    async fn analyze(&self, issue: &Issue) -> Result<Analysis, AnalyzerError>;
}
