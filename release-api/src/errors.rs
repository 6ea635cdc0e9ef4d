use crate::config::ValidationError;
use crate::credentials::{CredentialField, MissingCredentials};
use atlassian::AtlassianError;
use hyper::{Response, StatusCode};
use serde_json::json;
use shared::http::{ResponseBody, json_response};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReleaseApiError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Atlassian client error: {0}")]
    Atlassian(#[from] AtlassianError),

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] analyzer::AnalyzerError),
}

/// Request-level failures. Each maps to one status code and JSON body in
/// `into_response`; per-issue failures never end up here.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid JSON in request body")]
    InvalidJson,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    MissingCredentials(#[from] MissingCredentials),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Jira API error: {0}")]
    Jira(AtlassianError),

    #[error("Issue {0} not found")]
    IssueNotFound(String),

    #[error("AI analysis failed for {key}: {reason}")]
    AnalysisFailed { key: String, reason: String },

    #[error(
        "Processing timed out after {} seconds. Please try with fewer issues or reduce batch size or concurrency settings.",
        .0.as_secs()
    )]
    Timeout(Duration),

    #[error("Not Found")]
    NotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Internal Server Error")]
    Internal(String),
}

impl ApiError {
    /// Classifies an issue-tracker failure: bad credentials abort with 401,
    /// everything else is an upstream failure.
    pub fn from_jira(err: AtlassianError) -> Self {
        if err.is_unauthorized() {
            ApiError::Unauthorized(err.to_string())
        } else {
            ApiError::Jira(err)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidJson
            | ApiError::BadRequest(_)
            | ApiError::MissingCredentials(_)
            | ApiError::IssueNotFound(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Jira(_) | ApiError::AnalysisFailed { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_response(self) -> Response<ResponseBody> {
        let status = self.status();
        if let ApiError::Internal(detail) = &self {
            tracing::error!(detail, "Internal error while handling request");
        } else if status.is_server_error() {
            tracing::warn!(%status, error = %self, "Request failed upstream");
        }

        let body = match &self {
            ApiError::MissingCredentials(missing) => json!({
                "status": "error",
                "message": missing.message(),
                "required_fields": CredentialField::required_fields(),
                "local_development": missing.local_development(),
            }),
            other => json!({
                "status": "error",
                "message": other.to_string(),
            }),
        };
        json_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::RuntimeMode;
    use http_body_util::BodyExt;

    async fn body_json(response: Response<ResponseBody>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_credentials_body() {
        let err = ApiError::from(MissingCredentials {
            missing: vec![CredentialField::ApiKey],
            mode: RuntimeMode::Hosted,
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["local_development"], false);
        assert_eq!(
            body["required_fields"],
            json!(["username", "api_key", "instance_url", "confluence_space", "confluence_parent"])
        );
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .starts_with("Missing required Atlassian configuration fields: api_key.")
        );
    }

    #[tokio::test]
    async fn test_internal_detail_is_hidden() {
        let response = ApiError::Internal("secret detail".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Internal Server Error");
    }

    #[test]
    fn test_jira_classification() {
        let err = ApiError::from_jira(AtlassianError::Unauthorized("Jira search".into()));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = ApiError::from_jira(AtlassianError::Timeout("Jira search".into()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().starts_with("Jira API error: "));
    }

    #[test]
    fn test_timeout_guidance() {
        let err = ApiError::Timeout(Duration::from_secs(900));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(err.to_string().contains("900 seconds"));
        assert!(err.to_string().contains("reduce batch size or concurrency"));
    }
}
