use crate::metrics_defs::{ANALYZER_CALL_DURATION, ANALYZER_RETRIES};
use crate::types::{Analysis, AnalysisKind};
use crate::{AnalyzerError, IssueAnalyzer};
use async_trait::async_trait;
use atlassian::Issue;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use shared::{counter, histogram};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use url::Url;

fn default_api_key_env() -> String {
    "AZURE_OPENAI_KEY".into()
}

fn default_api_version() -> String {
    "2024-02-01".into()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_tokens() -> u32 {
    2000
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AnalyzerConfig {
    pub endpoint: Url,
    pub deployment: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Environment variable holding the API key. The key itself is never
    /// read from the config file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

/// Chat-completions client for an Azure OpenAI deployment.
pub struct AzureOpenAiAnalyzer {
    http: reqwest::Client,
    url: Url,
    api_key: String,
    max_attempts: u32,
    initial_backoff: Duration,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl AzureOpenAiAnalyzer {
    pub fn new(config: &AnalyzerConfig, api_key: String) -> Result<Self, AnalyzerError> {
        let mut url = config
            .endpoint
            .join(&format!(
                "openai/deployments/{}/chat/completions",
                config.deployment
            ))
            .map_err(|e| AnalyzerError::InvalidConfig(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("api-version", &config.api_version);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(AzureOpenAiAnalyzer {
            http,
            url,
            api_key,
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Builds the analyzer, taking the key from the variable named in the config.
    pub fn from_env(config: &AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AnalyzerError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }

    fn request_body(&self, issue: &Issue, kind: AnalysisKind) -> serde_json::Value {
        let system = format!(
            "You analyze Jira issues for release notes. Reply with a single JSON object \
             with exactly these fields: {}",
            kind.schema()
        );
        let user = json!({
            "key": issue.key,
            "summary": issue.summary,
            "issue_type": issue.issue_type,
            "status": issue.status,
            "priority": issue.priority,
            "labels": issue.labels,
            "components": issue.components,
            "description": issue.description,
        })
        .to_string();

        let mut body = json!({
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": self.max_tokens,
            "response_format": {"type": "json_object"},
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    async fn call_once(&self, body: &serde_json::Value) -> Result<String, AnalyzerError> {
        let response = self
            .http
            .post(self.url.clone())
            .header("api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalyzerError::Timeout
                } else {
                    AnalyzerError::Request(e)
                }
            })?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AnalyzerError::Unauthorized);
            }
            StatusCode::NOT_FOUND => return Err(AnalyzerError::NotFound),
            StatusCode::TOO_MANY_REQUESTS => return Err(AnalyzerError::RateLimited),
            status => {
                return Err(AnalyzerError::InvalidResponse(format!(
                    "unexpected status {status}"
                )));
            }
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AnalyzerError::InvalidResponse("no choices in completion".into()))
    }
}

/// Removes a surrounding markdown code fence (```json ... ```), if any.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop the info string on the opening fence line.
    match rest.find('\n') {
        Some(newline) if !rest[..newline].trim_start().starts_with('{') => rest[newline..].trim(),
        _ => rest.trim(),
    }
}

fn parse_reply(text: &str, kind: AnalysisKind) -> Result<Analysis, AnalyzerError> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| AnalyzerError::InvalidResponse(format!("reply is not JSON: {e}")))?;
    kind.parse(value)
        .map_err(|e| AnalyzerError::InvalidResponse(format!("unexpected reply shape: {e}")))
}

#[async_trait]
impl IssueAnalyzer for AzureOpenAiAnalyzer {
    async fn analyze(&self, issue: &Issue) -> Result<Analysis, AnalyzerError> {
        let kind = AnalysisKind::for_issue_type(&issue.issue_type);
        let body = self.request_body(issue, kind);
        let mut attempt = 1;
        let mut backoff = self.initial_backoff;

        loop {
            let start = Instant::now();
            let result = match self.call_once(&body).await {
                Ok(text) => parse_reply(&text, kind),
                Err(e) => Err(e),
            };
            let status = if result.is_ok() { "ok" } else { "error" };
            histogram!(ANALYZER_CALL_DURATION, "status" => status)
                .record(start.elapsed().as_secs_f64());

            match result {
                Ok(analysis) => return Ok(analysis),
                Err(e) if !e.is_retriable() || attempt >= self.max_attempts => {
                    tracing::warn!(issue_key = %issue.key, attempt, error = %e, "Analysis failed");
                    return Err(e);
                }
                Err(e) => {
                    tracing::info!(
                        issue_key = %issue.key,
                        attempt,
                        ?backoff,
                        error = %e,
                        "Retrying analysis"
                    );
                    counter!(ANALYZER_RETRIES).increment(1);
                    sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
            }
        }
    }
}
