use crate::batch::BatchOrchestrator;
use crate::config::{Config, MAX_RESULTS_LIMIT};
use crate::credentials::{ConfigResolver, PartialCredentials};
use crate::environment::{Environment, EnvironmentDetector, RuntimeMode};
use crate::errors::ApiError;
use crate::pipeline::{Collaborators, IssueReport, process_issue};
use crate::response::{
    BatchReport, BatchResponse, EventResponse, ReleaseMetadata, SingleIssueResponse,
    release_note_text,
};
use crate::validation;
use atlassian::{AtlassianError, CredentialSet, Issue};
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use shared::http::{ResponseBody, json_response};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub(crate) type HandlerResult = Result<Response<ResponseBody>, ApiError>;

/// Process-wide state shared by every request.
pub struct AppState {
    pub collaborators: Collaborators,
    env: Arc<dyn Environment>,
    detector: EnvironmentDetector,
    resolver: ConfigResolver,
    /// Shared by every request, so `max_concurrency` bounds the whole process.
    orchestrator: BatchOrchestrator,
    default_max_results: u32,
    single_issue_timeout: Duration,
    diagnostics_timeout: Duration,
    publish_pages: bool,
    version: &'static str,
}

impl AppState {
    pub fn new(
        config: &Config,
        collaborators: Collaborators,
        env: Arc<dyn Environment>,
        version: &'static str,
    ) -> Self {
        AppState {
            collaborators,
            detector: EnvironmentDetector::new(config.hosting_indicator.clone()),
            resolver: ConfigResolver::new(env.clone()),
            env,
            orchestrator: BatchOrchestrator::new(config.batch.clone()),
            default_max_results: config.default_max_results,
            single_issue_timeout: config.single_issue_timeout(),
            diagnostics_timeout: config.diagnostics_timeout(),
            publish_pages: config.publish_pages,
            version,
        }
    }

    pub(crate) fn runtime_mode(&self) -> RuntimeMode {
        self.detector.detect(self.env.as_ref())
    }

    pub(crate) fn default_max_results(&self) -> u32 {
        self.default_max_results
    }

    pub(crate) fn diagnostics_timeout(&self) -> Duration {
        self.diagnostics_timeout
    }

    pub(crate) fn credentials(
        &self,
        partial: Option<PartialCredentials>,
    ) -> Result<CredentialSet, ApiError> {
        let mode = self.runtime_mode();
        let creds = self.resolver.resolve(&partial.unwrap_or_default(), mode)?;
        tracing::debug!(?mode, instance_url = %creds.instance_url, "Resolved Atlassian configuration");
        Ok(creds)
    }
}

/// Parses a required JSON body. Syntax errors and wrong shapes are reported
/// differently.
fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| ApiError::InvalidJson)?;
    serde_json::from_value(value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))
}

/// Like `parse_json`, but an empty body yields the default value.
pub(crate) fn parse_optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_json(body)
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("Missing required field: {field}")))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConfigOnlyRequest {
    pub atlassian_config: Option<PartialCredentials>,
}

#[derive(Debug, Deserialize)]
struct CustomRequest {
    jql: Option<String>,
    issue_type: Option<String>,
    max_results: Option<i64>,
    atlassian_config: Option<PartialCredentials>,
}

#[derive(Debug, Deserialize)]
struct SingleRequest {
    issue_key: Option<String>,
    atlassian_config: Option<PartialCredentials>,
}

#[derive(Debug, Deserialize)]
struct EventRequest {
    release_name: Option<String>,
    repository: Option<String>,
    tag: Option<String>,
    deployment_status: Option<String>,
    #[serde(default)]
    jira_issue_keys: Vec<String>,
    atlassian_config: Option<PartialCredentials>,
}

pub(crate) async fn search_issues(
    state: &AppState,
    creds: &CredentialSet,
    jql: &str,
    max_results: u32,
) -> Result<(Vec<Issue>, usize), AtlassianError> {
    let search = state
        .collaborators
        .tracker
        .search(creds, jql, max_results)
        .await?;

    let mut issues = search.issues;
    issues.truncate(max_results as usize);
    tracing::info!(jql, fetched = issues.len(), total = search.total, "Fetched issues");
    Ok((issues, search.total))
}

/// Analyzes and publishes `issues` through the shared orchestrator.
pub(crate) async fn process_batch(
    state: &AppState,
    creds: CredentialSet,
    issues: Vec<Issue>,
    details: Vec<String>,
    fix_version: Option<String>,
) -> BatchReport {
    let creds = Arc::new(creds);
    let collaborators = state.collaborators.clone();
    let publish_pages = state.publish_pages;
    let fix_version: Option<Arc<str>> = fix_version.map(Arc::from);

    let result = state
        .orchestrator
        .run(issues, move |issue| {
            let collaborators = collaborators.clone();
            let creds = creds.clone();
            let fix_version = fix_version.clone();
            async move {
                process_issue(
                    &collaborators,
                    &creds,
                    issue,
                    fix_version.as_deref(),
                    publish_pages,
                )
                .await
            }
        })
        .await;

    let report = BatchReport::new(details, result);
    tracing::info!(
        issues = report.issue_count,
        succeeded = report.success_count,
        failed = report.failure_count,
        timed_out = report.timed_out,
        "Batch finished"
    );
    report
}

async fn run_batch(
    state: &Arc<AppState>,
    creds: CredentialSet,
    jql: &str,
    max_results: u32,
    fix_version: Option<String>,
) -> Result<BatchReport, ApiError> {
    let (issues, total) = search_issues(state, &creds, jql, max_results)
        .await
        .map_err(ApiError::from_jira)?;
    let details = vec![format!(
        "Found {} total issues, fetched {} issues from Jira",
        total,
        issues.len()
    )];

    Ok(process_batch(state, creds, issues, details, fix_version).await)
}

/// A batch cut off by the overall deadline still returns its partial
/// results, under a 504.
fn timeout_response(state: &AppState, report: BatchReport) -> Response<ResponseBody> {
    json_response(
        StatusCode::GATEWAY_TIMEOUT,
        &BatchResponse {
            status: "timeout",
            message: ApiError::Timeout(state.orchestrator.settings().overall_timeout()).to_string(),
            report,
        },
    )
}

fn batch_response(state: &AppState, report: BatchReport, message: String) -> Response<ResponseBody> {
    if report.timed_out {
        return timeout_response(state, report);
    }
    json_response(
        StatusCode::OK,
        &BatchResponse {
            status: "success",
            message,
            report,
        },
    )
}

async fn run_single(state: &Arc<AppState>, creds: CredentialSet, key: String) -> HandlerResult {
    let start = Instant::now();
    let work = async {
        let issue = state
            .collaborators
            .tracker
            .get_issue(&creds, &key)
            .await
            .map_err(|e| match e {
                AtlassianError::NotFound(_) => ApiError::IssueNotFound(key.clone()),
                other => ApiError::from_jira(other),
            })?;

        let _slot = state
            .orchestrator
            .acquire()
            .await
            .ok_or_else(|| ApiError::Internal("concurrency limiter closed".into()))?;
        process_issue(&state.collaborators, &creds, issue, None, state.publish_pages)
            .await
            .map_err(|e| ApiError::AnalysisFailed {
                key: key.clone(),
                reason: e.to_string(),
            })
    };

    let report: IssueReport = tokio::time::timeout(state.single_issue_timeout, work)
        .await
        .map_err(|_| ApiError::Timeout(state.single_issue_timeout))??;

    Ok(json_response(
        StatusCode::OK,
        &SingleIssueResponse::new(report, start.elapsed().as_secs_f64()),
    ))
}

/// `POST /release-notes/custom`
pub async fn custom(state: &Arc<AppState>, body: &Bytes) -> HandlerResult {
    let request: CustomRequest = parse_json(body)?;
    let jql = required(request.jql, "jql")?;
    let max_results = match request.max_results {
        Some(n) => validation::check_max_results(n).map_err(ApiError::BadRequest)?,
        None => state.default_max_results,
    };
    let creds = state.credentials(request.atlassian_config)?;

    let jql = validation::with_issue_type(&jql, request.issue_type.as_deref());
    let report = run_batch(state, creds, &jql, max_results, None).await?;
    let message = format!(
        "Successfully processed JQL query with custom Atlassian configuration. Found {} issues.",
        report.issue_count
    );
    Ok(batch_response(state, report, message))
}

/// `POST /release-notes/single`
pub async fn single(state: &Arc<AppState>, body: &Bytes) -> HandlerResult {
    let request: SingleRequest = parse_json(body)?;
    let key = required(request.issue_key, "issue_key")?;
    validation::check_issue_key(&key).map_err(ApiError::BadRequest)?;
    let creds = state.credentials(request.atlassian_config)?;

    run_single(state, creds, key).await
}

/// `POST /release-notes/event`: a deployment event listing the issues it shipped.
pub async fn event(state: &Arc<AppState>, body: &Bytes) -> HandlerResult {
    let request: EventRequest = parse_json(body)?;

    let mut keys: Vec<String> = Vec::new();
    for key in request.jira_issue_keys {
        let key = key.trim().to_string();
        validation::check_issue_key(&key).map_err(ApiError::BadRequest)?;
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    if keys.is_empty() {
        return Err(ApiError::BadRequest(
            "No Jira issue keys provided or jira_issue_keys is not a list.".into(),
        ));
    }
    if keys.len() > MAX_RESULTS_LIMIT as usize {
        return Err(ApiError::BadRequest(format!(
            "At most {MAX_RESULTS_LIMIT} Jira issue keys can be processed per event"
        )));
    }
    let creds = state.credentials(request.atlassian_config)?;

    let jql = validation::keys_jql(&keys);
    let report = run_batch(state, creds, &jql, keys.len() as u32, None).await?;
    if report.timed_out {
        return Ok(timeout_response(state, report));
    }

    let release_metadata = ReleaseMetadata {
        release_name: request.release_name,
        repository: request.repository,
        tag: request.tag,
        deployment_status: request.deployment_status,
    };
    let release_note = release_note_text(&release_metadata, &report);

    Ok(json_response(
        StatusCode::OK,
        &EventResponse {
            status: "success",
            release_note,
            release_metadata,
            report,
        },
    ))
}

/// `PUT /release-notes/{proj}/{fixver}/{issuetype}[/{max_results}]`
pub async fn release(
    state: &Arc<AppState>,
    project: &str,
    fix_version: &str,
    issue_type: &str,
    max_results: Option<&str>,
    body: &Bytes,
) -> HandlerResult {
    let errors = validation::check_release_params(project, fix_version, issue_type);
    if !errors.is_empty() {
        return Err(ApiError::BadRequest(errors.join("; ")));
    }
    let max_results = match max_results {
        Some(raw) => {
            let n: i64 = raw.parse().map_err(|_| {
                ApiError::BadRequest(format!(
                    "max_results must be between 1 and {MAX_RESULTS_LIMIT}"
                ))
            })?;
            validation::check_max_results(n).map_err(ApiError::BadRequest)?
        }
        None => state.default_max_results,
    };
    let request: ConfigOnlyRequest = parse_optional_json(body)?;
    let creds = state.credentials(request.atlassian_config)?;

    let jql = validation::release_jql(project, fix_version, issue_type);
    let report = run_batch(state, creds, &jql, max_results, Some(fix_version.to_string())).await?;
    let message = format!(
        "Successfully processed request for {project}/{fix_version}/{issue_type} with max_results: {max_results}"
    );
    Ok(batch_response(state, report, message))
}

/// `PUT /release-notes/{proj}/{issue_key}`
pub async fn project_issue(
    state: &Arc<AppState>,
    project: &str,
    issue_key: &str,
    body: &Bytes,
) -> HandlerResult {
    if !validation::is_project_key(project) {
        return Err(ApiError::BadRequest("Invalid project key format".into()));
    }
    validation::check_issue_key(issue_key).map_err(ApiError::BadRequest)?;
    let belongs = issue_key
        .rsplit_once('-')
        .is_some_and(|(prefix, _)| prefix.eq_ignore_ascii_case(project));
    if !belongs {
        return Err(ApiError::BadRequest(format!(
            "Issue key {issue_key} does not belong to project {project}"
        )));
    }
    let request: ConfigOnlyRequest = parse_optional_json(body)?;
    let creds = state.credentials(request.atlassian_config)?;

    run_single(state, creds, issue_key.to_string()).await
}

pub(crate) fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// `GET /test`
pub fn test(state: &AppState) -> HandlerResult {
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "status": "ok",
            "message": "Release notes service is running",
            "timestamp": unix_timestamp(),
            "app_version": state.version,
        }),
    ))
}
