//! Step-by-step trace of a fix-version run. Each stage records what it saw,
//! and the first failing stage decides the status code.

use crate::errors::ApiError;
use crate::handlers::{
    AppState, ConfigOnlyRequest, HandlerResult, parse_optional_json, process_batch, search_issues,
    unix_timestamp,
};
use crate::validation;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use shared::http::{ResponseBody, json_response};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
    Timeout,
}

#[derive(Debug, Serialize)]
pub struct Step {
    pub name: &'static str,
    pub status: StepStatus,
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    pub timestamp: f64,
    pub status: StepStatus,
    pub project: String,
    pub fix_version: String,
    pub issue_type: String,
    pub steps: Vec<Step>,
}

impl DiagnosticReport {
    fn new(project: &str, fix_version: &str, issue_type: &str) -> Self {
        DiagnosticReport {
            timestamp: unix_timestamp(),
            status: StepStatus::Success,
            project: project.to_string(),
            fix_version: fix_version.to_string(),
            issue_type: issue_type.to_string(),
            steps: Vec::new(),
        }
    }

    fn passed(&mut self, name: &'static str, data: Option<Value>) {
        self.push(name, StepStatus::Success, None, data);
    }

    fn push(
        &mut self,
        name: &'static str,
        status: StepStatus,
        message: Option<String>,
        data: Option<Value>,
    ) {
        tracing::debug!(step = name, ?status, "Diagnostics step");
        self.steps.push(Step {
            name,
            status,
            timestamp: unix_timestamp(),
            message,
            data,
        });
    }

    /// Records a failing step and renders the report with the error's status.
    fn fail(mut self, name: &'static str, err: ApiError) -> Response<ResponseBody> {
        tracing::warn!(step = name, error = %err, "Diagnostics run failed");
        let status = err.status();
        self.push(name, StepStatus::Failed, Some(err.to_string()), None);
        self.finish(status, StepStatus::Failed)
    }

    fn finish(mut self, code: StatusCode, status: StepStatus) -> Response<ResponseBody> {
        self.status = status;
        json_response(code, &self)
    }
}

/// `PUT /diagnostics/release-notes/{proj}/{fixver}/{issuetype}`
pub async fn diagnostics(
    state: &Arc<AppState>,
    project: &str,
    fix_version: &str,
    issue_type: &str,
    body: &Bytes,
) -> HandlerResult {
    let mut report = DiagnosticReport::new(project, fix_version, issue_type);

    let errors = validation::check_release_params(project, fix_version, issue_type);
    if !errors.is_empty() {
        return Ok(report.fail("input_validation", ApiError::BadRequest(errors.join("; "))));
    }
    report.passed("input_validation", None);

    let jql = validation::release_jql(project, fix_version, issue_type);
    report.passed("jql_construction", Some(json!({ "jql": jql })));

    let creds = match parse_optional_json::<ConfigOnlyRequest>(body)
        .and_then(|request| state.credentials(request.atlassian_config))
    {
        Ok(creds) => creds,
        Err(e) => return Ok(report.fail("config_loaded", e)),
    };
    let max_results = state.default_max_results();
    report.passed(
        "config_loaded",
        Some(json!({
            "local_development": state.runtime_mode().is_local(),
            "instance_url": creds.instance_url,
            "confluence_space": creds.wiki_space,
            "confluence_parent": creds.wiki_parent_page_id,
            "max_results": max_results,
        })),
    );

    let (issues, total) = match search_issues(state, &creds, &jql, max_results).await {
        Ok(found) => found,
        Err(e) => return Ok(report.fail("fetch_issues", ApiError::from_jira(e))),
    };
    report.passed(
        "fetch_issues",
        Some(json!({ "total": total, "fetched": issues.len() })),
    );

    let timeout = state.diagnostics_timeout();
    let run = process_batch(
        state,
        creds,
        issues,
        Vec::new(),
        Some(fix_version.to_string()),
    );
    let batch = match tokio::time::timeout(timeout, run).await {
        Ok(batch) if !batch.timed_out => batch,
        _ => {
            report.push(
                "process_issues",
                StepStatus::Timeout,
                Some(ApiError::Timeout(timeout).to_string()),
                None,
            );
            return Ok(report.finish(StatusCode::GATEWAY_TIMEOUT, StepStatus::Timeout));
        }
    };
    report.passed(
        "process_issues",
        Some(json!({
            "issue_count": batch.issue_count,
            "success_count": batch.success_count,
            "failure_count": batch.failure_count,
            "pages_created": batch.confluence_pages.created.len(),
            "pages_updated": batch.confluence_pages.updated.len(),
            "page_errors": batch.confluence_pages.errors.len(),
            "warnings": batch.warnings,
        })),
    );

    Ok(report.finish(StatusCode::OK, StepStatus::Success))
}
