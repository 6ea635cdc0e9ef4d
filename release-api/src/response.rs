//! JSON bodies returned by the release-notes endpoints.

use crate::batch::{BatchResult, ItemStatus};
use crate::pipeline::{IssueReport, PageEntry, PageError, PageReport};
use analyzer::Analysis;
use serde::Serialize;

#[derive(Debug, Default, Serialize)]
pub struct ConfluencePages {
    pub created: Vec<PageEntry>,
    pub updated: Vec<PageEntry>,
    pub errors: Vec<PageError>,
}

impl ConfluencePages {
    fn add(&mut self, page: &PageReport) {
        match page {
            PageReport::Created(entry) => self.created.push(entry.clone()),
            PageReport::Updated(entry) => self.updated.push(entry.clone()),
            PageReport::Failed(error) => self.errors.push(error.clone()),
            PageReport::Disabled => {}
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OutcomeEntry {
    pub issue_key: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisEntry {
    pub issue_key: String,
    pub summary: String,
    pub issue_type: String,
    pub analysis: Analysis,
}

impl AnalysisEntry {
    fn from_report(report: &IssueReport) -> Self {
        AnalysisEntry {
            issue_key: report.issue.key.clone(),
            summary: report.issue.summary.clone(),
            issue_type: report.issue.issue_type.clone(),
            analysis: report.analysis.clone(),
        }
    }
}

/// Fields shared by every batch-shaped response.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub details: Vec<String>,
    pub warnings: Vec<String>,
    pub confluence_pages: ConfluencePages,
    pub issue_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub outcomes: Vec<OutcomeEntry>,
    pub analyses: Vec<AnalysisEntry>,
    pub timed_out: bool,
}

impl BatchReport {
    pub fn new(mut details: Vec<String>, result: BatchResult<IssueReport>) -> Self {
        let mut warnings = Vec::new();
        let mut confluence_pages = ConfluencePages::default();
        let mut analyses = Vec::new();
        let mut outcomes = Vec::with_capacity(result.outcomes.len());

        let success_count = result.success_count();
        let failure_count = result.failure_count();

        for outcome in &result.outcomes {
            match (&outcome.status, &outcome.payload) {
                (ItemStatus::Succeeded, Some(report)) => {
                    details.push(format!("Successfully processed issue {}", outcome.key));
                    confluence_pages.add(&report.page);
                    match &report.page {
                        PageReport::Created(_) => {
                            details.push(format!("Confluence page created for {}", outcome.key))
                        }
                        PageReport::Updated(_) => {
                            details.push(format!("Confluence page updated for {}", outcome.key))
                        }
                        PageReport::Failed(error) => warnings.push(format!(
                            "Failed to create Confluence page for {}: {}",
                            outcome.key, error.error
                        )),
                        PageReport::Disabled => {}
                    }
                    analyses.push(AnalysisEntry::from_report(report));
                }
                (status, _) => {
                    warnings.push(format!(
                        "Failed to process {}: {}",
                        outcome.key,
                        status.reason().unwrap_or("unknown error")
                    ));
                }
            }

            outcomes.push(OutcomeEntry {
                issue_key: outcome.key.clone(),
                status: outcome.status.as_str(),
                reason: outcome.status.reason().map(String::from),
            });
        }

        details.push(format!(
            "Processed {}/{} issues successfully",
            success_count,
            result.outcomes.len()
        ));

        BatchReport {
            details,
            warnings,
            confluence_pages,
            issue_count: result.outcomes.len(),
            success_count,
            failure_count,
            outcomes,
            analyses,
            timed_out: result.timed_out,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(flatten)]
    pub report: BatchReport,
}

#[derive(Debug, Serialize)]
pub struct SingleIssueResponse {
    pub status: &'static str,
    pub message: String,
    pub issue_key: String,
    pub issue_count: usize,
    /// Seconds spent on the request.
    pub processing_time: f64,
    pub details: Vec<String>,
    pub warnings: Vec<String>,
    pub confluence_pages: ConfluencePages,
    pub analysis: Analysis,
}

impl SingleIssueResponse {
    pub fn new(report: IssueReport, processing_time: f64) -> Self {
        let key = report.issue.key.clone();
        let mut details = vec![
            format!("Successfully fetched issue: {key}"),
            format!("Successfully processed issue {key}"),
        ];
        let mut warnings = Vec::new();
        let mut confluence_pages = ConfluencePages::default();
        confluence_pages.add(&report.page);

        match &report.page {
            PageReport::Created(_) => details.push(format!("Confluence page created for {key}")),
            PageReport::Updated(_) => details.push(format!("Confluence page updated for {key}")),
            PageReport::Failed(error) => warnings.push(format!(
                "Failed to create Confluence page for {key}: {}",
                error.error
            )),
            PageReport::Disabled => {}
        }
        details.push(format!("Total processing time: {processing_time:.2} seconds"));

        SingleIssueResponse {
            status: "success",
            message: format!("Successfully processed issue {key}"),
            issue_key: key,
            issue_count: 1,
            processing_time,
            details,
            warnings,
            confluence_pages,
            analysis: report.analysis,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReleaseMetadata {
    pub release_name: Option<String>,
    pub repository: Option<String>,
    pub tag: Option<String>,
    pub deployment_status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub status: &'static str,
    pub release_note: String,
    pub release_metadata: ReleaseMetadata,
    #[serde(flatten)]
    pub report: BatchReport,
}

fn or_na(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("N/A")
}

/// Markdown summary of a deployment and the issues it shipped.
pub fn release_note_text(metadata: &ReleaseMetadata, report: &BatchReport) -> String {
    let mut note = vec![
        format!("# Release: {}", or_na(&metadata.release_name)),
        format!("Repository: {}", or_na(&metadata.repository)),
        format!("Tag: {}", or_na(&metadata.tag)),
        format!("Deployment Status: {}", or_na(&metadata.deployment_status)),
        "\n---\n".to_string(),
        "## Enriched Jira Issues\n".to_string(),
    ];

    if report.analyses.is_empty() && report.outcomes.is_empty() {
        note.push("No Jira issues enriched.\n".to_string());
    }
    for entry in &report.analyses {
        note.push(format!("- **{}: {}**", entry.issue_key, entry.summary));
        note.push(format!(
            "  - Executive Summary: {}",
            entry.analysis.executive_summary()
        ));
        note.push(format!(
            "  - Technical Summary: {}\n",
            entry.analysis.technical_summary()
        ));
    }
    for outcome in report.outcomes.iter().filter(|o| o.status != "success") {
        note.push(format!(
            "- [ERROR] {}: {}\n",
            outcome.issue_key,
            outcome.reason.as_deref().unwrap_or("unknown error")
        ));
    }

    note.join("\n")
}
