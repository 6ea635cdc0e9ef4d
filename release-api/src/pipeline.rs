//! Per-issue work: analyze, then publish the analysis as a wiki page.

use analyzer::{Analysis, AnalyzerError, IssueAnalyzer};
use atlassian::{CredentialSet, Issue, IssueTracker, PageAction, PageDraft, WikiPublisher};
use serde::Serialize;
use std::sync::Arc;

pub const NO_MEANINGFUL_CONTENT: &str = "Issue lacks meaningful content from AI analysis";

/// The three external collaborators, shared by every request.
#[derive(Clone)]
pub struct Collaborators {
    pub tracker: Arc<dyn IssueTracker>,
    pub analyzer: Arc<dyn IssueAnalyzer>,
    pub wiki: Arc<dyn WikiPublisher>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageEntry {
    pub issue_key: String,
    pub page_id: String,
    pub title: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageError {
    pub issue_key: String,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageReport {
    Created(PageEntry),
    Updated(PageEntry),
    Failed(PageError),
    /// Publishing is switched off.
    Disabled,
}

/// Everything produced for one successfully analyzed issue.
#[derive(Debug)]
pub struct IssueReport {
    pub issue: Issue,
    pub analysis: Analysis,
    pub page: PageReport,
}

pub fn page_title(issue: &Issue, fix_version: Option<&str>) -> String {
    let fix_version = fix_version
        .filter(|v| !v.trim().is_empty())
        .or_else(|| issue.fix_versions.first().map(String::as_str));
    match fix_version {
        Some(version) => format!("{} - {} - {}", version, issue.key, issue.summary),
        None => format!("{} - {}", issue.key, issue.summary),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Minimal storage-format body: issue facts, then one heading per section.
pub fn page_body(issue: &Issue, analysis: &Analysis) -> String {
    let mut body = format!(
        "<p><strong>{}</strong>: {}</p><p>Type: {} | Status: {} | Priority: {} | Assignee: {}</p>",
        escape_html(&issue.key),
        escape_html(&issue.summary),
        escape_html(&issue.issue_type),
        escape_html(&issue.status),
        escape_html(&issue.priority),
        escape_html(&issue.assignee),
    );
    for (label, text) in analysis.sections() {
        body.push_str(&format!("<h2>{}</h2><p>{}</p>", label, escape_html(&text)));
    }
    body
}

async fn publish(
    wiki: &dyn WikiPublisher,
    creds: &CredentialSet,
    issue: &Issue,
    analysis: &Analysis,
    fix_version: Option<&str>,
) -> PageReport {
    let failed = |error: String| {
        PageReport::Failed(PageError {
            issue_key: issue.key.clone(),
            error,
        })
    };

    if !analysis.has_meaningful_content() {
        tracing::info!(issue_key = %issue.key, "Skipping page, analysis has no meaningful content");
        return failed(NO_MEANINGFUL_CONTENT.to_string());
    }

    let draft = PageDraft {
        space: creds.wiki_space.clone(),
        parent_id: creds.wiki_parent_page_id.clone(),
        title: page_title(issue, fix_version),
        body: page_body(issue, analysis),
    };

    match wiki.publish(creds, &draft).await {
        Ok(page) => {
            let entry = PageEntry {
                issue_key: issue.key.clone(),
                page_id: page.page_id,
                title: page.title,
                url: page.url,
            };
            match page.action {
                PageAction::Created => PageReport::Created(entry),
                PageAction::Updated => PageReport::Updated(entry),
            }
        }
        Err(e) => {
            tracing::warn!(issue_key = %issue.key, error = %e, "Failed to publish page");
            failed(e.to_string())
        }
    }
}

/// Analyzes one issue and publishes the result. Only an analysis failure is
/// an error; publish failures are reported in the returned page report.
pub async fn process_issue(
    collaborators: &Collaborators,
    creds: &CredentialSet,
    issue: Issue,
    fix_version: Option<&str>,
    publish_pages: bool,
) -> Result<IssueReport, AnalyzerError> {
    let analysis = collaborators.analyzer.analyze(&issue).await?;

    let page = if publish_pages {
        publish(collaborators.wiki.as_ref(), creds, &issue, &analysis, fix_version).await
    } else {
        PageReport::Disabled
    };

    Ok(IssueReport {
        issue,
        analysis,
        page,
    })
}
