use analyzer::{
    Analysis, AnalysisKind, AnalyzerError, BugAnalysis, EpicAnalysis, IssueAnalysis, IssueAnalyzer,
};
use async_trait::async_trait;
use atlassian::{
    AtlassianError, CredentialSet, Issue, IssueTracker, PageAction, PageDraft, PublishedPage,
    SearchResult, WikiPublisher,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn test_credentials() -> CredentialSet {
    CredentialSet {
        username: "user@example.com".into(),
        api_key: "token".into(),
        instance_url: "https://example.atlassian.net".into(),
        wiki_space: "REL".into(),
        wiki_parent_page_id: "1000".into(),
    }
}

pub fn issue(key: &str, issue_type: &str) -> Issue {
    Issue {
        id: key.trim_start_matches(|c: char| !c.is_ascii_digit()).into(),
        key: key.into(),
        summary: format!("Summary of {key}"),
        description: String::new(),
        issue_type: issue_type.into(),
        status: "Done".into(),
        priority: "None".into(),
        assignee: "Unassigned".into(),
        reporter: String::new(),
        labels: vec![],
        components: vec![],
        fix_versions: vec![],
        parent: None,
    }
}

pub fn issues(n: usize) -> Vec<Issue> {
    (1..=n).map(|i| issue(&format!("IP-{i}"), "Bug")).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerFailure {
    Unauthorized,
    Unavailable,
}

/// Issue tracker over a fixed list. Records the queries it receives.
pub struct FakeTracker {
    issues: Vec<Issue>,
    failure: Option<TrackerFailure>,
    searches: Mutex<Vec<(String, u32)>>,
}

impl FakeTracker {
    pub fn new(issues: Vec<Issue>) -> Self {
        FakeTracker {
            issues,
            failure: None,
            searches: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(failure: TrackerFailure) -> Self {
        FakeTracker {
            failure: Some(failure),
            ..FakeTracker::new(vec![])
        }
    }

    pub fn searches(&self) -> Vec<(String, u32)> {
        self.searches.lock().unwrap().clone()
    }

    fn check(&self, what: &str) -> Result<(), AtlassianError> {
        match self.failure {
            Some(TrackerFailure::Unauthorized) => Err(AtlassianError::Unauthorized(what.into())),
            Some(TrackerFailure::Unavailable) => Err(AtlassianError::RetriesExceeded {
                what: what.into(),
                status: status_code(503),
                attempts: 4,
            }),
            None => Ok(()),
        }
    }
}

fn status_code(code: u16) -> hyper::StatusCode {
    hyper::StatusCode::from_u16(code).unwrap()
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn search(
        &self,
        _creds: &CredentialSet,
        jql: &str,
        max_results: u32,
    ) -> Result<SearchResult, AtlassianError> {
        self.searches
            .lock()
            .unwrap()
            .push((jql.to_string(), max_results));
        self.check("Jira search")?;

        // Deliberately ignores max_results so callers must enforce it too.
        Ok(SearchResult {
            issues: self.issues.clone(),
            total: self.issues.len(),
        })
    }

    async fn get_issue(&self, _creds: &CredentialSet, key: &str) -> Result<Issue, AtlassianError> {
        self.check(&format!("issue {key}"))?;
        self.issues
            .iter()
            .find(|i| i.key == key)
            .cloned()
            .ok_or_else(|| AtlassianError::NotFound(format!("issue {key}")))
    }
}

/// Analyzer with per-key behavior. Tracks how many calls run at once.
#[derive(Default)]
pub struct FakeAnalyzer {
    empty: bool,
    failures: HashSet<String>,
    panics: HashSet<String>,
    delays: HashMap<String, Duration>,
    default_delay: Option<Duration>,
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl FakeAnalyzer {
    pub fn meaningful() -> Self {
        FakeAnalyzer::default()
    }

    pub fn empty() -> Self {
        FakeAnalyzer {
            empty: true,
            ..FakeAnalyzer::default()
        }
    }

    pub fn fail(mut self, key: &str) -> Self {
        self.failures.insert(key.into());
        self
    }

    pub fn panic_on(mut self, key: &str) -> Self {
        self.panics.insert(key.into());
        self
    }

    pub fn delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.into(), delay);
        self
    }

    pub fn delay_all(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
        self
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn analysis_for(&self, issue: &Issue) -> Analysis {
        let kind = AnalysisKind::for_issue_type(&issue.issue_type);
        if self.empty {
            return match kind {
                AnalysisKind::Bug => Analysis::Bug(BugAnalysis::default()),
                AnalysisKind::Epic => Analysis::Epic(EpicAnalysis::default()),
                AnalysisKind::Issue => Analysis::Issue(IssueAnalysis::default()),
            };
        }
        match kind {
            AnalysisKind::Bug => Analysis::Bug(BugAnalysis {
                ticket_number: issue.key.clone(),
                executive_summary: format!("{} is fixed", issue.key),
                technical_summary: "Null check added".into(),
                fix: "Guard against missing value".into(),
                ..BugAnalysis::default()
            }),
            AnalysisKind::Epic => Analysis::Epic(EpicAnalysis {
                executive_summary: "New capability".into(),
                technical_summary: "Several services changed".into(),
                ..EpicAnalysis::default()
            }),
            AnalysisKind::Issue => Analysis::Issue(IssueAnalysis {
                reasoning: "Visible to users".into(),
                inferred_categories: vec!["UI".into()],
                ..IssueAnalysis::default()
            }),
        }
    }
}

/// Decrements the concurrency count even when the call is cancelled.
struct Running<'a>(&'a AtomicUsize);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl IssueAnalyzer for FakeAnalyzer {
    async fn analyze(&self, issue: &Issue) -> Result<Analysis, AnalyzerError> {
        self.calls.lock().unwrap().push(issue.key.clone());
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _running = Running(&self.current);

        let delay = self
            .delays
            .get(&issue.key)
            .copied()
            .or(self.default_delay)
            .unwrap_or(Duration::from_millis(10));
        tokio::time::sleep(delay).await;

        if self.panics.contains(&issue.key) {
            panic!("analyzer blew up on {}", issue.key);
        }
        if self.failures.contains(&issue.key) {
            return Err(AnalyzerError::RateLimited);
        }
        Ok(self.analysis_for(issue))
    }
}

/// Wiki over an in-memory set of titles. Existing titles are updated.
#[derive(Default)]
pub struct FakeWiki {
    failing: bool,
    existing: Mutex<HashSet<String>>,
    drafts: Mutex<Vec<PageDraft>>,
}

impl FakeWiki {
    pub fn new() -> Self {
        FakeWiki::default()
    }

    pub fn failing() -> Self {
        FakeWiki {
            failing: true,
            ..FakeWiki::default()
        }
    }

    pub fn with_existing(titles: &[&str]) -> Self {
        FakeWiki {
            existing: Mutex::new(titles.iter().map(|t| t.to_string()).collect()),
            ..FakeWiki::default()
        }
    }

    pub fn drafts(&self) -> Vec<PageDraft> {
        self.drafts.lock().unwrap().clone()
    }
}

#[async_trait]
impl WikiPublisher for FakeWiki {
    async fn publish(
        &self,
        creds: &CredentialSet,
        page: &PageDraft,
    ) -> Result<PublishedPage, AtlassianError> {
        if self.failing {
            return Err(AtlassianError::UnexpectedStatus {
                what: "Confluence page create".into(),
                status: status_code(400),
                body: "space does not exist".into(),
            });
        }

        let mut drafts = self.drafts.lock().unwrap();
        drafts.push(page.clone());
        let page_id = format!("{}", 5000 + drafts.len());
        let action = if self.existing.lock().unwrap().insert(page.title.clone()) {
            PageAction::Created
        } else {
            PageAction::Updated
        };

        Ok(PublishedPage {
            action,
            url: format!("{}/wiki/pages/viewpage.action?pageId={page_id}", creds.base_url()),
            page_id,
            title: page.title.clone(),
        })
    }
}
