use crate::client::{AtlassianError, RestClient};
use crate::types::{CredentialSet, Issue, RawIssue, RawSearchResponse, SearchResult};
use async_trait::async_trait;

/// Source of issues for analysis.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Runs `jql` and returns at most `max_results` issues.
    async fn search(
        &self,
        creds: &CredentialSet,
        jql: &str,
        max_results: u32,
    ) -> Result<SearchResult, AtlassianError>;

    async fn get_issue(&self, creds: &CredentialSet, key: &str) -> Result<Issue, AtlassianError>;
}

#[derive(Clone)]
pub struct JiraClient {
    rest: RestClient,
}

impl JiraClient {
    pub fn new(rest: RestClient) -> Self {
        JiraClient { rest }
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn search(
        &self,
        creds: &CredentialSet,
        jql: &str,
        max_results: u32,
    ) -> Result<SearchResult, AtlassianError> {
        let url = format!("{}/rest/api/2/search", creds.base_url());
        let max_results_param = max_results.to_string();
        tracing::info!(jql, max_results, "Searching Jira");

        let response = self
            .rest
            .execute("Jira search", || {
                self.rest.get(creds, &url).query(&[
                    ("jql", jql),
                    ("maxResults", max_results_param.as_str()),
                    ("startAt", "0"),
                    ("fields", "*all"),
                ])
            })
            .await?;

        let raw: RawSearchResponse = response.json().await?;
        let total = raw.total.unwrap_or(raw.issues.len());
        let issues: Vec<Issue> = raw
            .issues
            .into_iter()
            .take(max_results as usize)
            .map(Issue::from)
            .collect();

        tracing::info!(fetched = issues.len(), total, "Jira search complete");
        Ok(SearchResult { issues, total })
    }

    async fn get_issue(&self, creds: &CredentialSet, key: &str) -> Result<Issue, AtlassianError> {
        let url = format!("{}/rest/api/2/issue/{}", creds.base_url(), key);
        let what = format!("issue {key}");

        let response = self
            .rest
            .execute(&what, || self.rest.get(creds, &url))
            .await?;

        let raw: RawIssue = response.json().await?;
        Ok(Issue::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RetryPolicy;
    use crate::testutils::{TestServer, test_credentials};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::time::Duration;

    fn raw_issue(key: &str) -> serde_json::Value {
        json!({
            "id": "1",
            "key": key,
            "fields": {
                "summary": format!("Summary of {key}"),
                "issuetype": {"name": "Bug"},
                "status": {"name": "Open"}
            }
        })
    }

    fn client() -> JiraClient {
        JiraClient::new(RestClient::new(Duration::from_secs(5), RetryPolicy::default()).unwrap())
    }

    #[tokio::test]
    async fn test_search_caps_results() {
        let server = TestServer::spawn(|req| {
            assert_eq!(req.path, "/rest/api/2/search");
            (
                StatusCode::OK,
                json!({
                    "total": 40,
                    "issues": [raw_issue("IP-1"), raw_issue("IP-2"), raw_issue("IP-3")]
                }),
            )
        })
        .await;
        let creds = test_credentials(&format!("{}/", server.base_url));

        let result = client()
            .search(&creds, "project = IP", 2)
            .await
            .unwrap();
        assert_eq!(result.total, 40);
        assert_eq!(result.issues.len(), 2);
        assert_eq!(result.issues[1].key, "IP-2");

        let query = server.requests()[0].query.clone().unwrap();
        assert!(query.contains("maxResults=2"));
        assert!(query.contains("jql=project+%3D+IP"));
    }

    #[tokio::test]
    async fn test_get_issue_not_found() {
        let server = TestServer::spawn(|req| {
            if req.path == "/rest/api/2/issue/IP-7" {
                (StatusCode::OK, raw_issue("IP-7"))
            } else {
                (StatusCode::NOT_FOUND, json!({}))
            }
        })
        .await;
        let creds = test_credentials(&server.base_url);

        let issue = client().get_issue(&creds, "IP-7").await.unwrap();
        assert_eq!(issue.summary, "Summary of IP-7");

        let err = client().get_issue(&creds, "IP-8").await.unwrap_err();
        assert_eq!(err.to_string(), "issue IP-8 not found");
    }
}
