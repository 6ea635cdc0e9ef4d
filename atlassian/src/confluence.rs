use crate::client::{AtlassianError, RestClient};
use crate::metrics_defs::PAGES_PUBLISHED;
use crate::types::{CredentialSet, PageAction, PageDraft, PublishedPage};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use shared::counter;

/// Destination for analysis pages.
#[async_trait]
pub trait WikiPublisher: Send + Sync {
    /// Creates the page, or updates it in place if a page with the same title
    /// already exists in the space.
    async fn publish(
        &self,
        creds: &CredentialSet,
        page: &PageDraft,
    ) -> Result<PublishedPage, AtlassianError>;
}

#[derive(Deserialize)]
struct Version {
    number: u64,
}

#[derive(Deserialize)]
struct ContentRef {
    id: String,
    version: Option<Version>,
}

#[derive(Deserialize)]
struct ContentSearch {
    #[serde(default)]
    results: Vec<ContentRef>,
}

#[derive(Clone)]
pub struct ConfluenceClient {
    rest: RestClient,
}

impl ConfluenceClient {
    pub fn new(rest: RestClient) -> Self {
        ConfluenceClient { rest }
    }

    fn content_url(creds: &CredentialSet) -> String {
        format!("{}/wiki/rest/api/content", creds.base_url())
    }

    pub fn page_url(creds: &CredentialSet, page_id: &str) -> String {
        format!(
            "{}/wiki/pages/viewpage.action?pageId={}",
            creds.base_url(),
            page_id
        )
    }

    async fn find_by_title(
        &self,
        creds: &CredentialSet,
        space: &str,
        title: &str,
    ) -> Result<Option<ContentRef>, AtlassianError> {
        let url = Self::content_url(creds);
        let response = self
            .rest
            .execute("Confluence page lookup", || {
                self.rest.get(creds, &url).query(&[
                    ("spaceKey", space),
                    ("title", title),
                    ("expand", "version"),
                ])
            })
            .await?;

        let search: ContentSearch = response.json().await?;
        Ok(search.results.into_iter().next())
    }

    async fn create(
        &self,
        creds: &CredentialSet,
        page: &PageDraft,
    ) -> Result<ContentRef, AtlassianError> {
        let url = Self::content_url(creds);
        let mut body = json!({
            "type": "page",
            "title": page.title,
            "space": {"key": page.space},
            "body": {"storage": {"value": page.body, "representation": "storage"}},
        });
        if !page.parent_id.is_empty() {
            body["ancestors"] = json!([{"id": page.parent_id}]);
        }

        let response = self
            .rest
            .execute("Confluence page create", || {
                self.rest.post(creds, &url).json(&body)
            })
            .await?;
        Ok(response.json().await?)
    }

    async fn update(
        &self,
        creds: &CredentialSet,
        existing: &ContentRef,
        page: &PageDraft,
    ) -> Result<ContentRef, AtlassianError> {
        let url = format!("{}/{}", Self::content_url(creds), existing.id);
        let current = existing.version.as_ref().map_or(0, |v| v.number);
        let body = json!({
            "id": existing.id,
            "type": "page",
            "title": page.title,
            "body": {"storage": {"value": page.body, "representation": "storage"}},
            "version": {"number": current + 1},
        });

        let response = self
            .rest
            .execute("Confluence page update", || self.rest.put(creds, &url).json(&body))
            .await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl WikiPublisher for ConfluenceClient {
    async fn publish(
        &self,
        creds: &CredentialSet,
        page: &PageDraft,
    ) -> Result<PublishedPage, AtlassianError> {
        let (action, content) = match self.find_by_title(creds, &page.space, &page.title).await? {
            Some(existing) => {
                tracing::info!(page_id = %existing.id, title = %page.title, "Updating existing page");
                (PageAction::Updated, self.update(creds, &existing, page).await?)
            }
            None => {
                tracing::info!(title = %page.title, space = %page.space, "Creating page");
                (PageAction::Created, self.create(creds, page).await?)
            }
        };

        let action_label = match action {
            PageAction::Created => "created",
            PageAction::Updated => "updated",
        };
        counter!(PAGES_PUBLISHED, "action" => action_label).increment(1);

        Ok(PublishedPage {
            action,
            url: Self::page_url(creds, &content.id),
            page_id: content.id,
            title: page.title.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RetryPolicy;
    use crate::testutils::{TestServer, test_credentials};
    use reqwest::{Method, StatusCode};
    use std::time::Duration;

    fn client() -> ConfluenceClient {
        ConfluenceClient::new(
            RestClient::new(Duration::from_secs(5), RetryPolicy::default()).unwrap(),
        )
    }

    fn draft() -> PageDraft {
        PageDraft {
            space: "REL".into(),
            parent_id: "1000".into(),
            title: "IP-1 - Crash on save".into(),
            body: "<p>body</p>".into(),
        }
    }

    #[tokio::test]
    async fn test_publish_creates_missing_page() {
        let server = TestServer::spawn(|req| match req.method {
            Method::GET => (StatusCode::OK, json!({"results": []})),
            _ => (StatusCode::OK, json!({"id": "555"})),
        })
        .await;
        let creds = test_credentials(&server.base_url);

        let page = client().publish(&creds, &draft()).await.unwrap();
        assert_eq!(page.action, PageAction::Created);
        assert_eq!(page.page_id, "555");
        assert_eq!(
            page.url,
            format!("{}/wiki/pages/viewpage.action?pageId=555", server.base_url)
        );

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].method, Method::POST);
        assert_eq!(requests[1].body["ancestors"][0]["id"], "1000");
        assert_eq!(requests[1].body["space"]["key"], "REL");
    }

    #[tokio::test]
    async fn test_publish_updates_existing_page() {
        let server = TestServer::spawn(|req| match req.method {
            Method::GET => (
                StatusCode::OK,
                json!({"results": [{"id": "777", "version": {"number": 4}}]}),
            ),
            _ => (StatusCode::OK, json!({"id": "777"})),
        })
        .await;
        let creds = test_credentials(&server.base_url);

        let page = client().publish(&creds, &draft()).await.unwrap();
        assert_eq!(page.action, PageAction::Updated);

        let requests = server.requests();
        assert_eq!(requests[1].method, Method::PUT);
        assert_eq!(requests[1].path, "/wiki/rest/api/content/777");
        assert_eq!(requests[1].body["version"]["number"], 5);
    }
}
