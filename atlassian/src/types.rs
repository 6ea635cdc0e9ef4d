use serde::{Deserialize, Serialize};
use std::fmt;

/// The resolved values needed to talk to Jira and Confluence on behalf of one
/// request. Only ever constructed complete.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSet {
    pub username: String,
    pub api_key: String,
    pub instance_url: String,
    pub wiki_space: String,
    pub wiki_parent_page_id: String,
}

impl CredentialSet {
    /// Instance URL without trailing slashes, ready for path concatenation.
    pub fn base_url(&self) -> &str {
        self.instance_url.trim_end_matches('/')
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("username", &self.username)
            .field("api_key", &"********")
            .field("instance_url", &self.instance_url)
            .field("wiki_space", &self.wiki_space)
            .field("wiki_parent_page_id", &self.wiki_parent_page_id)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParentIssue {
    pub key: String,
    pub summary: String,
}

/// A Jira issue reduced to the fields the analysis and the wiki page use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub id: String,
    pub key: String,
    pub summary: String,
    pub description: String,
    pub issue_type: String,
    pub status: String,
    pub priority: String,
    pub assignee: String,
    pub reporter: String,
    pub labels: Vec<String>,
    pub components: Vec<String>,
    pub fix_versions: Vec<String>,
    pub parent: Option<ParentIssue>,
}

#[derive(Debug)]
pub struct SearchResult {
    pub issues: Vec<Issue>,
    /// Total matches reported by Jira, which may exceed `issues.len()`.
    pub total: usize,
}

/// Everything needed to create or update one wiki page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageDraft {
    pub space: String,
    pub parent_id: String,
    pub title: String,
    pub body: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageAction {
    Created,
    Updated,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublishedPage {
    pub action: PageAction,
    pub page_id: String,
    pub title: String,
    pub url: String,
}

// Raw Jira REST v2 shapes.

#[derive(Deserialize)]
pub(crate) struct RawSearchResponse {
    #[serde(default)]
    pub issues: Vec<RawIssue>,
    pub total: Option<usize>,
}

#[derive(Deserialize)]
pub(crate) struct RawIssue {
    pub id: String,
    pub key: String,
    pub fields: RawFields,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Person {
    display_name: String,
}

#[derive(Deserialize)]
struct RawParentFields {
    #[serde(default)]
    summary: String,
}

#[derive(Deserialize)]
struct RawParent {
    key: String,
    fields: Option<RawParentFields>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawFields {
    #[serde(default)]
    summary: String,
    description: Option<String>,
    issuetype: Option<Named>,
    status: Option<Named>,
    priority: Option<Named>,
    assignee: Option<Person>,
    reporter: Option<Person>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    components: Vec<Named>,
    #[serde(default)]
    fix_versions: Vec<Named>,
    parent: Option<RawParent>,
}

/// Removes `[~accountid:...]` user mentions, which carry no meaning for the analysis.
fn strip_mentions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("[~accountid:") {
        out.push_str(&rest[..start]);
        match rest[start..].find(']') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

impl From<RawIssue> for Issue {
    fn from(raw: RawIssue) -> Self {
        let fields = raw.fields;
        Issue {
            id: raw.id,
            key: raw.key,
            summary: fields.summary,
            description: strip_mentions(fields.description.as_deref().unwrap_or_default()),
            issue_type: fields.issuetype.map(|t| t.name).unwrap_or_default(),
            status: fields.status.map(|s| s.name).unwrap_or_default(),
            priority: fields
                .priority
                .map(|p| p.name)
                .unwrap_or_else(|| "None".into()),
            assignee: fields
                .assignee
                .map(|a| a.display_name)
                .unwrap_or_else(|| "Unassigned".into()),
            reporter: fields.reporter.map(|r| r.display_name).unwrap_or_default(),
            labels: fields.labels,
            components: fields.components.into_iter().map(|c| c.name).collect(),
            fix_versions: fields.fix_versions.into_iter().map(|v| v.name).collect(),
            parent: fields.parent.map(|p| ParentIssue {
                key: p.key,
                summary: p.fields.map(|f| f.summary).unwrap_or_default(),
            }),
        }
    }
}
