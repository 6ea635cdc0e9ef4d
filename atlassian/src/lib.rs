//! Clients for the Jira issue tracker and the Confluence wiki.

pub mod client;
pub mod confluence;
pub mod jira;
pub mod metrics_defs;
pub mod types;

#[cfg(test)]
mod testutils;

pub use client::{AtlassianError, RestClient, RetryPolicy};
pub use confluence::{ConfluenceClient, WikiPublisher};
pub use jira::{IssueTracker, JiraClient};
pub use types::{
    CredentialSet, Issue, PageAction, PageDraft, ParentIssue, PublishedPage, SearchResult,
};
