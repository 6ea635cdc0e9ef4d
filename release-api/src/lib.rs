//! HTTP API that turns Jira issues into analyzed Confluence release notes.

pub mod batch;
pub mod config;
pub mod credentials;
pub mod diagnostics;
pub mod environment;
pub mod errors;
pub mod handlers;
pub mod metrics_defs;
pub mod pipeline;
pub mod response;
pub mod service;
pub mod validation;

#[cfg(test)]
mod testutils;

use analyzer::AzureOpenAiAnalyzer;
use atlassian::{ConfluenceClient, JiraClient, RestClient};
use config::Config;
use environment::ProcessEnvironment;
use handlers::AppState;
use pipeline::Collaborators;
use service::ReleaseNotesService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;

pub use errors::ReleaseApiError;

/// Builds the production Jira, Confluence and analyzer clients.
pub fn build_collaborators(config: &Config) -> Result<Collaborators, ReleaseApiError> {
    let rest = RestClient::new(
        config.atlassian.request_timeout(),
        config.atlassian.retry_policy(),
    )?;
    let analyzer = AzureOpenAiAnalyzer::from_env(&config.analyzer)?;

    Ok(Collaborators {
        tracker: Arc::new(JiraClient::new(rest.clone())),
        analyzer: Arc::new(analyzer),
        wiki: Arc::new(ConfluenceClient::new(rest)),
    })
}

/// Serves the release-notes API and the admin endpoints until either
/// listener fails.
pub async fn run(config: Config, version: &'static str) -> Result<(), ReleaseApiError> {
    config.validate()?;
    let collaborators = build_collaborators(&config)?;
    let state = Arc::new(AppState::new(
        &config,
        collaborators,
        Arc::new(ProcessEnvironment),
        version,
    ));

    let api_task = run_http_service::<_, ReleaseApiError>(
        &config.listener.host,
        config.listener.port,
        ReleaseNotesService::new(state),
    );
    let admin_task = run_http_service::<_, ReleaseApiError>(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::new(version, || true),
    );

    tokio::try_join!(api_task, admin_task)?;
    Ok(())
}
