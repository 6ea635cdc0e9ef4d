mod config;

use clap::{Args, Parser};
use config::{CommonConfig, Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use release_api::credentials::{ConfigResolver, MissingCredentials, PartialCredentials};
use release_api::environment::{ProcessEnvironment, RuntimeMode};
use release_api::pipeline::process_issue;
use release_api::response::SingleIssueResponse;
use release_api::{ReleaseApiError, build_collaborators};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(version, about = "Jira release notes analyzed and published to Confluence")]
enum CliCommand {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Analyze one issue and print the result as JSON.
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long)]
    config_file: PathBuf,
}

#[derive(Args)]
struct AnalyzeArgs {
    #[arg(long)]
    config_file: PathBuf,
    issue_key: String,
    /// Skip writing the Confluence page.
    #[arg(long)]
    no_publish: bool,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ReleaseApiError),
    #[error(transparent)]
    Credentials(#[from] MissingCredentials),
    #[error("could not fetch issue: {0}")]
    Jira(#[from] atlassian::AtlassianError),
    #[error("analysis failed: {0}")]
    Analysis(#[from] analyzer::AnalyzerError),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("could not encode result: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

fn main() {
    let cli = CliCommand::parse();

    if let Err(e) = cli_main(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn cli_main(cli: CliCommand) -> Result<(), CliError> {
    let config_file = match &cli {
        CliCommand::Serve(args) => &args.config_file,
        CliCommand::Analyze(args) => &args.config_file,
    };
    let config = Config::from_file(config_file)?;

    let _sentry = init_logging(&config.common.logging);
    init_metrics(&config.common)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli {
        CliCommand::Serve(_) => {
            tracing::info!(version = VERSION, "Starting release notes API");
            runtime.block_on(release_api::run(config.api, VERSION))?;
            Ok(())
        }
        CliCommand::Analyze(args) => runtime.block_on(analyze(config, args)),
    }
}

async fn analyze(config: Config, args: AnalyzeArgs) -> Result<(), CliError> {
    let start = Instant::now();
    // Always local: credentials come from the shell environment.
    let creds = ConfigResolver::new(Arc::new(ProcessEnvironment))
        .resolve(&PartialCredentials::default(), RuntimeMode::Local)?;
    let collaborators = build_collaborators(&config.api)?;

    let issue = collaborators
        .tracker
        .get_issue(&creds, &args.issue_key)
        .await?;
    let publish = config.api.publish_pages && !args.no_publish;
    let report = process_issue(&collaborators, &creds, issue, None, publish).await?;

    let response = SingleIssueResponse::new(report, start.elapsed().as_secs_f64());
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Installs the fmt subscriber, plus the sentry layer when a DSN is set. The
/// returned guard flushes sentry on drop.
fn init_logging(logging: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let guard = logging.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: Some(VERSION.into()),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

fn init_metrics(common: &CommonConfig) -> Result<(), CliError> {
    let Some(MetricsConfig {
        statsd_host,
        statsd_port,
        prefix,
    }) = &common.metrics
    else {
        return Ok(());
    };

    let recorder = StatsdBuilder::from(statsd_host.as_str(), *statsd_port)
        .build(Some(prefix.as_str()))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    shared::metrics_defs::describe_all(release_api::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe_all(atlassian::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe_all(analyzer::metrics_defs::ALL_METRICS);
    tracing::info!(%statsd_host, statsd_port, "Metrics enabled");
    Ok(())
}
