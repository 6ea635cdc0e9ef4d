use release_api::config::Config as ApiConfig;
use serde::Deserialize;
use std::fs::File;

fn default_statsd_prefix() -> String {
    "relnotes".into()
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_statsd_prefix")]
    pub prefix: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
    /// Default filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            sentry_dsn: None,
            level: default_log_level(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub api: ApiConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data: Config = serde_yaml::from_reader(file)?;
        data.api.validate()?;

        Ok(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] release_api::config::ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    const API_YAML: &str = r#"
            api:
                listener:
                    host: 0.0.0.0
                    port: 8080
                admin_listener:
                    host: 0.0.0.0
                    port: 8081
                batch:
                    max_concurrency: 3
                analyzer:
                    endpoint: https://example.openai.azure.com/
                    deployment: gpt-4o
            "#;

    #[test]
    fn api_config() {
        let tmp = write_tmp_file(API_YAML);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.api.listener.port, 8080);
        assert_eq!(config.api.batch.max_concurrency, 3);
        assert_eq!(config.api.analyzer.deployment, "gpt-4o");
        assert_eq!(config.common.metrics, None);
        assert_eq!(config.common.logging, LoggingConfig::default());
    }

    #[test]
    fn common_config() {
        let yaml = format!(
            r#"
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            logging:
                sentry_dsn: https://key@sentry.example.com/1
                level: debug
            {}"#,
            API_YAML.trim_start()
        );
        let tmp = write_tmp_file(&yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        let metrics = config.common.metrics.expect("metrics config");
        assert_eq!(metrics.statsd_port, 8125);
        assert_eq!(metrics.prefix, "relnotes");
        assert_eq!(config.common.logging.level, "debug");
        assert!(config.common.logging.sentry_dsn.is_some());
    }

    #[test]
    fn invalid_config() {
        let tmp = write_tmp_file(&API_YAML.replace("max_concurrency: 3", "max_concurrency: 0"));
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::Invalid(_))
        ));

        let tmp = write_tmp_file("api: [");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::ParseError(_))
        ));

        assert!(matches!(
            Config::from_file(std::path::Path::new("/nonexistent/relnotes.yaml")),
            Err(ConfigError::LoadError(_))
        ));
    }
}
