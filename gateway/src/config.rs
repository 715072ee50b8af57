use auth::AuthSecret;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("At least one admin secret is required")]
    MissingSecrets,

    #[error("Duplicate project id: {0}")]
    DuplicateProject(String),

    #[error("Runner url has no host: {0}")]
    InvalidRunnerUrl(Url),
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AdminConfig {
    pub secrets: Vec<AuthSecret>,
}

fn default_runner_timeout() -> u64 {
    60
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RunnerConfig {
    /// Where the runner listens. Without it, runner requests are rejected
    /// and list requests answer with an empty result.
    pub url: Option<Url>,
    /// Seconds to wait for the runner's response headers
    #[serde(default = "default_runner_timeout")]
    pub timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            url: None,
            timeout_secs: default_runner_timeout(),
        }
    }
}

impl RunnerConfig {
    /// The runner's `host:port`.
    pub fn addr(&self) -> Option<String> {
        let url = self.url.as_ref()?;
        let host = url.host_str()?;
        match url.port_or_known_default() {
            Some(port) => Some(format!("{host}:{port}")),
            None => Some(host.to_string()),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct IntegrationsConfig {
    /// YAML file integrations are persisted to. Kept in memory when unset.
    pub store_path: Option<PathBuf>,
}

/// A project config file loaded at startup.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ProjectSource {
    pub id: String,
    pub path: PathBuf,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
    /// `EnvFilter` directives. `RUST_LOG` takes precedence.
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

fn default_cluster_id() -> String {
    "default".into()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub listener: Listener,
    pub admin_listener: Listener,
    #[serde(default = "default_cluster_id")]
    pub cluster_id: String,
    pub admin: AdminConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub integrations: IntegrationsConfig,
    #[serde(default)]
    pub projects: Vec<ProjectSource>,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.admin.secrets.is_empty() {
            return Err(ValidationError::MissingSecrets);
        }

        if let Some(url) = &self.runner.url
            && url.host_str().is_none()
        {
            return Err(ValidationError::InvalidRunnerUrl(url.clone()));
        }

        let mut ids = HashSet::new();
        for project in &self.projects {
            if !ids.insert(&project.id) {
                return Err(ValidationError::DuplicateProject(project.id.clone()));
            }
        }

        Ok(())
    }
}
