use crate::queue::{Features, MetadataOptions, QueueOptions};
use crate::sender::ClientConfig;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable holding an inline TOML configuration.
pub const INLINE_CONFIG_ENV: &str = "RASK_REMOTE_WRITE_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Remote-write endpoint URL
    #[arg(
        long,
        env = "RASK_REMOTE_WRITE_ENDPOINT",
        default_value = "http://localhost:9090/api/v1/write"
    )]
    pub endpoint: String,

    /// Name of the remote storage, used in logs and metric labels
    #[arg(long, env = "REMOTE_NAME", default_value = "default")]
    pub remote_name: String,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "REMOTE_TIMEOUT_MS", default_value = "30000")]
    pub timeout_ms: u64,

    /// Connection timeout in milliseconds
    #[arg(long, env = "CONNECTION_TIMEOUT_MS", default_value = "10000")]
    pub connection_timeout_ms: u64,

    /// Maximum idle HTTP connections kept per host
    #[arg(long, env = "MAX_CONNECTIONS", default_value = "20")]
    pub max_connections: usize,

    /// User-Agent header (defaults to rask-remote-write/<version>)
    #[arg(long, env = "REMOTE_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Retry requests rejected with HTTP 429
    #[arg(long, env = "RETRY_ON_RATE_LIMIT")]
    pub retry_on_rate_limit: bool,

    /// Forward exemplars
    #[arg(long, env = "SEND_EXEMPLARS")]
    pub send_exemplars: bool,

    /// Forward native histograms
    #[arg(long, env = "SEND_NATIVE_HISTOGRAMS")]
    pub send_native_histograms: bool,

    /// Maximum series per write request
    #[arg(long, env = "MAX_SAMPLES_PER_SEND", default_value = "2000")]
    pub max_samples_per_send: usize,

    /// Deadline for a whole metadata send in milliseconds
    #[arg(long, env = "BATCH_SEND_DEADLINE_MS", default_value = "5000")]
    pub batch_send_deadline_ms: u64,

    /// Initial retry backoff in milliseconds
    #[arg(long, env = "MIN_BACKOFF_MS", default_value = "30")]
    pub min_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[arg(long, env = "MAX_BACKOFF_MS", default_value = "5000")]
    pub max_backoff_ms: u64,

    /// Maximum metadata entries per write request
    #[arg(long, env = "METADATA_MAX_SAMPLES_PER_SEND", default_value = "2000")]
    pub metadata_max_samples_per_send: usize,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// NDJSON input file; stdin when omitted
    #[arg(long, env = "INPUT_PATH")]
    pub input: Option<PathBuf>,

    /// Print the metric exposition after dispatching
    #[arg(long, env = "PRINT_METRICS")]
    pub print_metrics: bool,

    /// Configuration file path (optional)
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Derived fields (not CLI arguments)
    #[serde(skip)]
    #[arg(skip)]
    pub queue: QueueOptions,

    #[serde(skip)]
    #[arg(skip)]
    pub metadata: MetadataOptions,

    #[serde(skip)]
    #[arg(skip)]
    pub features: Features,
}

impl Default for Config {
    fn default() -> Self {
        let queue = QueueOptions::default();
        let metadata = MetadataOptions::default();
        Self {
            endpoint: "http://localhost:9090/api/v1/write".to_string(),
            remote_name: "default".to_string(),
            timeout_ms: 30_000,
            connection_timeout_ms: 10_000,
            max_connections: 20,
            user_agent: None,
            retry_on_rate_limit: false,
            send_exemplars: false,
            send_native_histograms: false,
            max_samples_per_send: queue.max_samples_per_send,
            batch_send_deadline_ms: queue.batch_send_deadline.as_millis() as u64,
            min_backoff_ms: queue.min_backoff.as_millis() as u64,
            max_backoff_ms: queue.max_backoff.as_millis() as u64,
            metadata_max_samples_per_send: metadata.max_samples_per_send,
            log_level: LogLevel::Info,
            log_format: LogFormat::Compact,
            input: None,
            print_metrics: false,
            config_file: None,
            queue,
            metadata,
            features: Features::default(),
        }
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Config::parse_from(args);
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the configuration from the command line and the environment.
    ///
    /// An inline TOML document in `RASK_REMOTE_WRITE_CONFIG` wins, then a
    /// `--config-file`, then the parsed arguments themselves.
    pub fn from_args_and_env<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let inline = std::env::var(INLINE_CONFIG_ENV).ok();
        Self::resolve(Config::parse_from(args), inline.as_deref())
    }

    pub fn resolve(cli: Config, inline: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(inline) = inline {
            return Self::from_toml_str(inline);
        }
        if let Some(path) = &cli.config_file {
            return Self::from_file(path);
        }

        let mut config = cli;
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn post_process(&mut self) -> Result<(), ConfigError> {
        self.queue = QueueOptions {
            max_samples_per_send: self.max_samples_per_send,
            batch_send_deadline: Duration::from_millis(self.batch_send_deadline_ms),
            min_backoff: Duration::from_millis(self.min_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        };
        self.metadata = MetadataOptions {
            max_samples_per_send: self.metadata_max_samples_per_send,
        };
        self.features = Features {
            send_exemplars: self.send_exemplars,
            send_native_histograms: self.send_native_histograms,
        };
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid endpoint URL '{}': {}", self.endpoint, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "Endpoint '{}' must use http or https",
                self.endpoint
            )));
        }

        if self.remote_name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "Remote name must not be empty".to_string(),
            ));
        }

        if self.timeout_ms == 0 || self.connection_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        self.queue
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        self.metadata
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        Ok(())
    }

    pub fn to_client_config(&self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            endpoint: self.endpoint.clone(),
            remote_name: self.remote_name.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            connection_timeout: Duration::from_millis(self.connection_timeout_ms),
            max_connections: self.max_connections,
            keep_alive_timeout: defaults.keep_alive_timeout,
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            retry_on_rate_limit: self.retry_on_rate_limit,
        }
    }
}
