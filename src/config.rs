//! Layered configuration: built-in defaults, then an optional YAML file, then
//! the command line and environment.

use crate::{
    args::Args,
    collector::{
        FailurePolicy,
        MetricKind,
    },
};
use config::{
    ConfigError,
    File,
    FileFormat,
};
use newrelic_client::{
    ApiKey,
    NewRelicClient,
    RemoteError,
};
use serde::{
    Deserialize,
    Deserializer,
};
use std::{
    net::{
        AddrParseError,
        SocketAddr,
    },
    time::Duration,
};
use url::Url;

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

/// Reserved for health checks.
pub const HEALTH_PATH: &str = "/healthz";

#[derive(Clone, Debug, Deserialize)]
pub struct ExporterConfig {
    application: String,
    api_key: ApiKey,
    pub api_url: Url,
    #[serde(deserialize_with = "deserialize_duration")]
    pub request_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub connect_timeout: Duration,
    #[serde(deserialize_with = "deserialize_listen")]
    pub listen: SocketAddr,
    pub metrics_path: String,
    pub metric_kind: MetricKind,
    pub failure_policy: FailurePolicy,
}

impl ExporterConfig {
    pub fn new(args: &Args) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Yaml));

        if let Some(path) = &args.config {
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Yaml).required(true));
        }

        let config: Self = builder
            .set_override_option("application", args.application.clone())?
            .set_override_option("api_key", args.api_key.clone())?
            .set_override_option("api_url", args.api_url.as_ref().map(Url::to_string))?
            .set_override_option("request_timeout", args.request_timeout.clone())?
            .set_override_option("connect_timeout", args.connect_timeout.clone())?
            .set_override_option("listen", args.listen.clone())?
            .set_override_option("metrics_path", args.metrics_path.clone())?
            .set_override_option("metric_kind", args.metric_kind.map(|kind| kind.as_ref().to_string()))?
            .set_override_option("failure_policy", args.failure_policy.map(|policy| policy.as_ref().to_string()))?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::Message(
                "a New Relic API key is required (--api-key or NEW_RELIC_API_KEY)".to_string(),
            ));
        }
        if !self.metrics_path.starts_with('/') {
            return Err(ConfigError::Message(format!(
                "metrics path must start with '/', got '{}'",
                self.metrics_path
            )));
        }
        // Route syntax (captures, wildcards) would change what the router matches.
        if self.metrics_path.contains(['{', '}', '*', ':']) {
            return Err(ConfigError::Message(format!(
                "metrics path must be a literal path, got '{}'",
                self.metrics_path
            )));
        }
        if self.metrics_path == HEALTH_PATH {
            return Err(ConfigError::Message(format!("metrics path cannot be {HEALTH_PATH}")));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Message("request timeout must be greater than zero".to_string()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Message("connect timeout must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// The monitored application, exactly as configured. Optional only for
    /// commands that do not look one up.
    pub fn application(&self) -> Result<&str, ConfigError> {
        if self.application.trim().is_empty() {
            return Err(ConfigError::Message(
                "a New Relic application name is required (--application or NEW_RELIC_APPLICATION)".to_string(),
            ));
        }
        Ok(&self.application)
    }

    pub fn client(&self) -> Result<NewRelicClient, RemoteError> {
        NewRelicClient::builder(self.api_key.clone())
            .base_url(self.api_url.clone())
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .build()
    }
}

/// Accepts `host:port`, `:port` (all interfaces) or a bare port.
fn parse_listen(value: &str) -> Result<SocketAddr, AddrParseError> {
    let value = value.trim();
    if let Ok(port) = value.parse::<u16>() {
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    match value.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}").parse(),
        None => value.parse(),
    }
}

fn deserialize_listen<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SocketAddr, D::Error> {
    let value = String::deserialize(deserializer)?;
    parse_listen(&value).map_err(|err| serde::de::Error::custom(format!("invalid listen address '{value}': {err}")))
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let value = String::deserialize(deserializer)?;
    humantime::parse_duration(&value)
        .map_err(|err| serde::de::Error::custom(format!("invalid duration '{value}': {err}")))
}
