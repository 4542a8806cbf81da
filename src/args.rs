use crate::collector::{
    FailurePolicy,
    MetricKind,
};
use clap::{
    Parser,
    Subcommand,
};
use std::path::PathBuf;
use url::Url;

/// Prometheus exporter for the application summary of a New Relic APM application.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// YAML file layered over the built-in defaults.
    #[arg(long, short, global = true, env = "NEW_RELIC_EXPORTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// The name of the New Relic application.
    #[arg(long, global = true, env = "NEW_RELIC_APPLICATION")]
    pub application: Option<String>,

    /// New Relic REST API key.
    #[arg(long, global = true, env = "NEW_RELIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the REST API, e.g. `https://api.eu.newrelic.com/v2/`.
    #[arg(long, global = true, env = "NEW_RELIC_API_URL")]
    pub api_url: Option<Url>,

    /// Time allowed for a single API request (e.g. "10s", "1m").
    #[arg(long, global = true, env = "NEW_RELIC_REQUEST_TIMEOUT")]
    pub request_timeout: Option<String>,

    /// Time allowed to establish a connection to the API.
    #[arg(long, global = true, env = "NEW_RELIC_CONNECT_TIMEOUT")]
    pub connect_timeout: Option<String>,

    /// Address to serve metrics on. `:9000` listens on all interfaces.
    #[arg(long, global = true, env = "PROMETHEUS_PORT")]
    pub listen: Option<String>,

    /// Path for Prometheus to scrape metrics.
    #[arg(long = "path", global = true, env = "PROMETHEUS_PATH")]
    pub metrics_path: Option<String>,

    /// Metric type used in the exposition.
    #[arg(long, value_enum, global = true, env = "NEW_RELIC_METRIC_KIND")]
    pub metric_kind: Option<MetricKind>,

    /// What to do when a scrape cannot reach New Relic.
    #[arg(long, value_enum, global = true, env = "NEW_RELIC_FAILURE_POLICY")]
    pub failure_policy: Option<FailurePolicy>,

    /// Enable debug logging. `RUST_LOG` takes precedence.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the metrics endpoint (default).
    Serve,
    /// List the applications visible to the API key.
    Applications,
    /// Record a deployment marker on the configured application.
    RecordDeployment(DeploymentArgs),
}

#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct DeploymentArgs {
    /// Revision being deployed, e.g. a commit hash or tag.
    #[arg(long)]
    pub revision: String,

    #[arg(long, default_value = "")]
    pub changelog: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Who deployed.
    #[arg(long, env = "USER", default_value = "")]
    pub user: String,
}

impl Args {
    pub fn command_or_default(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}
