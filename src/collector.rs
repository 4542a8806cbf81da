//! The scrape contract: one collector per monitored application.
//!
//! Every scrape takes the collector's lock, asks the [`ApplicationSource`] for
//! the application, and turns the seven summary fields into samples. The lock
//! is held for the whole fetch-and-map sequence, so concurrent scrapes queue up
//! behind each other and each performs its own fetch.

use crate::error::ScrapeError;
use newrelic_client::{
    ApplicationSource,
    ApplicationSummary,
};
use prometheus::{
    core::{
        Collector,
        Desc,
        Describer,
    },
    proto::MetricFamily,
    Counter,
    Gauge,
    Opts,
};
use serde::Deserialize;
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        PoisonError,
    },
    time::Instant,
};
use strum::{
    AsRefStr,
    EnumIter,
    IntoEnumIterator as _,
    IntoStaticStr,
};

pub const NAMESPACE: &str = "newrelic";
pub const APPLICATION_LABEL: &str = "application";

/// The exported fields of [`ApplicationSummary`], in exposition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SummaryField {
    ResponseTime,
    Throughput,
    ErrorRate,
    ApdexTarget,
    ApdexScore,
    HostCount,
    InstanceCount,
}

impl SummaryField {
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn help(self) -> &'static str {
        match self {
            SummaryField::ResponseTime => "The duration of time between a request for service and a response.",
            SummaryField::Throughput => "Requests per minute (RPM)",
            SummaryField::ErrorRate => "Rate of errors responses",
            SummaryField::ApdexTarget => "User specified target for Apdex score",
            SummaryField::ApdexScore => {
                "Industry-standard way to measure users' satisfaction with the response time of an application or \
                 service"
            }
            SummaryField::HostCount => "Number of hosts",
            SummaryField::InstanceCount => "Number of instances",
        }
    }

    pub fn value(self, summary: &ApplicationSummary) -> f64 {
        match self {
            SummaryField::ResponseTime => summary.response_time,
            SummaryField::Throughput => summary.throughput,
            SummaryField::ErrorRate => summary.error_rate,
            SummaryField::ApdexTarget => summary.apdex_target,
            SummaryField::ApdexScore => summary.apdex_score,
            SummaryField::HostCount => summary.host_count,
            SummaryField::InstanceCount => summary.instance_count,
        }
    }
}

/// How samples are typed in the exposition. The summary values can go down,
/// so gauges are the honest choice. `Counter` reproduces the typing of older
/// exporters for dashboards that depend on it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, AsRefStr, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    #[default]
    Gauge,
    Counter,
}

/// What a failed scrape does to the process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, AsRefStr, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and expose no samples for this scrape. The scraper's
    /// staleness handling takes it from there.
    #[default]
    Lenient,
    /// Log the failure and exit with status 1, leaving restarts to the supervisor.
    Strict,
}

impl FailurePolicy {
    fn handle(self, application: &str, err: &ScrapeError) -> Vec<MetricFamily> {
        if err.is_not_found() {
            error!(application, "no New Relic application with this name, check the configuration");
        } else {
            error!(application, error = %err, "failed to load New Relic application");
        }

        match self {
            FailurePolicy::Lenient => Vec::new(),
            FailurePolicy::Strict => {
                error!("failure policy is strict, terminating");
                std::process::exit(1)
            }
        }
    }
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-

/// Name, help and labels of one exported metric.
#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    field: SummaryField,
    opts: Opts,
    desc: Desc,
}

impl MetricDescriptor {
    fn new(field: SummaryField, application: &str) -> prometheus::Result<Self> {
        let opts = Opts::new(field.name(), field.help())
            .namespace(NAMESPACE)
            .const_label(APPLICATION_LABEL, application);
        let desc = opts.describe()?;
        Ok(Self { field, opts, desc })
    }

    /// Fully qualified, e.g. `newrelic_apdex_score`.
    pub fn name(&self) -> &str {
        &self.desc.fq_name
    }

    pub fn help(&self) -> &str {
        &self.desc.help
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.opts.const_labels
    }

    pub fn desc(&self) -> &Desc {
        &self.desc
    }

    fn encode(&self, kind: MetricKind, value: f64) -> prometheus::Result<Vec<MetricFamily>> {
        match kind {
            MetricKind::Gauge => {
                let gauge = Gauge::with_opts(self.opts.clone())?;
                gauge.set(value);
                Ok(gauge.collect())
            }
            MetricKind::Counter => {
                let counter = Counter::with_opts(self.opts.clone())?;
                if value < 0.0 {
                    warn!(metric = self.name(), value, "counters cannot go negative, exposing zero");
                } else {
                    counter.inc_by(value);
                }
                Ok(counter.collect())
            }
        }
    }
}

/// One value produced by a scrape.
#[derive(Debug, Clone, Copy)]
pub struct MetricSample<'a> {
    descriptor: &'a MetricDescriptor,
    value: f64,
}

impl<'a> MetricSample<'a> {
    pub fn name(&self) -> &'a str {
        self.descriptor.name()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn label(&self, name: &str) -> Option<&'a str> {
        self.descriptor.labels().get(name).map(String::as_str)
    }
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-

/// Exposes the summary of one New Relic application.
#[derive(Debug)]
pub struct NewRelicCollector<S> {
    application: String,
    source: Mutex<S>,
    descriptors: Vec<MetricDescriptor>,
    kind: MetricKind,
    policy: FailurePolicy,
}

impl<S: ApplicationSource> NewRelicCollector<S> {
    pub fn new(application: impl Into<String>, source: S) -> prometheus::Result<Self> {
        let application = application.into();
        let descriptors = SummaryField::iter()
            .map(|field| MetricDescriptor::new(field, &application))
            .collect::<prometheus::Result<Vec<_>>>()?;

        Ok(Self {
            application,
            source: Mutex::new(source),
            descriptors,
            kind: MetricKind::default(),
            policy: FailurePolicy::default(),
        })
    }

    pub fn with_metric_kind(mut self, kind: MetricKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The seven descriptors, identical for the lifetime of the collector.
    pub fn describe_metrics(&self) -> &[MetricDescriptor] {
        &self.descriptors
    }

    /// Fetches the application and maps its summary, one sample per
    /// descriptor in descriptor order.
    pub fn collect_metrics(&self) -> Result<Vec<MetricSample<'_>>, ScrapeError> {
        let span = info_span!("scrape", application = %self.application);
        let _entered = span.enter();

        // A scrape that panicked mid-fetch leaves no partial state behind.
        let source = self.source.lock().unwrap_or_else(PoisonError::into_inner);

        let started = Instant::now();
        let app = source.find_application_by_name(&self.application)?;
        debug!(
            elapsed = ?started.elapsed(),
            id = app.id,
            health_status = %app.health_status,
            "fetched application summary"
        );

        let samples = self
            .descriptors
            .iter()
            .map(|descriptor| MetricSample {
                descriptor,
                value: descriptor.field.value(&app.application_summary),
            })
            .collect();

        drop(source);
        Ok(samples)
    }

    fn encode(&self, samples: &[MetricSample<'_>]) -> Result<Vec<MetricFamily>, ScrapeError> {
        let mut families = Vec::with_capacity(samples.len());
        for sample in samples {
            families.extend(sample.descriptor.encode(self.kind, sample.value)?);
        }
        Ok(families)
    }
}

impl<S: ApplicationSource + 'static> Collector for NewRelicCollector<S> {
    fn desc(&self) -> Vec<&Desc> {
        self.descriptors.iter().map(MetricDescriptor::desc).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        match self.collect_metrics().and_then(|samples| self.encode(&samples)) {
            Ok(families) => families,
            Err(err) => self.policy.handle(&self.application, &err),
        }
    }
}
