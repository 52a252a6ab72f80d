//! Read-time histograms for feed requests.
//!
//! Every slice read and every single-event read records its duration in
//! seconds, labelled with the client identifier and the target `host:port`.
//! Recording goes through the `metrics` facade: without an installed
//! recorder the calls are no-ops, so the registry stays owned by the host
//! process. [`init_metrics`] is a convenience for processes that want the
//! Prometheus exporter.

use metrics::{describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Histogram for slice (page) reads.
pub const SLICE_READ_TIME: &str = "esfeed_http_reader_slice_read_time";

/// Histogram for single-event reads.
pub const EVENT_READ_TIME: &str = "esfeed_http_reader_event_request_time";

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus recorder
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Buckets for slice reads (seconds); the last bucket matches the default long poll
    #[serde(default = "default_slice_buckets")]
    pub slice_buckets: Vec<f64>,

    /// Buckets for single-event reads (seconds)
    #[serde(default = "default_event_buckets")]
    pub event_buckets: Vec<f64>,

    /// Global labels to add to all metrics
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            slice_buckets: default_slice_buckets(),
            event_buckets: default_event_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    false
}

fn default_slice_buckets() -> Vec<f64> {
    vec![0.01, 0.1, 1.0, 10.0, 30.0]
}

fn default_event_buckets() -> Vec<f64> {
    vec![0.01, 0.1, 1.0, 10.0]
}

/// Handle on the installed exporter, if any.
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// Registry that renders nothing.
    pub fn disabled() -> Self {
        Self {
            prometheus_handle: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Initialize the metrics subsystem.
///
/// # Errors
///
/// Returns an error if the buckets are invalid or a recorder is already
/// installed.
pub fn init_metrics(config: &MetricsConfig) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new();
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    builder = builder
        .set_buckets_for_metric(Matcher::Full(SLICE_READ_TIME.to_string()), &config.slice_buckets)?
        .set_buckets_for_metric(Matcher::Full(EVENT_READ_TIME.to_string()), &config.event_buckets)?;

    let handle = builder.install_recorder()?;
    describe_metrics();

    tracing::info!(labels = config.global_labels.len(), "Metrics initialized");

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_histogram!(SLICE_READ_TIME, Unit::Seconds, "Read time per event slice");
    describe_histogram!(EVENT_READ_TIME, Unit::Seconds, "Time for a single event request");
    describe_counter!("esfeed_errors_total", "Total feed errors by code");
    describe_counter!("esfeed_events_delivered_total", "Events delivered to subscription handlers");
}

/// Which histogram a [`ReadTimer`] records into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    Slice,
    Event,
}

impl ReadKind {
    pub const fn metric_name(&self) -> &'static str {
        match self {
            Self::Slice => SLICE_READ_TIME,
            Self::Event => EVENT_READ_TIME,
        }
    }
}

/// Records the duration of one read when dropped, whatever the outcome.
pub struct ReadTimer {
    start: Instant,
    kind: ReadKind,
    identifier: String,
    host_and_port: String,
}

impl ReadTimer {
    pub fn start(kind: ReadKind, identifier: &str, host_and_port: &str) -> Self {
        Self {
            start: Instant::now(),
            kind,
            identifier: identifier.to_string(),
            host_and_port: host_and_port.to_string(),
        }
    }

    /// Get elapsed time without recording.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ReadTimer {
    fn drop(&mut self) {
        histogram!(
            self.kind.metric_name(),
            "identifier" => self.identifier.clone(),
            "host_and_port" => self.host_and_port.clone(),
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}
