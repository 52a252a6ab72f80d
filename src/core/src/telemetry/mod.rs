//! Telemetry: structured logging and read-time metrics.
//!
//! - **Logging**: JSON/pretty/compact `tracing` output with per-module levels
//! - **Metrics**: duration histograms for slice and single-event reads, recorded
//!   through the `metrics` facade so the host process decides where they go
//!
//! # Example
//!
//! ```rust,no_run
//! use esfeed_core::telemetry::{init_logging, init_metrics, LoggingConfig, MetricsConfig};
//!
//! init_logging(&LoggingConfig::default()).expect("Failed to initialize logging");
//! let registry = init_metrics(&MetricsConfig::default()).expect("Failed to initialize metrics");
//! println!("{}", registry.render());
//! ```

pub mod logging;
pub mod metrics;

pub use self::logging::{init_logging, LogFormat, LoggingConfig};
pub use self::metrics::{init_metrics, MetricsConfig, MetricsRegistry, ReadKind, ReadTimer};
