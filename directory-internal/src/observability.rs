use axum::Router;
use clap::ValueEnum;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::error::{Error, ErrorDetails};

const DEFAULT_LOG_FILTER: &str = "warn,gateway=info,directory_internal=info";
const DEBUG_LOG_FILTER: &str = "warn,gateway=debug,directory_internal=debug";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

fn rust_log_is_set() -> bool {
    std::env::var(EnvFilter::DEFAULT_ENV).is_ok()
}

fn initial_filter() -> EnvFilter {
    // An explicit `RUST_LOG` always wins over our defaults
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Handle for switching on debug logs once the config file has been read.
pub struct DelayedDebugLogs {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl DelayedDebugLogs {
    pub fn enable_debug(&self) -> Result<(), Error> {
        if rust_log_is_set() {
            tracing::debug!("`RUST_LOG` is set, so `gateway.debug` does not change the log filter");
            return Ok(());
        }
        self.handle
            .reload(EnvFilter::new(DEBUG_LOG_FILTER))
            .map_err(|e| {
                Error::new(ErrorDetails::InternalError {
                    message: format!("Failed to enable debug logs: {e}"),
                })
            })
    }
}

/// Install the global `tracing` subscriber. Must be called once, before anything logs.
pub fn setup_logs(log_format: LogFormat) -> Result<DelayedDebugLogs, Error> {
    let (filter, handle) = reload::Layer::new(initial_filter());
    let registry = tracing_subscriber::registry().with(filter);

    let result = match log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    result.map_err(|e| {
        Error::new_without_logging(ErrorDetails::InternalError {
            message: format!("Failed to initialize tracing: {e}"),
        })
    })?;

    Ok(DelayedDebugLogs { handle })
}

fn describe_metrics() {
    metrics::describe_counter!(
        "contact_quota_checks_total",
        "Daily contact quota checks, by result"
    );
    metrics::describe_counter!(
        "contact_views_recorded_total",
        "Contact listing pages charged against a daily quota"
    );
    metrics::describe_counter!(
        "contact_access_outcomes_total",
        "Terminal outcomes of gated contact listing requests"
    );
    metrics::describe_counter!(
        "quota_store_errors_total",
        "Failed quota or listing store round-trips, by store"
    );
}

/// Install the Prometheus recorder. The returned handle renders the `/metrics` body.
pub fn setup_metrics() -> Result<PrometheusHandle, Error> {
    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        Error::new(ErrorDetails::InternalError {
            message: format!("Failed to install Prometheus exporter: {e}"),
        })
    })?;
    describe_metrics();
    Ok(handle)
}

pub trait RouterExt<S> {
    /// Wrap every route registered so far in an HTTP `TraceLayer`.
    fn with_request_tracing(self) -> Self;
}

impl<S> RouterExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_request_tracing(self) -> Self {
        self.layer(
            TraceLayer::new_for_http().on_failure(DefaultOnFailure::new().level(Level::DEBUG)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::from_str("json", true).unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("PRETTY", true).unwrap(), LogFormat::Pretty);
        assert!(LogFormat::from_str("xml", true).is_err());
        assert_eq!(LogFormat::default().to_string(), "pretty");
    }

    #[test]
    fn test_default_filters_parse() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        assert!(EnvFilter::try_new(DEBUG_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_quota_counters_render_in_prometheus_format() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_metrics();
            metrics::counter!("contact_quota_checks_total", "result" => "allowed").increment(3);
            metrics::counter!("contact_access_outcomes_total", "outcome" => "page_locked")
                .increment(1);
        });

        let rendered = handle.render();
        assert!(rendered.contains("contact_quota_checks_total{result=\"allowed\"} 3"));
        assert!(rendered.contains("contact_access_outcomes_total{outcome=\"page_locked\"} 1"));
    }
}
