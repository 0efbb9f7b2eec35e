//! Observability utilities for the phrase recommendation service.
//!
//! - Prometheus recorder installation and the `/metrics` handler
//! - [`PhraseMetrics`] for queries, embedder calls, training and reindex runs
//! - Axum middleware for per-route request metrics
//!
//! ```rust,ignore
//! use observability::{init_metrics, metrics_handler, PhraseMetrics};
//!
//! init_metrics()?;
//! PhraseMetrics::record_query("ok", 10, elapsed);
//!
//! let app = Router::new().route("/metrics", get(metrics_handler));
//! ```

pub mod middleware;
pub mod phrases;

pub use middleware::metrics_middleware;
pub use phrases::PhraseMetrics;

pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder.
///
/// Subsequent calls return the handle created by the first one.
pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
    METRICS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics recorder initialized");
        register_metric_descriptions();
        Ok(handle)
    })
}

pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Axum handler for `GET /metrics`.
pub async fn metrics_handler() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "http_requests_errors_total",
        "Total number of HTTP request errors"
    );

    describe_counter!(
        "phrase_queries_total",
        "Recommendation queries by outcome"
    );
    describe_histogram!(
        "phrase_query_duration_seconds",
        "Recommendation query duration including the embedder call"
    );
    describe_counter!("embed_calls_total", "Embedder subprocess calls by outcome");
    describe_histogram!(
        "embed_call_duration_seconds",
        "Embedder subprocess wall time"
    );
    describe_counter!(
        "embed_tokens_dropped_total",
        "Embedder output tokens that did not parse as floats"
    );
    describe_counter!("training_runs_total", "Trainer runs by outcome");
    describe_histogram!("training_duration_seconds", "Trainer wall time");
    describe_counter!("reindex_runs_total", "Reindex runs by outcome");
    describe_histogram!("reindex_duration_seconds", "Reindex wall time");
    describe_counter!(
        "reindex_rows_skipped_total",
        "Item dump rows skipped during reindex"
    );
    describe_gauge!("indexed_items", "Records written by the last reindex");
    describe_counter!(
        "pipeline_job_transitions_total",
        "Training job state transitions"
    );
    describe_gauge!(
        "pipeline_jobs_pending",
        "Training jobs queued or running"
    );
}
