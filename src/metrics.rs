use anyhow::Result;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all keeps-indexer metrics
const PREFIX: &str = "keeps";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Background Job Metrics
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Total background job executions"),
        &["job", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]),
        &["job"]
    ).expect("Failed to create background_job_duration_seconds metric");

    pub static ref BACKGROUND_JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_running"), "Whether a background job is currently running"),
        &["job"]
    ).expect("Failed to create background_job_running metric");

    pub static ref BACKGROUND_JOB_SKIPPED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_skipped_total"), "Ticks skipped because the job was still running"),
        &["job"]
    ).expect("Failed to create background_job_skipped_total metric");

    pub static ref BACKGROUND_JOB_DISPATCH_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_dispatch_failures_total"), "Dispatches refused by a saturated worker pool"),
        &["job"]
    ).expect("Failed to create background_job_dispatch_failures_total metric");

    // Search Metrics
    pub static ref SEARCH_BULK_ITEMS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_search_bulk_items_total"), "Bulk items sent to the search engine"),
        &["status"]
    ).expect("Failed to create search_bulk_items_total metric");

    pub static ref SEARCH_REBUILDS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_search_rebuilds_total"), "Search index rebuilds"),
        &["status"]
    ).expect("Failed to create search_rebuilds_total metric");

    // Backfill Metrics
    pub static ref BACKFILL_FIELDS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_backfill_fields_total"), "Derived fields processed by the backfill"),
        &["field", "status"]
    ).expect("Failed to create backfill_fields_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_SKIPPED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DISPATCH_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SEARCH_BULK_ITEMS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SEARCH_REBUILDS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKFILL_FIELDS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record a finished background job execution
pub fn record_background_job_execution(job: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job])
        .observe(duration.as_secs_f64());
}

pub fn set_background_job_running(job: &str, running: bool) {
    BACKGROUND_JOB_RUNNING
        .with_label_values(&[job])
        .set(if running { 1.0 } else { 0.0 });
}

pub fn record_background_job_skipped(job: &str) {
    BACKGROUND_JOB_SKIPPED_TOTAL.with_label_values(&[job]).inc();
}

pub fn record_background_job_dispatch_failure(job: &str) {
    BACKGROUND_JOB_DISPATCH_FAILURES_TOTAL
        .with_label_values(&[job])
        .inc();
}

/// Record the outcome of one bulk request
pub fn record_bulk_items(succeeded: usize, failed: usize) {
    SEARCH_BULK_ITEMS_TOTAL
        .with_label_values(&["success"])
        .inc_by(succeeded as f64);
    SEARCH_BULK_ITEMS_TOTAL
        .with_label_values(&["failure"])
        .inc_by(failed as f64);
}

pub fn record_rebuild(status: &str) {
    SEARCH_REBUILDS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_backfill_field(field: &str, status: &str) {
    BACKFILL_FIELDS_TOTAL
        .with_label_values(&[field, status])
        .inc();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve `/metrics` until the process exits.
pub async fn run_metrics_server(port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Metrics available at port {}", port);
    Ok(axum::serve(listener, metrics_router()).await?)
}
