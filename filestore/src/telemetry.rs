// Structured logging and metrics for filestore operations

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::errors::FilestoreError;
use crate::models::FilestoreKind;

/// Initialize structured logging
///
/// - JSON or human-readable formatting
/// - Log level from `RUST_LOG`, falling back to the configured level
/// - Thread ids, since every remote call blocks its caller's thread
pub fn init_logging(log_level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let registry = tracing_subscriber::registry();
    if json {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(env_filter);
        registry
            .with(json_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        let human_layer = fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_filter(env_filter);
        registry
            .with(human_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(log_level = log_level, json = json, "Structured logging initialized");
    Ok(())
}

/// Register metric descriptions with whatever recorder the host installed
pub fn describe_metrics() {
    describe_counter!(
        "filestore_remote_calls_total",
        "Remote filestore operations by backend, operation and outcome"
    );
    describe_histogram!(
        "filestore_tree_children",
        "Number of children attached to a built tree level"
    );
    describe_counter!(
        "filestore_export_links_checked_total",
        "Export plan links verified, by outcome"
    );
}

/// Outcome label for a remote call
fn outcome_label<T>(result: &Result<T, FilestoreError>) -> String {
    match result {
        Ok(_) => "ok".to_string(),
        Err(e) => e.kind().to_string(),
    }
}

#[inline]
pub fn record_remote_call<T>(
    kind: FilestoreKind,
    operation: &'static str,
    result: &Result<T, FilestoreError>,
) {
    counter!(
        "filestore_remote_calls_total",
        "kind" => kind.as_str(),
        "operation" => operation,
        "outcome" => outcome_label(result)
    )
    .increment(1);
}

#[inline]
pub fn record_tree_children(kind: FilestoreKind, children: usize) {
    histogram!("filestore_tree_children", "kind" => kind.as_str()).record(children as f64);
}

#[inline]
pub fn record_link_checked(verified: bool) {
    let outcome = if verified { "verified" } else { "error" };
    counter!("filestore_export_links_checked_total", "outcome" => outcome).increment(1);
}
