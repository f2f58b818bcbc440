use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::clients::backend::Operation;
use crate::types::query::Table;

pub const SWIPES_TOTAL: &str = "meetmiles_swipes_total";
pub const LIKES_TOTAL: &str = "meetmiles_likes_total";
pub const MATCHES_TOTAL: &str = "meetmiles_matches_total";
pub const MESSAGES_SENT_TOTAL: &str = "meetmiles_messages_sent_total";
pub const PUSH_TOTAL: &str = "meetmiles_push_total";
pub const BACKEND_ERRORS_TOTAL: &str = "meetmiles_backend_errors_total";

/// Install the Prometheus recorder. Call once per process.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

/// Count a failed backend call. The failure itself is logged by the caller.
pub fn record_backend_error(table: Table, op: Operation) {
    counter!(BACKEND_ERRORS_TOTAL, "table" => table.as_str(), "op" => op.as_str()).increment(1);
}

pub fn record_push(outcome: &'static str) {
    counter!(PUSH_TOTAL, "outcome" => outcome).increment(1);
}
