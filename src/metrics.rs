//! One-time registration of the metric series this crate emits.

use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;

/// Idempotent; call from any component that emits metrics.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_cycles_total", "Completed monitoring cycles.");
        describe_counter!(
            "monitor_cycle_errors_total",
            "Cycles that degraded to a heartbeat after an unhandled step error."
        );
        describe_counter!(
            "monitor_topics_detected_total",
            "Mutual topics emitted at or above the confidence floor."
        );
        describe_counter!("poll_items_ingested_total", "Items accepted into windows.");
        describe_counter!("poll_fetch_errors_total", "Transport fetch failures.");
        describe_counter!(
            "poll_rate_limited_total",
            "Rate-limit responses from the transport."
        );
        describe_counter!(
            "oracle_calls_total",
            "Correlation oracle invocations (retries included)."
        );
        describe_counter!(
            "oracle_failures_total",
            "Oracle calls that failed or returned malformed judgments."
        );
        describe_gauge!(
            "monitor_last_cycle_ts",
            "Unix ts when the last cycle finished."
        );
    });
}
