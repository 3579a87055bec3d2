//! Metric names and descriptions.
//!
//! Every counter emitted by the router is named here so that the daemon
//! can describe them once at startup.
//!
//! # Naming
//!
//! - prefix: `critical_`
//! - suffix: `_total` for counters
//!
//! ```ignore
//! metrics::counter!(critical_core::metrics::RECORDS_RECEIVED_TOTAL).increment(1);
//! ```

// ─── label keys ──────────────────────────────────────────────────────

/// Sender kind label key (telegram, mail, terminal)
pub const LABEL_SENDER: &str = "sender";

/// Outcome label key (delivered, suppressed, failed)
pub const LABEL_RESULT: &str = "result";

/// Static filter kind label key
pub const LABEL_FILTER: &str = "filter";

// ─── consumption ─────────────────────────────────────────────────────

/// Stream payloads received by all workers (counter)
pub const RECORDS_RECEIVED_TOTAL: &str = "critical_records_received_total";

/// Payloads that failed to decode into a record (counter)
pub const DECODE_ERRORS_TOTAL: &str = "critical_decode_errors_total";

/// Transport errors returned by `consume` (counter)
pub const CONSUME_ERRORS_TOTAL: &str = "critical_consume_errors_total";

/// Running partition workers (gauge)
pub const WORKERS_ACTIVE: &str = "critical_workers_active";

// ─── handler ─────────────────────────────────────────────────────────

/// Records rejected by the static filter chain (counter, label: filter)
pub const RECORDS_FILTERED_TOTAL: &str = "critical_records_filtered_total";

/// Records formatted and dispatched (counter)
pub const RECORDS_DISPATCHED_TOTAL: &str = "critical_records_dispatched_total";

// ─── delivery ────────────────────────────────────────────────────────

/// Per-receiver delivery outcomes (counter, labels: sender, result)
pub const DELIVERIES_TOTAL: &str = "critical_deliveries_total";

/// Rate-limit responses that triggered a timed retry (counter, label: sender)
pub const DELIVERY_RETRIES_TOTAL: &str = "critical_delivery_retries_total";

/// Suppression lookups that failed and were treated as "not suppressed" (counter)
pub const SUPPRESSION_LOOKUP_ERRORS_TOTAL: &str = "critical_suppression_lookup_errors_total";

/// Registers descriptions for every metric above.
///
/// Safe to call without an installed recorder.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        RECORDS_RECEIVED_TOTAL,
        "Total number of stream payloads received by partition workers"
    );
    describe_counter!(
        DECODE_ERRORS_TOTAL,
        "Total number of payloads that could not be decoded into a GELF record"
    );
    describe_counter!(
        CONSUME_ERRORS_TOTAL,
        "Total number of transport errors while consuming the stream"
    );
    describe_gauge!(WORKERS_ACTIVE, "Number of running partition workers");
    describe_counter!(
        RECORDS_FILTERED_TOTAL,
        "Total number of records rejected by the static filter chain"
    );
    describe_counter!(
        RECORDS_DISPATCHED_TOTAL,
        "Total number of records formatted and dispatched to senders"
    );
    describe_counter!(
        DELIVERIES_TOTAL,
        "Total number of per-receiver delivery outcomes"
    );
    describe_counter!(
        DELIVERY_RETRIES_TOTAL,
        "Total number of rate-limited deliveries retried after a wait"
    );
    describe_counter!(
        SUPPRESSION_LOOKUP_ERRORS_TOTAL,
        "Total number of failed suppression store lookups"
    );
}
