// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the ferrodns DNS reconciliation core.
//!
//! This module provides comprehensive metrics collection with the namespace
//! prefix `ferrodns` (prometheus-safe).
//!
//! # Metrics categories
//!
//! - **Reconciliation metrics** — track reconciliation operations and outcomes.
//! - **Provider operation metrics (C3)** — list-zones, list-records,
//!   update-records, delete-records, partial-list-records, tagged by
//!   provider type and zone id, per spec §4.3.
//! - **Entry/zone state metrics** — gauges for entry state machine
//!   populations and per-zone lock acquisitions.
//! - **Error metrics** — track error conditions and their taxonomy kind.
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrodns::metrics::{METRICS_REGISTRY, record_reconciliation_success};
//!
//! record_reconciliation_success("DNSEntry", std::time::Duration::from_secs(1));
//! ```

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all ferrodns metrics (prometheus-safe).
const METRICS_NAMESPACE: &str = "ferrodns";

/// Global Prometheus metrics registry; every metric below self-registers here.
/// Exposed via the `/metrics` endpoint (see `src/main.rs`).
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation metrics
// ============================================================================

/// Total reconciliations by resource type and outcome.
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by resource type and status",
    );
    let counter = CounterVec::new(opts, &["resource_type", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds, by resource type.
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by resource type",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Total requeue operations, by resource type and reason.
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_requeues_total"),
        "Total number of requeue operations by resource type and reason",
    );
    let counter = CounterVec::new(opts, &["resource_type", "reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Provider operation metrics (C3) — spec §4.3
// ============================================================================

/// Count of `getZones` calls, by provider type.
pub static PROVIDER_LIST_ZONES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_provider_list_zones_total"),
        "Total getZones calls by provider type",
    );
    let counter = CounterVec::new(opts, &["provider_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Count of `getZoneState` calls, by provider type and zone id.
pub static PROVIDER_LIST_RECORDS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_provider_list_records_total"),
        "Total getZoneState calls by provider type and zone",
    );
    let counter = CounterVec::new(opts, &["provider_type", "zone_id"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Count of record sets created or updated via `executeRequests`.
pub static PROVIDER_UPDATE_RECORDS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_provider_update_records_total"),
        "Total record sets created/updated by provider type and zone",
    );
    let counter = CounterVec::new(opts, &["provider_type", "zone_id"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Count of record sets deleted via `executeRequests`.
pub static PROVIDER_DELETE_RECORDS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_provider_delete_records_total"),
        "Total record sets deleted by provider type and zone",
    );
    let counter = CounterVec::new(opts, &["provider_type", "zone_id"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Count of `getZoneState` calls that returned a truncated/paginated result.
pub static PROVIDER_PARTIAL_LIST_RECORDS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_provider_partial_list_records_total"),
        "Total partial (paginated) getZoneState results by provider type and zone",
    );
    let counter = CounterVec::new(opts, &["provider_type", "zone_id"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Entry state machine & zone lock metrics
// ============================================================================

/// Number of `DNSEntry` resources currently in each state.
pub static ENTRY_STATE_COUNT: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_entry_state_count"),
        "Number of DNSEntry resources currently in each state",
    );
    let gauge = GaugeVec::new(opts, &["state"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Total per-zone lock acquisitions (C8, spec §4.7/§5's "at most one task
/// per zone at a time"), by zone id — a contention signal: a zone whose
/// count grows much faster than its entry count is serializing more
/// reconciles than expected.
pub static ZONE_LOCK_ACQUIRED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_zone_lock_acquired_total"),
        "Total per-zone serialization lock acquisitions",
    );
    let counter = CounterVec::new(opts, &["zone_id"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Error metrics
// ============================================================================

/// Total errors, by resource type and taxonomy kind (spec §7).
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by resource type and error kind",
    );
    let counter = CounterVec::new(opts, &["resource_type", "error_kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Leader election metrics
// ============================================================================

/// Total leader election events, by status.
pub static LEADER_ELECTIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_leader_elections_total"),
        "Total number of leader election events by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Current leader election status (1 = leader, 0 = follower), by pod name.
pub static LEADER_STATUS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_leader_status"),
        "Current leader election status (1 = leader, 0 = follower)",
    );
    let gauge = GaugeVec::new(opts, &["pod_name"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// A cheap, cloneable handle to the global metrics registry.
///
/// All recording functions in this module operate on process-global
/// `LazyLock` statics, so `Metrics` itself carries no state — it exists so
/// [`crate::context::Context`] has something concrete to hold and pass
/// around, the way the teacher's context threads a metrics handle to every
/// reconciler rather than having reconcilers reach for globals directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct Metrics;

impl Metrics {
    /// Record a successful reconciliation.
    pub fn record_reconciliation_success(&self, resource_type: &str, duration: Duration) {
        record_reconciliation_success(resource_type, duration);
    }

    /// Record a failed reconciliation.
    pub fn record_reconciliation_error(&self, resource_type: &str, duration: Duration) {
        record_reconciliation_error(resource_type, duration);
    }

    /// Record a reconciliation requeue.
    pub fn record_reconciliation_requeue(&self, resource_type: &str, reason: &str) {
        record_reconciliation_requeue(resource_type, reason);
    }

    /// Record an error tagged with its taxonomy kind (spec §7).
    pub fn record_error(&self, resource_type: &str, error_kind: &str) {
        record_error(resource_type, error_kind);
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Record a successful reconciliation.
pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation.
pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a reconciliation requeue.
pub fn record_reconciliation_requeue(resource_type: &str, reason: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "requeue"])
        .inc();
    REQUEUE_TOTAL
        .with_label_values(&[resource_type, reason])
        .inc();
}

/// Record an error tagged with its taxonomy kind (spec §7).
pub fn record_error(resource_type: &str, error_kind: &str) {
    ERRORS_TOTAL
        .with_label_values(&[resource_type, error_kind])
        .inc();
}

/// Record a provider `getZones` call.
pub fn record_provider_list_zones(provider_type: &str) {
    PROVIDER_LIST_ZONES_TOTAL
        .with_label_values(&[provider_type])
        .inc();
}

/// Record a provider `getZoneState` call, and whether it was paginated/partial.
pub fn record_provider_list_records(provider_type: &str, zone_id: &str, partial: bool) {
    PROVIDER_LIST_RECORDS_TOTAL
        .with_label_values(&[provider_type, zone_id])
        .inc();
    if partial {
        PROVIDER_PARTIAL_LIST_RECORDS_TOTAL
            .with_label_values(&[provider_type, zone_id])
            .inc();
    }
}

/// Record `n` record sets created or updated in a zone.
pub fn record_provider_update_records(provider_type: &str, zone_id: &str, n: u64) {
    PROVIDER_UPDATE_RECORDS_TOTAL
        .with_label_values(&[provider_type, zone_id])
        .inc_by(n as f64);
}

/// Record `n` record sets deleted in a zone.
pub fn record_provider_delete_records(provider_type: &str, zone_id: &str, n: u64) {
    PROVIDER_DELETE_RECORDS_TOTAL
        .with_label_values(&[provider_type, zone_id])
        .inc_by(n as f64);
}

/// Set the current count of entries in a given state.
pub fn set_entry_state_count(state: &str, count: i64) {
    ENTRY_STATE_COUNT
        .with_label_values(&[state])
        .set(count as f64);
}

/// Record one per-zone serialization lock acquisition.
pub fn record_zone_lock_acquired(zone_id: &str) {
    ZONE_LOCK_ACQUIRED_TOTAL.with_label_values(&[zone_id]).inc();
}

/// Record leader election acquired.
pub fn record_leader_elected(pod_name: &str) {
    LEADER_ELECTIONS_TOTAL
        .with_label_values(&["acquired"])
        .inc();
    LEADER_STATUS.with_label_values(&[pod_name]).set(1.0);
}

/// Record leader election lost.
pub fn record_leader_lost(pod_name: &str) {
    LEADER_ELECTIONS_TOTAL.with_label_values(&["lost"]).inc();
    LEADER_STATUS.with_label_values(&[pod_name]).set(0.0);
}

/// Gather and encode all metrics in Prometheus text format.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_reconciliation_success_updates_counter_and_histogram() {
        let resource_type = "TestDNSEntry";
        record_reconciliation_success(resource_type, Duration::from_millis(500));

        let counter = RECONCILIATION_TOTAL.with_label_values(&[resource_type, "success"]);
        assert!(counter.get() > 0.0);

        let histogram = RECONCILIATION_DURATION_SECONDS.with_label_values(&[resource_type]);
        assert!(histogram.get_sample_count() > 0);
    }

    #[test]
    fn record_provider_list_records_tracks_partial() {
        record_provider_list_records("mock", "zone-partial-test", true);
        let counter = PROVIDER_PARTIAL_LIST_RECORDS_TOTAL
            .with_label_values(&["mock", "zone-partial-test"]);
        assert!(counter.get() > 0.0);
    }

    #[test]
    fn gather_metrics_contains_namespace_prefix() {
        record_reconciliation_success("GatherTest", Duration::from_millis(100));

        let metrics_text = gather_metrics().expect("gather should succeed");
        assert!(metrics_text.contains("ferrodns"));
        assert!(metrics_text.contains("reconciliations_total"));
    }
}
