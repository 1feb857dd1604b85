// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the ferrodns DNS reconciliation core.
//!
//! This module contains all numeric and string constants used throughout the
//! codebase. Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for all ferrodns CRDs.
pub const API_GROUP: &str = "dns.gardener.cloud";

/// API version for all ferrodns CRDs.
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version).
pub const API_GROUP_VERSION: &str = "dns.gardener.cloud/v1alpha1";

/// Kind name for `DNSEntry` resource.
pub const KIND_DNS_ENTRY: &str = "DNSEntry";

/// Kind name for `DNSProvider` resource.
pub const KIND_DNS_PROVIDER: &str = "DNSProvider";

/// Kind name for `DNSHostedZonePolicy` resource.
pub const KIND_DNS_HOSTED_ZONE_POLICY: &str = "DNSHostedZonePolicy";

/// Kind name for `DNSAnnotation` resource.
pub const KIND_DNS_ANNOTATION: &str = "DNSAnnotation";

// ============================================================================
// DNS Protocol & Record Constants
// ============================================================================

/// Standard DNS port, used by the RFC2136 and generic remote backends.
pub const DNS_PORT: u16 = 53;

/// Default TTL for a `DNSEntry` when unspecified (spec §3: default 300).
pub const DEFAULT_ENTRY_TTL_SECS: i64 = 300;

/// Minimum allowed `DNSProvider.spec.defaultTTL` (spec §6).
pub const MIN_PROVIDER_DEFAULT_TTL_SECS: i64 = 1;

/// Maximum allowed `DNSProvider.spec.defaultTTL` (spec §6).
pub const MAX_PROVIDER_DEFAULT_TTL_SECS: i64 = 8_640_000;

/// Default rate limiter burst when a `DNSProvider` doesn't specify one.
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

/// Default rate limiter daily request budget when a `DNSProvider` doesn't specify one.
pub const DEFAULT_RATE_LIMIT_REQUESTS_PER_DAY: u32 = 50_000;

/// Default bounded batch size per zone reconcile task (spec §4.7).
pub const DEFAULT_ZONE_BATCH_SIZE: usize = 50;

// ============================================================================
// Entry State Machine Constants (C5) — spec §4.5
// ============================================================================

/// Base retry interval for a `failed(transient)` entry outcome.
pub const ENTRY_RETRY_BASE_SECS: u64 = 2;

/// Cap on the entry retry interval.
pub const ENTRY_RETRY_CAP_SECS: u64 = 600;

/// Default number of `failed` retries before escalating to `Error`.
pub const ENTRY_DEFAULT_MAX_RETRIES: u32 = 7;

// ============================================================================
// Zone State Cache Constants (C4) — spec §4.4
// ============================================================================

/// Default zone state cache TTL, overridable per-zone by `DNSHostedZonePolicy`.
pub const DEFAULT_ZONE_CACHE_TTL_SECS: u64 = 60;

/// Cooldown applied after a reported zone-state conflict before the cache
/// entry is eligible for another refetch.
pub const ZONE_CONFLICT_COOLDOWN_SECS: u64 = 30;

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds).
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Default leader election lease duration (15 seconds).
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Default leader election renew deadline (10 seconds).
pub const DEFAULT_LEASE_RENEW_DEADLINE_SECS: u64 = 10;

/// Default leader election retry period (2 seconds).
pub const DEFAULT_LEASE_RETRY_PERIOD_SECS: u64 = 2;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for the Tokio runtime.
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Default `Controller::concurrency` for the `DNSEntry`/`DNSAnnotation`
/// controllers (spec §4.8: default size 2-8).
pub const DEFAULT_ENTRY_POOL_SIZE: usize = 4;

/// Default `Controller::concurrency` for the `DNSProvider`/`DNSHostedZonePolicy` controllers.
pub const DEFAULT_PROVIDER_POOL_SIZE: usize = 2;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for the Prometheus metrics HTTP server.
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for the Prometheus metrics endpoint.
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for the metrics HTTP server.
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";

#[cfg(test)]
mod constants_tests {
    use super::*;

    #[test]
    fn entry_retry_policy_matches_spec() {
        assert_eq!(ENTRY_RETRY_BASE_SECS, 2);
        assert_eq!(ENTRY_RETRY_CAP_SECS, 600);
        assert_eq!(ENTRY_DEFAULT_MAX_RETRIES, 7);
    }

    #[test]
    fn default_batch_size_matches_spec() {
        assert_eq!(DEFAULT_ZONE_BATCH_SIZE, 50);
    }
}
