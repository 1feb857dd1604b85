// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for DNS reconciliation.
//!
//! This module defines the four CRDs the reconciliation core watches
//! (spec §6):
//!
//! - [`DNSEntry`] — a namespaced request for a DNS record set.
//! - [`DNSProvider`] — a namespaced credential + domain/zone scope for an
//!   external DNS backend.
//! - [`DNSHostedZonePolicy`] — a cluster-scoped override of zone-selection
//!   and cache behavior.
//! - [`DNSAnnotation`] — a namespaced translation of ingress/service
//!   annotations into entry-equivalent overrides (spec §9 supplement).
//!
//! # Example: Creating a DNSEntry
//!
//! ```rust
//! use ferrodns::crd::{DNSEntrySpec, RecordType};
//!
//! let spec = DNSEntrySpec {
//!     dns_name: "www.example.com".to_string(),
//!     record_type: RecordType::A,
//!     targets: vec!["192.0.2.10".to_string()],
//!     ttl: Some(300),
//!     set_identifier: None,
//!     routing_policy: None,
//!     provider_ref: None,
//!     cname_lookup_interval: None,
//! };
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Shared types
// ============================================================================

/// A Kubernetes `Condition`, as used on every CRD's `status.conditions`.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition. Common types: Ready, Bound, Active, Degraded.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition; one of
    /// the [`crate::errors::ErrorKind::status_reason`] strings, or
    /// `"Ready"`/`"Pending"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message; stable (no correlation IDs or timestamps)
    /// per spec §7's status-update-loop avoidance rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned (RFC3339).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Reference to a `DNSProvider` by name, optionally cross-namespace.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Reference to an arbitrary Kubernetes resource, used by `DNSAnnotation`
/// to name the source object (Ingress, Service, ...) it translates.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

/// Reference to the `Secret` holding provider credentials (spec §6:
/// `secretRef{name,namespace}`). Unlike a generic opaque blob, the keys
/// inside the `Secret`'s `data` map are named per `providerType` (spec §6,
/// "Provider secret keys (per type)") and validated by
/// [`crate::provider::credentials`].
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// The DNS record type a `DNSEntry` requests (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    TXT,
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::TXT => "TXT",
        };
        f.write_str(s)
    }
}

/// Weighted/latency/geolocation/failover routing policy (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutingPolicy {
    /// One of `weighted`, `latency`, `geolocation`, `failover`.
    pub policy_type: String,

    /// Disambiguates multiple entries targeting the same (name, type).
    pub set_identifier: String,

    /// Policy-specific parameters (e.g. `{"weight": "10"}`).
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

// ============================================================================
// DNSEntry
// ============================================================================

/// `DNSEntry` represents a desired DNS record set (spec §3, §6).
///
/// The entry state machine ([`crate::reconcilers::entry`]) drives a
/// `DNSEntry` through `New` → `Pending` → `Ready`/`Invalid`/`Error` based on
/// provider selection (C6), zone reconciliation (C7) outcomes, and the
/// error taxonomy (spec §7).
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dns.gardener.cloud",
    version = "v1alpha1",
    kind = "DNSEntry",
    namespaced,
    shortname = "dnse",
    shortname = "dnsentries",
    doc = "DNSEntry is a request for a DNS record set to be published by a matching DNSProvider.",
    printcolumn = r#"{"name":"DNS Name","type":"string","jsonPath":".spec.dnsName"}"#,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.recordType"}"#,
    printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".status.provider"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "DNSEntryStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSEntrySpec {
    /// Fully-qualified DNS name this entry requests, e.g. `www.example.com`.
    #[schemars(regex(
        pattern = r"^([a-zA-Z0-9_]([a-zA-Z0-9_-]{0,61}[a-zA-Z0-9])?\.)*[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$"
    ))]
    pub dns_name: String,

    /// Record type requested.
    pub record_type: RecordType,

    /// Record values. For `CNAME`, exactly one target is allowed.
    #[serde(default)]
    pub targets: Vec<String>,

    /// TTL in seconds; falls back to the matched provider's `defaultTTL`,
    /// then [`crate::constants::DEFAULT_ENTRY_TTL_SECS`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    /// Disambiguator for multiple entries sharing (`dnsName`, `recordType`);
    /// required when `routingPolicy` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_identifier: Option<String>,

    /// Routing policy for multi-value DNS (weighted/latency/geo/failover).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_policy: Option<RoutingPolicy>,

    /// Pin this entry to a specific `DNSProvider` instead of using C6 selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<ProviderRef>,

    /// CNAME-target resolve-to-address interval in seconds (spec §9
    /// supplement); 0 disables resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname_lookup_interval: Option<i64>,
}

/// `DNSEntry` status, written by the entry reconciler (C5).
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSEntryStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Current state: `New`, `Pending`, `Ready`, `Invalid`, `Error`, `Stale`, `Deleting`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Name of the `DNSProvider` currently serving this entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Id of the hosted zone the entry was published into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Number of consecutive transient-error retries since the last success.
    #[serde(default)]
    pub retry_count: u32,
}

// ============================================================================
// DNSProvider
// ============================================================================

/// Domain/zone inclusion and exclusion filters (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainFilter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Per-provider rate limit configuration (C3).
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    /// Daily request budget, spread evenly with burst allowance.
    pub requests_per_day: u32,
    /// Burst capacity on top of the steady per-day rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,
}

/// `DNSProvider` represents a credentialed connection to an external DNS
/// backend, scoped to a set of domains/zones (spec §1, §6).
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dns.gardener.cloud",
    version = "v1alpha1",
    kind = "DNSProvider",
    namespaced,
    shortname = "dnsp",
    shortname = "dnsproviders",
    doc = "DNSProvider connects the controller to an external DNS backend, scoped to a set of domains.",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Domains","type":"integer","jsonPath":".status.domainCount"}"#
)]
#[kube(status = "DNSProviderStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSProviderSpec {
    /// Backend kind: `route53`, `azure-dns`, `google-clouddns`, `cloudflare-dns`,
    /// `alicloud-dns`, `openstack-designate`, `infoblox-dns`, `netlify-dns`,
    /// `rfc2136`, `remote`, or `mock`.
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Reference to a `Secret` holding backend credentials; omitted for `mock`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeyRef>,

    /// Domains this provider is scoped to serve.
    #[serde(default)]
    pub domains: DomainFilter,

    /// Hosted zone ids this provider is scoped to serve, in addition to `domains`.
    #[serde(default)]
    pub zones: DomainFilter,

    /// Default TTL applied to entries that don't set their own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ttl: Option<i64>,

    /// Rate limit for this provider's API calls (C3).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,

    /// When true, this provider is not selected for new entries but existing
    /// published records are left in place.
    #[serde(default)]
    pub disabled: bool,
}

/// `DNSProvider` status, written by the provider reconciler.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSProviderStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Number of domains currently matched by this provider's `domains`/`zones` filters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_count: Option<i32>,

    /// Hosted zone ids discovered via the last successful `getZones` call.
    #[serde(default)]
    pub zones: Vec<String>,
}

// ============================================================================
// DNSHostedZonePolicy
// ============================================================================

/// Selector matching a set of hosted zones by domain suffix or provider.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZonePolicySelector {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
}

/// `DNSHostedZonePolicy` overrides zone-selection and cache behavior for a
/// matched set of hosted zones, cluster-wide (spec §9 supplement).
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dns.gardener.cloud",
    version = "v1alpha1",
    kind = "DNSHostedZonePolicy",
    doc = "DNSHostedZonePolicy overrides cache TTL and selection priority for a matched set of hosted zones.",
    printcolumn = r#"{"name":"TTL Override","type":"integer","jsonPath":".spec.cacheTtlSeconds"}"#,
    printcolumn = r#"{"name":"Matched Zones","type":"integer","jsonPath":".status.matchedZoneCount"}"#
)]
#[kube(status = "DNSHostedZonePolicyStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSHostedZonePolicySpec {
    /// Which hosted zones this policy applies to.
    pub selector: ZonePolicySelector,

    /// Overrides [`crate::constants::DEFAULT_ZONE_CACHE_TTL_SECS`] for matched zones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_seconds: Option<u64>,

    /// Selection priority when multiple providers could serve the same zone;
    /// higher wins.
    #[serde(default)]
    pub priority: i32,
}

/// `DNSHostedZonePolicy` status, republishing the matched zone set.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSHostedZonePolicyStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_zone_count: Option<i32>,
}

// ============================================================================
// DNSAnnotation
// ============================================================================

/// `DNSAnnotation` translates annotations on a non-DNS source object
/// (Ingress, Service, Gateway) into entry-equivalent overrides without
/// requiring a hand-authored `DNSEntry` (spec §9 supplement).
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dns.gardener.cloud",
    version = "v1alpha1",
    kind = "DNSAnnotation",
    namespaced,
    shortname = "dnsa",
    doc = "DNSAnnotation translates annotations on a referenced source object into DNSEntry-equivalent overrides.",
    printcolumn = r#"{"name":"Resource","type":"string","jsonPath":".spec.resourceRef.name"}"#,
    printcolumn = r#"{"name":"DNS Names","type":"string","jsonPath":".spec.dnsNames"}"#
)]
#[kube(status = "DNSAnnotationStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSAnnotationSpec {
    /// The source object these annotations were collected from.
    pub resource_ref: ResourceRef,

    /// Resolved value of `dns.gardener.cloud/dnsnames`.
    #[serde(default)]
    pub dns_names: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_policy: Option<RoutingPolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    /// Explicit targets, overriding discovery from the source object's status.
    #[serde(default)]
    pub targets: Vec<String>,
}

/// `DNSAnnotation` status.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSAnnotationStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Names of the `DNSEntry` resources this annotation currently projects.
    #[serde(default)]
    pub generated_entries: Vec<String>,
}

#[cfg(test)]
mod crd_tests {
    use super::*;

    #[test]
    fn record_type_displays_as_dns_wire_name() {
        assert_eq!(RecordType::A.to_string(), "A");
        assert_eq!(RecordType::CNAME.to_string(), "CNAME");
    }

    #[test]
    fn dns_entry_spec_round_trips_through_json() {
        let spec = DNSEntrySpec {
            dns_name: "api.example.com".to_string(),
            record_type: RecordType::A,
            targets: vec!["192.0.2.1".to_string()],
            ttl: Some(120),
            set_identifier: None,
            routing_policy: None,
            provider_ref: None,
            cname_lookup_interval: None,
        };
        let json = serde_json::to_string(&spec).expect("serialize");
        assert!(json.contains("\"dnsName\":\"api.example.com\""));
        let back: DNSEntrySpec = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.dns_name, spec.dns_name);
        assert_eq!(back.targets, spec.targets);
    }

    #[test]
    fn domain_filter_defaults_to_empty() {
        let filter = DomainFilter::default();
        assert!(filter.include.is_empty());
        assert!(filter.exclude.is_empty());
    }
}
