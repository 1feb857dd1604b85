// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers with reflector stores.
//!
//! This module provides the core infrastructure for the shared reflector store
//! pattern. All controllers receive an `Arc<Context>` that contains:
//! - the Kubernetes client
//! - reflector stores for all CRD types
//! - the zone state cache (C4), provider registry (C6), rate limiters, and metrics
//!
//! The stores enable O(1) in-memory lookups for selector-based resource lookup,
//! eliminating the need for API queries in watch mappers.

use crate::config::Config;
use crate::crd::{DNSAnnotation, DNSEntry, DNSHostedZonePolicy, DNSProvider};
use crate::metrics::Metrics;
use crate::ratelimit::RateLimiterRegistry;
use crate::registry::ProviderRegistry;
use crate::zonecache::ZoneCache;
use crate::zonelock::ZoneLocks;
use kube::runtime::reflector::Store;
use kube::{Client, ResourceExt};
use std::sync::Arc;

/// Shared context passed to every reconciler and worker.
///
/// This context provides access to:
/// - the Kubernetes client for API operations
/// - reflector stores for efficient O(1) lookups
/// - the zone state cache (C4) and provider registry (C6), both owned objects
///   that encapsulate their locking so workers never touch raw maps directly
/// - per-provider rate limiters (C3) and the Prometheus metrics registry
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for API operations.
    pub client: Client,

    /// Reflector stores for all CRD types.
    pub stores: Stores,

    /// Static configuration loaded at startup.
    pub config: Arc<Config>,

    /// Zone state cache (C4): TTL'd, conflict-aware per-zone record snapshots.
    pub zone_cache: Arc<ZoneCache>,

    /// Provider registry (C6): domain-suffix indexing and entry→(provider,zone) selection.
    pub registry: Arc<ProviderRegistry>,

    /// Per-zone serialization locks (C8): at most one entry reconcile writes
    /// to a given zone at a time, across the whole concurrent reconcile pool.
    pub zone_locks: Arc<ZoneLocks>,

    /// Per-provider token-bucket rate limiters (C3).
    pub rate_limiters: Arc<RateLimiterRegistry>,

    /// Prometheus metrics registry for observability.
    pub metrics: Metrics,
}

/// Collection of all reflector stores for cross-controller queries.
///
/// Each store is populated by a dedicated reflector task (see
/// [`crate::main`]'s bootstrap) and provides in-memory access to resources
/// without further API calls.
#[derive(Clone)]
pub struct Stores {
    pub dns_entries: Store<DNSEntry>,
    pub dns_providers: Store<DNSProvider>,
    pub dns_hosted_zone_policies: Store<DNSHostedZonePolicy>,
    pub dns_annotations: Store<DNSAnnotation>,
}

impl Stores {
    /// Get a specific `DNSProvider` by name and namespace from the store.
    #[must_use]
    pub fn get_provider(&self, name: &str, namespace: &str) -> Option<Arc<DNSProvider>> {
        self.dns_providers
            .state()
            .iter()
            .find(|p| p.name_any() == name && p.namespace().as_deref() == Some(namespace))
            .cloned()
    }

    /// Get a specific `DNSEntry` by name and namespace from the store.
    #[must_use]
    pub fn get_entry(&self, name: &str, namespace: &str) -> Option<Arc<DNSEntry>> {
        self.dns_entries
            .state()
            .iter()
            .find(|e| e.name_any() == name && e.namespace().as_deref() == Some(namespace))
            .cloned()
    }

    /// All entries in the store, snapshotted.
    #[must_use]
    pub fn all_entries(&self) -> Vec<Arc<DNSEntry>> {
        self.dns_entries.state().to_vec()
    }

    /// All providers in the store, snapshotted.
    #[must_use]
    pub fn all_providers(&self) -> Vec<Arc<DNSProvider>> {
        self.dns_providers.state().to_vec()
    }

    /// All zone policies in the store, snapshotted.
    #[must_use]
    pub fn all_zone_policies(&self) -> Vec<Arc<DNSHostedZonePolicy>> {
        self.dns_hosted_zone_policies.state().to_vec()
    }

    /// Find `DNSAnnotation` resources referencing a given resource.
    #[must_use]
    pub fn annotations_for_resource(&self, kind: &str, name: &str, namespace: &str) -> Vec<Arc<DNSAnnotation>> {
        self.dns_annotations
            .state()
            .iter()
            .filter(|a| {
                a.spec.resource_ref.kind == kind
                    && a.spec.resource_ref.name == name
                    && a.spec.resource_ref.namespace == namespace
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod context_tests {
    use super::*;
    use crate::crd::{DNSAnnotationSpec, ResourceRef};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::runtime::watcher::Event;

    fn stores_with(providers: Vec<DNSProvider>, entries: Vec<DNSEntry>) -> Stores {
        let (provider_reader, mut provider_writer) = kube::runtime::reflector::store::<DNSProvider>();
        for p in providers {
            provider_writer.apply_watcher_event(&Event::Apply(p));
        }
        let (entry_reader, mut entry_writer) = kube::runtime::reflector::store::<DNSEntry>();
        for e in entries {
            entry_writer.apply_watcher_event(&Event::Apply(e));
        }
        let (zp_reader, _zp_writer) = kube::runtime::reflector::store::<DNSHostedZonePolicy>();
        let (ann_reader, mut ann_writer) = kube::runtime::reflector::store::<DNSAnnotation>();
        ann_writer.apply_watcher_event(&Event::Apply(test_annotation()));

        Stores {
            dns_entries: entry_reader,
            dns_providers: provider_reader,
            dns_hosted_zone_policies: zp_reader,
            dns_annotations: ann_reader,
        }
    }

    fn test_provider(name: &str, namespace: &str) -> DNSProvider {
        DNSProvider {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: crate::crd::DNSProviderSpec {
                provider_type: "mock".to_string(),
                secret_ref: None,
                domains: crate::crd::DomainFilter::default(),
                zones: crate::crd::DomainFilter::default(),
                default_ttl: None,
                rate_limit: None,
                disabled: false,
            },
            status: None,
        }
    }

    fn test_entry(name: &str, namespace: &str) -> DNSEntry {
        DNSEntry {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: crate::crd::DNSEntrySpec {
                dns_name: "www.example.com".to_string(),
                record_type: crate::crd::RecordType::A,
                targets: vec!["1.2.3.4".to_string()],
                ttl: None,
                set_identifier: None,
                routing_policy: None,
                provider_ref: None,
                cname_lookup_interval: None,
            },
            status: None,
        }
    }

    fn test_annotation() -> DNSAnnotation {
        DNSAnnotation {
            metadata: ObjectMeta {
                name: Some("ann-1".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: DNSAnnotationSpec {
                resource_ref: ResourceRef {
                    kind: "Service".to_string(),
                    name: "web".to_string(),
                    namespace: "default".to_string(),
                },
                dns_names: vec!["web.example.com".to_string()],
                ttl: None,
                routing_policy: None,
                class: None,
                targets: vec![],
            },
            status: None,
        }
    }

    #[test]
    fn get_provider_matches_on_name_and_namespace() {
        let stores = stores_with(vec![test_provider("p1", "default")], vec![]);
        assert!(stores.get_provider("p1", "default").is_some());
        assert!(stores.get_provider("p1", "other-namespace").is_none());
        assert!(stores.get_provider("missing", "default").is_none());
    }

    #[test]
    fn get_entry_matches_on_name_and_namespace() {
        let stores = stores_with(vec![], vec![test_entry("e1", "default")]);
        assert!(stores.get_entry("e1", "default").is_some());
        assert!(stores.get_entry("e1", "other-namespace").is_none());
    }

    #[test]
    fn all_entries_and_all_providers_snapshot_the_whole_store() {
        let stores = stores_with(
            vec![test_provider("p1", "default"), test_provider("p2", "default")],
            vec![test_entry("e1", "default")],
        );
        assert_eq!(stores.all_providers().len(), 2);
        assert_eq!(stores.all_entries().len(), 1);
    }

    #[test]
    fn annotations_for_resource_filters_on_kind_name_and_namespace() {
        let stores = stores_with(vec![], vec![]);
        let matches = stores.annotations_for_resource("Service", "web", "default");
        assert_eq!(matches.len(), 1);

        assert!(stores
            .annotations_for_resource("Service", "web", "other-namespace")
            .is_empty());
        assert!(stores
            .annotations_for_resource("Deployment", "web", "default")
            .is_empty());
    }
}
