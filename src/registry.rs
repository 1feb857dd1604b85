// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Provider registry and entry-to-(provider, zone) selection (C6, spec §4.6).
//!
//! Generalizes the teacher's label-selector `find_zones_for_record`
//! pattern from matching Kubernetes label selectors to matching DNS name
//! suffixes against a provider's include/exclude domain filters.

use crate::provider::{HostedZone, ProviderKind};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// One registered provider's selection-relevant state, refreshed whenever
/// the owning `DNSProvider` or its zone list changes.
#[derive(Clone, Debug)]
pub struct RegisteredProvider {
    /// `namespace/name` of the `DNSProvider`.
    pub key: String,
    pub provider_type: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub ready: bool,
    pub zones: Vec<HostedZone>,
}

impl RegisteredProvider {
    /// Whether `name` is covered by this provider's include-set and not
    /// excluded (spec §4.6: "whose include-set contains a suffix of
    /// `E.dnsName` and whose exclude-set does not"). The exclude check is a
    /// suffix test against `name` itself, independent of which include
    /// entry matched — an excluded subdomain blocks selection even when a
    /// broader include entry would otherwise cover it.
    fn best_match_len(&self, name: &str) -> Option<usize> {
        if self.exclude.iter().any(|e| is_suffix_match(name, e)) {
            return None;
        }
        self.include
            .iter()
            .filter(|domain| is_suffix_match(name, domain))
            .map(String::len)
            .max()
    }
}

fn is_suffix_match(name: &str, domain: &str) -> bool {
    name == domain || name.ends_with(&format!(".{domain}"))
}

/// `(providerId, zoneId)` chosen for an entry, or the reason none matched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Matched { provider_key: String, zone_id: String },
    NoMatch { reason: String },
}

/// Holds every known provider's selection state behind a single `RwLock`
/// (spec §5: "Provider registry (C6): guarded by a single RW lock; updates
/// are infrequent").
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, RegisteredProvider>>,
    zone_policies: RwLock<Vec<ZonePolicy>>,
    /// Live backend adapters, keyed the same as `providers`. Kept separate
    /// from `RegisteredProvider` since the adapter (credentials, HTTP
    /// clients) lives for as long as the `DNSProvider` is `Ready`, while
    /// selection metadata is replaced on every provider reconcile.
    handlers: RwLock<HashMap<String, Arc<ProviderKind>>>,
}

/// A `DNSHostedZonePolicy`, reduced to what selection needs: a domain/type
/// selector plus the cache TTL it overrides.
#[derive(Clone, Debug)]
pub struct ZonePolicy {
    pub domains: Vec<String>,
    pub provider_type: Option<String>,
    pub cache_ttl_seconds: Option<u64>,
    pub priority: i32,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_provider(&self, provider: RegisteredProvider) {
        self.providers
            .write()
            .unwrap()
            .insert(provider.key.clone(), provider);
    }

    pub fn remove_provider(&self, key: &str) {
        self.providers.write().unwrap().remove(key);
        self.handlers.write().unwrap().remove(key);
    }

    /// Install or replace the live handler for a provider.
    pub fn set_handler(&self, key: &str, handler: Arc<ProviderKind>) {
        self.handlers.write().unwrap().insert(key.to_string(), handler);
    }

    /// Fetch the live handler for a provider, if registered.
    #[must_use]
    pub fn get_handler(&self, key: &str) -> Option<Arc<ProviderKind>> {
        self.handlers.read().unwrap().get(key).cloned()
    }

    /// Look up one of a provider's known hosted zones by id, for callers
    /// that already hold a [`Selection::Matched`] result.
    #[must_use]
    pub fn zone(&self, provider_key: &str, zone_id: &str) -> Option<HostedZone> {
        self.providers
            .read()
            .unwrap()
            .get(provider_key)
            .and_then(|p| p.zones.iter().find(|z| z.id == zone_id).cloned())
    }

    pub fn set_zone_policies(&self, policies: Vec<ZonePolicy>) {
        *self.zone_policies.write().unwrap() = policies;
    }

    /// Selection algorithm for an entry (spec §4.6 steps 1-4).
    #[must_use]
    pub fn select(&self, dns_name: &str) -> Selection {
        let providers = self.providers.read().unwrap();
        let name = crate::record::normalize(dns_name);

        let mut candidates: Vec<(&RegisteredProvider, usize)> = providers
            .values()
            .filter_map(|p| p.best_match_len(&name).map(|len| (p, len)))
            .collect();

        if candidates.is_empty() {
            return Selection::NoMatch {
                reason: "no provider's domain filter matches this name".to_string(),
            };
        }

        // Longest match wins; ties broken by namespaced name, lexicographically.
        candidates.sort_by(|(a, a_len), (b, b_len)| {
            b_len.cmp(a_len).then_with(|| a.key.cmp(&b.key))
        });

        let Some((provider, _)) = candidates.iter().find(|(p, _)| p.ready).copied() else {
            return Selection::NoMatch {
                reason: "matching provider(s) are not Ready".to_string(),
            };
        };

        match self.select_zone(provider, &name) {
            Some(zone_id) => Selection::Matched {
                provider_key: provider.key.clone(),
                zone_id,
            },
            None => Selection::NoMatch {
                reason: "provider matched but has no hosted zone covering this name".to_string(),
            },
        }
    }

    /// Longest-suffix zone match within a provider, excluding names shadowed
    /// by a forwarded subzone of a longer suffix (spec §4.6 step 4).
    fn select_zone(&self, provider: &RegisteredProvider, name: &str) -> Option<String> {
        let mut best: Option<(&HostedZone, usize)> = None;
        for zone in &provider.zones {
            if !is_suffix_match(name, &zone.domain) {
                continue;
            }
            let shadowed = zone
                .forwarded_subzones
                .iter()
                .any(|sub| is_suffix_match(name, sub));
            if shadowed {
                continue;
            }
            let len = zone.domain.len();
            if best.is_none_or(|(_, best_len)| len > best_len) {
                best = Some((zone, len));
            }
        }
        best.map(|(zone, _)| zone.id.clone())
    }

    /// Count zones across every registered provider whose domain matches one
    /// of `domains` (and, if given, whose provider type equals
    /// `provider_type`). Used by the `DNSHostedZonePolicy` reconciler to
    /// publish `status.matchedZoneCount`.
    #[must_use]
    pub fn matching_zone_count(&self, domains: &[String], provider_type: Option<&str>) -> i32 {
        let providers = self.providers.read().unwrap();
        providers
            .values()
            .filter(|p| provider_type.is_none_or(|t| t == p.provider_type))
            .flat_map(|p| p.zones.iter())
            .filter(|zone| domains.iter().any(|d| is_suffix_match(&zone.domain, d)))
            .count() as i32
    }

    /// Zone cache TTL override from a matching `DNSHostedZonePolicy`, if any
    /// (spec §4.6 step 5). Highest `priority` wins among matches.
    #[must_use]
    pub fn cache_ttl_override(&self, zone_domain: &str, provider_type: &str) -> Option<u64> {
        let policies = self.zone_policies.read().unwrap();
        policies
            .iter()
            .filter(|p| {
                p.provider_type.as_deref().is_none_or(|t| t == provider_type)
                    && p.domains.iter().any(|d| is_suffix_match(zone_domain, d))
            })
            .max_by_key(|p| p.priority)
            .and_then(|p| p.cache_ttl_seconds)
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;

    fn provider(key: &str, include: &[&str], ready: bool, zones: Vec<HostedZone>) -> RegisteredProvider {
        RegisteredProvider {
            key: key.to_string(),
            provider_type: "mock".to_string(),
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: vec![],
            ready,
            zones,
        }
    }

    fn provider_with_exclude(
        key: &str,
        include: &[&str],
        exclude: &[&str],
        zones: Vec<HostedZone>,
    ) -> RegisteredProvider {
        RegisteredProvider {
            key: key.to_string(),
            provider_type: "mock".to_string(),
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            ready: true,
            zones,
        }
    }

    fn zone(id: &str, domain: &str) -> HostedZone {
        HostedZone {
            id: id.to_string(),
            domain: domain.to_string(),
            forwarded_subzones: vec![],
            provider_type: "mock".to_string(),
            key: "k".to_string(),
            is_private: false,
        }
    }

    #[test]
    fn selects_longest_matching_domain_among_candidates() {
        let registry = ProviderRegistry::new();
        registry.upsert_provider(provider(
            "default/broad",
            &["example.com"],
            true,
            vec![zone("z-broad", "example.com")],
        ));
        registry.upsert_provider(provider(
            "default/narrow",
            &["first.example.com"],
            true,
            vec![zone("z-narrow", "first.example.com")],
        ));

        let selection = registry.select("www.first.example.com");
        assert_eq!(
            selection,
            Selection::Matched {
                provider_key: "default/narrow".to_string(),
                zone_id: "z-narrow".to_string(),
            }
        );
    }

    #[test]
    fn skips_non_ready_provider_and_falls_through() {
        let registry = ProviderRegistry::new();
        registry.upsert_provider(provider(
            "default/down",
            &["example.com"],
            false,
            vec![zone("z1", "example.com")],
        ));
        let selection = registry.select("www.example.com");
        assert!(matches!(selection, Selection::NoMatch { .. }));
    }

    #[test]
    fn excludes_names_under_forwarded_subzone() {
        let registry = ProviderRegistry::new();
        let mut z = zone("z1", "example.com");
        z.forwarded_subzones = vec!["dev.example.com".to_string()];
        registry.upsert_provider(provider("default/p", &["example.com"], true, vec![z]));

        let selection = registry.select("svc.dev.example.com");
        assert!(matches!(selection, Selection::NoMatch { .. }));
    }

    #[test]
    fn excludes_names_under_an_excluded_subdomain_even_with_a_broader_include() {
        let registry = ProviderRegistry::new();
        registry.upsert_provider(provider_with_exclude(
            "default/p",
            &["example.com"],
            &["foo.example.com"],
            vec![zone("z1", "example.com")],
        ));

        // Directly excluded name.
        let selection = registry.select("bar.foo.example.com");
        assert!(matches!(selection, Selection::NoMatch { .. }));

        // A sibling name under the same broad include, not under the
        // excluded subdomain, still resolves.
        let selection = registry.select("baz.example.com");
        assert!(matches!(selection, Selection::Matched { .. }));
    }

    #[test]
    fn no_provider_matches_name_outside_any_domain() {
        let registry = ProviderRegistry::new();
        registry.upsert_provider(provider(
            "default/p",
            &["example.com"],
            true,
            vec![zone("z1", "example.com")],
        ));
        let selection = registry.select("www.other.org");
        assert!(matches!(selection, Selection::NoMatch { .. }));
    }

    #[test]
    fn zone_lookup_finds_a_provider_s_registered_zone() {
        let registry = ProviderRegistry::new();
        registry.upsert_provider(provider(
            "default/p",
            &["example.com"],
            true,
            vec![zone("z1", "example.com")],
        ));
        assert!(registry.zone("default/p", "z1").is_some());
        assert!(registry.zone("default/p", "missing").is_none());
    }

    #[test]
    fn handler_set_and_get_round_trips() {
        use crate::provider::mock::MockProvider;
        use crate::provider::ProviderKind;
        let registry = ProviderRegistry::new();
        registry.set_handler("default/p", std::sync::Arc::new(ProviderKind::Mock(MockProvider::new())));
        assert!(registry.get_handler("default/p").is_some());
        registry.remove_provider("default/p");
        assert!(registry.get_handler("default/p").is_none());
    }

    #[test]
    fn matching_zone_count_filters_by_domain_and_provider_type() {
        let registry = ProviderRegistry::new();
        registry.upsert_provider(provider(
            "default/p",
            &["example.com"],
            true,
            vec![zone("z1", "example.com"), zone("z2", "other.org")],
        ));
        assert_eq!(
            registry.matching_zone_count(&["example.com".to_string()], None),
            1
        );
        assert_eq!(
            registry.matching_zone_count(&["example.com".to_string()], Some("route53")),
            0
        );
    }

    #[test]
    fn cache_ttl_override_prefers_highest_priority_match() {
        let registry = ProviderRegistry::new();
        registry.set_zone_policies(vec![
            ZonePolicy {
                domains: vec!["example.com".to_string()],
                provider_type: None,
                cache_ttl_seconds: Some(30),
                priority: 0,
            },
            ZonePolicy {
                domains: vec!["first.example.com".to_string()],
                provider_type: None,
                cache_ttl_seconds: Some(5),
                priority: 10,
            },
        ]);
        assert_eq!(
            registry.cache_ttl_override("first.example.com", "mock"),
            Some(5)
        );
    }
}
