// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The record model and `DNSSet` diff algebra (C1, spec §4.1).
//!
//! Everything in this module is pure — no I/O, no locks — so the diff
//! algorithm can be exercised directly in unit tests without a mock
//! provider or a Kubernetes API server.

use crate::crd::RecordType;
use std::collections::BTreeSet;
use std::fmt;

/// Lowercase, strip a trailing dot, and leave the rest of a DNS name as-is.
///
/// IDNA normalization is intentionally not performed here: providers that
/// need punycode do their own conversion at the adapter boundary (spec
/// §4.1 only requires normalize to be total and deterministic).
#[must_use]
pub fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Identity key for a record set: (name, type, `setIdentifier`) — spec §3.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub name: String,
    pub record_type: RecordType,
    pub set_identifier: Option<String>,
}

impl RecordKey {
    #[must_use]
    pub fn new(name: &str, record_type: RecordType, set_identifier: Option<&str>) -> Self {
        Self {
            name: normalize(name),
            record_type,
            set_identifier: set_identifier.map(str::to_string),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.set_identifier {
            Some(id) => write!(f, "{}/{}/{}", self.name, self.record_type, id),
            None => write!(f, "{}/{}", self.name, self.record_type),
        }
    }
}

impl Ord for RecordType {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_string().cmp(&other.to_string())
    }
}
impl PartialOrd for RecordType {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl std::hash::Hash for RecordType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

/// A record set: the values for one [`RecordKey`], plus TTL and ownership tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordSet {
    pub key: RecordKey,
    pub ttl: i64,
    /// Values, normalized: canonical-form IPs for A/AAAA, dot-free CNAME
    /// target, RFC-1035-quoted strings for TXT.
    pub values: BTreeSet<String>,
    /// Whether this record set carries the controller's owner TXT sibling,
    /// or (for routing-policy sets) a recognized `setIdentifier` prefix.
    /// Unowned record sets are invisible to `diff`'s remove/update output.
    pub owned: bool,
}

impl RecordSet {
    #[must_use]
    pub fn new(key: RecordKey, ttl: i64, values: impl IntoIterator<Item = String>) -> Self {
        Self {
            key,
            ttl,
            values: values.into_iter().collect(),
            owned: true,
        }
    }

    #[must_use]
    pub fn unowned(mut self) -> Self {
        self.owned = false;
        self
    }

    /// TTL equal AND values equal as a multiset (spec §4.1). Since `values`
    /// is already a set, plain equality suffices; the name is kept for
    /// fidelity to the spec's operation list.
    #[must_use]
    pub fn equal(&self, other: &RecordSet) -> bool {
        self.ttl == other.ttl && self.values == other.values
    }
}

/// Normalize a CNAME target: strip a trailing dot (spec §3).
#[must_use]
pub fn normalize_cname_target(target: &str) -> String {
    target.trim_end_matches('.').to_string()
}

/// Wrap a TXT value in RFC-1035 quotes if not already quoted.
#[must_use]
pub fn quote_txt(value: &str) -> String {
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('"', "\\\""))
    }
}

/// Outcome of diffing desired state against an observed [`ZoneState`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZoneDiff {
    /// Keys present in desired but absent from observed.
    pub add: Vec<RecordSet>,
    /// Owned keys present in observed but absent from desired.
    pub remove: Vec<RecordSet>,
    /// Keys present in both, with differing TTL or values.
    pub update: Vec<RecordSet>,
}

impl ZoneDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.update.is_empty()
    }
}

/// A snapshot of all record sets observed in a hosted zone (spec §3 `ZS`).
#[derive(Clone, Debug, Default)]
pub struct ZoneState {
    pub records: Vec<RecordSet>,
}

impl ZoneState {
    #[must_use]
    pub fn new(records: Vec<RecordSet>) -> Self {
        Self { records }
    }

    fn find(&self, key: &RecordKey) -> Option<&RecordSet> {
        self.records.iter().find(|r| &r.key == key)
    }

    /// `zoneState.diff(desired)` (spec §4.1).
    ///
    /// Unowned record sets in `self` are excluded from `remove`/`update`
    /// output entirely: they are invisible to the controller, so a desired
    /// set sharing their key would instead surface as `add` (the
    /// controller believes the key absent) — callers in C7 are expected to
    /// have already excluded such keys from `desired` via the registry, but
    /// this method enforces the invariant defensively regardless.
    #[must_use]
    pub fn diff(&self, desired: &ZoneState) -> ZoneDiff {
        let mut out = ZoneDiff::default();

        for wanted in &desired.records {
            match self.find(&wanted.key) {
                Some(observed) if observed.owned => {
                    if !observed.equal(wanted) {
                        out.update.push(wanted.clone());
                    }
                }
                Some(_unowned) => {
                    // Unowned key: treat as though nothing were observed so
                    // the controller never touches foreign records (S5).
                }
                None => out.add.push(wanted.clone()),
            }
        }

        let desired_keys: BTreeSet<&RecordKey> = desired.records.iter().map(|r| &r.key).collect();
        for observed in &self.records {
            if observed.owned && !desired_keys.contains(&observed.key) {
                out.remove.push(observed.clone());
            }
        }

        out
    }

    /// Apply a committed set of adds/updates/removes, producing the zone
    /// state the next uncached `getZoneState` would return (spec §4.4's
    /// cache-patch invariant). Used by [`crate::zonecache::ZoneCache`].
    #[must_use]
    pub fn apply(&self, diff: &ZoneDiff) -> ZoneState {
        let removed_keys: BTreeSet<&RecordKey> = diff.remove.iter().map(|r| &r.key).collect();
        let mut records: Vec<RecordSet> = self
            .records
            .iter()
            .filter(|r| !removed_keys.contains(&r.key))
            .cloned()
            .collect();

        for updated in diff.update.iter().chain(diff.add.iter()) {
            if let Some(slot) = records.iter_mut().find(|r| r.key == updated.key) {
                *slot = updated.clone();
            } else {
                records.push(updated.clone());
            }
        }

        ZoneState::new(records)
    }
}

#[cfg(test)]
mod record_tests {
    use super::*;

    fn key(name: &str) -> RecordKey {
        RecordKey::new(name, RecordType::A, None)
    }

    #[test]
    fn normalize_lowercases_and_strips_trailing_dot() {
        assert_eq!(normalize("WWW.Example.COM."), "www.example.com");
    }

    #[test]
    fn diff_adds_keys_missing_from_observed() {
        let observed = ZoneState::default();
        let desired = ZoneState::new(vec![RecordSet::new(
            key("www.example.com"),
            300,
            ["192.0.2.1".to_string()],
        )]);
        let diff = observed.diff(&desired);
        assert_eq!(diff.add.len(), 1);
        assert!(diff.remove.is_empty());
        assert!(diff.update.is_empty());
    }

    #[test]
    fn diff_removes_only_owned_keys_not_in_desired() {
        let observed = ZoneState::new(vec![
            RecordSet::new(key("owned.example.com"), 300, ["192.0.2.1".to_string()]),
            RecordSet::new(key("foreign.example.com"), 300, ["192.0.2.2".to_string()])
                .unowned(),
        ]);
        let desired = ZoneState::default();
        let diff = observed.diff(&desired);
        assert_eq!(diff.remove.len(), 1);
        assert_eq!(diff.remove[0].key.name, "owned.example.com");
    }

    #[test]
    fn diff_updates_when_values_or_ttl_differ() {
        let observed = ZoneState::new(vec![RecordSet::new(
            key("www.example.com"),
            300,
            ["192.0.2.1".to_string()],
        )]);
        let desired = ZoneState::new(vec![RecordSet::new(
            key("www.example.com"),
            300,
            ["192.0.2.9".to_string()],
        )]);
        let diff = observed.diff(&desired);
        assert_eq!(diff.update.len(), 1);
        assert!(diff.add.is_empty());
        assert!(diff.remove.is_empty());
    }

    #[test]
    fn diff_is_empty_for_identical_states_idempotence() {
        let state = ZoneState::new(vec![RecordSet::new(
            key("www.example.com"),
            300,
            ["192.0.2.1".to_string()],
        )]);
        assert!(state.diff(&state.clone()).is_empty());
    }

    #[test]
    fn apply_produces_state_matching_next_uncached_read() {
        let observed = ZoneState::new(vec![RecordSet::new(
            key("a.example.com"),
            300,
            ["192.0.2.1".to_string()],
        )]);
        let desired = ZoneState::new(vec![RecordSet::new(
            key("b.example.com"),
            300,
            ["192.0.2.2".to_string()],
        )]);
        let diff = observed.diff(&desired);
        let next = observed.apply(&diff);
        assert_eq!(next.records.len(), 1);
        assert_eq!(next.records[0].key.name, "b.example.com");
    }

    #[test]
    fn record_key_display_includes_set_identifier() {
        let k = RecordKey::new("www.example.com", RecordType::A, Some("primary"));
        assert_eq!(k.to_string(), "www.example.com/A/primary");
    }

    #[test]
    fn quote_txt_wraps_unquoted_values() {
        assert_eq!(quote_txt("hello"), "\"hello\"");
        assert_eq!(quote_txt("\"already\""), "\"already\"");
    }
}
