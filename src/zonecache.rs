// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The zone state cache (C4, spec §4.4).
//!
//! Maps `zoneId -> (state, fetchedAt, key)` behind a per-zone lock, the
//! same "owning object, never raw maps" encapsulation the teacher's
//! `Context`/`Stores` pair uses for reflector state. Workers never touch
//! the inner map directly; all access goes through `read_or_fetch` and
//! `apply_requests`.

use crate::record::{ZoneDiff, ZoneState};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry {
    state: ZoneState,
    fetched_at: Instant,
    key: String,
    /// Set by `report_conflict`; forces a refetch on the next read even
    /// within the TTL window, and gates a refetch cooldown to avoid tight
    /// refetch loops against a provider that is itself flapping.
    stale: bool,
    cooldown_until: Option<Instant>,
}

/// TTL'd, conflict-aware per-zone record snapshot cache.
pub struct ZoneCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    conflict_cooldown: Duration,
}

/// Outcome of a cache read: either the cached snapshot, or a signal that
/// the caller must fetch fresh state via the provider handler.
pub enum CacheRead {
    Cached(ZoneState),
    Miss,
}

impl ZoneCache {
    #[must_use]
    pub fn new(default_ttl: Duration, conflict_cooldown: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
            conflict_cooldown,
        }
    }

    /// Read the cached state for a zone if it is fresh; otherwise [`CacheRead::Miss`],
    /// signalling the caller to call the provider handler and then [`Self::store`].
    #[must_use]
    pub fn read(&self, zone_id: &str, ttl_override: Option<Duration>) -> CacheRead {
        let entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(zone_id) else {
            return CacheRead::Miss;
        };
        if entry.stale {
            return CacheRead::Miss;
        }
        let ttl = ttl_override.unwrap_or(self.default_ttl);
        if entry.fetched_at.elapsed() > ttl {
            return CacheRead::Miss;
        }
        CacheRead::Cached(entry.state.clone())
    }

    /// Store a freshly-fetched zone state, e.g. after a `getZoneState` cache miss.
    pub fn store(&self, zone_id: &str, key: String, state: ZoneState) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            zone_id.to_string(),
            CacheEntry {
                state,
                fetched_at: Instant::now(),
                key,
                stale: false,
                cooldown_until: None,
            },
        );
    }

    /// Patch the cache with a committed diff after a successful `executeRequests`
    /// (spec §4.4: on success, patch; do not refetch).
    pub fn apply_requests_success(&self, zone_id: &str, diff: &ZoneDiff) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(zone_id) {
            entry.state = entry.state.apply(diff);
            entry.fetched_at = Instant::now();
        }
    }

    /// Invalidate the zone after a partial or total failure (spec §4.4: next
    /// read refetches).
    pub fn invalidate(&self, zone_id: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(zone_id) {
            entry.stale = true;
        }
    }

    /// Record a reported zone-state conflict: invalidate and apply a
    /// cooldown before the entry is eligible for another refetch attempt,
    /// to avoid hammering a provider whose state keeps moving under us.
    pub fn report_conflict(&self, zone_id: &str) {
        let mut entries = self.entries.lock().unwrap();
        let cooldown_until = Instant::now() + self.conflict_cooldown;
        match entries.get_mut(zone_id) {
            Some(entry) => {
                entry.stale = true;
                entry.cooldown_until = Some(cooldown_until);
            }
            None => {
                entries.insert(
                    zone_id.to_string(),
                    CacheEntry {
                        state: ZoneState::default(),
                        fetched_at: Instant::now() - self.default_ttl - Duration::from_secs(1),
                        key: String::new(),
                        stale: true,
                        cooldown_until: Some(cooldown_until),
                    },
                );
            }
        }
    }

    /// Whether a zone is within its post-conflict cooldown window and
    /// should not yet be refetched.
    #[must_use]
    pub fn in_cooldown(&self, zone_id: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        entries
            .get(zone_id)
            .and_then(|e| e.cooldown_until)
            .is_some_and(|until| Instant::now() < until)
    }

    /// The content-hash key last stored for a zone, used to detect
    /// zone-definition changes (spec §3 `HostedZone.key`).
    #[must_use]
    pub fn stored_key(&self, zone_id: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap();
        entries.get(zone_id).map(|e| e.key.clone())
    }

    pub fn remove(&self, zone_id: &str) {
        self.entries.lock().unwrap().remove(zone_id);
    }
}

#[cfg(test)]
mod zonecache_tests {
    use super::*;
    use crate::crd::RecordType;
    use crate::record::{RecordKey, RecordSet};

    fn sample_state() -> ZoneState {
        ZoneState::new(vec![RecordSet::new(
            RecordKey::new("www.example.com", RecordType::A, None),
            300,
            ["192.0.2.1".to_string()],
        )])
    }

    #[test]
    fn fresh_entry_is_cached_within_ttl() {
        let cache = ZoneCache::new(Duration::from_secs(60), Duration::from_secs(30));
        cache.store("zone-1", "key1".to_string(), sample_state());
        assert!(matches!(cache.read("zone-1", None), CacheRead::Cached(_)));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = ZoneCache::new(Duration::from_millis(0), Duration::from_secs(30));
        cache.store("zone-1", "key1".to_string(), sample_state());
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(cache.read("zone-1", None), CacheRead::Miss));
    }

    #[test]
    fn invalidate_forces_miss_even_within_ttl() {
        let cache = ZoneCache::new(Duration::from_secs(300), Duration::from_secs(30));
        cache.store("zone-1", "key1".to_string(), sample_state());
        cache.invalidate("zone-1");
        assert!(matches!(cache.read("zone-1", None), CacheRead::Miss));
    }

    #[test]
    fn apply_requests_success_patches_without_refetch() {
        let cache = ZoneCache::new(Duration::from_secs(300), Duration::from_secs(30));
        cache.store("zone-1", "key1".to_string(), ZoneState::default());
        let diff = ZoneDiff {
            add: sample_state().records,
            remove: vec![],
            update: vec![],
        };
        cache.apply_requests_success("zone-1", &diff);
        if let CacheRead::Cached(state) = cache.read("zone-1", None) {
            assert_eq!(state.records.len(), 1);
        } else {
            panic!("expected cached state after apply");
        }
    }

    #[test]
    fn report_conflict_triggers_cooldown() {
        let cache = ZoneCache::new(Duration::from_secs(300), Duration::from_secs(30));
        cache.store("zone-1", "key1".to_string(), sample_state());
        cache.report_conflict("zone-1");
        assert!(cache.in_cooldown("zone-1"));
        assert!(matches!(cache.read("zone-1", None), CacheRead::Miss));
    }
}
