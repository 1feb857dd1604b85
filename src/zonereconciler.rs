// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The per-zone batched apply loop (C7, spec §4.7).
//!
//! Grounded on the teacher's per-zone lane-serialization idiom: exactly one
//! [`reconcile_zone`] call may be in flight for a given zone id at a time,
//! enforced by [`crate::zonelock::ZoneLocks`] at the call site, not by this
//! function itself — `reconcile_zone` assumes it already holds that lock.

use crate::errors::{CoreError, ErrorKind};
use crate::provider::{Change, ChangeAction, ChangeOutcome, HostedZone, ProviderHandler};
use crate::record::{RecordSet, ZoneState};
use crate::zonecache::{CacheRead, ZoneCache};
use std::collections::HashMap;
use std::time::Duration;

/// One entry's desired contribution to a zone, queued by the entry
/// reconciler (C5) and drained into a batch by [`reconcile_zone`].
#[derive(Clone, Debug)]
pub struct PendingChange {
    pub action: ChangeAction,
    pub record: RecordSet,
    pub entry_key: String,
}

/// Per-change result, keyed by the originating entry, fed back into C5.
#[derive(Clone, Debug)]
pub struct EntryOutcome {
    pub entry_key: String,
    pub outcome: ChangeOutcome,
}

/// The result of one [`reconcile_zone`] call.
#[derive(Debug, Default)]
pub struct ZoneReconcileReport {
    pub outcomes: Vec<EntryOutcome>,
}

/// Run one batch through the zone reconcile loop (spec §4.7 steps 1-8).
///
/// `pending` must already be bounded to the provider's batch size by the
/// caller (the zone lane drains at most `batch_size` queued changes per
/// call); this function does not itself impose a limit.
pub async fn reconcile_zone(
    cache: &ZoneCache,
    handler: &dyn ProviderHandler,
    zone: &HostedZone,
    ttl_override: Option<Duration>,
    pending: Vec<PendingChange>,
) -> Result<ZoneReconcileReport, CoreError> {
    // Step 4 (partial): detect two entries claiming the same key before
    // touching the provider at all.
    let mut claimed: HashMap<crate::record::RecordKey, String> = HashMap::new();
    let mut busy_conflicts = Vec::new();
    let mut accepted = Vec::new();
    for change in pending {
        match claimed.get(&change.record.key) {
            Some(_first_owner) => {
                busy_conflicts.push(EntryOutcome {
                    entry_key: change.entry_key.clone(),
                    outcome: ChangeOutcome::Invalid(
                        crate::provider::ProviderError::InvalidRequest(
                            "AlreadyBusyForEntry: another entry already claims this record"
                                .to_string(),
                        ),
                    ),
                });
            }
            None => {
                claimed.insert(change.record.key.clone(), change.entry_key.clone());
                accepted.push(change);
            }
        }
    }

    // Step 2: read zone state from C4 (refetch if stale).
    let observed = match cache.read(&zone.id, ttl_override) {
        CacheRead::Cached(state) => state,
        CacheRead::Miss => {
            if cache.in_cooldown(&zone.id) {
                return Err(CoreError::new(
                    ErrorKind::ZoneStateConflict,
                    format!("zone {} is in post-conflict cooldown", zone.id),
                ));
            }
            let fresh = handler
                .get_zone_state(zone)
                .await
                .map_err(crate::errors::CoreError::from)?;
            cache.store(&zone.id, zone.key.clone(), fresh.clone());
            fresh
        }
    };

    // Step 3: desired = (observed minus records targeted by DELETE/UPDATE in
    // this batch) plus (additions from CREATE/UPDATE).
    let touched_keys: std::collections::BTreeSet<_> =
        accepted.iter().map(|c| c.record.key.clone()).collect();
    let mut desired_records: Vec<RecordSet> = observed
        .records
        .iter()
        .filter(|r| !touched_keys.contains(&r.key))
        .cloned()
        .collect();
    for change in &accepted {
        if !matches!(change.action, ChangeAction::Delete) {
            desired_records.push(change.record.clone());
        }
    }
    let desired = ZoneState::new(desired_records);

    // Step 4/5: diff and order (deletes first, then creates/updates —
    // ZoneState::diff already separates the three buckets; we apply them
    // in remove, update, add order).
    let diff = observed.diff(&desired);
    let mut changes = Vec::with_capacity(diff.remove.len() + diff.update.len() + diff.add.len());
    for record in &diff.remove {
        let entry_key = entry_key_for(&accepted, &record.key).unwrap_or_default();
        changes.push(Change {
            action: ChangeAction::Delete,
            record: record.clone(),
            entry_key,
        });
    }
    for record in diff.update.iter().chain(diff.add.iter()) {
        let entry_key = entry_key_for(&accepted, &record.key).unwrap_or_default();
        let action = if diff.add.contains(record) {
            ChangeAction::Create
        } else {
            ChangeAction::Update
        };
        changes.push(Change {
            action,
            record: record.clone(),
            entry_key,
        });
    }

    if changes.is_empty() {
        // Idempotence (spec §8 property 6): no diff, no provider write.
        return Ok(ZoneReconcileReport {
            outcomes: busy_conflicts,
        });
    }

    // Step 6: apply.
    let results = handler.execute_requests(zone, &desired, &changes).await;

    let mut outcomes = busy_conflicts;
    match results {
        Ok(per_change) => {
            let succeeded = per_change
                .iter()
                .all(|o| matches!(o, ChangeOutcome::Succeeded));
            if succeeded {
                // Step 7: patch cache on success without refetching.
                cache.apply_requests_success(&zone.id, &diff);
            } else {
                // Partial or total failure: invalidate so the next read refetches.
                cache.invalidate(&zone.id);
            }
            for (change, outcome) in changes.into_iter().zip(per_change) {
                outcomes.push(EntryOutcome {
                    entry_key: change.entry_key,
                    outcome,
                });
            }
        }
        Err(provider_err) => {
            cache.invalidate(&zone.id);
            for change in changes {
                outcomes.push(EntryOutcome {
                    entry_key: change.entry_key,
                    outcome: ChangeOutcome::Failed(provider_err.clone()),
                });
            }
        }
    }

    Ok(ZoneReconcileReport { outcomes })
}

fn entry_key_for(
    accepted: &[PendingChange],
    key: &crate::record::RecordKey,
) -> Option<String> {
    accepted
        .iter()
        .find(|c| &c.record.key == key)
        .map(|c| c.entry_key.clone())
}

#[cfg(test)]
mod zonereconciler_tests {
    use super::*;
    use crate::crd::RecordType;
    use crate::provider::mock::MockProvider;
    use crate::provider::HostedZone;
    use crate::record::RecordKey;

    fn zone() -> HostedZone {
        HostedZone {
            id: "zone-1".to_string(),
            domain: "example.com".to_string(),
            forwarded_subzones: vec![],
            provider_type: "mock".to_string(),
            key: "k1".to_string(),
            is_private: false,
        }
    }

    #[tokio::test]
    async fn single_create_succeeds_and_converges_cache() {
        let provider = MockProvider::new();
        provider.add_zone(zone());
        let cache = ZoneCache::new(Duration::from_secs(60), Duration::from_secs(30));

        let key = RecordKey::new("e0.example.com", RecordType::A, None);
        let pending = vec![PendingChange {
            action: ChangeAction::Create,
            record: RecordSet::new(key, 300, ["1.1.1.0".to_string()]),
            entry_key: "default/e0".to_string(),
        }];

        let report = reconcile_zone(&cache, &provider, &zone(), None, pending)
            .await
            .unwrap();
        assert_eq!(report.outcomes.len(), 1);
        assert!(matches!(report.outcomes[0].outcome, ChangeOutcome::Succeeded));
        assert_eq!(provider.zone_records("zone-1").len(), 1);
    }

    #[tokio::test]
    async fn conflicting_entries_for_same_key_yield_already_busy() {
        let provider = MockProvider::new();
        provider.add_zone(zone());
        let cache = ZoneCache::new(Duration::from_secs(60), Duration::from_secs(30));

        let key = RecordKey::new("dup.example.com", RecordType::A, None);
        let pending = vec![
            PendingChange {
                action: ChangeAction::Create,
                record: RecordSet::new(key.clone(), 300, ["1.1.1.1".to_string()]),
                entry_key: "default/first".to_string(),
            },
            PendingChange {
                action: ChangeAction::Create,
                record: RecordSet::new(key, 300, ["2.2.2.2".to_string()]),
                entry_key: "default/second".to_string(),
            },
        ];

        let report = reconcile_zone(&cache, &provider, &zone(), None, pending)
            .await
            .unwrap();
        let second = report
            .outcomes
            .iter()
            .find(|o| o.entry_key == "default/second")
            .unwrap();
        assert!(matches!(second.outcome, ChangeOutcome::Invalid(_)));
    }

    #[tokio::test]
    async fn no_diff_produces_no_outcomes_idempotence() {
        let provider = MockProvider::new();
        provider.add_zone(zone());
        let cache = ZoneCache::new(Duration::from_secs(60), Duration::from_secs(30));

        let key = RecordKey::new("e0.example.com", RecordType::A, None);
        provider.inject_record("zone-1", RecordSet::new(key.clone(), 300, ["1.1.1.0".to_string()]));
        cache.store(
            "zone-1",
            "k1".to_string(),
            ZoneState::new(vec![RecordSet::new(key.clone(), 300, ["1.1.1.0".to_string()])]),
        );

        let pending = vec![PendingChange {
            action: ChangeAction::Create,
            record: RecordSet::new(key, 300, ["1.1.1.0".to_string()]),
            entry_key: "default/e0".to_string(),
        }];

        let report = reconcile_zone(&cache, &provider, &zone(), None, pending)
            .await
            .unwrap();
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn foreign_unowned_record_is_never_touched() {
        let provider = MockProvider::new();
        provider.add_zone(zone());
        let cache = ZoneCache::new(Duration::from_secs(60), Duration::from_secs(30));

        let foreign_key = RecordKey::new("x.example.com", RecordType::A, None);
        provider.inject_record(
            "zone-1",
            RecordSet::new(foreign_key.clone(), 300, ["9.9.9.9".to_string()]).unowned(),
        );

        let owned_key = RecordKey::new("e0.example.com", RecordType::A, None);
        let pending = vec![PendingChange {
            action: ChangeAction::Create,
            record: RecordSet::new(owned_key, 300, ["1.1.1.0".to_string()]),
            entry_key: "default/e0".to_string(),
        }];

        reconcile_zone(&cache, &provider, &zone(), None, pending)
            .await
            .unwrap();

        let records = provider.zone_records("zone-1");
        assert!(records.iter().any(|r| r.key == foreign_key));
    }
}
