// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The in-memory mock provider (C10, spec §4.10).
//!
//! Stores `zoneId -> name+type -> recordSet` behind a `Mutex`, exactly as
//! the spec prescribes, and serves as the oracle for the S1-S6 end-to-end
//! scenarios (spec §8) since it implements the exact same
//! [`crate::provider::ProviderHandler`] contract as every real backend.

use crate::provider::{Change, ChangeAction, ChangeOutcome, HostedZone, ProviderError};
use crate::record::{RecordKey, RecordSet, ZoneState};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

struct MockZone {
    zone: HostedZone,
    records: BTreeMap<RecordKey, RecordSet>,
}

/// An in-process provider backed by a plain map, for tests and as a
/// reference implementation of the handler contract.
pub struct MockProvider {
    zones: Mutex<BTreeMap<String, MockZone>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            zones: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register a hosted zone with the mock, so `getZones` can return it.
    pub fn add_zone(&self, zone: HostedZone) {
        let mut zones = self.zones.lock().unwrap();
        zones
            .entry(zone.id.clone())
            .or_insert_with(|| MockZone {
                zone,
                records: BTreeMap::new(),
            });
    }

    /// Inject a record directly into a zone, bypassing `executeRequests` —
    /// used by scenario S5 to simulate a concurrent external write.
    pub fn inject_record(&self, zone_id: &str, record: RecordSet) {
        let mut zones = self.zones.lock().unwrap();
        if let Some(z) = zones.get_mut(zone_id) {
            z.records.insert(record.key.clone(), record);
        }
    }

    /// Snapshot of a zone's current record sets, for test assertions.
    #[must_use]
    pub fn zone_records(&self, zone_id: &str) -> Vec<RecordSet> {
        let zones = self.zones.lock().unwrap();
        zones
            .get(zone_id)
            .map(|z| z.records.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl crate::provider::ProviderHandler for MockProvider {
    async fn get_zones(&self) -> Result<Vec<HostedZone>, ProviderError> {
        let zones = self.zones.lock().unwrap();
        Ok(zones.values().map(|z| z.zone.clone()).collect())
    }

    async fn get_zone_state(&self, zone: &HostedZone) -> Result<ZoneState, ProviderError> {
        let zones = self.zones.lock().unwrap();
        let z = zones
            .get(&zone.id)
            .ok_or_else(|| ProviderError::NoSuchHostedZone(zone.id.clone()))?;
        Ok(ZoneState::new(z.records.values().cloned().collect()))
    }

    async fn execute_requests(
        &self,
        zone: &HostedZone,
        _desired_state: &ZoneState,
        changes: &[Change],
    ) -> Result<Vec<ChangeOutcome>, ProviderError> {
        let mut zones = self.zones.lock().unwrap();
        let z = zones
            .get_mut(&zone.id)
            .ok_or_else(|| ProviderError::NoSuchHostedZone(zone.id.clone()))?;

        let mut outcomes = Vec::with_capacity(changes.len());
        for change in changes {
            match change.action {
                ChangeAction::Create | ChangeAction::Update => {
                    z.records.insert(change.record.key.clone(), change.record.clone());
                    outcomes.push(ChangeOutcome::Succeeded);
                }
                ChangeAction::Delete => {
                    z.records.remove(&change.record.key);
                    outcomes.push(ChangeOutcome::Succeeded);
                }
            }
        }
        Ok(outcomes)
    }

    async fn release(&self) {}
}

#[cfg(test)]
mod mock_tests {
    use super::*;
    use crate::crd::RecordType;
    use crate::provider::ProviderHandler;

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
    async fn create_then_get_zone_state_round_trips() {
        let provider = MockProvider::new();
        provider.add_zone(zone());
        let key = RecordKey::new("www.example.com", RecordType::A, None);
        let record = RecordSet::new(key.clone(), 300, ["192.0.2.1".to_string()]);
        let change = Change {
            action: ChangeAction::Create,
            record: record.clone(),
            entry_key: "default/www".to_string(),
        };

        let outcomes = provider
            .execute_requests(&zone(), &ZoneState::default(), &[change])
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], ChangeOutcome::Succeeded));

        let state = provider.get_zone_state(&zone()).await.unwrap();
        assert_eq!(state.records.len(), 1);
        assert_eq!(state.records[0].key, key);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let provider = MockProvider::new();
        provider.add_zone(zone());
        let key = RecordKey::new("www.example.com", RecordType::A, None);
        provider.inject_record(
            "zone-1",
            RecordSet::new(key.clone(), 300, ["192.0.2.1".to_string()]),
        );

        let change = Change {
            action: ChangeAction::Delete,
            record: RecordSet::new(key, 300, Vec::<String>::new()),
            entry_key: "default/www".to_string(),
        };
        provider
            .execute_requests(&zone(), &ZoneState::default(), &[change])
            .await
            .unwrap();

        assert!(provider.zone_records("zone-1").is_empty());
    }

    #[tokio::test]
    async fn get_zone_state_on_unknown_zone_is_no_such_hosted_zone() {
        let provider = MockProvider::new();
        let err = provider.get_zone_state(&zone()).await.unwrap_err();
        assert!(matches!(err, ProviderError::NoSuchHostedZone(_)));
    }
}
