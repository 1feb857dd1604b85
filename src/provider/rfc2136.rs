// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! RFC 2136 dynamic DNS update backend.
//!
//! Grounded on the teacher's `ddns.rs` module, which drove BIND9 the same
//! way: "calculate hash of current record data... if changed, send RFC
//! 2136 update to BIND9 via hickory-client... BIND9 handles zone transfer
//! to secondaries automatically". The teacher's own flow never read zone
//! contents back off the wire either, so this adapter tracks the
//! last-applied record set itself (mirroring [`crate::provider::mock`]'s
//! `BTreeMap`-per-zone shape) instead of performing a zone transfer.

use crate::crd::RecordType;
use crate::provider::{Change, ChangeAction, ChangeOutcome, HostedZone, ProviderError};
use crate::record::{RecordKey, RecordSet, ZoneState};
use async_trait::async_trait;
use hickory_client::client::{Client, SyncClient};
use hickory_client::proto::rr::dnssec::tsig::TSigner;
use hickory_client::rr::rdata::tsig::TsigAlgorithm;
use hickory_client::rr::rdata::{A, AAAA, CNAME, TXT};
use hickory_client::rr::{DNSClass, Name, RData, Record as HickoryRecord, RecordType as HickoryRecordType};
use hickory_client::tcp::TcpClientConnection;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

/// TSIG key and primary-nameserver address for one `rfc2136` `DNSProvider`.
pub struct Rfc2136Config {
    pub primary_addr: SocketAddr,
    pub tsig_key_name: String,
    pub tsig_key_secret: Vec<u8>,
    pub tsig_algorithm: String,
    /// Zone origins this key is authorized to update; `getZones` has no
    /// RFC 2136 equivalent, so the provider's domain filter stands in.
    pub zone_origins: Vec<String>,
}

struct TrackedZone {
    zone: HostedZone,
    records: BTreeMap<RecordKey, RecordSet>,
}

pub struct Rfc2136Provider {
    addr: SocketAddr,
    key_name: Name,
    key_secret: Vec<u8>,
    algorithm: TsigAlgorithm,
    zones: Mutex<BTreeMap<String, TrackedZone>>,
}

impl Rfc2136Provider {
    /// # Errors
    ///
    /// Returns [`ProviderError::AuthError`] if the TSIG key name or
    /// algorithm can't be parsed.
    pub fn new(config: Rfc2136Config) -> Result<Self, ProviderError> {
        let key_name = Name::from_str(&config.tsig_key_name)
            .map_err(|e| ProviderError::AuthError(format!("invalid TSIG key name: {e}")))?;
        let algorithm = match config.tsig_algorithm.as_str() {
            "hmac-sha256" => TsigAlgorithm::HmacSha256,
            "hmac-sha512" => TsigAlgorithm::HmacSha512,
            "hmac-md5" => TsigAlgorithm::HmacMd5,
            other => {
                return Err(ProviderError::AuthError(format!(
                    "unsupported TSIG algorithm: {other}"
                )))
            }
        };

        let mut zones = BTreeMap::new();
        for origin in &config.zone_origins {
            zones.insert(
                origin.clone(),
                TrackedZone {
                    zone: HostedZone {
                        id: origin.clone(),
                        domain: origin.clone(),
                        forwarded_subzones: vec![],
                        provider_type: "rfc2136".to_string(),
                        key: origin.clone(),
                        is_private: false,
                    },
                    records: BTreeMap::new(),
                },
            );
        }

        Ok(Self {
            addr: config.primary_addr,
            key_name,
            key_secret: config.tsig_key_secret,
            algorithm,
            zones: Mutex::new(zones),
        })
    }

    fn sync_client(&self) -> Result<SyncClient<TcpClientConnection>, ProviderError> {
        let conn = TcpClientConnection::new(self.addr)
            .map_err(|e| ProviderError::Transient(format!("tcp connect to {} failed: {e}", self.addr)))?;
        let signer = TSigner::new(
            self.key_secret.clone(),
            self.algorithm.clone(),
            self.key_name.clone(),
            Duration::from_secs(300),
        )
        .map_err(|e| ProviderError::AuthError(format!("invalid TSIG signer: {e}")))?;
        Ok(SyncClient::with_signer(conn, signer))
    }

    fn to_rdata(record_type: RecordType, value: &str) -> Result<RData, ProviderError> {
        match record_type {
            RecordType::A => value
                .parse()
                .map(A)
                .map(RData::A)
                .map_err(|e| ProviderError::InvalidRequest(format!("bad A value {value}: {e}"))),
            RecordType::AAAA => value
                .parse()
                .map(AAAA)
                .map(RData::AAAA)
                .map_err(|e| ProviderError::InvalidRequest(format!("bad AAAA value {value}: {e}"))),
            RecordType::CNAME => Name::from_str(value)
                .map(CNAME)
                .map(RData::CNAME)
                .map_err(|e| ProviderError::InvalidRequest(format!("bad CNAME value {value}: {e}"))),
            RecordType::TXT => Ok(RData::TXT(TXT::new(vec![value.trim_matches('"').to_string()]))),
        }
    }

    fn to_hickory_type(record_type: RecordType) -> HickoryRecordType {
        match record_type {
            RecordType::A => HickoryRecordType::A,
            RecordType::AAAA => HickoryRecordType::AAAA,
            RecordType::CNAME => HickoryRecordType::CNAME,
            RecordType::TXT => HickoryRecordType::TXT,
        }
    }

    fn apply_one(
        &self,
        client: &SyncClient<TcpClientConnection>,
        origin: &Name,
        change: &Change,
    ) -> Result<(), ProviderError> {
        let name = Name::from_str(&change.record.key.name)
            .map_err(|e| ProviderError::InvalidRequest(format!("bad name: {e}")))?;
        let rtype = Self::to_hickory_type(change.record.key.record_type);

        // RFC 2136 has no in-place update; replace the rrset wholesale.
        if matches!(change.action, ChangeAction::Update | ChangeAction::Delete) {
            let stub = HickoryRecord::with(name.clone(), rtype, change.record.ttl as u32);
            client
                .delete_rrset(stub, origin.clone())
                .map_err(|e| ProviderError::Transient(format!("delete_rrset failed: {e}")))?;
        }

        if matches!(change.action, ChangeAction::Create | ChangeAction::Update) {
            for value in &change.record.values {
                let rdata = Self::to_rdata(change.record.key.record_type, value)?;
                let mut record = HickoryRecord::with(name.clone(), rtype, change.record.ttl as u32);
                record.set_data(Some(rdata));
                record.set_dns_class(DNSClass::IN);
                client
                    .create(record, origin.clone())
                    .map_err(|e| ProviderError::Transient(format!("create failed: {e}")))?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl crate::provider::ProviderHandler for Rfc2136Provider {
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
        let origin = Name::from_str(&zone.domain)
            .map_err(|e| ProviderError::InvalidRequest(format!("bad zone origin: {e}")))?;
        let client = self.sync_client()?;

        let mut outcomes = Vec::with_capacity(changes.len());
        for change in changes {
            match self.apply_one(&client, &origin, change) {
                Ok(()) => {
                    let mut zones = self.zones.lock().unwrap();
                    if let Some(z) = zones.get_mut(&zone.id) {
                        match change.action {
                            ChangeAction::Create | ChangeAction::Update => {
                                z.records.insert(change.record.key.clone(), change.record.clone());
                            }
                            ChangeAction::Delete => {
                                z.records.remove(&change.record.key);
                            }
                        }
                    }
                    outcomes.push(ChangeOutcome::Succeeded);
                }
                Err(e) => outcomes.push(ChangeOutcome::Failed(e)),
            }
        }
        Ok(outcomes)
    }

    async fn release(&self) {}
}

#[cfg(test)]
mod rfc2136_tests {
    use super::*;

    #[test]
    fn unsupported_tsig_algorithm_is_rejected() {
        let config = Rfc2136Config {
            primary_addr: "127.0.0.1:53".parse().unwrap(),
            tsig_key_name: "key.example.com".to_string(),
            tsig_key_secret: vec![1, 2, 3],
            tsig_algorithm: "hmac-sha1".to_string(),
            zone_origins: vec!["example.com".to_string()],
        };
        assert!(Rfc2136Provider::new(config).is_err());
    }

    #[test]
    fn valid_config_seeds_one_zone_per_origin() {
        let config = Rfc2136Config {
            primary_addr: "127.0.0.1:53".parse().unwrap(),
            tsig_key_name: "key.example.com".to_string(),
            tsig_key_secret: vec![1, 2, 3],
            tsig_algorithm: "hmac-sha256".to_string(),
            zone_origins: vec!["example.com".to_string(), "example.org".to_string()],
        };
        let provider = Rfc2136Provider::new(config).unwrap();
        assert_eq!(provider.zones.lock().unwrap().len(), 2);
    }
}
