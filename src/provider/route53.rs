// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! AWS Route53 backend adapter.

use crate::crd::RecordType;
use crate::provider::{Change, ChangeAction, ChangeOutcome, HostedZone, ProviderError};
use crate::record::{RecordKey, RecordSet, ZoneState};
use aws_sdk_route53::types::{
    Change as R53Change, ChangeAction as R53ChangeAction, ChangeBatch, ResourceRecord,
    ResourceRecordSet, RrType,
};
use aws_sdk_route53::Client;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Credentials and a live SDK client for one `DNSProvider` of type `route53`.
pub struct Route53Provider {
    client: Client,
}

impl Route53Provider {
    /// Build a client from an already-resolved AWS config, as assembled by
    /// [`crate::reconcilers::provider`] from the provider's `secretRef`.
    #[must_use]
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

fn to_rr_type(record_type: RecordType) -> RrType {
    match record_type {
        RecordType::A => RrType::A,
        RecordType::AAAA => RrType::Aaaa,
        RecordType::CNAME => RrType::Cname,
        RecordType::TXT => RrType::Txt,
    }
}

fn from_rr_type(rr_type: &RrType) -> Option<RecordType> {
    match rr_type {
        RrType::A => Some(RecordType::A),
        RrType::Aaaa => Some(RecordType::AAAA),
        RrType::Cname => Some(RecordType::CNAME),
        RrType::Txt => Some(RecordType::TXT),
        _ => None,
    }
}

fn classify_sdk_error(msg: String) -> ProviderError {
    let lower = msg.to_ascii_lowercase();
    if lower.contains("throttl") || lower.contains("rate exceeded") {
        ProviderError::ThrottlingError(msg)
    } else if lower.contains("accessdenied") || lower.contains("notauthorized") {
        ProviderError::AuthError(msg)
    } else if lower.contains("nosuchhostedzone") {
        ProviderError::NoSuchHostedZone(msg)
    } else if lower.contains("invalidchangebatch") || lower.contains("invalidinput") {
        ProviderError::InvalidRequest(msg)
    } else {
        ProviderError::Transient(msg)
    }
}

#[async_trait]
impl crate::provider::ProviderHandler for Route53Provider {
    async fn get_zones(&self) -> Result<Vec<HostedZone>, ProviderError> {
        let resp = self
            .client
            .list_hosted_zones()
            .send()
            .await
            .map_err(|e| classify_sdk_error(e.to_string()))?;

        Ok(resp
            .hosted_zones()
            .iter()
            .map(|z| {
                let domain = crate::record::normalize(z.name());
                let mut hasher = Sha256::new();
                hasher.update(domain.as_bytes());
                hasher.update(z.id().as_bytes());
                HostedZone {
                    id: z.id().to_string(),
                    domain,
                    forwarded_subzones: Vec::new(),
                    provider_type: "route53".to_string(),
                    key: format!("{:x}", hasher.finalize()),
                    is_private: z.config().is_some_and(|c| c.private_zone()),
                }
            })
            .collect())
    }

    async fn get_zone_state(&self, zone: &HostedZone) -> Result<ZoneState, ProviderError> {
        let mut records = Vec::new();
        let mut paginator = self
            .client
            .list_resource_record_sets()
            .hosted_zone_id(&zone.id)
            .into_paginator()
            .send();

        while let Some(page) = paginator.next().await {
            let page = page.map_err(|e| classify_sdk_error(e.to_string()))?;
            for rrset in page.resource_record_sets() {
                let Some(record_type) = from_rr_type(rrset.r#type()) else {
                    continue;
                };
                let values = rrset
                    .resource_records()
                    .iter()
                    .map(|r| r.value().to_string())
                    .collect::<Vec<_>>();
                let key = RecordKey::new(
                    rrset.name(),
                    record_type,
                    rrset.set_identifier().map(str::to_string).as_deref(),
                );
                records.push(RecordSet::new(
                    key,
                    rrset.ttl().unwrap_or(300),
                    values,
                ));
            }
        }
        Ok(ZoneState::new(records))
    }

    async fn execute_requests(
        &self,
        zone: &HostedZone,
        _desired_state: &ZoneState,
        changes: &[Change],
    ) -> Result<Vec<ChangeOutcome>, ProviderError> {
        let mut batch_changes = Vec::with_capacity(changes.len());
        for change in changes {
            let action = match change.action {
                ChangeAction::Create => R53ChangeAction::Create,
                ChangeAction::Update => R53ChangeAction::Upsert,
                ChangeAction::Delete => R53ChangeAction::Delete,
            };
            let resource_records: Vec<ResourceRecord> = change
                .record
                .values
                .iter()
                .map(|v| ResourceRecord::builder().value(v).build().expect("value set"))
                .collect();
            let rrset = ResourceRecordSet::builder()
                .name(&change.record.key.name)
                .r#type(to_rr_type(change.record.key.record_type))
                .ttl(change.record.ttl)
                .set_resource_records(Some(resource_records))
                .set_set_identifier(change.record.key.set_identifier.clone())
                .build()
                .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;
            batch_changes.push(
                R53Change::builder()
                    .action(action)
                    .resource_record_set(rrset)
                    .build()
                    .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?,
            );
        }

        let batch = ChangeBatch::builder()
            .set_changes(Some(batch_changes))
            .build()
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;

        match self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(&zone.id)
            .change_batch(batch)
            .send()
            .await
        {
            Ok(_) => Ok(changes.iter().map(|_| ChangeOutcome::Succeeded).collect()),
            Err(e) => {
                let err = classify_sdk_error(e.to_string());
                // Route53 applies a change batch atomically: either every
                // change in the batch lands, or none do.
                Ok(changes
                    .iter()
                    .map(|_| ChangeOutcome::Failed(err.clone()))
                    .collect())
            }
        }
    }

    async fn release(&self) {}
}

#[cfg(test)]
mod route53_tests {
    use super::*;

    #[test]
    fn throttling_messages_classify_as_throttled() {
        let err = classify_sdk_error("Rate exceeded".to_string());
        assert!(matches!(err, ProviderError::ThrottlingError(_)));
    }

    #[test]
    fn access_denied_classifies_as_auth_error() {
        let err = classify_sdk_error("AccessDenied: no permission".to_string());
        assert!(matches!(err, ProviderError::AuthError(_)));
    }

    #[test]
    fn rr_type_round_trips_for_supported_types() {
        for rt in [RecordType::A, RecordType::AAAA, RecordType::CNAME, RecordType::TXT] {
            assert_eq!(from_rr_type(&to_rr_type(rt)), Some(rt));
        }
    }
}
