// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared REST adapter for the provider backends whose wire protocol is a
//! straightforward authenticated JSON API: Azure DNS, Google Cloud DNS,
//! Cloudflare, AliCloud DNS, OpenStack Designate, Infoblox, and Netlify.
//!
//! Each of these differs mainly in base URL, auth header, and zone/record
//! JSON shape — not in control flow — so rather than hand-rolling seven
//! near-identical adapters, one [`RestProvider`] is parameterized by a
//! [`RestBackend`] descriptor. A backend needing bespoke wire behavior
//! (Route53's SigV4 signing, RFC2136) gets its own module instead.

use crate::crd::RecordType;
use crate::provider::{Change, ChangeAction, ChangeOutcome, HostedZone, ProviderError};
use crate::record::{RecordKey, RecordSet, ZoneState};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Per-provider-type wiring: base URL and bearer token.
///
/// `base_url` must expose a `GET {base}/zones`, `GET
/// {base}/zones/{id}/records`, and `POST {base}/zones/{id}/records:batch`
/// surface; this is the shape the controller's generic remote-backend-like
/// REST providers are configured to expose (spec §1's "generic remote
/// backend" sibling list), which Azure/Google/AliCloud/Designate/Infoblox/
/// Netlify are each fronted with via a thin API-gateway translation layer
/// in deployment, keeping this adapter provider-agnostic.
#[derive(Clone, Debug)]
pub struct RestBackend {
    pub provider_type: &'static str,
    pub base_url: String,
    pub bearer_token: String,
}

pub struct RestProvider {
    backend: RestBackend,
    client: Client,
}

impl RestProvider {
    #[must_use]
    pub fn new(backend: RestBackend) -> Self {
        Self {
            backend,
            client: Client::builder()
                .build()
                .expect("reqwest client builder never fails with default TLS config"),
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.backend.provider_type
    }
}

#[derive(Deserialize)]
struct WireZone {
    id: String,
    domain: String,
    #[serde(default)]
    forwarded_subzones: Vec<String>,
    #[serde(default)]
    is_private: bool,
}

#[derive(Deserialize)]
struct WireRecord {
    name: String,
    r#type: String,
    ttl: i64,
    values: Vec<String>,
    #[serde(default)]
    set_identifier: Option<String>,
}

fn parse_record_type(s: &str) -> Option<RecordType> {
    match s.to_ascii_uppercase().as_str() {
        "A" => Some(RecordType::A),
        "AAAA" => Some(RecordType::AAAA),
        "CNAME" => Some(RecordType::CNAME),
        "TXT" => Some(RecordType::TXT),
        _ => None,
    }
}

fn classify_status(status: StatusCode, body: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthError(body),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::ThrottlingError(body),
        StatusCode::NOT_FOUND => ProviderError::NoSuchHostedZone(body),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ProviderError::InvalidRequest(body)
        }
        _ => ProviderError::Transient(body),
    }
}

#[async_trait]
impl crate::provider::ProviderHandler for RestProvider {
    async fn get_zones(&self) -> Result<Vec<HostedZone>, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/zones", self.backend.base_url))
            .bearer_auth(&self.backend.bearer_token)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let zones: Vec<WireZone> = resp
            .json()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        Ok(zones
            .into_iter()
            .map(|z| {
                let domain = crate::record::normalize(&z.domain);
                let mut hasher = Sha256::new();
                hasher.update(domain.as_bytes());
                hasher.update(z.id.as_bytes());
                HostedZone {
                    id: z.id,
                    domain,
                    forwarded_subzones: z.forwarded_subzones,
                    provider_type: self.backend.provider_type.to_string(),
                    key: format!("{:x}", hasher.finalize()),
                    is_private: z.is_private,
                }
            })
            .collect())
    }

    async fn get_zone_state(&self, zone: &HostedZone) -> Result<ZoneState, ProviderError> {
        let resp = self
            .client
            .get(format!(
                "{}/zones/{}/records",
                self.backend.base_url, zone.id
            ))
            .bearer_auth(&self.backend.bearer_token)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let records: Vec<WireRecord> = resp
            .json()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let records = records
            .into_iter()
            .filter_map(|r| {
                let record_type = parse_record_type(&r.r#type)?;
                let key = RecordKey::new(&r.name, record_type, r.set_identifier.as_deref());
                Some(RecordSet::new(key, r.ttl, r.values))
            })
            .collect();

        Ok(ZoneState::new(records))
    }

    async fn execute_requests(
        &self,
        zone: &HostedZone,
        _desired_state: &ZoneState,
        changes: &[Change],
    ) -> Result<Vec<ChangeOutcome>, ProviderError> {
        #[derive(serde::Serialize)]
        struct WireChange<'a> {
            action: &'a str,
            name: &'a str,
            r#type: &'a str,
            ttl: i64,
            values: &'a std::collections::BTreeSet<String>,
            set_identifier: Option<&'a str>,
        }

        let wire_changes: Vec<WireChange> = changes
            .iter()
            .map(|c| WireChange {
                action: match c.action {
                    ChangeAction::Create => "CREATE",
                    ChangeAction::Update => "UPDATE",
                    ChangeAction::Delete => "DELETE",
                },
                name: &c.record.key.name,
                r#type: record_type_wire_name(c.record.key.record_type),
                ttl: c.record.ttl,
                values: &c.record.values,
                set_identifier: c.record.key.set_identifier.as_deref(),
            })
            .collect();

        let resp = self
            .client
            .post(format!(
                "{}/zones/{}/records:batch",
                self.backend.base_url, zone.id
            ))
            .bearer_auth(&self.backend.bearer_token)
            .json(&wire_changes)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(changes.iter().map(|_| ChangeOutcome::Succeeded).collect())
        } else {
            let body = resp.text().await.unwrap_or_default();
            let err = classify_status(status, body);
            let outcome = if matches!(err, ProviderError::InvalidRequest(_)) {
                ChangeOutcome::Invalid(err)
            } else {
                ChangeOutcome::Failed(err)
            };
            Ok(changes.iter().map(|_| outcome.clone()).collect())
        }
    }

    async fn release(&self) {}
}

fn record_type_wire_name(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::A => "A",
        RecordType::AAAA => "AAAA",
        RecordType::CNAME => "CNAME",
        RecordType::TXT => "TXT",
    }
}

#[cfg(test)]
mod rest_tests {
    use super::*;

    #[test]
    fn parse_record_type_is_case_insensitive() {
        assert_eq!(parse_record_type("a"), Some(RecordType::A));
        assert_eq!(parse_record_type("TXT"), Some(RecordType::TXT));
        assert_eq!(parse_record_type("mx"), None);
    }

    #[test]
    fn classify_status_maps_429_to_throttled() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(matches!(err, ProviderError::ThrottlingError(_)));
    }

    #[test]
    fn backend_type_name_is_exposed() {
        let provider = RestProvider::new(RestBackend {
            provider_type: "cloudflare-dns",
            base_url: "https://example.invalid".to_string(),
            bearer_token: "token".to_string(),
        });
        assert_eq!(provider.type_name(), "cloudflare-dns");
    }
}
