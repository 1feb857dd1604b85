// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The generic "remote" backend: a vendor-neutral DNS service fronted by
//! an operator-supplied HTTP(S) endpoint, authenticated with mTLS instead
//! of a bearer token. Certificate issuance itself is out of scope (spec
//! §1); this adapter only consumes an already-materialized client
//! identity and CA bundle.

use crate::crd::RecordType;
use crate::provider::{Change, ChangeAction, ChangeOutcome, HostedZone, ProviderError};
use crate::record::{RecordKey, RecordSet, ZoneState};
use async_trait::async_trait;
use reqwest::{Certificate, Client, Identity, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// mTLS material and endpoint for a `remote` `DNSProvider`.
pub struct RemoteConfig {
    pub endpoint: String,
    /// PEM-encoded client certificate + key, as loaded from the provider's `secretRef`.
    pub client_identity_pem: Vec<u8>,
    /// PEM-encoded CA bundle used to verify the remote endpoint.
    pub ca_bundle_pem: Vec<u8>,
}

pub struct RemoteProvider {
    endpoint: String,
    client: Client,
}

impl RemoteProvider {
    /// # Errors
    ///
    /// Returns [`ProviderError::AuthError`] if the supplied PEM material
    /// cannot be parsed into a TLS identity or CA certificate.
    pub fn new(config: RemoteConfig) -> Result<Self, ProviderError> {
        let identity = Identity::from_pem(&config.client_identity_pem)
            .map_err(|e| ProviderError::AuthError(format!("invalid client identity: {e}")))?;
        let ca = Certificate::from_pem(&config.ca_bundle_pem)
            .map_err(|e| ProviderError::AuthError(format!("invalid CA bundle: {e}")))?;

        let client = Client::builder()
            .identity(identity)
            .add_root_certificate(ca)
            .use_rustls_tls()
            .build()
            .map_err(|e| ProviderError::AuthError(format!("TLS client build failed: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint,
            client,
        })
    }
}

#[derive(Deserialize)]
struct RemoteZone {
    id: String,
    domain: String,
}

#[derive(Deserialize)]
struct RemoteRecord {
    name: String,
    r#type: String,
    ttl: i64,
    values: Vec<String>,
}

fn classify_status(status: StatusCode, body: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthError(body),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::ThrottlingError(body),
        StatusCode::NOT_FOUND => ProviderError::NoSuchHostedZone(body),
        StatusCode::BAD_REQUEST => ProviderError::InvalidRequest(body),
        _ => ProviderError::Transient(body),
    }
}

#[async_trait]
impl crate::provider::ProviderHandler for RemoteProvider {
    async fn get_zones(&self) -> Result<Vec<HostedZone>, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/v1/zones", self.endpoint))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(status, resp.text().await.unwrap_or_default()));
        }
        let zones: Vec<RemoteZone> = resp
            .json()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        Ok(zones
            .into_iter()
            .map(|z| {
                let domain = crate::record::normalize(&z.domain);
                let mut hasher = Sha256::new();
                hasher.update(domain.as_bytes());
                HostedZone {
                    id: z.id,
                    domain,
                    forwarded_subzones: Vec::new(),
                    provider_type: "remote".to_string(),
                    key: format!("{:x}", hasher.finalize()),
                    is_private: false,
                }
            })
            .collect())
    }

    async fn get_zone_state(&self, zone: &HostedZone) -> Result<ZoneState, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/v1/zones/{}/records", self.endpoint, zone.id))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(status, resp.text().await.unwrap_or_default()));
        }
        let records: Vec<RemoteRecord> = resp
            .json()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        let records = records
            .into_iter()
            .filter_map(|r| {
                let record_type = match r.r#type.to_ascii_uppercase().as_str() {
                    "A" => RecordType::A,
                    "AAAA" => RecordType::AAAA,
                    "CNAME" => RecordType::CNAME,
                    "TXT" => RecordType::TXT,
                    _ => return None,
                };
                let key = RecordKey::new(&r.name, record_type, None);
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
            ttl: i64,
            values: &'a std::collections::BTreeSet<String>,
        }
        let wire: Vec<WireChange> = changes
            .iter()
            .map(|c| WireChange {
                action: match c.action {
                    ChangeAction::Create => "create",
                    ChangeAction::Update => "update",
                    ChangeAction::Delete => "delete",
                },
                name: &c.record.key.name,
                ttl: c.record.ttl,
                values: &c.record.values,
            })
            .collect();

        let resp = self
            .client
            .post(format!("{}/v1/zones/{}/records", self.endpoint, zone.id))
            .json(&wire)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(changes.iter().map(|_| ChangeOutcome::Succeeded).collect())
        } else {
            let err = classify_status(status, resp.text().await.unwrap_or_default());
            Ok(changes.iter().map(|_| ChangeOutcome::Failed(err.clone())).collect())
        }
    }

    async fn release(&self) {}
}

#[cfg(test)]
mod remote_tests {
    use super::*;

    #[test]
    fn bad_request_classifies_as_invalid() {
        let err = classify_status(StatusCode::BAD_REQUEST, "bad zone id".to_string());
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[test]
    fn malformed_identity_pem_is_an_auth_error_not_a_panic() {
        let result = RemoteProvider::new(RemoteConfig {
            endpoint: "https://dns.example.invalid".to_string(),
            client_identity_pem: b"not a pem".to_vec(),
            ca_bundle_pem: b"not a pem".to_vec(),
        });
        assert!(matches!(result, Err(ProviderError::AuthError(_))));
    }
}
