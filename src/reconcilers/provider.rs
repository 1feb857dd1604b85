// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The `DNSProvider` reconciler: credential probe, activation, and the
//! effective domain/zone set (spec §4, "Provider lifecycle").
//!
//! Generalizes the teacher's `Bind9Instance` reconcile-then-patch-status
//! shape: probe the backend, build a live handler, register it in
//! [`crate::registry::ProviderRegistry`] (C6), and publish the result.

use crate::context::Context;
use crate::crd::{DNSEntry, DNSProvider, DNSProviderSpec, DNSProviderStatus};
use crate::errors::{CoreError, ErrorKind, ReconcileError};
use crate::labels::FINALIZER_DNS_PROVIDER;
use crate::provider::mock::MockProvider;
use crate::provider::remote::{RemoteConfig, RemoteProvider};
use crate::provider::rest::{RestBackend, RestProvider};
use crate::provider::rfc2136::{Rfc2136Config, Rfc2136Provider};
use crate::provider::route53::Route53Provider;
use crate::provider::{ProviderHandler, ProviderKind};
use crate::reconcilers::finalizers::{ensure_finalizer, FinalizerCleanup};
use crate::reconcilers::status::create_condition;
use crate::reconcilers::{should_reconcile, status_changed};
use crate::registry::RegisteredProvider;
use anyhow::{anyhow, Context as _, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Client, Resource, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const RESOURCE_KIND: &str = "DNSProvider";

fn provider_key(provider: &DNSProvider) -> String {
    format!("{}/{}", provider.namespace().unwrap_or_default(), provider.name_any())
}

/// REST backend types fronted by the shared [`RestProvider`] adapter.
const REST_PROVIDER_TYPES: &[&str] = &[
    "azure-dns",
    "google-clouddns",
    "cloudflare-dns",
    "alicloud-dns",
    "openstack-designate",
    "infoblox-dns",
    "netlify-dns",
];

/// Fetch a `DNSProvider`'s `Secret` and validate its `data` map against the
/// per-`providerType` key schema (spec §6, "Provider secret keys (per
/// type)"): distinct required/optional keys and validators per backend,
/// rather than one generic blob.
async fn load_credentials(
    client: &Client,
    provider: &DNSProviderSpec,
) -> Result<std::collections::BTreeMap<String, String>> {
    let secret_ref = provider
        .secret_ref
        .as_ref()
        .context("provider type requires secretRef")?;
    let namespace = secret_ref.namespace.clone().unwrap_or_default();
    let api: Api<Secret> = Api::namespaced(client.clone(), &namespace);
    let secret = api.get(&secret_ref.name).await.context("fetching provider secret")?;
    let data = secret.data.unwrap_or_default();
    crate::provider::credentials::validate(&provider.provider_type, &data)
        .with_context(|| format!("secret {} failed validation for provider type {}", secret_ref.name, provider.provider_type))
}

fn rest_provider_type(requested: &str) -> Option<&'static str> {
    REST_PROVIDER_TYPES.iter().find(|t| **t == requested).copied()
}

/// Build a live handler for a `DNSProvider`, probing credentials if needed.
async fn build_handler(client: &Client, spec: &DNSProviderSpec) -> Result<ProviderKind> {
    match spec.provider_type.as_str() {
        "mock" => Ok(ProviderKind::Mock(MockProvider::new())),
        "route53" => {
            let creds = load_credentials(client, spec).await?;
            let access_key = creds
                .get("AWS_ACCESS_KEY_ID")
                .context("route53 credential missing AWS_ACCESS_KEY_ID")?
                .clone();
            let secret_key = creds
                .get("AWS_SECRET_ACCESS_KEY")
                .context("route53 credential missing AWS_SECRET_ACCESS_KEY")?
                .clone();
            let region = creds.get("AWS_REGION").cloned().unwrap_or_else(|| "us-east-1".to_string());

            let credentials = aws_sdk_route53::config::Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "ferrodns-dnsprovider",
            );
            let config = aws_config::SdkConfig::builder()
                .region(aws_sdk_route53::config::Region::new(region))
                .credentials_provider(aws_sdk_route53::config::SharedCredentialsProvider::new(credentials))
                .build();
            Ok(ProviderKind::Route53(Route53Provider::new(&config)))
        }
        "remote" => {
            let creds = load_credentials(client, spec).await?;
            let endpoint = creds.get("ENDPOINT").context("remote credential missing ENDPOINT")?.clone();
            let client_identity_pem = creds
                .get("CLIENT_IDENTITY")
                .context("remote credential missing CLIENT_IDENTITY")?
                .as_bytes()
                .to_vec();
            let ca_bundle_pem = creds
                .get("CA_BUNDLE")
                .context("remote credential missing CA_BUNDLE")?
                .as_bytes()
                .to_vec();
            let provider = RemoteProvider::new(RemoteConfig {
                endpoint,
                client_identity_pem,
                ca_bundle_pem,
            })
            .map_err(|e| anyhow!(e))?;
            Ok(ProviderKind::Remote(provider))
        }
        "rfc2136" => {
            let creds = load_credentials(client, spec).await?;
            let primary_addr = creds
                .get("PRIMARY_ADDR")
                .context("rfc2136 credential missing PRIMARY_ADDR")?
                .parse()
                .context("rfc2136 PRIMARY_ADDR is not a valid socket address")?;
            let tsig_key_name = creds
                .get("TSIG_KEY_NAME")
                .context("rfc2136 credential missing TSIG_KEY_NAME")?
                .clone();
            let tsig_key_secret = creds
                .get("TSIG_KEY_SECRET")
                .context("rfc2136 credential missing TSIG_KEY_SECRET")?
                .as_bytes()
                .to_vec();
            let tsig_algorithm = creds.get("TSIG_ALGORITHM").cloned().unwrap_or_else(|| "hmac-sha256".to_string());
            let provider = Rfc2136Provider::new(Rfc2136Config {
                primary_addr,
                tsig_key_name,
                tsig_key_secret,
                tsig_algorithm,
                zone_origins: spec.domains.include.clone(),
            })
            .map_err(|e| anyhow!(e))?;
            Ok(ProviderKind::Rfc2136(provider))
        }
        other => {
            let provider_type = rest_provider_type(other)
                .with_context(|| format!("unknown provider type {other}"))?;
            let creds = load_credentials(client, spec).await?;
            let (base_url, bearer_token) = match other {
                "cloudflare-dns" => (
                    "https://api.cloudflare.com/client/v4".to_string(),
                    creds
                        .get("CLOUDFLARE_API_TOKEN")
                        .context("cloudflare-dns credential missing CLOUDFLARE_API_TOKEN")?
                        .clone(),
                ),
                "azure-dns" => (
                    "https://management.azure.com".to_string(),
                    creds
                        .get("AZURE_CLIENT_SECRET")
                        .context("azure-dns credential missing AZURE_CLIENT_SECRET")?
                        .clone(),
                ),
                "google-clouddns" => (
                    "https://dns.googleapis.com/dns/v1".to_string(),
                    creds
                        .get("serviceaccount.json")
                        .context("google-clouddns credential missing serviceaccount.json")?
                        .clone(),
                ),
                _ => (
                    creds.get("BASE_URL").context("rest credential missing BASE_URL")?.clone(),
                    creds
                        .get("BEARER_TOKEN")
                        .context("rest credential missing BEARER_TOKEN")?
                        .clone(),
                ),
            };
            Ok(ProviderKind::Rest(RestProvider::new(RestBackend {
                provider_type,
                base_url,
                bearer_token,
            })))
        }
    }
}

async fn write_status(
    client: &Client,
    provider: &DNSProvider,
    ready: bool,
    reason: &str,
    message: &str,
    domain_count: i32,
    zones: Vec<String>,
) -> Result<()> {
    let namespace = provider.namespace().unwrap_or_default();
    let mut status = provider.status.clone().unwrap_or_default();

    let new_condition = create_condition("Ready", if ready { "True" } else { "False" }, reason, message);
    let existing = status.conditions.first().cloned();
    let changed = crate::reconcilers::status::condition_changed(&existing, &new_condition)
        || status_changed(&status.domain_count, &Some(domain_count))
        || status.zones != zones;
    if !changed {
        return Ok(());
    }

    status.conditions = vec![new_condition];
    status.observed_generation = provider.metadata.generation;
    status.domain_count = Some(domain_count);
    status.zones = zones;

    let status: DNSProviderStatus = status;
    let api: Api<DNSProvider> = Api::namespaced(client.clone(), &namespace);
    api.patch_status(
        &provider.name_any(),
        &PatchParams::default(),
        &Patch::Merge(serde_json::json!({ "status": status })),
    )
    .await?;
    Ok(())
}

/// The `DNSProvider` reconcile function.
pub async fn reconcile(provider: Arc<DNSProvider>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let key = provider_key(&provider);

    if provider.meta().deletion_timestamp.is_some() {
        let result = crate::reconcilers::finalizers::handle_deletion(&ctx.client, &*provider, FINALIZER_DNS_PROVIDER).await;
        return match result {
            Ok(()) => {
                ctx.registry.remove_provider(&key);
                Ok(Action::await_change())
            }
            Err(e) => Err(ReconcileError(e)),
        };
    }

    ensure_finalizer(&ctx.client, &*provider, FINALIZER_DNS_PROVIDER)
        .await
        .map_err(ReconcileError)?;

    if provider.spec.disabled {
        ctx.registry.remove_provider(&key);
        write_status(&ctx.client, &provider, false, "Disabled", "provider is disabled", 0, vec![])
            .await
            .map_err(ReconcileError)?;
        return Ok(Action::await_change());
    }

    if !should_reconcile(provider.metadata.generation, provider.status.as_ref().and_then(|s| s.observed_generation)) {
        return Ok(Action::await_change());
    }

    let handler = match build_handler(&ctx.client, &provider.spec).await {
        Ok(h) => h,
        Err(e) => {
            warn!(provider = %key, error = %e, "DNSProvider activation failed");
            ctx.registry.remove_provider(&key);
            ctx.metrics.record_error(RESOURCE_KIND, ErrorKind::AuthError.status_reason());
            write_status(&ctx.client, &provider, false, ErrorKind::AuthError.status_reason(), &e.to_string(), 0, vec![])
                .await
                .map_err(ReconcileError)?;
            return Ok(Action::requeue(Duration::from_secs(60)));
        }
    };

    let zones = match handler.get_zones().await {
        Ok(zones) => zones,
        Err(e) => {
            let core: CoreError = e.into();
            warn!(provider = %key, error = %core, "DNSProvider getZones failed");
            ctx.registry.remove_provider(&key);
            write_status(&ctx.client, &provider, false, core.status_reason(), &core.message, 0, vec![])
                .await
                .map_err(ReconcileError)?;
            return Ok(Action::requeue(Duration::from_secs(core_retry_after(&core))));
        }
    };

    let rate_limit = provider.spec.rate_limit.as_ref();
    ctx.rate_limiters.get_or_create(
        &key,
        rate_limit.map_or(crate::constants::DEFAULT_RATE_LIMIT_REQUESTS_PER_DAY, |r| r.requests_per_day),
        rate_limit
            .and_then(|r| r.burst)
            .unwrap_or(crate::constants::DEFAULT_RATE_LIMIT_BURST),
    );

    let zone_ids: Vec<String> = zones.iter().map(|z| z.id.clone()).collect();
    ctx.registry.upsert_provider(RegisteredProvider {
        key: key.clone(),
        provider_type: provider.spec.provider_type.clone(),
        include: provider.spec.domains.include.clone(),
        exclude: provider.spec.domains.exclude.clone(),
        ready: true,
        zones,
    });
    ctx.registry.set_handler(&key, Arc::new(handler));

    info!(provider = %key, zones = zone_ids.len(), "DNSProvider activated");
    write_status(&ctx.client, &provider, true, "Ready", "provider activated", provider.spec.domains.include.len() as i32, zone_ids)
        .await
        .map_err(ReconcileError)?;

    Ok(Action::requeue(Duration::from_secs(300)))
}

fn core_retry_after(err: &CoreError) -> u64 {
    if err.is_transient() {
        30
    } else {
        300
    }
}

#[async_trait::async_trait]
impl FinalizerCleanup for DNSProvider {
    /// Refuses removal while any `DNSEntry` still claims a record in this
    /// provider's zones (spec §4.9). `reconcile`'s deletion branch only
    /// calls `ProviderRegistry::remove_provider` once this returns `Ok`, so
    /// an entry can't be orphaned by a provider disappearing out from under it.
    async fn cleanup(&self, client: &Client) -> Result<()> {
        let key = provider_key(self);
        let entries: Api<DNSEntry> = Api::all(client.clone());
        let claimants: Vec<String> = entries
            .list(&kube::api::ListParams::default())
            .await
            .context("listing DNSEntry to check for live claims before provider deletion")?
            .items
            .into_iter()
            .filter(|e| e.status.as_ref().and_then(|s| s.provider.as_deref()) == Some(key.as_str()))
            .map(|e| format!("{}/{}", e.namespace().unwrap_or_default(), e.name_any()))
            .collect();

        if claimants.is_empty() {
            return Ok(());
        }

        let message = format!("deletion blocked: still claimed by {}", claimants.join(", "));
        warn!(provider = %key, claimants = claimants.len(), "DNSProvider deletion blocked by live entries");
        write_status(client, self, false, "DeletionBlocked", &message, 0, self.status.as_ref().map_or_else(Vec::new, |s| s.zones.clone()))
            .await?;
        Err(anyhow!(message))
    }
}

#[cfg(test)]
mod provider_tests {
    use super::*;

    #[test]
    fn rest_provider_type_only_matches_known_backends() {
        assert_eq!(rest_provider_type("cloudflare-dns"), Some("cloudflare-dns"));
        assert_eq!(rest_provider_type("route53"), None);
    }

    #[test]
    fn core_retry_after_backs_off_less_for_transient_errors() {
        let transient = CoreError::transient("timeout");
        let fatal = CoreError::fatal("bad config");
        assert!(core_retry_after(&transient) < core_retry_after(&fatal));
    }
}
