// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The entry state machine (C5, spec §4.5).
//!
//! Grounded on the teacher's per-resource reconcile-function shape
//! (validate → act → write status, with `should_reconcile`/`status_changed`
//! guarding redundant API writes) generalized from BIND9 zone records to
//! `DNSEntry`'s provider-match-and-publish lifecycle.

use crate::context::Context;
use crate::crd::{Condition, DNSEntry, DNSEntryStatus, RecordType};
use crate::errors::{CoreError, ErrorKind, ReconcileError};
use crate::labels::FINALIZER_DNS_ENTRY;
use crate::provider::{ChangeAction, ChangeOutcome};
use crate::reconcilers::finalizers::{ensure_finalizer, remove_finalizer};
use crate::reconcilers::status::create_condition;
use crate::reconcilers::{should_reconcile, status_changed};
use crate::record::{RecordKey, RecordSet};
use crate::registry::Selection;
use crate::zonereconciler::{reconcile_zone, PendingChange};
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Resource, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const RESOURCE_KIND: &str = "DNSEntry";

/// Validate a `DNSEntry`'s invariants (spec §3): exactly one of
/// `targets`/`text` is required by the spec's data model, but this crate's
/// CRD collapses `targets`/`text` into one `targets` field typed per
/// `recordType`, so validation instead checks type-appropriate target
/// shape, and that `setIdentifier` accompanies any `routingPolicy`.
fn validate(entry: &DNSEntry) -> Result<(), String> {
    let spec = &entry.spec;
    if spec.dns_name.trim().is_empty() {
        return Err("dnsName must not be empty".to_string());
    }
    if spec.targets.is_empty() {
        return Err("targets must not be empty".to_string());
    }
    if spec.record_type == RecordType::CNAME && spec.targets.len() != 1 {
        return Err("CNAME entries must declare exactly one target".to_string());
    }
    if let Some(policy) = &spec.routing_policy {
        if policy.set_identifier.trim().is_empty() {
            return Err("routingPolicy requires a non-empty setIdentifier".to_string());
        }
    } else if spec.set_identifier.is_some() {
        return Err("setIdentifier requires a routingPolicy".to_string());
    }
    Ok(())
}

fn desired_record(entry: &DNSEntry, default_ttl: i64) -> RecordSet {
    let key = RecordKey::new(
        &entry.spec.dns_name,
        entry.spec.record_type,
        entry
            .spec
            .routing_policy
            .as_ref()
            .map(|p| p.set_identifier.as_str()),
    );
    let values: Vec<String> = if entry.spec.record_type == RecordType::TXT {
        entry.spec.targets.iter().map(|v| crate::record::quote_txt(v)).collect()
    } else if entry.spec.record_type == RecordType::CNAME {
        entry
            .spec
            .targets
            .iter()
            .map(|v| crate::record::normalize_cname_target(v))
            .collect()
    } else {
        entry.spec.targets.clone()
    };
    RecordSet::new(key, entry.spec.ttl.unwrap_or(default_ttl), values)
}

fn entry_key(entry: &DNSEntry) -> String {
    format!("{}/{}", entry.namespace().unwrap_or_default(), entry.name_any())
}

async fn write_status(
    client: &kube::Client,
    entry: &DNSEntry,
    state: &str,
    condition: Condition,
    provider: Option<String>,
    zone: Option<String>,
    retry_count: u32,
) -> anyhow::Result<()> {
    let namespace = entry.namespace().unwrap_or_default();
    let mut status = entry.status.clone().unwrap_or_default();

    let changed = status_changed(&status.state, &Some(state.to_string()))
        || status_changed(&status.provider, &provider)
        || status_changed(&status.zone, &zone);
    if !changed && retry_count == status.retry_count {
        return Ok(());
    }

    status.state = Some(state.to_string());
    status.provider = provider;
    status.zone = zone;
    status.observed_generation = entry.metadata.generation;
    status.retry_count = retry_count;
    status.conditions = vec![condition];

    let api: Api<DNSEntry> = Api::namespaced(client.clone(), &namespace);
    api.patch_status(
        &entry.name_any(),
        &PatchParams::default(),
        &Patch::Merge(serde_json::json!({ "status": status })),
    )
    .await?;
    Ok(())
}

/// The `DNSEntry` reconcile function, driven by `kube::runtime::Controller`.
pub async fn reconcile(entry: Arc<DNSEntry>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let key = entry_key(&entry);
    let started = std::time::Instant::now();

    if entry.meta().deletion_timestamp.is_some() {
        return handle_deletion(&entry, &ctx).await.map_err(Into::into);
    }

    ensure_finalizer(&ctx.client, &*entry, FINALIZER_DNS_ENTRY)
        .await
        .map_err(ReconcileError)?;

    if !should_reconcile(entry.metadata.generation, entry.status.as_ref().and_then(|s| s.observed_generation)) {
        return Ok(Action::await_change());
    }

    if let Err(message) = validate(&entry) {
        warn!(entry = %key, reason = %message, "DNSEntry failed validation");
        write_status(
            &ctx.client,
            &entry,
            "Invalid",
            create_condition("Ready", "False", ErrorKind::Invalid.status_reason(), &message),
            None,
            None,
            0,
        )
        .await
        .map_err(ReconcileError)?;
        ctx.metrics.record_error(RESOURCE_KIND, ErrorKind::Invalid.status_reason());
        return Ok(Action::await_change());
    }

    let selection = ctx.registry.select(&entry.spec.dns_name);
    let (provider_key, zone_id) = match selection {
        Selection::Matched { provider_key, zone_id } => (provider_key, zone_id),
        Selection::NoMatch { reason } => {
            info!(entry = %key, reason = %reason, "no matching provider");
            write_status(
                &ctx.client,
                &entry,
                "Pending",
                create_condition("Ready", "False", ErrorKind::NoMatch.status_reason(), &reason),
                None,
                None,
                0,
            )
            .await
            .map_err(ReconcileError)?;
            return Ok(Action::requeue(Duration::from_secs(30)));
        }
    };

    let Some(provider) = ctx.registry.get_handler(&provider_key) else {
        return Ok(Action::requeue(Duration::from_secs(10)));
    };
    let Some(zone) = ctx.registry.zone(&provider_key, &zone_id) else {
        return Ok(Action::requeue(Duration::from_secs(10)));
    };

    ctx.rate_limiters
        .get_or_create(
            &provider_key,
            crate::constants::DEFAULT_RATE_LIMIT_REQUESTS_PER_DAY,
            crate::constants::DEFAULT_RATE_LIMIT_BURST,
        )
        .accept()
        .await;

    let ttl_override = ctx
        .registry
        .cache_ttl_override(&zone.domain, provider.type_name());
    let ttl_override = ttl_override.map(Duration::from_secs);

    let record = desired_record(&entry, crate::constants::DEFAULT_ENTRY_TTL_SECS);
    let pending = vec![PendingChange {
        action: ChangeAction::Create,
        record,
        entry_key: key.clone(),
    }];

    let report = {
        // C8 (spec §4.7/§5): serialize writes to this zone across every
        // concurrently-running entry reconcile.
        let _zone_lock = ctx.zone_locks.lock(&zone.id).await;
        reconcile_zone(&ctx.zone_cache, provider.as_ref(), &zone, ttl_override, pending)
            .await
            .map_err(|e| ReconcileError(anyhow::anyhow!(e)))?
    };

    let outcome = report
        .outcomes
        .iter()
        .find(|o| o.entry_key == key)
        .map(|o| o.outcome.clone());

    let prior_retries = entry.status.as_ref().map_or(0, |s| s.retry_count);
    match outcome {
        None => {
            // No diff: already converged (idempotence, spec §8 property 6).
            write_status(
                &ctx.client,
                &entry,
                "Ready",
                create_condition("Ready", "True", "Ready", "entry published"),
                Some(provider_key),
                Some(zone_id),
                0,
            )
            .await
            .map_err(ReconcileError)?;
            Ok(Action::requeue(Duration::from_secs(300)))
        }
        Some(ChangeOutcome::Succeeded) => {
            ctx.metrics
                .record_reconciliation_success(RESOURCE_KIND, started.elapsed());
            write_status(
                &ctx.client,
                &entry,
                "Ready",
                create_condition("Ready", "True", "Ready", "entry published"),
                Some(provider_key),
                Some(zone_id),
                0,
            )
            .await
            .map_err(ReconcileError)?;
            Ok(Action::requeue(Duration::from_secs(300)))
        }
        Some(ChangeOutcome::Invalid(err)) => {
            let core: CoreError = err.into();
            ctx.metrics.record_error(RESOURCE_KIND, core.status_reason());
            write_status(
                &ctx.client,
                &entry,
                "Invalid",
                create_condition("Ready", "False", core.status_reason(), &core.message),
                None,
                None,
                0,
            )
            .await
            .map_err(ReconcileError)?;
            Ok(Action::await_change())
        }
        Some(ChangeOutcome::Failed(err)) => {
            let core: CoreError = err.into();
            ctx.metrics.record_reconciliation_error(RESOURCE_KIND, started.elapsed());
            let retries = prior_retries + 1;
            let state = if retries > ctx.config.entry_max_retries {
                "Error"
            } else {
                "Pending"
            };
            write_status(
                &ctx.client,
                &entry,
                state,
                create_condition("Ready", "False", core.status_reason(), &core.message),
                Some(provider_key),
                Some(zone_id),
                retries,
            )
            .await
            .map_err(ReconcileError)?;
            let mut backoff = crate::reconcilers::retry::entry_backoff();
            let mut wait = Duration::from_secs(crate::constants::ENTRY_RETRY_BASE_SECS);
            for _ in 0..retries {
                wait = backoff.next_backoff().unwrap_or(wait);
            }
            Ok(Action::requeue(wait))
        }
    }
}

async fn handle_deletion(entry: &DNSEntry, ctx: &Context) -> anyhow::Result<Action> {
    let key = entry_key(entry);
    if !entry
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.contains(&FINALIZER_DNS_ENTRY.to_string()))
    {
        return Ok(Action::await_change());
    }

    let status = entry.status.clone().unwrap_or_default();
    let (Some(provider_key), Some(zone_id)) = (status.provider, status.zone) else {
        // Never published: safe to drop the finalizer immediately.
        remove_finalizer(&ctx.client, entry, FINALIZER_DNS_ENTRY).await?;
        return Ok(Action::await_change());
    };

    let Some(provider) = ctx.registry.get_handler(&provider_key) else {
        return Ok(Action::requeue(Duration::from_secs(10)));
    };
    let Some(zone) = ctx.registry.zone(&provider_key, &zone_id) else {
        remove_finalizer(&ctx.client, entry, FINALIZER_DNS_ENTRY).await?;
        return Ok(Action::await_change());
    };

    let record = desired_record(entry, crate::constants::DEFAULT_ENTRY_TTL_SECS);
    let pending = vec![PendingChange {
        action: ChangeAction::Delete,
        record,
        entry_key: key.clone(),
    }];

    let report = {
        let _zone_lock = ctx.zone_locks.lock(&zone.id).await;
        reconcile_zone(&ctx.zone_cache, provider.as_ref(), &zone, None, pending)
            .await
            .map_err(|e| anyhow::anyhow!(e))?
    };
    let failed = report
        .outcomes
        .iter()
        .any(|o| matches!(o.outcome, ChangeOutcome::Failed(_)));
    if failed {
        return Ok(Action::requeue(Duration::from_secs(30)));
    }

    info!(entry = %key, "DNSEntry record confirmed removed, releasing finalizer");
    remove_finalizer(&ctx.client, entry, FINALIZER_DNS_ENTRY).await?;
    Ok(Action::await_change())
}

#[cfg(test)]
mod entry_tests {
    use super::*;
    use crate::crd::{DNSEntrySpec, RoutingPolicy};
    use std::collections::BTreeMap;

    fn base_spec() -> DNSEntrySpec {
        DNSEntrySpec {
            dns_name: "www.example.com".to_string(),
            record_type: RecordType::A,
            targets: vec!["192.0.2.1".to_string()],
            ttl: Some(300),
            set_identifier: None,
            routing_policy: None,
            provider_ref: None,
            cname_lookup_interval: None,
        }
    }

    fn entry_with_spec(spec: DNSEntrySpec) -> DNSEntry {
        DNSEntry::new("www", spec)
    }

    #[test]
    fn valid_entry_passes() {
        assert!(validate(&entry_with_spec(base_spec())).is_ok());
    }

    #[test]
    fn empty_targets_is_invalid() {
        let mut spec = base_spec();
        spec.targets = vec![];
        assert!(validate(&entry_with_spec(spec)).is_err());
    }

    #[test]
    fn cname_with_multiple_targets_is_invalid() {
        let mut spec = base_spec();
        spec.record_type = RecordType::CNAME;
        spec.targets = vec!["a.example.com".to_string(), "b.example.com".to_string()];
        assert!(validate(&entry_with_spec(spec)).is_err());
    }

    #[test]
    fn routing_policy_requires_set_identifier() {
        let mut spec = base_spec();
        spec.routing_policy = Some(RoutingPolicy {
            policy_type: "weighted".to_string(),
            set_identifier: String::new(),
            parameters: BTreeMap::new(),
        });
        assert!(validate(&entry_with_spec(spec)).is_err());
    }

    #[test]
    fn desired_record_quotes_txt_values() {
        let mut spec = base_spec();
        spec.record_type = RecordType::TXT;
        spec.targets = vec!["hello".to_string()];
        let entry = entry_with_spec(spec);
        let record = desired_record(&entry, 300);
        assert!(record.values.contains("\"hello\""));
    }
}
