// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The `DNSHostedZonePolicy` reconciler (spec §9 supplement): a
//! cluster-scoped override of zone-selection priority and cache TTL for a
//! matched set of hosted zones.
//!
//! `DNSHostedZonePolicy` is cluster-scoped, unlike every other CRD in this
//! crate, so this reconciler is the only one built on the cluster-scoped
//! finalizer helpers in `reconcilers/finalizers.rs` rather than the
//! namespaced ones `entry.rs`/`provider.rs`/`annotation.rs` use.
//!
//! [`crate::registry::ProviderRegistry::set_zone_policies`] replaces the
//! whole policy list atomically (it has no per-key upsert), so every
//! reconcile re-lists all live `DNSHostedZonePolicy` objects from the
//! reflector store and republishes the complete set, mirroring the
//! teacher's `src/selector.rs` store-scan pattern.

use crate::context::Context;
use crate::crd::{DNSHostedZonePolicy, DNSHostedZonePolicyStatus};
use crate::errors::ReconcileError;
use crate::labels::FINALIZER_DNS_HOSTED_ZONE_POLICY;
use crate::reconcilers::finalizers::{
    ensure_cluster_finalizer, handle_cluster_deletion, FinalizerCleanup,
};
use crate::reconcilers::status::create_condition;
use crate::reconcilers::{should_reconcile, status_changed};
use crate::registry::ZonePolicy;
use anyhow::Result;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Client, Resource, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const RESOURCE_KIND: &str = "DNSHostedZonePolicy";

fn to_zone_policy(policy: &DNSHostedZonePolicy) -> ZonePolicy {
    ZonePolicy {
        domains: policy.spec.selector.domains.clone(),
        provider_type: policy.spec.selector.provider_type.clone(),
        cache_ttl_seconds: policy.spec.cache_ttl_seconds,
        priority: policy.spec.priority,
    }
}

/// Re-list every live `DNSHostedZonePolicy` from the store and republish the
/// full set into the registry.
fn refresh_zone_policies(ctx: &Context) {
    let policies: Vec<ZonePolicy> = ctx
        .stores
        .all_zone_policies()
        .iter()
        .map(|p| to_zone_policy(p))
        .collect();
    ctx.registry.set_zone_policies(policies);
}

async fn write_status(client: &Client, policy: &DNSHostedZonePolicy, matched: i32) -> Result<()> {
    let mut status = policy.status.clone().unwrap_or_default();

    let new_condition = create_condition("Ready", "True", "PolicyApplied", "zone policy published to registry");
    let existing = status.conditions.first().cloned();
    let changed = crate::reconcilers::status::condition_changed(&existing, &new_condition)
        || status_changed(&status.matched_zone_count, &Some(matched));
    if !changed {
        return Ok(());
    }

    status.conditions = vec![new_condition];
    status.observed_generation = policy.metadata.generation;
    status.matched_zone_count = Some(matched);

    let status: DNSHostedZonePolicyStatus = status;
    let api: Api<DNSHostedZonePolicy> = Api::all(client.clone());
    api.patch_status(
        &policy.name_any(),
        &PatchParams::default(),
        &Patch::Merge(serde_json::json!({ "status": status })),
    )
    .await?;
    Ok(())
}

/// The `DNSHostedZonePolicy` reconcile function.
pub async fn reconcile(policy: Arc<DNSHostedZonePolicy>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    if policy.meta().deletion_timestamp.is_some() {
        let result = handle_cluster_deletion(&ctx.client, &*policy, FINALIZER_DNS_HOSTED_ZONE_POLICY)
            .await
            .map(|()| Action::await_change())
            .map_err(Into::into);
        refresh_zone_policies(&ctx);
        return result;
    }

    ensure_cluster_finalizer(&ctx.client, &*policy, FINALIZER_DNS_HOSTED_ZONE_POLICY)
        .await
        .map_err(ReconcileError)?;

    if !should_reconcile(
        policy.metadata.generation,
        policy.status.as_ref().and_then(|s| s.observed_generation),
    ) {
        refresh_zone_policies(&ctx);
        return Ok(Action::await_change());
    }

    refresh_zone_policies(&ctx);
    let matched = ctx.registry.matching_zone_count(
        &policy.spec.selector.domains,
        policy.spec.selector.provider_type.as_deref(),
    );

    info!(policy = %policy.name_any(), matched, "DNSHostedZonePolicy published");
    if let Err(e) = write_status(&ctx.client, &policy, matched).await {
        ctx.metrics.record_error(RESOURCE_KIND, "status_write_failed");
        return Err(ReconcileError(e));
    }

    Ok(Action::requeue(Duration::from_secs(300)))
}

#[async_trait::async_trait]
impl FinalizerCleanup for DNSHostedZonePolicy {
    async fn cleanup(&self, _client: &Client) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod zonepolicy_tests {
    use super::*;
    use crate::crd::{DNSHostedZonePolicySpec, ZonePolicySelector};

    fn policy(domains: &[&str], provider_type: Option<&str>, priority: i32) -> DNSHostedZonePolicy {
        DNSHostedZonePolicy::new(
            "policy",
            DNSHostedZonePolicySpec {
                selector: ZonePolicySelector {
                    domains: domains.iter().map(|d| d.to_string()).collect(),
                    provider_type: provider_type.map(str::to_string),
                },
                cache_ttl_seconds: Some(30),
                priority,
            },
        )
    }

    #[test]
    fn to_zone_policy_carries_selector_and_priority() {
        let p = policy(&["example.com"], Some("route53"), 5);
        let zp = to_zone_policy(&p);
        assert_eq!(zp.domains, vec!["example.com".to_string()]);
        assert_eq!(zp.provider_type.as_deref(), Some("route53"));
        assert_eq!(zp.priority, 5);
        assert_eq!(zp.cache_ttl_seconds, Some(30));
    }
}
