// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The `DNSAnnotation` reconciler (spec §9 supplement): translates the
//! documented annotation keys collected onto a `DNSAnnotation` by a source
//! controller (Ingress/Service/Gateway, out of scope here) into one
//! generated `DNSEntry` per requested name, since source controllers feed
//! entries that way rather than authoring `DNSEntry` by hand.
//!
//! Generalizes `src/reconcilers/entry.rs`'s reconcile shape: this
//! reconciler doesn't talk to a provider directly, it only projects onto
//! `DNSEntry`, which the entry reconciler (C5) then drives as usual.

use crate::context::Context;
use crate::crd::{DNSAnnotation, DNSAnnotationStatus, DNSEntry, DNSEntrySpec, RecordType};
use crate::errors::ReconcileError;
use crate::labels::FINALIZER_DNS_ANNOTATION;
use crate::reconcilers::finalizers::{ensure_finalizer, handle_deletion, FinalizerCleanup};
use crate::reconcilers::status::create_condition;
use crate::reconcilers::{should_reconcile, status_changed};
use anyhow::Result;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Client, Resource, ResourceExt};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const RESOURCE_KIND: &str = "DNSAnnotation";

fn infer_record_type(target: &str) -> RecordType {
    match target.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => RecordType::A,
        Ok(IpAddr::V6(_)) => RecordType::AAAA,
        Err(_) => RecordType::CNAME,
    }
}

/// Deterministic name for the `DNSEntry` generated from one `dnsName`, so
/// re-reconciling the same `DNSAnnotation` always targets the same entry.
fn generated_entry_name(annotation: &DNSAnnotation, index: usize) -> String {
    format!("{}-{}", annotation.name_any(), index)
}

fn desired_entry_spec(annotation: &DNSAnnotation, dns_name: &str) -> DNSEntrySpec {
    let record_type = annotation
        .spec
        .targets
        .first()
        .map_or(RecordType::A, |t| infer_record_type(t));
    DNSEntrySpec {
        dns_name: dns_name.to_string(),
        record_type,
        targets: annotation.spec.targets.clone(),
        ttl: annotation.spec.ttl,
        set_identifier: None,
        routing_policy: annotation.spec.routing_policy.clone(),
        provider_ref: None,
        cname_lookup_interval: None,
    }
}

async fn apply_entry(
    client: &Client,
    namespace: &str,
    name: &str,
    annotation: &DNSAnnotation,
    spec: &DNSEntrySpec,
) -> Result<()> {
    let api: Api<DNSEntry> = Api::namespaced(client.clone(), namespace);
    let owner_ref = annotation.controller_owner_ref(&()).expect("namespaced resource has a controller owner ref");
    let manifest = serde_json::json!({
        "apiVersion": format!("{}/{}", crate::constants::API_GROUP, crate::constants::API_VERSION),
        "kind": "DNSEntry",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "ownerReferences": [owner_ref],
        },
        "spec": spec,
    });
    api.patch(
        name,
        &PatchParams::apply("ferrodns-annotation-controller").force(),
        &Patch::Apply(&manifest),
    )
    .await?;
    Ok(())
}

async fn write_status(client: &Client, annotation: &DNSAnnotation, generated: Vec<String>) -> Result<()> {
    let namespace = annotation.namespace().unwrap_or_default();
    let mut status = annotation.status.clone().unwrap_or_default();

    let new_condition = create_condition("Ready", "True", "EntriesGenerated", "annotation projected to DNSEntry");
    let existing = status.conditions.first().cloned();
    let changed = crate::reconcilers::status::condition_changed(&existing, &new_condition)
        || status_changed(&Some(status.generated_entries.clone()), &Some(generated.clone()));
    if !changed {
        return Ok(());
    }

    status.conditions = vec![new_condition];
    status.observed_generation = annotation.metadata.generation;
    status.generated_entries = generated;

    let status: DNSAnnotationStatus = status;
    let api: Api<DNSAnnotation> = Api::namespaced(client.clone(), &namespace);
    api.patch_status(
        &annotation.name_any(),
        &PatchParams::default(),
        &Patch::Merge(serde_json::json!({ "status": status })),
    )
    .await?;
    Ok(())
}

/// The `DNSAnnotation` reconcile function.
pub async fn reconcile(annotation: Arc<DNSAnnotation>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    if annotation.meta().deletion_timestamp.is_some() {
        return handle_deletion(&ctx.client, &*annotation, FINALIZER_DNS_ANNOTATION)
            .await
            .map(|()| Action::await_change())
            .map_err(Into::into);
    }

    ensure_finalizer(&ctx.client, &*annotation, FINALIZER_DNS_ANNOTATION)
        .await
        .map_err(ReconcileError)?;

    if let Some(class) = &annotation.spec.class {
        if *class != ctx.config.controller_class {
            return Ok(Action::await_change());
        }
    }

    if !should_reconcile(
        annotation.metadata.generation,
        annotation.status.as_ref().and_then(|s| s.observed_generation),
    ) {
        return Ok(Action::await_change());
    }

    let namespace = annotation.namespace().unwrap_or_default();
    let mut generated = Vec::with_capacity(annotation.spec.dns_names.len());
    for (index, dns_name) in annotation.spec.dns_names.iter().enumerate() {
        let name = generated_entry_name(&annotation, index);
        let spec = desired_entry_spec(&annotation, dns_name);
        if let Err(e) = apply_entry(&ctx.client, &namespace, &name, &annotation, &spec).await {
            ctx.metrics.record_error(RESOURCE_KIND, "apply_entry_failed");
            return Err(ReconcileError(e));
        }
        generated.push(name);
    }

    info!(annotation = %annotation.name_any(), entries = generated.len(), "DNSAnnotation projected");
    write_status(&ctx.client, &annotation, generated)
        .await
        .map_err(ReconcileError)?;

    Ok(Action::requeue(Duration::from_secs(300)))
}

#[async_trait::async_trait]
impl FinalizerCleanup for DNSAnnotation {
    async fn cleanup(&self, client: &Client) -> Result<()> {
        let namespace = self.namespace().unwrap_or_default();
        let api: Api<DNSEntry> = Api::namespaced(client.clone(), &namespace);
        let generated = self
            .status
            .as_ref()
            .map(|s| s.generated_entries.clone())
            .unwrap_or_default();
        for name in generated {
            let _ = api.delete(&name, &kube::api::DeleteParams::default()).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod annotation_tests {
    use super::*;

    #[test]
    fn infers_a_record_for_ipv4_target() {
        assert_eq!(infer_record_type("192.0.2.1"), RecordType::A);
    }

    #[test]
    fn infers_aaaa_record_for_ipv6_target() {
        assert_eq!(infer_record_type("2001:db8::1"), RecordType::AAAA);
    }

    #[test]
    fn infers_cname_record_for_hostname_target() {
        assert_eq!(infer_record_type("lb.example.com"), RecordType::CNAME);
    }
}
