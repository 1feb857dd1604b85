// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label, annotation, and finalizer constants used across all reconcilers.
//!
//! This module defines standard Kubernetes labels plus the
//! `dns.gardener.cloud/*` annotations recognized on `DNSEntry`-producing
//! source objects (spec §6), to ensure consistency across the codebase.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture.
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool managing the operation of an application.
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the application.
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for a unique name identifying the instance of an application.
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the name of a higher-level application this one is part of.
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/part-of` indicating this resource is part of ferrodns.
pub const PART_OF_FERRODNS: &str = "ferrodns";

/// Component value for the entry reconciler.
pub const COMPONENT_ENTRY: &str = "dns-entry";

/// Component value for the provider reconciler.
pub const COMPONENT_PROVIDER: &str = "dns-provider";

/// Value for `app.kubernetes.io/managed-by` when a resource is managed by ferrodns.
pub const MANAGED_BY_FERRODNS: &str = "ferrodns";

// ============================================================================
// Annotations recognized on DNSEntry-producing source objects (spec §6)
// ============================================================================

/// Comma-separated DNS names (or `*`/`all`) a source object should get entries for.
pub const ANNOTATION_DNSNAMES: &str = "dns.gardener.cloud/dnsnames";

/// TTL override in seconds.
pub const ANNOTATION_TTL: &str = "dns.gardener.cloud/ttl";

/// CNAME lookup interval override in seconds.
pub const ANNOTATION_CNAME_LOOKUP_INTERVAL: &str = "dns.gardener.cloud/cname-lookup-interval";

/// Routing policy, JSON-encoded per spec.
pub const ANNOTATION_ROUTING_POLICY: &str = "dns.gardener.cloud/routing-policy";

/// Controller class tag; an entry is processed only if its class matches ours.
pub const ANNOTATION_CLASS: &str = "dns.gardener.cloud/class";

/// IP stack selector: `ipv4`, `ipv6`, or `dual-stack`.
pub const ANNOTATION_IP_STACK: &str = "dns.gardener.cloud/ip-stack";

/// When `"true"`, the source object is ignored entirely.
pub const ANNOTATION_IGNORE: &str = "dns.gardener.cloud/ignore";

/// Explicit target override (bypasses discovery from the source object's status).
pub const ANNOTATION_TARGETS: &str = "dns.gardener.cloud/targets";

/// Ingress-specific source override.
pub const ANNOTATION_INGRESS: &str = "dns.gardener.cloud/ingress";

/// Default controller class used when no `dns.gardener.cloud/class` annotation is present.
pub const DEFAULT_CONTROLLER_CLASS: &str = "default";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer for `DNSEntry` resources (C9): held until the provider record is confirmed gone.
pub const FINALIZER_DNS_ENTRY: &str = "dns.gardener.cloud/ferrodns-entry-finalizer";

/// Finalizer for `DNSProvider` resources: refuses removal while any entry still
/// claims a record in one of the provider's zones.
pub const FINALIZER_DNS_PROVIDER: &str = "dns.gardener.cloud/ferrodns-provider-finalizer";

/// Finalizer for `DNSHostedZonePolicy` resources.
pub const FINALIZER_DNS_HOSTED_ZONE_POLICY: &str =
    "dns.gardener.cloud/ferrodns-zonepolicy-finalizer";

/// Finalizer for `DNSAnnotation` resources: held until the generated `DNSEntry` set is deleted.
pub const FINALIZER_DNS_ANNOTATION: &str = "dns.gardener.cloud/ferrodns-annotation-finalizer";

#[cfg(test)]
mod labels_tests {
    use super::*;

    #[test]
    fn annotation_keys_share_the_gardener_namespace() {
        for key in [
            ANNOTATION_DNSNAMES,
            ANNOTATION_TTL,
            ANNOTATION_CNAME_LOOKUP_INTERVAL,
            ANNOTATION_ROUTING_POLICY,
            ANNOTATION_CLASS,
            ANNOTATION_IP_STACK,
            ANNOTATION_IGNORE,
            ANNOTATION_TARGETS,
            ANNOTATION_INGRESS,
        ] {
            assert!(key.starts_with("dns.gardener.cloud/"));
        }
    }
}
