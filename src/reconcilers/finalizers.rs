// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic finalizer management for Kubernetes resources.
//!
//! This module provides reusable functions for adding, removing, and handling
//! finalizers on Kubernetes custom resources. It eliminates duplicate finalizer
//! management code across reconcilers.
//!
//! # Example
//!
//! ```rust,ignore
//! use ferrodns::reconcilers::finalizers::{ensure_finalizer, handle_deletion, FinalizerCleanup};
//! use ferrodns::crd::DNSEntry;
//! use kube::Client;
//! use anyhow::Result;
//!
//! const FINALIZER: &str = "dns.gardener.cloud/ferrodns-finalizer";
//!
//! #[async_trait::async_trait]
//! impl FinalizerCleanup for DNSEntry {
//!     async fn cleanup(&self, client: &Client) -> Result<()> {
//!         // Issue the DELETE change and wait for provider confirmation (C9).
//!         Ok(())
//!     }
//! }
//!
//! async fn reconcile(client: Client, entry: DNSEntry) -> Result<()> {
//!     // Ensure finalizer is present
//!     ensure_finalizer(&client, &entry, FINALIZER).await?;
//!
//!     // Handle deletion if resource is being deleted
//!     if entry.metadata.deletion_timestamp.is_some() {
//!         return handle_deletion(&client, &entry, FINALIZER).await;
//!     }
//!
//!     // Normal reconciliation logic...
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use kube::api::{Patch, PatchParams};
use kube::core::{ClusterResourceScope, NamespaceResourceScope};
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use tracing::info;

/// Trait for resources that require cleanup operations when being deleted.
///
/// Implement this trait to define custom cleanup logic that should run
/// before a finalizer is removed from a resource.
#[async_trait::async_trait]
pub trait FinalizerCleanup: Resource + ResourceExt + Clone {
    /// Perform cleanup operations before the finalizer is removed.
    ///
    /// This method is called when a resource with a deletion timestamp
    /// still has the finalizer present. Implement any cleanup logic needed
    /// before the resource is fully deleted.
    ///
    /// # Arguments
    ///
    /// * `client` - Kubernetes client for accessing the API
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` if cleanup succeeded, or an error if cleanup failed.
    /// If this method returns an error, the finalizer will NOT be removed and
    /// deletion will be blocked until cleanup succeeds.
    ///
    /// # Errors
    ///
    /// Should return an error if:
    /// - Child resources cannot be deleted
    /// - External systems cannot be cleaned up
    /// - Any other cleanup operation fails
    async fn cleanup(&self, client: &Client) -> Result<()>;
}

/// Add a finalizer to a resource if not already present.
///
/// This function checks if the specified finalizer is present on the resource,
/// and adds it if missing. The operation is idempotent - calling it multiple
/// times has no effect if the finalizer is already present.
///
/// # Arguments
///
/// * `client` - Kubernetes client for accessing the API
/// * `resource` - The resource to add the finalizer to
/// * `finalizer` - The finalizer string to add
///
/// # Returns
///
/// Returns `Ok(())` if the finalizer was added or already present.
///
/// # Errors
///
/// Returns an error if:
/// - The resource has no namespace (for namespaced resources)
/// - The API patch operation fails
///
/// # Example
///
/// ```rust,no_run
/// # use ferrodns::reconcilers::finalizers::ensure_finalizer;
/// # use ferrodns::crd::DNSEntry;
/// # use kube::Client;
/// # async fn example(client: Client, entry: DNSEntry) {
/// const FINALIZER: &str = "dns.gardener.cloud/ferrodns-finalizer";
/// ensure_finalizer(&client, &entry, FINALIZER).await.unwrap();
/// # }
/// ```
pub async fn ensure_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    // Check if finalizer is already present
    if resource
        .meta()
        .finalizers
        .as_ref()
        .is_none_or(|f| !f.contains(&finalizer.to_string()))
    {
        info!(
            "Adding finalizer {} to {}/{} {}",
            finalizer,
            namespace,
            name,
            T::kind(&())
        );

        let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
        finalizers.push(finalizer.to_string());

        let api: Api<T> = Api::namespaced(client.clone(), &namespace);
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        info!(
            "Successfully added finalizer {} to {}/{} {}",
            finalizer,
            namespace,
            name,
            T::kind(&())
        );
    }

    Ok(())
}

/// Remove a finalizer from a resource.
///
/// This function removes the specified finalizer from the resource if present.
/// The operation is idempotent - calling it multiple times has no effect if
/// the finalizer is already absent.
///
/// **Note:** Typically you should use `handle_deletion()` instead of calling
/// this function directly, as it performs cleanup before removing the finalizer.
///
/// # Arguments
///
/// * `client` - Kubernetes client for accessing the API
/// * `resource` - The resource to remove the finalizer from
/// * `finalizer` - The finalizer string to remove
///
/// # Returns
///
/// Returns `Ok(())` if the finalizer was removed or already absent.
///
/// # Errors
///
/// Returns an error if:
/// - The resource has no namespace (for namespaced resources)
/// - The API patch operation fails
pub async fn remove_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    // Check if finalizer is present
    if resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.contains(&finalizer.to_string()))
    {
        info!(
            "Removing finalizer {} from {}/{} {}",
            finalizer,
            namespace,
            name,
            T::kind(&())
        );

        let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
        finalizers.retain(|f| f != finalizer);

        let api: Api<T> = Api::namespaced(client.clone(), &namespace);
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        info!(
            "Successfully removed finalizer {} from {}/{} {}",
            finalizer,
            namespace,
            name,
            T::kind(&())
        );
    }

    Ok(())
}

/// Handle resource deletion with cleanup and finalizer removal.
///
/// This function orchestrates the complete deletion process:
/// 1. Logs that the resource is being deleted
/// 2. Calls the resource's `cleanup()` method to perform cleanup operations
/// 3. Removes the finalizer to allow Kubernetes to delete the resource
///
/// This function should be called when a resource has a deletion timestamp
/// and the finalizer is still present.
///
/// # Arguments
///
/// * `client` - Kubernetes client for accessing the API
/// * `resource` - The resource being deleted
/// * `finalizer` - The finalizer string to check and remove
///
/// # Returns
///
/// Returns `Ok(())` if cleanup and finalizer removal succeeded.
///
/// # Errors
///
/// Returns an error if:
/// - The cleanup operation fails
/// - The finalizer removal fails
///
/// If an error occurs, the finalizer will remain on the resource and deletion
/// will be blocked until the operation succeeds on a subsequent reconciliation.
///
/// # Example
///
/// ```text
/// use ferrodns::reconcilers::finalizers::{handle_deletion, FinalizerCleanup};
/// use ferrodns::crd::DNSEntry;
/// use kube::Client;
/// use anyhow::Result;
///
/// const FINALIZER: &str = "dns.gardener.cloud/ferrodns-finalizer";
///
/// async fn reconcile(client: Client, entry: DNSEntry) -> Result<()> {
///     if entry.metadata.deletion_timestamp.is_some() {
///         return handle_deletion(&client, &entry, FINALIZER).await;
///     }
///     // Normal reconciliation...
///     Ok(())
/// }
/// ```
pub async fn handle_deletion<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + FinalizerCleanup
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    info!("{} {}/{} is being deleted", T::kind(&()), namespace, name);

    // Only proceed if the finalizer is present
    if resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.contains(&finalizer.to_string()))
    {
        info!(
            "Running cleanup for {} {}/{}",
            T::kind(&()),
            namespace,
            name
        );

        // Perform cleanup operations
        resource.cleanup(client).await?;

        // Remove the finalizer
        remove_finalizer(client, resource, finalizer).await?;
    }

    Ok(())
}

/// Add a finalizer to a cluster-scoped resource if not already present.
///
/// This function is similar to `ensure_finalizer()` but works with cluster-scoped
/// resources that don't have a namespace. It checks if the specified finalizer is
/// present on the resource, and adds it if missing.
///
/// # Arguments
///
/// * `client` - Kubernetes client for accessing the API
/// * `resource` - The cluster-scoped resource to add the finalizer to
/// * `finalizer` - The finalizer string to add
///
/// # Returns
///
/// Returns `Ok(())` if the finalizer was added or already present.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
///
/// # Example
///
/// ```rust,no_run
/// # use ferrodns::reconcilers::finalizers::ensure_cluster_finalizer;
/// # use ferrodns::crd::DNSHostedZonePolicy;
/// # use kube::Client;
/// # async fn example(client: Client, policy: DNSHostedZonePolicy) {
/// const FINALIZER: &str = "dns.gardener.cloud/ferrodns-zonepolicy-finalizer";
/// ensure_cluster_finalizer(&client, &policy, FINALIZER).await.unwrap();
/// # }
/// ```
pub async fn ensure_cluster_finalizer<T>(
    client: &Client,
    resource: &T,
    finalizer: &str,
) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = ClusterResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let name = resource.name_any();

    // Check if finalizer is already present
    if resource
        .meta()
        .finalizers
        .as_ref()
        .is_none_or(|f| !f.contains(&finalizer.to_string()))
    {
        info!(
            "Adding finalizer {} to {} {}",
            finalizer,
            T::kind(&()),
            name
        );

        let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
        finalizers.push(finalizer.to_string());

        let api: Api<T> = Api::all(client.clone());
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        info!(
            "Successfully added finalizer {} to {} {}",
            finalizer,
            T::kind(&()),
            name
        );
    }

    Ok(())
}

/// Remove a finalizer from a cluster-scoped resource.
///
/// This function removes the specified finalizer from the cluster-scoped resource
/// if present. The operation is idempotent - calling it multiple times has no effect
/// if the finalizer is already absent.
///
/// **Note:** Typically you should use `handle_cluster_deletion()` instead of calling
/// this function directly, as it performs cleanup before removing the finalizer.
///
/// # Arguments
///
/// * `client` - Kubernetes client for accessing the API
/// * `resource` - The cluster-scoped resource to remove the finalizer from
/// * `finalizer` - The finalizer string to remove
///
/// # Returns
///
/// Returns `Ok(())` if the finalizer was removed or already absent.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn remove_cluster_finalizer<T>(
    client: &Client,
    resource: &T,
    finalizer: &str,
) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = ClusterResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let name = resource.name_any();

    // Check if finalizer is present
    if resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.contains(&finalizer.to_string()))
    {
        info!(
            "Removing finalizer {} from {} {}",
            finalizer,
            T::kind(&()),
            name
        );

        let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
        finalizers.retain(|f| f != finalizer);

        let api: Api<T> = Api::all(client.clone());
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        info!(
            "Successfully removed finalizer {} from {} {}",
            finalizer,
            T::kind(&()),
            name
        );
    }

    Ok(())
}

/// Handle cluster-scoped resource deletion with cleanup and finalizer removal.
///
/// This function orchestrates the complete deletion process for cluster-scoped resources:
/// 1. Logs that the resource is being deleted
/// 2. Calls the resource's `cleanup()` method to perform cleanup operations
/// 3. Removes the finalizer to allow Kubernetes to delete the resource
///
/// This function should be called when a cluster-scoped resource has a deletion
/// timestamp and the finalizer is still present.
///
/// # Arguments
///
/// * `client` - Kubernetes client for accessing the API
/// * `resource` - The cluster-scoped resource being deleted
/// * `finalizer` - The finalizer string to check and remove
///
/// # Returns
///
/// Returns `Ok(())` if cleanup and finalizer removal succeeded.
///
/// # Errors
///
/// Returns an error if:
/// - The cleanup operation fails
/// - The finalizer removal fails
///
/// If an error occurs, the finalizer will remain on the resource and deletion
/// will be blocked until the operation succeeds on a subsequent reconciliation.
///
/// # Example
///
/// ```text
/// use ferrodns::reconcilers::finalizers::{handle_cluster_deletion, FinalizerCleanup};
/// use ferrodns::crd::DNSHostedZonePolicy;
/// use kube::Client;
/// use anyhow::Result;
///
/// const FINALIZER: &str = "dns.gardener.cloud/ferrodns-zonepolicy-finalizer";
///
/// async fn reconcile(client: Client, policy: DNSHostedZonePolicy) -> Result<()> {
///     if policy.metadata.deletion_timestamp.is_some() {
///         return handle_cluster_deletion(&client, &policy, FINALIZER).await;
///     }
///     // Normal reconciliation...
///     Ok(())
/// }
/// ```
pub async fn handle_cluster_deletion<T>(
    client: &Client,
    resource: &T,
    finalizer: &str,
) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = ClusterResourceScope>
        + ResourceExt
        + FinalizerCleanup
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let name = resource.name_any();

    info!("{} {} is being deleted", T::kind(&()), name);

    // Only proceed if the finalizer is present
    if resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.contains(&finalizer.to_string()))
    {
        info!("Running cleanup for {} {}", T::kind(&()), name);

        // Perform cleanup operations
        resource.cleanup(client).await?;

        // Remove the finalizer
        remove_cluster_finalizer(client, resource, finalizer).await?;
    }

    Ok(())
}

#[cfg(test)]
mod finalizers_tests {
    use crate::crd::{DNSEntry, DNSEntrySpec, DNSProvider, DNSProviderSpec, DomainFilter, RecordType};
    use crate::reconcilers::finalizers::FinalizerCleanup;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use k8s_openapi::chrono::Utc;

    const TEST_FINALIZER: &str = "dns.gardener.cloud/test-finalizer";
    const TEST_NAMESPACE: &str = "test-namespace";
    const TEST_NAME: &str = "test-entry";

    fn entry_spec() -> DNSEntrySpec {
        DNSEntrySpec {
            dns_name: "www.example.com".to_string(),
            record_type: RecordType::A,
            targets: vec!["1.2.3.4".to_string()],
            ttl: None,
            set_identifier: None,
            routing_policy: None,
            provider_ref: None,
            cname_lookup_interval: None,
        }
    }

    fn create_test_entry() -> DNSEntry {
        DNSEntry {
            metadata: ObjectMeta {
                name: Some(TEST_NAME.to_string()),
                namespace: Some(TEST_NAMESPACE.to_string()),
                finalizers: None,
                deletion_timestamp: None,
                generation: Some(1),
                ..Default::default()
            },
            spec: entry_spec(),
            status: None,
        }
    }

    fn create_test_entry_with_finalizers(finalizers: Vec<String>) -> DNSEntry {
        DNSEntry {
            metadata: ObjectMeta {
                name: Some(TEST_NAME.to_string()),
                namespace: Some(TEST_NAMESPACE.to_string()),
                finalizers: Some(finalizers),
                deletion_timestamp: None,
                generation: Some(1),
                ..Default::default()
            },
            spec: entry_spec(),
            status: None,
        }
    }

    fn create_test_entry_being_deleted(finalizers: Vec<String>) -> DNSEntry {
        DNSEntry {
            metadata: ObjectMeta {
                name: Some(TEST_NAME.to_string()),
                namespace: Some(TEST_NAMESPACE.to_string()),
                finalizers: Some(finalizers),
                deletion_timestamp: Some(Time(Utc::now())),
                generation: Some(1),
                ..Default::default()
            },
            spec: entry_spec(),
            status: None,
        }
    }

    fn create_test_provider() -> DNSProvider {
        DNSProvider {
            metadata: ObjectMeta {
                name: Some(TEST_NAME.to_string()),
                namespace: Some(TEST_NAMESPACE.to_string()),
                finalizers: None,
                deletion_timestamp: None,
                generation: Some(1),
                ..Default::default()
            },
            spec: DNSProviderSpec {
                provider_type: "mock".to_string(),
                secret_ref: None,
                domains: DomainFilter::default(),
                zones: DomainFilter::default(),
                default_ttl: None,
                rate_limit: None,
                disabled: false,
            },
            status: None,
        }
    }

    #[test]
    fn finalizer_cleanup_trait_requires_async() {
        // Compile-time check that the cluster-scoped and namespaced resources
        // that rely on the generic FinalizerCleanup path still implement it.
        fn assert_impl<T: FinalizerCleanup>() {}
        assert_impl::<DNSProvider>();
        assert_impl::<crate::crd::DNSHostedZonePolicy>();
        assert_impl::<crate::crd::DNSAnnotation>();
    }

    #[test]
    fn entry_has_finalizer_check() {
        let without = create_test_entry();
        let with = create_test_entry_with_finalizers(vec![TEST_FINALIZER.to_string()]);

        assert!(without.metadata.finalizers.is_none());
        assert!(!without
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.contains(&TEST_FINALIZER.to_string())));

        assert!(with.metadata.finalizers.is_some());
        assert!(with
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.contains(&TEST_FINALIZER.to_string())));
    }

    #[test]
    fn entry_has_deletion_timestamp_check() {
        let normal = create_test_entry();
        let deleting = create_test_entry_being_deleted(vec![TEST_FINALIZER.to_string()]);

        assert!(normal.metadata.deletion_timestamp.is_none());
        assert!(deleting.metadata.deletion_timestamp.is_some());
    }

    #[test]
    fn finalizer_list_manipulation() {
        // Mirrors the push/retain sequence ensure_finalizer/remove_finalizer perform.
        let mut finalizers: Vec<String> = vec![];

        finalizers.push(TEST_FINALIZER.to_string());
        assert_eq!(finalizers.len(), 1);

        // Idempotency guard: don't add if already present.
        if !finalizers.contains(&TEST_FINALIZER.to_string()) {
            finalizers.push(TEST_FINALIZER.to_string());
        }
        assert_eq!(finalizers.len(), 1);

        let other = "dns.gardener.cloud/other-finalizer";
        finalizers.push(other.to_string());
        assert_eq!(finalizers.len(), 2);

        finalizers.retain(|f| f != TEST_FINALIZER);
        assert_eq!(finalizers.len(), 1);
        assert!(!finalizers.contains(&TEST_FINALIZER.to_string()));
        assert!(finalizers.contains(&other.to_string()));

        finalizers.retain(|f| f != other);
        assert!(finalizers.is_empty());
    }

    #[test]
    fn empty_finalizer_list_vs_none() {
        let none = create_test_entry();
        let empty = create_test_entry_with_finalizers(vec![]);

        assert!(none.metadata.finalizers.is_none());
        assert!(empty.metadata.finalizers.as_ref().unwrap().is_empty());

        assert!(!none
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.contains(&TEST_FINALIZER.to_string())));
        assert!(!empty
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.contains(&TEST_FINALIZER.to_string())));
    }

    #[test]
    fn deletion_timestamp_and_finalizer_combination() {
        // Being deleted with a finalizer: cleanup still needs to run.
        let case1 = create_test_entry_being_deleted(vec![TEST_FINALIZER.to_string()]);
        assert!(case1.metadata.deletion_timestamp.is_some());
        assert!(case1
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.contains(&TEST_FINALIZER.to_string())));

        // Being deleted without a finalizer: nothing left for handle_deletion to do.
        let case2 = create_test_entry_being_deleted(vec![]);
        assert!(case2.metadata.deletion_timestamp.is_some());
        assert!(case2.metadata.finalizers.as_ref().unwrap().is_empty());

        // Not being deleted, finalizer present: normal steady-state.
        let case3 = create_test_entry_with_finalizers(vec![TEST_FINALIZER.to_string()]);
        assert!(case3.metadata.deletion_timestamp.is_none());

        // Not being deleted, no finalizer: initial state before ensure_finalizer runs.
        let case4 = create_test_entry();
        assert!(case4.metadata.deletion_timestamp.is_none());
        assert!(case4.metadata.finalizers.is_none());
    }

    #[test]
    fn provider_resource_name_and_kind_are_set() {
        use kube::Resource;
        let provider = create_test_provider();
        assert_eq!(provider.metadata.name.as_ref().unwrap(), TEST_NAME);
        assert_eq!(DNSProvider::kind(&()), "DNSProvider");
        assert_eq!(DNSEntry::kind(&()), "DNSEntry");
    }
}
