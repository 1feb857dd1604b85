// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{routing::get, Router};
use ferrodns::config::Config;
use ferrodns::constants::{
    DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_RENEW_DEADLINE_SECS,
    DEFAULT_LEASE_RETRY_PERIOD_SECS, ERROR_REQUEUE_DURATION_SECS, KIND_DNS_ANNOTATION,
    KIND_DNS_ENTRY, KIND_DNS_HOSTED_ZONE_POLICY, KIND_DNS_PROVIDER, TOKIO_WORKER_THREADS,
};
use ferrodns::context::{Context, Stores};
use ferrodns::crd::{DNSAnnotation, DNSEntry, DNSHostedZonePolicy, DNSProvider};
use ferrodns::metrics::{self, Metrics};
use ferrodns::ratelimit::RateLimiterRegistry;
use ferrodns::reconcilers::{annotation, entry, provider, zonepolicy};
use ferrodns::registry::ProviderRegistry;
use ferrodns::zonecache::ZoneCache;
use ferrodns::zonelock::ZoneLocks;
use futures::StreamExt;
use kube::{
    runtime::{controller::Action, reflector, watcher, Controller},
    Api, Client, ResourceExt,
};
use kube_lease_manager::{LeaseManager, LeaseManagerBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Initialize logging, honoring `RUST_LOG` and `RUST_LOG_FORMAT`.
fn initialize_logging(log_format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting ferrodns DNS reconciliation controller");
}

async fn initialize_client(config: &Config) -> Result<Client> {
    debug!("Initializing Kubernetes client");
    let kube_config = kube::Config::infer().await?;
    let client = Client::try_from(kube_config)?;
    info!(
        qps = config.kube_client_qps,
        burst = config.kube_client_burst,
        "Kubernetes client initialized"
    );
    Ok(client)
}

/// Build the shared [`Context`], spawning one reflector task per CRD type.
async fn initialize_shared_context(client: Client, config: Arc<Config>) -> Arc<Context> {
    info!("Initializing reflectors for all CRD types");

    let entries_api = Api::<DNSEntry>::all(client.clone());
    let providers_api = Api::<DNSProvider>::all(client.clone());
    let zone_policies_api = Api::<DNSHostedZonePolicy>::all(client.clone());
    let annotations_api = Api::<DNSAnnotation>::all(client.clone());

    let (entries_store, entries_writer) = reflector::store();
    let (providers_store, providers_writer) = reflector::store();
    let (zone_policies_store, zone_policies_writer) = reflector::store();
    let (annotations_store, annotations_writer) = reflector::store();

    tokio::spawn(async move {
        let stream = watcher(entries_api, watcher::Config::default());
        reflector(entries_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("DNSEntry reflector stream ended");
    });

    tokio::spawn(async move {
        let stream = watcher(providers_api, watcher::Config::default());
        reflector(providers_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("DNSProvider reflector stream ended");
    });

    tokio::spawn(async move {
        let stream = watcher(zone_policies_api, watcher::Config::default());
        reflector(zone_policies_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("DNSHostedZonePolicy reflector stream ended");
    });

    tokio::spawn(async move {
        let stream = watcher(annotations_api, watcher::Config::default());
        reflector(annotations_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("DNSAnnotation reflector stream ended");
    });

    let stores = Stores {
        dns_entries: entries_store,
        dns_providers: providers_store,
        dns_hosted_zone_policies: zone_policies_store,
        dns_annotations: annotations_store,
    };

    let context = Arc::new(Context {
        client,
        stores,
        zone_cache: Arc::new(ZoneCache::new(
            config.default_zone_cache_ttl,
            config.zone_conflict_cooldown,
        )),
        registry: Arc::new(ProviderRegistry::new()),
        zone_locks: Arc::new(ZoneLocks::new()),
        rate_limiters: Arc::new(RateLimiterRegistry::new()),
        metrics: Metrics,
        config,
    });

    info!("Shared context initialized with reflectors for all CRD types");
    context
}

/// Start the Prometheus metrics HTTP server.
fn start_metrics_server(config: &Config) -> tokio::task::JoinHandle<()> {
    let bind_address = config.metrics_bind_address.clone();
    let port = config.metrics_port;

    info!(bind_address = %bind_address, port, "Starting Prometheus metrics HTTP server");

    tokio::spawn(async move {
        async fn metrics_handler() -> String {
            match metrics::gather_metrics() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to gather metrics: {}", e);
                    String::from("# Error gathering metrics\n")
                }
            }
        }

        let app = Router::new().route("/metrics", get(metrics_handler));
        let bind_addr = format!("{bind_address}:{port}");
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind metrics server to {bind_addr}: {e}");
                return;
            }
        };

        info!("Metrics server listening on http://{bind_addr}/metrics");
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {e}");
        }
    })
}

/// Leader election configuration, loaded from `FERRODNS_*` environment variables.
struct LeaderElectionConfig {
    enabled: bool,
    lease_name: String,
    lease_namespace: String,
    identity: String,
    lease_duration: u64,
    renew_deadline: u64,
    retry_period: u64,
}

fn load_leader_election_config() -> LeaderElectionConfig {
    let enabled = std::env::var("FERRODNS_ENABLE_LEADER_ELECTION")
        .unwrap_or_else(|_| "true".to_string())
        .parse::<bool>()
        .unwrap_or(true);

    let lease_name =
        std::env::var("FERRODNS_LEASE_NAME").unwrap_or_else(|_| "ferrodns-leader".to_string());

    let lease_namespace = std::env::var("FERRODNS_LEASE_NAMESPACE")
        .or_else(|_| std::env::var("POD_NAMESPACE"))
        .unwrap_or_else(|_| "dns-system".to_string());

    let lease_duration = std::env::var("FERRODNS_LEASE_DURATION_SECONDS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_LEASE_DURATION_SECS);

    let renew_deadline = std::env::var("FERRODNS_LEASE_RENEW_DEADLINE_SECONDS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_LEASE_RENEW_DEADLINE_SECS);

    let retry_period = std::env::var("FERRODNS_LEASE_RETRY_PERIOD_SECONDS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_LEASE_RETRY_PERIOD_SECS);

    let identity = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("ferrodns-{}", rand::random::<u32>()));

    LeaderElectionConfig {
        enabled,
        lease_name,
        lease_namespace,
        identity,
        lease_duration,
        renew_deadline,
        retry_period,
    }
}

/// Run the four resource controllers concurrently with signal handling.
///
/// None of these controllers is expected to exit; if one does, the whole
/// process exits so the Kubernetes pod restart takes over.
async fn run_all_controllers(context: Arc<Context>) -> Result<()> {
    tokio::select! {
        result = run_entry_controller(context.clone()) => {
            error!("CRITICAL: DNSEntry controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("DNSEntry controller exited unexpectedly without error")
        }
        result = run_provider_controller(context.clone()) => {
            error!("CRITICAL: DNSProvider controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("DNSProvider controller exited unexpectedly without error")
        }
        result = run_zonepolicy_controller(context.clone()) => {
            error!("CRITICAL: DNSHostedZonePolicy controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("DNSHostedZonePolicy controller exited unexpectedly without error")
        }
        result = run_annotation_controller(context.clone()) => {
            error!("CRITICAL: DNSAnnotation controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("DNSAnnotation controller exited unexpectedly without error")
        }
    }
}

async fn run_entry_controller(context: Arc<Context>) -> Result<()> {
    info!("Starting DNSEntry controller");
    let api = Api::<DNSEntry>::all(context.client.clone());
    let concurrency = context.config.entry_pool_size as u16;
    Controller::new(api, watcher::Config::default())
        .concurrency(concurrency)
        .run(entry_wrapper, error_policy, context)
        .for_each(|_| futures::future::ready(()))
        .await;
    Ok(())
}

async fn entry_wrapper(obj: Arc<DNSEntry>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    reconcile_wrapper(KIND_DNS_ENTRY, obj.name_any(), entry::reconcile(obj, ctx)).await
}

async fn run_provider_controller(context: Arc<Context>) -> Result<()> {
    info!("Starting DNSProvider controller");
    let api = Api::<DNSProvider>::all(context.client.clone());
    let concurrency = context.config.provider_pool_size as u16;
    Controller::new(api, watcher::Config::default())
        .concurrency(concurrency)
        .run(provider_wrapper, error_policy, context)
        .for_each(|_| futures::future::ready(()))
        .await;
    Ok(())
}

async fn provider_wrapper(
    obj: Arc<DNSProvider>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    reconcile_wrapper(KIND_DNS_PROVIDER, obj.name_any(), provider::reconcile(obj, ctx)).await
}

async fn run_zonepolicy_controller(context: Arc<Context>) -> Result<()> {
    info!("Starting DNSHostedZonePolicy controller");
    let api = Api::<DNSHostedZonePolicy>::all(context.client.clone());
    let concurrency = context.config.provider_pool_size as u16;
    Controller::new(api, watcher::Config::default())
        .concurrency(concurrency)
        .run(zonepolicy_wrapper, error_policy, context)
        .for_each(|_| futures::future::ready(()))
        .await;
    Ok(())
}

async fn zonepolicy_wrapper(
    obj: Arc<DNSHostedZonePolicy>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    reconcile_wrapper(
        KIND_DNS_HOSTED_ZONE_POLICY,
        obj.name_any(),
        zonepolicy::reconcile(obj, ctx),
    )
    .await
}

async fn run_annotation_controller(context: Arc<Context>) -> Result<()> {
    info!("Starting DNSAnnotation controller");
    let api = Api::<DNSAnnotation>::all(context.client.clone());
    let concurrency = context.config.entry_pool_size as u16;
    Controller::new(api, watcher::Config::default())
        .concurrency(concurrency)
        .run(annotation_wrapper, error_policy, context)
        .for_each(|_| futures::future::ready(()))
        .await;
    Ok(())
}

async fn annotation_wrapper(
    obj: Arc<DNSAnnotation>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    reconcile_wrapper(
        KIND_DNS_ANNOTATION,
        obj.name_any(),
        annotation::reconcile(obj, ctx),
    )
    .await
}

/// Shared timing/metrics wrapper around a reconciler's own
/// `Result<Action, ReconcileError>`.
async fn reconcile_wrapper(
    resource_type: &str,
    name: String,
    fut: impl std::future::Future<Output = Result<Action, ferrodns::errors::ReconcileError>>,
) -> Result<Action, ReconcileError> {
    let start = std::time::Instant::now();
    let result = fut.await;
    let duration = start.elapsed();

    match result {
        Ok(action) => {
            debug!(resource = %name, "{resource_type} reconciled successfully");
            metrics::record_reconciliation_success(resource_type, duration);
            Ok(action)
        }
        Err(e) => {
            error!(resource = %name, error = %e.0, "{resource_type} reconcile failed");
            metrics::record_reconciliation_error(resource_type, duration);
            metrics::record_error(resource_type, "reconcile_error");
            Err(ReconcileError(e.0))
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// Error policy for controllers: requeue after a fixed delay on failure.
#[allow(clippy::needless_pass_by_value)]
fn error_policy<T, C>(resource: Arc<T>, err: &ReconcileError, _ctx: Arc<C>) -> Action
where
    T: std::fmt::Debug,
{
    error!(
        error = %err,
        resource = ?resource,
        "Reconciliation error - will retry in {}s",
        ERROR_REQUEUE_DURATION_SECS
    );
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

async fn run_without_leader_election(context: Arc<Context>) -> Result<()> {
    warn!("Leader election DISABLED - running without high availability");
    info!("Starting all controllers with signal handling");

    let shutdown_result: Result<()> = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, initiating graceful shutdown...");
            result.map_err(anyhow::Error::from)
        }
        result = wait_for_sigterm() => {
            info!("Received SIGTERM, initiating graceful shutdown...");
            result
        }
        result = run_all_controllers(context.clone()) => {
            result
        }
    };

    shutdown_result?;
    info!("Graceful shutdown completed successfully");
    Ok(())
}

async fn run_with_leader_election(
    context: Arc<Context>,
    leader_rx: tokio::sync::watch::Receiver<bool>,
    _lease_handle: tokio::task::JoinHandle<
        Result<LeaseManager, kube_lease_manager::LeaseManagerError>,
    >,
) -> Result<()> {
    info!("Running controllers with leader election and signal handling");

    let shutdown_result: Result<()> = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, initiating graceful shutdown and releasing lease...");
            result.map_err(anyhow::Error::from)
        }
        result = wait_for_sigterm() => {
            info!("Received SIGTERM, initiating graceful shutdown and releasing lease...");
            result
        }
        result = monitor_leadership(leader_rx) => {
            match result {
                Ok(()) => {
                    warn!("Leadership lost! Stopping all controllers...");
                    anyhow::bail!("Leadership lost - stepping down")
                }
                Err(e) => {
                    error!("Leadership monitor error: {:?}", e);
                    anyhow::bail!("Leadership monitoring failed: {e}")
                }
            }
        }
        result = run_all_controllers(context) => {
            result
        }
    };

    shutdown_result?;
    info!("Graceful shutdown completed successfully, leader election lease released");
    Ok(())
}

async fn wait_for_sigterm() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        sigterm.recv().await;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
        Ok(())
    }
}

async fn monitor_leadership(mut leader_rx: tokio::sync::watch::Receiver<bool>) -> Result<()> {
    loop {
        leader_rx.changed().await?;
        if !*leader_rx.borrow() {
            return Ok(());
        }
    }
}

async fn async_main() -> Result<()> {
    let config = Arc::new(Config::from_env());
    initialize_logging(&config.log_format);

    let client = initialize_client(&config).await?;
    let context = initialize_shared_context(client.clone(), config.clone()).await;

    let _metrics_handle = start_metrics_server(&config);

    let leader_election_config = load_leader_election_config();

    if leader_election_config.enabled {
        info!(
            lease_name = %leader_election_config.lease_name,
            lease_namespace = %leader_election_config.lease_namespace,
            identity = %leader_election_config.identity,
            "Leader election enabled; waiting to acquire leadership..."
        );

        let lease_manager =
            LeaseManagerBuilder::new(client.clone(), &leader_election_config.lease_name)
                .with_namespace(&leader_election_config.lease_namespace)
                .with_identity(&leader_election_config.identity)
                .with_duration(leader_election_config.lease_duration)
                .with_grace(leader_election_config.retry_period)
                .build()
                .await?;

        let (leader_rx, lease_handle) = lease_manager.watch().await;

        let mut rx = leader_rx.clone();
        while !*rx.borrow_and_update() {
            rx.changed().await?;
        }

        info!("Leadership acquired! Starting controllers...");
        run_with_leader_election(context, leader_rx, lease_handle).await?;
    } else {
        info!("Leader election disabled, starting controllers immediately...");
        run_without_leader_election(context).await?;
    }

    Ok(())
}

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("ferrodns")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}
