// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Environment-driven runtime configuration.
//!
//! Mirrors the teacher's `main.rs::initialize_services` convention: every
//! setting has a constant default and an optional `FERRODNS_*` environment
//! variable override, parsed with plain `std::env::var` rather than a CLI
//! flag framework (flag parsing is a named Non-goal, spec §1).

use crate::constants;
use std::time::Duration;

/// Process-wide configuration, built once at startup and shared via
/// [`crate::context::Context`].
#[derive(Clone, Debug)]
pub struct Config {
    /// Kubernetes client queries-per-second limit.
    pub kube_client_qps: f32,
    /// Kubernetes client burst allowance on top of `kube_client_qps`.
    pub kube_client_burst: u32,

    /// `Controller::concurrency` for the `DNSEntry`/`DNSAnnotation` controllers.
    pub entry_pool_size: usize,
    /// `Controller::concurrency` for the `DNSProvider`/`DNSHostedZonePolicy` controllers.
    pub provider_pool_size: usize,

    pub default_zone_cache_ttl: Duration,
    pub zone_conflict_cooldown: Duration,
    pub entry_max_retries: u32,

    pub metrics_bind_address: String,
    pub metrics_port: u16,

    /// Controller class tag (`dns.gardener.cloud/class`); an entry whose
    /// annotation names a different class is ignored by this deployment.
    pub controller_class: String,

    /// `RUST_LOG_FORMAT`: `"json"` or `"pretty"`.
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kube_client_qps: 50.0,
            kube_client_burst: 100,
            entry_pool_size: constants::DEFAULT_ENTRY_POOL_SIZE,
            provider_pool_size: constants::DEFAULT_PROVIDER_POOL_SIZE,
            default_zone_cache_ttl: Duration::from_secs(constants::DEFAULT_ZONE_CACHE_TTL_SECS),
            zone_conflict_cooldown: Duration::from_secs(constants::ZONE_CONFLICT_COOLDOWN_SECS),
            entry_max_retries: constants::ENTRY_DEFAULT_MAX_RETRIES,
            metrics_bind_address: constants::METRICS_SERVER_BIND_ADDRESS.to_string(),
            metrics_port: constants::METRICS_SERVER_PORT,
            controller_class: crate::labels::DEFAULT_CONTROLLER_CLASS.to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from the process environment, falling back to
    /// [`Config::default`] for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            kube_client_qps: env_parsed("FERRODNS_KUBE_CLIENT_QPS", defaults.kube_client_qps),
            kube_client_burst: env_parsed(
                "FERRODNS_KUBE_CLIENT_BURST",
                defaults.kube_client_burst,
            ),
            entry_pool_size: env_parsed("FERRODNS_ENTRY_POOL_SIZE", defaults.entry_pool_size),
            provider_pool_size: env_parsed(
                "FERRODNS_PROVIDER_POOL_SIZE",
                defaults.provider_pool_size,
            ),
            default_zone_cache_ttl: Duration::from_secs(env_parsed(
                "FERRODNS_ZONE_CACHE_TTL_SECS",
                defaults.default_zone_cache_ttl.as_secs(),
            )),
            zone_conflict_cooldown: Duration::from_secs(env_parsed(
                "FERRODNS_ZONE_CONFLICT_COOLDOWN_SECS",
                defaults.zone_conflict_cooldown.as_secs(),
            )),
            entry_max_retries: env_parsed(
                "FERRODNS_ENTRY_MAX_RETRIES",
                defaults.entry_max_retries,
            ),
            metrics_bind_address: env_string(
                "FERRODNS_METRICS_BIND_ADDRESS",
                &defaults.metrics_bind_address,
            ),
            metrics_port: env_parsed("FERRODNS_METRICS_PORT", defaults.metrics_port),
            controller_class: env_string("FERRODNS_CONTROLLER_CLASS", &defaults.controller_class),
            log_format: env_string("RUST_LOG_FORMAT", &defaults.log_format),
        }
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn default_matches_spec_constants() {
        let config = Config::default();
        assert_eq!(config.entry_pool_size, constants::DEFAULT_ENTRY_POOL_SIZE);
        assert_eq!(config.entry_max_retries, constants::ENTRY_DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn env_parsed_falls_back_on_missing_or_invalid_value() {
        assert_eq!(env_parsed::<u32>("FERRODNS_TEST_UNSET_VAR_XYZ", 7), 7);
    }
}
