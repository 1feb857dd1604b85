// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # ferrodns - DNS reconciliation core for Kubernetes
//!
//! ferrodns is a Kubernetes controller that reconciles `DNSEntry` and
//! `DNSProvider` custom resources against external DNS provider APIs
//! (Route53, Azure DNS, Google Cloud DNS, Cloudflare, AliCloud, OpenStack
//! Designate, Infoblox, Netlify, RFC2136, a generic remote backend, and an
//! in-memory mock used for tests).
//!
//! ## Overview
//!
//! - Custom Resource Definitions for DNS entries, providers, hosted-zone
//!   policies, and annotation translation
//! - A record model and `DNSSet` diff algebra (C1)
//! - A provider handler abstraction with per-backend adapters (C2)
//! - Per-provider rate limiting and Prometheus metrics (C3)
//! - A TTL'd, conflict-aware zone state cache (C4)
//! - An entry state machine driving `DNSEntry` status (C5)
//! - Domain-suffix-based provider selection (C6)
//! - A per-zone batched reconciliation loop (C7)
//! - Per-zone serialization locks, one task per zone at a time (C8)
//! - Finalizer-based safe deletion (C9)
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`record`] - the DNS record model and `DNSSet` algebra (C1)
//! - [`provider`] - the provider handler trait and backend adapters (C2)
//! - [`ratelimit`] - per-provider token-bucket rate limiting (C3)
//! - [`zonecache`] - the zone state cache (C4)
//! - [`registry`] - provider registry and selection (C6)
//! - [`zonereconciler`] - per-zone batched reconciliation (C7)
//! - [`zonelock`] - per-zone serialization locks (C8)
//! - [`reconcilers`] - per-resource reconcile loops (C5, C9, and friends)
//! - [`errors`] - the error taxonomy (spec §7)
//! - [`config`] - environment-driven runtime configuration
//! - [`metrics`] - Prometheus metrics
//! - [`labels`] - Kubernetes label/annotation/finalizer constants
//! - [`constants`] - numeric and string constants
//!
//! ## Example
//!
//! ```rust
//! use ferrodns::crd::{DNSEntrySpec, RecordType};
//!
//! let spec = DNSEntrySpec {
//!     dns_name: "www.example.com".to_string(),
//!     record_type: RecordType::A,
//!     targets: vec!["192.0.2.10".to_string()],
//!     ttl: Some(300),
//!     set_identifier: None,
//!     routing_policy: None,
//!     provider_ref: None,
//!     cname_lookup_interval: None,
//! };
//! assert_eq!(spec.dns_name, "www.example.com");
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod labels;
pub mod metrics;
pub mod provider;
pub mod ratelimit;
pub mod reconcilers;
pub mod record;
pub mod registry;
pub mod zonecache;
pub mod zonelock;
pub mod zonereconciler;
