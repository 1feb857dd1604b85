// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The provider handler interface (C2, spec §4.2) and the tagged-enum
//! registry of backend adapters (spec §9's dynamic-dispatch design note).
//!
//! Every backend — Route53, Azure DNS, Google Cloud DNS, Cloudflare,
//! AliCloud, OpenStack Designate, Infoblox, Netlify, RFC2136, the generic
//! remote backend, and the in-memory mock — implements [`ProviderHandler`].
//! [`ProviderKind`] wraps each adapter behind one concrete type so the rest
//! of the core (C6, C7) never matches on backend type directly.

pub mod credentials;
pub mod mock;
pub mod remote;
pub mod rest;
pub mod rfc2136;
pub mod route53;

use crate::crd::RecordType;
use crate::record::{RecordKey, ZoneState};
use async_trait::async_trait;
use std::fmt;

/// A hosted zone as observed from a provider (spec §3 `Z`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostedZone {
    /// Provider-scoped stable id.
    pub id: String,
    /// Normalized domain (trailing dot stripped).
    pub domain: String,
    /// Subdomains delegated to foreign nameservers inside this zone.
    pub forwarded_subzones: Vec<String>,
    pub provider_type: String,
    /// Content hash used to detect zone-definition changes.
    pub key: String,
    pub is_private: bool,
}

/// The action requested for a record set (spec §3 "Change request").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// One requested mutation to a zone's record set, with the key of the
/// `DNSEntry` that originated it (for feedback routing back into C5).
#[derive(Clone, Debug)]
pub struct Change {
    pub action: ChangeAction,
    pub record: crate::record::RecordSet,
    /// `namespace/name` of the originating `DNSEntry`.
    pub entry_key: String,
}

/// Per-change outcome a handler must report back through `executeRequests`.
#[derive(Clone, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ChangeOutcome {
    Succeeded,
    Failed(ProviderError),
    Invalid(ProviderError),
}

/// Error classes a provider handler must surface (spec §4.2).
#[derive(thiserror::Error, Clone, Debug)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    AuthError(String),
    #[error("rate limited: {0}")]
    ThrottlingError(String),
    #[error("no such hosted zone: {0}")]
    NoSuchHostedZone(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("transient provider error: {0}")]
    Transient(String),
}

impl From<ProviderError> for crate::errors::CoreError {
    fn from(err: ProviderError) -> Self {
        use crate::errors::{CoreError, ErrorKind};
        match err {
            ProviderError::AuthError(m) => CoreError::new(ErrorKind::AuthError, m),
            ProviderError::ThrottlingError(m) => CoreError::new(ErrorKind::Throttled, m),
            ProviderError::NoSuchHostedZone(m) => CoreError::new(ErrorKind::NoMatch, m),
            ProviderError::InvalidRequest(m) => CoreError::new(ErrorKind::Invalid, m),
            ProviderError::Transient(m) => CoreError::new(ErrorKind::Transient, m),
        }
    }
}

/// Uniform per-backend driver (spec §4.2).
#[async_trait]
pub trait ProviderHandler: Send + Sync {
    /// List hosted zones this credential set can see. Idempotent, rate-limited.
    async fn get_zones(&self) -> Result<Vec<HostedZone>, ProviderError>;

    /// Full enumeration of record sets in a zone.
    async fn get_zone_state(&self, zone: &HostedZone) -> Result<ZoneState, ProviderError>;

    /// Apply changes to a zone; returns a per-change outcome in the same
    /// order as `changes`.
    async fn execute_requests(
        &self,
        zone: &HostedZone,
        desired_state: &ZoneState,
        changes: &[Change],
    ) -> Result<Vec<ChangeOutcome>, ProviderError>;

    /// Free credentials/connections held by this handler instance.
    async fn release(&self);

    /// Invalidate the caller's cache entry after a reported conflict;
    /// return whether a retry of the batch is warranted.
    fn report_zone_state_conflict(&self, _zone: &HostedZone, _err: &ProviderError) -> bool {
        true
    }

    /// Record type support declared by this backend; used by C5 validation.
    fn supports(&self, record_type: RecordType) -> bool {
        matches!(
            record_type,
            RecordType::A | RecordType::AAAA | RecordType::CNAME | RecordType::TXT
        )
    }
}

/// Tagged-enum dispatch over every supported backend (spec §9).
///
/// New backends are added by adding a variant and one match arm per trait
/// method, keeping the call site table-driven instead of paying for
/// dynamic dispatch through a `Box<dyn ProviderHandler>`.
pub enum ProviderKind {
    Route53(route53::Route53Provider),
    Remote(remote::RemoteProvider),
    Rest(rest::RestProvider),
    Rfc2136(rfc2136::Rfc2136Provider),
    Mock(mock::MockProvider),
}

impl fmt::Debug for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl ProviderKind {
    /// The `DNSProvider.spec.type` string this variant corresponds to.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            ProviderKind::Route53(_) => "route53",
            ProviderKind::Remote(_) => "remote",
            ProviderKind::Rest(p) => p.type_name(),
            ProviderKind::Rfc2136(_) => "rfc2136",
            ProviderKind::Mock(_) => "mock",
        }
    }
}

#[async_trait]
impl ProviderHandler for ProviderKind {
    async fn get_zones(&self) -> Result<Vec<HostedZone>, ProviderError> {
        match self {
            ProviderKind::Route53(p) => p.get_zones().await,
            ProviderKind::Remote(p) => p.get_zones().await,
            ProviderKind::Rest(p) => p.get_zones().await,
            ProviderKind::Rfc2136(p) => p.get_zones().await,
            ProviderKind::Mock(p) => p.get_zones().await,
        }
    }

    async fn get_zone_state(&self, zone: &HostedZone) -> Result<ZoneState, ProviderError> {
        match self {
            ProviderKind::Route53(p) => p.get_zone_state(zone).await,
            ProviderKind::Remote(p) => p.get_zone_state(zone).await,
            ProviderKind::Rest(p) => p.get_zone_state(zone).await,
            ProviderKind::Rfc2136(p) => p.get_zone_state(zone).await,
            ProviderKind::Mock(p) => p.get_zone_state(zone).await,
        }
    }

    async fn execute_requests(
        &self,
        zone: &HostedZone,
        desired_state: &ZoneState,
        changes: &[Change],
    ) -> Result<Vec<ChangeOutcome>, ProviderError> {
        match self {
            ProviderKind::Route53(p) => p.execute_requests(zone, desired_state, changes).await,
            ProviderKind::Remote(p) => p.execute_requests(zone, desired_state, changes).await,
            ProviderKind::Rest(p) => p.execute_requests(zone, desired_state, changes).await,
            ProviderKind::Rfc2136(p) => p.execute_requests(zone, desired_state, changes).await,
            ProviderKind::Mock(p) => p.execute_requests(zone, desired_state, changes).await,
        }
    }

    async fn release(&self) {
        match self {
            ProviderKind::Route53(p) => p.release().await,
            ProviderKind::Remote(p) => p.release().await,
            ProviderKind::Rest(p) => p.release().await,
            ProviderKind::Rfc2136(p) => p.release().await,
            ProviderKind::Mock(p) => p.release().await,
        }
    }

    fn report_zone_state_conflict(&self, zone: &HostedZone, err: &ProviderError) -> bool {
        match self {
            ProviderKind::Route53(p) => p.report_zone_state_conflict(zone, err),
            ProviderKind::Remote(p) => p.report_zone_state_conflict(zone, err),
            ProviderKind::Rest(p) => p.report_zone_state_conflict(zone, err),
            ProviderKind::Rfc2136(p) => p.report_zone_state_conflict(zone, err),
            ProviderKind::Mock(p) => p.report_zone_state_conflict(zone, err),
        }
    }
}

#[cfg(test)]
mod provider_tests {
    use super::*;

    #[test]
    fn provider_errors_map_to_taxonomy_kinds() {
        use crate::errors::ErrorKind;
        let core: crate::errors::CoreError = ProviderError::ThrottlingError("429".into()).into();
        assert_eq!(core.kind, ErrorKind::Throttled);
        let core: crate::errors::CoreError =
            ProviderError::NoSuchHostedZone("zone".into()).into();
        assert_eq!(core.kind, ErrorKind::NoMatch);
    }

    #[test]
    fn provider_kind_type_name_matches_spec_provider_type() {
        let mock = ProviderKind::Mock(mock::MockProvider::new());
        assert_eq!(mock.type_name(), "mock");
    }
}
