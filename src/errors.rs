// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The error taxonomy for the DNS reconciliation core (spec §7).
//!
//! Every provider operation and every reconciler step returns an error
//! tagged with one of [`ErrorKind`]'s variants. The reconciler never panics
//! on a provider error; any error it cannot otherwise classify is treated
//! as [`ErrorKind::Transient`].

use std::fmt;

/// The taxonomy of errors the reconciliation core distinguishes (spec §7).
///
/// Each kind carries its own retry policy, enforced by the entry state
/// machine ([`crate::reconcilers::entry`]) and the zone reconciler
/// ([`crate::zonereconciler`]), not by this type itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Entry or provider spec fails validation. Reported on status; no
    /// retries until the spec changes.
    Invalid,
    /// No provider covers the name. `Pending`, retried on provider topology change.
    NoMatch,
    /// Provider rate-limited the request. Back off with jitter, retry.
    Throttled,
    /// Credential probe or operation failed auth. Provider → `Error`;
    /// dependent entries → `Stale`.
    AuthError,
    /// Zone state mismatch from a concurrent external edit. Invalidate the
    /// cache, single retry of the batch.
    ZoneStateConflict,
    /// Two entries claim the same (name, type, `setIdentifier`). The loser
    /// is marked `Invalid`.
    AlreadyBusyForEntry,
    /// Timeout or 5xx. Exponential backoff with cap.
    Transient,
    /// Programmer error or unknown record type. Logged; entry `Invalid`.
    Fatal,
}

impl ErrorKind {
    /// Whether an error of this kind is worth retrying automatically.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::Throttled | ErrorKind::ZoneStateConflict | ErrorKind::Transient
        )
    }

    /// A stable, CamelCase status `reason` string for this error kind.
    ///
    /// User-visible status messages must be stable (stripped of correlation
    /// IDs and timestamps) to avoid status-update feedback loops (spec §7).
    #[must_use]
    pub fn status_reason(self) -> &'static str {
        match self {
            ErrorKind::Invalid => "Invalid",
            ErrorKind::NoMatch => "NoMatchingProvider",
            ErrorKind::Throttled => "ProviderThrottled",
            ErrorKind::AuthError => "ProviderAuthError",
            ErrorKind::ZoneStateConflict => "ZoneStateConflict",
            ErrorKind::AlreadyBusyForEntry => "AlreadyBusyForEntry",
            ErrorKind::Transient => "TransientError",
            ErrorKind::Fatal => "FatalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_reason())
    }
}

/// A provider or reconciler error tagged with its [`ErrorKind`].
///
/// Mirrors the `thiserror`-based error taxonomy idiom the teacher uses in
/// its zone/record/instance error enums, collapsed into a single tagged
/// struct since spec §7's taxonomy is flat rather than per-entity.
#[derive(thiserror::Error, Debug)]
#[error("{kind}: {message}")]
pub struct CoreError {
    /// The taxonomy kind this error belongs to.
    pub kind: ErrorKind,
    /// Human-readable, stable message (no correlation IDs or timestamps).
    pub message: String,
}

impl CoreError {
    /// Build a new tagged error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`ErrorKind::Invalid`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, message)
    }

    /// Convenience constructor for [`ErrorKind::NoMatch`].
    pub fn no_match(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoMatch, message)
    }

    /// Convenience constructor for [`ErrorKind::Throttled`].
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Throttled, message)
    }

    /// Convenience constructor for [`ErrorKind::AuthError`].
    pub fn auth_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthError, message)
    }

    /// Convenience constructor for [`ErrorKind::ZoneStateConflict`].
    pub fn zone_state_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ZoneStateConflict, message)
    }

    /// Convenience constructor for [`ErrorKind::AlreadyBusyForEntry`].
    pub fn already_busy_for_entry(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyBusyForEntry, message)
    }

    /// Convenience constructor for [`ErrorKind::Transient`].
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    /// Convenience constructor for [`ErrorKind::Fatal`].
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// Whether this error is worth retrying automatically.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// The stable status `reason` string for this error.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        self.kind.status_reason()
    }
}

/// Opaque error type required by `kube::runtime::Controller::run`'s
/// `reconcile`/`error_policy` signatures; wraps anything convertible to
/// [`anyhow::Error`], mirroring the teacher's own `ReconcileError` newtype.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct ReconcileError(#[from] pub anyhow::Error);

impl From<CoreError> for ReconcileError {
    fn from(err: CoreError) -> Self {
        ReconcileError(anyhow::anyhow!(err))
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        // Any error this codebase cannot otherwise classify is treated as
        // Transient per spec §7's propagation rule.
        CoreError::new(ErrorKind::Transient, err.to_string())
    }
}

#[cfg(test)]
mod errors_tests {
    use super::*;

    #[test]
    fn transient_kinds_are_flagged_retryable() {
        assert!(ErrorKind::Throttled.is_transient());
        assert!(ErrorKind::ZoneStateConflict.is_transient());
        assert!(ErrorKind::Transient.is_transient());
        assert!(!ErrorKind::Invalid.is_transient());
        assert!(!ErrorKind::Fatal.is_transient());
        assert!(!ErrorKind::AlreadyBusyForEntry.is_transient());
    }

    #[test]
    fn status_reasons_are_camel_case() {
        assert_eq!(ErrorKind::NoMatch.status_reason(), "NoMatchingProvider");
        assert_eq!(
            ErrorKind::AlreadyBusyForEntry.status_reason(),
            "AlreadyBusyForEntry"
        );
    }

    #[test]
    fn unclassified_anyhow_errors_become_transient() {
        let err: CoreError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err.kind, ErrorKind::Transient);
    }
}
