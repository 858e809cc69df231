// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconcile error taxonomy.
//!
//! Failures during reconciliation fall into a small set of classes that map
//! directly onto the `state` field reported in resource status:
//!
//! - [`ReconcileError::Invalid`] - user error in the spec; retrying is
//!   pointless until the resource generation changes.
//! - [`ReconcileError::Transient`] - recoverable failure (provider API,
//!   Kubernetes API, DNS); retried with controller back-off.
//! - [`ReconcileError::Stale`] - observed records remain correct but the
//!   controller cannot currently prove or maintain them; records are kept.
//!
//! Classification happens as close to the failure site as possible so that
//! the reconcile wrappers only need to translate the class into status,
//! events, and a requeue decision.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// State values surfaced in the `status.state` field of managed resources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    /// Desired state equals observed state
    Ready,
    /// Spec is malformed; no retry until the generation changes
    Invalid,
    /// Transient failure; retried with back-off
    Error,
    /// Records kept but currently unprovable (provider not ready or gone)
    Stale,
    /// Annotation opt-out; no action taken
    Ignored,
    /// Resource is being torn down
    Deleting,
}

impl ResourceState {
    /// String form written into status (`Ready`, `Invalid`, ...).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Ready => "Ready",
            ResourceState::Invalid => "Invalid",
            ResourceState::Error => "Error",
            ResourceState::Stale => "Stale",
            ResourceState::Ignored => "Ignored",
            ResourceState::Deleting => "Deleting",
        }
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified reconciliation failure.
///
/// The class decides both the status `state` written to the resource and
/// whether the controller requeues the key.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// User error in the spec. Not retried.
    #[error("invalid specification: {0}")]
    Invalid(String),

    /// Recoverable failure; the controller requeues with back-off.
    #[error("{0}")]
    Transient(String),

    /// Observed records are kept but cannot currently be maintained.
    #[error("{0}")]
    Stale(String),

    /// Kubernetes API failure; treated as transient.
    #[error(transparent)]
    Kube(#[from] kube::Error),
}

impl ReconcileError {
    /// Map the failure class onto the status state it produces.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        match self {
            ReconcileError::Invalid(_) => ResourceState::Invalid,
            ReconcileError::Stale(_) => ResourceState::Stale,
            ReconcileError::Transient(_) | ReconcileError::Kube(_) => ResourceState::Error,
        }
    }

    /// Whether the controller should requeue after this failure.
    ///
    /// Invalid specs are only re-examined when the resource changes, so
    /// they never requeue on a timer.
    #[must_use]
    pub fn retryable(&self) -> bool {
        !matches!(self, ReconcileError::Invalid(_))
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
