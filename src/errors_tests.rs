// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use super::super::{ReconcileError, ResourceState};

    #[test]
    fn test_invalid_maps_to_invalid_state_and_no_retry() {
        let err = ReconcileError::Invalid("cannot specify both targets and text fields".into());
        assert_eq!(err.state(), ResourceState::Invalid);
        assert!(!err.retryable(), "Invalid specs must not be retried");
    }

    #[test]
    fn test_transient_maps_to_error_state_and_retries() {
        let err = ReconcileError::Transient("provider API returned 503".into());
        assert_eq!(err.state(), ResourceState::Error);
        assert!(err.retryable());
    }

    #[test]
    fn test_stale_maps_to_stale_state() {
        let err = ReconcileError::Stale("matching provider not ready".into());
        assert_eq!(err.state(), ResourceState::Stale);
        assert!(err.retryable(), "Stale entries are rechecked later");
    }

    #[test]
    fn test_state_string_forms() {
        assert_eq!(ResourceState::Ready.as_str(), "Ready");
        assert_eq!(ResourceState::Invalid.as_str(), "Invalid");
        assert_eq!(ResourceState::Error.as_str(), "Error");
        assert_eq!(ResourceState::Stale.as_str(), "Stale");
        assert_eq!(ResourceState::Ignored.as_str(), "Ignored");
        assert_eq!(ResourceState::Deleting.to_string(), "Deleting");
    }
}
