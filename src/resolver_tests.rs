// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `resolver.rs`

#[cfg(test)]
mod tests {
    use super::super::{
        lookup_all_hostnames, lookup_with_retry, HostsLookupResult, LookupError, Resolver,
    };
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted resolver: each hostname maps to a fixed outcome.
    struct ScriptedResolver {
        answers: BTreeMap<String, Result<Vec<IpAddr>, LookupError>>,
        calls: AtomicUsize,
    }

    impl ScriptedResolver {
        fn new(answers: BTreeMap<String, Result<Vec<IpAddr>, LookupError>>) -> Self {
            Self {
                answers,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Resolver for ScriptedResolver {
        async fn lookup_ips(&self, hostname: &str) -> Result<Vec<IpAddr>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers
                .get(hostname)
                .cloned()
                .unwrap_or_else(|| Err(LookupError::NotFound(hostname.to_string())))
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_error_classification() {
        assert!(LookupError::Timeout("t".into()).is_timeout());
        assert!(!LookupError::Timeout("t".into()).is_not_found());
        assert!(LookupError::NotFound("n".into()).is_not_found());
        assert!(!LookupError::Other("o".into()).is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_only_on_timeout() {
        // Always times out: exactly LOOKUP_MAX_RETRIES attempts.
        let resolver = ScriptedResolver::new(BTreeMap::from([(
            "slow.example.com".to_string(),
            Err(LookupError::Timeout("deadline".into())),
        )]));
        let err = lookup_with_retry(&resolver, "slow.example.com")
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 5);

        // NXDOMAIN fails immediately.
        let resolver = ScriptedResolver::new(BTreeMap::from([(
            "gone.example.com".to_string(),
            Err(LookupError::NotFound("nxdomain".into())),
        )]));
        let err = lookup_with_retry(&resolver, "gone.example.com")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lookup_all_hostnames_merges_sorted_dedup() {
        let resolver = Arc::new(ScriptedResolver::new(BTreeMap::from([
            (
                "service-1.example.com".to_string(),
                Ok(vec![ip("127.0.1.1"), ip("2001:db8::1:1")]),
            ),
            (
                "service-2.example.com".to_string(),
                Ok(vec![ip("127.0.2.2"), ip("127.0.2.1"), ip("127.0.1.1")]),
            ),
        ])));
        let result = lookup_all_hostnames(
            resolver,
            &[
                "service-1.example.com".to_string(),
                "service-2.example.com".to_string(),
            ],
            4,
        )
        .await;

        assert_eq!(
            result.all_ips(),
            vec![
                ip("127.0.1.1"),
                ip("127.0.2.1"),
                ip("127.0.2.2"),
                ip("2001:db8::1:1")
            ]
        );
        assert!(!result.has_timeout());
        assert!(!result.all_not_found());
        assert!(result.first_error().is_none());
    }

    #[tokio::test]
    async fn test_partial_timeout_is_flagged() {
        let resolver = Arc::new(ScriptedResolver::new(BTreeMap::from([
            ("ok.example.com".to_string(), Ok(vec![ip("10.0.0.1")])),
            (
                "slow.example.com".to_string(),
                Err(LookupError::Timeout("deadline".into())),
            ),
        ])));
        // Paused time is not used here: the timeout answer is scripted, so
        // retries burn virtual delay only inside lookup_with_retry.
        tokio::time::pause();
        let result = lookup_all_hostnames(
            resolver,
            &[
                "ok.example.com".to_string(),
                "slow.example.com".to_string(),
            ],
            2,
        )
        .await;
        assert!(result.has_timeout());
        assert_eq!(result.all_ips(), vec![ip("10.0.0.1")]);
        assert!(!result.all_not_found());
    }

    #[tokio::test]
    async fn test_all_not_found() {
        let resolver = Arc::new(ScriptedResolver::new(BTreeMap::new()));
        let result =
            lookup_all_hostnames(resolver, &["a.example.com".to_string()], 2).await;
        assert!(result.all_not_found());
        assert!(result.all_ips().is_empty());
    }

    #[test]
    fn test_empty_result_is_not_all_not_found() {
        let result = HostsLookupResult::default();
        assert!(!result.all_not_found());
    }
}
