// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the provider reconciler helpers

#[cfg(test)]
mod tests {
    use super::super::{echo_rate_limit, secret_properties};
    use crate::account::rate_limit::RateLimiterOptions;
    use crate::crd::{DNSProvider, DNSProviderSpec, RateLimit, SecretReference};
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    fn secret(data: &[(&str, &str)], labels: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("credentials".to_string()),
                namespace: Some("default".to_string()),
                labels: if labels.is_empty() {
                    None
                } else {
                    Some(
                        labels
                            .iter()
                            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                            .collect(),
                    )
                },
                ..ObjectMeta::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Secret::default()
        }
    }

    #[test]
    fn test_secret_properties_plain() {
        let secret = secret(&[("accessKeyID", "AKIA"), ("secretAccessKey", "s3")], &[]);
        let properties = secret_properties(&secret, false).unwrap();
        assert_eq!(properties.len(), 2);
        assert_eq!(properties["accessKeyID"], "AKIA");
    }

    #[test]
    fn test_workload_identity_injection() {
        let secret = secret(
            &[("token", "jwt-token")],
            &[(
                "security.gardener.cloud/purpose",
                "workload-identity-token-requestor",
            )],
        );
        let properties = secret_properties(&secret, true).unwrap();
        assert_eq!(properties["workloadIdentityToken"], "jwt-token");
        assert!(
            !properties.contains_key("token"),
            "raw token key is replaced by the property"
        );
    }

    #[test]
    fn test_workload_identity_not_injected_when_unsupported() {
        let secret = secret(
            &[("token", "jwt-token")],
            &[(
                "security.gardener.cloud/purpose",
                "workload-identity-token-requestor",
            )],
        );
        let properties = secret_properties(&secret, false).unwrap();
        assert!(!properties.contains_key("workloadIdentityToken"));
        assert_eq!(properties["token"], "jwt-token");
    }

    #[test]
    fn test_user_supplied_identity_property_rejected() {
        let secret = secret(
            &[("workloadIdentityToken", "spoofed"), ("token", "jwt")],
            &[(
                "security.gardener.cloud/purpose",
                "workload-identity-token-requestor",
            )],
        );
        let err = secret_properties(&secret, true).unwrap_err();
        assert!(err.contains("workloadIdentityToken"));
    }

    #[test]
    fn test_echo_rate_limit_prefers_spec() {
        let provider = DNSProvider {
            metadata: ObjectMeta::default(),
            spec: DNSProviderSpec {
                r#type: "mock".to_string(),
                secret_ref: SecretReference::default(),
                provider_config: None,
                domains: None,
                zones: None,
                rate_limit: Some(RateLimit {
                    requests_per_day: 1000,
                    burst: 5,
                }),
                default_ttl: None,
            },
            status: None,
        };
        let echoed = echo_rate_limit(
            &provider,
            RateLimiterOptions {
                qps: 10.0,
                burst: 20,
            },
        );
        assert_eq!(echoed.requests_per_day, 1000);
        assert_eq!(echoed.burst, 5);
    }

    #[test]
    fn test_echo_rate_limit_computed_from_effective() {
        let provider = DNSProvider {
            metadata: ObjectMeta::default(),
            spec: DNSProviderSpec {
                r#type: "mock".to_string(),
                secret_ref: SecretReference::default(),
                provider_config: None,
                domains: None,
                zones: None,
                rate_limit: None,
                default_ttl: None,
            },
            status: None,
        };
        let echoed = echo_rate_limit(
            &provider,
            RateLimiterOptions {
                qps: 10.0,
                burst: 20,
            },
        );
        assert_eq!(echoed.requests_per_day, 864_000);
        assert_eq!(echoed.burst, 20);
    }

    #[test]
    fn test_empty_map_keeps_sorted_property_order() {
        let secret = secret(&[("b", "2"), ("a", "1")], &[]);
        let properties = secret_properties(&secret, false).unwrap();
        let keys: Vec<&String> = properties.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        let empty: BTreeMap<String, String> =
            secret_properties(&Secret::default(), false).unwrap();
        assert!(empty.is_empty());
    }
}
