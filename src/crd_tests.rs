// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `crd.rs`

#[cfg(test)]
mod tests {
    use super::super::{
        object_key, DNSEntry, DNSEntrySpec, DNSProvider, DNSProviderSpec, RoutingPolicySpec,
        SecretReference, Selection,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn entry(namespace: &str, name: &str, spec: DNSEntrySpec) -> DNSEntry {
        DNSEntry {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            spec,
            status: None,
        }
    }

    #[test]
    fn test_entry_spec_serializes_camel_case() {
        let spec = DNSEntrySpec {
            dns_name: "www.example.com".to_string(),
            targets: Some(vec!["1.2.3.4".to_string()]),
            text: None,
            ttl: Some(360),
            resolve_targets_to_addresses: Some(true),
            cname_lookup_interval: Some(120),
            routing_policy: None,
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["dnsName"], "www.example.com");
        assert_eq!(json["ttl"], 360);
        assert_eq!(json["resolveTargetsToAddresses"], true);
        assert_eq!(json["cnameLookupInterval"], 120);
        assert!(json.get("text").is_none(), "unset fields are omitted");
    }

    #[test]
    fn test_provider_spec_round_trip() {
        let spec = DNSProviderSpec {
            r#type: "mock".to_string(),
            secret_ref: SecretReference {
                name: "credentials".to_string(),
                namespace: None,
            },
            provider_config: Some(serde_json::json!({"name": "test", "zones": ["example.com"]})),
            domains: Some(Selection {
                include: vec!["example.com".to_string()],
                exclude: vec![],
            }),
            zones: None,
            rate_limit: None,
            default_ttl: Some(300),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "mock");
        assert_eq!(json["secretRef"]["name"], "credentials");
        assert_eq!(json["domains"]["include"][0], "example.com");

        let back: DNSProviderSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back.r#type, "mock");
        assert_eq!(back.default_ttl, Some(300));
    }

    #[test]
    fn test_entry_key_and_provider_key() {
        assert_eq!(object_key("default", "www"), "default/www");

        let e = entry(
            "default",
            "www",
            DNSEntrySpec {
                dns_name: "www.example.com".to_string(),
                targets: None,
                text: None,
                ttl: None,
                resolve_targets_to_addresses: None,
                cname_lookup_interval: None,
                routing_policy: None,
            },
        );
        assert_eq!(e.entry_key(), "default/www");

        let p = DNSProvider {
            metadata: ObjectMeta {
                name: Some("p1".to_string()),
                namespace: Some("dns".to_string()),
                ..ObjectMeta::default()
            },
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
        assert_eq!(p.provider_key(), "dns/p1");
    }

    #[test]
    fn test_set_identifier_from_routing_policy() {
        let mut parameters = BTreeMap::new();
        parameters.insert("weight".to_string(), "10".to_string());
        let e = entry(
            "default",
            "weighted",
            DNSEntrySpec {
                dns_name: "w.example.com".to_string(),
                targets: Some(vec!["1.2.3.4".to_string()]),
                text: None,
                ttl: None,
                resolve_targets_to_addresses: None,
                cname_lookup_interval: None,
                routing_policy: Some(RoutingPolicySpec {
                    r#type: "weighted".to_string(),
                    set_identifier: "blue".to_string(),
                    parameters,
                }),
            },
        );
        assert_eq!(e.set_identifier(), "blue");

        let plain = entry(
            "default",
            "plain",
            DNSEntrySpec {
                dns_name: "p.example.com".to_string(),
                targets: Some(vec!["1.2.3.4".to_string()]),
                text: None,
                ttl: None,
                resolve_targets_to_addresses: None,
                cname_lookup_interval: None,
                routing_policy: None,
            },
        );
        assert_eq!(plain.set_identifier(), "");
    }
}
