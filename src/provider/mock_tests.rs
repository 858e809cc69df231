// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `mock.rs`

#[cfg(test)]
mod tests {
    use super::super::{MockConfig, MockHandler, MockHandlerFactory, PROVIDER_TYPE_MOCK};
    use crate::provider::{
        ChangeRequest, ChangeResultCollector, DnsHandler, HandlerConfig, HandlerFactory,
        ProviderError,
    };
    use crate::dns::{DnsSet, DnsSetName, RecordSet, RecordType, RoutingPolicy, ZoneId};
    use std::collections::BTreeMap;

    fn handler(zones: &[&str]) -> MockHandler {
        MockHandler::new(MockConfig {
            name: "test".to_string(),
            zones: zones.iter().map(ToString::to_string).collect(),
            fail_get_zones: false,
            fail_zone: None,
            latency_millis: None,
        })
    }

    #[tokio::test]
    async fn test_list_zones_uses_prefixed_ids() {
        let handler = handler(&["example.com", "example2.com"]);
        let zones = handler.list_zones().await.unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].id, ZoneId::new("mock", "test:example.com"));
        assert_eq!(zones[0].domain, "example.com");
        assert!(!zones[0].private);
    }

    #[tokio::test]
    async fn test_execute_and_read_back() {
        let handler = handler(&["example.com"]);
        let zone = ZoneId::new("mock", "test:example.com");
        let name = DnsSetName::plain("test.sub.example.com");
        let set = RecordSet::new(RecordType::A, 360, vec!["1.2.3.4".into()]);

        let collector = ChangeResultCollector::new();
        handler
            .execute_requests(
                &zone,
                &[ChangeRequest::create(name.clone(), set.clone())],
                &collector,
            )
            .await
            .unwrap();
        assert!(collector.results().all_succeeded());

        let state = handler.get_zone_state(&zone).await.unwrap();
        assert!(state[&name].sets[&RecordType::A].matches(&set));
    }

    #[tokio::test]
    async fn test_delete_removes_record_set() {
        let handler = handler(&["example.com"]);
        let zone = ZoneId::new("mock", "test:example.com");
        let name = DnsSetName::plain("test.example.com");
        let set = RecordSet::new(RecordType::A, 300, vec!["1.2.3.4".into()]);

        let mut seeded = DnsSet::new(name.clone());
        seeded.insert(set.clone());
        handler.seed(&zone, seeded);

        let collector = ChangeResultCollector::new();
        handler
            .execute_requests(&zone, &[ChangeRequest::delete(name.clone(), set)], &collector)
            .await
            .unwrap();

        let state = handler.get_zone_state(&zone).await.unwrap();
        assert!(state.get(&name).is_none());
    }

    #[tokio::test]
    async fn test_unknown_zone_rejected() {
        let handler = handler(&["example.com"]);
        let zone = ZoneId::new("mock", "other:example.org");
        let err = handler.get_zone_state(&zone).await.unwrap_err();
        assert!(matches!(err, ProviderError::ZoneNotFound(_)));
    }

    #[tokio::test]
    async fn test_fail_get_zones_injection() {
        let handler = MockHandler::new(MockConfig {
            name: "test".to_string(),
            zones: vec!["example.com".to_string()],
            fail_get_zones: true,
            fail_zone: None,
            latency_millis: None,
        });
        assert!(matches!(
            handler.list_zones().await.unwrap_err(),
            ProviderError::Api(_)
        ));
    }

    #[tokio::test]
    async fn test_placeholder_records_filtered_from_state() {
        let handler = handler(&["example.com"]);
        let zone = ZoneId::new("mock", "test:example.com");
        let name = DnsSetName::new("weighted.example.com", "backup");

        let mut params = BTreeMap::new();
        params.insert("weight".to_string(), "0".to_string());
        let placeholder = RecordSet::new(RecordType::A, 300, vec!["0.0.0.0".into()])
            .with_policy(Some(RoutingPolicy::new("weighted", params)));

        let mut seeded = DnsSet::new(name.clone());
        seeded.insert(placeholder);
        handler.seed(&zone, seeded);

        let state = handler.get_zone_state(&zone).await.unwrap();
        assert!(state.is_empty(), "placeholder must be filtered: {state:?}");
    }

    #[test]
    fn test_factory_validates_config_shape() {
        let factory = MockHandlerFactory::new();
        assert_eq!(factory.provider_type(), PROVIDER_TYPE_MOCK);
        assert!(factory.accepts_workload_identity());

        // Missing providerConfig
        assert!(factory.validate_provider_config(None).is_err());
        // Empty name
        assert!(factory
            .validate_provider_config(Some(&serde_json::json!({"name": "", "zones": []})))
            .is_err());
        // Bad zone domain
        assert!(factory
            .validate_provider_config(Some(
                &serde_json::json!({"name": "test", "zones": ["bad..zone"]})
            ))
            .is_err());
        // Valid
        assert!(factory
            .validate_provider_config(Some(
                &serde_json::json!({"name": "test", "zones": ["example.com"]})
            ))
            .is_ok());
    }

    #[test]
    fn test_factory_creates_handler_from_config() {
        let factory = MockHandlerFactory::new();
        let mut properties = BTreeMap::new();
        properties.insert("account".to_string(), "dev".to_string());
        let handler = factory
            .create(HandlerConfig {
                properties,
                provider_config: Some(serde_json::json!({
                    "name": "test",
                    "zones": ["example.com"]
                })),
            })
            .unwrap();
        assert_eq!(handler.provider_type(), PROVIDER_TYPE_MOCK);
    }
}
