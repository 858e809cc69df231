// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `registry.rs`

#[cfg(test)]
mod tests {
    use super::super::{ProviderRegistry, ProviderState, SelectedZone, SelectionResult};
    use crate::dns::ZoneId;
    use crate::errors::ResourceState;

    fn selection(zones: Vec<SelectedZone>, excluded_domains: Vec<String>) -> SelectionResult {
        let included_domains = zones
            .iter()
            .flat_map(|z| z.included_domains.clone())
            .collect();
        SelectionResult {
            zones,
            excluded_zones: Vec::new(),
            included_domains,
            excluded_domains,
            warnings: Vec::new(),
        }
    }

    fn zone(id: &str, domain: &str) -> SelectedZone {
        SelectedZone {
            id: ZoneId::new("mock", id),
            domain: domain.to_string(),
            included_domains: vec![domain.to_string()],
        }
    }

    fn state(key: &str, ready: bool, selection: SelectionResult) -> ProviderState {
        ProviderState {
            key: key.to_string(),
            provider_type: "mock".to_string(),
            state: if ready {
                ResourceState::Ready
            } else {
                ResourceState::Error
            },
            account: None,
            selection,
            default_ttl: 300,
        }
    }

    #[test]
    fn test_match_for_picks_most_specific_zone() {
        let sel = selection(
            vec![
                zone("test:example.com", "example.com"),
                zone("test:sub.example.com", "sub.example.com"),
            ],
            vec![],
        );
        let matched = sel.match_for("www.sub.example.com").unwrap();
        assert_eq!(matched.zone, ZoneId::new("mock", "test:sub.example.com"));
        assert_eq!(matched.matched_domain, "sub.example.com");

        let matched = sel.match_for("www.example.com").unwrap();
        assert_eq!(matched.zone, ZoneId::new("mock", "test:example.com"));
    }

    #[test]
    fn test_match_for_respects_exclusions() {
        let sel = selection(
            vec![zone("test:example.com", "example.com")],
            vec!["internal.example.com".to_string()],
        );
        assert!(sel.match_for("www.example.com").is_some());
        // The closer excluded ancestor wins.
        assert!(sel.match_for("www.internal.example.com").is_none());
        // Exclusion of the exact domain wins over inclusion of the same.
        let sel = selection(
            vec![zone("test:example.com", "example.com")],
            vec!["example.com".to_string()],
        );
        assert!(sel.match_for("www.example.com").is_none());
    }

    #[test]
    fn test_match_for_none_outside_selection() {
        let sel = selection(vec![zone("test:example.com", "example.com")], vec![]);
        assert!(sel.match_for("www.example.org").is_none());
    }

    #[test]
    fn test_registry_put_get_remove() {
        let registry = ProviderRegistry::new();
        assert!(registry.is_empty());

        registry.put(state("ns/p1", true, SelectionResult::default()));
        registry.put(state("ns/p2", false, SelectionResult::default()));
        assert_eq!(registry.len(), 2);

        let p1 = registry.get("ns/p1").unwrap();
        assert!(p1.state == ResourceState::Ready);
        // Readiness additionally requires an account.
        assert!(!p1.is_ready());

        let removed = registry.remove("ns/p1").unwrap();
        assert_eq!(removed.key, "ns/p1");
        assert!(registry.get("ns/p1").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_is_sorted_by_key() {
        let registry = ProviderRegistry::new();
        registry.put(state("ns/p3", true, SelectionResult::default()));
        registry.put(state("ns/p1", true, SelectionResult::default()));
        registry.put(state("aa/p9", true, SelectionResult::default()));

        let keys: Vec<String> = registry.snapshot().iter().map(|s| s.key.clone()).collect();
        assert_eq!(keys, vec!["aa/p9", "ns/p1", "ns/p3"]);
    }

    #[test]
    fn test_put_replaces_existing_state() {
        let registry = ProviderRegistry::new();
        registry.put(state("ns/p1", false, SelectionResult::default()));
        registry.put(state("ns/p1", true, SelectionResult::default()));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("ns/p1").unwrap().state == ResourceState::Ready);
    }
}
