// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `context.rs`

#[cfg(test)]
mod tests {
    use super::super::AnnotationOverlay;
    use std::collections::BTreeMap;

    #[test]
    fn test_overlay_key_format() {
        assert_eq!(
            AnnotationOverlay::overlay_key("networking.k8s.io/v1", "Ingress", "default", "web"),
            "networking.k8s.io/v1/Ingress/default/web"
        );
    }

    #[test]
    fn test_overlay_put_get_remove() {
        let overlay = AnnotationOverlay::new();
        assert!(overlay.is_empty());

        let mut annotations = BTreeMap::new();
        annotations.insert(
            "dns.gardener.cloud/dnsnames".to_string(),
            "*".to_string(),
        );
        overlay.put("v1/Service/default/svc", annotations.clone());
        assert_eq!(overlay.len(), 1);
        assert_eq!(overlay.get("v1/Service/default/svc"), Some(annotations));
        assert!(overlay.get("v1/Service/default/other").is_none());

        overlay.remove("v1/Service/default/svc");
        assert!(overlay.is_empty());
    }

    #[test]
    fn test_overlay_put_replaces() {
        let overlay = AnnotationOverlay::new();
        let mut first = BTreeMap::new();
        first.insert("a".to_string(), "1".to_string());
        overlay.put("k", first);

        let mut second = BTreeMap::new();
        second.insert("b".to_string(), "2".to_string());
        overlay.put("k", second.clone());

        assert_eq!(overlay.get("k"), Some(second));
    }
}
