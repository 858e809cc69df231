// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `validation.rs`

#[cfg(test)]
mod tests {
    use super::super::{CredentialSchema, PropertySet, PropertySpec, ValidationError, Validator};
    use std::collections::BTreeMap;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_non_empty_and_trailing_whitespace() {
        assert!(Validator::NonEmpty.validate("key", "value", false).is_ok());
        assert!(Validator::NonEmpty.validate("key", "", false).is_err());
        assert!(Validator::NoTrailingWhitespace
            .validate("key", "value", false)
            .is_ok());
        assert!(Validator::NoTrailingWhitespace
            .validate("key", "value\n", false)
            .is_err());
    }

    #[test]
    fn test_int_range() {
        let v = Validator::IntRange(1, 86400);
        assert!(v.validate("ttl", "300", false).is_ok());
        assert!(v.validate("ttl", "0", false).is_err());
        assert!(v.validate("ttl", "abc", false).is_err());
    }

    #[test]
    fn test_url_scheme() {
        let v = Validator::UrlWithScheme(vec!["https".to_string()]);
        assert!(v.validate("endpoint", "https://api.example.com", false).is_ok());
        assert!(v.validate("endpoint", "http://api.example.com", false).is_err());
        assert!(v.validate("endpoint", "not a url", false).is_err());
    }

    #[test]
    fn test_one_of_and_exact() {
        let v = Validator::OneOf(vec!["ipv4".into(), "ipv6".into()]);
        assert!(v.validate("family", "ipv4", false).is_ok());
        assert!(v.validate("family", "both", false).is_err());

        let v = Validator::Exact("v1".into());
        assert!(v.validate("version", "v1", false).is_ok());
        assert!(v.validate("version", "v2", false).is_err());
    }

    #[test]
    fn test_boolean_and_max_length() {
        assert!(Validator::Boolean.validate("flag", "true", false).is_ok());
        assert!(Validator::Boolean.validate("flag", "yes", false).is_err());
        assert!(Validator::MaxLength(4).validate("id", "abcd", false).is_ok());
        assert!(Validator::MaxLength(4).validate("id", "abcde", false).is_err());
    }

    #[test]
    fn test_regex_and_alphanumeric_punctuation() {
        let v = Validator::Regex(regex::Regex::new(r"^[A-Z0-9]{16,32}$").unwrap());
        assert!(v.validate("accessKey", "AKIA0123456789ABCDEF", false).is_ok());
        assert!(v.validate("accessKey", "lowercase", false).is_err());

        let v = Validator::AlphaNumericPunctuation;
        assert!(v.validate("token", "abc-123_!", false).is_ok());
        assert!(v.validate("token", "has space", false).is_err());
    }

    #[test]
    fn test_ca_certificate_shape() {
        let pem = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----";
        assert!(Validator::CaCertificate.validate("ca", pem, false).is_ok());
        assert!(Validator::CaCertificate
            .validate("ca", "not a certificate", false)
            .is_err());
    }

    #[test]
    fn test_sensitive_values_are_hidden_in_errors() {
        let err = Validator::NoTrailingWhitespace
            .validate("secretAccessKey", "topsecret ", true)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("(hidden)"), "got: {message}");
        assert!(!message.contains("topsecret"), "got: {message}");
    }

    #[test]
    fn test_schema_single_set() {
        let schema = CredentialSchema::single(PropertySet::new(
            vec![
                PropertySpec::new("accessKeyID"),
                PropertySpec::new("secretAccessKey").sensitive(),
            ],
            vec![PropertySpec::new("region")],
        ));

        assert!(schema
            .validate(&props(&[("accessKeyID", "AKIA"), ("secretAccessKey", "s3cr3t")]))
            .is_ok());

        let err = schema
            .validate(&props(&[("accessKeyID", "AKIA")]))
            .unwrap_err();
        assert!(matches!(err, ValidationError::Missing { ref key } if key == "secretAccessKey"));
    }

    #[test]
    fn test_schema_disjunct_alternatives() {
        // Static credentials or a workload identity token.
        let schema = CredentialSchema::any_of(vec![
            PropertySet::new(
                vec![
                    PropertySpec::new("accessKeyID"),
                    PropertySpec::new("secretAccessKey").sensitive(),
                ],
                vec![],
            ),
            PropertySet::new(vec![PropertySpec::new("workloadIdentityToken").sensitive()], vec![]),
        ]);

        assert!(schema
            .validate(&props(&[("workloadIdentityToken", "token")]))
            .is_ok());
        assert!(schema
            .validate(&props(&[("accessKeyID", "A"), ("secretAccessKey", "B")]))
            .is_ok());

        let err = schema.validate(&props(&[("other", "x")])).unwrap_err();
        assert!(matches!(err, ValidationError::NoAlternative(_)));
    }

    #[test]
    fn test_optional_keys_validated_when_present() {
        let schema = CredentialSchema::single(PropertySet::new(
            vec![PropertySpec::new("token").sensitive()],
            vec![PropertySpec::new("ttl").with(Validator::IntRange(60, 3600))],
        ));

        assert!(schema.validate(&props(&[("token", "t")])).is_ok());
        assert!(schema
            .validate(&props(&[("token", "t"), ("ttl", "120")]))
            .is_ok());
        assert!(schema
            .validate(&props(&[("token", "t"), ("ttl", "10")]))
            .is_err());
    }
}
