// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Credential and provider-config validators.
//!
//! Provider adapters declare the credential properties they accept as a
//! [`CredentialSchema`]: one or more alternative property sets (for example
//! static keys versus a workload-identity token), each with required and
//! optional keys and per-key validators. Validation runs before a handler
//! is instantiated; failures are user errors and map to the `Invalid`
//! state.
//!
//! Error messages never contain the value of a sensitive property.

use std::collections::BTreeMap;
use thiserror::Error;

/// A single failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("property {key:?} is required but missing")]
    Missing { key: String },

    #[error("property {key:?} is invalid: {reason} (value: {value})")]
    Invalid {
        key: String,
        reason: String,
        /// The offending value, or `(hidden)` for sensitive properties
        value: String,
    },

    #[error("no alternative property set matched: {0}")]
    NoAlternative(String),
}

/// Per-value validation rules.
#[derive(Debug, Clone)]
pub enum Validator {
    /// Value must not be empty
    NonEmpty,
    /// Value must not end in whitespace (a classic copy-paste error)
    NoTrailingWhitespace,
    /// Value must match the given pattern
    Regex(regex::Regex),
    /// Value must parse as an integer within the inclusive range
    IntRange(i64, i64),
    /// Value must be a URL with one of the given schemes
    UrlWithScheme(Vec<String>),
    /// Value must be one of the listed values
    OneOf(Vec<String>),
    /// Value must not exceed the given length
    MaxLength(usize),
    /// Value must consist of ASCII letters, digits, and punctuation
    AlphaNumericPunctuation,
    /// Value must look like a PEM-encoded CA certificate
    CaCertificate,
    /// Value must be `true` or `false`
    Boolean,
    /// Value must equal the expected string exactly
    Exact(String),
}

impl Validator {
    /// Validate one value, rendering it as `(hidden)` in errors when the
    /// owning property is sensitive.
    pub fn validate(&self, key: &str, value: &str, sensitive: bool) -> Result<(), ValidationError> {
        let fail = |reason: String| {
            Err(ValidationError::Invalid {
                key: key.to_string(),
                reason,
                value: if sensitive {
                    "(hidden)".to_string()
                } else {
                    value.to_string()
                },
            })
        };

        match self {
            Validator::NonEmpty => {
                if value.is_empty() {
                    return fail("must not be empty".into());
                }
            }
            Validator::NoTrailingWhitespace => {
                if value != value.trim_end() {
                    return fail("must not have trailing whitespace".into());
                }
            }
            Validator::Regex(pattern) => {
                if !pattern.is_match(value) {
                    return fail(format!("must match pattern {:?}", pattern.as_str()));
                }
            }
            Validator::IntRange(min, max) => match value.parse::<i64>() {
                Ok(n) if (*min..=*max).contains(&n) => {}
                Ok(_) => return fail(format!("must be between {min} and {max}")),
                Err(_) => return fail("must be an integer".into()),
            },
            Validator::UrlWithScheme(schemes) => match url::Url::parse(value) {
                Ok(parsed) if schemes.iter().any(|s| s == parsed.scheme()) => {}
                Ok(parsed) => {
                    return fail(format!(
                        "scheme {:?} not allowed (expected one of {schemes:?})",
                        parsed.scheme()
                    ))
                }
                Err(e) => return fail(format!("must be a URL: {e}")),
            },
            Validator::OneOf(allowed) => {
                if !allowed.iter().any(|a| a == value) {
                    return fail(format!("must be one of {allowed:?}"));
                }
            }
            Validator::MaxLength(max) => {
                if value.len() > *max {
                    return fail(format!("must not exceed {max} characters"));
                }
            }
            Validator::AlphaNumericPunctuation => {
                if !value
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c.is_ascii_punctuation())
                {
                    return fail("must contain only letters, digits, and punctuation".into());
                }
            }
            Validator::CaCertificate => {
                let trimmed = value.trim();
                if !trimmed.starts_with("-----BEGIN CERTIFICATE-----")
                    || !trimmed.ends_with("-----END CERTIFICATE-----")
                {
                    return fail("must be a PEM-encoded certificate".into());
                }
            }
            Validator::Boolean => {
                if value != "true" && value != "false" {
                    return fail("must be 'true' or 'false'".into());
                }
            }
            Validator::Exact(expected) => {
                if value != expected {
                    return fail(format!("must equal {expected:?}"));
                }
            }
        }
        Ok(())
    }
}

/// One named credential property with its validators.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub name: String,
    /// Sensitive values are hidden in error messages
    pub sensitive: bool,
    pub validators: Vec<Validator>,
}

impl PropertySpec {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sensitive: false,
            validators: vec![Validator::NonEmpty, Validator::NoTrailingWhitespace],
        }
    }

    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    #[must_use]
    pub fn with(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }
}

/// One alternative set of properties: all required keys present and valid,
/// optional keys validated when present.
#[derive(Debug, Clone, Default)]
pub struct PropertySet {
    pub required: Vec<PropertySpec>,
    pub optional: Vec<PropertySpec>,
}

impl PropertySet {
    #[must_use]
    pub fn new(required: Vec<PropertySpec>, optional: Vec<PropertySpec>) -> Self {
        Self { required, optional }
    }

    fn validate(&self, properties: &BTreeMap<String, String>) -> Result<(), ValidationError> {
        for spec in &self.required {
            let Some(value) = properties.get(&spec.name) else {
                return Err(ValidationError::Missing {
                    key: spec.name.clone(),
                });
            };
            for validator in &spec.validators {
                validator.validate(&spec.name, value, spec.sensitive)?;
            }
        }
        for spec in &self.optional {
            if let Some(value) = properties.get(&spec.name) {
                for validator in &spec.validators {
                    validator.validate(&spec.name, value, spec.sensitive)?;
                }
            }
        }
        Ok(())
    }
}

/// Disjunct property sets: credentials are valid when at least one
/// alternative validates completely.
#[derive(Debug, Clone)]
pub struct CredentialSchema {
    pub alternatives: Vec<PropertySet>,
}

impl CredentialSchema {
    #[must_use]
    pub fn single(set: PropertySet) -> Self {
        Self {
            alternatives: vec![set],
        }
    }

    #[must_use]
    pub fn any_of(alternatives: Vec<PropertySet>) -> Self {
        Self { alternatives }
    }

    /// Validate `properties` against the schema.
    ///
    /// When no alternative matches, the error of the alternative that got
    /// furthest (fewest missing keys) is reported to keep messages useful.
    pub fn validate(&self, properties: &BTreeMap<String, String>) -> Result<(), ValidationError> {
        let mut best: Option<ValidationError> = None;
        let mut best_missing = usize::MAX;

        for alternative in &self.alternatives {
            match alternative.validate(properties) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let missing = alternative
                        .required
                        .iter()
                        .filter(|spec| !properties.contains_key(&spec.name))
                        .count();
                    if missing < best_missing {
                        best_missing = missing;
                        best = Some(err);
                    }
                }
            }
        }

        match best {
            Some(err) if self.alternatives.len() == 1 => Err(err),
            Some(err) => Err(ValidationError::NoAlternative(err.to_string())),
            None => Err(ValidationError::NoAlternative(
                "schema declares no property sets".to_string(),
            )),
        }
    }
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod validation_tests;
