// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS name normalization and suffix matching.
//!
//! All dns names handled by the controller are normalized before use:
//! case-folded to lowercase with a single trailing dot stripped. Provider
//! selection and domain include/exclude filtering both rely on the
//! longest-suffix rule implemented here.

/// Normalize a dns name: trim whitespace, fold to lowercase, strip one
/// trailing dot.
///
/// Normalization is applied to every name that enters the controller
/// (entry specs, zone domains, include/exclude lists) so that comparisons
/// are byte comparisons afterwards.
#[must_use]
pub fn normalize(name: &str) -> String {
    let trimmed = name.trim().to_ascii_lowercase();
    trimmed.strip_suffix('.').unwrap_or(&trimmed).to_string()
}

/// Render a normalized name in fully qualified form (trailing dot).
#[must_use]
pub fn fqdn(name: &str) -> String {
    let normalized = normalize(name);
    format!("{normalized}.")
}

/// Check whether `name` is syntactically acceptable as a dns name.
///
/// Accepts a leading wildcard label (`*.example.com`). Each remaining label
/// must be 1-63 characters of letters, digits, hyphens, or underscores and
/// must not start or end with a hyphen. The full name is capped at 253
/// characters.
#[must_use]
pub fn is_valid(name: &str) -> bool {
    let normalized = normalize(name);
    if normalized.is_empty() || normalized.len() > 253 {
        return false;
    }

    let mut labels = normalized.split('.');
    let Some(first) = labels.next() else {
        return false;
    };

    // A single "*" is only allowed as the leftmost label.
    if first != "*" && !is_valid_label(first) {
        return false;
    }

    let mut rest = 0;
    for label in labels {
        rest += 1;
        if !is_valid_label(label) {
            return false;
        }
    }

    // "*" alone is not a dns name.
    first != "*" || rest > 0
}

fn is_valid_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }
    if label.starts_with('-') || label.ends_with('-') {
        return false;
    }
    label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Check whether `name` equals `suffix` or lies under it.
///
/// Both arguments are normalized before comparison. A wildcard leading
/// label on `name` is ignored for matching purposes: `*.sub.example.com`
/// is under `example.com`.
#[must_use]
pub fn matches_suffix(name: &str, suffix: &str) -> bool {
    match_length(name, suffix).is_some()
}

/// Length of the domain suffix matched by `name`, or `None` if it does not
/// match.
///
/// The returned length is the character count of the normalized suffix and
/// is used to rank candidate domains: a longer matched suffix is a more
/// specific match.
#[must_use]
pub fn match_length(name: &str, suffix: &str) -> Option<usize> {
    let name = normalize(name);
    let suffix = normalize(suffix);
    if suffix.is_empty() {
        return None;
    }
    let name = name.strip_prefix("*.").unwrap_or(&name);
    if name == suffix {
        return Some(suffix.len());
    }
    if name.ends_with(&format!(".{suffix}")) {
        return Some(suffix.len());
    }
    None
}

/// Pick the most specific (longest) matching suffix from `candidates` for
/// the given name. Returns the matched candidate and its match length.
#[must_use]
pub fn best_match<'a>(name: &str, candidates: &'a [String]) -> Option<(&'a str, usize)> {
    candidates
        .iter()
        .filter_map(|c| match_length(name, c).map(|len| (c.as_str(), len)))
        .max_by_key(|(_, len)| *len)
}

#[cfg(test)]
#[path = "name_tests.rs"]
mod name_tests;
