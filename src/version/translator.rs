// src/version/translator.rs

//! Translation between native conda version text and the canonical grammar
//!
//! Conda version strings carry alphabetic run suffixes ("1.1.1w", "2021e")
//! that compare incorrectly under dotted-numeric ordering. The translator
//! rewrites such runs into dotted codepoint segments so every comparison in
//! the resolver happens on one strictly-ordered grammar, and records each
//! rewrite in a [`VersionMapping`] so the native text can be reconstructed
//! for display and lockfile persistence.
//!
//! Recognized pre/post-release tokens (a, b, rc, dev, post, rev, alpha,
//! beta, preview, pre) are preserved verbatim: the canonical grammar already
//! assigns correct ordering to them.

use std::collections::HashMap;

/// Tokens the canonical grammar understands natively; an alphabetic run
/// matching one of these (followed by nothing but digits and separators)
/// is left untouched.
const PRESERVED_TOKENS: &[&str] = &[
    "a", "b", "rc", "dev", "post", "rev", "alpha", "beta", "preview", "pre",
];

/// Ceiling for the reverse encoding: 'a' + 'z', so that subtracting a
/// letter's codepoint flips lexical order (a ↔ z).
const REVERSE_CEILING: u32 = ('a' as u32) + ('z' as u32);

/// Packages whose build suffix letters order in reverse lexical order.
const REVERSED_SUFFIX_PACKAGES: &[&str] = &["tzcode"];

/// Direction of the alphabet→codepoint encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Forward,
    Reverse,
}

/// Select the letter encoding for a package name
pub fn encoding_for(package: &str) -> Encoding {
    if REVERSED_SUFFIX_PACKAGES.contains(&package) {
        Encoding::Reverse
    } else {
        Encoding::Forward
    }
}

/// Canonical-text → native-text side table, keyed by operator-stripped
/// canonical form. Populated on every translation so that the native text
/// survives canonical comparisons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionMapping {
    entries: HashMap<String, String>,
}

impl VersionMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a canonical→native pair. The first recording wins: repeated
    /// translations of the same native text are idempotent.
    pub fn record(&mut self, canonical: &str, native: &str) {
        self.entries
            .entry(canonical.to_string())
            .or_insert_with(|| native.to_string());
    }

    /// Look up the native text for a canonical form
    pub fn native(&self, canonical: &str) -> Option<&str> {
        self.entries.get(canonical).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another mapping into this one (existing entries win)
    pub fn merge(&mut self, other: &VersionMapping) {
        for (canonical, native) in &other.entries {
            self.record(canonical, native);
        }
    }
}

/// Rewrite a native version string into canonical form, recording the
/// translation in `mapping`.
pub fn to_canonical_with(native: &str, encoding: Encoding, mapping: &mut VersionMapping) -> String {
    let canonical = rewrite(native, encoding);
    if canonical != native {
        mapping.record(&canonical, native);
    }
    canonical
}

/// Rewrite a native version string into canonical form with the default
/// forward encoding and no mapping bookkeeping.
pub fn to_canonical(native: &str) -> String {
    rewrite(native, Encoding::Forward)
}

/// Reconstruct native version text from a canonical form. Falls back to the
/// canonical text itself when no rewrite was recorded (the two grammars
/// agree for plain dotted-numeric versions).
pub fn to_native(canonical: &str, mapping: &VersionMapping) -> String {
    mapping
        .native(canonical)
        .unwrap_or(canonical)
        .to_string()
}

/// Normalize a wildcard version expression.
///
/// An empty segment immediately before the wildcard (a trailing bare dot,
/// as in "1.2..*") is completed with an explicit `0`. The returned text
/// always has the shape `prefix.*`.
pub fn normalize_wildcard(text: &str) -> String {
    let text = text.trim();
    let head = text
        .strip_suffix(".*")
        .or_else(|| text.strip_suffix('*'))
        .unwrap_or(text);

    let mut segments: Vec<&str> = head.split('.').collect();
    // A trailing bare dot yields an empty final segment; complete it with 0.
    if segments.last().is_some_and(|last| last.is_empty()) {
        segments.pop();
        segments.push("0");
    }
    format!("{}.*", segments.join("."))
}

/// Core rewriting pass: copy digit runs and separators, preserve whitelisted
/// tokens, encode everything else letter-by-letter.
fn rewrite(native: &str, encoding: Encoding) -> String {
    let lowered = native.trim().to_ascii_lowercase();

    // Local labels ("+something") pass through untouched
    let (body, local) = match lowered.find('+') {
        Some(pos) => (&lowered[..pos], Some(&lowered[pos..])),
        None => (lowered.as_str(), None),
    };

    let mut out = String::with_capacity(body.len() + 4);
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_alphabetic() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_alphabetic() {
                i += 1;
            }
            let run: String = chars[start..i].iter().collect();
            let tail: String = chars[i..].iter().collect();
            if PRESERVED_TOKENS.contains(&run.as_str()) && tail_is_numeric(&tail) {
                out.push_str(&run);
            } else {
                // Encode each letter as its own dotted numeric segment
                for ch in run.chars() {
                    if !out.is_empty() && !out.ends_with('.') {
                        out.push('.');
                    }
                    let code = match encoding {
                        Encoding::Forward => ch as u32,
                        Encoding::Reverse => REVERSE_CEILING - ch as u32,
                    };
                    out.push_str(&code.to_string());
                }
            }
        } else if c == '-' || c == '_' {
            if !out.ends_with('.') {
                out.push('.');
            }
            i += 1;
        } else {
            out.push(c);
            i += 1;
        }
    }

    if let Some(local) = local {
        out.push_str(local);
    }
    out
}

/// Whether the remainder of a version string contains only digits and
/// separators — the condition for preserving a whitelisted token.
fn tail_is_numeric(tail: &str) -> bool {
    tail.chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_version_unchanged() {
        assert_eq!(to_canonical("1.2.3"), "1.2.3");
        assert_eq!(to_canonical("0.10"), "0.10");
    }

    #[test]
    fn test_letter_suffix_encoded() {
        // openssl-style suffixes
        assert_eq!(to_canonical("1.1.1w"), "1.1.1.119");
        assert_eq!(to_canonical("1.1.1v"), "1.1.1.118");
        // tzdata-style year releases
        assert_eq!(to_canonical("2021e"), "2021.101");
    }

    #[test]
    fn test_multi_letter_run() {
        assert_eq!(to_canonical("1.2.3ab"), "1.2.3.97.98");
    }

    #[test]
    fn test_whitelisted_tokens_preserved() {
        assert_eq!(to_canonical("1.2.3rc1"), "1.2.3rc1");
        assert_eq!(to_canonical("1.2.3.alpha2"), "1.2.3.alpha2");
        assert_eq!(to_canonical("1.0.post1"), "1.0.post1");
        assert_eq!(to_canonical("1.0.dev"), "1.0.dev");
    }

    #[test]
    fn test_whitelist_token_with_alpha_tail_is_encoded() {
        // "a" is whitelisted but here more letters follow, so it is not a
        // pre-release marker
        assert_eq!(to_canonical("1.2a.xy"), "1.2.97.120.121");
    }

    #[test]
    fn test_separators_normalized() {
        assert_eq!(to_canonical("0.4.1_5"), "0.4.1.5");
        assert_eq!(to_canonical("1.2-3"), "1.2.3");
    }

    #[test]
    fn test_reverse_encoding_flips_order() {
        let w = rewrite("1.1.1w", Encoding::Reverse);
        let v = rewrite("1.1.1v", Encoding::Reverse);
        // 219-119=100, 219-118=101: later letter now sorts lower
        assert_eq!(w, "1.1.1.100");
        assert_eq!(v, "1.1.1.101");
    }

    #[test]
    fn test_mapping_round_trip() {
        let mut mapping = VersionMapping::new();
        let canonical = to_canonical_with("1.1.1w", Encoding::Forward, &mut mapping);
        assert_eq!(to_native(&canonical, &mapping), "1.1.1w");
        // Unmapped canonical text falls back to identity
        assert_eq!(to_native("1.2.3", &mapping), "1.2.3");
    }

    #[test]
    fn test_mapping_first_recording_wins() {
        let mut mapping = VersionMapping::new();
        mapping.record("1.2.3.97", "1.2.3a");
        mapping.record("1.2.3.97", "1.2.3A");
        assert_eq!(mapping.native("1.2.3.97"), Some("1.2.3a"));
    }

    #[test]
    fn test_normalize_wildcard() {
        assert_eq!(normalize_wildcard("1.2.*"), "1.2.*");
        assert_eq!(normalize_wildcard("1.2*"), "1.2.*");
        // Trailing bare dot completed with an explicit 0
        assert_eq!(normalize_wildcard("1.2..*"), "1.2.0.*");
    }

    #[test]
    fn test_encoding_for() {
        assert_eq!(encoding_for("numpy"), Encoding::Forward);
        assert_eq!(encoding_for("tzcode"), Encoding::Reverse);
    }

    #[test]
    fn test_local_label_passes_through() {
        assert_eq!(to_canonical("1.2.3+local.tag"), "1.2.3+local.tag");
    }
}
