// src/requirement.rs

//! Unified requirement model across both ecosystems
//!
//! A requirement line is parsed into the same structure whether it is
//! written in the system ecosystem's dialect (leading `conda:` marker,
//! optional `channel::` prefix, space-separated version and build tokens,
//! `|` OR groups) or in standard index syntax (`name>=1.0,<2.0`). All
//! version text is translated into the canonical grammar at parse time; the
//! original text is kept in the requirement's version mapping for display
//! and lockfile round-trips.

use crate::error::{Error, Result};
use crate::mapping::NameMap;
use crate::version::translator::{encoding_for, to_canonical_with, to_native};
use crate::version::{normalize_wildcard, CanonicalVersion, VersionMapping};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use strum_macros::{Display as StrumDisplay, EnumString};

/// Which ecosystem a requirement was written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Ecosystem {
    /// System ecosystem: channels, build strings, external batch solver
    Conda,
    /// Language ecosystem: the standard package index
    Index,
}

/// Version comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Compatible release (`~=`), preserved in-process and rewritten before
    /// reaching the external solver
    Compatible,
    /// Wildcard prefix match (`==1.2.*`, conda `=1.2`)
    StartsWith,
    /// Negated wildcard prefix match (`!=1.2.*`)
    NotStartsWith,
}

impl Operator {
    fn as_str(self) -> &'static str {
        match self {
            Operator::Eq | Operator::StartsWith => "==",
            Operator::Ne | Operator::NotStartsWith => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Compatible => "~=",
        }
    }
}

/// One (operator, version) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    pub op: Operator,
    pub version: CanonicalVersion,
    /// Canonical operator-stripped text, the key into the version mapping
    pub text: String,
}

/// Exclusive/inclusive upper bound implied by a specifier set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpperBound {
    pub version: CanonicalVersion,
    pub inclusive: bool,
}

impl UpperBound {
    fn tighter_than(&self, other: &UpperBound) -> bool {
        match self.version.cmp(&other.version) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => !self.inclusive && other.inclusive,
        }
    }
}

impl Specifier {
    /// Whether a version satisfies this specifier
    pub fn matches(&self, v: &CanonicalVersion) -> bool {
        match self.op {
            Operator::Eq => v.cmp(&self.version) == Ordering::Equal,
            Operator::Ne => v.cmp(&self.version) != Ordering::Equal,
            Operator::Lt => v < &self.version,
            Operator::Le => v <= &self.version,
            Operator::Gt => v > &self.version,
            Operator::Ge => v >= &self.version,
            Operator::Compatible => {
                let release = &self.version.release;
                let prefix = &release[..release.len().saturating_sub(1)];
                v.epoch == self.version.epoch && v >= &self.version && v.release_starts_with(prefix)
            }
            Operator::StartsWith => {
                v.epoch == self.version.epoch && v.release_starts_with(&self.version.release)
            }
            Operator::NotStartsWith => {
                !(v.epoch == self.version.epoch && v.release_starts_with(&self.version.release))
            }
        }
    }

    /// Upper bound implied by this specifier, if any
    fn upper_bound(&self) -> Option<UpperBound> {
        match self.op {
            Operator::Lt => Some(UpperBound {
                version: self.version.clone(),
                inclusive: false,
            }),
            Operator::Le | Operator::Eq => Some(UpperBound {
                version: self.version.clone(),
                inclusive: true,
            }),
            Operator::Compatible => {
                let release = &self.version.release;
                Some(UpperBound {
                    version: bump_release(&release[..release.len().saturating_sub(1)]),
                    inclusive: false,
                })
            }
            Operator::StartsWith => Some(UpperBound {
                version: bump_release(&self.version.release),
                inclusive: false,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Operator::StartsWith | Operator::NotStartsWith => {
                write!(f, "{}{}.*", self.op.as_str(), self.text)
            }
            _ => write!(f, "{}{}", self.op.as_str(), self.text),
        }
    }
}

/// Smallest version strictly above every version sharing the prefix:
/// increment the last segment (`[1, 2]` → `1.3`).
fn bump_release(prefix: &[u64]) -> CanonicalVersion {
    let mut release: Vec<u64> = prefix.to_vec();
    if let Some(last) = release.last_mut() {
        *last += 1;
    } else {
        release.push(u64::MAX);
    }
    CanonicalVersion {
        epoch: 0,
        release,
        pre: None,
        post: None,
        dev: None,
    }
}

/// An ordered, ANDed set of specifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecifierSet {
    specs: Vec<Specifier>,
}

impl SpecifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Specifier> {
        self.specs.iter()
    }

    pub fn push(&mut self, spec: Specifier) {
        if !self.specs.contains(&spec) {
            self.specs.push(spec);
        }
    }

    /// Whether a version satisfies every specifier (an empty set matches all)
    pub fn contains(&self, v: &CanonicalVersion) -> bool {
        self.specs.iter().all(|s| s.matches(v))
    }

    /// AND another set into this one, skipping duplicates
    pub fn merge(&mut self, other: &SpecifierSet) {
        for spec in &other.specs {
            self.push(spec.clone());
        }
    }

    /// Tightest upper bound implied by the set, if any
    pub fn upper_bound(&self) -> Option<UpperBound> {
        let mut best: Option<UpperBound> = None;
        for spec in &self.specs {
            if let Some(bound) = spec.upper_bound() {
                best = match best {
                    Some(current) if current.tighter_than(&bound) => Some(current),
                    _ => Some(bound),
                };
            }
        }
        best
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.specs.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// A parsed requirement in the unified structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Normalized, lowercase, ecosystem-neutral key
    pub name: String,
    pub ecosystem: Ecosystem,
    pub specifier: SpecifierSet,
    /// Channel provenance hint (system ecosystem only)
    pub channel: Option<String>,
    /// Exact or wildcard build-identifier pattern
    pub build_string: Option<String>,
    /// Canonical → native version text, for display and lock round-trips
    pub version_mapping: VersionMapping,
    /// Whether this system requirement also denotes an index-installable
    /// artifact
    pub is_python_package: bool,
}

impl Requirement {
    /// Bare requirement on a name, matching any version
    pub fn any(name: &str, ecosystem: Ecosystem) -> Result<Self> {
        let name = normalize_name(name)?;
        Ok(Self {
            name,
            ecosystem,
            specifier: SpecifierSet::new(),
            channel: None,
            build_string: None,
            version_mapping: VersionMapping::new(),
            is_python_package: true,
        })
    }

    /// Parse a requirement line. A leading `conda:` marker selects the
    /// system ecosystem's dialect; everything else parses as standard index
    /// syntax.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(Error::ParseError("Empty requirement line".to_string()));
        }
        if let Some(rest) = line.strip_prefix("conda:") {
            Self::parse_conda(rest.trim())
        } else {
            Self::parse_index(line)
        }
    }

    /// Parse the system ecosystem dialect:
    /// `[channel::]name[ version-expr[ build-string]]`
    pub fn parse_conda(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(Error::ParseError("Empty conda requirement".to_string()));
        }

        // channel::name prefix
        let (channel, rest) = match line.split_once("::") {
            Some((channel, rest)) => (Some(channel.trim().to_string()), rest.trim()),
            None => (None, line),
        };

        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let (head, version_token, build_string) = match tokens.as_slice() {
            [] => return Err(Error::ParseError(format!("Malformed conda requirement '{line}'"))),
            [head] => (*head, None, None),
            [head, second] => {
                // Two tokens: the second is a build string only when the
                // first already carries a version operator
                if head.chars().any(|c| "<>=!~".contains(c)) {
                    (*head, None, Some(second.to_string()))
                } else {
                    (*head, Some(*second), None)
                }
            }
            [head, version, build] => (*head, Some(*version), Some(build.to_string())),
            _ => {
                return Err(Error::ParseError(format!(
                    "Too many tokens in conda requirement '{line}'"
                )));
            }
        };

        // The head may glue name and version expression together
        let (name_part, glued_expr) = split_name_and_expr(head);
        let name = normalize_name(name_part)?;

        let expr = match (glued_expr, version_token) {
            (Some(_), Some(_)) => {
                return Err(Error::ParseError(format!(
                    "Version specified twice in conda requirement '{line}'"
                )));
            }
            (Some(e), None) => Some(e.to_string()),
            (None, Some(t)) => Some(t.to_string()),
            (None, None) => None,
        };

        let mut version_mapping = VersionMapping::new();
        let specifier = match expr {
            Some(expr) => parse_conda_expr(&expr, &name, &mut version_mapping)?,
            None => SpecifierSet::new(),
        };

        Ok(Self {
            name,
            ecosystem: Ecosystem::Conda,
            specifier,
            channel,
            build_string,
            version_mapping,
            is_python_package: true,
        })
    }

    /// Parse standard index syntax: `name[specifier[,specifier...]]`
    pub fn parse_index(line: &str) -> Result<Self> {
        let line = line.trim();
        let (name_part, expr) = split_name_and_expr(line);
        let name = normalize_index_name(name_part)?;

        let mut version_mapping = VersionMapping::new();
        let specifier = match expr {
            Some(expr) => {
                let mut set = SpecifierSet::new();
                for part in expr.split(',') {
                    let part = part.trim();
                    if part.is_empty() {
                        return Err(Error::ParseError(format!(
                            "Dangling comma in requirement '{line}'"
                        )));
                    }
                    set.push(parse_one_specifier(part, &name, true, &mut version_mapping)?);
                }
                set
            }
            None => SpecifierSet::new(),
        };

        Ok(Self {
            name,
            ecosystem: Ecosystem::Index,
            specifier,
            channel: None,
            build_string: None,
            version_mapping,
            is_python_package: true,
        })
    }

    pub fn with_python_package(mut self, value: bool) -> Self {
        self.is_python_package = value;
        self
    }

    /// The system-ecosystem name for this requirement
    pub fn conda_name(&self, names: &NameMap) -> String {
        match self.ecosystem {
            Ecosystem::Conda => self.name.clone(),
            Ecosystem::Index => names.to_conda(&self.name),
        }
    }

    /// The index name for this requirement
    pub fn index_name(&self, names: &NameMap) -> String {
        match self.ecosystem {
            Ecosystem::Index => self.name.clone(),
            Ecosystem::Conda => names.to_index(&self.name),
        }
    }

    /// Rewrite this requirement into the other ecosystem, carrying the
    /// specifier, build string and mapping over. Used during cross-ecosystem
    /// criterion reconciliation.
    pub fn into_ecosystem(&self, target: Ecosystem, names: &NameMap) -> Requirement {
        let name = match target {
            Ecosystem::Conda => self.conda_name(names),
            Ecosystem::Index => self.index_name(names),
        };
        Requirement {
            name,
            ecosystem: target,
            specifier: self.specifier.clone(),
            channel: self.channel.clone(),
            build_string: self.build_string.clone(),
            version_mapping: self.version_mapping.clone(),
            is_python_package: self.is_python_package,
        }
    }

    /// Merge another requirement's constraints into this one (AND)
    pub fn merge(&mut self, other: &Requirement) {
        self.specifier.merge(&other.specifier);
        self.version_mapping.merge(&other.version_mapping);
        if self.build_string.is_none() {
            self.build_string = other.build_string.clone();
        }
        if self.channel.is_none() {
            self.channel = other.channel.clone();
        }
    }

    /// Compatibility check: same mapped name, every version literal of
    /// `other`'s specifier contained in this specifier, and compatible build
    /// strings when both carry one.
    pub fn is_compatible(&self, other: &Requirement, names: &NameMap) -> bool {
        if self.conda_name(names) != other.conda_name(names) {
            return false;
        }
        if !other
            .specifier
            .iter()
            .all(|spec| self.specifier.contains(&spec.version))
        {
            return false;
        }
        match (&self.build_string, &other.build_string) {
            (Some(mine), Some(theirs)) => build_matches(mine, theirs),
            _ => true,
        }
    }

    /// Whether the upper bound of this requirement is strictly tighter than
    /// the other's (missing bound counts as unbounded).
    pub fn tighter_upper_bound_than(&self, other: &Requirement) -> bool {
        match (self.specifier.upper_bound(), other.specifier.upper_bound()) {
            (Some(mine), Some(theirs)) => mine.tighter_than(&theirs),
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Version expression in the external solver's grammar: native version
    /// text restored from the mapping, `~=` rewritten into its
    /// `>=`-plus-wildcard equivalent.
    pub fn conda_version_expr(&self) -> String {
        let mut parts = Vec::new();
        for spec in self.specifier.iter() {
            match spec.op {
                Operator::Compatible => {
                    let release = &spec.version.release;
                    let prefix: Vec<String> = release[..release.len().saturating_sub(1)]
                        .iter()
                        .map(|n| n.to_string())
                        .collect();
                    parts.push(format!(">={}", to_native(&spec.text, &self.version_mapping)));
                    parts.push(format!("{}.*", prefix.join(".")));
                }
                Operator::StartsWith => {
                    parts.push(format!("{}.*", to_native(&spec.text, &self.version_mapping)));
                }
                Operator::NotStartsWith => {
                    parts.push(format!("!={}.*", to_native(&spec.text, &self.version_mapping)));
                }
                op => {
                    parts.push(format!(
                        "{}{}",
                        op.as_str(),
                        to_native(&spec.text, &self.version_mapping)
                    ));
                }
            }
        }
        parts.join(",")
    }

    /// Full match-spec line for the external solver
    pub fn as_conda_line(&self, names: &NameMap) -> String {
        let mut line = String::new();
        if let Some(channel) = &self.channel {
            line.push_str(channel);
            line.push_str("::");
        }
        line.push_str(&self.conda_name(names));
        let expr = self.conda_version_expr();
        if !expr.is_empty() {
            line.push(' ');
            line.push_str(&expr);
            if let Some(build) = &self.build_string {
                line.push(' ');
                line.push_str(build);
            }
        }
        line
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(channel) = &self.channel {
            write!(f, "{}::", channel)?;
        }
        write!(f, "{}", self.name)?;
        if !self.specifier.is_empty() {
            write!(f, "{}", self.specifier)?;
        }
        if let Some(build) = &self.build_string {
            write!(f, " {}", build)?;
        }
        Ok(())
    }
}

/// Normalize a package name: lowercased, charset-checked. Underscores stay
/// as written — conda names like `python_abi` are significant.
pub fn normalize_name(name: &str) -> Result<String> {
    let name = name.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(Error::ParseError("Requirement has an empty name".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
    {
        return Err(Error::ParseError(format!("Invalid package name '{name}'")));
    }
    Ok(name)
}

/// Index names additionally fold underscores into dashes, the way the
/// language index treats name equivalence.
pub fn normalize_index_name(name: &str) -> Result<String> {
    normalize_name(&name.replace('_', "-"))
}

/// Whether a wildcard build-string pattern matches a concrete build string.
/// The pattern is expanded into an anchored prefix regex (`*` → `.*`).
pub fn build_matches(pattern: &str, build: &str) -> bool {
    let mut expr = String::from("^");
    for c in pattern.chars() {
        if c == '*' {
            expr.push_str(".*");
        } else {
            expr.push_str(&regex::escape(&c.to_string()));
        }
    }
    match Regex::new(&expr) {
        Ok(re) => re.is_match(build),
        Err(_) => pattern == build,
    }
}

/// Split `numpy>=1.21,<2.0` into the name part and the trailing expression
fn split_name_and_expr(text: &str) -> (&str, Option<&str>) {
    match text.find(|c| "<>=!~".contains(c)) {
        Some(pos) if pos > 0 => (&text[..pos], Some(&text[pos..])),
        _ => (text, None),
    }
}

/// Parse a conda version expression: comma is AND, pipe is OR. An OR group
/// collapses to its canonically-maximal member (a documented approximation
/// of full OR semantics).
fn parse_conda_expr(
    expr: &str,
    name: &str,
    mapping: &mut VersionMapping,
) -> Result<SpecifierSet> {
    let group = select_or_group(expr, name)?;
    let mut set = SpecifierSet::new();
    for part in group.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(Error::ParseError(format!(
                "Dangling comma in version expression '{expr}'"
            )));
        }
        set.push(parse_one_specifier(part, name, false, mapping)?);
    }
    Ok(set)
}

/// Pick the representative member of an OR group: the one whose
/// operator-stripped version text is maximal under canonical ordering.
fn select_or_group<'a>(expr: &'a str, name: &str) -> Result<&'a str> {
    let mut best: Option<(&str, CanonicalVersion)> = None;
    for alternative in expr.split('|') {
        let alternative = alternative.trim();
        if alternative.is_empty() {
            return Err(Error::ParseError(format!(
                "Empty alternative in version expression '{expr}'"
            )));
        }
        // Rank by the first version literal of the alternative
        let first = alternative.split(',').next().unwrap_or(alternative);
        let stripped = strip_operator(first).1;
        let stripped = stripped.trim_end_matches('*').trim_end_matches('.');
        let mut scratch = VersionMapping::new();
        let canonical =
            to_canonical_with(stripped, encoding_for(name), &mut scratch);
        let version = CanonicalVersion::parse(&canonical).map_err(|_| {
            Error::ParseError(format!("Invalid version '{first}' in expression '{expr}'"))
        })?;
        match &best {
            Some((_, current)) if *current >= version => {}
            _ => best = Some((alternative, version)),
        }
    }
    best.map(|(alt, _)| alt)
        .ok_or_else(|| Error::ParseError(format!("Empty version expression '{expr}'")))
}

/// Strip a leading comparison operator, returning (operator-text, rest)
fn strip_operator(text: &str) -> (&str, &str) {
    for op in ["~=", "==", "!=", "<=", ">=", "<", ">", "="] {
        if let Some(rest) = text.strip_prefix(op) {
            return (op, rest.trim());
        }
    }
    ("", text.trim())
}

/// Parse one operator+version token into a Specifier. `strict` selects the
/// index dialect, where a bare `=` is not a valid operator.
fn parse_one_specifier(
    token: &str,
    name: &str,
    strict: bool,
    mapping: &mut VersionMapping,
) -> Result<Specifier> {
    let (op_text, version_text) = strip_operator(token);
    if version_text.is_empty() {
        return Err(Error::ParseError(format!("Missing version in specifier '{token}'")));
    }
    if strict && op_text == "=" {
        return Err(Error::ParseError(format!(
            "Invalid operator '=' in specifier '{token}'"
        )));
    }
    if strict && op_text.is_empty() {
        return Err(Error::ParseError(format!(
            "Missing operator in specifier '{token}'"
        )));
    }

    let wildcard = version_text.contains('*');
    let op = match (op_text, wildcard) {
        ("==", true) => Operator::StartsWith,
        ("!=", true) => Operator::NotStartsWith,
        // conda fuzzy operators
        ("=", _) | ("", true) => Operator::StartsWith,
        ("", false) => Operator::Eq,
        ("==", false) => Operator::Eq,
        ("!=", false) => Operator::Ne,
        ("<", _) => Operator::Lt,
        ("<=", _) => Operator::Le,
        (">", _) => Operator::Gt,
        (">=", _) => Operator::Ge,
        ("~=", false) => Operator::Compatible,
        ("~=", true) => {
            return Err(Error::ParseError(format!(
                "Wildcard not allowed with '~=' in '{token}'"
            )));
        }
        _ => {
            return Err(Error::ParseError(format!("Invalid specifier '{token}'")));
        }
    };

    let native = if wildcard {
        let normalized = normalize_wildcard(version_text);
        normalized
            .strip_suffix(".*")
            .unwrap_or(&normalized)
            .to_string()
    } else {
        version_text.to_string()
    };

    let canonical_text = to_canonical_with(&native, encoding_for(name), mapping);
    let version = CanonicalVersion::parse(&canonical_text)?;

    Ok(Specifier {
        op,
        version,
        text: canonical_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(s: &str) -> CanonicalVersion {
        CanonicalVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse_index_requirement() {
        let req = Requirement::parse("numpy>=1.21,<2.0").unwrap();
        assert_eq!(req.name, "numpy");
        assert_eq!(req.ecosystem, Ecosystem::Index);
        assert!(req.specifier.contains(&version("1.26.4")));
        assert!(!req.specifier.contains(&version("2.0.0")));
        assert!(!req.specifier.contains(&version("1.20.0")));
    }

    #[test]
    fn test_parse_index_name_normalization() {
        let req = Requirement::parse("Typing_Extensions>=4.0").unwrap();
        assert_eq!(req.name, "typing-extensions");
    }

    #[test]
    fn test_parse_conda_marker_and_channel() {
        let req = Requirement::parse("conda: conda-forge::libffi>=3.4").unwrap();
        assert_eq!(req.ecosystem, Ecosystem::Conda);
        assert_eq!(req.channel.as_deref(), Some("conda-forge"));
        assert_eq!(req.name, "libffi");
    }

    #[test]
    fn test_parse_conda_space_separated_version() {
        let req = Requirement::parse_conda("numpy 1.21.2").unwrap();
        assert!(req.specifier.contains(&version("1.21.2")));
        assert!(!req.specifier.contains(&version("1.21.3")));
        assert!(req.build_string.is_none());
    }

    #[test]
    fn test_parse_conda_three_tokens_build_string() {
        let req = Requirement::parse_conda("numpy 1.21.2 py39h20f2e39_0").unwrap();
        assert_eq!(req.build_string.as_deref(), Some("py39h20f2e39_0"));
    }

    #[test]
    fn test_parse_conda_two_tokens_operator_build_string() {
        // Second token is a build string because the first carries an operator
        let req = Requirement::parse_conda("numpy>=1.21 py39*").unwrap();
        assert_eq!(req.build_string.as_deref(), Some("py39*"));
        assert!(req.specifier.contains(&version("1.22.0")));
    }

    #[test]
    fn test_parse_conda_fuzzy_equals() {
        let req = Requirement::parse_conda("python=3.9").unwrap();
        assert!(req.specifier.contains(&version("3.9.18")));
        assert!(!req.specifier.contains(&version("3.10.0")));
    }

    #[test]
    fn test_parse_empty_line_fails() {
        assert!(Requirement::parse("").is_err());
        assert!(Requirement::parse("conda:").is_err());
    }

    #[test]
    fn test_or_group_collapses_to_maximum() {
        let req = Requirement::parse_conda("openssl 1.1.1|3.0.*").unwrap();
        assert!(req.specifier.contains(&version("3.0.13")));
        assert!(!req.specifier.contains(&version("1.1.1")));
    }

    #[test]
    fn test_wildcard_matches_with_and_without_trailing_zero() {
        // `1.2.*` resolves identically for a version written `1.2` or `1.2.0`
        let req = Requirement::parse("pkgx==1.2.*").unwrap();
        assert!(req.specifier.contains(&version("1.2")));
        assert!(req.specifier.contains(&version("1.2.0")));
        assert!(req.specifier.contains(&version("1.2.5")));
        assert!(!req.specifier.contains(&version("1.3.0")));
    }

    #[test]
    fn test_wildcard_prefix_zeros_are_significant() {
        let req = Requirement::parse("pkgx==3.0.*").unwrap();
        assert!(req.specifier.contains(&version("3.0.13")));
        assert!(!req.specifier.contains(&version("3.9")));
    }

    #[test]
    fn test_compatible_release() {
        let req = Requirement::parse("requests~=2.28.0").unwrap();
        assert!(req.specifier.contains(&version("2.28.2")));
        assert!(!req.specifier.contains(&version("2.29.0")));
        assert!(!req.specifier.contains(&version("2.27.9")));
    }

    #[test]
    fn test_compatible_release_rewritten_for_solver() {
        let req = Requirement::parse("requests~=2.28.0").unwrap();
        let expr = req.conda_version_expr();
        assert!(expr.contains(">=2.28.0"), "got {expr}");
        assert!(expr.contains("2.28.*"), "got {expr}");
    }

    #[test]
    fn test_translated_version_in_conda_requirement() {
        let req = Requirement::parse_conda("openssl >=1.1.1w").unwrap();
        // In-process comparison uses the canonical form
        assert!(req.specifier.contains(&version("1.1.1.119")));
        assert!(!req.specifier.contains(&version("1.1.1.118")));
        // The solver sees the original native text
        assert_eq!(req.conda_version_expr(), ">=1.1.1w");
    }

    #[test]
    fn test_is_compatible_name_and_specifier() {
        let names = NameMap::identity();
        let broad = Requirement::parse("numpy>=1.20").unwrap();
        let narrow = Requirement::parse("numpy==1.21.2").unwrap();
        assert!(broad.is_compatible(&narrow, &names));
        assert!(!narrow.is_compatible(&broad, &names));
        let other = Requirement::parse("scipy>=1.20").unwrap();
        assert!(!broad.is_compatible(&other, &names));
    }

    #[test]
    fn test_is_compatible_build_strings() {
        let names = NameMap::identity();
        let mut wild = Requirement::parse_conda("numpy==1.21.2").unwrap();
        wild.build_string = Some("py39*".to_string());
        let mut exact = Requirement::parse_conda("numpy==1.21.2").unwrap();
        exact.build_string = Some("py39h20f2e39_0".to_string());
        assert!(wild.is_compatible(&exact, &names));
        assert!(!exact.is_compatible(&wild, &names));
    }

    #[test]
    fn test_build_matches_wildcard_prefix() {
        assert!(build_matches("py39*", "py39h20f2e39_0"));
        assert!(build_matches("*", "anything"));
        assert!(!build_matches("py310*", "py39h20f2e39_0"));
        assert!(build_matches("py39h20f2e39_0", "py39h20f2e39_0"));
    }

    #[test]
    fn test_tighter_upper_bound() {
        let loose = Requirement::parse("pkg<2.0").unwrap();
        let tight = Requirement::parse("pkg<1.5").unwrap();
        let unbounded = Requirement::parse("pkg>=1.0").unwrap();
        assert!(tight.tighter_upper_bound_than(&loose));
        assert!(!loose.tighter_upper_bound_than(&tight));
        assert!(tight.tighter_upper_bound_than(&unbounded));
        assert!(!unbounded.tighter_upper_bound_than(&tight));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut base = Requirement::parse("pkg>=1.0").unwrap();
        let extra = Requirement::parse("pkg<2.0").unwrap();
        base.merge(&extra);
        let once = base.clone();
        base.merge(&extra);
        assert_eq!(base, once);
    }

    #[test]
    fn test_as_conda_line() {
        let names = NameMap::identity();
        let req = Requirement::parse("conda: conda-forge::numpy>=1.21").unwrap();
        assert_eq!(req.as_conda_line(&names), "conda-forge::numpy >=1.21");
    }

    #[test]
    fn test_ecosystem_string_round_trip() {
        assert_eq!(Ecosystem::Conda.to_string(), "conda");
        assert_eq!("index".parse::<Ecosystem>().unwrap(), Ecosystem::Index);
    }
}
