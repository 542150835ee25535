// src/candidate.rs

//! Resolved package build candidates
//!
//! A candidate is one concrete build of a package as reported by the
//! external solver (or reconstructed from a lockfile entry). Raw solver
//! records carry pseudo-dependencies that never reach the resolver: virtual
//! platform packages (`__glibc`, `__cuda`, ...) are split off for capability
//! filtering, and a `python` dependency is hoisted into `requires_python`.

use crate::error::{Error, Result};
use crate::mapping::NameMap;
use crate::requirement::{build_matches, normalize_name, Ecosystem, Requirement};
use crate::version::translator::{encoding_for, to_canonical_with};
use crate::version::{CanonicalVersion, VersionMapping};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Download/install reference with content hashes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
}

/// Raw package record in the external solver's JSON shape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub build: String,
    #[serde(default)]
    pub build_number: u64,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub subdir: Option<String>,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub constrains: Vec<String>,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Epoch milliseconds, as the solver reports it
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub track_features: Option<String>,
}

/// A resolved package build
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub ecosystem: Ecosystem,
    pub version: CanonicalVersion,
    /// Ecosystem-native version text as the solver reported it
    pub original_version: String,
    pub link: Option<Link>,
    pub dependencies: Vec<Requirement>,
    /// Raw dependency lines, kept verbatim for lockfile round-trips
    pub raw_depends: Vec<String>,
    /// Soft bounds this build imposes on packages it does not require
    pub constrains: HashMap<String, Requirement>,
    /// Platform-capability pseudo-dependencies (`__glibc`, `__cuda`, ...)
    pub virtual_requirements: Vec<Requirement>,
    /// Interpreter constraint hoisted out of the dependency list
    pub requires_python: Option<String>,
    pub channel: String,
    pub build_string: Option<String>,
    pub build_number: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub track_feature: Option<String>,
    pub version_mapping: VersionMapping,
    /// The requirement this candidate was selected for. A later, more
    /// specific requirement may rebind this without changing the version.
    pub requirement: Option<Requirement>,
}

impl Candidate {
    /// Build a candidate from a raw solver record
    pub fn from_raw(record: RawRecord) -> Result<Self> {
        let name = normalize_name(&record.name)?;

        let mut version_mapping = VersionMapping::new();
        let canonical =
            to_canonical_with(&record.version, encoding_for(&name), &mut version_mapping);
        let version = CanonicalVersion::parse(&canonical)?;

        let mut dependencies = Vec::new();
        let mut raw_depends = Vec::new();
        let mut virtual_requirements = Vec::new();
        let mut requires_python = None;

        for line in &record.depends {
            if line.trim_start().starts_with("__") {
                // Virtual packages keep their double-underscore name intact
                let (pseudo_name, rest) = match line.trim().split_once(char::is_whitespace) {
                    Some((n, rest)) => (n, rest.trim()),
                    None => (line.trim(), ""),
                };
                let mut req = if rest.is_empty() {
                    Requirement::any(pseudo_name.trim_start_matches("__"), Ecosystem::Conda)?
                } else {
                    Requirement::parse_conda(&format!(
                        "{} {}",
                        pseudo_name.trim_start_matches("__"),
                        rest
                    ))?
                };
                req.name = format!("__{}", req.name);
                virtual_requirements.push(req);
                continue;
            }

            let req = Requirement::parse_conda(line)?;
            if req.name == "python" {
                let expr = req.conda_version_expr();
                requires_python = Some(if expr.is_empty() { "*".to_string() } else { expr });
                continue;
            }
            raw_depends.push(line.clone());
            dependencies.push(req);
        }

        let mut constrains = HashMap::new();
        for line in &record.constrains {
            let req = Requirement::parse_conda(line)?;
            constrains.insert(req.name.clone(), req);
        }

        let link = record.url.as_ref().map(|url| Link {
            url: url.clone(),
            sha256: record.sha256.clone(),
            md5: record.md5.clone(),
        });

        let timestamp = record
            .timestamp
            .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms));

        Ok(Self {
            name,
            ecosystem: Ecosystem::Conda,
            version,
            original_version: record.version,
            link,
            dependencies,
            raw_depends,
            constrains,
            virtual_requirements,
            requires_python,
            channel: record.channel,
            build_string: if record.build.is_empty() {
                None
            } else {
                Some(record.build)
            },
            build_number: record.build_number,
            timestamp,
            track_feature: record.track_features.filter(|s| !s.is_empty()),
            version_mapping,
            requirement: None,
        })
    }

    /// Build a candidate for a language-index release
    pub fn from_index_release(
        name: &str,
        version: &str,
        requires: &[String],
        link: Option<Link>,
    ) -> Result<Self> {
        let name = crate::requirement::normalize_index_name(name)?;
        let mut version_mapping = VersionMapping::new();
        let canonical = to_canonical_with(version, encoding_for(&name), &mut version_mapping);
        let parsed = CanonicalVersion::parse(&canonical)?;

        let mut dependencies = Vec::new();
        let mut requires_python = None;
        for line in requires {
            let req = Requirement::parse_index(line)?;
            if req.name == "python" {
                requires_python = Some(req.specifier.to_string());
                continue;
            }
            dependencies.push(req);
        }

        Ok(Self {
            name,
            ecosystem: Ecosystem::Index,
            version: parsed,
            original_version: version.to_string(),
            link,
            dependencies,
            raw_depends: requires.to_vec(),
            constrains: HashMap::new(),
            virtual_requirements: Vec::new(),
            requires_python,
            channel: String::new(),
            build_string: None,
            build_number: 0,
            timestamp: None,
            track_feature: None,
            version_mapping,
            requirement: None,
        })
    }

    /// Whether this build satisfies a requirement: mapped-name equality,
    /// version containment, build-string pattern, channel hint.
    pub fn satisfies(&self, req: &Requirement, names: &NameMap) -> bool {
        let wanted = match self.ecosystem {
            Ecosystem::Conda => req.conda_name(names),
            Ecosystem::Index => req.index_name(names),
        };
        if wanted != self.name {
            return false;
        }
        if !req.specifier.contains(&self.version) {
            return false;
        }
        if let Some(pattern) = &req.build_string {
            match &self.build_string {
                Some(build) => {
                    if !build_matches(pattern, build) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some(channel) = &req.channel {
            if !self.channel.is_empty() && &self.channel != channel {
                return false;
            }
        }
        true
    }

    /// Rebind the associated requirement when a more specific one arrives.
    /// The candidate itself (version, build) never changes here.
    pub fn rebind_requirement(&mut self, req: &Requirement) {
        let more_specific = match &self.requirement {
            Some(current) => {
                req.specifier.iter().count() > current.specifier.iter().count()
                    || (current.build_string.is_none() && req.build_string.is_some())
            }
            None => true,
        };
        if more_specific {
            self.requirement = Some(req.clone());
        }
    }

    /// Native version text for display and persistence
    pub fn native_version(&self) -> String {
        self.original_version.clone()
    }

    /// Sort key for equal-version tie-breaking: higher build number first,
    /// then newer timestamp. Never correctness-affecting.
    pub fn freshness_key(&self) -> (u64, i64) {
        (
            self.build_number,
            self.timestamp.map(|t| t.timestamp_millis()).unwrap_or(0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, version: &str, depends: &[&str]) -> RawRecord {
        RawRecord {
            name: name.to_string(),
            version: version.to_string(),
            build: "py39h1234_0".to_string(),
            build_number: 0,
            channel: "conda-forge".to_string(),
            depends: depends.iter().map(|s| s.to_string()).collect(),
            url: Some(format!(
                "https://conda.anaconda.org/conda-forge/linux-64/{name}-{version}.conda"
            )),
            sha256: Some("0123abcd".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_raw_basic_fields() {
        let cand = Candidate::from_raw(raw("numpy", "1.21.2", &["libblas >=3.8"])).unwrap();
        assert_eq!(cand.name, "numpy");
        assert_eq!(cand.original_version, "1.21.2");
        assert_eq!(cand.version, CanonicalVersion::parse("1.21.2").unwrap());
        assert_eq!(cand.build_string.as_deref(), Some("py39h1234_0"));
        assert_eq!(cand.dependencies.len(), 1);
        assert_eq!(cand.dependencies[0].name, "libblas");
    }

    #[test]
    fn test_from_raw_strips_virtual_packages() {
        let cand = Candidate::from_raw(raw(
            "tensorflow",
            "2.12.0",
            &["__cuda >=11.2", "__glibc >=2.17", "absl-py >=1.0"],
        ))
        .unwrap();
        assert_eq!(cand.dependencies.len(), 1);
        assert_eq!(cand.dependencies[0].name, "absl-py");
        assert_eq!(cand.virtual_requirements.len(), 2);
        assert_eq!(cand.virtual_requirements[0].name, "__cuda");
    }

    #[test]
    fn test_from_raw_hoists_python_dependency() {
        let cand =
            Candidate::from_raw(raw("numpy", "1.21.2", &["python >=3.8,<3.12", "libblas"]))
                .unwrap();
        assert_eq!(cand.requires_python.as_deref(), Some(">=3.8,<3.12"));
        assert_eq!(cand.dependencies.len(), 1);
        assert!(cand.dependencies.iter().all(|d| d.name != "python"));
    }

    #[test]
    fn test_from_raw_translates_letter_suffix() {
        let cand = Candidate::from_raw(raw("openssl", "1.1.1w", &[])).unwrap();
        assert_eq!(cand.version, CanonicalVersion::parse("1.1.1.119").unwrap());
        assert_eq!(cand.original_version, "1.1.1w");
        // Mapping restores the native text
        assert_eq!(
            crate::version::to_native("1.1.1.119", &cand.version_mapping),
            "1.1.1w"
        );
    }

    #[test]
    fn test_satisfies_version_and_build() {
        let names = NameMap::identity();
        let cand = Candidate::from_raw(raw("numpy", "1.21.2", &[])).unwrap();

        let req = Requirement::parse("numpy>=1.21").unwrap();
        assert!(cand.satisfies(&req, &names));

        let req = Requirement::parse("numpy>=1.22").unwrap();
        assert!(!cand.satisfies(&req, &names));

        let mut req = Requirement::parse_conda("numpy==1.21.2").unwrap();
        req.build_string = Some("py39*".to_string());
        assert!(cand.satisfies(&req, &names));
        req.build_string = Some("py310*".to_string());
        assert!(!cand.satisfies(&req, &names));
    }

    #[test]
    fn test_satisfies_exact_pin() {
        let names = NameMap::identity();
        let cand = Candidate::from_raw(raw("numpy", "1.21.2", &[])).unwrap();
        let pin = Requirement::parse("numpy==1.21.2").unwrap();
        assert!(cand.satisfies(&pin, &names));
    }

    #[test]
    fn test_satisfies_channel_hint() {
        let names = NameMap::identity();
        let cand = Candidate::from_raw(raw("numpy", "1.21.2", &[])).unwrap();
        let mut req = Requirement::parse_conda("numpy").unwrap();
        req.channel = Some("conda-forge".to_string());
        assert!(cand.satisfies(&req, &names));
        req.channel = Some("bioconda".to_string());
        assert!(!cand.satisfies(&req, &names));
    }

    #[test]
    fn test_rebind_requirement_prefers_more_specific() {
        let mut cand = Candidate::from_raw(raw("numpy", "1.21.2", &[])).unwrap();
        let loose = Requirement::parse("numpy>=1.0").unwrap();
        let tight = Requirement::parse("numpy>=1.0,<2.0").unwrap();

        cand.rebind_requirement(&loose);
        assert_eq!(cand.requirement.as_ref().unwrap(), &loose);
        cand.rebind_requirement(&tight);
        assert_eq!(cand.requirement.as_ref().unwrap(), &tight);
        // A looser requirement does not displace the bound one
        cand.rebind_requirement(&loose);
        assert_eq!(cand.requirement.as_ref().unwrap(), &tight);
    }

    #[test]
    fn test_freshness_key_ordering() {
        let mut a = Candidate::from_raw(raw("numpy", "1.21.2", &[])).unwrap();
        let mut b = a.clone();
        a.build_number = 1;
        b.build_number = 3;
        assert!(b.freshness_key() > a.freshness_key());
    }
}
