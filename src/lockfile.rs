// src/lockfile.rs

//! Lockfile persistence
//!
//! The lockfile records every resolved package with enough detail to
//! reconstruct the candidate exactly: canonical version plus the native
//! text side channel, channel and build metadata, content hashes, raw
//! dependency lines, and the externally-managed flag separating
//! system-ecosystem entries from standard index entries. A content hash
//! over the canonicalized entry list detects manual edits.

use crate::candidate::{Candidate, Link};
use crate::error::{Error, Result};
use crate::requirement::{Ecosystem, Requirement};
use crate::version::translator::{to_canonical_with, encoding_for};
use crate::version::{CanonicalVersion, VersionMapping};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Current lockfile format version
pub const LOCKFILE_VERSION: u32 = 1;

/// One resolved package entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedPackage {
    pub name: String,
    /// Canonical version text
    pub version: String,
    /// Native version text, present when it differs from the canonical form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_string: Option<String>,
    #[serde(default)]
    pub build_number: u64,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_python: Option<String>,
    /// Whether this entry was resolved by the system ecosystem
    #[serde(default)]
    pub conda_managed: bool,
}

impl Candidate {
    /// Emit the persisted form of this candidate. A candidate without a
    /// resolved link is a fatal configuration error — there is no such
    /// thing as an unresolved-but-pinned candidate.
    pub fn as_lockfile_entry(&self) -> Result<LockedPackage> {
        let link = self.link.as_ref().ok_or_else(|| {
            Error::LockfileError(format!(
                "Candidate {} {} has no resolved link",
                self.name, self.original_version
            ))
        })?;
        if link.sha256.is_none() && link.md5.is_none() {
            return Err(Error::LockfileError(format!(
                "Candidate {} {} has no content hash",
                self.name, self.original_version
            )));
        }

        let canonical = self.version.to_string();
        Ok(LockedPackage {
            name: self.name.clone(),
            original_version: (self.original_version != canonical)
                .then(|| self.original_version.clone()),
            version: canonical,
            channel: (!self.channel.is_empty()).then(|| self.channel.clone()),
            build_string: self.build_string.clone(),
            build_number: self.build_number,
            url: link.url.clone(),
            sha256: link.sha256.clone(),
            md5: link.md5.clone(),
            dependencies: self.raw_depends.clone(),
            requires_python: self.requires_python.clone(),
            conda_managed: self.ecosystem == Ecosystem::Conda,
        })
    }

    /// Reconstruct a candidate from its persisted form
    pub fn from_lockfile_entry(entry: &LockedPackage) -> Result<Self> {
        let version = CanonicalVersion::parse(&entry.version)?;
        let original_version = entry
            .original_version
            .clone()
            .unwrap_or_else(|| entry.version.clone());

        let mut version_mapping = VersionMapping::new();
        version_mapping.record(&entry.version, &original_version);

        let ecosystem = if entry.conda_managed {
            Ecosystem::Conda
        } else {
            Ecosystem::Index
        };

        let mut dependencies = Vec::new();
        for line in &entry.dependencies {
            let req = match ecosystem {
                Ecosystem::Conda => Requirement::parse_conda(line)?,
                Ecosystem::Index => Requirement::parse_index(line)?,
            };
            dependencies.push(req);
        }

        Ok(Self {
            name: entry.name.clone(),
            ecosystem,
            version,
            original_version,
            link: Some(Link {
                url: entry.url.clone(),
                sha256: entry.sha256.clone(),
                md5: entry.md5.clone(),
            }),
            dependencies,
            raw_depends: entry.dependencies.clone(),
            constrains: HashMap::new(),
            virtual_requirements: Vec::new(),
            requires_python: entry.requires_python.clone(),
            channel: entry.channel.clone().unwrap_or_default(),
            build_string: entry.build_string.clone(),
            build_number: entry.build_number,
            timestamp: None,
            track_feature: None,
            version_mapping,
            requirement: None,
        })
    }
}

/// The whole lockfile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lockfile {
    pub version: u32,
    pub content_hash: String,
    #[serde(rename = "package", default)]
    pub packages: Vec<LockedPackage>,
}

impl Lockfile {
    /// Build a lockfile from entries; entries are sorted for stable output
    pub fn new(mut packages: Vec<LockedPackage>) -> Self {
        packages.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        let content_hash = content_hash(&packages);
        Self {
            version: LOCKFILE_VERSION,
            content_hash,
            packages,
        }
    }

    /// Parse and validate a lockfile from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let lockfile: Lockfile = toml::from_str(content)
            .map_err(|e| Error::LockfileError(format!("Malformed lockfile: {e}")))?;
        if lockfile.version != LOCKFILE_VERSION {
            return Err(Error::LockfileError(format!(
                "Unsupported lockfile version {} (expected {})",
                lockfile.version, LOCKFILE_VERSION
            )));
        }
        Ok(lockfile)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::LockfileError(format!("Cannot read {}: {e}", path.display())))?;
        Self::parse(&content)
    }

    /// Serialize to TOML and write under an exclusive file lock
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::LockfileError(format!("Cannot serialize lockfile: {e}")))?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| Error::IoError(format!("Cannot open {}: {e}", path.display())))?;
        FileExt::lock_exclusive(&file)
            .map_err(|e| Error::IoError(format!("Cannot lock {}: {e}", path.display())))?;

        let result = write_locked(&file, &content);
        FileExt::unlock(&file)
            .map_err(|e| Error::IoError(format!("Cannot unlock {}: {e}", path.display())))?;
        result?;

        info!("Wrote lockfile with {} packages to {}", self.packages.len(), path.display());
        Ok(())
    }

    /// Whether the stored hash still matches the entries
    pub fn content_intact(&self) -> bool {
        self.content_hash == content_hash(&self.packages)
    }

    /// Display version for one entry: native text when recorded
    pub fn display_version(entry: &LockedPackage) -> &str {
        entry.original_version.as_deref().unwrap_or(&entry.version)
    }

    /// Check that each entry's version round-trips through the canonical
    /// grammar; malformed entries fail fast.
    pub fn validate(&self) -> Result<()> {
        for entry in &self.packages {
            CanonicalVersion::parse(&entry.version).map_err(|e| {
                Error::LockfileError(format!("Entry '{}' has a bad version: {e}", entry.name))
            })?;
            if let Some(original) = &entry.original_version {
                let mut scratch = VersionMapping::new();
                let recanonicalized =
                    to_canonical_with(original, encoding_for(&entry.name), &mut scratch);
                if recanonicalized != entry.version {
                    return Err(Error::LockfileError(format!(
                        "Entry '{}': original version '{}' does not map to '{}'",
                        entry.name, original, entry.version
                    )));
                }
            }
        }
        Ok(())
    }
}

fn write_locked(mut file: &fs::File, content: &str) -> Result<()> {
    file.write_all(content.as_bytes())
        .map_err(|e| Error::IoError(format!("Cannot write lockfile: {e}")))?;
    file.flush()
        .map_err(|e| Error::IoError(format!("Cannot flush lockfile: {e}")))?;
    Ok(())
}

/// Stable digest over the canonicalized entry list
fn content_hash(packages: &[LockedPackage]) -> String {
    let mut hasher = Sha256::new();
    for entry in packages {
        hasher.update(entry.name.as_bytes());
        hasher.update(b" ");
        hasher.update(entry.version.as_bytes());
        hasher.update(b" ");
        hasher.update(entry.channel.as_deref().unwrap_or("").as_bytes());
        hasher.update(b" ");
        hasher.update(entry.build_string.as_deref().unwrap_or("").as_bytes());
        hasher.update(b" ");
        hasher.update(entry.sha256.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
