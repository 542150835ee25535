// src/resolver/index.rs

//! Candidate acquisition seam for the language-ecosystem index
//!
//! Identifiers the system ecosystem does not own get their candidates from
//! a [`PackageIndex`] implementation. The live index client is an external
//! collaborator; the in-tree [`StaticIndex`] serves pre-loaded releases
//! (offline re-locks, tests).

use crate::candidate::Candidate;
use crate::error::Result;
use crate::requirement::Requirement;
use std::collections::HashMap;

/// Source of language-index candidates for one identifier
pub trait PackageIndex {
    /// All known candidates for `name` satisfying every requirement,
    /// best (highest version) first.
    fn candidates(&mut self, name: &str, requirements: &[&Requirement]) -> Result<Vec<Candidate>>;
}

/// An in-memory index of pre-loaded releases
#[derive(Debug, Default)]
pub struct StaticIndex {
    packages: HashMap<String, Vec<Candidate>>,
}

impl StaticIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, candidate: Candidate) {
        self.packages
            .entry(candidate.name.clone())
            .or_default()
            .push(candidate);
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl PackageIndex for StaticIndex {
    fn candidates(&mut self, name: &str, requirements: &[&Requirement]) -> Result<Vec<Candidate>> {
        let names = crate::mapping::NameMap::identity();
        let mut matching: Vec<Candidate> = self
            .packages
            .get(name)
            .map(|known| {
                known
                    .iter()
                    .filter(|c| requirements.iter().all(|r| c.satisfies(r, &names)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matching.sort_by(|a, b| {
            b.version
                .cmp(&a.version)
                .then_with(|| b.freshness_key().cmp(&a.freshness_key()))
        });
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(name: &str, version: &str) -> Candidate {
        Candidate::from_index_release(name, version, &[], None).unwrap()
    }

    #[test]
    fn test_static_index_filters_and_orders() {
        let mut index = StaticIndex::new();
        index.add(release("requests", "2.28.0"));
        index.add(release("requests", "2.31.0"));
        index.add(release("requests", "2.25.1"));

        let req = Requirement::parse("requests>=2.26").unwrap();
        let found = index.candidates("requests", &[&req]).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].original_version, "2.31.0");
        assert_eq!(found[1].original_version, "2.28.0");
    }

    #[test]
    fn test_static_index_unknown_name_is_empty() {
        let mut index = StaticIndex::new();
        let req = Requirement::parse("missing").unwrap();
        assert!(index.candidates("missing", &[&req]).unwrap().is_empty());
    }
}
