// src/resolver/state.rs

//! Resolution state snapshots
//!
//! The state machine mutates exactly one active [`ResolutionState`]; every
//! tentative pin first pushes a snapshot onto the history stack. All fields
//! hold owned data, so `clone()` is a genuinely deep copy — a popped
//! historical state can never observe mutations made after it was pushed.

use crate::cache::CondaResolution;
use crate::candidate::Candidate;
use crate::requirement::{Ecosystem, Requirement};
use crate::version::CanonicalVersion;
use std::collections::HashMap;
use std::fmt;

/// One requirement together with the package that introduced it
#[derive(Debug, Clone, PartialEq)]
pub struct RequirementInfo {
    pub requirement: Requirement,
    /// Identifier of the depending package, or None for project-level
    /// requirements
    pub parent: Option<String>,
}

impl fmt::Display for RequirementInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{} (required by {})", self.requirement, parent),
            None => write!(f, "{} (required by the project)", self.requirement),
        }
    }
}

/// Key identifying a rejected candidate build
pub type CandidateKey = (CanonicalVersion, Option<String>, String);

pub fn candidate_key(candidate: &Candidate) -> CandidateKey {
    (
        candidate.version.clone(),
        candidate.build_string.clone(),
        candidate.channel.clone(),
    )
}

/// Aggregated requirement information for one identifier
#[derive(Debug, Clone, Default)]
pub struct Criterion {
    /// Candidates still on the table, best first
    pub candidates: Vec<Candidate>,
    /// Every requirement recorded against this identifier, with parents
    pub information: Vec<RequirementInfo>,
    /// Builds rejected by backtracking
    pub incompatibilities: Vec<CandidateKey>,
}

impl Criterion {
    /// All recorded requirements
    pub fn requirements(&self) -> Vec<&Requirement> {
        self.information.iter().map(|info| &info.requirement).collect()
    }

    /// The single ecosystem all recorded requirements share, if they do
    pub fn sole_ecosystem(&self) -> Option<Ecosystem> {
        let mut iter = self.information.iter().map(|i| i.requirement.ecosystem);
        let first = iter.next()?;
        iter.all(|e| e == first).then_some(first)
    }

    /// Candidates not yet rejected by backtracking
    pub fn viable_candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates
            .iter()
            .filter(|c| !self.incompatibilities.contains(&candidate_key(c)))
    }
}

/// The full mutable state of one resolution attempt
#[derive(Debug, Clone, Default)]
pub struct ResolutionState {
    /// Identifier → pinned candidate
    pub mapping: HashMap<String, Candidate>,
    /// Pin insertion order, for deterministic output
    pub pin_order: Vec<String>,
    /// Identifier → aggregated requirement information
    pub criteria: HashMap<String, Criterion>,
    /// Identifier → most restrictive propagated soft constraint
    pub constrains: HashMap<String, Requirement>,
    /// Snapshot of the last external batch solve
    pub conda_resolution: CondaResolution,
    /// Requirement chains behind the most recent backtrack
    pub backtrack_causes: Vec<RequirementInfo>,
}

/// One historical entry on the state stack: the state as it was before
/// `pinned` was accepted, plus the candidate that was pinned on top of it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub state: ResolutionState,
    pub pinned: String,
    pub candidate: Candidate,
}
