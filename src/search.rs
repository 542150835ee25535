// src/search.rs

//! Memoized candidate search against the external solver
//!
//! One external query is issued per identifier; results are memoized per
//! (requirement text, channel tuple) for the lifetime of the resolution
//! session, deduplicated, capability-filtered against the platform's
//! virtual packages, and ordered deterministically.

use crate::candidate::{Candidate, RawRecord};
use crate::channel::ChannelPriorityIndex;
use crate::error::Result;
use crate::mapping::NameMap;
use crate::requirement::Requirement;
use crate::solver::{SolverRunner, VirtualPackage};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Session-owned search cache
#[derive(Debug, Default)]
pub struct SearchService {
    memo: HashMap<(String, Vec<String>), Vec<Candidate>>,
    virtual_packages: Option<Vec<VirtualPackage>>,
}

impl SearchService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all memoized results (configuration changed)
    pub fn invalidate(&mut self) {
        self.memo.clear();
        self.virtual_packages = None;
    }

    /// The platform's virtual packages, fetched once per session
    pub fn virtual_packages(&mut self, runner: &dyn SolverRunner) -> Result<Vec<VirtualPackage>> {
        if self.virtual_packages.is_none() {
            let info = runner.info()?;
            debug!(
                "Cached {} virtual packages for platform {}",
                info.virtual_packages.len(),
                info.platform
            );
            self.virtual_packages = Some(info.virtual_packages);
        }
        Ok(self.virtual_packages.clone().unwrap_or_default())
    }

    /// Query candidates for one requirement, memoized
    pub fn search(
        &mut self,
        runner: &dyn SolverRunner,
        req: &Requirement,
        channels: &[String],
        channel_index: &mut ChannelPriorityIndex,
        names: &NameMap,
    ) -> Result<Vec<Candidate>> {
        let key = (req.as_conda_line(names), channels.to_vec());
        if let Some(hit) = self.memo.get(&key) {
            return Ok(hit.clone());
        }

        let spec = search_spec(req, names);
        debug!("Searching solver for '{}'", spec);
        let records = runner.search(&spec, channels)?;
        let virtuals = self.virtual_packages(runner)?;

        let mut candidates = prepare_records(records, &virtuals, channel_index);
        order_candidates(&mut candidates, channel_index);

        self.memo.insert(key, candidates.clone());
        Ok(candidates)
    }
}

/// The match-spec text handed to the solver's search sub-action
fn search_spec(req: &Requirement, names: &NameMap) -> String {
    let expr = req.conda_version_expr();
    if expr.is_empty() {
        req.conda_name(names)
    } else {
        format!("{}{}", req.conda_name(names), expr)
    }
}

/// Convert raw solver records into candidates: drop records whose platform
/// capabilities the environment cannot satisfy, deduplicate, and normalize
/// channel provenance to the configured channel names.
pub fn prepare_records(
    records: Vec<RawRecord>,
    virtuals: &[VirtualPackage],
    channel_index: &ChannelPriorityIndex,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = Vec::with_capacity(records.len());

    for record in records {
        let mut candidate = match Candidate::from_raw(record) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!("Skipping malformed solver record: {}", e);
                continue;
            }
        };

        // Missing platform capability: filtered silently, never an error
        if !virtuals_satisfied(&candidate, virtuals) {
            debug!(
                "Filtering {}-{}: unsatisfied virtual packages",
                candidate.name, candidate.original_version
            );
            continue;
        }

        if let Some(configured) = channel_index.configured_name(&candidate.channel) {
            candidate.channel = configured;
        }

        let duplicate = candidates.iter().any(|existing| {
            existing.name == candidate.name
                && existing.version == candidate.version
                && existing.build_string == candidate.build_string
                && existing.channel == candidate.channel
        });
        if !duplicate {
            candidates.push(candidate);
        }
    }

    candidates
}

/// Whether every virtual-package requirement of a candidate is satisfiable
/// by the environment's virtual package set
pub fn virtuals_satisfied(candidate: &Candidate, virtuals: &[VirtualPackage]) -> bool {
    candidate.virtual_requirements.iter().all(|req| {
        virtuals.iter().any(|vp| {
            if vp.name != req.name {
                return false;
            }
            if req.specifier.is_empty() {
                return true;
            }
            match &vp.version {
                Some(version) => req.specifier.contains(version),
                None => false,
            }
        })
    })
}

/// Deterministic candidate preference: channel priority, then version
/// descending, then build number and timestamp descending.
pub fn order_candidates(candidates: &mut [Candidate], channel_index: &mut ChannelPriorityIndex) {
    let priorities: HashMap<String, i32> = candidates
        .iter()
        .map(|c| c.channel.clone())
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .map(|channel| {
            let priority = channel_index.priority(&channel);
            (channel, priority)
        })
        .collect();

    candidates.sort_by(|a, b| {
        let pa = priorities.get(&a.channel).copied().unwrap_or(i32::MAX);
        let pb = priorities.get(&b.channel).copied().unwrap_or(i32::MAX);
        pa.cmp(&pb)
            .then_with(|| b.version.cmp(&a.version))
            .then_with(|| b.freshness_key().cmp(&a.freshness_key()))
    });
}
