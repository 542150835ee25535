// src/resolver/mod.rs

//! Backtracking resolution state machine
//!
//! The driver runs incremental rounds over per-identifier criteria: pick the
//! identifier with the fewest viable candidates, tentatively pin its best
//! candidate, propagate that candidate's dependencies and soft constraints,
//! and push a state snapshot so a later conflict can backtrack to exactly
//! this point. The system ecosystem only solves whole environments, so every
//! requirement addition first consults the Joint-Resolution Cache, which may
//! re-run one batched solve and hand back the requirements whose candidate
//! sets changed — those are re-injected into their criteria before the
//! original addition proceeds.
//!
//! State transitions:
//! ```text
//! add-to-criteria ──> re-solve trigger ──> (changed reqs re-added)
//!     |
//!     v
//! pin (push snapshot, merge constrains, add dependencies)
//!     |
//!     +── no viable candidate ──> backtrack (pop snapshot, reject build)
//!     |                               |
//!     v                               v
//! terminal-success              terminal-failure (budget or stack empty)
//! ```

pub mod index;
pub mod state;

use crate::cache::{select_candidates, update_conda_resolution, CondaContext, OwnershipPolicy};
use crate::candidate::Candidate;
use crate::channel::ChannelPriorityIndex;
use crate::error::{Error, Result};
use crate::mapping::NameMap;
use crate::requirement::{Ecosystem, Requirement};
use crate::search::SearchService;
use crate::solver::SolverRunner;
use index::PackageIndex;
use state::{candidate_key, Criterion, Frame, RequirementInfo, ResolutionState};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Default backtracking budget
pub const DEFAULT_MAX_ROUNDS: u32 = 500;

/// Ceiling on recursive requirement re-injection
const MAX_INJECTION_DEPTH: u32 = 32;

/// A successful resolution
#[derive(Debug)]
pub struct Resolution {
    /// Identifier → pinned candidate
    pub mapping: HashMap<String, Candidate>,
    /// Pin order, dependencies generally before dependents
    pub pin_order: Vec<String>,
    /// Rounds the driver ran
    pub rounds: u32,
}

/// The dual-ecosystem resolver
pub struct Resolver<'a> {
    runner: &'a dyn SolverRunner,
    package_index: &'a mut dyn PackageIndex,
    names: &'a NameMap,
    channels: Vec<String>,
    policy: OwnershipPolicy,
    channel_index: ChannelPriorityIndex,
    search: SearchService,
    max_rounds: u32,
}

impl<'a> Resolver<'a> {
    pub fn new(
        runner: &'a dyn SolverRunner,
        package_index: &'a mut dyn PackageIndex,
        names: &'a NameMap,
        channels: Vec<String>,
        policy: OwnershipPolicy,
        platform: &str,
    ) -> Self {
        let channel_index = ChannelPriorityIndex::new(&channels, platform);
        Self {
            runner,
            package_index,
            names,
            channels,
            policy,
            channel_index,
            search: SearchService::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Resolve the requirement set into one consistent candidate mapping
    pub fn resolve(&mut self, requirements: &[Requirement]) -> Result<Resolution> {
        let mut state = ResolutionState::default();
        let mut stack: Vec<Frame> = Vec::new();

        // Seed criteria and prime the joint cache
        for req in requirements {
            self.add_requirement(&mut state, req.clone(), None, 0)?;
        }

        for round in 0..self.max_rounds {
            let mut unsatisfied = self.unsatisfied_identifiers(&state);
            if unsatisfied.is_empty() {
                info!(
                    "Resolution complete: {} packages in {} rounds",
                    state.mapping.len(),
                    round
                );
                return Ok(Resolution {
                    mapping: state.mapping,
                    pin_order: state.pin_order,
                    rounds: round,
                });
            }

            // Fewest viable candidates first; name breaks ties for
            // deterministic output
            unsatisfied.sort_by_key(|id| {
                let count = state
                    .criteria
                    .get(id)
                    .map(|c| c.viable_candidates().count())
                    .unwrap_or(0);
                (count, id.clone())
            });
            let identifier = unsatisfied.remove(0);

            match self.attempt_pin(&mut state, &identifier)? {
                Some(frame) => {
                    debug!(
                        "Pinned {} = {} (round {})",
                        identifier,
                        state.mapping[&identifier].original_version,
                        round
                    );
                    stack.push(frame);
                }
                None => {
                    let causes = state
                        .criteria
                        .get(&identifier)
                        .map(|c| c.information.clone())
                        .unwrap_or_default();
                    warn!(
                        "No viable candidate for {}; backtracking ({} states)",
                        identifier,
                        stack.len()
                    );
                    state.backtrack_causes = causes.clone();
                    if !self.backtrack(&mut state, &mut stack, causes) {
                        return Err(unsatisfiable(&state));
                    }
                }
            }
        }

        Err(unsatisfiable(&state))
    }

    /// Identifiers whose criterion is not (or no longer) satisfied by a pin
    fn unsatisfied_identifiers(&self, state: &ResolutionState) -> Vec<String> {
        state
            .criteria
            .iter()
            .filter(|(id, criterion)| match state.mapping.get(*id) {
                None => true,
                Some(pinned) => {
                    !criterion
                        .requirements()
                        .iter()
                        .all(|r| pinned.satisfies(r, self.names))
                        || state
                            .constrains
                            .get(*id)
                            .is_some_and(|c| !pinned.satisfies(c, self.names))
                }
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Find the best acceptable candidate for an identifier and pin it.
    /// Returns the snapshot frame, or None when no candidate is viable.
    fn attempt_pin(
        &mut self,
        state: &mut ResolutionState,
        identifier: &str,
    ) -> Result<Option<Frame>> {
        let candidate = {
            let criterion = state.criteria.get(identifier).ok_or_else(|| {
                Error::ResolutionError(format!("No criterion recorded for '{identifier}'"))
            })?;
            let requirements = criterion.requirements();
            let constraint = state.constrains.get(identifier);
            criterion
                .viable_candidates()
                .find(|c| {
                    requirements.iter().all(|r| c.satisfies(r, self.names))
                        && constraint.is_none_or(|cr| c.satisfies(cr, self.names))
                })
                .cloned()
        };

        let Some(mut candidate) = candidate else {
            return Ok(None);
        };

        // Copy-on-push: the snapshot owns its collections outright, so later
        // mutation of the active state cannot reach it.
        let frame = Frame {
            state: state.clone(),
            pinned: identifier.to_string(),
            candidate: candidate.clone(),
        };

        if let Some(criterion) = state.criteria.get(identifier) {
            for info in &criterion.information {
                candidate.rebind_requirement(&info.requirement);
            }
        }

        if state
            .mapping
            .insert(identifier.to_string(), candidate.clone())
            .is_none()
        {
            state.pin_order.push(identifier.to_string());
        }

        // Owned candidates propagate their soft constraints
        if candidate.ecosystem == Ecosystem::Conda {
            for (conda_name, constraint) in &candidate.constrains {
                self.merge_constraint(state, conda_name, constraint);
            }
        }

        for dep in candidate.dependencies.clone() {
            self.add_requirement(state, dep, Some(identifier.to_string()), 0)?;
        }

        Ok(Some(frame))
    }

    /// Most-restrictive-wins constraint propagation: an incoming constraint
    /// replaces the recorded one only when its upper bound is strictly
    /// tighter under canonical ordering.
    fn merge_constraint(
        &self,
        state: &mut ResolutionState,
        conda_name: &str,
        incoming: &Requirement,
    ) {
        let identifier = self.names.to_index(conda_name);
        match state.constrains.get(&identifier) {
            Some(existing) => {
                if incoming.tighter_upper_bound_than(existing) {
                    debug!("Constraint on {} tightened to {}", identifier, incoming);
                    state.constrains.insert(identifier, incoming.clone());
                }
            }
            None => {
                debug!("Constraint on {} recorded: {}", identifier, incoming);
                state.constrains.insert(identifier, incoming.clone());
            }
        }
    }

    /// Record a requirement against its identifier's criterion, after first
    /// letting the joint cache re-solve and re-inject anything it changed.
    fn add_requirement(
        &mut self,
        state: &mut ResolutionState,
        mut req: Requirement,
        parent: Option<String>,
        depth: u32,
    ) -> Result<()> {
        if depth > MAX_INJECTION_DEPTH {
            return Err(Error::ResolutionError(format!(
                "Requirement re-injection exceeded depth {MAX_INJECTION_DEPTH} (at '{}')",
                req.name
            )));
        }

        let identifier = req.index_name(self.names);

        // A propagated constraint narrows the requirement up front so
        // candidate selection already respects it
        if let Some(constraint) = state.constrains.get(&identifier) {
            req.merge(constraint);
        }

        // Re-solve trigger: the accumulated owned set may invalidate the
        // cached environment; changed requirements are re-added first.
        let changed = self.refresh_cache(state, Some(&req))?;
        for changed_req in changed {
            self.add_requirement(state, changed_req, None, depth + 1)?;
        }

        let prior_ecosystem = state
            .criteria
            .get(&identifier)
            .and_then(Criterion::sole_ecosystem);

        {
            let criterion = state.criteria.entry(identifier.clone()).or_default();
            criterion.information.push(RequirementInfo {
                requirement: req.clone(),
                parent,
            });
        }

        let mut candidates = self.find_candidates(state, &identifier)?;

        // Lazy cross-ecosystem reconciliation: only when the mixed criterion
        // actually conflicts does the prior information get rewritten into
        // the incoming requirement's ecosystem.
        let crossed = prior_ecosystem.is_some_and(|prior| prior != req.ecosystem)
            && !self.policy.excluded.contains(&identifier);
        if candidates.is_empty() && crossed {
            info!(
                "Reconciling criterion '{}' into the {} ecosystem",
                identifier, req.ecosystem
            );
            if let Some(criterion) = state.criteria.get_mut(&identifier) {
                for entry in &mut criterion.information {
                    if entry.requirement.ecosystem != req.ecosystem {
                        entry.requirement =
                            entry.requirement.into_ecosystem(req.ecosystem, self.names);
                    }
                }
            }
            candidates = self.find_candidates(state, &identifier)?;
        }

        if let Some(criterion) = state.criteria.get_mut(&identifier) {
            criterion.candidates = candidates;
        }
        Ok(())
    }

    /// Ask the joint cache to reconcile the accumulated owned requirements,
    /// returning those whose candidate sets changed.
    fn refresh_cache(
        &mut self,
        state: &mut ResolutionState,
        extra: Option<&Requirement>,
    ) -> Result<Vec<Requirement>> {
        let mut accumulated: Vec<Requirement> = state
            .criteria
            .values()
            .flat_map(|c| c.information.iter().map(|i| i.requirement.clone()))
            .collect();
        if let Some(extra) = extra {
            accumulated.push(extra.clone());
        }

        let mut ctx = CondaContext {
            runner: self.runner,
            channels: &self.channels,
            names: self.names,
            policy: &self.policy,
            channel_index: &mut self.channel_index,
            search: &mut self.search,
        };
        update_conda_resolution(&accumulated, &mut state.conda_resolution, &mut ctx)
    }

    /// Candidate set for one identifier from the owning side: the cached
    /// batch solve (with a direct search as fallback) for owned identifiers,
    /// the language index otherwise.
    fn find_candidates(
        &mut self,
        state: &ResolutionState,
        identifier: &str,
    ) -> Result<Vec<Candidate>> {
        let mut requirements: Vec<Requirement> = state
            .criteria
            .get(identifier)
            .map(|c| c.requirements().into_iter().cloned().collect())
            .unwrap_or_default();
        if let Some(constraint) = state.constrains.get(identifier) {
            requirements.push(constraint.clone());
        }
        if requirements.is_empty() {
            return Ok(Vec::new());
        }

        let owned = requirements.iter().any(|r| self.policy.owns(r));
        let refs: Vec<&Requirement> = requirements.iter().collect();

        if owned {
            let conda_name = self.names.to_conda(identifier);
            let found = select_candidates(
                &state.conda_resolution,
                &conda_name,
                &refs,
                self.names,
                &mut self.channel_index,
            );
            if !found.is_empty() {
                return Ok(found);
            }

            // Not part of the cached environment: query the solver directly
            let mut merged = requirements[0].clone();
            for extra in &requirements[1..] {
                merged.merge(extra);
            }
            let merged = merged.into_ecosystem(Ecosystem::Conda, self.names);
            let searched = self.search.search(
                self.runner,
                &merged,
                &self.channels,
                &mut self.channel_index,
                self.names,
            )?;
            Ok(searched
                .into_iter()
                .filter(|c| refs.iter().all(|r| c.satisfies(r, self.names)))
                .collect())
        } else {
            self.package_index.candidates(identifier, &refs)
        }
    }

    /// Pop historical states until one offers an untried candidate for the
    /// identifier it pinned. The rejected build is recorded on the restored
    /// state so it is never retried from there.
    fn backtrack(
        &mut self,
        state: &mut ResolutionState,
        stack: &mut Vec<Frame>,
        causes: Vec<RequirementInfo>,
    ) -> bool {
        while let Some(frame) = stack.pop() {
            let Frame {
                state: mut prior,
                pinned,
                candidate,
            } = frame;
            prior.backtrack_causes = causes.clone();

            if let Some(criterion) = prior.criteria.get_mut(&pinned) {
                criterion.incompatibilities.push(candidate_key(&candidate));
            }

            let has_alternative = prior
                .criteria
                .get(&pinned)
                .map(|criterion| {
                    let requirements = criterion.requirements();
                    let constraint = prior.constrains.get(&pinned);
                    criterion.viable_candidates().any(|c| {
                        requirements.iter().all(|r| c.satisfies(r, self.names))
                            && constraint.is_none_or(|cr| c.satisfies(cr, self.names))
                    })
                })
                .unwrap_or(false);

            debug!(
                "Backtracked past pin of {} ({} alternatives remain)",
                pinned,
                if has_alternative { "some" } else { "no" }
            );
            *state = prior;
            if has_alternative {
                return true;
            }
        }
        false
    }
}

/// Render the terminal-failure error from the accumulated causes
fn unsatisfiable(state: &ResolutionState) -> Error {
    let mut causes: Vec<String> = state
        .backtrack_causes
        .iter()
        .map(|info| info.to_string())
        .collect();
    if causes.is_empty() {
        causes = state
            .criteria
            .values()
            .flat_map(|c| c.information.iter().map(|i| i.to_string()))
            .collect();
        causes.sort();
    }
    Error::UnsatisfiableError { causes }
}
