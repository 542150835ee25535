// src/cache.rs

//! Joint-Resolution Cache
//!
//! The external solver cannot resolve packages one at a time — it only
//! produces internally-consistent full-environment solves. This module keeps
//! the most recent batch solve as a per-identifier candidate map, decides
//! which requirements the system ecosystem owns, and re-runs exactly one
//! batched solve (never a partial one) whenever the cached environment no
//! longer satisfies the accumulated owned requirements.

use crate::candidate::Candidate;
use crate::channel::ChannelPriorityIndex;
use crate::error::Result;
use crate::mapping::NameMap;
use crate::requirement::{Ecosystem, Requirement};
use crate::search::{order_candidates, prepare_records, SearchService};
use crate::solver::SolverRunner;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Snapshot type stored in the resolution state: conda name → candidate set
/// from the last external batch solve
pub type CondaResolution = HashMap<String, Vec<Candidate>>;

/// Which requirements the system ecosystem resolves
#[derive(Debug, Clone, Default)]
pub struct OwnershipPolicy {
    /// Treat the system ecosystem as the default manager for standard
    /// requirements too
    pub as_default_manager: bool,
    /// Names never handed to the system ecosystem under the default-manager
    /// policy
    pub excluded: HashSet<String>,
}

impl OwnershipPolicy {
    pub fn owns(&self, req: &Requirement) -> bool {
        match req.ecosystem {
            Ecosystem::Conda => true,
            Ecosystem::Index => {
                req.name == "python"
                    || (self.as_default_manager && !self.excluded.contains(&req.name))
            }
        }
    }
}

/// Everything a batched re-solve needs besides the requirement list
pub struct CondaContext<'a> {
    pub runner: &'a dyn SolverRunner,
    pub channels: &'a [String],
    pub names: &'a NameMap,
    pub policy: &'a OwnershipPolicy,
    pub channel_index: &'a mut ChannelPriorityIndex,
    pub search: &'a mut SearchService,
}

/// Refresh the cached batch solve if any owned requirement is missing from
/// it or incompatible with its cached candidates. Returns the owned
/// requirements whose candidate set changed, so the caller can re-inject
/// them into open criteria.
pub fn update_conda_resolution(
    requirements: &[Requirement],
    resolution: &mut CondaResolution,
    ctx: &mut CondaContext<'_>,
) -> Result<Vec<Requirement>> {
    let owned: Vec<&Requirement> = requirements.iter().filter(|r| ctx.policy.owns(r)).collect();
    if owned.is_empty() {
        return Ok(Vec::new());
    }

    let stale = owned.iter().any(|req| {
        let key = req.conda_name(ctx.names);
        match resolution.get(&key) {
            None => true,
            Some(candidates) => !candidates.iter().any(|c| c.satisfies(req, ctx.names)),
        }
    });
    if !stale {
        debug!("Cached solve still satisfies all {} owned requirements", owned.len());
        return Ok(Vec::new());
    }

    // One atomic solve over the complete owned set — the solver does not
    // support partial environments.
    info!("Running batched solve over {} owned requirements", owned.len());
    let specs: Vec<String> = owned.iter().map(|r| r.as_conda_line(ctx.names)).collect();
    let records = ctx.runner.create(&specs, ctx.channels)?;
    let virtuals = ctx.search.virtual_packages(ctx.runner)?;
    let prepared = prepare_records(records, &virtuals, ctx.channel_index);

    let mut fresh: CondaResolution = HashMap::new();
    for candidate in prepared {
        fresh.entry(candidate.name.clone()).or_default().push(candidate);
    }
    for candidates in fresh.values_mut() {
        order_candidates(candidates, ctx.channel_index);
    }

    let mut changed = Vec::new();
    for req in &owned {
        let key = req.conda_name(ctx.names);
        if !same_entry(resolution.get(&key), fresh.get(&key)) {
            changed.push((*req).clone());
        }
    }

    debug!(
        "Batched solve produced {} identifiers ({} owned requirements changed)",
        fresh.len(),
        changed.len()
    );
    *resolution = fresh;
    Ok(changed)
}

/// Candidates from the cached solve satisfying every requirement, ordered
/// by channel priority then freshness. All compatible entries are returned
/// so backtracking can fall through to later ones.
pub fn select_candidates(
    resolution: &CondaResolution,
    conda_name: &str,
    requirements: &[&Requirement],
    names: &NameMap,
    channel_index: &mut ChannelPriorityIndex,
) -> Vec<Candidate> {
    let mut matching: Vec<Candidate> = resolution
        .get(conda_name)
        .map(|candidates| {
            candidates
                .iter()
                .filter(|c| requirements.iter().all(|r| c.satisfies(r, names)))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    order_candidates(&mut matching, channel_index);
    matching
}

/// Candidate-set equality for change detection: identity of (version,
/// build, channel) triples, order-insensitive.
fn same_entry(old: Option<&Vec<Candidate>>, new: Option<&Vec<Candidate>>) -> bool {
    fn keys(entry: &[Candidate]) -> HashSet<(String, Option<String>, String)> {
        entry
            .iter()
            .map(|c| {
                (
                    c.version.to_string(),
                    c.build_string.clone(),
                    c.channel.clone(),
                )
            })
            .collect()
    }
    match (old, new) {
        (None, None) => true,
        (Some(old), Some(new)) => keys(old) == keys(new),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::RawRecord;
    use crate::error::Error;
    use crate::solver::{SolverInfo, VirtualPackage};
    use std::cell::RefCell;

    /// In-memory runner: `create` serves a fixed environment per call and
    /// counts invocations.
    struct FixedRunner {
        environments: RefCell<Vec<Vec<RawRecord>>>,
        calls: RefCell<u32>,
    }

    impl FixedRunner {
        fn new(environments: Vec<Vec<RawRecord>>) -> Self {
            Self {
                environments: RefCell::new(environments),
                calls: RefCell::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.borrow()
        }
    }

    impl SolverRunner for FixedRunner {
        fn search(&self, _spec: &str, _channels: &[String]) -> Result<Vec<RawRecord>> {
            Ok(Vec::new())
        }

        fn create(&self, _specs: &[String], _channels: &[String]) -> Result<Vec<RawRecord>> {
            *self.calls.borrow_mut() += 1;
            let mut environments = self.environments.borrow_mut();
            if environments.len() > 1 {
                Ok(environments.remove(0))
            } else {
                environments
                    .first()
                    .cloned()
                    .ok_or_else(|| Error::SolverError {
                        message: "no environment".to_string(),
                        diagnostics: Vec::new(),
                    })
            }
        }

        fn remove(&self, _names: &[String]) -> Result<()> {
            Ok(())
        }

        fn info(&self) -> Result<SolverInfo> {
            Ok(SolverInfo {
                platform: "linux-64".to_string(),
                virtual_packages: vec![VirtualPackage {
                    name: "__glibc".to_string(),
                    version: Some(crate::version::CanonicalVersion::parse("2.35").unwrap()),
                    build: "0".to_string(),
                }],
            })
        }
    }

    fn record(name: &str, version: &str) -> RawRecord {
        RawRecord {
            name: name.to_string(),
            version: version.to_string(),
            build: "h0_0".to_string(),
            channel: "conda-forge".to_string(),
            ..Default::default()
        }
    }

    fn context<'a>(
        runner: &'a FixedRunner,
        channels: &'a [String],
        names: &'a NameMap,
        policy: &'a OwnershipPolicy,
        channel_index: &'a mut ChannelPriorityIndex,
        search: &'a mut SearchService,
    ) -> CondaContext<'a> {
        CondaContext {
            runner,
            channels,
            names,
            policy,
            channel_index,
            search,
        }
    }

    #[test]
    fn test_ownership_policy() {
        let mut policy = OwnershipPolicy::default();
        let conda_req = Requirement::parse("conda: libffi").unwrap();
        let index_req = Requirement::parse("requests>=2.0").unwrap();
        let python = Requirement::parse("python>=3.9").unwrap();

        assert!(policy.owns(&conda_req));
        assert!(!policy.owns(&index_req));
        assert!(policy.owns(&python));

        policy.as_default_manager = true;
        assert!(policy.owns(&index_req));
        policy.excluded.insert("requests".to_string());
        assert!(!policy.owns(&index_req));
        // Explicit conda requirements stay owned regardless of exclusion
        policy.excluded.insert("libffi".to_string());
        assert!(policy.owns(&conda_req));
    }

    #[test]
    fn test_update_solves_once_then_serves_from_cache() {
        let runner = FixedRunner::new(vec![vec![record("libffi", "3.4.4")]]);
        let channels = vec!["conda-forge".to_string()];
        let names = NameMap::identity();
        let policy = OwnershipPolicy::default();
        let mut channel_index = ChannelPriorityIndex::new(&channels, "linux-64");
        let mut search = SearchService::new();

        let requirements = vec![Requirement::parse("conda: libffi>=3.4").unwrap()];
        let mut resolution = CondaResolution::new();

        let mut ctx = context(&runner, &channels, &names, &policy, &mut channel_index, &mut search);
        let changed = update_conda_resolution(&requirements, &mut resolution, &mut ctx).unwrap();
        assert_eq!(changed.len(), 1);
        assert!(resolution.contains_key("libffi"));

        // Second update with the same requirements hits the cache
        let mut ctx = context(&runner, &channels, &names, &policy, &mut channel_index, &mut search);
        let changed = update_conda_resolution(&requirements, &mut resolution, &mut ctx).unwrap();
        assert!(changed.is_empty());
        assert_eq!(runner.calls(), 1);
    }

    #[test]
    fn test_incompatible_cached_candidate_triggers_re_solve() {
        let runner = FixedRunner::new(vec![
            vec![record("libffi", "3.3")],
            vec![record("libffi", "3.4.4")],
        ]);
        let channels = vec!["conda-forge".to_string()];
        let names = NameMap::identity();
        let policy = OwnershipPolicy::default();
        let mut channel_index = ChannelPriorityIndex::new(&channels, "linux-64");
        let mut search = SearchService::new();

        let mut resolution = CondaResolution::new();
        let loose = vec![Requirement::parse("conda: libffi>=3.0").unwrap()];
        let mut ctx = context(&runner, &channels, &names, &policy, &mut channel_index, &mut search);
        update_conda_resolution(&loose, &mut resolution, &mut ctx).unwrap();

        // Tighter requirement invalidates the cached 3.3 build
        let tight = vec![Requirement::parse("conda: libffi>=3.4").unwrap()];
        let mut ctx = context(&runner, &channels, &names, &policy, &mut channel_index, &mut search);
        let changed = update_conda_resolution(&tight, &mut resolution, &mut ctx).unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(runner.calls(), 2);
        assert_eq!(resolution["libffi"][0].original_version, "3.4.4");
    }

    #[test]
    fn test_no_owned_requirements_never_solves() {
        let runner = FixedRunner::new(vec![vec![]]);
        let channels = vec!["conda-forge".to_string()];
        let names = NameMap::identity();
        let policy = OwnershipPolicy::default();
        let mut channel_index = ChannelPriorityIndex::new(&channels, "linux-64");
        let mut search = SearchService::new();

        let requirements = vec![Requirement::parse("requests>=2.0").unwrap()];
        let mut resolution = CondaResolution::new();
        let mut ctx = context(&runner, &channels, &names, &policy, &mut channel_index, &mut search);
        let changed = update_conda_resolution(&requirements, &mut resolution, &mut ctx).unwrap();
        assert!(changed.is_empty());
        assert_eq!(runner.calls(), 0);
    }

    #[test]
    fn test_select_candidates_filters_and_orders() {
        let channels = vec!["conda-forge".to_string()];
        let names = NameMap::identity();
        let mut channel_index = ChannelPriorityIndex::new(&channels, "linux-64");

        let mut resolution = CondaResolution::new();
        let candidates: Vec<Candidate> = [("1.0", 0u64), ("1.2", 0), ("2.0", 1)]
            .iter()
            .map(|(v, bn)| {
                let mut rec = record("pkgx", v);
                rec.build_number = *bn;
                Candidate::from_raw(rec).unwrap()
            })
            .collect();
        resolution.insert("pkgx".to_string(), candidates);

        let req = Requirement::parse("conda: pkgx>=1.0").unwrap();
        let selected =
            select_candidates(&resolution, "pkgx", &[&req], &names, &mut channel_index);
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[0].original_version, "2.0");

        let capped = Requirement::parse("conda: pkgx>=1.0,<2.0").unwrap();
        let selected =
            select_candidates(&resolution, "pkgx", &[&capped], &names, &mut channel_index);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].original_version, "1.2");
    }
}
