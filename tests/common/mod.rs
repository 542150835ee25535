// tests/common/mod.rs
//! Shared fixtures for integration tests: an in-memory solver runner and
//! record builders.

use conflux::solver::SolverInfo;
use conflux::{
    Candidate, Error, NameMap, RawRecord, Requirement, Result as ConfluxResult, SolverRunner,
    VirtualPackage,
};
use std::cell::RefCell;
use std::collections::HashMap;

/// Build a raw solver record with a resolvable link
pub fn record(name: &str, version: &str, depends: &[&str]) -> RawRecord {
    RawRecord {
        name: name.to_string(),
        version: version.to_string(),
        build: "h0000000_0".to_string(),
        build_number: 0,
        channel: "conda-forge".to_string(),
        depends: depends.iter().map(|s| s.to_string()).collect(),
        url: Some(format!(
            "https://conda.anaconda.org/conda-forge/linux-64/{name}-{version}-h0000000_0.conda"
        )),
        sha256: Some(format!("sha-of-{name}-{version}")),
        ..Default::default()
    }
}

/// In-memory stand-in for the external solver executable.
///
/// `create` performs a small greedy whole-environment solve over the fixed
/// repodata (constraints accumulate per name), which is consistent enough
/// for the scenarios here. Names listed in `conflicts` make every batch
/// solve fail with a diagnostics-carrying error.
pub struct StubSolver {
    repodata: HashMap<String, Vec<RawRecord>>,
    conflicts: Vec<String>,
    create_calls: RefCell<u32>,
    search_calls: RefCell<u32>,
}

impl StubSolver {
    pub fn new() -> Self {
        Self {
            repodata: HashMap::new(),
            conflicts: Vec::new(),
            create_calls: RefCell::new(0),
            search_calls: RefCell::new(0),
        }
    }

    pub fn add(&mut self, rec: RawRecord) {
        self.repodata.entry(rec.name.clone()).or_default().push(rec);
    }

    pub fn fail_on(&mut self, name: &str) {
        self.conflicts.push(name.to_string());
    }

    pub fn create_calls(&self) -> u32 {
        *self.create_calls.borrow()
    }

    pub fn search_calls(&self) -> u32 {
        *self.search_calls.borrow()
    }

    fn best(&self, name: &str, expr: &str) -> Option<RawRecord> {
        let line = if expr.is_empty() {
            name.to_string()
        } else {
            format!("{name} {expr}")
        };
        let req = Requirement::parse_conda(&line).ok()?;
        let names = NameMap::identity();
        let mut matching: Vec<(Candidate, RawRecord)> = self
            .repodata
            .get(name)?
            .iter()
            .filter_map(|rec| {
                let cand = Candidate::from_raw(rec.clone()).ok()?;
                cand.satisfies(&req, &names).then_some((cand, rec.clone()))
            })
            .collect();
        matching.sort_by(|a, b| b.0.version.cmp(&a.0.version));
        matching.into_iter().next().map(|(_, rec)| rec)
    }
}

impl SolverRunner for StubSolver {
    fn search(&self, spec: &str, _channels: &[String]) -> ConfluxResult<Vec<RawRecord>> {
        *self.search_calls.borrow_mut() += 1;
        let name = spec
            .find(|c: char| "<>=!~ ".contains(c))
            .map(|pos| &spec[..pos])
            .unwrap_or(spec);
        Ok(self.repodata.get(name).cloned().unwrap_or_default())
    }

    fn create(&self, specs: &[String], _channels: &[String]) -> ConfluxResult<Vec<RawRecord>> {
        *self.create_calls.borrow_mut() += 1;

        for conflict in &self.conflicts {
            if specs.iter().any(|s| s.contains(conflict.as_str())) {
                return Err(Error::SolverError {
                    message: "The following specifications were found to be incompatible"
                        .to_string(),
                    diagnostics: specs.to_vec(),
                });
            }
        }

        let mut env: HashMap<String, RawRecord> = HashMap::new();
        let mut exprs: HashMap<String, Vec<String>> = HashMap::new();
        let mut queue: Vec<String> = specs.to_vec();
        while let Some(line) = queue.pop() {
            let line = line.split("::").last().unwrap_or(&line).to_string();
            let (name, expr) = match line.split_once(' ') {
                Some((n, e)) => (n.to_string(), e.to_string()),
                None => (line.clone(), String::new()),
            };
            let entry = exprs.entry(name.clone()).or_default();
            if !expr.is_empty() {
                entry.push(expr);
            }
            let combined = entry.join(",");
            let rec = self.best(&name, &combined).ok_or_else(|| Error::SolverError {
                message: format!("nothing provides {line}"),
                diagnostics: vec![line.clone()],
            })?;
            let previous = env.insert(name, rec.clone());
            if previous.map_or(true, |p| p.version != rec.version) {
                for dep in &rec.depends {
                    if !dep.starts_with("__") {
                        queue.push(dep.clone());
                    }
                }
            }
        }
        Ok(env.into_values().collect())
    }

    fn remove(&self, _names: &[String]) -> ConfluxResult<()> {
        Ok(())
    }

    fn info(&self) -> ConfluxResult<SolverInfo> {
        Ok(SolverInfo {
            platform: "linux-64".to_string(),
            virtual_packages: vec![
                VirtualPackage {
                    name: "__glibc".to_string(),
                    version: Some(conflux::CanonicalVersion::parse("2.35").unwrap()),
                    build: "0".to_string(),
                },
                VirtualPackage {
                    name: "__unix".to_string(),
                    version: None,
                    build: "0".to_string(),
                },
            ],
        })
    }
}
