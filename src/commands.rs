// src/commands.rs
//! Command implementations for the Conflux CLI
//!
//! Everything here is thin glue: load the configuration, build a resolution
//! session, hand the requirement list to the resolver, persist or print the
//! outcome. Resolution logic never lives in this module.

use crate::candidate::Candidate;
use crate::config::{Config, ConfigChange, WatchedConfig, CONFIG_FILE, LOCKFILE_FILE};
use crate::lockfile::Lockfile;
use crate::mapping::{load_name_map, NameMap};
use crate::requirement::Requirement;
use crate::resolver::index::StaticIndex;
use crate::resolver::Resolver;
use crate::solver::{SolverRunner, SubprocessRunner};
use anyhow::{anyhow, Context, Result};
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info};

/// Paths derived from the project directory
struct Project {
    config_path: PathBuf,
    lock_path: PathBuf,
    mapping_cache: PathBuf,
}

impl Project {
    fn at(dir: &str) -> Self {
        let root = PathBuf::from(dir);
        Self {
            config_path: root.join(CONFIG_FILE),
            lock_path: root.join(LOCKFILE_FILE),
            mapping_cache: root.join(".conflux").join("name_mapping.json"),
        }
    }

    fn load_config(&self) -> Result<Config> {
        Config::load(&self.config_path)
            .with_context(|| format!("No project at {}", self.config_path.display()))
    }
}

/// Initialize a project configuration
pub fn cmd_init(project_dir: &str) -> Result<()> {
    let project = Project::at(project_dir);
    if project.config_path.exists() {
        return Err(anyhow!(
            "{} already exists",
            project.config_path.display()
        ));
    }
    Config::default().save(&project.config_path)?;
    println!("Created {}", project.config_path.display());
    Ok(())
}

/// Resolve all project requirements and write the lockfile
pub fn cmd_lock(project_dir: &str, force: bool) -> Result<()> {
    let project = Project::at(project_dir);
    let config = project.load_config()?;
    let requirements = config.parsed_requirements()?;
    let names = load_name_map(&config.mapping_url, &project.mapping_cache);

    if !force {
        if let Ok(existing) = Lockfile::read(&project.lock_path) {
            if existing.content_intact() && lockfile_satisfies(&existing, &requirements, &names) {
                println!("Lockfile is up to date ({} packages)", existing.packages.len());
                return Ok(());
            }
        }
    }

    let lockfile = resolve_to_lockfile(&project, &config, &requirements, &names)?;
    lockfile.write(&project.lock_path)?;
    println!(
        "Locked {} packages into {}",
        lockfile.packages.len(),
        project.lock_path.display()
    );
    Ok(())
}

/// Add a requirement line and re-lock
pub fn cmd_add(project_dir: &str, requirement: &str, no_lock: bool) -> Result<()> {
    let project = Project::at(project_dir);
    let mut watched = WatchedConfig::new(project.load_config()?);

    let needs_relock = Rc::new(Cell::new(false));
    let flag = Rc::clone(&needs_relock);
    watched.subscribe(move |change| {
        if change == ConfigChange::Requirements {
            flag.set(true);
        }
    });

    let mut add_result = Ok(());
    watched.update(|config| add_result = config.add_requirement_line(requirement));
    add_result?;
    watched.get().save(&project.config_path)?;
    println!("Added requirement: {}", requirement.trim());

    if needs_relock.get() && !no_lock {
        cmd_lock(project_dir, true)?;
    }
    Ok(())
}

/// Remove a requirement and re-lock
pub fn cmd_remove(project_dir: &str, name: &str, no_lock: bool) -> Result<()> {
    let project = Project::at(project_dir);
    let mut watched = WatchedConfig::new(project.load_config()?);

    let needs_relock = Rc::new(Cell::new(false));
    let flag = Rc::clone(&needs_relock);
    watched.subscribe(move |change| {
        if change == ConfigChange::Requirements {
            flag.set(true);
        }
    });

    let mut removed = false;
    watched.update(|config| removed = config.remove_requirement(name));
    if !removed {
        return Err(anyhow!("No requirement named '{name}' in the project"));
    }
    watched.get().save(&project.config_path)?;
    println!("Removed requirement: {name}");

    if needs_relock.get() && !no_lock {
        cmd_lock(project_dir, true)?;
    }
    Ok(())
}

/// Re-resolve from scratch, ignoring current pins
pub fn cmd_update(project_dir: &str, names: &[String]) -> Result<()> {
    if !names.is_empty() {
        // The external solver only produces whole-environment solves, so a
        // partial update still re-resolves everything; the names are only
        // reported.
        info!("Updating {} (full re-resolution)", names.join(", "));
    }
    cmd_lock(project_dir, true)
}

/// Print the transaction plan the lockfile implies
pub fn cmd_install(project_dir: &str, dry_run: bool) -> Result<()> {
    let project = Project::at(project_dir);
    let config = project.load_config()?;
    let lockfile = Lockfile::read(&project.lock_path)
        .context("No lockfile; run `conflux lock` first")?;
    lockfile.validate()?;
    if !lockfile.content_intact() {
        return Err(anyhow!("Lockfile content hash mismatch; run `conflux lock`"));
    }

    let (conda, index): (Vec<_>, Vec<_>) =
        lockfile.packages.iter().partition(|p| p.conda_managed);

    if !conda.is_empty() {
        if config.batch_operations {
            println!("Solver transaction ({} packages, one invocation):", conda.len());
        } else {
            println!("Solver transaction ({} packages):", conda.len());
        }
        for entry in &conda {
            println!(
                "  {} {} [{}]",
                entry.name,
                Lockfile::display_version(entry),
                entry.channel.as_deref().unwrap_or("-")
            );
        }
    }
    if !index.is_empty() {
        println!("Index packages ({}):", index.len());
        for entry in &index {
            println!("  {} {}", entry.name, Lockfile::display_version(entry));
        }
    }
    if dry_run {
        println!("Dry run; nothing handed to the installers.");
    }
    Ok(())
}

/// Query the external solver for candidates
pub fn cmd_search(project_dir: &str, requirement: &str) -> Result<()> {
    let project = Project::at(project_dir);
    let config = project.load_config().unwrap_or_default();
    let names = load_name_map(&config.mapping_url, &project.mapping_cache);
    let runner = runner_for(&config);

    let line = requirement.strip_prefix("conda:").unwrap_or(requirement);
    let req = Requirement::parse_conda(line)?;

    let info = runner.info()?;
    let mut channel_index =
        crate::channel::ChannelPriorityIndex::new(&config.channels, &info.platform);
    let mut search = crate::search::SearchService::new();
    let candidates = search.search(&runner, &req, &config.channels, &mut channel_index, &names)?;

    if candidates.is_empty() {
        println!("No candidates for '{requirement}'");
        return Ok(());
    }
    for candidate in candidates {
        println!(
            "{:<24} {:<14} {:<18} {}",
            candidate.name,
            candidate.original_version,
            candidate.build_string.as_deref().unwrap_or("-"),
            candidate.channel
        );
    }
    Ok(())
}

/// Show environment facts reported by the external solver
pub fn cmd_info(project_dir: &str) -> Result<()> {
    let project = Project::at(project_dir);
    let config = project.load_config().unwrap_or_default();
    let runner = runner_for(&config);
    let info = runner.info()?;

    println!("Solver:   {}", config.solver);
    println!("Platform: {}", info.platform);
    println!("Channels: {}", config.channels.join(", "));
    println!("Virtual packages:");
    for vp in &info.virtual_packages {
        match &vp.version {
            Some(version) => println!("  {} {}", vp.name, version),
            None => println!("  {}", vp.name),
        }
    }
    Ok(())
}

fn runner_for(config: &Config) -> SubprocessRunner {
    SubprocessRunner::new(&config.solver)
        .with_timeout(Duration::from_secs(config.solver_timeout_secs))
}

/// Whether every project requirement is satisfied by some lockfile entry
fn lockfile_satisfies(
    lockfile: &Lockfile,
    requirements: &[Requirement],
    names: &NameMap,
) -> bool {
    requirements.iter().all(|req| {
        lockfile.packages.iter().any(|entry| {
            Candidate::from_lockfile_entry(entry)
                .map(|candidate| candidate.satisfies(req, names))
                .unwrap_or(false)
        })
    })
}

/// Run the resolver and turn its mapping into lockfile entries
fn resolve_to_lockfile(
    project: &Project,
    config: &Config,
    requirements: &[Requirement],
    names: &NameMap,
) -> Result<Lockfile> {
    let runner = runner_for(config);
    let platform = runner.info()?.platform;

    // Index-side releases known from the previous lockfile stay available
    // for offline re-locks.
    let mut index = StaticIndex::new();
    if let Ok(previous) = Lockfile::read(&project.lock_path) {
        for entry in previous.packages.iter().filter(|p| !p.conda_managed) {
            if let Ok(candidate) = Candidate::from_lockfile_entry(entry) {
                index.add(candidate);
            }
        }
    }

    let mut resolver = Resolver::new(
        &runner,
        &mut index,
        names,
        config.channels.clone(),
        config.ownership_policy(),
        &platform,
    )
    .with_max_rounds(config.max_rounds);

    let resolution = resolver.resolve(requirements)?;
    debug!("Resolved {} packages in {} rounds", resolution.mapping.len(), resolution.rounds);

    let mut entries = Vec::with_capacity(resolution.mapping.len());
    for identifier in &resolution.pin_order {
        let candidate = &resolution.mapping[identifier];
        let candidate = hydrate_link(candidate, &runner, &config.channels, names)?;
        entries.push(candidate.as_lockfile_entry()?);
    }
    Ok(Lockfile::new(entries))
}

/// Batch-solve records may omit the download link; fetch it from a direct
/// search for the exact build before persisting.
fn hydrate_link(
    candidate: &Candidate,
    runner: &dyn SolverRunner,
    channels: &[String],
    names: &NameMap,
) -> Result<Candidate> {
    if candidate.link.is_some() {
        return Ok(candidate.clone());
    }

    let spec = format!("{}=={}", candidate.name, candidate.original_version);
    let records = runner.search(&spec, channels)?;
    for record in records {
        if let Ok(found) = Candidate::from_raw(record) {
            if found.version == candidate.version
                && found.build_string == candidate.build_string
                && found.link.is_some()
            {
                let mut hydrated = candidate.clone();
                hydrated.link = found.link;
                return Ok(hydrated);
            }
        }
    }
    Err(crate::error::Error::LockfileError(format!(
        "No downloadable build found for {} {}",
        candidate.name,
        candidate.original_version
    ))
    .into())
}
