// src/config.rs

//! Project configuration
//!
//! Loaded from `conflux.toml` at the project root. Components that derive
//! state from the configuration (memoized searches, the channel index)
//! subscribe to an explicit change notification instead of the
//! configuration patching their behavior behind their backs.

use crate::cache::OwnershipPolicy;
use crate::error::{Error, Result};
use crate::requirement::Requirement;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Default configuration file name
pub const CONFIG_FILE: &str = "conflux.toml";

/// Default lockfile name
pub const LOCKFILE_FILE: &str = "conflux.lock";

fn default_solver() -> String {
    "conda".to_string()
}

fn default_channels() -> Vec<String> {
    vec!["conda-forge".to_string()]
}

fn default_mapping_url() -> String {
    "https://raw.githubusercontent.com/regro/cf-graph-countyfair/master/mappings/pypi/name_mapping.json"
        .to_string()
}

fn default_solver_timeout() -> u64 {
    600
}

fn default_max_rounds() -> u32 {
    crate::resolver::DEFAULT_MAX_ROUNDS
}

/// Project configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// External solver executable
    #[serde(default = "default_solver")]
    pub solver: String,
    /// Channel list, in priority order
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
    /// Let the system ecosystem own standard requirements too
    #[serde(default)]
    pub as_default_manager: bool,
    /// Names never handed to the system ecosystem
    #[serde(default)]
    pub excluded: Vec<String>,
    /// Project requirement lines (both dialects)
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Name-mapping table source
    #[serde(default = "default_mapping_url")]
    pub mapping_url: String,
    /// Batch install/uninstall operations to reduce solver invocations
    #[serde(default)]
    pub batch_operations: bool,
    #[serde(default = "default_solver_timeout")]
    pub solver_timeout_secs: u64,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            solver: default_solver(),
            channels: default_channels(),
            as_default_manager: false,
            excluded: Vec::new(),
            requirements: Vec::new(),
            mapping_url: default_mapping_url(),
            batch_operations: false,
            solver_timeout_secs: default_solver_timeout(),
            max_rounds: default_max_rounds(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Cannot read {}: {e}", path.display())))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Malformed {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Cannot serialize config: {e}")))?;
        fs::write(path, content)
            .map_err(|e| Error::IoError(format!("Cannot write {}: {e}", path.display())))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(Error::ConfigError("No channels configured".to_string()));
        }
        for line in &self.requirements {
            Requirement::parse(line)?;
        }
        Ok(())
    }

    /// Parsed project requirements; a malformed line fails fast
    pub fn parsed_requirements(&self) -> Result<Vec<Requirement>> {
        self.requirements.iter().map(|l| Requirement::parse(l)).collect()
    }

    pub fn ownership_policy(&self) -> OwnershipPolicy {
        OwnershipPolicy {
            as_default_manager: self.as_default_manager,
            excluded: self.excluded.iter().cloned().collect(),
        }
    }

    /// Add a requirement line, replacing any line for the same name
    pub fn add_requirement_line(&mut self, line: &str) -> Result<()> {
        let incoming = Requirement::parse(line)?;
        self.requirements.retain(|existing| {
            Requirement::parse(existing)
                .map(|r| r.name != incoming.name || r.ecosystem != incoming.ecosystem)
                .unwrap_or(true)
        });
        self.requirements.push(line.trim().to_string());
        Ok(())
    }

    /// Remove every requirement line for a name; reports whether any matched
    pub fn remove_requirement(&mut self, name: &str) -> bool {
        let before = self.requirements.len();
        self.requirements.retain(|existing| {
            Requirement::parse(existing)
                .map(|r| r.name != name)
                .unwrap_or(true)
        });
        self.requirements.len() != before
    }
}

/// What changed in the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChange {
    Channels,
    Requirements,
    Policy,
    Solver,
}

/// Configuration with an explicit change-notification interface
pub struct WatchedConfig {
    config: Config,
    subscribers: Vec<Box<dyn FnMut(ConfigChange)>>,
}

impl std::fmt::Debug for WatchedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchedConfig")
            .field("config", &self.config)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl WatchedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            subscribers: Vec::new(),
        }
    }

    pub fn get(&self) -> &Config {
        &self.config
    }

    /// Register for change notifications
    pub fn subscribe(&mut self, subscriber: impl FnMut(ConfigChange) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Apply a mutation and notify subscribers about what changed
    pub fn update(&mut self, mutate: impl FnOnce(&mut Config)) {
        let before = self.config.clone();
        mutate(&mut self.config);

        let mut changes = Vec::new();
        if before.channels != self.config.channels {
            changes.push(ConfigChange::Channels);
        }
        if before.requirements != self.config.requirements {
            changes.push(ConfigChange::Requirements);
        }
        if before.as_default_manager != self.config.as_default_manager
            || before.excluded != self.config.excluded
        {
            changes.push(ConfigChange::Policy);
        }
        if before.solver != self.config.solver
            || before.solver_timeout_secs != self.config.solver_timeout_secs
        {
            changes.push(ConfigChange::Solver);
        }

        for change in changes {
            debug!("Config changed: {:?}", change);
            for subscriber in &mut self.subscribers {
                subscriber(change);
            }
        }
    }
}
