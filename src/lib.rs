// src/lib.rs

//! Conflux
//!
//! Joint dependency resolution across two incompatible package ecosystems:
//! a conda-style channel ecosystem (external batch solver, build strings,
//! channel priorities) and a PyPI-style package index. One backtracking
//! resolution covers both, with all version comparison performed on a
//! single canonical grammar.
//!
//! # Architecture
//!
//! - Canonical versions: every native version string is rewritten into one
//!   strictly-ordered grammar; original text survives in side tables
//! - Joint-Resolution Cache: the external solver only solves whole
//!   environments, so its latest batch solve is cached and incrementally
//!   invalidated as requirements accumulate
//! - Copy-on-push state: the resolver snapshots its full state before each
//!   tentative pin, making backtracking an exact restore

pub mod cache;
pub mod candidate;
pub mod channel;
pub mod cli;
pub mod commands;
pub mod config;
mod error;
pub mod lockfile;
pub mod mapping;
pub mod requirement;
pub mod resolver;
pub mod search;
pub mod solver;
pub mod version;

pub use cache::{update_conda_resolution, CondaResolution, OwnershipPolicy};
pub use candidate::{Candidate, Link, RawRecord};
pub use channel::ChannelPriorityIndex;
pub use config::{Config, ConfigChange, WatchedConfig};
pub use error::{Error, Result};
pub use lockfile::{LockedPackage, Lockfile};
pub use mapping::NameMap;
pub use requirement::{Ecosystem, Requirement, Specifier, SpecifierSet};
pub use resolver::index::{PackageIndex, StaticIndex};
pub use resolver::{Resolution, Resolver};
pub use search::SearchService;
pub use solver::{SolverRunner, SubprocessRunner, VirtualPackage};
pub use version::{CanonicalVersion, VersionMapping};
