// src/cli.rs
//! CLI definitions for Conflux
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "conflux")]
#[command(author = "Conflux Project")]
#[command(version)]
#[command(about = "Joint dependency resolver across conda channels and a Python package index", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Project directory (where conflux.toml lives)
    #[arg(short, long, default_value = ".", global = true)]
    pub project: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a project configuration
    Init,

    /// Resolve all project requirements and write the lockfile
    Lock {
        /// Re-resolve even when the lockfile is up to date
        #[arg(long)]
        force: bool,
    },

    /// Add a requirement and re-lock
    Add {
        /// Requirement line (prefix with "conda:" for the channel ecosystem)
        requirement: String,

        /// Do not re-resolve after editing the configuration
        #[arg(long)]
        no_lock: bool,
    },

    /// Remove a requirement and re-lock
    Remove {
        /// Package name to remove
        name: String,

        /// Do not re-resolve after editing the configuration
        #[arg(long)]
        no_lock: bool,
    },

    /// Re-resolve ignoring the current lockfile pins
    Update {
        /// Only update these packages
        names: Vec<String>,
    },

    /// Show the transaction plan the lockfile implies
    Install {
        /// Show what would be installed without invoking the solver
        #[arg(long)]
        dry_run: bool,
    },

    /// Query the external solver for candidates
    Search {
        /// Requirement to search for
        requirement: String,
    },

    /// Show environment facts reported by the external solver
    Info,
}
