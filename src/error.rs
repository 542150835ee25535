// src/error.rs
//
//! The crate-wide error type and `Result` alias.
//!
//! String-payload variants in the teacher's naming style, built with
//! `thiserror`. `anyhow` is used at the binary/command boundary.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A native version string, solver payload, or other text could not be
    /// parsed into the shape the resolver expects.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Resolution bookkeeping failed in a way that is not a plain
    /// unsatisfiable conflict.
    #[error("resolution error: {0}")]
    ResolutionError(String),

    /// The external batch solver failed or rejected the spec. Carries the
    /// human-readable message plus whatever conflict diagnostics the solver
    /// emitted.
    #[error("solver error: {message}")]
    SolverError {
        message: String,
        diagnostics: Vec<String>,
    },

    /// Downloading the name-mapping table (or another remote resource) failed.
    #[error("download error: {0}")]
    DownloadError(String),

    /// A filesystem or subprocess I/O operation failed.
    #[error("io error: {0}")]
    IoError(String),

    /// Reading, parsing, or serializing configuration failed.
    #[error("config error: {0}")]
    ConfigError(String),

    /// Reading, writing, or validating the lockfile failed.
    #[error("lockfile error: {0}")]
    LockfileError(String),

    /// A requested package, record, or resource was not found.
    #[error("not found: {0}")]
    NotFoundError(String),

    /// The combined requirement set has no solution. Carries the accumulated
    /// human-readable causes.
    #[error("unsatisfiable: {}", causes.join("; "))]
    UnsatisfiableError { causes: Vec<String> },
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ParseError(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
