// src/solver.rs

//! External system-ecosystem solver invocation
//!
//! The channel ecosystem's solver is a command-line executable driven
//! through sub-actions (`search`, `create --dry-run`, `remove`, `info`) with
//! machine-readable JSON output. It only produces internally-consistent
//! full-environment solves, so `create` always receives the complete owned
//! requirement set via a spec file. Non-zero exits are translated into
//! [`Error::SolverError`] carrying whatever conflict diagnostics the solver
//! reported.
//!
//! The [`SolverRunner`] trait is the seam between the resolution core and
//! the process boundary; tests substitute an in-memory runner.

use crate::candidate::RawRecord;
use crate::error::{Error, Result};
use crate::version::CanonicalVersion;
use serde_json::Value;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Default ceiling for one solver invocation
const SOLVER_TIMEOUT: Duration = Duration::from_secs(600);

/// A virtual platform capability reported by the solver
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualPackage {
    pub name: String,
    pub version: Option<CanonicalVersion>,
    pub build: String,
}

/// Environment facts from the solver's `info` sub-action
#[derive(Debug, Clone, Default)]
pub struct SolverInfo {
    pub platform: String,
    pub virtual_packages: Vec<VirtualPackage>,
}

/// The process boundary to the external solver
pub trait SolverRunner {
    /// Per-identifier candidate listing (`search` sub-action)
    fn search(&self, spec: &str, channels: &[String]) -> Result<Vec<RawRecord>>;

    /// One atomic full-environment solve (`create --dry-run`); `specs` must
    /// be the complete owned requirement set
    fn create(&self, specs: &[String], channels: &[String]) -> Result<Vec<RawRecord>>;

    /// Remove packages from the managed environment
    fn remove(&self, names: &[String]) -> Result<()>;

    /// Environment facts: platform, virtual packages
    fn info(&self) -> Result<SolverInfo>;
}

/// Runs the configured solver executable as a subprocess
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    executable: PathBuf,
    timeout: Duration,
}

impl SubprocessRunner {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: SOLVER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run one sub-action and parse its JSON output. Output is redirected
    /// into temp files so the child never blocks on a full pipe while we
    /// wait on it.
    fn run(&self, args: &[&str]) -> Result<Value> {
        debug!("Invoking solver: {} {}", self.executable.display(), args.join(" "));

        let stdout_file = tempfile::tempfile()
            .map_err(|e| Error::IoError(format!("Failed to create temp file: {e}")))?;
        let stderr_file = tempfile::tempfile()
            .map_err(|e| Error::IoError(format!("Failed to create temp file: {e}")))?;

        let mut child = Command::new(&self.executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file.try_clone().map_err(|e| {
                Error::IoError(format!("Failed to clone temp file handle: {e}"))
            })?))
            .stderr(Stdio::from(stderr_file.try_clone().map_err(|e| {
                Error::IoError(format!("Failed to clone temp file handle: {e}"))
            })?))
            .spawn()
            .map_err(|e| {
                Error::SolverError {
                    message: format!(
                        "Failed to execute solver '{}': {e}",
                        self.executable.display()
                    ),
                    diagnostics: Vec::new(),
                }
            })?;

        let status = match child
            .wait_timeout(self.timeout)
            .map_err(|e| Error::IoError(format!("Failed to wait for solver: {e}")))?
        {
            Some(status) => status,
            None => {
                child.kill().ok();
                child.wait().ok();
                return Err(Error::SolverError {
                    message: format!(
                        "Solver timed out after {} seconds",
                        self.timeout.as_secs()
                    ),
                    diagnostics: Vec::new(),
                });
            }
        };

        let stdout = read_back(stdout_file)?;
        let stderr = read_back(stderr_file)?;

        if !status.success() {
            return Err(translate_failure(&stdout, &stderr, status.code()));
        }

        serde_json::from_str(&stdout)
            .map_err(|e| Error::ParseError(format!("Solver produced invalid JSON: {e}")))
    }
}

/// Rewind a temp file the child wrote to and read it back
fn read_back(mut file: File) -> Result<String> {
    file.rewind()
        .map_err(|e| Error::IoError(format!("Failed to rewind temp file: {e}")))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| Error::IoError(format!("Failed to read solver output: {e}")))?;
    Ok(content)
}

/// Translate a non-zero exit into a solver error, preferring the solver's
/// own JSON conflict report over raw stderr.
fn translate_failure(stdout: &str, stderr: &str, code: Option<i32>) -> Error {
    if let Ok(report) = serde_json::from_str::<Value>(stdout) {
        let message = report
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| report.get("error").and_then(Value::as_str))
            .unwrap_or("Solver reported a failure")
            .to_string();
        let diagnostics = report
            .get("packages")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        return Error::SolverError {
            message,
            diagnostics,
        };
    }
    Error::SolverError {
        message: format!(
            "Solver exited with status {}: {}",
            code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()),
            stderr.trim()
        ),
        diagnostics: Vec::new(),
    }
}

impl SolverRunner for SubprocessRunner {
    fn search(&self, spec: &str, channels: &[String]) -> Result<Vec<RawRecord>> {
        let mut args = vec!["search", "--json", spec];
        for channel in channels {
            args.push("-c");
            args.push(channel);
        }
        if !channels.is_empty() {
            args.push("--override-channels");
        }
        let value = self.run(&args)?;
        parse_search_output(value)
    }

    fn create(&self, specs: &[String], channels: &[String]) -> Result<Vec<RawRecord>> {
        let mut spec_file = tempfile::NamedTempFile::new()
            .map_err(|e| Error::IoError(format!("Failed to create spec file: {e}")))?;
        for spec in specs {
            writeln!(spec_file, "{spec}")
                .map_err(|e| Error::IoError(format!("Failed to write spec file: {e}")))?;
        }
        spec_file
            .flush()
            .map_err(|e| Error::IoError(format!("Failed to flush spec file: {e}")))?;

        let path = spec_file.path().to_string_lossy().into_owned();
        let mut args = vec!["create", "--dry-run", "--json", "--file", path.as_str()];
        for channel in channels {
            args.push("-c");
            args.push(channel);
        }
        if !channels.is_empty() {
            args.push("--override-channels");
        }
        let value = self.run(&args)?;
        parse_create_output(value)
    }

    fn remove(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let mut args = vec!["remove", "--yes", "--json"];
        for name in names {
            args.push(name);
        }
        self.run(&args)?;
        Ok(())
    }

    fn info(&self) -> Result<SolverInfo> {
        let value = self.run(&["info", "--json"])?;
        parse_info_output(value)
    }
}

/// `search --json` returns an object mapping package name → record list
pub fn parse_search_output(value: Value) -> Result<Vec<RawRecord>> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::ParseError("Unexpected search output shape".to_string()))?;

    if object.contains_key("error") {
        // "no packages found" comes back as an error object with exit 0
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for (name, group) in object {
        let items = group.as_array().ok_or_else(|| {
            Error::ParseError(format!("Search results for '{name}' are not a list"))
        })?;
        for item in items {
            records.push(serde_json::from_value::<RawRecord>(item.clone())?);
        }
    }
    Ok(records)
}

/// `create --dry-run --json` reports the environment under actions.LINK
pub fn parse_create_output(value: Value) -> Result<Vec<RawRecord>> {
    let link = value
        .get("actions")
        .and_then(|actions| actions.get("LINK"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            Error::ParseError("Solver create output has no actions.LINK section".to_string())
        })?;

    link.iter()
        .map(|item| serde_json::from_value::<RawRecord>(item.clone()).map_err(Error::from))
        .collect()
}

/// `info --json` carries the platform and the virtual package triples
pub fn parse_info_output(value: Value) -> Result<SolverInfo> {
    let platform = value
        .get("platform")
        .and_then(Value::as_str)
        .unwrap_or("linux-64")
        .to_string();

    let mut virtual_packages = Vec::new();
    if let Some(items) = value.get("virtual_pkgs").and_then(Value::as_array) {
        for item in items {
            let triple = item.as_array().ok_or_else(|| {
                Error::ParseError("Malformed virtual package entry".to_string())
            })?;
            let name = triple
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| Error::ParseError("Virtual package without a name".to_string()))?
                .to_string();
            let version = triple
                .get(1)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty() && *v != "0")
                .and_then(|v| {
                    CanonicalVersion::parse(&crate::version::to_canonical(v)).ok()
                });
            let build = triple
                .get(2)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            virtual_packages.push(VirtualPackage {
                name,
                version,
                build,
            });
        }
    }

    if virtual_packages.is_empty() {
        warn!("Solver reported no virtual packages; capability filtering disabled");
    }

    Ok(SolverInfo {
        platform,
        virtual_packages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_search_output() {
        let value = json!({
            "numpy": [
                {"name": "numpy", "version": "1.21.2", "build": "py39_0",
                 "build_number": 0, "channel": "conda-forge",
                 "depends": ["python >=3.9"], "url": "https://x/numpy.conda"},
                {"name": "numpy", "version": "1.22.0", "build": "py39_0",
                 "build_number": 0, "channel": "conda-forge", "depends": []}
            ]
        });
        let records = parse_search_output(value).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].version, "1.21.2");
    }

    #[test]
    fn test_parse_search_not_found_is_empty() {
        let value = json!({"error": "No match found for: nothere"});
        assert!(parse_search_output(value).unwrap().is_empty());
    }

    #[test]
    fn test_parse_create_output() {
        let value = json!({
            "actions": {
                "LINK": [
                    {"name": "python", "version": "3.9.18", "build": "h0755675_0",
                     "build_number": 0, "channel": "conda-forge"},
                    {"name": "numpy", "version": "1.21.2", "build": "py39_0",
                     "build_number": 0, "channel": "conda-forge"}
                ],
                "FETCH": []
            },
            "success": true
        });
        let records = parse_create_output(value).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name, "numpy");
    }

    #[test]
    fn test_parse_create_output_missing_link_fails() {
        let value = json!({"success": true});
        assert!(parse_create_output(value).is_err());
    }

    #[test]
    fn test_parse_info_output() {
        let value = json!({
            "platform": "linux-64",
            "virtual_pkgs": [
                ["__glibc", "2.35", "0"],
                ["__unix", "0", "0"]
            ]
        });
        let info = parse_info_output(value).unwrap();
        assert_eq!(info.platform, "linux-64");
        assert_eq!(info.virtual_packages.len(), 2);
        assert_eq!(info.virtual_packages[0].name, "__glibc");
        assert!(info.virtual_packages[0].version.is_some());
        assert!(info.virtual_packages[1].version.is_none());
    }

    #[test]
    fn test_translate_failure_prefers_solver_report() {
        let stdout = json!({
            "error": "UnsatisfiableError",
            "message": "The following specifications were found to be incompatible",
            "packages": ["numpy==1.21.2", "scipy>=1.10"]
        })
        .to_string();
        let err = translate_failure(&stdout, "noise", Some(1));
        match err {
            Error::SolverError {
                message,
                diagnostics,
            } => {
                assert!(message.contains("incompatible"));
                assert_eq!(diagnostics.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_translate_failure_falls_back_to_stderr() {
        let err = translate_failure("not json", "boom", Some(2));
        match err {
            Error::SolverError { message, .. } => {
                assert!(message.contains("status 2"));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
