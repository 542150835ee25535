// src/mapping.rs

//! Bidirectional package-name mapping between the two ecosystems
//!
//! Some packages are published under different names in the channel
//! ecosystem and the index (pytorch/torch, tables/pytables). A periodically
//! refreshed table resolves those; every name without an entry falls back to
//! the identity mapping, lowercased.

use crate::error::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for the table download (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for a failed download
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// How long a cached table stays fresh, in hours
pub const TABLE_TTL_HOURS: i64 = 24;

/// Bidirectional name table with identity fallback
#[derive(Debug, Clone, Default)]
pub struct NameMap {
    conda_to_index: HashMap<String, String>,
    index_to_conda: HashMap<String, String>,
}

impl NameMap {
    /// The empty table: every lookup falls through to identity
    pub fn identity() -> Self {
        Self::default()
    }

    /// Build a table from conda-name → index-name pairs
    pub fn from_entries(entries: HashMap<String, String>) -> Self {
        let mut map = Self::default();
        for (conda, index) in entries {
            map.insert(&conda, &index);
        }
        map
    }

    pub fn insert(&mut self, conda_name: &str, index_name: &str) {
        let conda = conda_name.to_ascii_lowercase();
        let index = index_name.to_ascii_lowercase();
        self.conda_to_index.insert(conda.clone(), index.clone());
        self.index_to_conda.insert(index, conda);
    }

    /// Translate an index name into its conda name
    pub fn to_conda(&self, index_name: &str) -> String {
        let key = index_name.to_ascii_lowercase();
        self.index_to_conda.get(&key).cloned().unwrap_or(key)
    }

    /// Translate a conda name into its index name. The identity fallback
    /// folds underscores into dashes, matching index name equivalence.
    pub fn to_index(&self, conda_name: &str) -> String {
        let key = conda_name.to_ascii_lowercase();
        self.conda_to_index
            .get(&key)
            .cloned()
            .unwrap_or_else(|| key.replace('_', "-"))
    }

    pub fn len(&self) -> usize {
        self.conda_to_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conda_to_index.is_empty()
    }
}

/// Load the name table: serve the on-disk cache while it is fresh, otherwise
/// download and rewrite it. Every failure path degrades gracefully — a stale
/// cache is better than no table, and no table means identity mapping.
pub fn load_name_map(url: &str, cache_path: &Path) -> NameMap {
    if let Some(map) = read_cache(cache_path, true) {
        return map;
    }

    match download_table(url) {
        Ok(entries) => {
            if let Err(e) = write_cache(cache_path, &entries) {
                warn!("Could not cache name mapping table: {}", e);
            }
            info!("Loaded name mapping table ({} entries)", entries.len());
            NameMap::from_entries(entries)
        }
        Err(e) => {
            warn!("Name mapping download failed: {}, falling back", e);
            read_cache(cache_path, false).unwrap_or_else(NameMap::identity)
        }
    }
}

/// Read the cached table. With `check_ttl`, a stale cache reads as a miss.
fn read_cache(cache_path: &Path, check_ttl: bool) -> Option<NameMap> {
    let metadata = fs::metadata(cache_path).ok()?;
    if check_ttl {
        let modified: chrono::DateTime<chrono::Utc> = metadata.modified().ok()?.into();
        if chrono::Utc::now() - modified > chrono::Duration::hours(TABLE_TTL_HOURS) {
            debug!("Name mapping cache at {} is stale", cache_path.display());
            return None;
        }
    }
    let content = fs::read_to_string(cache_path).ok()?;
    let entries: HashMap<String, String> = serde_json::from_str(&content).ok()?;
    debug!("Using cached name mapping ({} entries)", entries.len());
    Some(NameMap::from_entries(entries))
}

fn write_cache(cache_path: &Path, entries: &HashMap<String, String>) -> Result<()> {
    if let Some(parent) = cache_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(cache_path, serde_json::to_string(entries)?)?;
    Ok(())
}

/// Download the table JSON (a conda-name → index-name object) with retry
fn download_table(url: &str) -> Result<HashMap<String, String>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {e}")))?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Fetching name mapping from {url}"));

    let mut attempt = 0;
    let result = loop {
        attempt += 1;
        match client.get(url).send() {
            Ok(response) => {
                if !response.status().is_success() {
                    break Err(Error::DownloadError(format!(
                        "HTTP {} from {}",
                        response.status(),
                        url
                    )));
                }
                break response.json::<HashMap<String, String>>().map_err(|e| {
                    Error::DownloadError(format!("Failed to parse name mapping JSON: {e}"))
                });
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    break Err(Error::DownloadError(format!(
                        "Failed to fetch name mapping after {attempt} attempts: {e}"
                    )));
                }
                warn!("Name mapping fetch attempt {} failed: {}, retrying...", attempt, e);
                std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
            }
        }
    };
    spinner.finish_and_clear();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_fallback() {
        let map = NameMap::identity();
        assert_eq!(map.to_conda("numpy"), "numpy");
        assert_eq!(map.to_index("libffi"), "libffi");
        // Fallback lowercases
        assert_eq!(map.to_conda("NumPy"), "numpy");
    }

    #[test]
    fn test_mapped_names_round_trip() {
        let mut map = NameMap::identity();
        map.insert("pytorch", "torch");
        assert_eq!(map.to_conda("torch"), "pytorch");
        assert_eq!(map.to_index("pytorch"), "torch");
        // Unrelated names still fall through
        assert_eq!(map.to_conda("requests"), "requests");
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        let mut entries = HashMap::new();
        entries.insert("pytorch".to_string(), "torch".to_string());
        write_cache(&path, &entries).unwrap();

        let map = read_cache(&path, true).unwrap();
        assert_eq!(map.to_conda("torch"), "pytorch");
    }

    #[test]
    fn test_missing_cache_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_cache(&dir.path().join("absent.json"), true).is_none());
    }
}
