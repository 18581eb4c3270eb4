use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, ResultExt as _, TablekeeperError};
use crate::reconcile::MergePolicy;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "tablekeeper.json";

/// One scraped source: a logical dataset name plus the page it comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub url: String,
    /// Column used as the row key during reconciliation. Positional
    /// alignment when unset.
    #[serde(default)]
    pub key_column: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding spreadsheets and the backups subdirectory
    pub data_dir: PathBuf,

    /// Request timeout for page fetches, in seconds
    pub fetch_timeout_secs: u64,

    /// Configured datasets, processed sequentially per run
    pub datasets: Vec<DatasetConfig>,

    /// Drop rows that disappeared from fetched data (default: retain)
    pub drop_stale_rows: bool,

    /// Treat sheets without a recorded baseline as valid (default: true).
    /// When false, unverifiable sheets are restored from backup.
    pub treat_unverified_as_valid: bool,

    /// Permit zero-row fetches to flow through the merge (default: false)
    pub allow_empty_fetch: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            fetch_timeout_secs: 30,
            datasets: Vec::new(),
            drop_stale_rows: false,
            treat_unverified_as_valid: true,
            allow_empty_fetch: false,
        }
    }
}

impl AppConfig {
    /// Merge policy for one dataset, combining global knobs with the
    /// dataset's own key column.
    pub fn merge_policy(&self, dataset: &DatasetConfig) -> MergePolicy {
        MergePolicy {
            key_column: dataset.key_column.clone(),
            drop_stale_rows: self.drop_stale_rows,
            allow_empty_fetch: self.allow_empty_fetch,
        }
    }
}

/// Load configuration from `path`.
///
/// A missing file yields the defaults (commands that need datasets report
/// that separately); malformed JSON is an error rather than a silent
/// fallback.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| {
        TablekeeperError::Config(format!("Invalid config {}: {e}", path.display()))
    })
}

/// Persist configuration as pretty-printed JSON.
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
