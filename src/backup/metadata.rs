//! The shared metadata record tying spreadsheet files to trusted backups.
//!
//! One JSON file in the backups directory maps every (dataset, sheet) pair to
//! the checksum of its CSV snapshot, the last-updated timestamp, and the
//! snapshot's path. The checksum stored here always reflects the CSV backup's
//! content at the time of the last successful write, never the spreadsheet
//! file directly; it is the baseline the integrity guard compares against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ResultExt as _};

/// File name of the shared metadata record inside the backups directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Per-sheet entry: the trusted-state pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetRecord {
    /// Canonical content checksum of the CSV backup
    pub checksum: String,

    /// UTC timestamp of the last successful write
    pub updated_utc: DateTime<Utc>,

    /// Path of the CSV backup file
    pub backup_path: PathBuf,
}

/// Per-dataset entry: ordered sheet names plus one record per sheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// Sheet names in workbook order
    pub sheet_names: Vec<String>,

    /// Sheet name to trusted-state record
    pub sheets: BTreeMap<String, SheetRecord>,
}

impl DatasetRecord {
    /// True when the dataset has never been written.
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}

/// The whole persisted record, keyed by dataset name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub datasets: BTreeMap<String, DatasetRecord>,
}

impl MetadataRecord {
    /// Load the record from disk. A missing file is a first run and yields
    /// the default (empty) record; a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read metadata file: {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse metadata JSON")
    }

    /// Persist the record. Written to a temp file and renamed into place so
    /// a crash mid-write never leaves a truncated record behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize metadata")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write metadata to {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move metadata into {}", path.display()))?;
        Ok(())
    }

    /// Look up the record for one sheet.
    pub fn sheet(&self, dataset: &str, sheet: &str) -> Option<&SheetRecord> {
        self.datasets.get(dataset).and_then(|d| d.sheets.get(sheet))
    }

    /// Insert or replace one sheet's record, keeping the dataset's ordered
    /// sheet name list in sync.
    pub fn upsert(&mut self, dataset: &str, sheet: &str, record: SheetRecord) {
        let entry = self.datasets.entry(dataset.to_owned()).or_default();
        if !entry.sheet_names.iter().any(|s| s == sheet) {
            entry.sheet_names.push(sheet.to_owned());
        }
        entry.sheets.insert(sheet.to_owned(), record);
    }
}
