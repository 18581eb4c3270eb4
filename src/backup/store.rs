//! CSV snapshot persistence.
//!
//! Every sheet that has ever been written owns exactly one CSV file under the
//! backups directory plus one checksum entry in the shared metadata record.
//! `write_backup` enforces the crash-safety ordering: the snapshot is written
//! to a temporary file, fsync'd and renamed into place before the metadata
//! record is updated to reference its checksum. A failure between the two
//! steps leaves metadata pointing at the previous (still valid) snapshot,
//! never at content that does not exist.

use chrono::Utc;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::backup::metadata::{DatasetRecord, MetadataRecord, SheetRecord, METADATA_FILE};
use crate::checksum::checksum;
use crate::error::{Result, ResultExt as _, TablekeeperError};
use crate::table::{CellValue, Table};

/// Directory name for CSV snapshots inside the data directory.
pub const BACKUP_DIR: &str = "backups";

/// Replace filename-hostile characters with underscores.
///
/// Dataset and sheet names come from config and scraped pages; only
/// `[A-Za-z0-9._-]` survives into file names.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// One row of `list_backups` output.
#[derive(Debug, Clone)]
pub struct BackupEntry {
    pub dataset: String,
    pub sheet: String,
    pub checksum: String,
    pub updated_utc: chrono::DateTime<Utc>,
}

/// Filesystem layout plus all backup read/write operations.
///
/// Layout under the data directory:
///
/// ```text
/// data/
///   <dataset>.xlsx                  user-facing spreadsheet
///   backups/
///     <dataset>_<sheet>.csv         authoritative snapshot per sheet
///     metadata.json                 shared trusted-state record
/// ```
#[derive(Debug, Clone)]
pub struct BackupStore {
    data_dir: PathBuf,
    backup_dir: PathBuf,
    metadata_path: PathBuf,
}

impl BackupStore {
    /// Open (and create if needed) the store rooted at `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let backup_dir = data_dir.join(BACKUP_DIR);
        fs::create_dir_all(&backup_dir)
            .with_context(|| format!("Failed to create backup directory: {}", backup_dir.display()))?;
        let metadata_path = backup_dir.join(METADATA_FILE);
        Ok(Self {
            data_dir,
            backup_dir,
            metadata_path,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of a dataset's user-facing spreadsheet file.
    pub fn workbook_path(&self, dataset: &str) -> PathBuf {
        self.data_dir.join(format!("{}.xlsx", sanitize_name(dataset)))
    }

    /// Path of one sheet's CSV snapshot.
    pub fn backup_path(&self, dataset: &str, sheet: &str) -> PathBuf {
        self.backup_dir
            .join(format!("{}_{}.csv", sanitize_name(dataset), sanitize_name(sheet)))
    }

    /// Map a spreadsheet file name back to its dataset name.
    ///
    /// Prefers a metadata entry whose sanitized name matches the file stem;
    /// falls back to the stem itself for datasets not yet recorded.
    pub fn dataset_for_file(&self, file: &str) -> Result<String> {
        let stem = Path::new(file)
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| TablekeeperError::InvalidPath(file.to_owned()))?;
        let metadata = self.metadata()?;
        for name in metadata.datasets.keys() {
            if sanitize_name(name) == stem {
                return Ok(name.clone());
            }
        }
        Ok(stem.to_owned())
    }

    /// Serialize `table` to the sheet's CSV snapshot and record its checksum.
    ///
    /// The snapshot lands via temp-file + rename, and only then is the
    /// metadata entry for `(dataset, sheet)` updated with the new checksum
    /// and timestamp.
    ///
    /// # Returns
    ///
    /// The canonical content checksum of the written snapshot.
    pub fn write_backup(&self, dataset: &str, sheet: &str, table: &Table) -> Result<String> {
        let digest = checksum(table)?;
        let path = self.backup_path(dataset, sheet);
        let tmp = path.with_extension("csv.tmp");

        {
            let file = fs::File::create(&tmp)
                .with_context(|| format!("Failed to create backup temp file: {}", tmp.display()))?;
            let mut writer = csv::WriterBuilder::new()
                .quote_style(csv::QuoteStyle::Necessary)
                .terminator(csv::Terminator::Any(b'\n'))
                .from_writer(file);
            writer.write_record(table.columns())?;
            for row in table.rows() {
                writer.write_record(row.iter().map(|cell| cell.canonical()))?;
            }
            writer.flush()?;
            let mut file = writer
                .into_inner()
                .map_err(|e| TablekeeperError::Csv(e.to_string()))?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move backup into {}", path.display()))?;

        let mut metadata = MetadataRecord::load(&self.metadata_path)?;
        metadata.upsert(
            dataset,
            sheet,
            SheetRecord {
                checksum: digest.clone(),
                updated_utc: Utc::now(),
                backup_path: path,
            },
        );
        metadata.save(&self.metadata_path)?;

        tracing::debug!(dataset, sheet, checksum = %digest, "backup written");
        Ok(digest)
    }

    /// Load one sheet's snapshot back into a table.
    ///
    /// # Errors
    ///
    /// `BackupMissing` when no CSV file exists for the sheet.
    pub fn read_backup(&self, dataset: &str, sheet: &str) -> Result<Table> {
        let path = self.backup_path(dataset, sheet);
        if !path.exists() {
            return Err(TablekeeperError::BackupMissing {
                dataset: dataset.to_owned(),
                sheet: sheet.to_owned(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .with_context(|| format!("Failed to open backup: {}", path.display()))?;
        let columns: Vec<String> = reader
            .headers()
            .map_err(TablekeeperError::from)?
            .iter()
            .map(str::to_owned)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(CellValue::parse).collect());
        }
        Table::from_rows(columns, rows)
    }

    /// The persisted record for one dataset, or the default on first run.
    pub fn get_metadata(&self, dataset: &str) -> Result<DatasetRecord> {
        let metadata = self.metadata()?;
        Ok(metadata.datasets.get(dataset).cloned().unwrap_or_default())
    }

    /// The whole shared metadata record.
    pub fn metadata(&self) -> Result<MetadataRecord> {
        MetadataRecord::load(&self.metadata_path)
    }

    /// Enumerate all known backups for operator inspection.
    pub fn list_backups(&self) -> Result<Vec<BackupEntry>> {
        let metadata = self.metadata()?;
        let mut entries = Vec::new();
        for (dataset, record) in &metadata.datasets {
            for sheet in &record.sheet_names {
                if let Some(sheet_record) = record.sheets.get(sheet) {
                    entries.push(BackupEntry {
                        dataset: dataset.clone(),
                        sheet: sheet.clone(),
                        checksum: sheet_record.checksum.clone(),
                        updated_utc: sheet_record.updated_utc,
                    });
                }
            }
        }
        Ok(entries)
    }
}
