//! Per-dataset pipeline orchestration.
//!
//! One run processes every configured dataset sequentially: fetch → guard
//! the current spreadsheet → reconcile → write CSV backup → rewrite the
//! spreadsheet. Failures are isolated per dataset; a fetch error or an
//! empty fetch skips that dataset with its files untouched, and nothing a
//! single dataset does can abort the others.
//!
//! All merges for a dataset are computed before anything is written, so an
//! empty-fetch abort on the third table of a page leaves the first two
//! backups exactly as they were.

use crate::backup::BackupStore;
use crate::checksum::checksum;
use crate::config::{AppConfig, DatasetConfig};
use crate::error::{Result, TablekeeperError};
use crate::fetch::TableFetcher;
use crate::integrity::IntegrityGuard;
use crate::reconcile::{merge, MergePolicy};
use crate::table::Table;
use crate::workbook;

/// What happened to one dataset during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetOutcome {
    /// New or changed data was written to backup and spreadsheet.
    Updated {
        sheets: usize,
        total_rows: usize,
        new_rows: usize,
    },
    /// Data was unchanged but the spreadsheet was rewritten from trusted
    /// content after tampering was detected.
    Restored,
    /// Fetched data matched the stored state; nothing written.
    Unchanged,
    /// Dataset skipped without touching its files (fetch failure, empty
    /// fetch, or no tables on the page).
    Skipped { reason: String },
    /// Dataset failed; surfaced to the operator.
    Failed { error: String },
}

/// Per-dataset result of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub dataset: String,
    pub outcome: DatasetOutcome,
}

/// Re-attach user-added columns from a (tampered) workbook sheet to the
/// trusted table restored from backup.
///
/// Core values come from `trusted`; only columns unknown to the backup are
/// carried over, aligned by the dataset's key column (or position). Rows
/// the user added to the sheet do not survive: they are tampering like any
/// other core edit.
fn graft_user_columns(
    workbook_table: &Table,
    trusted: Table,
    policy: &MergePolicy,
) -> Result<Table> {
    let has_extras = workbook_table
        .columns()
        .iter()
        .any(|c| !trusted.columns().contains(c));
    if !has_extras {
        return Ok(trusted);
    }
    let graft_policy = MergePolicy {
        key_column: policy.key_column.clone(),
        drop_stale_rows: true,
        allow_empty_fetch: true,
    };
    merge(
        workbook_table,
        &trusted,
        trusted.columns(),
        &graft_policy,
    )
}

/// Sheet name for the n-th table scraped from a page: a single table lands
/// in `Data`, multiple tables in `Table_1..Table_N`.
pub fn sheet_names(table_count: usize) -> Vec<String> {
    if table_count == 1 {
        vec!["Data".to_owned()]
    } else {
        (1..=table_count).map(|i| format!("Table_{i}")).collect()
    }
}

/// Drives the fetch → reconcile → persist pipeline over configured datasets.
pub struct Runner<'a, F: TableFetcher> {
    config: &'a AppConfig,
    store: BackupStore,
    fetcher: F,
}

impl<'a, F: TableFetcher> Runner<'a, F> {
    pub fn new(config: &'a AppConfig, fetcher: F) -> Result<Self> {
        let store = BackupStore::open(&config.data_dir)?;
        Ok(Self {
            config,
            store,
            fetcher,
        })
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    /// Process every configured dataset, isolating failures.
    pub fn run(&self) -> Vec<RunSummary> {
        let mut summaries = Vec::new();
        for dataset in &self.config.datasets {
            tracing::info!(dataset = %dataset.name, url = %dataset.url, "processing dataset");
            let outcome = match self.process_dataset(dataset) {
                Ok(outcome) => outcome,
                Err(e @ (TablekeeperError::Fetch(_) | TablekeeperError::EmptyFetch)) => {
                    tracing::warn!(
                        dataset = %dataset.name,
                        error = %e,
                        "skipping dataset; existing files preserved"
                    );
                    DatasetOutcome::Skipped {
                        reason: e.to_string(),
                    }
                }
                Err(e) => {
                    tracing::error!(dataset = %dataset.name, error = %e, "dataset failed");
                    DatasetOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            summaries.push(RunSummary {
                dataset: dataset.name.clone(),
                outcome,
            });
        }
        summaries
    }

    /// Run the full pipeline for one dataset.
    fn process_dataset(&self, dataset: &DatasetConfig) -> Result<DatasetOutcome> {
        let tables = self.fetcher.fetch_tables(&dataset.url)?;
        if tables.is_empty() {
            return Ok(DatasetOutcome::Skipped {
                reason: "no tables found on page".to_owned(),
            });
        }

        let names = sheet_names(tables.len());
        let workbook_path = self.store.workbook_path(&dataset.name);
        let record = self.store.get_metadata(&dataset.name)?;

        // A missing or empty spreadsheet is a first run only while no
        // metadata baseline exists; afterwards it needs operator attention.
        let current = match workbook::read_sheets(&workbook_path) {
            Ok(sheets) => sheets,
            Err(
                e @ (TablekeeperError::WorkbookMissing(_) | TablekeeperError::EmptyWorkbook(_)),
            ) => {
                if record.is_empty() {
                    Vec::new()
                } else {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        };

        let guard = IntegrityGuard::new(&self.store, self.config.treat_unverified_as_valid);
        let policy = self.config.merge_policy(dataset);

        // Phase 1: validate and merge everything before writing anything.
        let mut merged_sheets = Vec::with_capacity(tables.len());
        let mut any_restored = false;
        let mut total_rows = 0;
        let mut new_rows = 0;

        for (fetched, sheet) in tables.iter().zip(&names) {
            let in_workbook = current
                .iter()
                .find(|(name, _)| name == sheet)
                .map(|(_, table)| table.clone());

            let (trusted, restored) = match in_workbook.clone() {
                Some(table) => guard.ensure_valid(&dataset.name, sheet, table)?,
                None if record.sheets.contains_key(sheet) => {
                    // Baseline exists but the sheet vanished from the
                    // workbook: treat like any other tampering.
                    tracing::warn!(
                        dataset = %dataset.name,
                        sheet = %sheet,
                        "sheet missing from workbook; restoring from CSV backup"
                    );
                    (self.store.read_backup(&dataset.name, sheet)?, true)
                }
                None => (Table::new(Vec::new()), false),
            };
            any_restored |= restored;

            // Restoration reverts core data to the backup, but columns the
            // user added to the sheet exist nowhere else yet. Graft them
            // onto the trusted table before merging so they survive.
            let existing = match (&in_workbook, restored) {
                (Some(wb_table), true) => {
                    graft_user_columns(wb_table, trusted, &policy)?
                }
                _ => trusted,
            };

            let merged = merge(&existing, fetched, fetched.columns(), &policy)?;
            let digest = checksum(&merged)?;
            let changed = record.sheets.get(sheet).map(|r| r.checksum.as_str())
                != Some(digest.as_str());

            new_rows += merged.n_rows().saturating_sub(existing.n_rows());
            total_rows += merged.n_rows();
            merged_sheets.push((sheet.clone(), merged, changed));
        }

        // Phase 2: persist. CSV backups first (they are the ground truth),
        // then the user-facing workbook.
        let any_changed = merged_sheets.iter().any(|(_, _, changed)| *changed);
        for (sheet, merged, changed) in &merged_sheets {
            if *changed {
                self.store.write_backup(&dataset.name, sheet, merged)?;
            }
        }

        let out_sheets: Vec<(String, Table)> = merged_sheets
            .into_iter()
            .map(|(sheet, merged, _)| (sheet, merged))
            .collect();

        if any_changed || any_restored || !workbook_path.exists() {
            workbook::write_sheets(&workbook_path, &out_sheets)?;
        }

        if any_changed {
            Ok(DatasetOutcome::Updated {
                sheets: out_sheets.len(),
                total_rows,
                new_rows,
            })
        } else if any_restored {
            Ok(DatasetOutcome::Restored)
        } else {
            Ok(DatasetOutcome::Unchanged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CellValue;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// In-memory fetcher: URL -> tables, or a simulated network failure.
    struct FakeFetcher {
        pages: HashMap<String, Vec<Table>>,
    }

    impl FakeFetcher {
        fn single(url: &str, table: Table) -> Self {
            let mut pages = HashMap::new();
            pages.insert(url.to_owned(), vec![table]);
            Self { pages }
        }
    }

    impl TableFetcher for FakeFetcher {
        fn fetch_tables(&self, url: &str) -> Result<Vec<Table>> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| TablekeeperError::Fetch(format!("connection refused: {url}")))
        }
    }

    fn scraped(values: &[(&str, f64)]) -> Table {
        let mut table = Table::new(vec!["ID".to_owned(), "Value".to_owned()]);
        for (id, v) in values {
            table.push_row(vec![CellValue::Str((*id).to_owned()), CellValue::Number(*v)]);
        }
        table
    }

    fn config_for(dir: &std::path::Path, datasets: Vec<DatasetConfig>) -> AppConfig {
        AppConfig {
            data_dir: dir.to_path_buf(),
            datasets,
            ..AppConfig::default()
        }
    }

    fn dataset(name: &str, url: &str) -> DatasetConfig {
        DatasetConfig {
            name: name.to_owned(),
            url: url.to_owned(),
            key_column: None,
        }
    }

    #[test]
    fn test_first_run_creates_backup_and_workbook() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(
            temp_dir.path(),
            vec![dataset("gov_registry", "https://example.org/reg")],
        );
        let fetcher = FakeFetcher::single(
            "https://example.org/reg",
            scraped(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]),
        );
        let runner = Runner::new(&config, fetcher).unwrap();

        let summaries = runner.run();
        assert_eq!(summaries.len(), 1);
        assert_eq!(
            summaries[0].outcome,
            DatasetOutcome::Updated {
                sheets: 1,
                total_rows: 3,
                new_rows: 3,
            }
        );

        assert!(runner.store().workbook_path("gov_registry").exists());
        let backup = runner.store().read_backup("gov_registry", "Data").unwrap();
        assert_eq!(backup.n_rows(), 3);
        assert!(!runner.store().get_metadata("gov_registry").unwrap().is_empty());
    }

    #[test]
    fn test_second_run_unchanged_short_circuits() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(
            temp_dir.path(),
            vec![dataset("gov_registry", "https://example.org/reg")],
        );
        let table = scraped(&[("a", 1.0)]);

        let first = Runner::new(
            &config,
            FakeFetcher::single("https://example.org/reg", table.clone()),
        )
        .unwrap();
        first.run();
        let stamp = first.store().get_metadata("gov_registry").unwrap().sheets["Data"]
            .updated_utc;

        let second = Runner::new(
            &config,
            FakeFetcher::single("https://example.org/reg", table),
        )
        .unwrap();
        let summaries = second.run();
        assert_eq!(summaries[0].outcome, DatasetOutcome::Unchanged);

        // Metadata untouched: no rewrite happened.
        let after = second.store().get_metadata("gov_registry").unwrap().sheets["Data"]
            .updated_utc;
        assert_eq!(stamp, after);
    }

    #[test]
    fn test_changed_value_updates_checksum() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(
            temp_dir.path(),
            vec![dataset("gov_registry", "https://example.org/reg")],
        );

        Runner::new(
            &config,
            FakeFetcher::single("https://example.org/reg", scraped(&[("a", 1.0), ("b", 2.0)])),
        )
        .unwrap()
        .run();
        let store = BackupStore::open(temp_dir.path()).unwrap();
        let c1 = store.get_metadata("gov_registry").unwrap().sheets["Data"]
            .checksum
            .clone();

        let runner = Runner::new(
            &config,
            FakeFetcher::single("https://example.org/reg", scraped(&[("a", 1.0), ("b", 9.0)])),
        )
        .unwrap();
        let summaries = runner.run();
        assert!(matches!(
            summaries[0].outcome,
            DatasetOutcome::Updated { .. }
        ));

        let c2 = store.get_metadata("gov_registry").unwrap().sheets["Data"]
            .checksum
            .clone();
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_tampered_workbook_is_restored_during_run() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(
            temp_dir.path(),
            vec![dataset("gov_registry", "https://example.org/reg")],
        );
        let table = scraped(&[("a", 1.0), ("b", 2.0)]);

        let runner = Runner::new(
            &config,
            FakeFetcher::single("https://example.org/reg", table.clone()),
        )
        .unwrap();
        runner.run();

        // Simulate a manual edit of a protected cell.
        let workbook_path = runner.store().workbook_path("gov_registry");
        workbook::write_sheets(
            &workbook_path,
            &[("Data".to_owned(), scraped(&[("a", 777.0), ("b", 2.0)]))],
        )
        .unwrap();

        let summaries = Runner::new(
            &config,
            FakeFetcher::single("https://example.org/reg", table.clone()),
        )
        .unwrap()
        .run();
        assert_eq!(summaries[0].outcome, DatasetOutcome::Restored);

        // The workbook once again carries the trusted values.
        let sheets = workbook::read_sheets(&workbook_path).unwrap();
        assert_eq!(sheets[0].1, table);
    }

    #[test]
    fn test_user_added_column_survives_restoration() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(
            temp_dir.path(),
            vec![dataset("gov_registry", "https://example.org/reg")],
        );
        let table = scraped(&[("a", 1.0), ("b", 2.0)]);
        Runner::new(
            &config,
            FakeFetcher::single("https://example.org/reg", table.clone()),
        )
        .unwrap()
        .run();

        // User annotates the exported sheet with their own column.
        let store = BackupStore::open(temp_dir.path()).unwrap();
        let mut annotated = Table::new(vec![
            "ID".to_owned(),
            "Value".to_owned(),
            "Notes".to_owned(),
        ]);
        annotated.push_row(vec![
            CellValue::Str("a".to_owned()),
            CellValue::Number(1.0),
            CellValue::Str("keep me".to_owned()),
        ]);
        annotated.push_row(vec![
            CellValue::Str("b".to_owned()),
            CellValue::Number(2.0),
            CellValue::Null,
        ]);
        workbook::write_sheets(
            &store.workbook_path("gov_registry"),
            &[("Data".to_owned(), annotated)],
        )
        .unwrap();

        // Next run: core data unchanged, but the sheet no longer hashes to
        // the baseline. The Notes column must survive into both outputs.
        let runner = Runner::new(
            &config,
            FakeFetcher::single("https://example.org/reg", table),
        )
        .unwrap();
        let summaries = runner.run();
        assert!(matches!(
            summaries[0].outcome,
            DatasetOutcome::Updated { .. }
        ));

        let backup = runner.store().read_backup("gov_registry", "Data").unwrap();
        assert_eq!(
            backup.columns(),
            &["ID".to_owned(), "Value".to_owned(), "Notes".to_owned()]
        );
        assert_eq!(backup.cell(0, 2), &CellValue::Str("keep me".to_owned()));

        // Annotated content is now the protected baseline.
        let sheets =
            workbook::read_sheets(&runner.store().workbook_path("gov_registry")).unwrap();
        assert_eq!(sheets[0].1, backup);
    }

    #[test]
    fn test_tampered_core_cell_reverted_while_extras_kept() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(
            temp_dir.path(),
            vec![dataset("gov_registry", "https://example.org/reg")],
        );
        let table = scraped(&[("a", 1.0), ("b", 2.0)]);
        Runner::new(
            &config,
            FakeFetcher::single("https://example.org/reg", table.clone()),
        )
        .unwrap()
        .run();

        // User both edits a protected value and adds a column.
        let store = BackupStore::open(temp_dir.path()).unwrap();
        let mut edited = Table::new(vec![
            "ID".to_owned(),
            "Value".to_owned(),
            "Notes".to_owned(),
        ]);
        edited.push_row(vec![
            CellValue::Str("a".to_owned()),
            CellValue::Number(777.0),
            CellValue::Str("annotation".to_owned()),
        ]);
        edited.push_row(vec![
            CellValue::Str("b".to_owned()),
            CellValue::Number(2.0),
            CellValue::Null,
        ]);
        workbook::write_sheets(
            &store.workbook_path("gov_registry"),
            &[("Data".to_owned(), edited)],
        )
        .unwrap();

        let runner = Runner::new(
            &config,
            FakeFetcher::single("https://example.org/reg", table),
        )
        .unwrap();
        runner.run();

        let backup = runner.store().read_backup("gov_registry", "Data").unwrap();
        // Core edit reverted, annotation preserved.
        assert_eq!(backup.cell(0, 1), &CellValue::Number(1.0));
        assert_eq!(backup.cell(0, 2), &CellValue::Str("annotation".to_owned()));
    }

    #[test]
    fn test_fetch_failure_is_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(
            temp_dir.path(),
            vec![
                dataset("down", "https://example.org/down"),
                dataset("up", "https://example.org/up"),
            ],
        );
        let fetcher = FakeFetcher::single("https://example.org/up", scraped(&[("a", 1.0)]));
        let runner = Runner::new(&config, fetcher).unwrap();

        let summaries = runner.run();
        assert!(matches!(
            summaries[0].outcome,
            DatasetOutcome::Skipped { .. }
        ));
        assert!(matches!(
            summaries[1].outcome,
            DatasetOutcome::Updated { .. }
        ));
        assert!(runner.store().workbook_path("up").exists());
    }

    #[test]
    fn test_empty_fetch_preserves_existing_files() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(
            temp_dir.path(),
            vec![dataset("gov_registry", "https://example.org/reg")],
        );
        let table = scraped(&[("a", 1.0)]);
        Runner::new(
            &config,
            FakeFetcher::single("https://example.org/reg", table.clone()),
        )
        .unwrap()
        .run();

        // Upstream failure: the page now yields a table with zero rows.
        let empty = Table::new(vec!["ID".to_owned(), "Value".to_owned()]);
        let runner = Runner::new(
            &config,
            FakeFetcher::single("https://example.org/reg", empty),
        )
        .unwrap();
        let summaries = runner.run();
        assert!(matches!(
            summaries[0].outcome,
            DatasetOutcome::Skipped { .. }
        ));

        // Prior backup intact.
        let backup = runner.store().read_backup("gov_registry", "Data").unwrap();
        assert_eq!(backup, table);
    }

    #[test]
    fn test_multiple_tables_land_in_numbered_sheets() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(
            temp_dir.path(),
            vec![dataset("multi", "https://example.org/multi")],
        );
        let mut pages = HashMap::new();
        pages.insert(
            "https://example.org/multi".to_owned(),
            vec![scraped(&[("a", 1.0)]), scraped(&[("b", 2.0)])],
        );
        let runner = Runner::new(&config, FakeFetcher { pages }).unwrap();
        runner.run();

        let record = runner.store().get_metadata("multi").unwrap();
        assert_eq!(
            record.sheet_names,
            vec!["Table_1".to_owned(), "Table_2".to_owned()]
        );
        let sheets = workbook::read_sheets(&runner.store().workbook_path("multi")).unwrap();
        assert_eq!(sheets.len(), 2);
    }

    #[test]
    fn test_sheet_names() {
        assert_eq!(sheet_names(1), vec!["Data".to_owned()]);
        assert_eq!(
            sheet_names(3),
            vec![
                "Table_1".to_owned(),
                "Table_2".to_owned(),
                "Table_3".to_owned()
            ]
        );
    }
}
