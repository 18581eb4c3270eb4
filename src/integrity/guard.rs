//! Verification and restoration logic.
//!
//! The guard compares a sheet's current content checksum against the
//! baseline stored in the metadata record. Cosmetic spreadsheet edits never
//! trip it because the checksum is computed over canonical data content, not
//! file bytes; any edit to protected data cells does.

use serde::Serialize;

use crate::backup::BackupStore;
use crate::checksum::checksum;
use crate::error::Result;
use crate::table::Table;

/// Outcome of comparing a sheet against its stored baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Content hashes to the stored checksum.
    Match,
    /// Content diverges from the stored checksum.
    Mismatch { expected: String, actual: String },
    /// No metadata entry exists; the sheet is unverifiable. Policy for this
    /// case belongs to the caller (first runs have no baseline yet).
    NoBaseline,
}

/// Result of an integrity check, shaped for logging and CLI display.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    /// Whether verification passed
    pub passed: bool,

    /// Human-readable message describing the result
    pub message: String,

    /// Dataset the checked sheet belongs to
    pub dataset: String,

    /// Sheet that was checked
    pub sheet: String,

    /// Baseline checksum from the metadata record, if one exists
    pub expected: Option<String>,

    /// Checksum computed from the sheet's current content
    pub actual: String,
}

impl VerificationReport {
    /// Format for terminal display with pass/fail indicators.
    pub fn format_cli(&self) -> String {
        if self.passed {
            format!(
                "✓ PASS: {}\n  Dataset: {}\n  Sheet: {}\n  Checksum: {}",
                self.message,
                self.dataset,
                self.sheet,
                &self.actual[..16.min(self.actual.len())]
            )
        } else {
            let mut output = format!(
                "✗ FAIL: {}\n  Dataset: {}\n  Sheet: {}\n",
                self.message, self.dataset, self.sheet
            );
            if let Some(expected) = &self.expected {
                output.push_str(&format!("  Expected: {expected}\n"));
            }
            output.push_str(&format!("  Actual:   {}", self.actual));
            output
        }
    }
}

/// Decides on every read whether a sheet still matches its last known-good
/// state, and restores it from the CSV backup when it does not.
pub struct IntegrityGuard<'a> {
    store: &'a BackupStore,
    /// Policy for sheets with no recorded baseline: `true` treats them as
    /// valid (default), `false` forces a restore attempt.
    treat_unverified_as_valid: bool,
}

impl<'a> IntegrityGuard<'a> {
    pub fn new(store: &'a BackupStore, treat_unverified_as_valid: bool) -> Self {
        Self {
            store,
            treat_unverified_as_valid,
        }
    }

    /// Compare `table`'s content checksum against the stored baseline.
    pub fn verify(&self, dataset: &str, sheet: &str, table: &Table) -> Result<Verdict> {
        let actual = checksum(table)?;
        let record = self.store.get_metadata(dataset)?;
        match record.sheets.get(sheet) {
            None => Ok(Verdict::NoBaseline),
            Some(entry) if entry.checksum == actual => Ok(Verdict::Match),
            Some(entry) => Ok(Verdict::Mismatch {
                expected: entry.checksum.clone(),
                actual,
            }),
        }
    }

    /// Return `table` unchanged when it matches its baseline; otherwise load
    /// and return the authoritative backup table.
    ///
    /// The second element reports whether a restoration occurred, so the
    /// caller can rewrite the spreadsheet file and log the tampering event.
    ///
    /// # Errors
    ///
    /// `BackupMissing` when verification fails and no CSV backup exists:
    /// unrecoverable, surfaced instead of silently ignored.
    pub fn ensure_valid(&self, dataset: &str, sheet: &str, table: Table) -> Result<(Table, bool)> {
        match self.verify(dataset, sheet, &table)? {
            Verdict::Match => Ok((table, false)),
            Verdict::NoBaseline => {
                if self.treat_unverified_as_valid {
                    Ok((table, false))
                } else {
                    tracing::warn!(dataset, sheet, "no baseline; restoring from backup");
                    let restored = self.store.read_backup(dataset, sheet)?;
                    Ok((restored, true))
                }
            }
            Verdict::Mismatch { expected, actual } => {
                tracing::warn!(
                    dataset,
                    sheet,
                    expected = %expected,
                    actual = %actual,
                    "tampering detected; restoring sheet from CSV backup"
                );
                let restored = self.store.read_backup(dataset, sheet)?;
                Ok((restored, true))
            }
        }
    }

    /// Unconditionally load the backup table, bypassing verification.
    /// For manual administrator-triggered recovery.
    pub fn force_restore(&self, dataset: &str, sheet: &str) -> Result<Table> {
        tracing::info!(dataset, sheet, "force restore from CSV backup");
        self.store.read_backup(dataset, sheet)
    }

    /// Run `verify` and shape the outcome into an operator-facing report.
    pub fn check_report(
        &self,
        dataset: &str,
        sheet: &str,
        table: &Table,
    ) -> Result<VerificationReport> {
        let actual = checksum(table)?;
        let report = match self.verify(dataset, sheet, table)? {
            Verdict::Match => VerificationReport {
                passed: true,
                message: "Sheet content matches its trusted backup".to_owned(),
                dataset: dataset.to_owned(),
                sheet: sheet.to_owned(),
                expected: Some(actual.clone()),
                actual,
            },
            Verdict::NoBaseline => VerificationReport {
                passed: self.treat_unverified_as_valid,
                message: "No baseline recorded for this sheet".to_owned(),
                dataset: dataset.to_owned(),
                sheet: sheet.to_owned(),
                expected: None,
                actual,
            },
            Verdict::Mismatch { expected, actual } => VerificationReport {
                passed: false,
                message: "Checksum mismatch: sheet content was modified outside tablekeeper"
                    .to_owned(),
                dataset: dataset.to_owned(),
                sheet: sheet.to_owned(),
                expected: Some(expected),
                actual,
            },
        };
        Ok(report)
    }
}
