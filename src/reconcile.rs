//! Reconciler: merges freshly scraped rows into previously stored data.
//!
//! The scraper owns the core schema columns; anything else found in the
//! existing table was added by a user after export and must survive the
//! merge. Row identity defaults to position, with an optional key column
//! for sources that have a stable natural key. The merged table (core plus
//! extras) is what both the Backup Store and the spreadsheet writer receive,
//! so user columns are protected by the same checksum as scraped data.

use std::collections::HashMap;

use crate::error::{Result, TablekeeperError};
use crate::table::{CellValue, Table};

/// Knobs controlling merge behavior, derived from per-dataset config.
#[derive(Debug, Clone, Default)]
pub struct MergePolicy {
    /// Column used as the row key; positional alignment when `None`.
    pub key_column: Option<String>,

    /// Drop rows that disappeared from the fetched data instead of
    /// retaining them (default: retain, append-only monitoring).
    pub drop_stale_rows: bool,

    /// Permit a zero-row fetch to flow through the merge. Off by default:
    /// an empty fetch usually means an upstream failure, and merging it
    /// would erase existing data.
    pub allow_empty_fetch: bool,
}

/// Merge `fetched` into `existing`, updating core columns and carrying
/// user-added extras forward.
///
/// - Core columns (named in `schema_columns`) take the fetched values.
/// - Extra columns keep their existing values for rows that persist; rows
///   new in `fetched` get `Null` extras.
/// - Rows absent from `fetched` are retained unless
///   `policy.drop_stale_rows` is set.
///
/// # Errors
///
/// `EmptyFetch` when `fetched` has zero rows and the policy does not allow
/// it; `Config` when a configured key column is missing from the fetched
/// data.
pub fn merge(
    existing: &Table,
    fetched: &Table,
    schema_columns: &[String],
    policy: &MergePolicy,
) -> Result<Table> {
    if fetched.is_empty() && !policy.allow_empty_fetch {
        return Err(TablekeeperError::EmptyFetch);
    }

    // First run: nothing to preserve.
    if existing.is_empty() || existing.n_cols() == 0 {
        return Ok(fetched.clone());
    }

    let extra_columns: Vec<String> = existing
        .columns()
        .iter()
        .filter(|c| !schema_columns.contains(c) && !fetched.columns().contains(c))
        .cloned()
        .collect();

    let mut columns: Vec<String> = fetched.columns().to_vec();
    columns.extend(extra_columns.iter().cloned());
    let mut merged = Table::new(columns);

    match &policy.key_column {
        Some(key) => merge_keyed(existing, fetched, &extra_columns, key, policy, &mut merged)?,
        None => merge_positional(existing, fetched, &extra_columns, policy, &mut merged),
    }

    Ok(merged)
}

fn merge_keyed(
    existing: &Table,
    fetched: &Table,
    extra_columns: &[String],
    key: &str,
    policy: &MergePolicy,
    merged: &mut Table,
) -> Result<()> {
    let fetched_key = fetched.column_index(key).ok_or_else(|| {
        TablekeeperError::Config(format!("Key column '{key}' not present in fetched data"))
    })?;

    // Key column may be missing from the existing table (schema drift);
    // every existing row is then treated as unmatched.
    let existing_key = existing.column_index(key);
    let mut existing_by_key: HashMap<String, usize> = HashMap::new();
    if let Some(col) = existing_key {
        for (i, row) in existing.rows().iter().enumerate() {
            existing_by_key
                .entry(row[col].canonical())
                .or_insert(i);
        }
    }

    let mut matched = vec![false; existing.n_rows()];
    for row in fetched.rows() {
        let mut out = row.clone();
        let matched_row = existing_by_key
            .get(&row[fetched_key].canonical())
            .copied();
        if let Some(i) = matched_row {
            matched[i] = true;
        }
        for extra in extra_columns {
            let value = matched_row
                .and_then(|i| existing.column_index(extra).map(|c| existing.cell(i, c).clone()))
                .unwrap_or(CellValue::Null);
            out.push(value);
        }
        merged.push_row(out);
    }

    if !policy.drop_stale_rows {
        for (i, was_matched) in matched.iter().enumerate() {
            if !was_matched {
                merged.push_row(stale_row(existing, i, fetched.columns(), extra_columns));
            }
        }
    }
    Ok(())
}

fn merge_positional(
    existing: &Table,
    fetched: &Table,
    extra_columns: &[String],
    policy: &MergePolicy,
    merged: &mut Table,
) {
    for (i, row) in fetched.rows().iter().enumerate() {
        let mut out = row.clone();
        for extra in extra_columns {
            let value = if i < existing.n_rows() {
                existing
                    .column_index(extra)
                    .map(|c| existing.cell(i, c).clone())
                    .unwrap_or(CellValue::Null)
            } else {
                CellValue::Null
            };
            out.push(value);
        }
        merged.push_row(out);
    }

    if !policy.drop_stale_rows {
        for i in fetched.n_rows()..existing.n_rows() {
            merged.push_row(stale_row(existing, i, fetched.columns(), extra_columns));
        }
    }
}

/// Rebuild a retained existing row in the merged column order. Core values
/// come from the existing table by column name; columns the existing table
/// never had become `Null`.
fn stale_row(
    existing: &Table,
    row: usize,
    core_columns: &[String],
    extra_columns: &[String],
) -> Vec<CellValue> {
    core_columns
        .iter()
        .chain(extra_columns.iter())
        .map(|name| {
            existing
                .column_index(name)
                .map(|c| existing.cell(row, c).clone())
                .unwrap_or(CellValue::Null)
        })
        .collect()
}
