//! Spreadsheet (xlsx) reading and writing.
//!
//! The user-facing file. Multiple named sheets per workbook are supported
//! and the sheet name ↔ table association is preserved exactly. Cells are
//! written from their canonical forms and re-detected on read, so
//! presentation-only spreadsheet state never reaches the checksum: an
//! untouched file reads back into the same table that was written.

use calamine::{open_workbook_auto, Data, Reader as _};
use rust_xlsxwriter::Workbook;
use std::fs;
use std::path::Path;

use crate::error::{Result, ResultExt as _, TablekeeperError};
use crate::table::{CellValue, Table};

/// Write every (sheet name, table) pair into one workbook at `path`.
///
/// The file is assembled in a temporary sibling and renamed into place so
/// readers never observe a half-written workbook.
pub fn write_sheets(path: &Path, sheets: &[(String, Table)]) -> Result<()> {
    let mut workbook = Workbook::new();

    for (name, table) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name.as_str())?;

        for (col, header) in table.columns().iter().enumerate() {
            worksheet.write_string(0, col as u16, header.as_str())?;
        }
        for (row, cells) in table.rows().iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                let (r, c) = ((row + 1) as u32, col as u16);
                match cell {
                    CellValue::Null => {}
                    CellValue::Str(s) => {
                        worksheet.write_string(r, c, s.as_str())?;
                    }
                    CellValue::Number(n) => {
                        worksheet.write_number(r, c, *n)?;
                    }
                    // Dates travel as canonical text so read-back re-detects
                    // them instead of round-tripping through Excel serials.
                    CellValue::Date(_) => {
                        worksheet.write_string(r, c, cell.canonical())?;
                    }
                }
            }
        }
    }

    let tmp = path.with_extension("xlsx.tmp");
    workbook.save(&tmp)?;
    if let Err(e) = fs::rename(&tmp, path) {
        fs::copy(&tmp, path)
            .with_context(|| format!("Failed to move workbook (rename error: {e})"))?;
        let _ = fs::remove_file(&tmp);
    }
    Ok(())
}

/// Read every sheet of the workbook at `path`.
///
/// # Errors
///
/// `WorkbookMissing` when the file does not exist; `EmptyWorkbook` when it
/// contains no sheets. Both are surfaced to the caller, which decides
/// whether the situation is a first run or fatal.
pub fn read_sheets(path: &Path) -> Result<Vec<(String, Table)>> {
    if !path.exists() {
        return Err(TablekeeperError::WorkbookMissing(path.to_path_buf()));
    }

    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names().to_owned();
    if names.is_empty() {
        return Err(TablekeeperError::EmptyWorkbook(path.to_path_buf()));
    }

    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook
            .worksheet_range(&name)
            .with_context(|| format!("Failed to read sheet '{name}'"))?;

        let mut rows = range.rows();
        let columns: Vec<String> = match rows.next() {
            Some(header) => header.iter().map(|d| data_to_cell(d).canonical()).collect(),
            None => Vec::new(),
        };

        let mut table = Table::new(columns);
        for row in rows {
            table.push_row(row.iter().map(data_to_cell).collect());
        }
        sheets.push((name, table));
    }
    Ok(sheets)
}

/// Map a calamine cell into the crate's tagged scalar.
fn data_to_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Null,
        Data::String(s) => CellValue::parse(s),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Str(b.to_string()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|ndt| CellValue::Date(ndt.date()))
            .unwrap_or(CellValue::Null),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::parse(s),
        Data::Error(e) => CellValue::Str(format!("{e:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_table() -> Table {
        let mut table = Table::new(vec![
            "id".to_owned(),
            "amount".to_owned(),
            "when".to_owned(),
        ]);
        table.push_row(vec![
            CellValue::Str("x-01".to_owned()),
            CellValue::Number(12.5),
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()),
        ]);
        table.push_row(vec![
            CellValue::Str("x-02".to_owned()),
            CellValue::Number(40.0),
            CellValue::Null,
        ]);
        table
    }

    #[test]
    fn test_write_read_round_trip_single_sheet() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("one.xlsx");
        let sheets = vec![("Data".to_owned(), sample_table())];

        write_sheets(&path, &sheets).unwrap();
        let loaded = read_sheets(&path).unwrap();

        assert_eq!(loaded, sheets);
    }

    #[test]
    fn test_write_read_round_trip_multiple_sheets() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("multi.xlsx");

        let mut second = Table::new(vec!["name".to_owned()]);
        second.push_row(vec![CellValue::Str("only".to_owned())]);
        let sheets = vec![
            ("Table_1".to_owned(), sample_table()),
            ("Table_2".to_owned(), second),
        ];

        write_sheets(&path, &sheets).unwrap();
        let loaded = read_sheets(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded, sheets);
    }

    #[test]
    fn test_read_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = read_sheets(&temp_dir.path().join("absent.xlsx")).unwrap_err();
        assert!(matches!(err, TablekeeperError::WorkbookMissing(_)));
    }

    #[test]
    fn test_formatted_identifiers_survive_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ids.xlsx");

        let mut table = Table::new(vec!["code".to_owned()]);
        table.push_row(vec![CellValue::Str("007".to_owned())]);
        write_sheets(&path, &[("Data".to_owned(), table.clone())]).unwrap();

        let loaded = read_sheets(&path).unwrap();
        assert_eq!(loaded[0].1, table);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clean.xlsx");
        write_sheets(&path, &[("Data".to_owned(), sample_table())]).unwrap();
        assert!(!path.with_extension("xlsx.tmp").exists());
    }
}
