//! Page fetching and HTML table extraction.
//!
//! Thin collaborator in front of the pipeline: given a URL it returns the
//! tables found on the page, or a `Fetch` error that aborts processing of
//! that URL without touching its existing backups. The trait seam exists so
//! the runner can be driven by an in-memory fake in tests.

use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

use crate::error::Result;
use crate::table::{CellValue, Table};

/// Source of scraped tables for one URL.
pub trait TableFetcher {
    /// Fetch all tables from the page at `url`.
    ///
    /// # Errors
    ///
    /// `Fetch` on network failure, timeout, or a non-success HTTP status.
    fn fetch_tables(&self, url: &str) -> Result<Vec<Table>>;
}

/// Blocking HTTP fetcher extracting `<table>` elements.
pub struct HttpTableFetcher {
    client: reqwest::blocking::Client,
}

impl HttpTableFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;
        Ok(Self { client })
    }
}

impl TableFetcher for HttpTableFetcher {
    fn fetch_tables(&self, url: &str) -> Result<Vec<Table>> {
        let body = self
            .client
            .get(url)
            .send()?
            .error_for_status()?
            .text()?;
        Ok(parse_html_tables(&body))
    }
}

/// Extract every `<table>` in an HTML document.
///
/// The first row supplies the headers (`<th>` preferred, `<td>` fallback);
/// remaining rows become data rows, padded to the header width. Tables
/// without any rows are skipped.
pub fn parse_html_tables(html: &str) -> Vec<Table> {
    // Selectors are static and known-valid.
    let table_sel = Selector::parse("table").expect("valid selector");
    let row_sel = Selector::parse("tr").expect("valid selector");
    let cell_sel = Selector::parse("th, td").expect("valid selector");

    let document = Html::parse_document(html);
    let mut tables = Vec::new();

    for table_el in document.select(&table_sel) {
        let mut rows = table_el.select(&row_sel);
        let Some(header_row) = rows.next() else {
            continue;
        };

        let columns: Vec<String> = header_row
            .select(&cell_sel)
            .map(|cell| cell_text(&cell))
            .collect();
        if columns.is_empty() {
            continue;
        }

        let mut table = Table::new(columns);
        for row in rows {
            let cells: Vec<CellValue> = row
                .select(&cell_sel)
                .map(|cell| CellValue::parse(&cell_text(&cell)))
                .collect();
            if !cells.is_empty() {
                table.push_row(cells);
            }
        }
        tables.push(table);
    }
    tables
}

/// Concatenated, whitespace-collapsed text content of a cell.
fn cell_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
