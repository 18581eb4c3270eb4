//! Content checksums over canonical table serialization.
//!
//! The digest is computed over the table's canonical CSV form (headers, then
//! rows, every cell in canonical text form), streamed through SHA-256. It is
//! deterministic under re-serialization and sensitive to any change in cell
//! values, row order, or column set. The same digest drives both tampering
//! detection and the short-circuit that skips rewriting unchanged data.
//!
//! Presentation-only spreadsheet state (column widths, formats, styling)
//! never reaches the digest because hashing starts from the parsed table,
//! not from file bytes.

use sha2::{Digest as _, Sha256};
use std::io;

use crate::error::Result;
use crate::table::Table;

/// Adapter that streams written bytes into a SHA-256 hasher.
struct DigestWriter<'a> {
    hasher: &'a mut Sha256,
}

impl io::Write for DigestWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compute the canonical content checksum of a table.
///
/// # Returns
///
/// SHA-256 digest as a lowercase hexadecimal string (64 characters).
///
/// # Errors
///
/// Returns error if CSV serialization fails (e.g. a zero-column table).
pub fn checksum(table: &Table) -> Result<String> {
    let mut hasher = Sha256::new();
    {
        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Necessary)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(DigestWriter {
                hasher: &mut hasher,
            });

        writer.write_record(table.columns())?;
        for row in table.rows() {
            writer.write_record(row.iter().map(|cell| cell.canonical()))?;
        }
        writer.flush()?;
    }

    let digest = hasher.finalize();
    Ok(format!("{digest:x}"))
}

/// Hash algorithm identifier recorded in metadata.
pub const HASH_ALGORITHM: &str = "SHA-256";
