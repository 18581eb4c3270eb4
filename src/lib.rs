//! # Tablekeeper - Scraped-Table Persistence with Tamper Detection
//!
//! Tablekeeper scrapes HTML tables from configured web pages and persists
//! them as spreadsheet files, keeping a CSV snapshot of every sheet as the
//! authoritative record. On each run it detects manual edits to a
//! spreadsheet's protected data cells and reverses them from the CSV
//! backup, while carrying user-added columns forward untouched.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tablekeeper::config::AppConfig;
//! use tablekeeper::fetch::HttpTableFetcher;
//! use tablekeeper::runner::Runner;
//! use std::time::Duration;
//!
//! # fn example() -> tablekeeper::error::Result<()> {
//! let config = AppConfig::default();
//! let fetcher = HttpTableFetcher::new(Duration::from_secs(30))?;
//! let runner = Runner::new(&config, fetcher)?;
//! for summary in runner.run() {
//!     println!("{}: {:?}", summary.dataset, summary.outcome);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`table`]: the Table/CellValue data model and canonicalization rules
//! - [`checksum`]: canonical content digests
//! - [`backup`]: CSV snapshots + the shared metadata record
//! - [`integrity`]: tamper detection and restoration
//! - [`reconcile`]: merging fetched rows while preserving user columns
//! - [`workbook`]: multi-sheet xlsx read/write
//! - [`fetch`]: the page-fetch collaborator
//! - [`runner`]: the per-dataset pipeline
//!
//! ## Key Concepts
//!
//! **CSV is ground truth.** The spreadsheet format permits arbitrary
//! cosmetic edits that must not be mistaken for corruption, so checksums
//! are computed over canonical data content and the CSV snapshot is what
//! restoration reads from.
//!
//! **Single-writer model.** One run processes datasets sequentially and no
//! inter-process locking is provided; concurrent invocations against the
//! same data directory are undefined behavior. Callers (e.g. a scheduler)
//! must ensure non-overlapping runs.

#![warn(clippy::all, rust_2018_idioms)]

pub mod backup;
pub mod checksum;
pub mod config;
pub mod error;
pub mod fetch;
pub mod integrity;
pub mod logging;
pub mod reconcile;
pub mod runner;
pub mod table;
pub mod workbook;
