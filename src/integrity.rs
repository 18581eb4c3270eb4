//! Integrity Guard: tamper detection and restoration.
//!
//! On every read the guard recomputes a sheet's canonical content checksum
//! and compares it against the baseline in the metadata record. A mismatch
//! means the spreadsheet's protected data cells were edited outside
//! tablekeeper's own write path; the sheet is then restored from its CSV
//! backup. Sheets with no recorded baseline are unverifiable and handled
//! according to a caller-supplied policy.

pub mod guard;

pub use guard::{IntegrityGuard, VerificationReport, Verdict};
