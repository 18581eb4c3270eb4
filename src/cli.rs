use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use tablekeeper::backup::BackupStore;
use tablekeeper::config::{load_config, AppConfig, DEFAULT_CONFIG_FILE};
use tablekeeper::error::{Result, TablekeeperError};
use tablekeeper::fetch::HttpTableFetcher;
use tablekeeper::integrity::IntegrityGuard;
use tablekeeper::runner::{DatasetOutcome, Runner};
use tablekeeper::table::Table;
use tablekeeper::workbook;

#[derive(Parser)]
#[command(
    name = "tablekeeper",
    about = "Scrapes HTML tables into spreadsheets guarded by CSV backups"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch all configured datasets and update spreadsheets + backups
    Run,
    /// List known datasets, their integrity status and backups
    List,
    /// Verify a spreadsheet file against its trusted backups
    Check {
        /// Spreadsheet file to check (e.g. gov_registry.xlsx)
        #[arg(short, long)]
        file: String,
    },
    /// Restore a spreadsheet file from its CSV backups
    Restore {
        /// Spreadsheet file to restore
        #[arg(short, long)]
        file: String,

        /// Restore even when the file currently verifies as valid
        #[arg(long)]
        force: bool,
    },
    /// Snapshot a spreadsheet file's current sheets into CSV backups
    Backup {
        /// Spreadsheet file to snapshot
        #[arg(short, long)]
        file: String,
    },
}

pub fn run_command(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli.config)?;
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => handle_run(&config),
        Commands::List => handle_list(&config),
        Commands::Check { file } => handle_check(&config, &file),
        Commands::Restore { file, force } => handle_restore(&config, &file, force),
        Commands::Backup { file } => handle_backup(&config, &file),
    }
}

fn handle_run(config: &AppConfig) -> Result<ExitCode> {
    if config.datasets.is_empty() {
        return Err(TablekeeperError::Config(
            "No datasets configured; add entries to the config file".to_owned(),
        ));
    }

    let fetcher = HttpTableFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
    let runner = Runner::new(config, fetcher)?;
    let summaries = runner.run();

    let mut failed = 0usize;
    for summary in &summaries {
        match &summary.outcome {
            DatasetOutcome::Updated {
                sheets,
                total_rows,
                new_rows,
            } => println!(
                "{}: updated ({sheets} sheet(s), {total_rows} rows, {new_rows} new)",
                summary.dataset
            ),
            DatasetOutcome::Restored => {
                println!("{}: spreadsheet restored from backup", summary.dataset);
            }
            DatasetOutcome::Unchanged => println!("{}: unchanged", summary.dataset),
            DatasetOutcome::Skipped { reason } => {
                println!("{}: skipped ({reason})", summary.dataset);
            }
            DatasetOutcome::Failed { error } => {
                failed += 1;
                println!("{}: FAILED ({error})", summary.dataset);
            }
        }
    }
    println!(
        "Processed {} dataset(s), {} failed",
        summaries.len(),
        failed
    );

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn handle_list(config: &AppConfig) -> Result<ExitCode> {
    let store = BackupStore::open(&config.data_dir)?;
    let guard = IntegrityGuard::new(&store, config.treat_unverified_as_valid);
    let entries = store.list_backups()?;

    if entries.is_empty() {
        println!("No datasets recorded yet.");
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{:<20} {:<10} {:<18} {:<17} {}",
        "Dataset", "Sheet", "Checksum", "Last Updated", "Status"
    );
    println!("{}", "-".repeat(78));

    // Each workbook is read once, not once per sheet.
    let mut workbooks: HashMap<String, Option<Vec<(String, Table)>>> = HashMap::new();
    for entry in &entries {
        let sheets = workbooks
            .entry(entry.dataset.clone())
            .or_insert_with(|| workbook::read_sheets(&store.workbook_path(&entry.dataset)).ok());

        let status = match sheets.as_ref() {
            None => "✗ Unreadable",
            Some(sheets) => match sheets.iter().find(|(name, _)| name == &entry.sheet) {
                None => "✗ Missing",
                Some((_, table)) => {
                    if guard
                        .check_report(&entry.dataset, &entry.sheet, table)?
                        .passed
                    {
                        "✓ Valid"
                    } else {
                        "⚠ Modified"
                    }
                }
            },
        };

        println!(
            "{:<20} {:<10} {:<18} {:<17} {status}",
            entry.dataset,
            entry.sheet,
            &entry.checksum[..16.min(entry.checksum.len())],
            entry.updated_utc.format("%Y-%m-%d %H:%M").to_string()
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_check(config: &AppConfig, file: &str) -> Result<ExitCode> {
    let store = BackupStore::open(&config.data_dir)?;
    let guard = IntegrityGuard::new(&store, config.treat_unverified_as_valid);
    let dataset = store.dataset_for_file(file)?;
    let workbook_path = store.workbook_path(&dataset);

    let sheets = workbook::read_sheets(&workbook_path)?;
    let record = store.get_metadata(&dataset)?;

    let mut first_failed: Option<String> = None;
    for (sheet, table) in &sheets {
        let report = guard.check_report(&dataset, sheet, table)?;
        println!("{}\n", report.format_cli());
        if !report.passed && first_failed.is_none() {
            first_failed = Some(sheet.clone());
        }
    }

    // A sheet recorded in metadata but absent from the workbook is a
    // failure even though there is nothing to hash.
    for sheet in &record.sheet_names {
        if !sheets.iter().any(|(name, _)| name == sheet) {
            println!("✗ FAIL: Sheet '{sheet}' is recorded in metadata but missing from the file\n");
            if first_failed.is_none() {
                first_failed = Some(sheet.clone());
            }
        }
    }

    match first_failed {
        None => {
            println!("Integrity check passed for {file}");
            Ok(ExitCode::SUCCESS)
        }
        Some(sheet) => Err(TablekeeperError::ChecksumMismatch { dataset, sheet }),
    }
}

fn handle_restore(config: &AppConfig, file: &str, force: bool) -> Result<ExitCode> {
    let store = BackupStore::open(&config.data_dir)?;
    let guard = IntegrityGuard::new(&store, config.treat_unverified_as_valid);
    let dataset = store.dataset_for_file(file)?;
    let record = store.get_metadata(&dataset)?;

    if record.is_empty() {
        return Err(TablekeeperError::Config(format!(
            "No backups recorded for '{dataset}'; nothing to restore from"
        )));
    }

    let workbook_path = store.workbook_path(&dataset);
    let current = workbook::read_sheets(&workbook_path).ok();

    let mut restored_any = force;
    let mut sheets = Vec::with_capacity(record.sheet_names.len());
    for sheet in &record.sheet_names {
        let table = if force {
            guard.force_restore(&dataset, sheet)?
        } else {
            let in_workbook = current
                .as_ref()
                .and_then(|s| s.iter().find(|(name, _)| name == sheet))
                .map(|(_, table)| table.clone());
            match in_workbook {
                Some(table) => {
                    let (table, restored) = guard.ensure_valid(&dataset, sheet, table)?;
                    restored_any |= restored;
                    table
                }
                None => {
                    restored_any = true;
                    guard.force_restore(&dataset, sheet)?
                }
            }
        };
        sheets.push((sheet.clone(), table));
    }

    if !restored_any {
        println!("File integrity is valid. Use --force to restore anyway.");
        return Ok(ExitCode::SUCCESS);
    }

    workbook::write_sheets(&workbook_path, &sheets)?;
    println!(
        "Restored {} sheet(s) of {file} from CSV backup",
        sheets.len()
    );
    Ok(ExitCode::SUCCESS)
}

fn handle_backup(config: &AppConfig, file: &str) -> Result<ExitCode> {
    let store = BackupStore::open(&config.data_dir)?;
    let dataset = store.dataset_for_file(file)?;
    let workbook_path = store.workbook_path(&dataset);

    let sheets = workbook::read_sheets(&workbook_path)?;
    for (sheet, table) in &sheets {
        let digest = store.write_backup(&dataset, sheet, table)?;
        println!("Backed up sheet '{sheet}' ({})", &digest[..16]);
    }
    println!("Updated metadata for {file}");
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }
}
