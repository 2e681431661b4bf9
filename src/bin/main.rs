// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use chrono::Duration;
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use reversal_engine_rs::response::{self, DetailMode};
use reversal_engine_rs::{
    AuditEntry, EngineConfig, MemoryStore, ReversalEngine, Transaction, TransactionStatus,
};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Reversal Engine - Process reversal requests against a transaction table
///
/// Loads transactions from a CSV file, processes one JSON reversal payload per
/// line of the requests file and writes one JSON response per line to stdout.
#[derive(Parser, Debug)]
#[command(name = "reversal-engine")]
#[command(about = "Processes reversal requests against a transaction CSV", long_about = None)]
struct Args {
    /// Path to CSV file with transactions
    ///
    /// Expected format: TransactionID,Status,Amount
    #[arg(value_name = "TRANSACTIONS")]
    transactions: PathBuf,

    /// Path to file with one reversal payload per line
    ///
    /// Example: {"TransactionID": "T1", "ReversalAmount": "40.00", "Reason": "duplicate"}
    #[arg(value_name = "REQUESTS")]
    requests: PathBuf,

    /// Seconds after which a PENDING attempt is considered crashed and resumable
    #[arg(
        long,
        default_value_t = EngineConfig::DEFAULT_RECOVERY_THRESHOLD_SECS,
        value_parser = clap::value_parser!(i64).range(0..)
    )]
    recovery_threshold_secs: i64,

    /// Transaction status eligible for reversal (repeatable)
    #[arg(long = "eligible-status", value_name = "STATUS", default_value = "COMPLETED")]
    eligible_statuses: Vec<String>,

    /// Include internal error details in 500 responses
    #[arg(long)]
    development: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write the resulting audit trail as CSV to this file
    #[arg(long, value_name = "FILE")]
    audit_trail: Option<PathBuf>,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        let statuses = self
            .eligible_statuses
            .iter()
            .map(|s| TransactionStatus::from(s.clone()))
            .collect();
        EngineConfig::default()
            .with_eligible_statuses(statuses)
            .with_recovery_threshold(Duration::seconds(self.recovery_threshold_secs))
    }

    fn detail_mode(&self) -> DetailMode {
        if self.development {
            DetailMode::Development
        } else {
            DetailMode::Production
        }
    }
}

/// Logs go to stderr so stdout stays a clean stream of responses.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn open(path: &Path) -> File {
    match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    let store = Arc::new(MemoryStore::new());
    match load_transactions(BufReader::new(open(&args.transactions)), &store) {
        Ok(count) => info!(count, "transactions loaded"),
        Err(e) => {
            error!(error = %e, "failed to read transactions");
            eprintln!("Error reading transactions: {}", e);
            process::exit(1);
        }
    }

    let engine = ReversalEngine::new(store.clone(), args.engine_config());
    let requests = BufReader::new(open(&args.requests));
    if let Err(e) = process_requests(&engine, requests, io::stdout().lock(), args.detail_mode()) {
        eprintln!("Error processing requests: {}", e);
        process::exit(1);
    }

    if let Some(path) = &args.audit_trail {
        let result = File::create(path)
            .map_err(csv::Error::from)
            .and_then(|file| write_audit_trail(&store, file));
        if let Err(e) = result {
            eprintln!("Error writing audit trail '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

/// Loads transactions from a CSV reader into the store.
///
/// # CSV Format
///
/// ```csv
/// TransactionID,Status,Amount
/// T1,COMPLETED,100.00
/// T2, pending ,50.00
/// ```
///
/// Malformed rows are skipped with a warning. Returns the number of rows loaded.
///
/// # Errors
///
/// Returns a CSV error if the header cannot be read.
pub fn load_transactions<R: Read>(reader: R, store: &MemoryStore) -> Result<usize, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);
    rdr.headers()?;

    let mut loaded = 0;
    for (line, result) in rdr.deserialize::<Transaction>().enumerate() {
        match result {
            Ok(transaction) => {
                store.insert_transaction(transaction);
                loaded += 1;
            }
            Err(e) => warn!(row = line + 1, error = %e, "skipping malformed transaction row"),
        }
    }
    Ok(loaded)
}

/// Runs every non-blank line of `reader` through the engine and writes one
/// `{"status": .., "body": ..}` JSON line per request to `writer`.
///
/// Returns the number of requests processed.
pub fn process_requests<R: BufRead, W: Write>(
    engine: &ReversalEngine,
    reader: R,
    mut writer: W,
    mode: DetailMode,
) -> io::Result<usize> {
    let mut processed = 0;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = response::handle(engine, &line, mode);
        serde_json::to_writer(&mut writer, &response)?;
        writeln!(writer)?;
        processed += 1;
    }
    writer.flush()?;
    Ok(processed)
}

/// Flat CSV view of an [`AuditEntry`].
#[derive(Debug, Serialize)]
struct AuditRow<'a> {
    #[serde(rename = "AuditID")]
    audit_id: &'a str,
    #[serde(rename = "TransactionID")]
    transaction_id: &'a str,
    #[serde(rename = "Action")]
    action: &'static str,
    #[serde(rename = "Status")]
    status: &'static str,
    #[serde(rename = "Initiator")]
    initiator: &'a str,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "UpdatedAt")]
    updated_at: String,
    #[serde(rename = "ReversalAmount")]
    reversal_amount: String,
    #[serde(rename = "Reason")]
    reason: &'a str,
    #[serde(rename = "Failure")]
    failure: &'a str,
}

impl<'a> From<&'a AuditEntry> for AuditRow<'a> {
    fn from(entry: &'a AuditEntry) -> Self {
        Self {
            audit_id: entry.audit_id.as_str(),
            transaction_id: entry.transaction_id.as_str(),
            action: "REVERSAL",
            status: entry.status.as_str(),
            initiator: &entry.initiator,
            timestamp: entry.timestamp.to_rfc3339(),
            updated_at: entry.updated_at.to_rfc3339(),
            reversal_amount: entry.metadata.reversal_amount.to_string(),
            reason: &entry.metadata.reason,
            failure: entry.failure.as_ref().map_or("", |f| f.message.as_str()),
        }
    }
}

/// Writes the audit trail, in append order, as CSV.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_audit_trail<W: Write>(store: &MemoryStore, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for entry in store.audit_entries() {
        wtr.serialize(AuditRow::from(&entry))?;
    }
    wtr.flush()?;
    Ok(())
}
