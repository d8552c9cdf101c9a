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

use atm_sim_rs::{
    Account, Atm, AtmError, AtmId, BalanceGuard, ConcurrencyGate, ProcessorPool, Rendezvous,
    SessionRequest, SessionResult, SessionRunner,
};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// ATM Simulator - run concurrent sessions against a shared account
///
/// Submits a batch of transactions to a bounded worker pool and prints one
/// CSV row per session result to stdout. Without an input file the built-in
/// demonstration batch runs.
#[derive(Parser, Debug)]
#[command(name = "atm-sim-rs")]
#[command(about = "Simulates concurrent ATM sessions against a shared account", long_about = None)]
struct Args {
    /// Path to CSV file with transactions
    ///
    /// Expected format: type,amount
    /// Example: cargo run -- transactions.csv > sessions.csv
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Number of the shared demo account
    #[arg(long, default_value = "1234567890")]
    account: String,

    /// Opening balance of the demo account
    #[arg(long, default_value_t = 1000)]
    balance: i64,

    /// Number of physical machines serving the batch
    #[arg(long, default_value_t = 2)]
    machines: u32,

    /// Number of processor slots shared by all machines
    #[arg(long, default_value_t = ProcessorPool::DEFAULT_SLOTS)]
    processors: usize,

    /// Number of sessions admitted concurrently
    #[arg(long, default_value_t = ConcurrencyGate::DEFAULT_CAPACITY)]
    gate: usize,

    /// Worker threads running the batch
    #[arg(long, default_value_t = 5)]
    workers: usize,

    /// Add a rendezvous checkpoint sized to the gate
    #[arg(long)]
    rendezvous: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Read the batch from the input file, or fall back to the built-in one.
    let transactions = match &args.input {
        Some(path) => {
            let file = match File::open(path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Error opening file '{}': {}", path.display(), e);
                    process::exit(1);
                }
            };
            match parse_transactions(BufReader::new(file)) {
                Ok(transactions) => transactions,
                Err(e) => {
                    eprintln!("Error reading transactions: {}", e);
                    process::exit(1);
                }
            }
        }
        None => demo_batch(),
    };

    let results = match run_sessions(&args, transactions) {
        Ok(results) => results,
        Err(e) => {
            eprintln!("Error running sessions: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_results(&results, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, amount`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    kind: String,
    amount: i64,
}

/// The built-in demonstration batch.
///
/// Five transactions against a 1000 opening balance that end at 1300 in
/// every interleaving.
fn demo_batch() -> Vec<(String, i64)> {
    vec![
        ("withdraw".to_owned(), 200),
        ("deposit".to_owned(), 500),
        ("withdraw".to_owned(), 300),
        ("withdraw".to_owned(), 100),
        ("deposit".to_owned(), 400),
    ]
}

/// Reads `(kind, amount)` pairs from a CSV reader.
///
/// Malformed rows are skipped; unknown kinds are kept and will surface as
/// failed sessions in the output.
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
fn parse_transactions<R: Read>(reader: R) -> Result<Vec<(String, i64)>, csv::Error> {
    let mut transactions = Vec::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " deposit "
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => transactions.push((record.kind, record.amount)),
            Err(e) => {
                // Skip malformed rows
                debug!("skipping malformed row: {}", e);
                continue;
            }
        }
    }

    Ok(transactions)
}

/// Wires up the shared guard, pool, gate and machines, then runs the batch.
///
/// # Errors
///
/// Returns [`AtmError::InvalidAccountNumber`] if the configured account
/// number is malformed.
fn run_sessions(
    args: &Args,
    transactions: Vec<(String, i64)>,
) -> Result<Vec<SessionResult>, AtmError> {
    let guard = BalanceGuard::new();
    let pool = Arc::new(ProcessorPool::new(args.processors.max(1)));
    let gate = Arc::new(ConcurrencyGate::new(args.gate.max(1)));
    let account = Arc::new(Account::new(&args.account, args.balance, guard.clone())?);

    let machines: Vec<Arc<Atm>> = (1..=args.machines.max(1))
        .map(|id| Arc::new(Atm::new(AtmId(id), Arc::clone(&pool), guard.clone())))
        .collect();

    // Round-robin requests across machines; they all share the same pool
    // and guard, so the spread only affects the labels in the output.
    let requests: Vec<SessionRequest> = transactions
        .into_iter()
        .enumerate()
        .map(|(i, (kind, amount))| SessionRequest {
            kind,
            amount,
            account: Arc::clone(&account),
            atm: Arc::clone(&machines[i % machines.len()]),
        })
        .collect();

    let mut runner = SessionRunner::new(Arc::clone(&gate));
    if args.rendezvous {
        let cohort = Rendezvous::cohort_for(&gate, requests.len());
        runner = runner
            .with_rendezvous(Arc::new(Rendezvous::new(cohort)))
            .with_rendezvous_timeout(Duration::from_secs(1));
    }

    let results = runner.run_batch(requests, args.workers.max(1));
    info!(balance = account.balance(), "final balance");
    Ok(results)
}

/// Writes session results to a CSV writer.
///
/// # CSV Format
///
/// Columns: `session, atm, account, amount, kind, success`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
fn write_results<W: Write>(results: &[SessionResult], writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for result in results {
        wtr.serialize(result)?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn demo_args() -> Args {
        Args {
            input: None,
            account: "1234567890".to_owned(),
            balance: 1000,
            machines: 2,
            processors: 2,
            gate: 2,
            workers: 5,
            rendezvous: false,
        }
    }

    #[test]
    fn parse_simple_batch() {
        let csv = "type,amount\nwithdraw,200\ndeposit,500\n";
        let transactions = parse_transactions(Cursor::new(csv)).unwrap();
        assert_eq!(
            transactions,
            vec![("withdraw".to_owned(), 200), ("deposit".to_owned(), 500)]
        );
    }

    #[test]
    fn parse_with_whitespace() {
        let csv = "type,amount\n deposit , 100 \n";
        let transactions = parse_transactions(Cursor::new(csv)).unwrap();
        assert_eq!(transactions, vec![("deposit".to_owned(), 100)]);
    }

    #[test]
    fn skip_malformed_rows() {
        let csv = "type,amount\nwithdraw,200\ninvalid,not-a-number\ndeposit,500\n";
        let transactions = parse_transactions(Cursor::new(csv)).unwrap();
        assert_eq!(transactions.len(), 2);
    }

    #[test]
    fn unknown_kinds_are_kept_for_the_session_to_fail() {
        let csv = "type,amount\ntransfer,200\n";
        let transactions = parse_transactions(Cursor::new(csv)).unwrap();
        assert_eq!(transactions, vec![("transfer".to_owned(), 200)]);
    }

    #[test]
    fn demo_batch_all_sessions_succeed() {
        let results = run_sessions(&demo_args(), demo_batch()).unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.success));
    }

    #[test]
    fn malformed_account_number_is_an_error() {
        let mut args = demo_args();
        args.account = "12345".to_owned();
        let result = run_sessions(&args, demo_batch());
        assert!(matches!(result, Err(AtmError::InvalidAccountNumber(_))));
    }

    #[test]
    fn rendezvous_batch_still_completes() {
        let mut args = demo_args();
        args.rendezvous = true;
        let results = run_sessions(&args, demo_batch()).unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.success));
    }

    #[test]
    fn results_serialize_with_header() {
        let results = run_sessions(&demo_args(), demo_batch()).unwrap();
        let mut output = Vec::new();
        write_results(&results, &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("session,atm,account,amount,kind,success"));
        assert_eq!(output.lines().count(), 6); // header + five sessions
    }
}
