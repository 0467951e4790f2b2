//! Stream ledger CLI
//!
//! Replays a CSV command file against a fresh ledger and prints the result
//! to stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- commands.csv > balances.csv
//! cargo run -- --history alice --limit 20 commands.csv > history.csv
//! cargo run -- --scale 2 --currency EURC --verify commands.csv
//! RUST_LOG=debug cargo run -- commands.csv
//! ```
//!
//! Logs go to stderr (`RUST_LOG`, default `warn`), so stdout stays valid CSV.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (file not found, unknown history account, ledger verification failed, etc.)

use std::process;

use stream_ledger::cli;
use stream_ledger::runner::CommandRunner;
use stream_ledger::LedgerError;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: &cli::CliArgs) -> Result<(), LedgerError> {
    let runner = CommandRunner::in_memory(args.to_ledger_config());
    runner.run_file(&args.input_file)?;

    if args.verify {
        runner.verify_all()?;
    }

    let mut output = std::io::stdout();
    match &args.history {
        Some(account_id) => runner.write_history(account_id, args.limit, &mut output),
        None => runner.write_balances(&mut output),
    }
}

fn main() {
    init_logging();

    let args = cli::parse_args();
    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
