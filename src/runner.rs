//! Command-file runner
//!
//! Replays a CSV command file against a fresh in-memory ledger and renders
//! the result. Orchestration only:
//! - parsing is delegated to `CommandReader`
//! - every balance change goes through `BalanceEngine` or `StreamHoldManager`
//! - rendering is delegated to `csv_format`
//!
//! A command that fails (malformed row or rejected operation) is logged and
//! skipped; the run continues with the next one. Only file and output errors
//! abort the run.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::core::{BalanceEngine, ReplayReport, StreamHoldManager};
use crate::io::{write_balances_csv, write_history_csv, CommandReader, LedgerCommand};
use crate::store::{InMemoryLedgerStore, LedgerStore};
use crate::types::LedgerError;

/// Counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub applied: usize,
    pub rejected: usize,
    pub malformed: usize,
}

/// Applies commands to one ledger
#[derive(Debug)]
pub struct CommandRunner<S> {
    engine: BalanceEngine<S>,
    streams: StreamHoldManager<S>,
}

impl CommandRunner<InMemoryLedgerStore> {
    /// Runner over an empty in-memory store
    pub fn in_memory(config: LedgerConfig) -> Self {
        Self::new(BalanceEngine::new(Arc::new(InMemoryLedgerStore::new()), config))
    }
}

impl<S: LedgerStore> CommandRunner<S> {
    pub fn new(engine: BalanceEngine<S>) -> Self {
        let streams = StreamHoldManager::new(engine.clone());
        CommandRunner { engine, streams }
    }

    pub fn engine(&self) -> &BalanceEngine<S> {
        &self.engine
    }

    /// Apply a single command
    pub fn apply(&self, command: LedgerCommand) -> Result<(), LedgerError> {
        match command {
            LedgerCommand::Open { account_id } => self.engine.open_account(&account_id).map(drop),
            LedgerCommand::Close { account_id } => self.engine.close_account(&account_id),
            LedgerCommand::Credit {
                account_id,
                amount,
                reference_type,
                reference_id,
            } => self
                .engine
                .credit(&account_id, amount, reference_type, &reference_id, "")
                .map(drop),
            LedgerCommand::Debit {
                account_id,
                amount,
                reference_type,
                reference_id,
            } => self
                .engine
                .debit(&account_id, amount, reference_type, &reference_id, "")
                .map(drop),
            LedgerCommand::Transfer {
                from,
                to,
                amount,
                reference_type,
                reference_id,
            } => self
                .engine
                .transfer(&from, &to, amount, reference_type, &reference_id, "")
                .map(drop),
            LedgerCommand::Release {
                account_id,
                stream_id,
                streamed_amount,
                return_buffer,
            } => self
                .engine
                .release_from_stream(&account_id, &stream_id, streamed_amount, return_buffer)
                .map(drop),
            LedgerCommand::Stream(event) => self.streams.handle(event).map(drop),
        }
    }

    /// Apply every command of a file, skipping the ones that fail
    ///
    /// # Errors
    ///
    /// Only when the file cannot be opened.
    pub fn run_file(&self, input_path: &Path) -> Result<RunSummary, LedgerError> {
        let reader = CommandReader::new(input_path)?;
        let mut summary = RunSummary::default();

        for result in reader {
            match result {
                Ok(command) => match self.apply(command) {
                    Ok(()) => summary.applied += 1,
                    Err(e) => {
                        warn!(error = %e, "command rejected");
                        summary.rejected += 1;
                    }
                },
                Err(e) => {
                    warn!(error = %e, "malformed command");
                    summary.malformed += 1;
                }
            }
        }

        info!(
            applied = summary.applied,
            rejected = summary.rejected,
            malformed = summary.malformed,
            "command file processed"
        );
        Ok(summary)
    }

    /// Write every account's balance as CSV
    pub fn write_balances(&self, output: &mut dyn Write) -> Result<(), LedgerError> {
        let balances = self.engine.query().list_balances()?;
        write_balances_csv(&balances, output)
    }

    /// Write the most recent `limit` entries of one account as CSV,
    /// stamped with the configured currency
    pub fn write_history(
        &self,
        account_id: &str,
        limit: usize,
        output: &mut dyn Write,
    ) -> Result<(), LedgerError> {
        let entries = self.engine.get_ledger_history(account_id, limit, 0, None)?;
        write_history_csv(&entries, &self.engine.config().currency, output)
    }

    /// Replay every account's ledger, closed accounts included, stopping at
    /// the first divergence
    pub fn verify_all(&self) -> Result<Vec<ReplayReport>, LedgerError> {
        self.engine
            .query()
            .account_ids()?
            .iter()
            .map(|account_id| self.engine.verify_account(account_id))
            .collect()
    }
}
