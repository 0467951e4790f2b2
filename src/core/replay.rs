//! Ledger replay
//!
//! Rebuilds an account's balances from its ledger alone, independent of the
//! live balance columns, and compares the two. Used as a consistency check,
//! never as a source of truth for writes.

use crate::store::AccountRow;
use crate::types::{AccountId, BalanceSnapshot, LedgerEntry, LedgerError};
use rust_decimal::Decimal;

/// Outcome of replaying one account
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub account_id: AccountId,
    pub entries: usize,
    pub live: BalanceSnapshot,
    pub replayed: BalanceSnapshot,
}

/// Sum the entries, oldest first, into a balance snapshot
pub fn replay(entries: &[LedgerEntry]) -> BalanceSnapshot {
    let total: Decimal = entries.iter().map(|entry| entry.amount).sum();
    let in_streams: Decimal = entries.iter().map(|entry| entry.in_streams_delta).sum();

    BalanceSnapshot {
        total,
        available: total - in_streams,
        in_streams,
    }
}

/// Replay a committed row and check it against its live balances
///
/// Besides the final sums, every entry's recorded `balance_after` must match
/// the running replay, and entry ids must be strictly increasing.
pub fn verify_row(row: &AccountRow) -> Result<ReplayReport, LedgerError> {
    let account_id = &row.account.id;
    let live = row.account.snapshot();

    let mut running = BalanceSnapshot::default();
    let mut last_id: Option<u64> = None;
    for entry in &row.entries {
        if last_id.is_some_and(|last| entry.id <= last) {
            return Err(LedgerError::invariant_violation(
                account_id,
                format!("entry {} is out of order", entry.id),
            ));
        }
        last_id = Some(entry.id);

        running.total += entry.amount;
        running.in_streams += entry.in_streams_delta;
        running.available = running.total - running.in_streams;
        if running != entry.balance_after {
            return Err(LedgerError::ReplayMismatch {
                account_id: account_id.clone(),
                live: entry.balance_after,
                replayed: running,
            });
        }
    }

    let replayed = replay(&row.entries);
    if replayed != live {
        return Err(LedgerError::ReplayMismatch {
            account_id: account_id.clone(),
            live,
            replayed,
        });
    }

    Ok(ReplayReport {
        account_id: account_id.clone(),
        entries: row.entries.len(),
        live,
        replayed,
    })
}
