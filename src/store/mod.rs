//! Ledger store abstraction
//!
//! The store owns the durable state: one row per account holding its
//! balances, its stream holds and its append-only ledger. All mutations go
//! through a unit of work ([`LedgerStore::transact`] or
//! [`LedgerStore::transact_pair`]) that:
//!
//! 1. locks the affected account row(s),
//! 2. hands the closure an [`AccountTxn`] staged on top of the committed row,
//! 3. validates the staged state ([`AccountTxn::commit`]),
//! 4. applies everything or nothing.
//!
//! Checks such as "is the balance sufficient" therefore run while the row is
//! locked, in the same unit as the write that depends on them.

pub mod memory;

pub use memory::InMemoryLedgerStore;

use crate::types::{
    Account, AccountId, LedgerEntry, LedgerError, Posting, StreamHold, StreamId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Committed state of one account
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRow {
    pub account: Account,
    pub holds: HashMap<StreamId, StreamHold>,
    /// Append-only, oldest first
    pub entries: Vec<LedgerEntry>,
    /// Set while the account is closed; the row and its ledger are kept
    pub closed_at: Option<DateTime<Utc>>,
}

impl AccountRow {
    pub fn new(account_id: &str) -> Self {
        AccountRow {
            account: Account::new(account_id),
            holds: HashMap::new(),
            entries: Vec::new(),
            closed_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    pub fn active_holds(&self) -> impl Iterator<Item = &StreamHold> {
        self.holds.values().filter(|hold| hold.is_active())
    }
}

/// Transactional storage of account rows
///
/// Implementations must run each closure-based unit of work atomically with
/// respect to every other unit of work touching the same account.
pub trait LedgerStore: Send + Sync {
    /// Create an empty account row, or reopen a closed one
    ///
    /// A reopened row keeps its ledger and its stream ids.
    fn insert_account(&self, account_id: &str) -> Result<Account, LedgerError>;

    /// Mark an account row closed if `check` accepts its committed state
    ///
    /// Nothing is deleted. A closed row rejects units of work with
    /// `AccountClosed` but stays readable.
    fn close_account<F>(&self, account_id: &str, check: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&AccountRow) -> Result<(), LedgerError>;

    /// Run a read-only closure against one consistent snapshot of a row
    ///
    /// Closed rows are readable.
    fn read<T, F>(&self, account_id: &str, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&AccountRow) -> T;

    /// Ids of every account ever opened, closed ones included, sorted
    fn account_ids(&self) -> Result<Vec<AccountId>, LedgerError>;

    /// Account that owns the hold for `stream_id`, if any
    fn locate_stream(&self, stream_id: &str) -> Result<Option<AccountId>, LedgerError>;

    /// Run a unit of work against one account
    fn transact<T, F>(&self, account_id: &str, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut AccountTxn<'_>) -> Result<T, LedgerError>;

    /// Run a unit of work spanning two distinct accounts
    ///
    /// The closure receives the transactions in argument order.
    fn transact_pair<T, F>(&self, first: &str, second: &str, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut AccountTxn<'_>, &mut AccountTxn<'_>) -> Result<T, LedgerError>;
}

/// Staged changes to one account row
///
/// Reads see the staged state layered over the committed row. Nothing is
/// visible to other units of work until the store applies the
/// [`PendingWrite`] returned by [`AccountTxn::commit`].
#[derive(Debug)]
pub struct AccountTxn<'a> {
    committed: &'a AccountRow,
    account: Account,
    holds: HashMap<StreamId, StreamHold>,
    entries: Vec<LedgerEntry>,
    sequence: &'a AtomicU64,
}

impl<'a> AccountTxn<'a> {
    pub fn begin(committed: &'a AccountRow, sequence: &'a AtomicU64) -> Self {
        AccountTxn {
            committed,
            account: committed.account.clone(),
            holds: HashMap::new(),
            entries: Vec::new(),
            sequence,
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account.id
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn account_mut(&mut self) -> &mut Account {
        &mut self.account
    }

    pub fn hold(&self, stream_id: &str) -> Option<&StreamHold> {
        self.holds
            .get(stream_id)
            .or_else(|| self.committed.holds.get(stream_id))
    }

    /// Stage an insert or replacement of a hold
    pub fn put_hold(&mut self, hold: StreamHold) {
        self.holds.insert(hold.stream_id.clone(), hold);
    }

    /// Stage a ledger entry
    ///
    /// Call after mutating the balances: the entry records the staged
    /// balances as its resulting snapshot.
    pub fn append(&mut self, posting: Posting) -> LedgerEntry {
        let entry = LedgerEntry {
            id: self.sequence.fetch_add(1, Ordering::SeqCst),
            account_id: self.account.id.clone(),
            amount: posting.amount,
            in_streams_delta: posting.in_streams_delta,
            reference_type: posting.reference_type,
            reference_id: posting.reference_id,
            description: posting.description,
            balance_after: self.account.snapshot(),
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        entry
    }

    /// Validate the staged state and turn it into a write
    ///
    /// Rejects the unit of work if the balances break an invariant, if the
    /// stream bucket disagrees with the active holds, or if the staged
    /// entries do not account for the balance change.
    pub fn commit(self) -> Result<PendingWrite, LedgerError> {
        let account_id = self.account.id.clone();
        let violation = |message: String| LedgerError::invariant_violation(&account_id, message);

        self.account.check_invariants().map_err(violation)?;

        let mut reserved = Decimal::ZERO;
        let mut buffered = Decimal::ZERO;
        for hold in self.merged_holds() {
            reserved += hold.outstanding();
            buffered += hold.effective_buffer();
        }
        if reserved != self.account.in_streams {
            return Err(violation(format!(
                "in_streams {} != outstanding holds {}",
                self.account.in_streams, reserved
            )));
        }
        if buffered != self.account.buffer {
            return Err(violation(format!(
                "buffer {} != hold buffers {}",
                self.account.buffer, buffered
            )));
        }

        let posted: Decimal = self.entries.iter().map(|entry| entry.amount).sum();
        let posted_streams: Decimal = self.entries.iter().map(|entry| entry.in_streams_delta).sum();
        let before = &self.committed.account;
        if before.total + posted != self.account.total {
            return Err(violation(format!(
                "total moved from {} to {} but entries post {}",
                before.total, self.account.total, posted
            )));
        }
        if before.in_streams + posted_streams != self.account.in_streams {
            return Err(violation(format!(
                "in_streams moved from {} to {} but entries post {}",
                before.in_streams, self.account.in_streams, posted_streams
            )));
        }

        let new_streams = self
            .holds
            .keys()
            .filter(|stream_id| !self.committed.holds.contains_key(*stream_id))
            .cloned()
            .collect();

        Ok(PendingWrite {
            account: self.account,
            holds: self.holds,
            entries: self.entries,
            new_streams,
        })
    }

    fn merged_holds(&self) -> impl Iterator<Item = &StreamHold> {
        self.committed
            .holds
            .values()
            .filter(|hold| !self.holds.contains_key(&hold.stream_id))
            .chain(self.holds.values())
    }
}

/// A validated unit of work, ready to be applied to its row
#[derive(Debug)]
pub struct PendingWrite {
    account: Account,
    holds: HashMap<StreamId, StreamHold>,
    entries: Vec<LedgerEntry>,
    new_streams: Vec<StreamId>,
}

impl PendingWrite {
    pub fn account_id(&self) -> &str {
        &self.account.id
    }

    /// Stream ids this write creates holds for
    pub fn new_streams(&self) -> &[StreamId] {
        &self.new_streams
    }

    pub fn apply_to(self, row: &mut AccountRow) {
        row.account = self.account;
        row.holds.extend(self.holds);
        row.entries.extend(self.entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReferenceType;
    use rust_decimal_macros::dec;

    fn funded_row() -> AccountRow {
        let mut row = AccountRow::new("acc");
        row.account.total = dec!(100);
        row.account.available = dec!(100);
        row
    }

    #[test]
    fn test_commit_accepts_balanced_credit() {
        let row = funded_row();
        let sequence = AtomicU64::new(1);
        let mut txn = AccountTxn::begin(&row, &sequence);

        txn.account_mut().total += dec!(5);
        txn.account_mut().available += dec!(5);
        let entry = txn.append(Posting::settled(dec!(5), ReferenceType::Deposit, "d1", "top up"));

        assert_eq!(entry.id, 1);
        assert_eq!(entry.balance_after.total, dec!(105));

        let write = txn.commit().unwrap();
        let mut row = row.clone();
        write.apply_to(&mut row);

        assert_eq!(row.account.total, dec!(105));
        assert_eq!(row.entries.len(), 1);
    }

    #[test]
    fn test_commit_rejects_balance_change_without_entry() {
        let row = funded_row();
        let sequence = AtomicU64::new(1);
        let mut txn = AccountTxn::begin(&row, &sequence);

        txn.account_mut().total += dec!(5);
        txn.account_mut().available += dec!(5);

        let err = txn.commit().unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation { .. }));
    }

    #[test]
    fn test_commit_rejects_negative_available() {
        let row = funded_row();
        let sequence = AtomicU64::new(1);
        let mut txn = AccountTxn::begin(&row, &sequence);

        txn.account_mut().total -= dec!(150);
        txn.account_mut().available -= dec!(150);
        txn.append(Posting::settled(dec!(-150), ReferenceType::Withdrawal, "w1", "overdraw"));

        let err = txn.commit().unwrap_err();
        assert!(err.to_string().contains("available is negative"));
    }

    #[test]
    fn test_commit_rejects_in_streams_without_hold() {
        let row = funded_row();
        let sequence = AtomicU64::new(1);
        let mut txn = AccountTxn::begin(&row, &sequence);

        txn.account_mut().available -= dec!(30);
        txn.account_mut().in_streams += dec!(30);
        txn.append(Posting::stream(
            Decimal::ZERO,
            dec!(30),
            ReferenceType::StreamHold,
            "s1",
            "hold".to_string(),
        ));

        let err = txn.commit().unwrap_err();
        assert!(err.to_string().contains("outstanding holds"));
    }

    #[test]
    fn test_hold_reads_staged_before_committed() {
        let mut row = funded_row();
        row.holds.insert(
            "s1".to_string(),
            StreamHold::new("s1", "acc", dec!(10), dec!(0)),
        );
        let sequence = AtomicU64::new(1);
        let mut txn = AccountTxn::begin(&row, &sequence);

        assert_eq!(txn.hold("s1").unwrap().amount, dec!(10));

        let mut staged = txn.hold("s1").unwrap().clone();
        staged.amount = dec!(25);
        txn.put_hold(staged);

        assert_eq!(txn.hold("s1").unwrap().amount, dec!(25));
        assert_eq!(row.holds["s1"].amount, dec!(10));
    }
}
