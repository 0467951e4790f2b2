//! Thread-safe in-memory ledger store
//!
//! Rows live in a `DashMap`, each behind its own `Mutex`. The map is only
//! used to find a row; the `Mutex` is the unit of mutual exclusion, so a unit
//! of work may hold two rows at once without holding two map shards.
//!
//! Rows are never removed. Closing an account marks its row closed and keeps
//! the ledger, the released holds and the stream ids they reserved.
//!
//! # Locking
//!
//! - Single-account units of work lock one row.
//! - Pair units of work lock both rows in ascending id order, so two
//!   opposing transfers cannot deadlock.
//! - A poisoned row lock is reported as [`LedgerError::StoreUnavailable`].

use super::{AccountRow, AccountTxn, LedgerStore, PendingWrite};
use crate::types::{Account, AccountId, LedgerError, StreamId};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

type Slot = Arc<Mutex<AccountRow>>;

/// Thread-safe, process-local ledger store
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    rows: DashMap<AccountId, Slot>,

    /// Which account owns each stream id ever held
    streams: DashMap<StreamId, AccountId>,

    /// Next ledger entry id
    sequence: AtomicU64,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            streams: DashMap::new(),
            sequence: AtomicU64::new(1),
        }
    }

    fn slot(&self, account_id: &str) -> Result<Slot, LedgerError> {
        self.rows
            .get(account_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LedgerError::account_not_found(account_id))
    }

    fn lock<'s>(
        slot: &'s Mutex<AccountRow>,
        account_id: &str,
    ) -> Result<MutexGuard<'s, AccountRow>, LedgerError> {
        slot.lock().map_err(|_| {
            LedgerError::store_unavailable(format!("row lock for account {} is poisoned", account_id))
        })
    }

    /// Refuse units of work on a closed row
    fn writable(row: &AccountRow) -> Result<&AccountRow, LedgerError> {
        if row.is_closed() {
            return Err(LedgerError::account_closed(&row.account.id));
        }
        Ok(row)
    }

    /// Claim the stream ids a write introduces
    ///
    /// Either every id is claimed or none is.
    fn reserve_streams(&self, writes: &[&PendingWrite]) -> Result<(), LedgerError> {
        let mut claimed: Vec<StreamId> = Vec::new();

        for write in writes {
            for stream_id in write.new_streams() {
                // the entry guard must be gone before rolling back claims
                let taken = match self.streams.entry(stream_id.clone()) {
                    Entry::Occupied(_) => true,
                    Entry::Vacant(slot) => {
                        slot.insert(write.account_id().to_string());
                        false
                    }
                };
                if taken {
                    for id in &claimed {
                        self.streams.remove(id);
                    }
                    return Err(LedgerError::stream_already_held(stream_id));
                }
                claimed.push(stream_id.clone());
            }
        }

        Ok(())
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn insert_account(&self, account_id: &str) -> Result<Account, LedgerError> {
        let slot = match self.rows.entry(account_id.to_string()) {
            Entry::Vacant(vacant) => {
                let row = AccountRow::new(account_id);
                let account = row.account.clone();
                vacant.insert(Arc::new(Mutex::new(row)));
                debug!(account_id, "account row inserted");
                return Ok(account);
            }
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
        };

        let mut row = Self::lock(&slot, account_id)?;
        if !row.is_closed() {
            return Err(LedgerError::account_already_exists(account_id));
        }
        row.closed_at = None;
        debug!(account_id, entries = row.entries.len(), "account row reopened");
        Ok(row.account.clone())
    }

    fn close_account<F>(&self, account_id: &str, check: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&AccountRow) -> Result<(), LedgerError>,
    {
        let slot = self.slot(account_id)?;
        let mut row = Self::lock(&slot, account_id)?;

        check(Self::writable(&row)?)?;

        row.closed_at = Some(Utc::now());
        debug!(account_id, "account row closed");
        Ok(())
    }

    fn read<T, F>(&self, account_id: &str, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&AccountRow) -> T,
    {
        let slot = self.slot(account_id)?;
        let row = Self::lock(&slot, account_id)?;
        Ok(f(&row))
    }

    fn account_ids(&self) -> Result<Vec<AccountId>, LedgerError> {
        let mut ids: Vec<AccountId> = self.rows.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    fn locate_stream(&self, stream_id: &str) -> Result<Option<AccountId>, LedgerError> {
        Ok(self.streams.get(stream_id).map(|entry| entry.value().clone()))
    }

    fn transact<T, F>(&self, account_id: &str, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut AccountTxn<'_>) -> Result<T, LedgerError>,
    {
        let slot = self.slot(account_id)?;
        let mut row = Self::lock(&slot, account_id)?;

        let (output, write) = {
            let mut txn = AccountTxn::begin(Self::writable(&row)?, &self.sequence);
            let output = f(&mut txn)?;
            (output, txn.commit()?)
        };

        self.reserve_streams(&[&write])?;
        write.apply_to(&mut row);
        Ok(output)
    }

    fn transact_pair<T, F>(&self, first: &str, second: &str, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut AccountTxn<'_>, &mut AccountTxn<'_>) -> Result<T, LedgerError>,
    {
        if first == second {
            return Err(LedgerError::SelfTransfer {
                account_id: first.to_string(),
            });
        }

        let first_slot = self.slot(first)?;
        let second_slot = self.slot(second)?;

        let (mut first_row, mut second_row) = if first < second {
            let a = Self::lock(&first_slot, first)?;
            let b = Self::lock(&second_slot, second)?;
            (a, b)
        } else {
            let b = Self::lock(&second_slot, second)?;
            let a = Self::lock(&first_slot, first)?;
            (a, b)
        };

        let (output, first_write, second_write) = {
            let mut first_txn = AccountTxn::begin(Self::writable(&first_row)?, &self.sequence);
            let mut second_txn = AccountTxn::begin(Self::writable(&second_row)?, &self.sequence);
            let output = f(&mut first_txn, &mut second_txn)?;
            (output, first_txn.commit()?, second_txn.commit()?)
        };

        self.reserve_streams(&[&first_write, &second_write])?;
        first_write.apply_to(&mut first_row);
        second_write.apply_to(&mut second_row);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HoldStatus, Posting, ReferenceType, StreamHold};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::thread;

    fn credit(txn: &mut AccountTxn<'_>, amount: Decimal) {
        txn.account_mut().total += amount;
        txn.account_mut().available += amount;
        txn.append(Posting::settled(amount, ReferenceType::Deposit, "dep", "deposit"));
    }

    #[test]
    fn test_insert_account_rejects_duplicates() {
        let store = InMemoryLedgerStore::new();

        store.insert_account("acc").unwrap();
        let err = store.insert_account("acc").unwrap_err();

        assert_eq!(err, LedgerError::account_already_exists("acc"));
    }

    #[test]
    fn test_read_missing_account() {
        let store = InMemoryLedgerStore::new();
        let err = store.read("missing", |row| row.account.total).unwrap_err();
        assert_eq!(err, LedgerError::account_not_found("missing"));
    }

    #[test]
    fn test_transact_commits_on_success() {
        let store = InMemoryLedgerStore::new();
        store.insert_account("acc").unwrap();

        store
            .transact("acc", |txn| {
                credit(txn, dec!(40));
                Ok(())
            })
            .unwrap();

        let (total, entries) = store
            .read("acc", |row| (row.account.total, row.entries.len()))
            .unwrap();
        assert_eq!(total, dec!(40));
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_transact_discards_on_closure_error() {
        let store = InMemoryLedgerStore::new();
        store.insert_account("acc").unwrap();

        let result: Result<(), LedgerError> = store.transact("acc", |txn| {
            credit(txn, dec!(40));
            Err(LedgerError::account_not_found("other"))
        });

        assert!(result.is_err());
        let (total, entries) = store
            .read("acc", |row| (row.account.total, row.entries.len()))
            .unwrap();
        assert_eq!(total, Decimal::ZERO);
        assert_eq!(entries, 0);
    }

    #[test]
    fn test_transact_pair_discards_both_sides_on_error() {
        let store = InMemoryLedgerStore::new();
        store.insert_account("a").unwrap();
        store.insert_account("b").unwrap();

        let result: Result<(), LedgerError> = store.transact_pair("a", "b", |a, b| {
            credit(a, dec!(10));
            credit(b, dec!(10));
            // unbalanced write on the second row fails the commit
            b.account_mut().total += dec!(1);
            Ok(())
        });

        assert!(matches!(result, Err(LedgerError::InvariantViolation { .. })));
        assert_eq!(store.read("a", |row| row.account.total).unwrap(), Decimal::ZERO);
        assert_eq!(store.read("b", |row| row.account.total).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_transact_pair_missing_second_account() {
        let store = InMemoryLedgerStore::new();
        store.insert_account("a").unwrap();

        let result: Result<(), LedgerError> = store.transact_pair("a", "ghost", |_, _| Ok(()));

        assert_eq!(result.unwrap_err(), LedgerError::account_not_found("ghost"));
    }

    #[test]
    fn test_stream_ids_are_unique_across_accounts() {
        let store = InMemoryLedgerStore::new();
        store.insert_account("a").unwrap();
        store.insert_account("b").unwrap();

        fn hold(txn: &mut AccountTxn<'_>) -> Result<(), LedgerError> {
            credit(txn, dec!(10));
            let account_id = txn.account_id().to_string();
            let account = txn.account_mut();
            account.available -= dec!(10);
            account.in_streams += dec!(10);
            txn.put_hold(StreamHold::new("s1", &account_id, dec!(10), Decimal::ZERO));
            txn.append(Posting::stream(
                Decimal::ZERO,
                dec!(10),
                ReferenceType::StreamHold,
                "s1",
                "hold".to_string(),
            ));
            Ok(())
        }

        store.transact("a", hold).unwrap();
        let err = store.transact("b", hold).unwrap_err();

        assert_eq!(err, LedgerError::stream_already_held("s1"));
        assert_eq!(store.locate_stream("s1").unwrap(), Some("a".to_string()));
        assert_eq!(store.read("b", |row| row.account.total).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_close_account_respects_check() {
        let store = InMemoryLedgerStore::new();
        store.insert_account("acc").unwrap();

        let err = store
            .close_account("acc", |_| Err(LedgerError::account_not_found("nope")))
            .unwrap_err();
        assert_eq!(err, LedgerError::account_not_found("nope"));
        assert!(!store.read("acc", |row| row.is_closed()).unwrap());

        store.close_account("acc", |_| Ok(())).unwrap();
        assert!(store.read("acc", |row| row.is_closed()).unwrap());
        assert_eq!(store.account_ids().unwrap(), vec!["acc".to_string()]);
        assert_eq!(
            store.close_account("acc", |_| Ok(())).unwrap_err(),
            LedgerError::account_closed("acc")
        );
    }

    #[test]
    fn test_closed_row_keeps_ledger_and_rejects_writes() {
        let store = InMemoryLedgerStore::new();
        store.insert_account("acc").unwrap();
        store.insert_account("other").unwrap();
        store
            .transact("acc", |txn| {
                credit(txn, dec!(5));
                Ok(())
            })
            .unwrap();
        store
            .transact("acc", |txn| {
                txn.account_mut().total -= dec!(5);
                txn.account_mut().available -= dec!(5);
                txn.append(Posting::settled(dec!(-5), ReferenceType::Withdrawal, "w", "out"));
                Ok(())
            })
            .unwrap();

        store.close_account("acc", |_| Ok(())).unwrap();

        assert_eq!(store.read("acc", |row| row.entries.len()).unwrap(), 2);
        let err = store
            .transact("acc", |txn| {
                credit(txn, dec!(1));
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err, LedgerError::account_closed("acc"));
        let err = store
            .transact_pair("other", "acc", |_, _| Ok(()))
            .unwrap_err();
        assert_eq!(err, LedgerError::account_closed("acc"));
    }

    #[test]
    fn test_reopen_keeps_history_and_stream_ids() {
        let store = InMemoryLedgerStore::new();
        store.insert_account("acc").unwrap();
        store
            .transact("acc", |txn| {
                credit(txn, dec!(5));
                let mut hold = StreamHold::new("s1", "acc", Decimal::ZERO, Decimal::ZERO);
                hold.status = HoldStatus::Released;
                txn.put_hold(hold);
                Ok(())
            })
            .unwrap();
        store
            .transact("acc", |txn| {
                txn.account_mut().total -= dec!(5);
                txn.account_mut().available -= dec!(5);
                txn.append(Posting::settled(dec!(-5), ReferenceType::Withdrawal, "w", "out"));
                Ok(())
            })
            .unwrap();
        store.close_account("acc", |_| Ok(())).unwrap();

        let reopened = store.insert_account("acc").unwrap();

        assert_eq!(reopened.total, Decimal::ZERO);
        assert!(!store.read("acc", |row| row.is_closed()).unwrap());
        assert_eq!(store.read("acc", |row| row.entries.len()).unwrap(), 2);
        assert_eq!(store.locate_stream("s1").unwrap(), Some("acc".to_string()));
        assert_eq!(
            store.insert_account("acc").unwrap_err(),
            LedgerError::account_already_exists("acc")
        );
    }

    #[test]
    fn test_poisoned_row_reports_store_unavailable() {
        let store = Arc::new(InMemoryLedgerStore::new());
        store.insert_account("acc").unwrap();

        let clone = Arc::clone(&store);
        let _ = thread::spawn(move || {
            let _: Result<(), LedgerError> = clone.transact("acc", |_| panic!("crash mid-write"));
        })
        .join();

        let err = store.read("acc", |row| row.account.total).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_opposing_pair_units_do_not_deadlock() {
        let store = Arc::new(InMemoryLedgerStore::new());
        store.insert_account("a").unwrap();
        store.insert_account("b").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let (from, to) = if i % 2 == 0 { ("a", "b") } else { ("b", "a") };
                    for _ in 0..100 {
                        store
                            .transact_pair(from, to, |x, y| {
                                credit(x, dec!(1));
                                credit(y, dec!(1));
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.read("a", |row| row.account.total).unwrap(), dec!(800));
        assert_eq!(store.read("b", |row| row.account.total).unwrap(), dec!(800));
    }
}
