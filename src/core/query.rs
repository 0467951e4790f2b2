//! Balance query facade
//!
//! Read-only projections over the ledger store. Every method reads a single
//! locked snapshot of one row, so a concurrent write is seen either entirely
//! or not at all. Nothing here mutates and nothing is cached between calls.

use std::sync::Arc;

use super::replay::{self, ReplayReport};
use crate::config::LedgerConfig;
use crate::store::LedgerStore;
use crate::types::{
    AccountBalance, AccountId, LedgerEntry, LedgerError, ReferenceType, StreamHold,
};

/// Read side of the ledger
#[derive(Debug)]
pub struct BalanceQuery<S> {
    store: Arc<S>,
    max_page_size: usize,
}

impl<S> Clone for BalanceQuery<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            max_page_size: self.max_page_size,
        }
    }
}

impl<S: LedgerStore> BalanceQuery<S> {
    pub fn new(store: Arc<S>, config: &LedgerConfig) -> Self {
        Self {
            store,
            max_page_size: config.max_page_size,
        }
    }

    /// Current balance of one account
    ///
    /// # Errors
    ///
    /// * `AccountNotFound` - the account does not exist
    /// * `AccountClosed` - the account is closed
    pub fn get_balance(&self, account_id: &str) -> Result<AccountBalance, LedgerError> {
        self.store.read(account_id, |row| {
            if row.is_closed() {
                return Err(LedgerError::account_closed(account_id));
            }
            Ok(AccountBalance::from(&row.account))
        })?
    }

    /// Balances of every open account, sorted by account id
    pub fn list_balances(&self) -> Result<Vec<AccountBalance>, LedgerError> {
        let mut balances = Vec::new();
        for account_id in self.store.account_ids()? {
            match self.get_balance(&account_id) {
                Ok(balance) => balances.push(balance),
                Err(LedgerError::AccountClosed { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(balances)
    }

    /// Every account id, closed accounts included
    pub fn account_ids(&self) -> Result<Vec<AccountId>, LedgerError> {
        self.store.account_ids()
    }

    /// One page of an account's ledger, most recent first
    ///
    /// `limit` is capped at the configured maximum page size. When a
    /// `reference_type` is given, `offset` counts matching entries only.
    pub fn get_ledger_history(
        &self,
        account_id: &str,
        limit: usize,
        offset: usize,
        reference_type: Option<&ReferenceType>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let limit = limit.min(self.max_page_size);

        self.store.read(account_id, |row| {
            row.entries
                .iter()
                .rev()
                .filter(|entry| reference_type.is_none_or(|kind| &entry.reference_type == kind))
                .skip(offset)
                .take(limit)
                .cloned()
                .collect()
        })
    }

    /// Entries written under one reference id, oldest first
    ///
    /// Lets a caller whose request timed out find out whether it committed.
    pub fn find_by_reference(
        &self,
        account_id: &str,
        reference_id: &str,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.store.read(account_id, |row| {
            row.entries
                .iter()
                .filter(|entry| entry.reference_id == reference_id)
                .cloned()
                .collect()
        })
    }

    /// The hold for a stream, whichever account owns it
    pub fn find_hold(&self, stream_id: &str) -> Result<StreamHold, LedgerError> {
        let account_id = self
            .store
            .locate_stream(stream_id)?
            .ok_or_else(|| LedgerError::hold_not_found(stream_id))?;

        match self
            .store
            .read(&account_id, |row| row.holds.get(stream_id).cloned())
        {
            Ok(Some(hold)) => Ok(hold),
            Ok(None) | Err(LedgerError::AccountNotFound { .. }) => {
                Err(LedgerError::hold_not_found(stream_id))
            }
            Err(e) => Err(e),
        }
    }

    /// Active holds of one account, sorted by stream id
    pub fn active_holds(&self, account_id: &str) -> Result<Vec<StreamHold>, LedgerError> {
        self.store.read(account_id, |row| {
            let mut holds: Vec<StreamHold> = row.active_holds().cloned().collect();
            holds.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
            holds
        })
    }

    /// Replay an account's ledger and compare it with the live balances
    pub fn verify_account(&self, account_id: &str) -> Result<ReplayReport, LedgerError> {
        self.store.read(account_id, replay::verify_row)?
    }
}
