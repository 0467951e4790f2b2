//! Balance engine
//!
//! The only component allowed to change balances. Every public operation is
//! exactly one unit of work on the store: its checks run against the locked
//! row, its balance change and its ledger entry commit together, and a
//! failure leaves nothing behind.
//!
//! The engine enforces business rules such as:
//! - Amounts are positive and fit the configured precision
//! - Debits and holds never take more than `available`
//! - A stream hold moves through `active -> released` exactly once
//! - Released amounts account for everything the hold still reserves

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use super::balance_ops;
use super::query::BalanceQuery;
use super::replay::ReplayReport;
use crate::config::LedgerConfig;
use crate::store::{AccountTxn, LedgerStore};
use crate::types::{
    Account, AccountBalance, HoldStatus, LedgerEntry, LedgerError, Posting, ReferenceType,
    StreamHold,
};

/// Both legs of a committed transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
}

/// Account balance engine
///
/// Cheap to clone; clones share the same store.
#[derive(Debug)]
pub struct BalanceEngine<S> {
    store: Arc<S>,
    query: BalanceQuery<S>,
    config: LedgerConfig,
}

impl<S> Clone for BalanceEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            query: self.query.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: LedgerStore> BalanceEngine<S> {
    /// Create an engine on top of an injected store
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        let query = BalanceQuery::new(Arc::clone(&store), &config);
        BalanceEngine {
            store,
            query,
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Read-only view over the same store
    pub fn query(&self) -> &BalanceQuery<S> {
        &self.query
    }

    /// Open an account with zero balances
    ///
    /// Opening a closed account reopens it with its previous ledger.
    ///
    /// # Errors
    ///
    /// * `AccountAlreadyExists` - the id is taken by an open account
    #[instrument(skip(self))]
    pub fn open_account(&self, account_id: &str) -> Result<Account, LedgerError> {
        let account = self
            .store
            .insert_account(account_id)
            .inspect_err(|e| warn!(error = %e, "open rejected"))?;
        info!("account opened");
        Ok(account)
    }

    /// Close an account that owns nothing
    ///
    /// The ledger and the stream ids of a closed account are kept: history
    /// and reference lookups still work, and reopening the id resumes the
    /// same ledger.
    ///
    /// # Errors
    ///
    /// * `AccountNotFound` - the account does not exist
    /// * `AccountClosed` - the account is already closed
    /// * `AccountNotEmpty` - `total` is not zero or a hold is still active
    #[instrument(skip(self))]
    pub fn close_account(&self, account_id: &str) -> Result<(), LedgerError> {
        self.store
            .close_account(account_id, |row| {
                let active_holds = row.active_holds().count();
                if !row.account.total.is_zero() || active_holds > 0 {
                    return Err(LedgerError::AccountNotEmpty {
                        account_id: row.account.id.clone(),
                        total: row.account.total,
                        active_holds,
                    });
                }
                Ok(())
            })
            .inspect_err(|e| warn!(error = %e, "close rejected"))?;
        info!("account closed");
        Ok(())
    }

    pub fn get_balance(&self, account_id: &str) -> Result<AccountBalance, LedgerError> {
        self.query.get_balance(account_id)
    }

    /// Add settled funds to an account
    ///
    /// Writes one entry with a positive amount under the caller's
    /// reference type.
    #[instrument(skip(self, reference_type, description), fields(%amount))]
    pub fn credit(
        &self,
        account_id: &str,
        amount: Decimal,
        reference_type: ReferenceType,
        reference_id: &str,
        description: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        self.validate_amount("credit", amount)?;

        self.store
            .transact(account_id, |txn: &mut AccountTxn<'_>| {
                balance_ops::deposit(txn.account_mut(), amount, "credit")?;
                Ok(txn.append(Posting::settled(
                    amount,
                    reference_type,
                    reference_id,
                    description,
                )))
            })
            .inspect(|entry| debug!(entry_id = entry.id, "credit committed"))
            .inspect_err(|e| warn!(error = %e, "credit rejected"))
    }

    /// Remove settled funds from an account
    ///
    /// # Errors
    ///
    /// * `InsufficientBalance` - `available` is smaller than `amount`; the
    ///   check runs inside the same unit of work as the decrement
    #[instrument(skip(self, reference_type, description), fields(%amount))]
    pub fn debit(
        &self,
        account_id: &str,
        amount: Decimal,
        reference_type: ReferenceType,
        reference_id: &str,
        description: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        self.validate_amount("debit", amount)?;

        self.store
            .transact(account_id, |txn: &mut AccountTxn<'_>| {
                balance_ops::withdraw(txn.account_mut(), amount, "debit")?;
                Ok(txn.append(Posting::settled(
                    -amount,
                    reference_type,
                    reference_id,
                    description,
                )))
            })
            .inspect(|entry| debug!(entry_id = entry.id, "debit committed"))
            .inspect_err(|e| warn!(error = %e, "debit rejected"))
    }

    /// Reserve funds for a new stream
    ///
    /// Moves `amount` from `available` to `in_streams`, of which
    /// `buffer_amount` counts as buffer. `total` does not change.
    ///
    /// # Errors
    ///
    /// * `InvalidBuffer` - `buffer_amount` is larger than `amount`
    /// * `StreamAlreadyHeld` - the stream id was held before, on any account
    /// * `InsufficientBalance` - `available` is smaller than `amount`
    #[instrument(skip(self), fields(%amount, %buffer_amount))]
    pub fn hold_for_stream(
        &self,
        account_id: &str,
        stream_id: &str,
        amount: Decimal,
        buffer_amount: Decimal,
    ) -> Result<StreamHold, LedgerError> {
        self.validate_amount("hold", amount)?;
        self.validate_buffer(amount, buffer_amount)?;

        self.store
            .transact(account_id, |txn: &mut AccountTxn<'_>| {
                if txn.hold(stream_id).is_some() {
                    return Err(LedgerError::stream_already_held(stream_id));
                }

                let account = txn.account_mut();
                balance_ops::reserve(account, amount, "hold")?;
                balance_ops::adjust_buffer(account, buffer_amount, "hold")?;

                let hold = StreamHold::new(stream_id, account_id, amount, buffer_amount);
                txn.put_hold(hold.clone());
                txn.append(Posting::stream(
                    Decimal::ZERO,
                    amount,
                    ReferenceType::StreamHold,
                    stream_id,
                    format!("hold {} (buffer {}) for stream {}", amount, buffer_amount, stream_id),
                ));
                Ok(hold)
            })
            .inspect(|_| debug!("stream hold committed"))
            .inspect_err(|e| warn!(error = %e, "stream hold rejected"))
    }

    /// Grow an active hold
    ///
    /// `buffer_amount` of the new funds is added to the hold's buffer.
    #[instrument(skip(self), fields(%amount, %buffer_amount))]
    pub fn top_up_hold(
        &self,
        account_id: &str,
        stream_id: &str,
        amount: Decimal,
        buffer_amount: Decimal,
    ) -> Result<StreamHold, LedgerError> {
        self.validate_amount("top up", amount)?;
        self.validate_buffer(amount, buffer_amount)?;

        self.store
            .transact(account_id, |txn: &mut AccountTxn<'_>| {
                let mut hold = active_hold(txn, stream_id, "top up")?;
                let buffer_before = hold.effective_buffer();

                hold.amount = hold
                    .amount
                    .checked_add(amount)
                    .ok_or_else(|| LedgerError::arithmetic_overflow("top up", account_id))?;
                hold.buffer = hold
                    .buffer
                    .checked_add(buffer_amount)
                    .ok_or_else(|| LedgerError::arithmetic_overflow("top up", account_id))?;

                let account = txn.account_mut();
                balance_ops::reserve(account, amount, "top up")?;
                balance_ops::adjust_buffer(
                    account,
                    hold.effective_buffer() - buffer_before,
                    "top up",
                )?;

                txn.put_hold(hold.clone());
                txn.append(Posting::stream(
                    Decimal::ZERO,
                    amount,
                    ReferenceType::StreamTopUp,
                    stream_id,
                    format!("top up {} (buffer {}) for stream {}", amount, buffer_amount, stream_id),
                ));
                Ok(hold)
            })
            .inspect(|_| debug!("stream top up committed"))
            .inspect_err(|e| warn!(error = %e, "stream top up rejected"))
    }

    /// Record funds paid out by an active stream
    ///
    /// The payout leaves the account: `total` and `in_streams` both shrink.
    /// The streaming portion is consumed before the buffer.
    ///
    /// # Errors
    ///
    /// * `InsufficientHold` - `amount` exceeds what the hold still reserves
    #[instrument(skip(self), fields(%amount))]
    pub fn record_stream_payout(
        &self,
        account_id: &str,
        stream_id: &str,
        amount: Decimal,
        reference_id: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        self.validate_amount("payout", amount)?;

        self.store
            .transact(account_id, |txn: &mut AccountTxn<'_>| {
                let mut hold = active_hold(txn, stream_id, "pay out")?;
                let outstanding = hold.outstanding();
                if amount > outstanding {
                    return Err(LedgerError::insufficient_hold(stream_id, outstanding, amount));
                }

                let buffer_before = hold.effective_buffer();
                hold.streamed += amount;

                let account = txn.account_mut();
                balance_ops::pay_out_reserved(account, amount, "payout")?;
                balance_ops::adjust_buffer(
                    account,
                    hold.effective_buffer() - buffer_before,
                    "payout",
                )?;

                txn.put_hold(hold);
                Ok(txn.append(Posting {
                    amount: -amount,
                    in_streams_delta: -amount,
                    reference_type: ReferenceType::StreamPayout,
                    reference_id: reference_id.to_string(),
                    description: format!("payout on stream {}", stream_id),
                }))
            })
            .inspect(|entry| debug!(entry_id = entry.id, "stream payout committed"))
            .inspect_err(|e| warn!(error = %e, "stream payout rejected"))
    }

    /// Close an active hold
    ///
    /// `streamed_amount` leaves the account and `return_buffer` goes back to
    /// `available`. Together they must equal the hold's outstanding amount.
    ///
    /// # Errors
    ///
    /// * `HoldNotFound` - the account has no hold for the stream
    /// * `InvalidState` - the hold was already released
    /// * `ReleaseMismatch` - the two amounts do not add up to the outstanding
    #[instrument(skip(self), fields(%streamed_amount, %return_buffer))]
    pub fn release_from_stream(
        &self,
        account_id: &str,
        stream_id: &str,
        streamed_amount: Decimal,
        return_buffer: Decimal,
    ) -> Result<StreamHold, LedgerError> {
        self.validate_non_negative("release", streamed_amount)?;
        self.validate_non_negative("release", return_buffer)?;

        self.store
            .transact(account_id, |txn: &mut AccountTxn<'_>| {
                let mut hold = active_hold(txn, stream_id, "release")?;
                let outstanding = hold.outstanding();
                let released = streamed_amount
                    .checked_add(return_buffer)
                    .ok_or_else(|| LedgerError::arithmetic_overflow("release", account_id))?;
                if released != outstanding {
                    return Err(LedgerError::release_mismatch(stream_id, outstanding, released));
                }

                let account = txn.account_mut();
                balance_ops::pay_out_reserved(account, streamed_amount, "release")?;
                balance_ops::unreserve(account, return_buffer, "release")?;
                balance_ops::adjust_buffer(account, -hold.effective_buffer(), "release")?;

                hold.streamed += streamed_amount;
                hold.status = HoldStatus::Released;
                hold.released_at = Some(Utc::now());

                txn.put_hold(hold.clone());
                txn.append(Posting::stream(
                    -streamed_amount,
                    -outstanding,
                    ReferenceType::StreamRelease,
                    stream_id,
                    format!(
                        "release stream {}: streamed {}, returned {}",
                        stream_id, streamed_amount, return_buffer
                    ),
                ));
                Ok(hold)
            })
            .inspect(|_| debug!("stream release committed"))
            .inspect_err(|e| warn!(error = %e, "stream release rejected"))
    }

    /// Move settled funds between two accounts
    ///
    /// Both legs commit in one unit of work or neither does. Each leg is
    /// recorded under the caller's reference type and reference id.
    ///
    /// # Errors
    ///
    /// * `SelfTransfer` - `from` and `to` are the same account
    /// * `AccountNotFound` - either account is missing; nothing is written
    /// * `InsufficientBalance` - the sender's `available` is too small
    #[instrument(skip(self, reference_type, description), fields(%amount))]
    pub fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        reference_type: ReferenceType,
        reference_id: &str,
        description: &str,
    ) -> Result<TransferReceipt, LedgerError> {
        self.validate_amount("transfer", amount)?;
        if from == to {
            let err = LedgerError::SelfTransfer {
                account_id: from.to_string(),
            };
            warn!(error = %err, "transfer rejected");
            return Err(err);
        }

        self.store
            .transact_pair(
                from,
                to,
                |sender: &mut AccountTxn<'_>, receiver: &mut AccountTxn<'_>| {
                    balance_ops::withdraw(sender.account_mut(), amount, "transfer")?;
                    let debit = sender.append(Posting::settled(
                        -amount,
                        reference_type.clone(),
                        reference_id,
                        description,
                    ));

                    balance_ops::deposit(receiver.account_mut(), amount, "transfer")?;
                    let credit = receiver.append(Posting::settled(
                        amount,
                        reference_type,
                        reference_id,
                        description,
                    ));

                    Ok(TransferReceipt { debit, credit })
                },
            )
            .inspect(|receipt| {
                debug!(
                    debit_id = receipt.debit.id,
                    credit_id = receipt.credit.id,
                    "transfer committed"
                )
            })
            .inspect_err(|e| warn!(error = %e, "transfer rejected"))
    }

    pub fn get_ledger_history(
        &self,
        account_id: &str,
        limit: usize,
        offset: usize,
        reference_type: Option<&ReferenceType>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.query
            .get_ledger_history(account_id, limit, offset, reference_type)
    }

    pub fn find_by_reference(
        &self,
        account_id: &str,
        reference_id: &str,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.query.find_by_reference(account_id, reference_id)
    }

    pub fn find_hold(&self, stream_id: &str) -> Result<StreamHold, LedgerError> {
        self.query.find_hold(stream_id)
    }

    #[instrument(skip(self))]
    pub fn verify_account(&self, account_id: &str) -> Result<ReplayReport, LedgerError> {
        self.query
            .verify_account(account_id)
            .inspect_err(|e| warn!(error = %e, "ledger verification failed"))
    }

    fn validate_amount(&self, operation: &str, amount: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(operation, amount, "must be positive"));
        }
        self.validate_scale(operation, amount)
    }

    fn validate_non_negative(&self, operation: &str, amount: Decimal) -> Result<(), LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::invalid_amount(operation, amount, "must not be negative"));
        }
        self.validate_scale(operation, amount)
    }

    fn validate_scale(&self, operation: &str, amount: Decimal) -> Result<(), LedgerError> {
        if !self.config.fits_scale(amount) {
            return Err(LedgerError::invalid_amount(
                operation,
                amount,
                &format!("more than {} decimal places", self.config.scale),
            ));
        }
        Ok(())
    }

    fn validate_buffer(&self, amount: Decimal, buffer_amount: Decimal) -> Result<(), LedgerError> {
        self.validate_non_negative("buffer", buffer_amount)?;
        if buffer_amount > amount {
            return Err(LedgerError::InvalidBuffer {
                amount,
                buffer: buffer_amount,
            });
        }
        Ok(())
    }
}

/// Clone of the account's hold for `stream_id`, if it is still active
fn active_hold(
    txn: &AccountTxn<'_>,
    stream_id: &str,
    operation: &str,
) -> Result<StreamHold, LedgerError> {
    let hold = txn
        .hold(stream_id)
        .ok_or_else(|| LedgerError::hold_not_found(stream_id))?;
    if !hold.is_active() {
        return Err(LedgerError::invalid_state(stream_id, hold.status, operation));
    }
    Ok(hold.clone())
}
