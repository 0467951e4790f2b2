//! Balance column arithmetic
//!
//! Each function moves funds between the columns of one staged account using
//! checked arithmetic. None of them writes a ledger entry; the engine pairs
//! every call with exactly one posting.

use crate::types::{Account, LedgerError};
use rust_decimal::Decimal;

/// Add settled funds: `available` and `total` grow by `amount`
pub fn deposit(account: &mut Account, amount: Decimal, operation: &str) -> Result<(), LedgerError> {
    let new_available = account
        .available
        .checked_add(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow(operation, &account.id))?;

    let new_total = account
        .total
        .checked_add(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow(operation, &account.id))?;

    account.available = new_available;
    account.total = new_total;

    Ok(())
}

/// Remove settled funds: `available` and `total` shrink by `amount`
///
/// # Errors
///
/// * `InsufficientBalance` - `available` is smaller than `amount`
pub fn withdraw(account: &mut Account, amount: Decimal, operation: &str) -> Result<(), LedgerError> {
    if account.available < amount {
        return Err(LedgerError::insufficient_balance(
            &account.id,
            account.available,
            amount,
        ));
    }

    let new_available = account
        .available
        .checked_sub(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow(operation, &account.id))?;

    let new_total = account
        .total
        .checked_sub(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow(operation, &account.id))?;

    account.available = new_available;
    account.total = new_total;

    Ok(())
}

/// Move `amount` from `available` into `in_streams`
///
/// `total` does not change.
pub fn reserve(account: &mut Account, amount: Decimal, operation: &str) -> Result<(), LedgerError> {
    if account.available < amount {
        return Err(LedgerError::insufficient_balance(
            &account.id,
            account.available,
            amount,
        ));
    }

    let new_available = account
        .available
        .checked_sub(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow(operation, &account.id))?;

    let new_in_streams = account
        .in_streams
        .checked_add(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow(operation, &account.id))?;

    account.available = new_available;
    account.in_streams = new_in_streams;

    Ok(())
}

/// Move `amount` from `in_streams` back into `available`
///
/// # Errors
///
/// * `InvariantViolation` - `in_streams` is smaller than `amount`
pub fn unreserve(account: &mut Account, amount: Decimal, operation: &str) -> Result<(), LedgerError> {
    ensure_reserved(account, amount, operation)?;

    let new_in_streams = account
        .in_streams
        .checked_sub(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow(operation, &account.id))?;

    let new_available = account
        .available
        .checked_add(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow(operation, &account.id))?;

    account.in_streams = new_in_streams;
    account.available = new_available;

    Ok(())
}

/// Reserved funds leave the account: `in_streams` and `total` shrink
///
/// # Errors
///
/// * `InvariantViolation` - `in_streams` is smaller than `amount`
pub fn pay_out_reserved(
    account: &mut Account,
    amount: Decimal,
    operation: &str,
) -> Result<(), LedgerError> {
    ensure_reserved(account, amount, operation)?;

    let new_in_streams = account
        .in_streams
        .checked_sub(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow(operation, &account.id))?;

    let new_total = account
        .total
        .checked_sub(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow(operation, &account.id))?;

    account.in_streams = new_in_streams;
    account.total = new_total;

    Ok(())
}

/// Shift the buffer by a signed `delta`
///
/// # Errors
///
/// * `InvariantViolation` - the buffer would go negative
pub fn adjust_buffer(account: &mut Account, delta: Decimal, operation: &str) -> Result<(), LedgerError> {
    let new_buffer = account
        .buffer
        .checked_add(delta)
        .ok_or_else(|| LedgerError::arithmetic_overflow(operation, &account.id))?;

    if new_buffer < Decimal::ZERO {
        return Err(LedgerError::invariant_violation(
            &account.id,
            format!("{} would leave buffer at {}", operation, new_buffer),
        ));
    }

    account.buffer = new_buffer;

    Ok(())
}

// The engine sizes releases from the hold, so a shortfall here means the
// reservation and the holds disagree.
fn ensure_reserved(account: &Account, amount: Decimal, operation: &str) -> Result<(), LedgerError> {
    if account.in_streams < amount {
        return Err(LedgerError::invariant_violation(
            &account.id,
            format!(
                "{} takes {} from in_streams {}",
                operation, amount, account.in_streams
            ),
        ));
    }
    Ok(())
}
