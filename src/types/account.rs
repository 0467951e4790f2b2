//! Account-related types for the stream ledger
//!
//! This module defines the Account row and the balance snapshot that is
//! stamped onto every ledger entry.

use rust_decimal::Decimal;
use serde::Serialize;

/// Account identifier
///
/// Issued by the onboarding service; the ledger treats it as opaque.
pub type AccountId = String;

/// Account balance row
///
/// Every field is owned by the balance engine. The store rejects any write
/// that would break `total == available + in_streams`.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    /// The account this row belongs to
    pub id: AccountId,

    /// All settled funds owned by the account
    pub total: Decimal,

    /// Portion of `total` free to spend or withdraw
    pub available: Decimal,

    /// Portion of `total` reserved against active streams
    pub in_streams: Decimal,

    /// Subset of `in_streams` kept as a safety margin, not yet streamed
    pub buffer: Decimal,
}

impl Account {
    /// Create a new account with zero balances
    pub fn new(id: impl Into<AccountId>) -> Self {
        Account {
            id: id.into(),
            total: Decimal::ZERO,
            available: Decimal::ZERO,
            in_streams: Decimal::ZERO,
            buffer: Decimal::ZERO,
        }
    }

    /// Reserved funds that are actively streaming (`in_streams - buffer`)
    pub fn streaming(&self) -> Decimal {
        self.in_streams - self.buffer
    }

    /// Check the balance invariants
    ///
    /// Returns a description of the first broken invariant, if any.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.available < Decimal::ZERO {
            return Err(format!("available is negative ({})", self.available));
        }
        if self.in_streams < Decimal::ZERO {
            return Err(format!("in_streams is negative ({})", self.in_streams));
        }
        if self.buffer < Decimal::ZERO {
            return Err(format!("buffer is negative ({})", self.buffer));
        }
        if self.buffer > self.in_streams {
            return Err(format!(
                "buffer {} exceeds in_streams {}",
                self.buffer, self.in_streams
            ));
        }
        if self.total != self.available + self.in_streams {
            return Err(format!(
                "total {} != available {} + in_streams {}",
                self.total, self.available, self.in_streams
            ));
        }
        Ok(())
    }

    /// Snapshot of the three balance columns
    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            total: self.total,
            available: self.available,
            in_streams: self.in_streams,
        }
    }
}

/// Resulting balances recorded on a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BalanceSnapshot {
    pub total: Decimal,
    pub available: Decimal,
    pub in_streams: Decimal,
}
