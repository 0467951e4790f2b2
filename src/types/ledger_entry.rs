//! Ledger entry types
//!
//! Ledger entries are immutable once written. Corrections are recorded as
//! new offsetting entries, never as edits.

use super::account::{AccountId, BalanceSnapshot};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Ledger entry identifier
///
/// Allocated from a store-wide sequence, so entries of one account are
/// strictly increasing in commit order.
pub type EntryId = u64;

/// Kind of business event an entry belongs to
///
/// Callers pick the type for credits, debits and transfers; stream entries
/// are always tagged by the engine. Unknown strings are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum ReferenceType {
    Deposit,
    Withdrawal,
    Payment,
    Refund,
    Transfer,
    TransferOut,
    TransferIn,
    StreamHold,
    StreamTopUp,
    StreamPayout,
    StreamRelease,
    Adjustment,
    Other(String),
}

impl ReferenceType {
    pub fn as_str(&self) -> &str {
        match self {
            ReferenceType::Deposit => "deposit",
            ReferenceType::Withdrawal => "withdrawal",
            ReferenceType::Payment => "payment",
            ReferenceType::Refund => "refund",
            ReferenceType::Transfer => "transfer",
            ReferenceType::TransferOut => "transfer_out",
            ReferenceType::TransferIn => "transfer_in",
            ReferenceType::StreamHold => "stream_hold",
            ReferenceType::StreamTopUp => "stream_top_up",
            ReferenceType::StreamPayout => "stream_payout",
            ReferenceType::StreamRelease => "stream_release",
            ReferenceType::Adjustment => "adjustment",
            ReferenceType::Other(other) => other,
        }
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ReferenceType {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "deposit" => ReferenceType::Deposit,
            "withdrawal" => ReferenceType::Withdrawal,
            "payment" => ReferenceType::Payment,
            "refund" => ReferenceType::Refund,
            "transfer" => ReferenceType::Transfer,
            "transfer_out" => ReferenceType::TransferOut,
            "transfer_in" => ReferenceType::TransferIn,
            "stream_hold" => ReferenceType::StreamHold,
            "stream_top_up" => ReferenceType::StreamTopUp,
            "stream_payout" => ReferenceType::StreamPayout,
            "stream_release" => ReferenceType::StreamRelease,
            "adjustment" => ReferenceType::Adjustment,
            _ => ReferenceType::Other(value.trim().to_string()),
        }
    }
}

impl FromStr for ReferenceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ReferenceType::from(s))
    }
}

impl From<ReferenceType> for String {
    fn from(value: ReferenceType) -> Self {
        value.as_str().to_string()
    }
}

/// One immutable balance-affecting event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account_id: AccountId,

    /// Signed change of `total` (positive = credit, negative = debit)
    ///
    /// Summing `amount` over all entries of an account reproduces its total.
    pub amount: Decimal,

    /// Signed change of `in_streams`
    ///
    /// Holds move funds between buckets without changing `total`, so they are
    /// recorded here with `amount == 0`.
    pub in_streams_delta: Decimal,

    pub reference_type: ReferenceType,

    /// Correlates the entries of one logical operation
    pub reference_id: String,

    pub description: String,

    /// Balances right after this entry was applied
    pub balance_after: BalanceSnapshot,

    pub created_at: DateTime<Utc>,
}

/// An entry waiting to be appended by a unit of work
///
/// The store assigns the id, the timestamp and the resulting snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub amount: Decimal,
    pub in_streams_delta: Decimal,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub description: String,
}

impl Posting {
    /// A posting that changes `total` and `available` only
    pub fn settled(
        amount: Decimal,
        reference_type: ReferenceType,
        reference_id: &str,
        description: &str,
    ) -> Self {
        Posting {
            amount,
            in_streams_delta: Decimal::ZERO,
            reference_type,
            reference_id: reference_id.to_string(),
            description: description.to_string(),
        }
    }

    /// A posting against the stream bucket
    pub fn stream(
        amount: Decimal,
        in_streams_delta: Decimal,
        reference_type: ReferenceType,
        stream_id: &str,
        description: String,
    ) -> Self {
        Posting {
            amount,
            in_streams_delta,
            reference_type,
            reference_id: stream_id.to_string(),
            description,
        }
    }
}
