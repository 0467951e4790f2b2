//! Stream hold types
//!
//! A stream hold reserves funds of one account for one continuous payment
//! stream. Holds are never deleted; a finished stream keeps its row with
//! status `released`.

use super::account::AccountId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Stream identifier, unique across all accounts
pub type StreamId = String;

/// Lifecycle status of a stream hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldStatus {
    Active,
    Released,
}

impl fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldStatus::Active => f.write_str("active"),
            HoldStatus::Released => f.write_str("released"),
        }
    }
}

/// Funds reserved for one stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamHold {
    pub stream_id: StreamId,
    pub account_id: AccountId,

    /// Everything reserved for the stream, top-ups included
    pub amount: Decimal,

    /// Part of `amount` kept as a safety margin
    pub buffer: Decimal,

    /// Paid out by the stream so far
    pub streamed: Decimal,

    pub status: HoldStatus,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl StreamHold {
    pub fn new(stream_id: &str, account_id: &str, amount: Decimal, buffer: Decimal) -> Self {
        StreamHold {
            stream_id: stream_id.to_string(),
            account_id: account_id.to_string(),
            amount,
            buffer,
            streamed: Decimal::ZERO,
            status: HoldStatus::Active,
            created_at: Utc::now(),
            released_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == HoldStatus::Active
    }

    /// Reserved funds not yet paid out
    ///
    /// A released hold has nothing outstanding.
    pub fn outstanding(&self) -> Decimal {
        match self.status {
            HoldStatus::Active => self.amount - self.streamed,
            HoldStatus::Released => Decimal::ZERO,
        }
    }

    /// Portion of the outstanding funds that still counts as buffer
    ///
    /// Payouts consume the streaming portion first; once that is exhausted
    /// they eat into the buffer.
    pub fn effective_buffer(&self) -> Decimal {
        self.buffer.min(self.outstanding())
    }
}
