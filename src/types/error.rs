//! Error types for the stream ledger
//!
//! This module defines every error the ledger core and its command-file
//! driver can return. Store-level failures are translated into this enum;
//! nothing is swallowed on the way to the caller.
//!
//! # Error Categories
//!
//! - **Not found**: unknown account or stream
//! - **Business rejections**: insufficient balance, holds in the wrong state
//! - **Invalid input**: non-positive amounts, buffers larger than the hold
//! - **Store failures**: transient, safe to retry the whole operation
//! - **Integrity failures**: a write or a replay that would break an invariant
//! - **File I/O and CSV errors**: only raised by the command-file driver

use super::account::BalanceSnapshot;
use super::stream_hold::HoldStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the ledger
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// File not found at the specified path
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found
        path: String,
    },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error occurred
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },

    /// The referenced account does not exist
    #[error("Account {account_id} not found")]
    AccountNotFound { account_id: String },

    /// An account with this id was already opened
    #[error("Account {account_id} already exists")]
    AccountAlreadyExists { account_id: String },

    /// The account was closed; its ledger can still be read
    #[error("Account {account_id} is closed")]
    AccountClosed { account_id: String },

    /// The account still owns funds or has an active hold
    #[error("Account {account_id} cannot be closed: total {total}, active holds {active_holds}")]
    AccountNotEmpty {
        account_id: String,
        total: Decimal,
        active_holds: usize,
    },

    /// No hold exists for the stream
    #[error("No hold found for stream {stream_id}")]
    HoldNotFound { stream_id: String },

    /// The stream id already has a hold (active or released)
    #[error("Stream {stream_id} already has a hold")]
    StreamAlreadyHeld { stream_id: String },

    /// The hold is not in a state that allows the operation
    #[error("Stream hold {stream_id} is {status}, cannot {operation}")]
    InvalidState {
        stream_id: String,
        status: HoldStatus,
        operation: String,
    },

    /// Available funds do not cover the requested amount
    ///
    /// A business-rule rejection, surfaced verbatim to the end user.
    #[error(
        "Insufficient balance on account {account_id}: available {available}, requested {requested}"
    )]
    InsufficientBalance {
        account_id: String,
        available: Decimal,
        requested: Decimal,
    },

    /// The hold does not have enough outstanding funds for a payout
    #[error("Insufficient hold on stream {stream_id}: outstanding {outstanding}, requested {requested}")]
    InsufficientHold {
        stream_id: String,
        outstanding: Decimal,
        requested: Decimal,
    },

    /// Amount is not positive or carries too many decimal places
    #[error("Invalid amount {amount} for {operation}: {reason}")]
    InvalidAmount {
        operation: String,
        amount: Decimal,
        reason: String,
    },

    /// The buffer portion is larger than the held amount
    #[error("Invalid buffer {buffer} for hold of {amount}")]
    InvalidBuffer { amount: Decimal, buffer: Decimal },

    /// Released amounts do not add up to what the hold still reserves
    #[error("Release of {released} does not match outstanding {outstanding} on stream {stream_id}")]
    ReleaseMismatch {
        stream_id: String,
        outstanding: Decimal,
        released: Decimal,
    },

    /// Sender and receiver are the same account
    #[error("Cannot transfer from account {account_id} to itself")]
    SelfTransfer { account_id: String },

    /// Arithmetic overflow would occur
    #[error("Arithmetic overflow in {operation} for account {account_id}")]
    ArithmeticOverflow {
        operation: String,
        account_id: String,
    },

    /// A write would have broken a balance invariant; nothing was applied
    #[error("Invariant violation on account {account_id}: {message}")]
    InvariantViolation { account_id: String, message: String },

    /// Replaying the ledger does not reproduce the live balances
    #[error("Ledger replay mismatch on account {account_id}: live {live:?}, replayed {replayed:?}")]
    ReplayMismatch {
        account_id: String,
        live: BalanceSnapshot,
        replayed: BalanceSnapshot,
    },

    /// The store could not run the unit of work; retrying is safe
    #[error("Ledger store unavailable: {message}")]
    StoreUnavailable { message: String },
}

/// Coarse classification used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InsufficientBalance,
    InvalidState,
    InvalidInput,
    Unavailable,
    Integrity,
}

// Conversion from io::Error to LedgerError
impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::IoError {
            message: error.to_string(),
        }
    }
}

// Conversion from csv::Error to LedgerError
impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        LedgerError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AccountNotFound { .. }
            | LedgerError::HoldNotFound { .. }
            | LedgerError::FileNotFound { .. } => ErrorKind::NotFound,
            LedgerError::InsufficientBalance { .. } | LedgerError::InsufficientHold { .. } => {
                ErrorKind::InsufficientBalance
            }
            LedgerError::InvalidState { .. }
            | LedgerError::StreamAlreadyHeld { .. }
            | LedgerError::AccountAlreadyExists { .. }
            | LedgerError::AccountClosed { .. }
            | LedgerError::AccountNotEmpty { .. } => ErrorKind::InvalidState,
            LedgerError::InvalidAmount { .. }
            | LedgerError::InvalidBuffer { .. }
            | LedgerError::ReleaseMismatch { .. }
            | LedgerError::SelfTransfer { .. }
            | LedgerError::ArithmeticOverflow { .. }
            | LedgerError::ParseError { .. } => ErrorKind::InvalidInput,
            LedgerError::StoreUnavailable { .. } | LedgerError::IoError { .. } => {
                ErrorKind::Unavailable
            }
            LedgerError::InvariantViolation { .. } | LedgerError::ReplayMismatch { .. } => {
                ErrorKind::Integrity
            }
        }
    }

    /// Whether the whole operation may be retried as-is
    ///
    /// Every operation is one unit of work, so a failed store call either
    /// committed nothing or was never attempted.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }
}

// Helper functions for creating common errors

impl LedgerError {
    /// Create an AccountNotFound error
    pub fn account_not_found(account_id: &str) -> Self {
        LedgerError::AccountNotFound {
            account_id: account_id.to_string(),
        }
    }

    /// Create an AccountAlreadyExists error
    pub fn account_already_exists(account_id: &str) -> Self {
        LedgerError::AccountAlreadyExists {
            account_id: account_id.to_string(),
        }
    }

    /// Create an AccountClosed error
    pub fn account_closed(account_id: &str) -> Self {
        LedgerError::AccountClosed {
            account_id: account_id.to_string(),
        }
    }

    /// Create a HoldNotFound error
    pub fn hold_not_found(stream_id: &str) -> Self {
        LedgerError::HoldNotFound {
            stream_id: stream_id.to_string(),
        }
    }

    /// Create a StreamAlreadyHeld error
    pub fn stream_already_held(stream_id: &str) -> Self {
        LedgerError::StreamAlreadyHeld {
            stream_id: stream_id.to_string(),
        }
    }

    /// Create an InvalidState error
    pub fn invalid_state(stream_id: &str, status: HoldStatus, operation: &str) -> Self {
        LedgerError::InvalidState {
            stream_id: stream_id.to_string(),
            status,
            operation: operation.to_string(),
        }
    }

    /// Create an InsufficientBalance error
    pub fn insufficient_balance(account_id: &str, available: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientBalance {
            account_id: account_id.to_string(),
            available,
            requested,
        }
    }

    /// Create an InsufficientHold error
    pub fn insufficient_hold(stream_id: &str, outstanding: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientHold {
            stream_id: stream_id.to_string(),
            outstanding,
            requested,
        }
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(operation: &str, amount: Decimal, reason: &str) -> Self {
        LedgerError::InvalidAmount {
            operation: operation.to_string(),
            amount,
            reason: reason.to_string(),
        }
    }

    /// Create a ReleaseMismatch error
    pub fn release_mismatch(stream_id: &str, outstanding: Decimal, released: Decimal) -> Self {
        LedgerError::ReleaseMismatch {
            stream_id: stream_id.to_string(),
            outstanding,
            released,
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, account_id: &str) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
            account_id: account_id.to_string(),
        }
    }

    /// Create an InvariantViolation error
    pub fn invariant_violation(account_id: &str, message: String) -> Self {
        LedgerError::InvariantViolation {
            account_id: account_id.to_string(),
            message,
        }
    }

    /// Create a StoreUnavailable error
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        LedgerError::StoreUnavailable {
            message: message.into(),
        }
    }
}
