//! Types module
//!
//! Contains core data structures used throughout the ledger.
//! This module organizes types into logical submodules:
//! - `account`: Account rows and balance snapshots
//! - `balance`: The externally visible balance view
//! - `ledger_entry`: Immutable ledger entries and pending postings
//! - `stream_hold`: Funds reserved for payment streams
//! - `error`: Error types for the ledger

pub mod account;
pub mod balance;
pub mod error;
pub mod ledger_entry;
pub mod stream_hold;

pub use account::{Account, AccountId, BalanceSnapshot};
pub use balance::{AccountBalance, InStreamsBalance};
pub use error::{ErrorKind, LedgerError};
pub use ledger_entry::{EntryId, LedgerEntry, Posting, ReferenceType};
pub use stream_hold::{HoldStatus, StreamHold, StreamId};
