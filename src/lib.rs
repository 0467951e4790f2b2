//! Stream Ledger Library
//! # Overview
//!
//! The account balance and ledger engine of a payments platform: balances
//! split into available and stream-reserved funds, the fund-hold lifecycle of
//! continuous payment streams, atomic transfers, and an append-only ledger
//! from which every balance can be rebuilt.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Account, LedgerEntry, StreamHold, errors)
//! - [`config`] - Ledger configuration (currency, precision, page size)
//! - [`store`] - Transactional storage trait and the in-memory store
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - Every balance-changing operation
//!   - [`core::stream_manager`] - Stream lifecycle events
//!   - [`core::query`] - Read-only balance and history views
//!   - [`core::replay`] - Ledger replay and consistency checks
//! - [`io`] - Command-file parsing and CSV reports
//! - [`runner`] - Command-file orchestration used by the binary
//! - [`cli`] - CLI arguments parsing
//!
//! # Balances
//!
//! Each account maintains:
//! - `total`: All settled funds owned by the account
//! - `available`: Funds free to spend, withdraw or hold
//! - `in_streams`: Funds reserved against active streams, split into
//!   `buffer` and `streaming`
//!
//! `total == available + in_streams` holds after every committed operation.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rust_decimal::Decimal;
//! use stream_ledger::{BalanceEngine, InMemoryLedgerStore, LedgerConfig, ReferenceType};
//!
//! let engine = BalanceEngine::new(Arc::new(InMemoryLedgerStore::new()), LedgerConfig::default());
//! engine.open_account("alice").unwrap();
//! engine
//!     .credit("alice", Decimal::from(1000), ReferenceType::Deposit, "dep-1", "top up")
//!     .unwrap();
//! engine
//!     .hold_for_stream("alice", "stream-1", Decimal::from(300), Decimal::from(50))
//!     .unwrap();
//!
//! let balance = engine.get_balance("alice").unwrap();
//! assert_eq!(balance.available, Decimal::from(700));
//! assert_eq!(balance.in_streams.streaming, Decimal::from(250));
//! ```

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod runner;
pub mod store;
pub mod types;

pub use config::LedgerConfig;
pub use core::{
    BalanceEngine, BalanceQuery, ReplayReport, StreamEvent, StreamHoldManager, StreamOutcome,
    TransferReceipt,
};
pub use store::{InMemoryLedgerStore, LedgerStore};
pub use types::{
    Account, AccountBalance, AccountId, BalanceSnapshot, EntryId, ErrorKind, HoldStatus,
    InStreamsBalance, LedgerEntry, LedgerError, Posting, ReferenceType, StreamHold, StreamId,
};
