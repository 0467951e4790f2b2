//! Core business logic module
//!
//! This module contains the ledger components:
//! - `engine` - All balance-changing operations
//! - `stream_manager` - Stream lifecycle events on top of the engine
//! - `query` - Read-only balance and history views
//! - `replay` - Rebuilding balances from the ledger
//! - `balance_ops` - Checked column arithmetic shared by the engine

pub mod balance_ops;
pub mod engine;
pub mod query;
pub mod replay;
pub mod stream_manager;

pub use engine::{BalanceEngine, TransferReceipt};
pub use query::BalanceQuery;
pub use replay::ReplayReport;
pub use stream_manager::{StreamEvent, StreamHoldManager, StreamOutcome};
