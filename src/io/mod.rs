//! I/O module
//!
//! Handles the command-file format and the CSV reports.
//!
//! # Components
//!
//! - `csv_format` - Record conversion and report serialization
//! - `command_reader` - Streaming reader over a command file

pub mod command_reader;
pub mod csv_format;

pub use command_reader::CommandReader;
pub use csv_format::{
    convert_csv_record, write_balances_csv, write_history_csv, CsvRecord, LedgerCommand,
};
