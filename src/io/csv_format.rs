//! CSV format handling for ledger commands and reports
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to ledger commands
//! - Balance and history report serialization
//!
//! All functions are pure (no file I/O) for easy testing.

use crate::core::StreamEvent;
use crate::types::{AccountBalance, AccountId, LedgerEntry, LedgerError, ReferenceType, StreamId};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV record structure for deserialization
///
/// Matches the input columns: op, account, counterparty, stream, amount,
/// buffer, reference, kind. Which columns an op needs depends on the op;
/// the rest may be empty or missing.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct CsvRecord {
    pub op: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub buffer: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

/// One line of a command file
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCommand {
    Open {
        account_id: AccountId,
    },
    Close {
        account_id: AccountId,
    },
    Credit {
        account_id: AccountId,
        amount: Decimal,
        reference_type: ReferenceType,
        reference_id: String,
    },
    Debit {
        account_id: AccountId,
        amount: Decimal,
        reference_type: ReferenceType,
        reference_id: String,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Decimal,
        reference_type: ReferenceType,
        reference_id: String,
    },
    /// Direct release with explicit amounts, bypassing the stream manager
    Release {
        account_id: AccountId,
        stream_id: StreamId,
        streamed_amount: Decimal,
        return_buffer: Decimal,
    },
    Stream(StreamEvent),
}

/// Convert a CsvRecord to a LedgerCommand
///
/// Ops are case-insensitive. `kind` defaults to the op's natural reference
/// type (`deposit`, `withdrawal`, `transfer`), `buffer` defaults to zero and
/// `reference` to an empty string.
///
/// # Returns
///
/// * `Ok(LedgerCommand)` - Successfully converted record
/// * `Err(String)` - Message describing the first missing or invalid field
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<LedgerCommand, String> {
    let op = csv_record.op.trim().to_lowercase();
    let fields = Fields {
        op: &op,
        record: &csv_record,
    };

    let command = match op.as_str() {
        "open" => LedgerCommand::Open {
            account_id: fields.required("account", &csv_record.account)?,
        },
        "close" => LedgerCommand::Close {
            account_id: fields.required("account", &csv_record.account)?,
        },
        "credit" => LedgerCommand::Credit {
            account_id: fields.required("account", &csv_record.account)?,
            amount: fields.amount("amount", &csv_record.amount)?,
            reference_type: fields.kind(ReferenceType::Deposit),
            reference_id: fields.reference(),
        },
        "debit" => LedgerCommand::Debit {
            account_id: fields.required("account", &csv_record.account)?,
            amount: fields.amount("amount", &csv_record.amount)?,
            reference_type: fields.kind(ReferenceType::Withdrawal),
            reference_id: fields.reference(),
        },
        "transfer" => LedgerCommand::Transfer {
            from: fields.required("account", &csv_record.account)?,
            to: fields.required("counterparty", &csv_record.counterparty)?,
            amount: fields.amount("amount", &csv_record.amount)?,
            reference_type: fields.kind(ReferenceType::Transfer),
            reference_id: fields.reference(),
        },
        "release" => LedgerCommand::Release {
            account_id: fields.required("account", &csv_record.account)?,
            stream_id: fields.required("stream", &csv_record.stream)?,
            streamed_amount: fields.amount("amount", &csv_record.amount)?,
            return_buffer: fields.optional_amount("buffer", &csv_record.buffer)?,
        },
        "hold" | "start" => LedgerCommand::Stream(StreamEvent::Started {
            account_id: fields.required("account", &csv_record.account)?,
            stream_id: fields.required("stream", &csv_record.stream)?,
            amount: fields.amount("amount", &csv_record.amount)?,
            buffer: fields.optional_amount("buffer", &csv_record.buffer)?,
        }),
        "top_up" => LedgerCommand::Stream(StreamEvent::ToppedUp {
            stream_id: fields.required("stream", &csv_record.stream)?,
            amount: fields.amount("amount", &csv_record.amount)?,
            buffer: fields.optional_amount("buffer", &csv_record.buffer)?,
        }),
        "payout" => LedgerCommand::Stream(StreamEvent::Payout {
            stream_id: fields.required("stream", &csv_record.stream)?,
            amount: fields.amount("amount", &csv_record.amount)?,
            reference_id: fields.reference(),
        }),
        "complete" => LedgerCommand::Stream(StreamEvent::Completed {
            stream_id: fields.required("stream", &csv_record.stream)?,
            streamed_amount: fields.amount("amount", &csv_record.amount)?,
        }),
        "cancel" => LedgerCommand::Stream(StreamEvent::Cancelled {
            stream_id: fields.required("stream", &csv_record.stream)?,
        }),
        _ => return Err(format!("Invalid op: '{}'", csv_record.op)),
    };

    Ok(command)
}

/// Field access for one record, with errors naming the op
struct Fields<'a> {
    op: &'a str,
    record: &'a CsvRecord,
}

impl Fields<'_> {
    fn present(value: &Option<String>) -> Option<&str> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str, value: &Option<String>) -> Result<String, String> {
        Self::present(value)
            .map(str::to_string)
            .ok_or_else(|| format!("{} requires {}", self.op, name))
    }

    fn amount(&self, name: &str, value: &Option<String>) -> Result<Decimal, String> {
        let raw = Self::present(value).ok_or_else(|| format!("{} requires {}", self.op, name))?;
        Decimal::from_str(raw).map_err(|_| format!("Invalid {} '{}' for {}", name, raw, self.op))
    }

    fn optional_amount(&self, name: &str, value: &Option<String>) -> Result<Decimal, String> {
        match Self::present(value) {
            Some(_) => self.amount(name, value),
            None => Ok(Decimal::ZERO),
        }
    }

    fn kind(&self, default: ReferenceType) -> ReferenceType {
        Self::present(&self.record.kind)
            .map(ReferenceType::from)
            .unwrap_or(default)
    }

    fn reference(&self) -> String {
        Self::present(&self.record.reference)
            .unwrap_or_default()
            .to_string()
    }
}

/// Write account balances to CSV format
///
/// Columns: account, total, available, in_streams, buffer, streaming.
/// Rows are sorted by account id and amounts are written without trailing
/// zeros.
pub fn write_balances_csv(
    balances: &[AccountBalance],
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record([
        "account",
        "total",
        "available",
        "in_streams",
        "buffer",
        "streaming",
    ])?;

    let mut sorted: Vec<&AccountBalance> = balances.iter().collect();
    sorted.sort_by(|a, b| a.account_id.cmp(&b.account_id));

    for balance in sorted {
        writer.write_record(&[
            balance.account_id.clone(),
            amount_cell(balance.total),
            amount_cell(balance.available),
            amount_cell(balance.in_streams.total),
            amount_cell(balance.in_streams.buffer),
            amount_cell(balance.in_streams.streaming),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write ledger entries to CSV format, in the order given
///
/// Columns: id, account, amount, currency, in_streams_delta,
/// reference_type, reference_id, total_after, available_after,
/// in_streams_after, description. Every row carries the ledger's currency.
pub fn write_history_csv(
    entries: &[LedgerEntry],
    currency: &str,
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record([
        "id",
        "account",
        "amount",
        "currency",
        "in_streams_delta",
        "reference_type",
        "reference_id",
        "total_after",
        "available_after",
        "in_streams_after",
        "description",
    ])?;

    for entry in entries {
        writer.write_record(&[
            entry.id.to_string(),
            entry.account_id.clone(),
            amount_cell(entry.amount),
            currency.to_string(),
            amount_cell(entry.in_streams_delta),
            entry.reference_type.to_string(),
            entry.reference_id.clone(),
            amount_cell(entry.balance_after.total),
            amount_cell(entry.balance_after.available),
            amount_cell(entry.balance_after.in_streams),
            entry.description.clone(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn amount_cell(amount: Decimal) -> String {
    amount.normalize().to_string()
}
