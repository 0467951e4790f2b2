//! Streaming reader over a CSV command file
//!
//! Reads one record at a time and converts it with
//! [`convert_csv_record`](crate::io::csv_format::convert_csv_record).
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()`
//! - Malformed rows are yielded as `ParseError` items carrying their line
//!   number, so the caller can log them and keep going

use crate::io::csv_format::{convert_csv_record, CsvRecord, LedgerCommand};
use crate::types::LedgerError;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

/// Iterator over the commands of one file
#[derive(Debug)]
pub struct CommandReader {
    reader: csv::Reader<File>,
    line_num: u64,
}

impl CommandReader {
    /// Open a command file
    ///
    /// Fields are trimmed and rows may omit trailing columns.
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => LedgerError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => LedgerError::from(e),
        })?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            // the header occupies line 1
            line_num: 1,
        })
    }
}

impl Iterator for CommandReader {
    type Item = Result<LedgerCommand, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<CsvRecord>();
        let result = deserializer.next()?;
        self.line_num += 1;

        let line = Some(self.line_num);
        Some(match result {
            Ok(csv_record) => {
                convert_csv_record(csv_record).map_err(|message| LedgerError::ParseError { line, message })
            }
            Err(e) => Err(LedgerError::ParseError {
                line,
                message: e.to_string(),
            }),
        })
    }
}
