//! Delimited-text decoding into [`TabularResult`].
//!
//! Quoting is disabled: a `"` in the source text is data, never a field boundary.

use super::types::{Row, TabularResult};
use crate::error::{ConnectorError, Result};

/// Default field delimiter (the `csv2` output format of the shell client).
pub const DEFAULT_DELIMITER: u8 = b',';

/// Decodes comma-delimited text. The first record is the header.
pub fn decode(framed: &str) -> Result<TabularResult> {
    decode_with_delimiter(framed, DEFAULT_DELIMITER)
}

/// Decodes delimited text with the given delimiter. The first record is the header.
///
/// Empty input yields an empty result; a header with no data rows yields zero rows.
///
/// Blank lines are skipped. A one-column row holding an empty string is written as a
/// blank line, so it is dropped here and the decoded result has one row fewer.
pub fn decode_with_delimiter(framed: &str, delimiter: u8) -> Result<TabularResult> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .quoting(false)
        .flexible(false)
        .delimiter(delimiter)
        .from_reader(framed.as_bytes());

    let mut columns: Option<Vec<String>> = None;
    let mut rows: Vec<Row> = Vec::new();

    for record in reader.records() {
        let record = record.map_err(to_decode_error)?;
        match columns {
            None => columns = Some(record.iter().map(str::to_string).collect()),
            Some(_) => rows.push(record.iter().map(|f| Some(f.to_string())).collect()),
        }
    }

    match columns {
        Some(columns) => TabularResult::new(columns, rows),
        None => Ok(TabularResult::empty()),
    }
}

fn to_decode_error(error: csv::Error) -> ConnectorError {
    let offset = error.position().map(|p| p.byte());
    ConnectorError::decode(error.to_string(), offset)
}
