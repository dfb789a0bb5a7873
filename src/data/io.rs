//! Delimited-file adapter.
//!
//! Reads a CSV file into raw columns so the file-backed training path can
//! reuse the same inference and materialization as the in-memory path. The
//! first record is the header; empty cells are missing values. Typing is
//! *not* decided here; cells stay textual and specification inference
//! assigns semantic types afterwards.

use std::fs::File;
use std::path::Path;

use super::column::{RawColumn, RawValue};
use crate::error::Error;

/// Read all columns of a CSV file, in header order.
pub fn read_csv_columns(path: &Path) -> Result<Vec<RawColumn>, Error> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(file);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut columns: Vec<Vec<RawValue>> = vec![Vec::new(); headers.len()];

    for record in reader.records() {
        let record = record?;
        for (idx, cell) in record.iter().enumerate() {
            let value = if cell.is_empty() {
                RawValue::Null
            } else {
                RawValue::Text(cell.to_string())
            };
            columns[idx].push(value);
        }
    }

    Ok(headers
        .into_iter()
        .zip(columns)
        .map(|(name, values)| RawColumn::new(name, values))
        .collect())
}
