//! Conversion requests received from tool callers.
//!
//! A request carries a header mapping (source field -> column title) and the
//! rows to write. Column order is the order in which the caller wrote the
//! header keys.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Largest column count a worksheet accepts
pub const MAX_COLUMNS: usize = 16_384;

/// Largest number of data rows (the first sheet row holds the titles)
pub const MAX_DATA_ROWS: usize = 1_048_575;

/// Longest text a single cell holds, in characters
pub const MAX_CELL_CHARS: usize = 32_767;

/// A single record: field name -> scalar value
pub type Record = Map<String, Value>;

/// Input errors caused by the caller, reported back as tool text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no data was provided to convert")]
    NoData,

    #[error("no header mapping was provided")]
    NoHeaders,

    #[error("too many columns: {count} > {limit}")]
    TooManyColumns { count: usize, limit: usize },

    #[error("too many data rows: {count} > {limit}")]
    TooManyRows { count: usize, limit: usize },

    /// `row` is the 1-based sheet row; row 1 holds the titles
    #[error("text in row {row}, field \"{field}\" is {len} characters long (limit {limit})")]
    TextTooLong {
        row: usize,
        field: String,
        len: usize,
        limit: usize,
    },
}

/// Parameters of the `jsonToExcel` tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Field name -> column title; iteration order is column order
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    /// Records to write, one sheet row each
    #[serde(default)]
    pub data: Vec<Record>,
}

impl ConversionRequest {
    /// Create a request from headers and rows
    pub fn new(headers: IndexMap<String, String>, data: Vec<Record>) -> Self {
        Self { headers, data }
    }

    /// Parse a request from a JSON value (tool arguments)
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Check the request can be written as a single worksheet.
    ///
    /// Empty data is reported before empty headers.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.data.is_empty() {
            return Err(ValidationError::NoData);
        }
        if self.headers.is_empty() {
            return Err(ValidationError::NoHeaders);
        }
        if self.headers.len() > MAX_COLUMNS {
            return Err(ValidationError::TooManyColumns {
                count: self.headers.len(),
                limit: MAX_COLUMNS,
            });
        }
        if self.data.len() > MAX_DATA_ROWS {
            return Err(ValidationError::TooManyRows {
                count: self.data.len(),
                limit: MAX_DATA_ROWS,
            });
        }

        for (field, title) in &self.headers {
            check_text_len(1, field, title)?;
        }
        for (i, record) in self.data.iter().enumerate() {
            for field in self.headers.keys() {
                match record.get(field) {
                    Some(Value::String(s)) => check_text_len(i + 2, field, s)?,
                    // Written as their JSON text
                    Some(nested @ (Value::Array(_) | Value::Object(_))) => {
                        check_text_len(i + 2, field, &nested.to_string())?
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Column bindings `(field, title)` in write order.
    ///
    /// Captured once per conversion so the title row and every data row
    /// agree on the same order.
    pub fn columns(&self) -> Vec<(&str, &str)> {
        self.headers
            .iter()
            .map(|(field, title)| (field.as_str(), title.as_str()))
            .collect()
    }
}

fn check_text_len(row: usize, field: &str, text: &str) -> Result<(), ValidationError> {
    // Cheap upper bound before counting chars
    if text.len() <= MAX_CELL_CHARS {
        return Ok(());
    }
    let len = text.chars().count();
    if len > MAX_CELL_CHARS {
        return Err(ValidationError::TextTooLong {
            row,
            field: field.to_string(),
            len,
            limit: MAX_CELL_CHARS,
        });
    }
    Ok(())
}
