//! JSON rows to `.xlsx` bytes.
//!
//! Pure transformation: the first sheet row holds the column titles, row
//! `i + 2` holds `data[i]`. Fields missing from a record stay blank and
//! record fields without a header are ignored.

use rust_xlsxwriter::{ColNum, RowNum, Workbook, Worksheet, XlsxError};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{ConversionRequest, ValidationError};

/// Name of the single worksheet
pub const SHEET_NAME: &str = "Sheet1";

/// Errors produced while building a workbook
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{0}")]
    Invalid(#[from] ValidationError),

    #[error("Spreadsheet encoding error: {0}")]
    Xlsx(#[from] XlsxError),
}

/// Build a workbook for `request` and return its bytes
pub fn to_xlsx(request: &ConversionRequest) -> Result<Vec<u8>, TransformError> {
    request.validate()?;

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    // One order for the title row and all data rows
    let columns = request.columns();

    for (col, (_, title)) in columns.iter().enumerate() {
        sheet.write_string(0, col as ColNum, *title)?;
    }

    for (i, record) in request.data.iter().enumerate() {
        let row = (i + 1) as RowNum;
        for (col, (field, _)) in columns.iter().enumerate() {
            if let Some(value) = record.get(*field) {
                write_value(sheet, row, col as ColNum, value)?;
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Write one JSON value using the closest native cell type
fn write_value(
    sheet: &mut Worksheet,
    row: RowNum,
    col: ColNum,
    value: &Value,
) -> Result<(), XlsxError> {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) => {
                sheet.write_number(row, col, f)?;
            }
            None => {
                sheet.write_string(row, col, n.to_string())?;
            }
        },
        Value::String(s) => {
            sheet.write_string(row, col, s)?;
        }
        // Nested values have no cell representation; keep their JSON text
        Value::Array(_) | Value::Object(_) => {
            sheet.write_string(row, col, value.to_string())?;
        }
    }
    Ok(())
}
