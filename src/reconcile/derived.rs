use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::warn;

use crate::error::{Result, ToolError};
use crate::model::{CellValue, Table};
use crate::normalize::key_text;
use crate::schema::columns;

/// Parses a due date written as `YYYYMMDD`, either as text or as a number.
pub fn parse_due_date(row: usize, value: &CellValue) -> Result<NaiveDate> {
    if let CellValue::Date(date) = value {
        return Ok(*date);
    }
    let invalid = || ToolError::DateParse {
        row,
        value: value.to_string(),
    };
    let text = key_text(value).ok_or_else(invalid)?;
    if text.len() != 8 || !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(&text, "%Y%m%d").map_err(|_| invalid())
}

/// Days from `today` until each row's due date. Rows whose date cannot be
/// parsed get a null cell; the second element counts them.
pub fn control_days(orders: &Table, today: NaiveDate) -> (Vec<CellValue>, usize) {
    let mut failures = 0;
    let values = orders
        .column_values(columns::DUE_DATE)
        .enumerate()
        .map(|(row, value)| match parse_due_date(row, value) {
            Ok(due) => CellValue::Int((due - today).num_days()),
            Err(error) => {
                warn!(%error, "due date left empty");
                failures += 1;
                CellValue::Null
            }
        })
        .collect();
    (values, failures)
}

/// Unit value of each combined row, looked up by product code in the price
/// list. Unknown products and non-numeric prices yield null.
pub fn assigned_values(combined: &Table, prices: &Table) -> Vec<CellValue> {
    let mut lookup: HashMap<String, Option<f64>> = HashMap::new();
    let codes = prices.column_values(columns::PRODUCT);
    let values = prices.column_values(columns::PRICE_VALUE);
    for (code, value) in codes.zip(values) {
        if let Some(code) = key_text(code) {
            lookup.entry(code).or_insert_with(|| value.as_f64());
        }
    }

    combined
        .column_values(columns::PRODUCT)
        .map(|code| {
            key_text(code)
                .and_then(|code| lookup.get(&code).copied().flatten())
                .map_or(CellValue::Null, CellValue::Float)
        })
        .collect()
}
