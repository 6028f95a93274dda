use std::io::{Read, Seek};

use calamine::{DataType, Range, Reader, Xlsx};
use chrono::{Days, NaiveDate};

use crate::error::{Result, ToolError};
use crate::model::{CellValue, Table};
use crate::schema::SourceKind;

/// Sheet names of an opened workbook, in workbook order.
pub fn sheet_names<R: Read + Seek>(workbook: &Xlsx<R>) -> Vec<String> {
    workbook.sheet_names().to_owned()
}

/// Decodes `sheet` into a table. The first `skip_rows` worksheet rows are
/// banner rows; the row after them holds the column labels.
pub fn read_table<R: Read + Seek>(
    workbook: &mut Xlsx<R>,
    kind: SourceKind,
    sheet: &str,
    skip_rows: usize,
) -> Result<Table> {
    let range = read_required_sheet(workbook, kind, sheet)?;
    Ok(range_to_table(&range, skip_rows))
}

fn read_required_sheet<R: Read + Seek>(
    workbook: &mut Xlsx<R>,
    kind: SourceKind,
    name: &str,
) -> Result<Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ToolError::SheetNotFound {
            kind,
            sheet: format!("'{name}'"),
        })?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

fn range_to_table(range: &Range<DataType>, skip_rows: usize) -> Table {
    // Ranges start at the first used row, so blank banner rows are already gone.
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut rows = range.rows().skip(skip_rows.saturating_sub(first_row));

    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .enumerate()
            .map(|(index, cell)| header_label(index, cell))
            .collect(),
        None => return Table::default(),
    };

    let mut table = Table::new(headers);
    for row in rows {
        let cells: Vec<CellValue> = row.iter().map(cell_to_value).collect();
        if cells.iter().all(CellValue::is_null) {
            continue;
        }
        table.push_row(cells);
    }
    table
}

fn header_label(index: usize, cell: &DataType) -> String {
    let label = match cell {
        DataType::Empty => String::new(),
        DataType::String(value) => value.clone(),
        DataType::Float(value) => value.to_string(),
        DataType::Int(value) => value.to_string(),
        other => other.to_string(),
    };
    if label.trim().is_empty() {
        format!("Unnamed: {index}")
    } else {
        label
    }
}

fn cell_to_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::Empty | DataType::Error(_) => CellValue::Null,
        DataType::String(value) => CellValue::String(value.clone()),
        DataType::Float(value) => CellValue::Float(*value),
        DataType::Int(value) => CellValue::Int(*value),
        DataType::Bool(value) => CellValue::Boolean(*value),
        DataType::DateTime(serial) => serial_to_date(*serial).map_or(CellValue::Null, CellValue::Date),
        other => CellValue::String(other.to_string()),
    }
}

/// Converts an Excel serial day number (1900 date system) into a date.
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.trunc() as u64))
}
