use std::collections::HashSet;
use std::io::{Cursor, Write};

use rust_xlsxwriter::{Table as ExcelTable, TableColumn, Workbook, Worksheet};
use zip::ZipWriter;
use zip::write::FileOptions;

use crate::aggregate::group_label;
use crate::error::Result;
use crate::model::{CellValue, Table};

/// Sheet name used for per-group workbooks.
pub const GROUP_SHEET: &str = "Datos";

/// A table that will be materialised as an Excel sheet.
#[derive(Debug, Clone, Copy)]
pub struct SheetTable<'a> {
    pub sheet_name: &'a str,
    pub table: &'a Table,
}

impl<'a> SheetTable<'a> {
    pub fn new(sheet_name: &'a str, table: &'a Table) -> Self {
        Self { sheet_name, table }
    }
}

/// Renders the given sheets into an in-memory `.xlsx` file.
pub fn workbook_bytes(sheets: &[SheetTable<'_>]) -> Result<Vec<u8>> {
    let mut workbook_writer = Workbook::new();
    let mut sheet_names = NameRegistry::new(Some(31));

    for sheet in sheets {
        let worksheet = workbook_writer.add_worksheet();
        worksheet.set_name(sheet_names.assign(&sanitize_sheet_name(sheet.sheet_name)))?;
        write_table(worksheet, sheet.table)?;
    }

    Ok(workbook_writer.save_to_buffer()?)
}

fn write_table(worksheet: &mut Worksheet, table: &Table) -> Result<()> {
    for (col_idx, header) in table.columns().iter().enumerate() {
        worksheet.write_string(0, col_idx as u16, header)?;
    }

    for (row_idx, row) in table.rows().iter().enumerate() {
        let row_num = (row_idx + 1) as u32;
        for (col_idx, cell) in row.iter().enumerate() {
            let col_num = col_idx as u16;
            match cell {
                CellValue::Null => {}
                CellValue::String(value) => {
                    worksheet.write_string(row_num, col_num, value)?;
                }
                CellValue::Int(value) => {
                    worksheet.write_number(row_num, col_num, *value as f64)?;
                }
                CellValue::Float(value) => {
                    worksheet.write_number(row_num, col_num, *value)?;
                }
                CellValue::Boolean(value) => {
                    worksheet.write_boolean(row_num, col_num, *value)?;
                }
                CellValue::Date(_) => {
                    worksheet.write_string(row_num, col_num, cell.to_string())?;
                }
            }
        }
    }

    // Excel tables need data rows and unique, non-empty headers.
    if table.is_empty() || !headers_fit_excel_table(table.columns()) {
        return Ok(());
    }
    let columns: Vec<TableColumn> = table
        .columns()
        .iter()
        .map(|header| TableColumn::new().set_header(header))
        .collect();
    let mut excel_table = ExcelTable::new();
    excel_table.set_autofilter(true).set_columns(&columns);
    let col_end = (table.width() as u16).saturating_sub(1);
    worksheet.add_table(0, 0, table.len() as u32, col_end, &excel_table)?;
    Ok(())
}

fn headers_fit_excel_table(headers: &[String]) -> bool {
    let mut seen = HashSet::new();
    !headers.is_empty()
        && headers
            .iter()
            .all(|header| !header.trim().is_empty() && seen.insert(header.to_lowercase()))
}

/// Splits `table` by the value of `group_column` and packs one workbook per
/// group into a ZIP archive. Groups appear in order of first occurrence.
pub fn group_archive_bytes(table: &Table, group_column: &str) -> Result<Vec<u8>> {
    let group_index = table.column_index(group_column);
    let mut order: Vec<String> = Vec::new();
    let mut members: Vec<Vec<usize>> = Vec::new();

    for (row_idx, row) in table.rows().iter().enumerate() {
        let label = group_label(group_index.and_then(|index| row.get(index)));
        match order.iter().position(|existing| *existing == label) {
            Some(position) => members[position].push(row_idx),
            None => {
                order.push(label);
                members.push(vec![row_idx]);
            }
        }
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut file_names = NameRegistry::new(None);

    for (label, rows) in order.iter().zip(&members) {
        let subset = table.select_rows(rows);
        let bytes = workbook_bytes(&[SheetTable::new(GROUP_SHEET, &subset)])?;
        let file_name = format!("{}.xlsx", file_names.assign(&sanitize_file_stem(label)));
        writer.start_file(file_name, options)?;
        writer.write_all(&bytes)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Hands out unique names, comparing case-insensitively and appending `_<n>`
/// on collisions.
#[derive(Debug)]
struct NameRegistry {
    used: HashSet<String>,
    max_len: Option<usize>,
}

impl NameRegistry {
    fn new(max_len: Option<usize>) -> Self {
        Self {
            used: HashSet::new(),
            max_len,
        }
    }

    fn assign(&mut self, base: &str) -> String {
        if self.used.insert(base.to_lowercase()) {
            return base.to_string();
        }

        let mut counter = 1;
        loop {
            let suffix = format!("_{counter}");
            let mut prefix = base.to_string();
            if let Some(max_len) = self.max_len {
                truncate_chars(&mut prefix, max_len.saturating_sub(suffix.len()));
            }
            let candidate = format!("{prefix}{suffix}");
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

fn truncate_chars(value: &mut String, max_chars: usize) {
    if let Some((byte_idx, _)) = value.char_indices().nth(max_chars) {
        value.truncate(byte_idx);
    }
}

fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']', '\'', '"'];
    let mut sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    sanitized = sanitized.trim().to_string();
    if sanitized.is_empty() {
        sanitized = "Sheet".to_string();
    }

    truncate_chars(&mut sanitized, 31);
    sanitized
}

/// File stem for a group label: whitespace and characters file systems reject
/// become `_`.
pub fn sanitize_file_stem(label: &str) -> String {
    let invalid = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
    let sanitized: String = label
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_whitespace() || invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|ch| ch == '.') {
        "grupo".to_string()
    } else {
        sanitized
    }
}
