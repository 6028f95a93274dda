//! Label and key normalization so joins survive formatting drift between
//! independently maintained spreadsheets.

use std::collections::HashSet;

use crate::model::{CellValue, Table};

/// Trims, upper-cases and strips every whitespace character from a column
/// label. `"Cod. Producto "` becomes `"COD.PRODUCTO"`.
pub fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Normalizes every column label of `table`. Labels that collide after
/// normalization keep the first occurrence bare and suffix later ones with
/// `.1`, `.2`, ...
pub fn normalize_columns(table: &mut Table) {
    let normalized: Vec<String> = table
        .columns()
        .iter()
        .map(|label| normalize_label(label))
        .collect();
    let unique = disambiguate(normalized);
    table.rename_columns(|index, _| unique[index].clone());
}

fn disambiguate(labels: Vec<String>) -> Vec<String> {
    let mut used: HashSet<String> = labels.iter().cloned().collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut result = Vec::with_capacity(labels.len());

    for label in labels {
        if seen.insert(label.clone()) {
            result.push(label);
            continue;
        }
        let mut counter = 1;
        let candidate = loop {
            let candidate = format!("{label}.{counter}");
            if !used.contains(&candidate) {
                break candidate;
            }
            counter += 1;
        };
        used.insert(candidate.clone());
        seen.insert(candidate.clone());
        result.push(candidate);
    }

    result
}

/// Trims and upper-cases text cells. Every other value, including null, is
/// returned unchanged.
pub fn normalize_value(value: &CellValue) -> CellValue {
    match value {
        CellValue::String(text) => CellValue::String(text.trim().to_uppercase()),
        other => other.clone(),
    }
}

/// Text form used to compare join keys across sources. Integral floats lose
/// their fraction so a product code typed as `12` matches one read as `12.0`.
/// Null and blank cells have no key.
pub fn key_text(value: &CellValue) -> Option<String> {
    let text = match value {
        CellValue::Null => return None,
        CellValue::String(text) => text.trim().to_uppercase(),
        CellValue::Float(number) if number.fract() == 0.0 && number.abs() < 1e15 => {
            format!("{}", *number as i64)
        }
        CellValue::Date(date) => date.format("%Y%m%d").to_string(),
        other => other.to_string().to_uppercase(),
    };
    if text.is_empty() { None } else { Some(text) }
}
