use std::collections::{HashMap, HashSet};

use crate::dedup::{JoinKey, KeySpec};
use crate::error::{Result, ToolError};
use crate::model::{CellValue, Table};
use crate::schema::{SourceKind, ValidatedTable};

/// Left outer join of `left` with `right`.
///
/// Every left row appears exactly once. Right key columns that carry the same
/// label as their left counterpart are merged away; any other right column
/// whose label is already taken is renamed `<LABEL>_<SOURCE>`. A right side
/// holding several rows for one key would multiply left rows, so the join
/// fails with [`ToolError::JoinFanOut`] instead.
pub fn left_join(
    left: &Table,
    right: &ValidatedTable,
    left_key: &KeySpec,
    right_key: &KeySpec,
) -> Result<Table> {
    let kind = right.kind();
    let right_table = right.table();
    let left_bound = left_key.bind(left, SourceKind::Orders)?;
    let right_bound = right_key.bind(right_table, kind)?;

    let mut index: HashMap<JoinKey, Vec<usize>> = HashMap::new();
    for (row_index, row) in right_table.rows().iter().enumerate() {
        if let Some(key) = right_bound.key(row) {
            index.entry(key).or_default().push(row_index);
        }
    }

    let left_keys: Vec<Option<JoinKey>> = left.rows().iter().map(|row| left_bound.key(row)).collect();
    let after: usize = left_keys
        .iter()
        .map(|key| {
            key.as_ref()
                .and_then(|key| index.get(key))
                .map_or(1, |matches| matches.len().max(1))
        })
        .sum();
    if after != left.len() {
        return Err(ToolError::JoinFanOut {
            kind,
            before: left.len(),
            after,
        });
    }

    let merged: HashSet<usize> = right_bound
        .indices()
        .iter()
        .zip(left_key.columns())
        .filter(|(right_index, left_label)| &right_table.columns()[**right_index] == *left_label)
        .map(|(right_index, _)| *right_index)
        .collect();
    let appended: Vec<usize> = (0..right_table.width())
        .filter(|column| !merged.contains(column))
        .collect();

    let mut columns = left.columns().to_vec();
    let mut taken: HashSet<String> = columns.iter().cloned().collect();
    for column in &appended {
        let label = unique_label(&right_table.columns()[*column], kind, &taken);
        taken.insert(label.clone());
        columns.push(label);
    }

    let mut joined = Table::new(columns);
    for (row, key) in left.rows().iter().zip(&left_keys) {
        let matched = key
            .as_ref()
            .and_then(|key| index.get(key))
            .and_then(|matches| matches.first())
            .map(|right_row| &right_table.rows()[*right_row]);

        let mut cells = row.clone();
        match matched {
            Some(right_row) => cells.extend(appended.iter().map(|column| right_row[*column].clone())),
            None => cells.extend(appended.iter().map(|_| CellValue::Null)),
        }
        joined.push_row(cells);
    }

    Ok(joined)
}

fn unique_label(label: &str, kind: SourceKind, taken: &HashSet<String>) -> String {
    if !taken.contains(label) {
        return label.to_string();
    }
    let base = format!("{label}_{}", kind.column_suffix());
    if !taken.contains(&base) {
        return base;
    }
    let mut counter = 1;
    loop {
        let candidate = format!("{base}_{counter}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}
