//! Workload summary of the combined table by responsible party.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::model::{CellValue, Table};
use crate::normalize::normalize_value;

/// Label of the synthetic last row.
pub const TOTAL_LABEL: &str = "TOTAL";
/// Bucket for rows without a responsible party.
pub const UNASSIGNED_LABEL: &str = "Sin responsable";

/// Status column and the fixed list of status labels to count per group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCrossTab {
    pub column: String,
    pub labels: Vec<String>,
}

/// One line of a [`Summary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub label: String,
    pub count: usize,
    /// Share of all rows, rounded to two decimals.
    pub percentage: f64,
    /// Counts per status label, in cross-tab order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub status_counts: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub statuses: Vec<String>,
    pub groups: Vec<SummaryRow>,
    pub total: SummaryRow,
}

impl Summary {
    /// Groups followed by the total row.
    pub fn rows(&self) -> impl Iterator<Item = &SummaryRow> {
        self.groups.iter().chain(std::iter::once(&self.total))
    }

    /// Tabular form used for export.
    pub fn to_table(&self) -> Table {
        let mut columns = vec![
            "Responsable".to_string(),
            "Cantidad".to_string(),
            "Porcentaje".to_string(),
        ];
        columns.extend(self.statuses.iter().cloned());

        let mut table = Table::new(columns);
        for row in self.rows() {
            let mut cells = vec![
                CellValue::String(row.label.clone()),
                CellValue::Int(row.count as i64),
                CellValue::Float(row.percentage),
            ];
            cells.extend(row.status_counts.iter().map(|count| CellValue::Int(*count as i64)));
            table.push_row(cells);
        }
        table
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows()
            .map(|row| row.label.chars().count())
            .chain(std::iter::once("Responsable".len()))
            .max()
            .unwrap_or_default();

        write!(f, "{:<width$}  {:>8}  {:>10}", "Responsable", "Cantidad", "Porcentaje")?;
        for status in &self.statuses {
            write!(f, "  {status:>8}")?;
        }
        writeln!(f)?;

        for row in self.rows() {
            write!(f, "{:<width$}  {:>8}  {:>10.2}", row.label, row.count, row.percentage)?;
            for count in &row.status_counts {
                write!(f, "  {count:>8}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Counts the rows of `table` per value of `group_column`.
///
/// Blank and null values are counted under [`UNASSIGNED_LABEL`]. Groups are
/// ordered by descending count, ties by first appearance. The total row's
/// percentage is exactly 100 for a non-empty table, independent of how the
/// group percentages round.
pub fn summarize(table: &Table, group_column: &str, cross_tab: Option<&StatusCrossTab>) -> Summary {
    let group_index = table.column_index(group_column);
    let status_index = cross_tab.and_then(|cross_tab| table.column_index(&cross_tab.column));
    let statuses: Vec<CellValue> = cross_tab
        .map(|cross_tab| {
            cross_tab
                .labels
                .iter()
                .map(|label| normalize_value(&CellValue::String(label.clone())))
                .collect()
        })
        .unwrap_or_default();

    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, (usize, Vec<usize>)> = HashMap::new();

    for row in table.rows() {
        let label = group_label(group_index.and_then(|index| row.get(index)));

        let entry = counts.entry(label.clone()).or_insert_with(|| {
            order.push(label);
            (0, vec![0; statuses.len()])
        });
        entry.0 += 1;

        if let Some(status) = status_index.and_then(|index| row.get(index)) {
            let status = normalize_value(status);
            if let Some(position) = statuses.iter().position(|label| *label == status) {
                entry.1[position] += 1;
            }
        }
    }

    let total_count = table.len();
    let percentage = |count: usize| {
        if total_count == 0 {
            0.0
        } else {
            round2(count as f64 / total_count as f64 * 100.0)
        }
    };

    let mut groups: Vec<SummaryRow> = order
        .into_iter()
        .filter_map(|label| {
            let (count, status_counts) = counts.remove(&label)?;
            Some(SummaryRow {
                percentage: percentage(count),
                label,
                count,
                status_counts,
            })
        })
        .collect();
    groups.sort_by(|lhs, rhs| rhs.count.cmp(&lhs.count));

    let mut status_totals = vec![0; statuses.len()];
    for group in &groups {
        for (total, count) in status_totals.iter_mut().zip(&group.status_counts) {
            *total += count;
        }
    }

    Summary {
        statuses: cross_tab
            .map(|cross_tab| cross_tab.labels.clone())
            .unwrap_or_default(),
        groups,
        total: SummaryRow {
            label: TOTAL_LABEL.to_string(),
            count: total_count,
            percentage: if total_count == 0 { 0.0 } else { 100.0 },
            status_counts: status_totals,
        },
    }
}

/// Group a cell belongs to: its trimmed text, or [`UNASSIGNED_LABEL`] when
/// the cell is missing, null or blank.
pub fn group_label(value: Option<&CellValue>) -> String {
    value
        .map(|value| value.to_string().trim().to_string())
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| UNASSIGNED_LABEL.to_string())
}

/// Two decimals, ties to even.
fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
