//! Join keys and key-based deduplication.
//!
//! Every non-order source must hold at most one row per join key before it is
//! joined, otherwise a left join would fan out the order rows.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::error::{Result, ToolError};
use crate::model::{CellValue, Table};
use crate::normalize::key_text;
use crate::schema::{SourceKind, ValidatedTable};

/// How a multi-column key is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// Parts are concatenated as text, so order `12` line `3` and order `1`
    /// line `23` share the key `"123"`. Matches the historic exports.
    #[default]
    Concatenated,
    /// Parts are compared one by one.
    Tuple,
}

/// Value a row is matched on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JoinKey {
    Text(String),
    Tuple(Vec<String>),
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKey::Text(text) => f.write_str(text),
            JoinKey::Tuple(parts) => write!(f, "({})", parts.join(", ")),
        }
    }
}

/// Builds the key of a set of cells. Any null part means the row has no key.
pub fn composite_key(parts: &[&CellValue], mode: KeyMode) -> Option<JoinKey> {
    let parts = parts
        .iter()
        .map(|value| key_text(value))
        .collect::<Option<Vec<String>>>()?;
    Some(match mode {
        KeyMode::Concatenated => JoinKey::Text(parts.concat()),
        KeyMode::Tuple if parts.len() == 1 => {
            JoinKey::Text(parts.into_iter().next().unwrap_or_default())
        }
        KeyMode::Tuple => JoinKey::Tuple(parts),
    })
}

/// Columns forming a key and how they combine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    columns: Vec<String>,
    mode: KeyMode,
}

impl KeySpec {
    pub fn new(columns: &[&str], mode: KeyMode) -> Self {
        Self {
            columns: columns.iter().map(|column| column.to_string()).collect(),
            mode,
        }
    }

    pub fn single(column: &str) -> Self {
        Self::new(&[column], KeyMode::Concatenated)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Resolves the key columns against `table`.
    pub fn bind(&self, table: &Table, kind: SourceKind) -> Result<BoundKey> {
        let mut indices = Vec::with_capacity(self.columns.len());
        let mut missing = Vec::new();
        for column in &self.columns {
            match table.column_index(column) {
                Some(index) => indices.push(index),
                None => missing.push(column.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(ToolError::MissingColumns {
                kind,
                columns: missing,
            });
        }
        Ok(BoundKey {
            indices,
            mode: self.mode,
        })
    }
}

/// A [`KeySpec`] resolved to column positions of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundKey {
    indices: Vec<usize>,
    mode: KeyMode,
}

impl BoundKey {
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn key(&self, row: &[CellValue]) -> Option<JoinKey> {
        let parts: Vec<&CellValue> = self
            .indices
            .iter()
            .map(|index| row.get(*index).unwrap_or(&CellValue::Null))
            .collect();
        composite_key(&parts, self.mode)
    }
}

/// Which row survives when several share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Keep the first occurrence and silently drop later ones.
    #[default]
    FirstWins,
    /// Keep the last occurrence, at its original position.
    LastWins,
    /// Abort the run on the first duplicate key.
    Error,
}

/// Outcome of [`dedup`].
#[derive(Debug, Clone, PartialEq)]
pub struct Deduplicated {
    pub source: ValidatedTable,
    pub dropped: usize,
}

/// Removes rows so at most one row remains per key value. Kept rows retain
/// their original relative order. Rows without a key are kept since they can
/// never match a join.
pub fn dedup(source: ValidatedTable, key: &KeySpec, policy: DuplicatePolicy) -> Result<Deduplicated> {
    let kind = source.kind();
    let bound = key.bind(source.table(), kind)?;
    let keys: Vec<Option<JoinKey>> = source
        .table()
        .rows()
        .iter()
        .map(|row| bound.key(row))
        .collect();

    let keep: Vec<usize> = match policy {
        DuplicatePolicy::FirstWins => {
            let mut seen = HashSet::new();
            keys.iter()
                .enumerate()
                .filter(|(_, key)| key.as_ref().is_none_or(|key| seen.insert(key.clone())))
                .map(|(index, _)| index)
                .collect()
        }
        DuplicatePolicy::LastWins => {
            let mut last: HashMap<&JoinKey, usize> = HashMap::new();
            for (index, key) in keys.iter().enumerate() {
                if let Some(key) = key {
                    last.insert(key, index);
                }
            }
            keys.iter()
                .enumerate()
                .filter(|(index, key)| key.as_ref().is_none_or(|key| last.get(key) == Some(index)))
                .map(|(index, _)| index)
                .collect()
        }
        DuplicatePolicy::Error => {
            let mut seen = HashSet::new();
            for key in keys.iter().flatten() {
                if !seen.insert(key) {
                    return Err(ToolError::DuplicateKey {
                        kind,
                        key: key.to_string(),
                    });
                }
            }
            (0..keys.len()).collect()
        }
    };

    let dropped = keys.len() - keep.len();
    if dropped > 0 {
        debug!(source = %kind, dropped, ?policy, "dropped duplicate rows");
    }

    Ok(Deduplicated {
        source: source.map_table(|table| table.select_rows(&keep)),
        dropped,
    })
}
