//! Per-source schema descriptors and the archive manifest.
//!
//! Each logical source declares its required columns and join key once. A
//! table that passes [`validate`] is wrapped in a [`ValidatedTable`], so later
//! stages never need to probe for column presence themselves.

use std::fmt;

use tracing::debug;

use crate::error::{Result, ToolError};
use crate::model::Table;
use crate::normalize::normalize_columns;

/// Normalized column labels the pipeline relies on.
pub mod columns {
    pub const ORDER_ID: &str = "LORD";
    pub const LINE_ID: &str = "LLINE";
    pub const PRODUCT: &str = "LPROD";
    pub const DUE_DATE: &str = "LRDTE";
    pub const HANDLER: &str = "HNAME";
    pub const ORDER_DATE: &str = "HEDTE";
    pub const ROUTE: &str = "HROUT";
    pub const DESCRIPTION: &str = "LDESC";
    pub const STOCK_PRODUCT: &str = "COD.PRODUCTO";
    pub const PRICE_VALUE: &str = "VALOR";
    pub const ON_HAND: &str = "ONHAND";
    pub const RESPONSIBLE: &str = "RESP";

    /// Signed days between the due date and the run date.
    pub const CONTROL_DAYS: &str = "Control-Dias";
    /// Unit value looked up in the price list.
    pub const ASSIGNED_VALUE: &str = "Valor Asignado";
}

/// One of the five datasets a run needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    Orders,
    Stock,
    Status,
    Prices,
    Responsible,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Orders,
        SourceKind::Stock,
        SourceKind::Status,
        SourceKind::Prices,
        SourceKind::Responsible,
    ];

    /// Required/optional columns and join key of this source.
    pub fn schema(self) -> SourceSchema {
        use columns::*;
        match self {
            SourceKind::Orders => SourceSchema {
                kind: self,
                required: &[ORDER_ID, LINE_ID, PRODUCT, DUE_DATE, HANDLER],
                optional: &[ORDER_DATE, ROUTE, DESCRIPTION],
                key: &[ORDER_ID, LINE_ID],
            },
            SourceKind::Stock => SourceSchema {
                kind: self,
                required: &[STOCK_PRODUCT],
                optional: &[],
                key: &[STOCK_PRODUCT],
            },
            SourceKind::Status => SourceSchema {
                kind: self,
                required: &[ORDER_ID, LINE_ID],
                optional: &[],
                key: &[ORDER_ID, LINE_ID],
            },
            SourceKind::Prices => SourceSchema {
                kind: self,
                required: &[PRODUCT, PRICE_VALUE],
                optional: &[ON_HAND],
                key: &[PRODUCT],
            },
            SourceKind::Responsible => SourceSchema {
                kind: self,
                required: &[HANDLER, RESPONSIBLE],
                optional: &[],
                key: &[HANDLER],
            },
        }
    }

    /// Suffix given to right-hand columns that collide during a join.
    pub fn column_suffix(self) -> String {
        self.to_string().to_uppercase()
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Orders => write!(f, "Ordenes"),
            SourceKind::Stock => write!(f, "Stock"),
            SourceKind::Status => write!(f, "Estado"),
            SourceKind::Prices => write!(f, "Precios"),
            SourceKind::Responsible => write!(f, "Responsable"),
        }
    }
}

/// Column contract of one logical source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSchema {
    pub kind: SourceKind,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    pub key: &'static [&'static str],
}

/// A table whose labels are normalized and whose required columns are known
/// to be present.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTable {
    kind: SourceKind,
    table: Table,
}

impl ValidatedTable {
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn schema(&self) -> SourceSchema {
        self.kind.schema()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Replaces the rows while keeping the validated columns.
    pub(crate) fn map_table(self, f: impl FnOnce(Table) -> Table) -> Self {
        Self {
            kind: self.kind,
            table: f(self.table),
        }
    }
}

/// Normalizes the labels of `table` and checks every required column of
/// `kind`. All missing columns are reported together.
pub fn validate(kind: SourceKind, mut table: Table) -> Result<ValidatedTable> {
    normalize_columns(&mut table);
    let schema = kind.schema();
    let missing: Vec<String> = schema
        .required
        .iter()
        .filter(|column| !table.has_column(column))
        .map(|column| column.to_string())
        .collect();

    if !missing.is_empty() {
        return Err(ToolError::MissingColumns {
            kind,
            columns: missing,
        });
    }

    let absent_optional: Vec<&str> = schema
        .optional
        .iter()
        .copied()
        .filter(|column| !table.has_column(column))
        .collect();
    if !absent_optional.is_empty() {
        debug!(source = %kind, columns = ?absent_optional, "optional columns absent");
    }

    Ok(ValidatedTable { kind, table })
}

/// How the sheet of a member is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    /// The first sheet of the workbook.
    First,
    /// A sheet with exactly this name.
    Exact(String),
    /// The first sheet whose name starts with this prefix, ignoring case.
    Prefix(String),
    /// The first sheet whose name contains this text, ignoring case.
    Contains(String),
}

impl SheetSelector {
    /// Picks the matching sheet name out of `names`.
    pub fn select<'a>(&self, names: &'a [String]) -> Option<&'a String> {
        match self {
            SheetSelector::First => names.first(),
            SheetSelector::Exact(name) => names.iter().find(|candidate| *candidate == name),
            SheetSelector::Prefix(prefix) => {
                let prefix = prefix.to_lowercase();
                names
                    .iter()
                    .find(|candidate| candidate.to_lowercase().starts_with(&prefix))
            }
            SheetSelector::Contains(needle) => {
                let needle = needle.to_lowercase();
                names
                    .iter()
                    .find(|candidate| candidate.to_lowercase().contains(&needle))
            }
        }
    }
}

impl fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelector::First => write!(f, "<first sheet>"),
            SheetSelector::Exact(name) => write!(f, "'{name}'"),
            SheetSelector::Prefix(prefix) => write!(f, "'{prefix}*'"),
            SheetSelector::Contains(needle) => write!(f, "'*{needle}*'"),
        }
    }
}

/// Secondary sheet bundled in a source member, loaded when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubSheet {
    /// Name used for the sheet in per-source output.
    pub label: String,
    pub selector: SheetSelector,
}

/// Where a logical source lives inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    /// Exact member file name, preferred over the keyword.
    pub file_name: String,
    /// Case-insensitive fragment of the member file name.
    pub keyword: String,
    pub sheet: SheetSelector,
    /// Banner rows above the header.
    pub skip_rows: usize,
    pub sub_sheets: Vec<SubSheet>,
}

impl SourceDescriptor {
    fn new(kind: SourceKind, file_name: &str, keyword: &str) -> Self {
        Self {
            kind,
            file_name: file_name.to_string(),
            keyword: keyword.to_string(),
            sheet: SheetSelector::First,
            skip_rows: 0,
            sub_sheets: Vec::new(),
        }
    }

    fn with_sheet(mut self, sheet: SheetSelector) -> Self {
        self.sheet = sheet;
        self
    }

    fn with_skip_rows(mut self, skip_rows: usize) -> Self {
        self.skip_rows = skip_rows;
        self
    }

    fn with_sub_sheet(mut self, label: &str, selector: SheetSelector) -> Self {
        self.sub_sheets.push(SubSheet {
            label: label.to_string(),
            selector,
        });
        self
    }
}

/// Known export layouts. They describe the same five sources and differ only
/// in file and sheet names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Five workbooks, stock on the first sheet below two banner rows.
    #[default]
    Standard,
    /// Named stock and company sheets.
    Company,
    /// Stock delivered as an inventory workbook with a `BPCS` sheet.
    Inventario,
}

impl Layout {
    /// Source descriptors in load order.
    pub fn manifest(self) -> Vec<SourceDescriptor> {
        let stock = match self {
            Layout::Standard => SourceDescriptor::new(SourceKind::Stock, "Stock.xlsx", "stock")
                .with_skip_rows(2),
            Layout::Company => SourceDescriptor::new(SourceKind::Stock, "Stock.xlsx", "stock")
                .with_sheet(SheetSelector::Prefix("stock".into())),
            Layout::Inventario => {
                SourceDescriptor::new(SourceKind::Stock, "INVENTARIO.xlsx", "inventario")
                    .with_sheet(SheetSelector::Prefix("BPCS".into()))
            }
        }
        .with_sub_sheet("WMS", SheetSelector::Contains("wms".into()))
        .with_sub_sheet(
            "Contenedor pendiente",
            SheetSelector::Exact("Contenedor pendiente".into()),
        );

        let responsible =
            SourceDescriptor::new(SourceKind::Responsible, "Responsable.xlsx", "respons");
        let responsible = match self {
            Layout::Standard => responsible,
            Layout::Company | Layout::Inventario => {
                responsible.with_sheet(SheetSelector::Exact("Empresa".into()))
            }
        };

        vec![
            SourceDescriptor::new(SourceKind::Orders, "Ordenes.xlsx", "orden"),
            stock,
            SourceDescriptor::new(SourceKind::Status, "Estado.xlsx", "estado"),
            SourceDescriptor::new(SourceKind::Prices, "Precios.xlsx", "precio"),
            responsible,
        ]
    }
}
