//! Joins the validated sources into one combined table.
//!
//! Orders is the spine. Stock, Status, Prices and Responsible are
//! deduplicated on their join key and then left-joined in that fixed order, so
//! the combined table always has exactly one row per order line.

pub mod derived;
pub mod join;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::dedup::{DuplicatePolicy, KeyMode, KeySpec, dedup};
use crate::error::{Result, ToolError};
use crate::model::Table;
use crate::schema::{SourceKind, ValidatedTable, columns};

pub use join::left_join;

/// Knobs of one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileOptions {
    pub policy: DuplicatePolicy,
    pub key_mode: KeyMode,
}

/// The five validated inputs of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Sources {
    pub orders: ValidatedTable,
    pub stock: ValidatedTable,
    pub status: ValidatedTable,
    pub prices: ValidatedTable,
    pub responsible: ValidatedTable,
}

/// Counters describing what a run did to its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RunReport {
    pub orders_rows: usize,
    pub combined_rows: usize,
    /// Rows removed per source by deduplication.
    pub dropped_duplicates: BTreeMap<String, usize>,
    /// Order rows whose due date could not be parsed.
    pub date_failures: usize,
}

/// Result of [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub combined: Table,
    /// Inputs as they were joined: Orders with its derived column, the other
    /// sources after deduplication.
    pub sources: Vec<ValidatedTable>,
    pub report: RunReport,
}

/// Join steps in application order: source and key on the combined table.
/// The source side of each join uses the key its schema declares.
fn join_plan(key_mode: KeyMode) -> [(SourceKind, KeySpec); 4] {
    let product = KeySpec::single(columns::PRODUCT);
    [
        (SourceKind::Stock, product.clone()),
        (
            SourceKind::Status,
            KeySpec::new(&[columns::ORDER_ID, columns::LINE_ID], key_mode),
        ),
        (SourceKind::Prices, product),
        (SourceKind::Responsible, KeySpec::single(columns::HANDLER)),
    ]
}

/// Builds the combined table. `today` is the date the due-date countdown is
/// measured from.
#[instrument(level = "info", skip_all, fields(orders = sources.orders.table().len(), %today))]
pub fn reconcile(sources: Sources, options: &ReconcileOptions, today: NaiveDate) -> Result<Reconciled> {
    let Sources {
        orders,
        stock,
        status,
        prices,
        responsible,
    } = sources;

    let mut report = RunReport {
        orders_rows: orders.table().len(),
        ..RunReport::default()
    };

    let (days, failures) = derived::control_days(orders.table(), today);
    report.date_failures = failures;
    let orders = orders.map_table(|mut table| {
        table.push_column(columns::CONTROL_DAYS, days);
        table
    });

    let mut combined = orders.table().clone();
    let mut joined_sources = vec![orders];
    let mut right_sides = [stock, status, prices, responsible].into_iter();

    for (kind, left_key) in join_plan(options.key_mode) {
        let source = right_sides
            .next()
            .filter(|source| source.kind() == kind)
            .ok_or(ToolError::SourceNotFound { kind })?;
        let right_key = KeySpec::new(source.schema().key, options.key_mode);
        let deduplicated = dedup(source, &right_key, options.policy)?;
        report
            .dropped_duplicates
            .insert(kind.to_string(), deduplicated.dropped);

        let before = combined.len();
        combined = left_join(&combined, &deduplicated.source, &left_key, &right_key)?;
        if combined.len() != before {
            return Err(ToolError::JoinFanOut {
                kind,
                before,
                after: combined.len(),
            });
        }
        debug!(source = %kind, columns = combined.width(), "joined source");
        joined_sources.push(deduplicated.source);
    }

    let prices = joined_sources
        .iter()
        .find(|source| source.kind() == SourceKind::Prices)
        .map(|source| source.table().clone())
        .unwrap_or_default();
    let values = derived::assigned_values(&combined, &prices);
    combined.push_column(columns::ASSIGNED_VALUE, values);

    report.combined_rows = combined.len();
    info!(
        rows = report.combined_rows,
        columns = combined.width(),
        date_failures = report.date_failures,
        "sources reconciled"
    );

    Ok(Reconciled {
        combined,
        sources: joined_sources,
        report,
    })
}
