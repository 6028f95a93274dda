use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::aggregate::{StatusCrossTab, Summary, summarize};
use crate::error::{Result, ToolError};
use crate::io::archive::SourceArchive;
use crate::io::excel_write::{self, SheetTable};
use crate::model::Table;
use crate::normalize::normalize_columns;
use crate::reconcile::{ReconcileOptions, RunReport, Sources, reconcile};
use crate::schema::{Layout, SourceKind, ValidatedTable, columns, validate};

pub const COMBINED_FILE: &str = "DatosCombinados.xlsx";
pub const COMBINED_SHEET: &str = "DatosCombinados";
pub const SUMMARY_SHEET: &str = "Resumen";
pub const DETAIL_SHEET: &str = "Detalle";
pub const PER_SOURCE_FILE: &str = "PorFuente.xlsx";
pub const PER_RESPONSIBLE_FILE: &str = "PorResponsable.zip";
pub const SUMMARY_JSON_FILE: &str = "resumen.json";

/// Columns of the detailed view, in display order. Absent columns are skipped.
pub const DETAIL_COLUMNS: [&str; 19] = [
    columns::CONTROL_DAYS,
    columns::ORDER_DATE,
    columns::ROUTE,
    columns::ORDER_ID,
    columns::LINE_ID,
    columns::PRODUCT,
    columns::DESCRIPTION,
    columns::HANDLER,
    columns::STOCK_PRODUCT,
    "UBICACIÓN",
    "CONTENEDOR",
    "ZONA",
    "SITIO",
    "PEDIDO",
    "UNICO",
    "OBSERVACION",
    columns::PRICE_VALUE,
    columns::ON_HAND,
    columns::RESPONSIBLE,
];

/// Everything that shapes one run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub layout: Layout,
    pub reconcile: ReconcileOptions,
    /// Also write one sheet per logical source.
    pub per_source: bool,
    /// Also write one workbook per responsible party.
    pub per_responsible: bool,
    /// Also write the summary as JSON.
    pub summary_json: bool,
    pub cross_tab: Option<StatusCrossTab>,
}

/// An output file rendered in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Result of [`run`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub combined: Table,
    pub summary: Summary,
    pub report: RunReport,
    pub artifacts: Vec<Artifact>,
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    run_date: String,
    report: &'a RunReport,
    summary: &'a Summary,
}

/// Loads and validates the five sources of `layout`. Secondary sheets are
/// returned with normalized labels, keyed by output sheet name.
pub fn load_sources(
    archive: &mut SourceArchive,
    layout: Layout,
) -> Result<(Sources, Vec<(String, Table)>)> {
    debug!(members = ?archive.member_names(), "archive opened");
    let mut validated: HashMap<SourceKind, ValidatedTable> = HashMap::new();
    let mut extras = Vec::new();

    for descriptor in layout.manifest() {
        let loaded = archive.load(&descriptor)?;
        for (label, mut table) in loaded.sub_tables {
            normalize_columns(&mut table);
            extras.push((format!("{} {label}", loaded.kind), table));
        }
        validated.insert(loaded.kind, validate(loaded.kind, loaded.table)?);
    }

    let mut take = |kind: SourceKind| {
        validated
            .remove(&kind)
            .ok_or(ToolError::SourceNotFound { kind })
    };
    let sources = Sources {
        orders: take(SourceKind::Orders)?,
        stock: take(SourceKind::Stock)?,
        status: take(SourceKind::Status)?,
        prices: take(SourceKind::Prices)?,
        responsible: take(SourceKind::Responsible)?,
    };
    Ok((sources, extras))
}

/// Runs every stage on an archive held in memory and renders the outputs.
/// Nothing is written to disk; any error discards the whole run.
pub fn run(archive_bytes: Vec<u8>, options: &RunOptions, today: NaiveDate) -> Result<RunOutcome> {
    let mut archive = SourceArchive::from_bytes(archive_bytes)?;
    let (sources, extras) = load_sources(&mut archive, options.layout)?;
    drop(archive);

    let reconciled = reconcile(sources, &options.reconcile, today)?;
    let summary = summarize(
        &reconciled.combined,
        columns::RESPONSIBLE,
        options.cross_tab.as_ref(),
    );

    let mut artifacts = Vec::new();
    let summary_table = summary.to_table();
    let detail = reconciled.combined.project(&DETAIL_COLUMNS);
    artifacts.push(Artifact {
        file_name: COMBINED_FILE.to_string(),
        bytes: excel_write::workbook_bytes(&[
            SheetTable::new(COMBINED_SHEET, &reconciled.combined),
            SheetTable::new(SUMMARY_SHEET, &summary_table),
            SheetTable::new(DETAIL_SHEET, &detail),
        ])?,
    });

    if options.per_source {
        let names: Vec<String> = reconciled
            .sources
            .iter()
            .map(|source| source.kind().to_string())
            .collect();
        let mut sheets: Vec<SheetTable<'_>> = reconciled
            .sources
            .iter()
            .zip(&names)
            .map(|(source, name)| SheetTable::new(name, source.table()))
            .collect();
        sheets.extend(
            extras
                .iter()
                .map(|(name, table)| SheetTable::new(name, table)),
        );
        artifacts.push(Artifact {
            file_name: PER_SOURCE_FILE.to_string(),
            bytes: excel_write::workbook_bytes(&sheets)?,
        });
    }

    if options.per_responsible {
        artifacts.push(Artifact {
            file_name: PER_RESPONSIBLE_FILE.to_string(),
            bytes: excel_write::group_archive_bytes(&reconciled.combined, columns::RESPONSIBLE)?,
        });
    }

    if options.summary_json {
        let document = SummaryDocument {
            run_date: today.format("%Y-%m-%d").to_string(),
            report: &reconciled.report,
            summary: &summary,
        };
        artifacts.push(Artifact {
            file_name: SUMMARY_JSON_FILE.to_string(),
            bytes: serde_json::to_vec_pretty(&document)?,
        });
    }

    debug!(artifacts = artifacts.len(), "outputs rendered");
    Ok(RunOutcome {
        combined: reconciled.combined,
        summary,
        report: reconciled.report,
        artifacts,
    })
}

/// Reconciles the archive at `input` and writes the outputs into `output`.
/// Returns the outcome together with the paths written.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), output = %output.display())
)]
pub fn reconcile_archive(
    input: &Path,
    output: &Path,
    options: &RunOptions,
) -> Result<(RunOutcome, Vec<PathBuf>)> {
    let started = Local::now();
    info!(started_at = %started.format("%Y-%m-%d %H:%M:%S"), "run started");

    let bytes = fs::read(input)?;
    let outcome = run(bytes, options, started.date_naive())?;

    fs::create_dir_all(output)?;
    let mut written = Vec::with_capacity(outcome.artifacts.len());
    for artifact in &outcome.artifacts {
        let path = output.join(&artifact.file_name);
        fs::write(&path, &artifact.bytes)?;
        written.push(path);
    }

    info!(
        rows = outcome.report.combined_rows,
        files = written.len(),
        "run finished"
    );
    Ok((outcome, written))
}
