use std::fs;
use std::io::{Cursor, Write};

use calamine::{DataType, Reader, Xlsx, open_workbook};
use chrono::NaiveDate;
use order_recon::aggregate::{StatusCrossTab, UNASSIGNED_LABEL};
use order_recon::model::CellValue;
use order_recon::pipeline::{self, RunOptions};
use order_recon::schema::{Layout, SourceKind, columns};
use order_recon::ToolError;
use rust_xlsxwriter::Workbook;
use tempfile::tempdir;
use zip::ZipArchive;
use zip::write::FileOptions;

#[derive(Clone, Copy)]
enum Cell {
    Text(&'static str),
    Number(f64),
    Blank,
}

use Cell::{Blank, Number, Text};

type Sheet<'a> = (&'a str, Vec<Vec<Cell>>);

fn xlsx(sheets: &[Sheet<'_>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).expect("sheet named");
        for (row_idx, row) in rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                let (row_num, col_num) = (row_idx as u32, col_idx as u16);
                match cell {
                    Text(value) => {
                        worksheet.write_string(row_num, col_num, *value).expect("text written");
                    }
                    Number(value) => {
                        worksheet.write_number(row_num, col_num, *value).expect("number written");
                    }
                    Blank => {}
                }
            }
        }
    }
    workbook.save_to_buffer().expect("workbook saved")
}

fn zip_archive(members: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in members {
        writer
            .start_file(*name, FileOptions::default())
            .expect("member started");
        writer.write_all(bytes).expect("member written");
    }
    writer.finish().expect("archive finished").into_inner()
}

fn orders() -> Vec<u8> {
    xlsx(&[(
        "Hoja1",
        vec![
            vec![Text("LORD"), Text("LLINE"), Text("LPROD"), Text("LDESC"), Text("LRDTE"), Text("HNAME")],
            vec![Number(1.0), Number(1.0), Text("A1"), Text("Tornillo"), Number(20250110.0), Text("H1")],
            vec![Number(1.0), Number(2.0), Text("b2 "), Text("Tuerca"), Number(20250230.0), Text("H2")],
            vec![Number(2.0), Number(1.0), Text("C3"), Text("Arandela"), Number(20241231.0), Text("H3")],
        ],
    )])
}

fn stock(main_sheet: &str, banner: bool) -> Vec<u8> {
    let mut rows = Vec::new();
    if banner {
        rows.push(vec![Text("Reporte de stock")]);
        rows.push(vec![Text("Generado por BPCS")]);
    }
    rows.extend([
        vec![Text("Cod. Producto"), Text("Ubicación"), Text("Zona")],
        vec![Text("A1"), Text("R-01"), Text("Z1")],
        vec![Text("B2"), Text("R-02"), Text("Z2")],
        vec![Text("A1"), Text("R-09"), Text("Z9")],
    ]);
    xlsx(&[
        (main_sheet, rows),
        (
            "Datos WMS",
            vec![
                vec![Text("Cod. Producto"), Text("Cantidad WMS")],
                vec![Text("A1"), Number(4.0)],
            ],
        ),
        (
            "Contenedor pendiente",
            vec![
                vec![Text("Cod. Producto"), Text("Contenedor")],
                vec![Text("C3"), Text("MSKU1")],
            ],
        ),
    ])
}

fn status() -> Vec<u8> {
    xlsx(&[(
        "Hoja1",
        vec![
            vec![Text("LORD"), Text("LLINE"), Text("Estado")],
            vec![Number(1.0), Number(1.0), Text("Listo")],
            vec![Number(2.0), Number(1.0), Text("Pendiente")],
        ],
    )])
}

fn prices(product_header: &'static str) -> Vec<u8> {
    xlsx(&[(
        "Hoja1",
        vec![
            vec![Text(product_header), Text("Valor"), Text("On Hand")],
            vec![Text("a1"), Number(10.0), Number(5.0)],
            vec![Text("B2"), Number(2.5), Blank],
        ],
    )])
}

fn responsible(sheet: &str) -> Vec<u8> {
    xlsx(&[(
        sheet,
        vec![
            vec![Text("HNAME"), Text("RESP")],
            vec![Text("H1"), Text("Alice")],
            vec![Text("H1"), Text("Bob")],
            vec![Text("H2"), Text("Carol")],
        ],
    )])
}

fn standard_archive() -> Vec<u8> {
    zip_archive(&[
        ("Ordenes.xlsx", orders()),
        ("Stock.xlsx", stock("Stock", true)),
        ("Estado.xlsx", status()),
        ("Precios.xlsx", prices("LPROD")),
        ("Responsable.xlsx", responsible("Hoja1")),
    ])
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date")
}

#[test]
fn archive_reconciles_into_one_row_per_order_line() {
    let outcome = pipeline::run(standard_archive(), &RunOptions::default(), today())
        .expect("run succeeds");
    let combined = &outcome.combined;

    assert_eq!(combined.len(), 3);
    assert_eq!(outcome.report.orders_rows, 3);
    assert_eq!(outcome.report.date_failures, 1);
    assert_eq!(outcome.report.dropped_duplicates.get("Stock"), Some(&1));
    assert_eq!(outcome.report.dropped_duplicates.get("Responsable"), Some(&1));

    assert_eq!(combined.cell(0, "UBICACIÓN"), Some(&CellValue::from("R-01")));
    assert_eq!(combined.cell(0, "ESTADO"), Some(&CellValue::from("Listo")));
    assert_eq!(combined.cell(0, columns::RESPONSIBLE), Some(&CellValue::from("Alice")));
    assert_eq!(combined.cell(0, columns::ASSIGNED_VALUE), Some(&CellValue::Float(10.0)));
    assert_eq!(combined.cell(0, columns::CONTROL_DAYS), Some(&CellValue::Int(9)));

    assert_eq!(combined.cell(1, "UBICACIÓN"), Some(&CellValue::from("R-02")));
    assert_eq!(combined.cell(1, "ESTADO"), Some(&CellValue::Null));
    assert_eq!(combined.cell(1, columns::ASSIGNED_VALUE), Some(&CellValue::Float(2.5)));
    assert_eq!(combined.cell(1, columns::CONTROL_DAYS), Some(&CellValue::Null));

    assert_eq!(combined.cell(2, "ESTADO"), Some(&CellValue::from("Pendiente")));
    assert_eq!(combined.cell(2, columns::ASSIGNED_VALUE), Some(&CellValue::Null));
    assert_eq!(combined.cell(2, columns::RESPONSIBLE), Some(&CellValue::Null));
    assert_eq!(combined.cell(2, columns::CONTROL_DAYS), Some(&CellValue::Int(-1)));

    let summary = &outcome.summary;
    let labels: Vec<&str> = summary.groups.iter().map(|g| g.label.as_str()).collect();
    assert_eq!(labels, vec!["Alice", "Carol", UNASSIGNED_LABEL]);
    assert_eq!(summary.total.count, 3);
    assert_eq!(summary.total.percentage, 100.0);

    assert_eq!(outcome.artifacts.len(), 1);
    assert_eq!(outcome.artifacts[0].file_name, pipeline::COMBINED_FILE);
}

#[test]
fn outputs_are_written_and_readable() {
    let temp_dir = tempdir().expect("temporary directory");
    let input = temp_dir.path().join("carga.zip");
    fs::write(&input, standard_archive()).expect("archive written");
    let output = temp_dir.path().join("salida");

    let options = RunOptions {
        per_source: true,
        per_responsible: true,
        summary_json: true,
        cross_tab: Some(StatusCrossTab {
            column: "ESTADO".into(),
            labels: vec!["LISTO".into(), "PENDIENTE".into()],
        }),
        ..RunOptions::default()
    };
    let (outcome, written) =
        pipeline::reconcile_archive(&input, &output, &options).expect("run succeeds");
    assert_eq!(written.len(), 4);
    assert_eq!(outcome.summary.total.status_counts, vec![1, 1]);

    let mut combined: Xlsx<_> =
        open_workbook(output.join(pipeline::COMBINED_FILE)).expect("combined workbook opens");
    assert_eq!(
        combined.sheet_names().to_owned(),
        vec![
            pipeline::COMBINED_SHEET.to_string(),
            pipeline::SUMMARY_SHEET.to_string(),
            pipeline::DETAIL_SHEET.to_string(),
        ]
    );
    let range = combined
        .worksheet_range(pipeline::COMBINED_SHEET)
        .expect("combined sheet present")
        .expect("combined sheet read");
    assert_eq!(range.height(), 4);
    let header: Vec<String> = range
        .rows()
        .next()
        .expect("header row")
        .iter()
        .map(|cell| cell.to_string())
        .collect();
    let value_column = header
        .iter()
        .position(|label| label == columns::ASSIGNED_VALUE)
        .expect("assigned value column");
    assert_eq!(range.get((1, value_column)), Some(&DataType::Float(10.0)));

    let per_source: Xlsx<_> =
        open_workbook(output.join(pipeline::PER_SOURCE_FILE)).expect("per-source workbook opens");
    let sheets = per_source.sheet_names().to_owned();
    for kind in SourceKind::ALL {
        assert!(sheets.contains(&kind.to_string()), "missing sheet for {kind}");
    }
    assert!(sheets.contains(&"Stock WMS".to_string()));
    assert!(sheets.contains(&"Stock Contenedor pendiente".to_string()));

    let groups = fs::File::open(output.join(pipeline::PER_RESPONSIBLE_FILE)).expect("zip opens");
    let groups = ZipArchive::new(groups).expect("zip readable");
    let mut members: Vec<&str> = groups.file_names().collect();
    members.sort_unstable();
    assert_eq!(members, vec!["Alice.xlsx", "Carol.xlsx", "Sin_responsable.xlsx"]);

    let json = fs::read_to_string(output.join(pipeline::SUMMARY_JSON_FILE)).expect("json read");
    let json: serde_json::Value = serde_json::from_str(&json).expect("json parsed");
    assert_eq!(json["summary"]["total"]["percentage"], serde_json::json!(100.0));
    assert_eq!(json["report"]["combined_rows"], serde_json::json!(3));
}

#[test]
fn missing_price_key_aborts_without_output() {
    let archive = zip_archive(&[
        ("Ordenes.xlsx", orders()),
        ("Stock.xlsx", stock("Stock", true)),
        ("Estado.xlsx", status()),
        ("Precios.xlsx", prices("Producto")),
        ("Responsable.xlsx", responsible("Hoja1")),
    ]);
    let temp_dir = tempdir().expect("temporary directory");
    let input = temp_dir.path().join("carga.zip");
    fs::write(&input, archive).expect("archive written");
    let output = temp_dir.path().join("salida");

    let error = pipeline::reconcile_archive(&input, &output, &RunOptions::default())
        .expect_err("run fails");
    match error {
        ToolError::MissingColumns { kind, columns } => {
            assert_eq!(kind, SourceKind::Prices);
            assert_eq!(columns, vec!["LPROD".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!output.exists());
}

#[test]
fn members_are_found_by_keyword() {
    let archive = zip_archive(&[
        ("export/ordenes_enero.xlsx", orders()),
        ("export/STOCK_actual.xlsx", stock("Stock", true)),
        ("export/estado.xlsx", status()),
        ("export/lista precios.xlsx", prices("LPROD")),
        ("export/Responsables.xlsx", responsible("Hoja1")),
    ]);
    let outcome = pipeline::run(archive, &RunOptions::default(), today()).expect("run succeeds");
    assert_eq!(outcome.combined.len(), 3);
}

#[test]
fn missing_source_is_reported() {
    let archive = zip_archive(&[
        ("Ordenes.xlsx", orders()),
        ("Stock.xlsx", stock("Stock", true)),
        ("Precios.xlsx", prices("LPROD")),
        ("Responsable.xlsx", responsible("Hoja1")),
    ]);
    let error = pipeline::run(archive, &RunOptions::default(), today()).expect_err("run fails");
    assert!(matches!(error, ToolError::SourceNotFound { kind: SourceKind::Status }));
}

#[test]
fn company_layout_requires_named_sheets() {
    let options = RunOptions {
        layout: Layout::Company,
        ..RunOptions::default()
    };

    let archive = zip_archive(&[
        ("Ordenes.xlsx", orders()),
        ("Stock.xlsx", stock("Stock BPCS", false)),
        ("Estado.xlsx", status()),
        ("Precios.xlsx", prices("LPROD")),
        ("Responsable.xlsx", responsible("Hoja1")),
    ]);
    let error = pipeline::run(archive, &options, today()).expect_err("run fails");
    assert!(matches!(
        error,
        ToolError::SheetNotFound { kind: SourceKind::Responsible, .. }
    ));

    let archive = zip_archive(&[
        ("Ordenes.xlsx", orders()),
        ("Stock.xlsx", stock("Stock BPCS", false)),
        ("Estado.xlsx", status()),
        ("Precios.xlsx", prices("LPROD")),
        ("Responsable.xlsx", responsible("Empresa")),
    ]);
    let outcome = pipeline::run(archive, &options, today()).expect("run succeeds");
    assert_eq!(outcome.combined.len(), 3);
    assert_eq!(outcome.combined.cell(0, "UBICACIÓN"), Some(&CellValue::from("R-01")));
}

#[test]
fn inventario_layout_reads_the_bpcs_sheet() {
    let options = RunOptions {
        layout: Layout::Inventario,
        per_source: true,
        ..RunOptions::default()
    };

    let archive = zip_archive(&[
        ("Ordenes.xlsx", orders()),
        ("INVENTARIO.xlsx", stock("BPCS Inventario", false)),
        ("Estado.xlsx", status()),
        ("Precios.xlsx", prices("LPROD")),
        ("Responsable.xlsx", responsible("Empresa")),
    ]);
    let outcome = pipeline::run(archive, &options, today()).expect("run succeeds");
    assert_eq!(outcome.combined.len(), 3);
    assert_eq!(outcome.combined.cell(0, "UBICACIÓN"), Some(&CellValue::from("R-01")));
    assert_eq!(outcome.combined.cell(0, columns::RESPONSIBLE), Some(&CellValue::from("Alice")));
    assert_eq!(outcome.report.dropped_duplicates.get("Stock"), Some(&1));
    assert_eq!(outcome.artifacts.len(), 2);

    let archive = zip_archive(&[
        ("Ordenes.xlsx", orders()),
        ("INVENTARIO.xlsx", stock("Stock", false)),
        ("Estado.xlsx", status()),
        ("Precios.xlsx", prices("LPROD")),
        ("Responsable.xlsx", responsible("Empresa")),
    ]);
    let error = pipeline::run(archive, &options, today()).expect_err("run fails");
    assert!(matches!(
        error,
        ToolError::SheetNotFound { kind: SourceKind::Stock, .. }
    ));
}

#[test]
fn invalid_archive_is_rejected() {
    let error = pipeline::run(b"PK but not really".to_vec(), &RunOptions::default(), today())
        .expect_err("run fails");
    assert!(matches!(error, ToolError::ArchiveInvalid(_)));
}
