//! Locates logical sources inside the uploaded ZIP archive and decodes them.

use std::io::{Cursor, Read};

use calamine::{Reader, Xlsx};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::{Result, ToolError};
use crate::io::excel_read;
use crate::model::Table;
use crate::schema::{SourceDescriptor, SourceKind};

const SPREADSHEET_EXTENSIONS: [&str; 2] = ["xlsx", "xlsm"];
/// Upper bound on the buffer reserved from a member's declared size.
const MEMBER_CAPACITY_LIMIT: u64 = 64 * 1024 * 1024;

/// A source table as read from the archive, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSource {
    pub kind: SourceKind,
    pub table: Table,
    /// Secondary sheets found in the same member, by label.
    pub sub_tables: Vec<(String, Table)>,
}

/// Uploaded archive held in memory for the duration of a run.
pub struct SourceArchive {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    names: Vec<String>,
}

impl SourceArchive {
    /// Opens an archive from its raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|error| ToolError::ArchiveInvalid(error.to_string()))?;
        let names = archive.file_names().map(str::to_string).collect();
        Ok(Self { archive, names })
    }

    /// Member names in archive order.
    pub fn member_names(&self) -> &[String] {
        &self.names
    }

    /// Finds, opens and decodes the member described by `descriptor`.
    pub fn load(&mut self, descriptor: &SourceDescriptor) -> Result<LoadedSource> {
        let kind = descriptor.kind;
        let member = locate_member(&self.names, descriptor)?.to_string();
        let bytes = self.read_member(&member)?;
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
        let sheets = excel_read::sheet_names(&workbook);

        let sheet = descriptor
            .sheet
            .select(&sheets)
            .ok_or_else(|| ToolError::SheetNotFound {
                kind,
                sheet: descriptor.sheet.to_string(),
            })?
            .clone();
        debug!(source = %kind, %member, %sheet, "selected sheet");
        let table = excel_read::read_table(&mut workbook, kind, &sheet, descriptor.skip_rows)?;

        let mut sub_tables = Vec::new();
        for sub_sheet in &descriptor.sub_sheets {
            match sub_sheet.selector.select(&sheets) {
                Some(name) if *name != sheet => {
                    let sub_table = excel_read::read_table(&mut workbook, kind, name, 0)?;
                    sub_tables.push((sub_sheet.label.clone(), sub_table));
                }
                Some(_) => {
                    debug!(source = %kind, label = %sub_sheet.label, "sub-sheet is the main sheet");
                }
                None => {
                    debug!(source = %kind, label = %sub_sheet.label, "optional sub-sheet absent");
                }
            }
        }

        info!(
            source = %kind,
            %member,
            rows = table.len(),
            columns = table.width(),
            sub_sheets = sub_tables.len(),
            "loaded source"
        );

        Ok(LoadedSource {
            kind,
            table,
            sub_tables,
        })
    }

    fn read_member(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = self
            .archive
            .by_name(name)
            .map_err(|error| ToolError::ArchiveInvalid(format!("{name}: {error}")))?;
        let mut bytes = Vec::with_capacity(capacity_hint(file.size()));
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// Picks the archive member for a source: an exact file name match first,
/// then the first member whose file name contains the keyword, ignoring case.
pub fn locate_member<'a>(names: &'a [String], descriptor: &SourceDescriptor) -> Result<&'a str> {
    let candidates: Vec<&'a String> = names.iter().filter(|name| is_spreadsheet(name)).collect();

    if let Some(exact) = candidates
        .iter()
        .copied()
        .find(|name| base_name(name) == descriptor.file_name)
    {
        return Ok(exact.as_str());
    }

    let keyword = descriptor.keyword.to_lowercase();
    let mut matches = candidates
        .iter()
        .copied()
        .filter(|name| base_name(name).to_lowercase().contains(&keyword));

    let chosen = matches.next().ok_or(ToolError::SourceNotFound {
        kind: descriptor.kind,
    })?;
    let others = matches.count();
    if others > 0 {
        warn!(
            source = %descriptor.kind,
            %chosen,
            others,
            "several members match the source keyword"
        );
    }
    Ok(chosen.as_str())
}

/// The declared size comes from the archive itself and may be forged.
fn capacity_hint(declared: u64) -> usize {
    declared.min(MEMBER_CAPACITY_LIMIT) as usize
}

fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn is_spreadsheet(name: &str) -> bool {
    if name.ends_with('/') || name.starts_with("__MACOSX/") {
        return false;
    }
    let base = base_name(name);
    if base.starts_with("~$") || base.starts_with("._") {
        return false;
    }
    base.rsplit_once('.').is_some_and(|(_, extension)| {
        SPREADSHEET_EXTENSIONS.contains(&extension.to_lowercase().as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Layout;

    fn names(members: &[&str]) -> Vec<String> {
        members.iter().map(|m| m.to_string()).collect()
    }

    fn descriptor(kind: SourceKind) -> SourceDescriptor {
        Layout::Standard
            .manifest()
            .into_iter()
            .find(|d| d.kind == kind)
            .expect("standard layout lists every source")
    }

    #[test]
    fn exact_name_beats_keyword() {
        let members = names(&["ordenes_viejas.xlsx", "export/Ordenes.xlsx"]);
        let found = locate_member(&members, &descriptor(SourceKind::Orders)).expect("orders member");
        assert_eq!(found, "export/Ordenes.xlsx");
    }

    #[test]
    fn keyword_match_ignores_case() {
        let members = names(&["README.txt", "Lista_PRECIOS_2025.XLSX"]);
        let found = locate_member(&members, &descriptor(SourceKind::Prices)).expect("prices member");
        assert_eq!(found, "Lista_PRECIOS_2025.XLSX");
    }

    #[test]
    fn first_keyword_match_wins() {
        let members = names(&["estado_a.xlsx", "estado_b.xlsx"]);
        let found = locate_member(&members, &descriptor(SourceKind::Status)).expect("status member");
        assert_eq!(found, "estado_a.xlsx");
    }

    #[test]
    fn junk_members_are_ignored() {
        let members = names(&[
            "__MACOSX/._Stock.xlsx",
            "~$Stock.xlsx",
            "stock/",
            "stock.csv",
        ]);
        let error = locate_member(&members, &descriptor(SourceKind::Stock))
            .expect_err("no stock member");
        assert!(matches!(error, ToolError::SourceNotFound { kind: SourceKind::Stock }));
    }

    #[test]
    fn non_zip_input_is_rejected() {
        let error = SourceArchive::from_bytes(b"not a zip".to_vec())
            .err()
            .expect("garbage is not an archive");
        assert!(matches!(error, ToolError::ArchiveInvalid(_)));
    }

    fn stored_archive(name: &str, contents: &[u8]) -> Vec<u8> {
        use std::io::Write;
        use zip::write::FileOptions;

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file(name, options).expect("member started");
        writer.write_all(contents).expect("member written");
        writer.finish().expect("archive finished").into_inner()
    }

    /// Overwrites the uncompressed size in the local and central headers.
    fn forge_declared_size(bytes: &mut [u8], size: u32) {
        let patch = |bytes: &mut [u8], signature: &[u8; 4], offset: usize| {
            let start = bytes
                .windows(4)
                .position(|window| window == signature)
                .expect("header present");
            bytes[start + offset..start + offset + 4].copy_from_slice(&size.to_le_bytes());
        };
        patch(bytes, b"PK\x03\x04", 22);
        patch(bytes, b"PK\x01\x02", 24);
    }

    #[test]
    fn forged_member_size_does_not_drive_allocation() {
        let mut bytes = stored_archive("Ordenes.xlsx", b"hello");
        forge_declared_size(&mut bytes, 0xFFFF_FFF0);

        let mut archive = SourceArchive::from_bytes(bytes).expect("archive opens");
        let contents = archive.read_member("Ordenes.xlsx").expect("member read");
        assert_eq!(contents, b"hello");
        assert!(contents.capacity() <= MEMBER_CAPACITY_LIMIT as usize);
    }

    #[test]
    fn capacity_hint_is_capped() {
        assert_eq!(capacity_hint(5), 5);
        assert_eq!(capacity_hint(u64::from(u32::MAX)), MEMBER_CAPACITY_LIMIT as usize);
    }
}
