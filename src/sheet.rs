//! Minimal `.xlsx` reader: sheet names, shared strings and cell values of one
//! worksheet. Styles and number formats are ignored; dates come back as their
//! serial numbers.

use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

// Worksheet size limits: 1,048,576 rows by 16,384 columns (A..XFD).
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

const TAG_SHEET: QName = QName(b"sheet");
const TAG_RELATIONSHIP: QName = QName(b"Relationship");
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");
const TAG_TEXT: QName = QName(b"t");
const TAG_ROW: QName = QName(b"row");
const TAG_CELL: QName = QName(b"c");
const TAG_VALUE: QName = QName(b"v");

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("not a readable xlsx workbook: {0}")]
    Zip(#[from] ZipError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("malformed workbook xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed workbook xml: {0}")]
    XmlEncoding(#[from] quick_xml::encoding::EncodingError),

    #[error("malformed workbook xml: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("workbook is missing {0}")]
    MissingPart(String),

    #[error("workbook has no sheet named '{0}'")]
    SheetNotFound(String),

    #[error("workbook has no sheets")]
    NoSheets,

    #[error("bad cell reference '{0}'")]
    BadCellReference(String),

    #[error("unknown xml entity '{0}'")]
    BadEntity(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            CellValue::Bool(b) => Some(b.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SheetGrid {
    pub name: String,
    pub rows: Vec<Vec<CellValue>>,
}

pub struct Workbook {
    zip: ZipArchive<Cursor<Vec<u8>>>,
    /// (sheet name, part path inside the archive)
    sheets: Vec<(String, String)>,
}

impl Workbook {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, SheetError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let workbook_xml = part_text(&mut zip, "xl/workbook.xml")?
            .ok_or_else(|| SheetError::MissingPart("xl/workbook.xml".to_string()))?;
        let rels_xml = part_text(&mut zip, "xl/_rels/workbook.xml.rels")?;

        let declared = parse_workbook_sheets(&workbook_xml)?;
        let targets = match rels_xml {
            Some(text) => parse_relationships(&text)?,
            None => Vec::new(),
        };

        let sheets = declared
            .into_iter()
            .enumerate()
            .map(|(i, (name, rel_id))| {
                let path = rel_id
                    .and_then(|id| targets.iter().find(|(rid, _)| *rid == id).map(|(_, t)| t.clone()))
                    .map(|target| normalize_target(&target))
                    .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", i + 1));
                (name, path)
            })
            .collect();

        Ok(Self { zip, sheets })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Reads the named sheet, or the first one when `name` is `None`.
    pub fn read(&mut self, name: Option<&str>) -> Result<SheetGrid, SheetError> {
        let (sheet_name, path) = match name {
            Some(n) => self
                .sheets
                .iter()
                .find(|(s, _)| s == n)
                .cloned()
                .ok_or_else(|| SheetError::SheetNotFound(n.to_string()))?,
            None => self.sheets.first().cloned().ok_or(SheetError::NoSheets)?,
        };

        let shared = match part_text(&mut self.zip, "xl/sharedStrings.xml")? {
            Some(text) => parse_shared_strings(&text)?,
            None => Vec::new(),
        };
        let sheet_xml = part_text(&mut self.zip, &path)?.ok_or(SheetError::MissingPart(path))?;
        let rows = parse_sheet_rows(&sheet_xml, &shared)?;
        Ok(SheetGrid {
            name: sheet_name,
            rows,
        })
    }
}

fn part_text(zip: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Result<Option<String>, SheetError> {
    let wanted = name.replace('\\', "/");
    let found = zip
        .file_names()
        .find(|f| f.eq_ignore_ascii_case(&wanted))
        .map(|f| f.to_string());
    let Some(found) = found else {
        return Ok(None);
    };
    let mut text = String::new();
    match zip.by_name(&found) {
        Ok(mut file) => {
            file.read_to_string(&mut text)?;
            Ok(Some(text))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn normalize_target(target: &str) -> String {
    let t = target.replace('\\', "/");
    match t.strip_prefix('/') {
        Some(abs) => abs.to_string(),
        None if t.starts_with("xl/") => t,
        None => format!("xl/{}", t),
    }
}

fn xml_reader(text: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(text);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.expand_empty_elements = true;
    config.trim_text(false);
    reader
}

fn attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, SheetError> {
    match e.try_get_attribute(name)? {
        Some(a) => Ok(Some(a.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn push_ref(out: &mut String, r: &BytesRef<'_>) -> Result<(), SheetError> {
    let raw = r.xml_content()?;
    if let Some(num) = raw.strip_prefix('#') {
        let code = match num.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => num.parse::<u32>(),
        }
        .map_err(|_| SheetError::BadEntity(raw.to_string()))?;
        if let Some(ch) = char::from_u32(code) {
            out.push(ch);
        }
    } else if let Some(entity) = resolve_xml_entity(&raw) {
        out.push_str(entity);
    } else {
        return Err(SheetError::BadEntity(raw.to_string()));
    }
    Ok(())
}

fn parse_workbook_sheets(text: &str) -> Result<Vec<(String, Option<String>)>, SheetError> {
    let mut reader = xml_reader(text);
    let mut out = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name() == TAG_SHEET => {
                let name = attr(&e, "name")?.unwrap_or_default();
                out.push((name, attr(&e, "r:id")?));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

fn parse_relationships(text: &str) -> Result<Vec<(String, String)>, SheetError> {
    let mut reader = xml_reader(text);
    let mut out = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name() == TAG_RELATIONSHIP => {
                if let (Some(id), Some(target)) = (attr(&e, "Id")?, attr(&e, "Target")?) {
                    out.push((id, target));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

fn parse_shared_strings(text: &str) -> Result<Vec<String>, SheetError> {
    let mut reader = xml_reader(text);
    let mut out = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut in_phonetic = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name() == TAG_SHARED_STRING_ITEM => current = Some(String::new()),
            Event::Start(e) if e.name() == TAG_PHONETIC_TEXT => in_phonetic = true,
            Event::Start(e) if e.name() == TAG_TEXT => in_text = !in_phonetic,
            Event::Text(t) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.xml_content()?);
                }
            }
            Event::GeneralRef(r) if in_text => {
                if let Some(s) = current.as_mut() {
                    push_ref(s, &r)?;
                }
            }
            Event::End(e) if e.name() == TAG_TEXT => in_text = false,
            Event::End(e) if e.name() == TAG_PHONETIC_TEXT => in_phonetic = false,
            Event::End(e) if e.name() == TAG_SHARED_STRING_ITEM => {
                out.push(current.take().unwrap_or_default());
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Zero-based column index of a reference such as `AB12`. Columns past
/// `XFD` are rejected.
pub fn column_index(reference: &str) -> Result<usize, SheetError> {
    let bad = || SheetError::BadCellReference(reference.to_string());
    let letters: String = reference.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if letters.is_empty() {
        return Err(bad());
    }
    let mut idx: usize = 0;
    for ch in letters.chars() {
        let digit = ch.to_ascii_uppercase() as usize - 'A' as usize + 1;
        idx = idx
            .checked_mul(26)
            .and_then(|v| v.checked_add(digit))
            .filter(|v| *v <= MAX_COLUMNS)
            .ok_or_else(bad)?;
    }
    Ok(idx - 1)
}

/// Zero-based row index from a `<row r="..">` attribute. Rows past the
/// worksheet limit are rejected.
fn row_index(r: &str) -> Result<Option<usize>, SheetError> {
    match r.trim().parse::<u64>() {
        Ok(0) | Err(_) => Ok(None),
        Ok(n) if n <= MAX_ROWS as u64 => Ok(Some(n as usize - 1)),
        Ok(_) => Err(SheetError::BadCellReference(r.to_string())),
    }
}

struct PendingCell {
    col: usize,
    kind: Option<String>,
    text: String,
}

fn finish_cell(cell: PendingCell, shared: &[String]) -> CellValue {
    let raw = cell.text;
    match cell.kind.as_deref() {
        Some("s") => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i).cloned())
            .map(CellValue::Text)
            .unwrap_or(CellValue::Empty),
        Some("inlineStr") | Some("str") | Some("e") => CellValue::Text(raw),
        Some("b") => CellValue::Bool(raw.trim() == "1"),
        _ if raw.trim().is_empty() => CellValue::Empty,
        _ => match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => CellValue::Number(n),
            _ => CellValue::Text(raw),
        },
    }
}

fn parse_sheet_rows(text: &str, shared: &[String]) -> Result<Vec<Vec<CellValue>>, SheetError> {
    let mut reader = xml_reader(text);
    let mut rows: Vec<Vec<CellValue>> = Vec::new();
    let mut current_row: Option<usize> = None;
    let mut next_col = 0usize;
    let mut cell: Option<PendingCell> = None;
    let mut capture = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name() == TAG_ROW => {
                let declared = match attr(&e, "r")? {
                    Some(r) => row_index(&r)?,
                    None => None,
                };
                let idx = declared.unwrap_or(rows.len());
                if idx >= MAX_ROWS {
                    return Err(SheetError::BadCellReference(format!("row {}", idx + 1)));
                }
                while rows.len() <= idx {
                    rows.push(Vec::new());
                }
                current_row = Some(idx);
                next_col = 0;
            }
            Event::Start(e) if e.name() == TAG_CELL => {
                let col = match attr(&e, "r")? {
                    Some(r) => column_index(&r)?,
                    None if next_col < MAX_COLUMNS => next_col,
                    None => return Err(SheetError::BadCellReference(format!("column {}", next_col + 1))),
                };
                cell = Some(PendingCell {
                    col,
                    kind: attr(&e, "t")?,
                    text: String::new(),
                });
            }
            Event::Start(e) if e.name() == TAG_VALUE || e.name() == TAG_TEXT => capture = cell.is_some(),
            Event::Text(t) if capture => {
                if let Some(c) = cell.as_mut() {
                    c.text.push_str(&t.xml_content()?);
                }
            }
            Event::GeneralRef(r) if capture => {
                if let Some(c) = cell.as_mut() {
                    push_ref(&mut c.text, &r)?;
                }
            }
            Event::End(e) if e.name() == TAG_VALUE || e.name() == TAG_TEXT => capture = false,
            Event::End(e) if e.name() == TAG_CELL => {
                if let (Some(c), Some(r)) = (cell.take(), current_row) {
                    let col = c.col;
                    let row = &mut rows[r];
                    while row.len() <= col {
                        row.push(CellValue::Empty);
                    }
                    row[col] = finish_cell(c, shared);
                    next_col = col + 1;
                }
            }
            Event::End(e) if e.name() == TAG_ROW => current_row = None,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_map_to_indexes() {
        assert_eq!(column_index("A1").expect("A1"), 0);
        assert_eq!(column_index("e7").expect("e7"), 4);
        assert_eq!(column_index("Z3").expect("Z3"), 25);
        assert_eq!(column_index("AA10").expect("AA10"), 26);
        assert!(column_index("12").is_err());
    }

    #[test]
    fn column_references_stop_at_xfd() {
        assert_eq!(column_index("XFD1").expect("XFD1"), 16_383);
        assert!(matches!(column_index("XFE1"), Err(SheetError::BadCellReference(_))));
        assert!(matches!(
            column_index("ZZZZZZZZZZZZZZ1"),
            Err(SheetError::BadCellReference(_))
        ));
    }

    #[test]
    fn out_of_range_references_are_rejected_before_allocating() {
        let far_row = r#"<worksheet><sheetData><row r="4000000000"><c r="A4000000000"><v>1</v></c></row></sheetData></worksheet>"#;
        assert!(matches!(
            parse_sheet_rows(far_row, &[]),
            Err(SheetError::BadCellReference(_))
        ));

        let far_col = r#"<worksheet><sheetData><row r="1"><c r="ZZZZZZ1"><v>1</v></c></row></sheetData></worksheet>"#;
        assert!(matches!(
            parse_sheet_rows(far_col, &[]),
            Err(SheetError::BadCellReference(_))
        ));

        let last = r#"<worksheet><sheetData><row r="1"><c r="XFD1"><v>1</v></c></row></sheetData></worksheet>"#;
        let rows = parse_sheet_rows(last, &[]).expect("parse");
        assert_eq!(rows[0].len(), 16_384);
    }

    #[test]
    fn non_finite_numbers_stay_text() {
        let xml = r#"<worksheet><sheetData><row r="1"><c r="A1"><v>NaN</v></c><c r="B1"><v>inf</v></c></row></sheetData></worksheet>"#;
        let rows = parse_sheet_rows(xml, &[]).expect("parse");
        assert_eq!(rows[0][0], CellValue::Text("NaN".to_string()));
        assert_eq!(rows[0][1], CellValue::Text("inf".to_string()));
    }

    #[test]
    fn shared_strings_skip_phonetic_runs() {
        let xml = r#"<sst><si><t>Nome</t></si><si><r><t>Ma</t></r><r><t>th &amp; Art</t></r><rPh><t>x</t></rPh></si></sst>"#;
        let s = parse_shared_strings(xml).expect("parse");
        assert_eq!(s, vec!["Nome".to_string(), "Math & Art".to_string()]);
    }

    #[test]
    fn sheet_rows_place_cells_by_reference() {
        let shared = vec!["Nome".to_string()];
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="inlineStr"><is><t>Math</t></is></c></row>
            <row r="3"><c r="A3"><v>7.5</v></c><c r="B3" t="b"><v>1</v></c><c r="C3"/></row>
        </sheetData></worksheet>"#;
        let rows = parse_sheet_rows(xml, &shared).expect("parse");
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0],
            vec![
                CellValue::Text("Nome".to_string()),
                CellValue::Empty,
                CellValue::Text("Math".to_string())
            ]
        );
        assert!(rows[1].is_empty());
        assert_eq!(rows[2][0], CellValue::Number(7.5));
        assert_eq!(rows[2][1], CellValue::Bool(true));
        assert_eq!(rows[2][2], CellValue::Empty);
    }

    #[test]
    fn relationship_targets_resolve_under_xl() {
        assert_eq!(normalize_target("worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
        assert_eq!(normalize_target("/xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
    }
}
