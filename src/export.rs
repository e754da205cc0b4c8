use crate::ingest::SheetLayout;
use crate::model::{WideRow, WideTable};
use anyhow::Context;
use std::path::Path;

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Header line plus one data line for a single student. The identity columns
/// carry the names of the layout the sheet was read with.
pub fn student_row_csv(table: &WideTable, row: &WideRow, layout: &SheetLayout) -> String {
    let s = &row.student;
    let mut header = vec![layout.identifier_column.clone()];
    let mut fields = vec![s.identifier.to_string()];
    if let Some(col) = &layout.registration_column {
        header.push(col.clone());
        fields.push(s.registration_code.clone().unwrap_or_default());
    }
    header.push(layout.name_column.clone());
    fields.push(s.name.clone());
    if let Some(col) = &layout.email_column {
        header.push(col.clone());
        fields.push(s.email.clone().unwrap_or_default());
    }

    header.extend(table.subjects().iter().cloned());
    fields.extend(row.values().map(|v| v.map(|x| x.to_string()).unwrap_or_default()));

    let line = |cols: &[String]| cols.iter().map(|c| csv_quote(c)).collect::<Vec<_>>().join(",");
    format!("{}\n{}\n", line(&header), line(&fields))
}

pub fn write_csv(path: &Path, text: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
        }
    }
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.to_string_lossy()))
}
