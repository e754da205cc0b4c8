use crate::model::{GradeFact, StudentRecord, SubjectRecord};
use crate::sheet::CellValue;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("sheet has no header row")]
    NoRows,

    #[error("required column '{0}' not found in header")]
    MissingColumn(String),

    #[error("column '{0}' appears more than once in header")]
    DuplicateColumn(String),

    #[error("row {row}: student identifier '{value}' is not an integer")]
    BadIdentifier { row: usize, value: String },

    #[error("row {row}: student name is empty")]
    MissingName { row: usize },

    #[error("row {row}, column '{column}': '{value}' is not a grade")]
    NonNumericGrade {
        row: usize,
        column: String,
        value: String,
    },
}

/// Header names of the fixed student columns. Every other non-empty header
/// that is not listed in `ignored_columns` is a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SheetLayout {
    pub identifier_column: String,
    pub name_column: String,
    pub registration_column: Option<String>,
    pub email_column: Option<String>,
    pub ignored_columns: Vec<String>,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            identifier_column: "Numero".to_string(),
            name_column: "Nome".to_string(),
            registration_column: Some("RA".to_string()),
            email_column: Some("email".to_string()),
            ignored_columns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub students: Vec<StudentRecord>,
    pub subjects: Vec<SubjectRecord>,
    pub facts: Vec<GradeFact>,
}

fn header_key(s: &str) -> String {
    s.trim().to_lowercase()
}

struct ColumnMap {
    identifier: usize,
    name: usize,
    registration: Option<usize>,
    email: Option<usize>,
    subjects: Vec<(usize, String)>,
}

impl SheetLayout {
    fn map_header(&self, header: &[CellValue]) -> Result<ColumnMap, IngestError> {
        let names: Vec<Option<String>> = header.iter().map(|c| c.as_text()).collect();

        let mut seen = HashSet::new();
        for n in names.iter().flatten() {
            if !seen.insert(header_key(n)) {
                return Err(IngestError::DuplicateColumn(n.clone()));
            }
        }

        let find = |wanted: &str| {
            let key = header_key(wanted);
            names
                .iter()
                .position(|n| n.as_deref().map(header_key).as_deref() == Some(key.as_str()))
        };

        let identifier = find(&self.identifier_column)
            .ok_or_else(|| IngestError::MissingColumn(self.identifier_column.clone()))?;
        let name = find(&self.name_column).ok_or_else(|| IngestError::MissingColumn(self.name_column.clone()))?;
        let registration = self.registration_column.as_deref().and_then(find);
        let email = self.email_column.as_deref().and_then(find);

        let fixed: Vec<usize> = [Some(identifier), Some(name), registration, email]
            .into_iter()
            .flatten()
            .collect();
        let ignored: HashSet<String> = self.ignored_columns.iter().map(|c| header_key(c)).collect();

        let subjects = names
            .iter()
            .enumerate()
            .filter(|(i, _)| !fixed.contains(i))
            .filter_map(|(i, n)| n.as_ref().map(|n| (i, n.clone())))
            .filter(|(_, n)| !ignored.contains(&header_key(n)))
            .collect();

        Ok(ColumnMap {
            identifier,
            name,
            registration,
            email,
            subjects,
        })
    }

    /// Splits a sheet (header row first) into student, subject and grade
    /// records. Every subject cell of every student row becomes a fact, so
    /// blank cells are kept as facts without a value.
    pub fn ingest(&self, rows: &[Vec<CellValue>]) -> Result<Ingested, IngestError> {
        let header_pos = rows
            .iter()
            .position(|r| r.iter().any(|c| !c.is_blank()))
            .ok_or(IngestError::NoRows)?;
        let map = self.map_header(&rows[header_pos])?;

        let subjects: Vec<SubjectRecord> = map.subjects.iter().map(|(_, n)| SubjectRecord::new(n.clone())).collect();
        let mut students = Vec::new();
        let mut facts = Vec::new();

        for (offset, row) in rows.iter().enumerate().skip(header_pos + 1) {
            if row.iter().all(|c| c.is_blank()) {
                continue;
            }
            // 1-based, as shown by spreadsheet tools.
            let row_no = offset + 1;
            let cell = |i: usize| row.get(i).cloned().unwrap_or(CellValue::Empty);

            let identifier = parse_identifier(&cell(map.identifier)).ok_or_else(|| IngestError::BadIdentifier {
                row: row_no,
                value: cell(map.identifier).as_text().unwrap_or_default(),
            })?;
            let name = cell(map.name)
                .as_text()
                .ok_or(IngestError::MissingName { row: row_no })?;

            students.push(StudentRecord {
                identifier,
                registration_code: map.registration.and_then(|i| cell(i).as_text()),
                name,
                email: map.email.and_then(|i| cell(i).as_text()),
            });

            for (col, subject) in &map.subjects {
                let value = parse_grade(&cell(*col)).map_err(|value| IngestError::NonNumericGrade {
                    row: row_no,
                    column: subject.clone(),
                    value,
                })?;
                facts.push(GradeFact::new(identifier, subject.clone(), value));
            }
        }

        Ok(Ingested {
            students,
            subjects,
            facts,
        })
    }
}

fn parse_identifier(cell: &CellValue) -> Option<i64> {
    match cell {
        CellValue::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
        CellValue::Text(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// `Err` carries the offending text.
fn parse_grade(cell: &CellValue) -> Result<Option<f64>, String> {
    match cell {
        CellValue::Empty => Ok(None),
        CellValue::Number(n) if n.is_finite() => Ok(Some(*n)),
        CellValue::Number(n) => Err(n.to_string()),
        CellValue::Text(s) => {
            let t = s.trim();
            if t.is_empty() {
                return Ok(None);
            }
            match t.replace(',', ".").parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Some(v)),
                _ => Err(t.to_string()),
            }
        }
        CellValue::Bool(b) => Err(b.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn num(n: f64) -> CellValue {
        CellValue::Number(n)
    }

    fn header() -> Vec<CellValue> {
        vec![
            text("Numero"),
            text("RA"),
            text("Nome"),
            text("email"),
            text("Math"),
            text("Art"),
            text("Final score"),
        ]
    }

    #[test]
    fn splits_fixed_and_subject_columns() {
        let rows = vec![
            header(),
            vec![
                num(1.0),
                text("RA-01"),
                text("Ana"),
                CellValue::Empty,
                num(8.0),
                text("6,5"),
                num(7.25),
            ],
            vec![num(2.0), CellValue::Empty, text("Bruno"), text("b@x.org"), num(4.0)],
        ];
        let out = SheetLayout::default().ingest(&rows).expect("ingest");

        let subjects: Vec<&str> = out.subjects.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(subjects, vec!["Math", "Art", "Final score"]);
        assert_eq!(out.students.len(), 2);
        assert_eq!(out.students[0].registration_code.as_deref(), Some("RA-01"));
        assert_eq!(out.students[1].email.as_deref(), Some("b@x.org"));
        assert_eq!(out.facts.len(), 6);
        assert_eq!(out.facts[1], GradeFact::new(1, "Art", Some(6.5)));
        assert_eq!(out.facts[4], GradeFact::new(2, "Art", None));
    }

    #[test]
    fn header_match_ignores_case_and_position() {
        let rows = vec![
            vec![text("Math"), text(" nome "), text("NUMERO")],
            vec![num(9.0), text("Ana"), text("12")],
        ];
        let out = SheetLayout::default().ingest(&rows).expect("ingest");
        assert_eq!(out.students[0].identifier, 12);
        assert_eq!(out.subjects, vec![SubjectRecord::new("Math")]);
    }

    #[test]
    fn ignored_columns_are_not_subjects() {
        let layout = SheetLayout {
            ignored_columns: vec!["Total1 Final".to_string()],
            ..SheetLayout::default()
        };
        let rows = vec![
            vec![text("Numero"), text("Nome"), text("Math"), text("Total1 Final")],
            vec![num(1.0), text("Ana"), num(5.0), num(20.0)],
        ];
        let out = layout.ingest(&rows).expect("ingest");
        assert_eq!(out.subjects.len(), 1);
        assert_eq!(out.facts.len(), 1);
    }

    #[test]
    fn missing_required_column_fails() {
        let rows = vec![vec![text("Numero"), text("Math")], vec![num(1.0), num(2.0)]];
        let e = SheetLayout::default().ingest(&rows).unwrap_err();
        assert_eq!(e, IngestError::MissingColumn("Nome".to_string()));
    }

    #[test]
    fn duplicate_header_fails() {
        let rows = vec![vec![text("Numero"), text("Nome"), text("Math"), text("math")]];
        let e = SheetLayout::default().ingest(&rows).unwrap_err();
        assert!(matches!(e, IngestError::DuplicateColumn(_)));
    }

    #[test]
    fn non_numeric_grade_reports_row_and_column() {
        let rows = vec![
            vec![text("Numero"), text("Nome"), text("Math")],
            vec![num(1.0), text("Ana"), text("absent")],
        ];
        let e = SheetLayout::default().ingest(&rows).unwrap_err();
        assert_eq!(
            e,
            IngestError::NonNumericGrade {
                row: 2,
                column: "Math".to_string(),
                value: "absent".to_string()
            }
        );
    }

    #[test]
    fn nan_and_infinity_are_not_grades() {
        for bad in ["NaN", "inf", "-Infinity"] {
            let rows = vec![
                vec![text("Numero"), text("Nome"), text("Math")],
                vec![num(1.0), text("Ana"), text(bad)],
            ];
            let e = SheetLayout::default().ingest(&rows).unwrap_err();
            assert_eq!(
                e,
                IngestError::NonNumericGrade {
                    row: 2,
                    column: "Math".to_string(),
                    value: bad.to_string()
                }
            );
        }

        let rows = vec![
            vec![text("Numero"), text("Nome"), text("Math")],
            vec![num(1.0), text("Ana"), num(f64::NAN)],
        ];
        assert!(matches!(
            SheetLayout::default().ingest(&rows),
            Err(IngestError::NonNumericGrade { row: 2, .. })
        ));
    }

    #[test]
    fn fractional_identifier_fails() {
        let rows = vec![
            vec![text("Numero"), text("Nome")],
            vec![],
            vec![num(1.5), text("Ana")],
        ];
        let e = SheetLayout::default().ingest(&rows).unwrap_err();
        assert!(matches!(e, IngestError::BadIdentifier { row: 3, .. }));
    }

    #[test]
    fn blank_sheet_has_no_rows() {
        let rows = vec![vec![CellValue::Empty], vec![]];
        assert_eq!(SheetLayout::default().ingest(&rows).unwrap_err(), IngestError::NoRows);
    }
}
