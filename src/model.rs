use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub identifier: i64,
    pub registration_code: Option<String>,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    pub name: String,
}

impl SubjectRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// One (student, subject) cell of the source data. `value: None` means the
/// student has no grade for that subject, which is a valid state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeFact {
    pub student_identifier: i64,
    pub subject_name: String,
    pub value: Option<f64>,
}

impl GradeFact {
    pub fn new(student_identifier: i64, subject_name: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            student_identifier,
            subject_name: subject_name.into(),
            value,
        }
    }
}

/// A wide-table cell. `Empty` has no backing fact; `Recorded(None)` has a
/// fact without a grade. Both read as missing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Recorded(Option<f64>),
}

impl Cell {
    pub fn value(self) -> Option<f64> {
        match self {
            Cell::Empty => None,
            Cell::Recorded(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub student: StudentRecord,
    pub cells: Vec<Cell>,
}

impl WideRow {
    pub fn values(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.cells.iter().map(|c| c.value())
    }
}

/// Students × subjects view built by [`crate::pivot::build_wide_table`].
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub(crate) subjects: Vec<String>,
    pub(crate) rows: Vec<WideRow>,
}

impl WideTable {
    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    pub fn rows(&self) -> &[WideRow] {
        &self.rows
    }

    pub fn subject_index(&self, name: &str) -> Option<usize> {
        self.subjects.iter().position(|s| s == name)
    }

    pub fn row(&self, identifier: i64) -> Option<&WideRow> {
        self.rows.iter().find(|r| r.student.identifier == identifier)
    }

    /// Non-missing grades of one subject, paired with the student they belong to.
    pub fn column_values(&self, col: usize) -> Vec<(&StudentRecord, f64)> {
        self.rows
            .iter()
            .filter_map(|r| r.cells.get(col).and_then(|c| c.value()).map(|v| (&r.student, v)))
            .collect()
    }

    /// Flattens recorded cells back into facts, row-major.
    pub fn to_facts(&self) -> Vec<GradeFact> {
        let mut out = Vec::new();
        for row in &self.rows {
            for (col, cell) in row.cells.iter().enumerate() {
                if let Cell::Recorded(value) = cell {
                    out.push(GradeFact::new(
                        row.student.identifier,
                        self.subjects[col].clone(),
                        *value,
                    ));
                }
            }
        }
        out
    }

    pub fn students(&self) -> Vec<StudentRecord> {
        self.rows.iter().map(|r| r.student.clone()).collect()
    }

    pub fn subject_records(&self) -> Vec<SubjectRecord> {
        self.subjects.iter().map(SubjectRecord::new).collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|r| {
                serde_json::json!({
                    "identifier": r.student.identifier,
                    "name": r.student.name,
                    "registrationCode": r.student.registration_code,
                    "email": r.student.email,
                    "grades": r.values().collect::<Vec<_>>(),
                })
            })
            .collect();
        serde_json::json!({
            "subjects": self.subjects,
            "rows": rows,
        })
    }
}
