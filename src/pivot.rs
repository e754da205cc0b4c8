use crate::model::{Cell, GradeFact, StudentRecord, SubjectRecord, WideRow, WideTable};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PivotError {
    #[error("grade references unknown student {0}")]
    UnknownStudent(i64),

    #[error("grade references unknown subject '{0}'")]
    UnknownSubject(String),

    #[error("grade row references missing student row #{0}")]
    MissingStudentRow(i64),

    #[error("grade row references missing subject row #{0}")]
    MissingSubjectRow(i64),

    #[error("more than one grade for student {student} in subject '{subject}'")]
    DuplicateFact { student: i64, subject: String },
}

impl PivotError {
    pub fn code(&self) -> &'static str {
        match self {
            PivotError::UnknownStudent(_)
            | PivotError::UnknownSubject(_)
            | PivotError::MissingStudentRow(_)
            | PivotError::MissingSubjectRow(_) => "reference_error",
            PivotError::DuplicateFact { .. } => "duplicate_fact",
        }
    }
}

/// Reshapes normalized student/subject/grade records into a wide table.
///
/// Rows follow the first appearance of each student identifier, columns the
/// first appearance of each subject name. Every fact must reference a known
/// student and subject, and each (student, subject) pair may appear at most
/// once; otherwise nothing is built.
pub fn build_wide_table(
    students: &[StudentRecord],
    subjects: &[SubjectRecord],
    facts: &[GradeFact],
) -> Result<WideTable, PivotError> {
    let mut row_of: HashMap<i64, usize> = HashMap::new();
    let mut rows: Vec<WideRow> = Vec::new();
    for s in students {
        if row_of.contains_key(&s.identifier) {
            continue;
        }
        row_of.insert(s.identifier, rows.len());
        rows.push(WideRow {
            student: s.clone(),
            cells: Vec::new(),
        });
    }

    let mut col_of: HashMap<&str, usize> = HashMap::new();
    let mut columns: Vec<String> = Vec::new();
    for s in subjects {
        if col_of.contains_key(s.name.as_str()) {
            continue;
        }
        col_of.insert(s.name.as_str(), columns.len());
        columns.push(s.name.clone());
    }

    for row in rows.iter_mut() {
        row.cells = vec![Cell::Empty; columns.len()];
    }

    for f in facts {
        let Some(&r) = row_of.get(&f.student_identifier) else {
            return Err(PivotError::UnknownStudent(f.student_identifier));
        };
        let Some(&c) = col_of.get(f.subject_name.as_str()) else {
            return Err(PivotError::UnknownSubject(f.subject_name.clone()));
        };
        let cell = &mut rows[r].cells[c];
        if *cell != Cell::Empty {
            return Err(PivotError::DuplicateFact {
                student: f.student_identifier,
                subject: f.subject_name.clone(),
            });
        }
        *cell = Cell::Recorded(f.value);
    }

    Ok(WideTable {
        subjects: columns,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(identifier: i64, name: &str) -> StudentRecord {
        StudentRecord {
            identifier,
            registration_code: None,
            name: name.to_string(),
            email: None,
        }
    }

    fn sort_key(f: &GradeFact) -> (i64, String) {
        (f.student_identifier, f.subject_name.clone())
    }

    #[test]
    fn round_trip_reproduces_facts() {
        let students = vec![student(1, "Ana"), student(2, "Bruno"), student(3, "Carla")];
        let subjects = vec![
            SubjectRecord::new("Math"),
            SubjectRecord::new("History"),
            SubjectRecord::new("Final score"),
        ];
        let facts = vec![
            GradeFact::new(2, "History", Some(7.5)),
            GradeFact::new(1, "Math", Some(6.0)),
            GradeFact::new(3, "Math", None),
            GradeFact::new(1, "Final score", Some(8.25)),
            GradeFact::new(2, "Math", Some(4.0)),
        ];

        let table = build_wide_table(&students, &subjects, &facts).expect("pivot");
        let mut back = table.to_facts();
        let mut expected = facts.clone();
        back.sort_by_key(sort_key);
        expected.sort_by_key(sort_key);
        assert_eq!(back, expected);
    }

    #[test]
    fn columns_keep_first_seen_order() {
        let students = vec![student(1, "Ana")];
        let subjects = vec![
            SubjectRecord::new("Physics"),
            SubjectRecord::new("Art"),
            SubjectRecord::new("Physics"),
            SubjectRecord::new("Biology"),
        ];
        let table = build_wide_table(&students, &subjects, &[]).expect("pivot");
        assert_eq!(table.subjects(), &["Physics", "Art", "Biology"]);
    }

    #[test]
    fn first_record_wins_for_repeated_student() {
        let students = vec![student(1, "Ana"), student(1, "Ana Clara"), student(2, "Bruno")];
        let table = build_wide_table(&students, &[], &[]).expect("pivot");
        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.rows()[0].student.name, "Ana");
    }

    #[test]
    fn missing_pairs_read_as_missing() {
        let students = vec![student(1, "Ana"), student(2, "Bruno")];
        let subjects = vec![SubjectRecord::new("Math"), SubjectRecord::new("Art")];
        let facts = vec![GradeFact::new(1, "Math", Some(9.0))];
        let table = build_wide_table(&students, &subjects, &facts).expect("pivot");

        let ana = table.row(1).expect("ana");
        assert_eq!(ana.cells, vec![Cell::Recorded(Some(9.0)), Cell::Empty]);
        let bruno = table.row(2).expect("bruno");
        assert_eq!(bruno.values().collect::<Vec<_>>(), vec![None, None]);
        assert_eq!(table.to_facts().len(), 1);
    }

    #[test]
    fn unknown_student_is_a_reference_error() {
        let students = vec![student(1, "Ana")];
        let subjects = vec![SubjectRecord::new("Math")];
        let facts = vec![GradeFact::new(42, "Math", Some(5.0))];
        let e = build_wide_table(&students, &subjects, &facts).unwrap_err();
        assert_eq!(e, PivotError::UnknownStudent(42));
        assert_eq!(e.code(), "reference_error");
    }

    #[test]
    fn unknown_subject_is_a_reference_error() {
        let students = vec![student(1, "Ana")];
        let subjects = vec![SubjectRecord::new("Math")];
        let facts = vec![GradeFact::new(1, "Chemistry", Some(5.0))];
        let e = build_wide_table(&students, &subjects, &facts).unwrap_err();
        assert_eq!(e, PivotError::UnknownSubject("Chemistry".to_string()));
    }

    #[test]
    fn duplicate_pair_fails_loudly() {
        let students = vec![student(1, "Ana")];
        let subjects = vec![SubjectRecord::new("Math")];
        let facts = vec![
            GradeFact::new(1, "Math", None),
            GradeFact::new(1, "Math", Some(7.0)),
        ];
        let e = build_wide_table(&students, &subjects, &facts).unwrap_err();
        assert_eq!(e.code(), "duplicate_fact");
    }
}
