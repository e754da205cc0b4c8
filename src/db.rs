use crate::model::{GradeFact, StudentRecord, SubjectRecord};
use crate::pivot::PivotError;
use anyhow::Context;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;

pub const TABLES: [&str; 3] = ["students", "subjects", "grades"];

pub fn open_db(db_path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
        }
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            number INTEGER NOT NULL UNIQUE,
            registration_code TEXT,
            name TEXT NOT NULL,
            email TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    // No UNIQUE(student_id, subject_id): a duplicated pair must reach the
    // pivot and fail there rather than be merged by the database.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            value REAL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_subject ON grades(subject_id)",
        [],
    )?;

    Ok(conn)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub students: usize,
    pub subjects: usize,
    pub grades: usize,
}

/// Replaces the whole dataset in one transaction.
pub fn replace_dataset(
    conn: &mut Connection,
    students: &[StudentRecord],
    subjects: &[SubjectRecord],
    facts: &[GradeFact],
) -> anyhow::Result<WriteSummary> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM grades", [])?;
    tx.execute("DELETE FROM students", [])?;
    tx.execute("DELETE FROM subjects", [])?;

    let mut student_ids: HashMap<i64, i64> = HashMap::new();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO students(number, registration_code, name, email) VALUES(?, ?, ?, ?)",
        )?;
        for s in students {
            if student_ids.contains_key(&s.identifier) {
                continue;
            }
            stmt.execute(params![s.identifier, s.registration_code, s.name, s.email])
                .with_context(|| format!("failed to insert student {}", s.identifier))?;
            student_ids.insert(s.identifier, tx.last_insert_rowid());
        }
    }

    let mut subject_ids: HashMap<String, i64> = HashMap::new();
    {
        let mut stmt = tx.prepare("INSERT INTO subjects(name, sort_order) VALUES(?, ?)")?;
        for s in subjects {
            if subject_ids.contains_key(&s.name) {
                continue;
            }
            stmt.execute(params![s.name, subject_ids.len() as i64])
                .with_context(|| format!("failed to insert subject {}", s.name))?;
            subject_ids.insert(s.name.clone(), tx.last_insert_rowid());
        }
    }

    {
        let mut stmt = tx.prepare("INSERT INTO grades(student_id, subject_id, value) VALUES(?, ?, ?)")?;
        for f in facts {
            let student_id = student_ids
                .get(&f.student_identifier)
                .ok_or(PivotError::UnknownStudent(f.student_identifier))?;
            let subject_id = subject_ids
                .get(&f.subject_name)
                .ok_or_else(|| PivotError::UnknownSubject(f.subject_name.clone()))?;
            stmt.execute(params![student_id, subject_id, f.value])?;
        }
    }

    tx.commit()?;
    Ok(WriteSummary {
        students: student_ids.len(),
        subjects: subject_ids.len(),
        grades: facts.len(),
    })
}

#[derive(Debug, Clone)]
pub struct StoredDataset {
    pub students: Vec<StudentRecord>,
    pub subjects: Vec<SubjectRecord>,
    pub facts: Vec<GradeFact>,
}

/// Reads the three tables back as records. A grade whose foreign id has no
/// matching row is reported as a [`PivotError`] naming the missing row id.
pub fn load_dataset(conn: &Connection) -> anyhow::Result<StoredDataset> {
    let mut number_of: HashMap<i64, i64> = HashMap::new();
    let mut stmt = conn.prepare("SELECT id, number, registration_code, name, email FROM students ORDER BY number")?;
    let students = stmt
        .query_map([], |r| {
            let id: i64 = r.get(0)?;
            let rec = StudentRecord {
                identifier: r.get(1)?,
                registration_code: r.get(2)?,
                name: r.get(3)?,
                email: r.get(4)?,
            };
            Ok((id, rec))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?
        .into_iter()
        .map(|(id, rec)| {
            number_of.insert(id, rec.identifier);
            rec
        })
        .collect::<Vec<_>>();

    let mut name_of: HashMap<i64, String> = HashMap::new();
    let mut stmt = conn.prepare("SELECT id, name FROM subjects ORDER BY sort_order, id")?;
    let subjects = stmt
        .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?
        .into_iter()
        .map(|(id, name)| {
            name_of.insert(id, name.clone());
            SubjectRecord::new(name)
        })
        .collect::<Vec<_>>();

    let mut stmt = conn.prepare("SELECT student_id, subject_id, value FROM grades ORDER BY id")?;
    let raw = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, Option<f64>>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut facts = Vec::with_capacity(raw.len());
    for (student_id, subject_id, value) in raw {
        let number = *number_of
            .get(&student_id)
            .ok_or(PivotError::MissingStudentRow(student_id))?;
        let subject = name_of
            .get(&subject_id)
            .ok_or(PivotError::MissingSubjectRow(subject_id))?;
        facts.push(GradeFact::new(number, subject.clone(), value));
    }

    Ok(StoredDataset {
        students,
        subjects,
        facts,
    })
}

/// Dumps one table as JSON rows for the database viewer.
pub fn table_rows(conn: &Connection, table: &str) -> anyhow::Result<Vec<serde_json::Value>> {
    let sql = match table {
        "students" => "SELECT id, number, registration_code, name, email FROM students ORDER BY number",
        "subjects" => "SELECT id, name, sort_order FROM subjects ORDER BY sort_order",
        "grades" => "SELECT id, student_id, subject_id, value FROM grades ORDER BY id",
        other => anyhow::bail!("unknown table: {}", other),
    };
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(|c| c.to_string()).collect();
    let rows = stmt
        .query_map([], |r| {
            let mut obj = serde_json::Map::new();
            for (i, col) in columns.iter().enumerate() {
                let v = match r.get_ref(i)? {
                    rusqlite::types::ValueRef::Null => serde_json::Value::Null,
                    rusqlite::types::ValueRef::Integer(n) => serde_json::json!(n),
                    rusqlite::types::ValueRef::Real(f) => serde_json::json!(f),
                    rusqlite::types::ValueRef::Text(t) => {
                        serde_json::Value::String(String::from_utf8_lossy(t).to_string())
                    }
                    rusqlite::types::ValueRef::Blob(_) => serde_json::Value::Null,
                };
                obj.insert(col.clone(), v);
            }
            Ok(serde_json::Value::Object(obj))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}
