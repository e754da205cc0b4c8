use crate::model::WideTable;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetSource {
    Sheet { path: String, sheet: String },
    Database { path: String },
}

impl DatasetSource {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DatasetSource::Sheet { path, sheet } => serde_json::json!({
                "kind": "sheet",
                "path": path,
                "sheet": sheet,
            }),
            DatasetSource::Database { path } => serde_json::json!({
                "kind": "database",
                "path": path,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub table: WideTable,
    pub source: DatasetSource,
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
}

impl Dataset {
    pub fn new(table: WideTable, source: DatasetSource, fingerprint: String) -> Self {
        Self {
            table,
            source,
            fingerprint,
            loaded_at: Utc::now(),
        }
    }

    pub fn summary_json(&self) -> serde_json::Value {
        serde_json::json!({
            "source": self.source.to_json(),
            "fingerprint": self.fingerprint,
            "loadedAt": self.loaded_at.to_rfc3339(),
            "studentCount": self.table.rows().len(),
            "subjects": self.table.subjects(),
        })
    }
}

/// Per-login state, passed explicitly to every handler.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: String,
    pub username: String,
    pub term_label: String,
    pub dataset: Option<Dataset>,
    pub created_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "sessionId": self.id,
            "username": self.username,
            "termLabel": self.term_label,
            "createdAt": self.created_at.to_rfc3339(),
            "dataset": self.dataset.as_ref().map(|d| d.summary_json()),
        })
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, SessionContext>,
}

impl SessionStore {
    pub fn open(&mut self, username: &str) -> &SessionContext {
        let id = Uuid::new_v4().to_string();
        let ctx = SessionContext {
            id: id.clone(),
            username: username.to_string(),
            term_label: String::new(),
            dataset: None,
            created_at: Utc::now(),
        };
        self.sessions.entry(id).or_insert(ctx)
    }

    pub fn get(&self, id: &str) -> Option<&SessionContext> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut SessionContext> {
        self.sessions.get_mut(id)
    }

    pub fn close(&mut self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Fingerprint of a table's content, independent of where it came from.
pub fn table_fingerprint(table: &WideTable) -> String {
    let mut h = Sha256::new();
    for f in table.to_facts() {
        h.update(f.student_identifier.to_le_bytes());
        h.update(f.subject_name.as_bytes());
        h.update([0u8]);
        match f.value {
            Some(v) => h.update(v.to_bits().to_le_bytes()),
            None => h.update(b"-"),
        }
    }
    h.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}
