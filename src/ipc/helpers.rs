use crate::db;
use crate::distribution::{DistributionError, ReferencePolicy};
use crate::ingest::IngestError;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::pivot::PivotError;
use crate::session::{Dataset, SessionContext};
use crate::sheet::SheetError;
use rusqlite::Connection;
use serde_json::json;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Student numbers arrive as JSON numbers or numeric strings.
pub fn parse_student_id(req: &Request, v: Option<&serde_json::Value>, key: &str) -> Result<i64, serde_json::Value> {
    let parsed = match v {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| err(&req.id, "bad_params", format!("{} must be an integer student number", key), None))
}

pub fn session_id(req: &Request) -> Result<String, serde_json::Value> {
    req.params
        .get("sessionId")
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "not_authenticated", "log in first", None))
}

pub fn session<'a>(state: &'a AppState, req: &Request) -> Result<&'a SessionContext, serde_json::Value> {
    let id = session_id(req)?;
    state
        .sessions
        .get(&id)
        .ok_or_else(|| err(&req.id, "not_authenticated", "unknown or closed session", None))
}

pub fn session_mut<'a>(state: &'a mut AppState, req: &Request) -> Result<&'a mut SessionContext, serde_json::Value> {
    let id = session_id(req)?;
    state
        .sessions
        .get_mut(&id)
        .ok_or_else(|| err(&req.id, "not_authenticated", "unknown or closed session", None))
}

pub fn dataset<'a>(state: &'a AppState, req: &Request) -> Result<(&'a SessionContext, &'a Dataset), serde_json::Value> {
    let s = session(state, req)?;
    let d = s
        .dataset
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_dataset", "load a spreadsheet or the database first", None))?;
    Ok((s, d))
}

pub fn db_conn<'a>(state: &'a mut AppState, req: &Request) -> Result<&'a mut Connection, serde_json::Value> {
    if state.db.is_none() {
        match db::open_db(&state.config.database_path) {
            Ok(conn) => {
                tracing::info!(path = %state.config.database_path.display(), "database opened");
                state.db = Some(conn);
            }
            Err(e) => return Err(err(&req.id, "db_open_failed", format!("{e:#}"), None)),
        }
    }
    state
        .db
        .as_mut()
        .ok_or_else(|| err(&req.id, "db_open_failed", "database unavailable", None))
}

/// `params.reference` overrides the configured policy for one request.
pub fn reference_policy(req: &Request, configured: ReferencePolicy) -> Result<ReferencePolicy, serde_json::Value> {
    match req.params.get("reference") {
        None | Some(serde_json::Value::Null) => Ok(configured),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| err(&req.id, "bad_params", format!("invalid reference: {}", e), None)),
    }
}

/// Maps a failed load or query to its protocol error code.
pub fn failure(req: &Request, fallback_code: &str, e: &anyhow::Error) -> serde_json::Value {
    let message = format!("{e:#}");
    if let Some(p) = e.downcast_ref::<PivotError>() {
        return err(&req.id, p.code(), message, None);
    }
    if let Some(d) = e.downcast_ref::<DistributionError>() {
        return err(&req.id, d.code(), message, None);
    }
    if let Some(i) = e.downcast_ref::<IngestError>() {
        return err(&req.id, "load_failed", message, Some(json!({ "kind": "layout", "detail": i.to_string() })));
    }
    if e.downcast_ref::<SheetError>().is_some() {
        return err(&req.id, "load_failed", message, Some(json!({ "kind": "workbook" })));
    }
    err(&req.id, fallback_code, message, None)
}
