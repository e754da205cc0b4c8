use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{dataset, db_conn, failure, optional_str, required_str, session, session_mut};
use crate::ipc::types::{AppState, Request};
use crate::pivot::build_wide_table;
use crate::session::{sha256_hex, table_fingerprint, Dataset, DatasetSource};
use crate::sheet::Workbook;
use anyhow::Context;
use serde_json::json;
use std::path::Path;

fn open_workbook(path: &Path) -> anyhow::Result<(Workbook, String)> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    let fingerprint = sha256_hex(&bytes);
    let wb = Workbook::from_bytes(bytes).with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    Ok((wb, fingerprint))
}

/// Term label given with the request, else the one already on the session.
fn effective_term(state: &AppState, req: &Request) -> Result<String, serde_json::Value> {
    let current = session(state, req)?.term_label.clone();
    let label = optional_str(req, "termLabel").unwrap_or(current);
    if label.trim().is_empty() {
        return Err(err(&req.id, "bad_params", "termLabel must not be empty", None));
    }
    Ok(label)
}

fn install(state: &mut AppState, req: &Request, term: String, ds: Dataset) -> serde_json::Value {
    match session_mut(state, req) {
        Ok(ctx) => {
            ctx.term_label = term;
            ctx.dataset = Some(ds);
            ok(&req.id, ctx.to_json())
        }
        Err(e) => e,
    }
}

fn handle_sheets(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = session(state, req) {
        return e;
    }
    let path = match required_str(req, "path") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match open_workbook(Path::new(&path)) {
        Ok((wb, _)) => ok(&req.id, json!({ "path": path, "sheets": wb.sheet_names() })),
        Err(e) => failure(req, "load_failed", &e),
    }
}

fn load_sheet(state: &AppState, path: &str, sheet: Option<&str>) -> anyhow::Result<Dataset> {
    let (mut wb, fingerprint) = open_workbook(Path::new(path))?;
    let grid = wb.read(sheet)?;
    let ingested = state
        .config
        .layout
        .ingest(&grid.rows)
        .with_context(|| format!("sheet '{}' does not match the configured layout", grid.name))?;
    let table = build_wide_table(&ingested.students, &ingested.subjects, &ingested.facts)?;
    Ok(Dataset::new(
        table,
        DatasetSource::Sheet {
            path: path.to_string(),
            sheet: grid.name,
        },
        fingerprint,
    ))
}

fn handle_load_sheet(state: &mut AppState, req: &Request) -> serde_json::Value {
    let term = match effective_term(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let path = match required_str(req, "path") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let sheet = optional_str(req, "sheet");

    match load_sheet(state, &path, sheet.as_deref()) {
        Ok(ds) => {
            tracing::info!(
                path = %path,
                students = ds.table.rows().len(),
                subjects = ds.table.subjects().len(),
                "sheet loaded"
            );
            install(state, req, term, ds)
        }
        Err(e) => {
            tracing::warn!(path = %path, error = %format!("{e:#}"), "sheet load failed");
            failure(req, "load_failed", &e)
        }
    }
}

fn handle_load_database(state: &mut AppState, req: &Request) -> serde_json::Value {
    let term = match effective_term(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let db_path = state.config.database_path.to_string_lossy().to_string();
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let loaded = db::load_dataset(conn).and_then(|stored| {
        build_wide_table(&stored.students, &stored.subjects, &stored.facts).map_err(anyhow::Error::from)
    });
    match loaded {
        Ok(table) => {
            tracing::info!(students = table.rows().len(), "database loaded");
            let fingerprint = table_fingerprint(&table);
            let ds = Dataset::new(table, DatasetSource::Database { path: db_path }, fingerprint);
            install(state, req, term, ds)
        }
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "database load failed");
            failure(req, "db_query_failed", &e)
        }
    }
}

fn handle_persist(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (students, subjects, facts) = match dataset(state, req) {
        Ok((_, ds)) => (ds.table.students(), ds.table.subject_records(), ds.table.to_facts()),
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match db::replace_dataset(conn, &students, &subjects, &facts) {
        Ok(summary) => {
            tracing::info!(
                students = summary.students,
                subjects = summary.subjects,
                grades = summary.grades,
                "dataset persisted"
            );
            ok(
                &req.id,
                json!({
                    "students": summary.students,
                    "subjects": summary.subjects,
                    "grades": summary.grades,
                }),
            )
        }
        Err(e) => failure(req, "db_write_failed", &e),
    }
}

fn handle_database_table(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = session(state, req) {
        return e;
    }
    let table = match required_str(req, "table") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !db::TABLES.contains(&table.as_str()) {
        return err(
            &req.id,
            "bad_params",
            format!("table must be one of {}", db::TABLES.join(", ")),
            None,
        );
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match db::table_rows(conn, &table) {
        Ok(rows) => ok(&req.id, json!({ "table": table, "rows": rows })),
        Err(e) => failure(req, "db_query_failed", &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dataset.sheets" => Some(handle_sheets(state, req)),
        "dataset.loadSheet" => Some(handle_load_sheet(state, req)),
        "dataset.loadDatabase" => Some(handle_load_database(state, req)),
        "dataset.persist" => Some(handle_persist(state, req)),
        "database.table" => Some(handle_database_table(state, req)),
        _ => None,
    }
}
