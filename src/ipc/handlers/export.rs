use crate::export::{student_row_csv, write_csv};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{dataset, optional_str, parse_student_id};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_student_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (_, ds) = match dataset(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let id = match parse_student_id(req, req.params.get("studentId"), "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(row) = ds.table.row(id) else {
        return err(&req.id, "student_not_found", format!("student {} not found", id), None);
    };

    let csv = student_row_csv(&ds.table, row, &state.config.layout);
    let file_name = format!("student_{}.csv", id);
    let out_path = optional_str(req, "outPath").map(PathBuf::from);
    if let Some(p) = out_path.as_ref() {
        if let Err(e) = write_csv(p, &csv) {
            return err(&req.id, "export_failed", format!("{e:#}"), None);
        }
        tracing::info!(student = id, path = %p.display(), "student row exported");
    }

    ok(
        &req.id,
        json!({
            "fileName": file_name,
            "csv": csv,
            "path": out_path.map(|p| p.to_string_lossy().to_string()),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "export.studentCsv" => Some(handle_student_csv(state, req)),
        _ => None,
    }
}
