use crate::calc;
use crate::distribution::{distribution_view, DistributionError, ReferencePolicy};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{dataset, parse_student_id, reference_policy, required_str, session};
use crate::ipc::types::{AppState, Request};
use crate::jitter::JitterParams;
use crate::model::WideRow;
use crate::session::{Dataset, SessionContext};
use serde_json::json;
use std::collections::HashSet;

// Degenerate distributions are reported next to the rest of the view, so a
// single zero-variance subject does not hide every other chart.
fn distribution_json(
    observations: &[(String, f64)],
    policy: ReferencePolicy,
    jitter: JitterParams,
) -> serde_json::Value {
    match distribution_view(observations, policy, jitter) {
        Ok(v) => json!({ "distribution": v, "distributionError": null }),
        Err(e) => json!({ "distribution": null, "distributionError": distribution_error_json(&e) }),
    }
}

fn distribution_error_json(e: &DistributionError) -> serde_json::Value {
    json!({ "code": e.code(), "message": e.to_string() })
}

fn merge(mut base: serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
    if let (Some(b), serde_json::Value::Object(e)) = (base.as_object_mut(), extra) {
        b.extend(e);
    }
    base
}

fn student_row<'a>(req: &Request, ds: &'a Dataset, key: &str) -> Result<&'a WideRow, serde_json::Value> {
    let id = parse_student_id(req, req.params.get(key), key)?;
    ds.table
        .row(id)
        .ok_or_else(|| err(&req.id, "student_not_found", format!("student {} not found", id), None))
}

fn final_column(state: &AppState) -> Option<&str> {
    state.config.final_score_column.as_deref()
}

fn handle_overview(_state: &AppState, req: &Request, ctx: &SessionContext, ds: &Dataset) -> serde_json::Value {
    let means: Vec<serde_json::Value> = calc::class_means(&ds.table)
        .into_iter()
        .map(|(subject, mean)| json!({ "subject": subject, "mean": mean }))
        .collect();
    ok(
        &req.id,
        json!({
            "termLabel": ctx.term_label,
            "table": ds.table.to_json(),
            "classMeans": means,
        }),
    )
}

fn handle_student(state: &AppState, req: &Request, ctx: &SessionContext, ds: &Dataset) -> serde_json::Value {
    let policy = match reference_policy(req, state.config.reference.student) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let row = match student_row(req, ds, "studentId") {
        Ok(r) => r,
        Err(e) => return e,
    };

    let grades = calc::student_grades(&ds.table, row);
    let observed: Vec<(String, f64)> = grades
        .iter()
        .filter_map(|(subject, v)| v.map(|v| (subject.clone(), v)))
        .collect();
    let bars: Vec<serde_json::Value> = grades
        .iter()
        .map(|(subject, v)| json!({ "subject": subject, "value": v }))
        .collect();
    let radar = calc::radar_series(grades.clone(), final_column(state));

    let body = json!({
        "termLabel": ctx.term_label,
        "student": row.student,
        "grades": bars,
        "mean": calc::row_mean(row),
        "radar": radar,
    });
    ok(&req.id, merge(body, distribution_json(&observed, policy, state.config.jitter)))
}

fn handle_class_stats(state: &AppState, req: &Request, ctx: &SessionContext, ds: &Dataset) -> serde_json::Value {
    let policy = match reference_policy(req, state.config.reference.class_stats) {
        Ok(p) => p,
        Err(e) => return e,
    };

    let summaries = calc::subject_summaries(&ds.table);
    let radar = calc::radar_series(calc::class_means(&ds.table), final_column(state));
    let distributions: Vec<serde_json::Value> = ds
        .table
        .subjects()
        .iter()
        .enumerate()
        .map(|(col, subject)| {
            let observed: Vec<(String, f64)> = ds
                .table
                .column_values(col)
                .into_iter()
                .map(|(s, v)| (s.name.clone(), v))
                .collect();
            merge(
                json!({ "subject": subject }),
                distribution_json(&observed, policy, state.config.jitter),
            )
        })
        .collect();

    ok(
        &req.id,
        json!({
            "termLabel": ctx.term_label,
            "summaries": summaries,
            "radar": radar,
            "distributions": distributions,
        }),
    )
}

fn handle_ranking(state: &AppState, req: &Request, ctx: &SessionContext, ds: &Dataset) -> serde_json::Value {
    let (basis, entries) = calc::ranking(&ds.table, final_column(state));
    ok(
        &req.id,
        json!({
            "termLabel": ctx.term_label,
            "basis": basis,
            "entries": entries,
        }),
    )
}

fn handle_compare(_state: &AppState, req: &Request, ctx: &SessionContext, ds: &Dataset) -> serde_json::Value {
    let Some(raw) = req.params.get("studentIds").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing studentIds", None);
    };

    let mut seen = HashSet::new();
    let mut rows: Vec<&WideRow> = Vec::new();
    for v in raw {
        let id = match parse_student_id(req, Some(v), "studentIds") {
            Ok(id) => id,
            Err(e) => return e,
        };
        if !seen.insert(id) {
            continue;
        }
        match ds.table.row(id) {
            Some(r) => rows.push(r),
            None => return err(&req.id, "student_not_found", format!("student {} not found", id), None),
        }
    }
    if rows.len() < 2 {
        return err(&req.id, "bad_params", "select at least two students to compare", None);
    }

    let series: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            json!({
                "identifier": r.student.identifier,
                "name": r.student.name,
                "values": r.values().collect::<Vec<_>>(),
            })
        })
        .collect();
    ok(
        &req.id,
        json!({
            "termLabel": ctx.term_label,
            "subjects": ds.table.subjects(),
            "series": series,
        }),
    )
}

fn handle_subject_ranking(state: &AppState, req: &Request, ctx: &SessionContext, ds: &Dataset) -> serde_json::Value {
    let policy = match reference_policy(req, state.config.reference.subject_ranking) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(col) = ds.table.subject_index(&subject) else {
        return err(
            &req.id,
            "subject_not_found",
            format!("subject '{}' not found", subject),
            None,
        );
    };

    let mut values = ds.table.column_values(col);
    // Highest first; ties keep sheet order.
    values.sort_by(|a, b| b.1.total_cmp(&a.1));
    let bars: Vec<serde_json::Value> = values
        .iter()
        .map(|(s, v)| json!({ "identifier": s.identifier, "name": s.name, "value": v }))
        .collect();
    let observed: Vec<(String, f64)> = values.iter().map(|(s, v)| (s.name.clone(), *v)).collect();

    let body = json!({
        "termLabel": ctx.term_label,
        "subject": subject,
        "bars": bars,
    });
    ok(&req.id, merge(body, distribution_json(&observed, policy, state.config.jitter)))
}

fn handle_distribution_layout(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("values").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing values", None);
    };
    let mut values = Vec::with_capacity(raw.len());
    for v in raw {
        match v.as_f64() {
            Some(x) if x.is_finite() => values.push(x),
            _ => return err(&req.id, "bad_params", "values must be finite numbers", None),
        }
    }
    let labels: Vec<String> = match req.params.get("labels") {
        None | Some(serde_json::Value::Null) => values.iter().map(|v| v.to_string()).collect(),
        Some(serde_json::Value::Array(l)) => {
            let mut out = Vec::with_capacity(l.len());
            for x in l {
                match x.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => return err(&req.id, "bad_params", "labels must be strings", None),
                }
            }
            out
        }
        Some(_) => return err(&req.id, "bad_params", "labels must be an array of strings", None),
    };
    if labels.len() != values.len() {
        return err(&req.id, "bad_params", "labels and values differ in length", None);
    }
    let policy = match reference_policy(req, ReferencePolicy::Observed) {
        Ok(p) => p,
        Err(e) => return e,
    };

    let observations: Vec<(String, f64)> = labels.into_iter().zip(values).collect();
    match distribution_view(&observations, policy, state.config.jitter) {
        Ok(v) => ok(&req.id, json!(v)),
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

type ViewFn = fn(&AppState, &Request, &SessionContext, &Dataset) -> serde_json::Value;

fn with_dataset(state: &mut AppState, req: &Request, view: ViewFn) -> serde_json::Value {
    let state: &AppState = state;
    match dataset(state, req) {
        Ok((ctx, ds)) => view(state, req, ctx, ds),
        Err(e) => e,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "views.overview" => Some(with_dataset(state, req, handle_overview)),
        "views.student" => Some(with_dataset(state, req, handle_student)),
        "views.classStats" => Some(with_dataset(state, req, handle_class_stats)),
        "views.ranking" => Some(with_dataset(state, req, handle_ranking)),
        "views.compare" => Some(with_dataset(state, req, handle_compare)),
        "views.subjectRanking" => Some(with_dataset(state, req, handle_subject_ranking)),
        "distribution.layout" => Some(match session(state, req) {
            Ok(_) => handle_distribution_layout(state, req),
            Err(e) => e,
        }),
        _ => None,
    }
}
