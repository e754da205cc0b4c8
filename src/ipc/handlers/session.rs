use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{required_str, session, session_id, session_mut};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let username = match required_str(req, "username") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };

    if let Err(e) = state.credentials.verify(&username, &password) {
        tracing::warn!(user = %username, "login rejected");
        return err(&req.id, "invalid_credentials", e.to_string(), None);
    }

    let ctx = state.sessions.open(&username);
    tracing::info!(user = %username, session = %ctx.id, "login");
    ok(&req.id, ctx.to_json())
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match session_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let closed = state.sessions.close(&id);
    if closed {
        tracing::info!(session = %id, "logout");
    }
    ok(&req.id, json!({ "closed": closed }))
}

fn handle_set_term(state: &mut AppState, req: &Request) -> serde_json::Value {
    let label = match required_str(req, "termLabel") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if label.is_empty() {
        return err(&req.id, "bad_params", "termLabel must not be empty", None);
    }
    match session_mut(state, req) {
        Ok(ctx) => {
            ctx.term_label = label;
            ok(&req.id, ctx.to_json())
        }
        Err(e) => e,
    }
}

fn handle_info(state: &mut AppState, req: &Request) -> serde_json::Value {
    match session(state, req) {
        Ok(ctx) => ok(&req.id, ctx.to_json()),
        Err(e) => e,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.login" => Some(handle_login(state, req)),
        "session.logout" => Some(handle_logout(state, req)),
        "session.setTerm" => Some(handle_set_term(state, req)),
        "session.info" => Some(handle_info(state, req)),
        _ => None,
    }
}
