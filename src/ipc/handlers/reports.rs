use crate::error::Result;
use crate::ipc::error::{fee_err, respond};
use crate::ipc::helpers::{no_workspace, scope_of, to_json};
use crate::ipc::types::{AppState, Request};
use crate::report;
use crate::store;
use rusqlite::Connection;

fn fee_report(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let scope = scope_of(conn, params)?;
    let filters = report::parse_student_filters(params)?;
    let data = store::load_dataset(conn, &scope)?;
    to_json(&report::build_fee_report(&data, &filters))
}

fn dashboard(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let scope = scope_of(conn, params)?;
    let data = store::load_dataset(conn, &scope)?;
    to_json(&report::build_dashboard(&data))
}

fn handle_fee_report(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, fee_report(conn, &req.params))
}

fn handle_dashboard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, dashboard(conn, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.feeReport" => Some(handle_fee_report(state, req)),
        "reports.dashboard" => Some(handle_dashboard(state, req)),
        _ => None,
    }
}
