use crate::error::Result;
use crate::ipc::error::{fee_err, respond};
use crate::ipc::helpers::{no_workspace, required_str, to_json};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::Connection;
use serde_json::json;

fn admins_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let username = required_str(params, "username")?;
    let email = required_str(params, "email")?;
    let admin = store::create_admin(conn, &username, &email)?;
    Ok(json!({ "admin": to_json(&admin)? }))
}

fn admins_list(conn: &Connection) -> Result<serde_json::Value> {
    let admins = store::list_admins(conn)?;
    Ok(json!({ "admins": to_json(&admins)? }))
}

fn handle_admins_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, admins_create(conn, &req.params))
}

fn handle_admins_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, admins_list(conn))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "admins.create" => Some(handle_admins_create(state, req)),
        "admins.list" => Some(handle_admins_list(state, req)),
        _ => None,
    }
}
