use crate::assistant::{compute_fact_sheet, is_fee_related, FactSheet};
use crate::error::Result;
use crate::ipc::error::respond;
use crate::ipc::helpers::{no_workspace, required_str, to_json};
use crate::ipc::types::{AppState, Request};
use crate::ledger::Scope;
use crate::store;
use rusqlite::Connection;
use serde_json::json;

// Facts are institution-wide, so they are always built from the unscoped view.
fn load_facts(conn: Option<&Connection>) -> Result<FactSheet> {
    let conn = conn.ok_or_else(no_workspace)?;
    let data = store::load_dataset(conn, &Scope::Global)?;
    Ok(compute_fact_sheet(&data))
}

fn cache_key(state: &AppState) -> String {
    state
        .workspace
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn handle_classify(_state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        required_str(&req.params, "question").map(|question| {
            json!({
                "feeRelated": is_fee_related(&question),
                "question": question,
            })
        }),
    )
}

fn handle_facts(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = cache_key(state);
    let conn = state.db.as_ref();
    let result = state
        .assistant
        .fact_sheet(&key, || load_facts(conn))
        .and_then(|(facts, cached)| Ok(json!({ "facts": to_json(&facts)?, "cached": cached })));
    respond(&req.id, result)
}

fn handle_ask(state: &mut AppState, req: &Request) -> serde_json::Value {
    let question = match required_str(&req.params, "question") {
        Ok(q) => q,
        Err(e) => return respond(&req.id, Err(e)),
    };
    let key = cache_key(state);
    let conn = state.db.as_ref();
    let result = state
        .assistant
        .ask(&question, &key, || load_facts(conn))
        .and_then(|answer| to_json(&answer));
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assistant.classify" => Some(handle_classify(state, req)),
        "assistant.facts" => Some(handle_facts(state, req)),
        "assistant.ask" => Some(handle_ask(state, req)),
        _ => None,
    }
}
