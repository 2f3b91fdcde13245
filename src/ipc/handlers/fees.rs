use crate::error::{FeeError, Result};
use crate::ipc::error::{fee_err, respond};
use crate::ipc::helpers::{
    amount_value, no_workspace, optional_bool, required_str, scope_of, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{schedule_balances, FeeCategory, PaidMap, PerCategory};
use crate::store;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde_json::json;

/// `fixed` is an object keyed by category name. Categories left out are saved
/// as zero.
fn parse_fixed_amounts(params: &serde_json::Value) -> Result<PerCategory<Decimal>> {
    let Some(obj) = params.get("fixed").and_then(|v| v.as_object()) else {
        return Err(FeeError::bad_params("missing fixed"));
    };
    let mut fixed = PerCategory::default();
    for (key, value) in obj {
        let category = FeeCategory::parse(key).ok_or_else(|| {
            FeeError::validation_with(
                "bad_params",
                format!("unknown fee category {:?}", key),
                json!({ "category": key }),
            )
        })?;
        fixed.set(category, amount_value(key, value)?);
    }
    Ok(fixed)
}

fn fees_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let scope = scope_of(conn, params)?;
    let student_id = required_str(params, "studentId")?;
    let student = store::find_student(conn, &scope, &student_id)?;
    let Some(fee) = store::schedule_for_student(conn, &student.id)? else {
        return Ok(json!({ "fee": null, "balances": null }));
    };
    let paid = PaidMap::from_payments(&store::payments_for_schedule(conn, &fee.id)?);
    let balances = schedule_balances(&fee, &paid);
    Ok(json!({
        "fee": to_json(&fee)?,
        "balances": to_json(&balances)?,
    }))
}

fn fees_save(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let scope = scope_of(conn, params)?;
    let student_id = required_str(params, "studentId")?;
    let fixed = parse_fixed_amounts(params)?;
    let lock = optional_bool(params, "lock")?;
    let fee = store::save_fixed_amounts(conn, &scope, &student_id, &fixed, lock)?;
    Ok(json!({ "fee": to_json(&fee)? }))
}

fn handle_fees_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, fees_get(conn, &req.params))
}

fn handle_fees_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, fees_save(conn, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.get" => Some(handle_fees_get(state, req)),
        "fees.save" => Some(handle_fees_save(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_amounts_default_to_zero_and_reject_unknown_categories() {
        let fixed = parse_fixed_amounts(&json!({ "fixed": { "Tuition": 10000, "bus": "2500.50" } }))
            .expect("parse");
        assert_eq!(fixed.get(FeeCategory::Tuition), Decimal::from(10000));
        assert_eq!(fixed.get(FeeCategory::Bus), Decimal::new(250050, 2));
        assert_eq!(fixed.get(FeeCategory::Viva), Decimal::ZERO);

        let e = parse_fixed_amounts(&json!({ "fixed": { "canteen": 10 } })).expect_err("unknown");
        assert_eq!(e.code(), "bad_params");
        let e = parse_fixed_amounts(&json!({})).expect_err("missing");
        assert_eq!(e.code(), "bad_params");
    }
}
