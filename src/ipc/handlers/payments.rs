use crate::error::Result;
use crate::ipc::error::{fee_err, respond};
use crate::ipc::helpers::{
    date_or_today, no_workspace, optional_amount, optional_str, required_amount,
    required_category, required_str, resolve_scope, scope_of, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{clamp_balance, PaymentSubmission};
use crate::report;
use crate::store;
use rusqlite::Connection;
use serde_json::json;
use tracing::warn;

fn payments_quote(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let scope = scope_of(conn, params)?;
    let fee_id = required_str(params, "feeId")?;
    let category = required_category(params, "category")?;
    let schedule = store::find_schedule(conn, &scope, &fee_id)?;
    let paid = store::total_paid(conn, &schedule.id, category)?;
    let net = schedule.net_payable(category);
    Ok(json!({
        "feeId": schedule.id,
        "category": category,
        "fixed": to_json(&schedule.fixed.get(category))?,
        "discount": to_json(&schedule.discount.get(category))?,
        "net": to_json(&net)?,
        "totalPaid": to_json(&paid)?,
        "balance": to_json(&clamp_balance(net, paid))?,
        "isLocked": schedule.is_locked,
    }))
}

fn payments_record(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let (scope, admin_name) = resolve_scope(conn, params)?;
    let fee_id = required_str(params, "feeId")?;
    let submission = PaymentSubmission {
        category: required_category(params, "category")?,
        paid_amount: required_amount(params, "paidAmount")?,
        discount: optional_amount(params, "discount")?,
        bill_no: required_str(params, "billNo")?,
        payment_date: date_or_today(params, "paymentDate")?,
    };

    match store::record_payment(conn, &scope, admin_name.as_deref(), &fee_id, &submission) {
        Ok(recorded) => to_json(&recorded),
        Err(e) => {
            warn!(
                fee_id = %fee_id,
                category = submission.category.as_str(),
                code = e.code(),
                "payment rejected"
            );
            Err(e)
        }
    }
}

fn payments_history(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let scope = scope_of(conn, params)?;
    let search = optional_str(params, "search");
    let data = store::load_dataset(conn, &scope)?;
    let rows = report::payment_history(&data, search.as_deref());
    Ok(json!({ "payments": to_json(&rows)? }))
}

fn payments_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let scope = scope_of(conn, params)?;
    let payment_id = required_str(params, "paymentId")?;
    let payment = store::delete_payment(conn, &scope, &payment_id)?;
    Ok(json!({ "ok": true, "payment": to_json(&payment)? }))
}

fn payments_receipt(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let scope = scope_of(conn, params)?;
    let payment_id = required_str(params, "paymentId")?;
    let payment = store::find_payment(conn, &scope, &payment_id)?;
    let schedule = store::find_schedule(conn, &scope, &payment.fee_schedule_id)?;
    let student = store::find_student(conn, &scope, &schedule.student_id)?;
    let schedule_payments = store::payments_for_schedule(conn, &schedule.id)?;
    let receipt = report::build_receipt(&payment, &schedule, &student, &schedule_payments);
    Ok(json!({ "receipt": to_json(&receipt)? }))
}

fn handle_payments_quote(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, payments_quote(conn, &req.params))
}

fn handle_payments_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, payments_record(conn, &req.params))
}

fn handle_payments_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, payments_history(conn, &req.params))
}

fn handle_payments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, payments_delete(conn, &req.params))
}

fn handle_payments_receipt(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, payments_receipt(conn, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "payments.quote" => Some(handle_payments_quote(state, req)),
        "payments.record" => Some(handle_payments_record(state, req)),
        "payments.history" => Some(handle_payments_history(state, req)),
        "payments.delete" => Some(handle_payments_delete(state, req)),
        "payments.receipt" => Some(handle_payments_receipt(state, req)),
        _ => None,
    }
}
