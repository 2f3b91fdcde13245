use crate::error::{FeeError, Result};
use crate::ipc::error::{fee_err, respond};
use crate::ipc::helpers::{
    no_workspace, optional_str, required_i64, required_str, scope_of, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{schedule_balances, PaidMap};
use crate::report::{parse_student_filters, StudentFilters};
use crate::store::{self, NewStudent};
use rusqlite::Connection;
use serde_json::json;

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let scope = scope_of(conn, params)?;
    let new = NewStudent {
        name: required_str(params, "name")?,
        admission_no: required_str(params, "admissionNo")?,
        year: required_i64(params, "year")?,
        quota: optional_str(params, "quota").unwrap_or_default(),
        address: optional_str(params, "address").unwrap_or_default(),
        academic_year: required_str(params, "academicYear")?,
        group: required_str(params, "group")?,
    };
    let student = store::create_student(conn, &scope, &new)?;
    Ok(json!({ "student": to_json(&student)? }))
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let scope = scope_of(conn, params)?;
    let filters = parse_student_filters(params)?;
    let students: Vec<_> = store::load_students(conn, &scope)?
        .into_iter()
        .filter(|s| filters.matches(s))
        .collect();
    Ok(json!({ "students": to_json(&students)? }))
}

fn students_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let scope = scope_of(conn, params)?;
    let student_id = required_str(params, "studentId")?;
    let student = store::find_student(conn, &scope, &student_id)?;
    let fee = store::schedule_for_student(conn, &student.id)?;
    Ok(json!({
        "student": to_json(&student)?,
        "fee": to_json(&fee)?,
    }))
}

/// Payment desk lookup: the first matching student with their schedule,
/// balances and payments (newest first).
fn students_search(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let scope = scope_of(conn, params)?;
    let query = required_str(params, "query")?;
    let filters = StudentFilters {
        search: Some(query),
        ..StudentFilters::default()
    };
    let Some(student) = store::load_students(conn, &scope)?
        .into_iter()
        .filter(|s| filters.matches(s))
        .min_by_key(|s| s.seq)
    else {
        return Err(FeeError::NotFound("student"));
    };

    let fee = store::schedule_for_student(conn, &student.id)?;
    let (payments, balances) = match &fee {
        Some(schedule) => {
            let payments = store::payments_for_schedule(conn, &schedule.id)?;
            let paid = PaidMap::from_payments(&payments);
            let balances = schedule_balances(schedule, &paid);
            (payments, Some(balances))
        }
        None => (Vec::new(), None),
    };

    Ok(json!({
        "student": to_json(&student)?,
        "fee": to_json(&fee)?,
        "balances": to_json(&balances)?,
        "payments": to_json(&payments)?,
    }))
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value> {
    let scope = scope_of(conn, params)?;
    let student_id = required_str(params, "studentId")?;
    let deleted = store::delete_student_cascade(conn, &scope, &student_id)?;
    Ok(json!({ "ok": true, "deleted": to_json(&deleted)? }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, students_create(conn, &req.params))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, students_list(conn, &req.params))
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, students_get(conn, &req.params))
}

fn handle_students_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, students_search(conn, &req.params))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return fee_err(&req.id, &no_workspace());
    };
    respond(&req.id, students_delete(conn, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.search" => Some(handle_students_search(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
