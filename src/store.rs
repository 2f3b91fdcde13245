use crate::error::{FeeError, Result};
use crate::ledger::{
    check_amount_range, max_amount, validate_payment, FeeCategory, FeeSchedule, PaymentRecord,
    PaymentSubmission, PaymentVerdict, PerCategory, Scope, StudentRecord,
};
use chrono::{NaiveDate, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

const STUDENT_COLUMNS: &str =
    "id, name, admission_no, year, quota, address, academic_year, group_name, admin_id, rowid";
const PAYMENT_COLUMNS: &str = "id, fee_schedule_id, fee_type, paid_amount, bill_no, payment_date,
     student_name, admission_no, admin_id, admin_name, rowid";
// Rows match when no administrator is given, or when they belong to it.
const SCOPE_FILTER: &str = "(?1 IS NULL OR admin_id = ?1)";

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn conversion_failure(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn decimal_at(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    let amount = Decimal::from_str(raw.trim())
        .map_err(|e| conversion_failure(idx, format!("bad amount {raw:?}: {e}")))?;
    if amount.abs() > max_amount() {
        return Err(conversion_failure(idx, format!("amount {raw:?} out of range")));
    }
    Ok(amount)
}

fn date_at(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| conversion_failure(idx, format!("bad date {raw:?}: {e}")))
}

fn category_at(row: &Row, idx: usize) -> rusqlite::Result<FeeCategory> {
    let raw: String = row.get(idx)?;
    FeeCategory::parse(&raw).ok_or_else(|| conversion_failure(idx, format!("unknown fee type {raw:?}")))
}

// ---------------------------------------------------------------------------
// Administrators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: String,
}

fn admin_from_row(row: &Row) -> rusqlite::Result<AdminRecord> {
    Ok(AdminRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        created_at: row.get(3)?,
    })
}

pub fn create_admin(conn: &Connection, username: &str, email: &str) -> Result<AdminRecord> {
    let taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM admins WHERE username = ? OR email = ?",
            (username, email),
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(FeeError::validation(
            "duplicate_admin",
            "username or email already exists",
        ));
    }

    let admin = AdminRecord {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        email: email.to_string(),
        created_at: now_rfc3339(),
    };
    conn.execute(
        "INSERT INTO admins(id, username, email, created_at) VALUES(?, ?, ?, ?)",
        (&admin.id, &admin.username, &admin.email, &admin.created_at),
    )?;
    Ok(admin)
}

pub fn list_admins(conn: &Connection) -> Result<Vec<AdminRecord>> {
    let mut stmt =
        conn.prepare("SELECT id, username, email, created_at FROM admins ORDER BY username")?;
    let rows = stmt
        .query_map([], admin_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn find_admin(conn: &Connection, admin_id: &str) -> Result<AdminRecord> {
    conn.query_row(
        "SELECT id, username, email, created_at FROM admins WHERE id = ?",
        [admin_id],
        admin_from_row,
    )
    .optional()?
    .ok_or(FeeError::NotFound("administrator"))
}

// ---------------------------------------------------------------------------
// Students
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct NewStudent {
    pub name: String,
    pub admission_no: String,
    pub year: i64,
    pub quota: String,
    pub address: String,
    pub academic_year: String,
    pub group: String,
}

fn student_from_row(row: &Row) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        admission_no: row.get(2)?,
        year: row.get(3)?,
        quota: row.get(4)?,
        address: row.get(5)?,
        academic_year: row.get(6)?,
        group: row.get(7)?,
        admin_id: row.get(8)?,
        seq: row.get(9)?,
    })
}

pub fn admission_no_taken(conn: &Connection, scope: &Scope, admission_no: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM students WHERE {SCOPE_FILTER} AND admission_no = ?2"),
            (scope.admin_id(), admission_no),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn create_student(conn: &Connection, scope: &Scope, new: &NewStudent) -> Result<StudentRecord> {
    if admission_no_taken(conn, scope, &new.admission_no)? {
        return Err(FeeError::validation_with(
            "duplicate_admission_no",
            format!("admission number '{}' already exists", new.admission_no),
            serde_json::json!({ "admissionNo": new.admission_no }),
        ));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(
            id, name, admission_no, year, quota, address, academic_year, group_name, admin_id, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &new.name,
            &new.admission_no,
            new.year,
            &new.quota,
            &new.address,
            &new.academic_year,
            &new.group,
            scope.admin_id(),
            now_rfc3339(),
        ),
    )?;
    info!(student_id = %id, admission_no = %new.admission_no, "student created");
    find_student(conn, scope, &id)
}

/// Students in scope, in insertion order.
pub fn load_students(conn: &Connection, scope: &Scope) -> Result<Vec<StudentRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE {SCOPE_FILTER} ORDER BY rowid"
    ))?;
    let rows = stmt
        .query_map([scope.admin_id()], student_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn student_by_id(conn: &Connection, student_id: &str) -> Result<Option<StudentRecord>> {
    Ok(conn
        .query_row(
            &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"),
            [student_id],
            student_from_row,
        )
        .optional()?)
}

pub fn find_student(conn: &Connection, scope: &Scope, student_id: &str) -> Result<StudentRecord> {
    let student = student_by_id(conn, student_id)?.ok_or(FeeError::NotFound("student"))?;
    scope.check_owner(student.admin_id.as_deref())?;
    Ok(student)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedCounts {
    pub payments: usize,
    pub fee_schedules: usize,
    pub students: usize,
}

fn delete_step(tx: &Transaction, step: &'static str, sql: &str, id: &str) -> Result<usize> {
    tx.execute(sql, [id])
        .map_err(|source| FeeError::Integrity { step, source })
}

/// Removes a student with its payments and fee schedule, all or nothing.
pub fn delete_student_cascade(
    conn: &Connection,
    scope: &Scope,
    student_id: &str,
) -> Result<DeletedCounts> {
    let student = find_student(conn, scope, student_id)?;

    // Dropping an uncommitted transaction rolls it back.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let payments = delete_step(
        &tx,
        "payments",
        "DELETE FROM payments
         WHERE fee_schedule_id IN (SELECT id FROM fee_schedules WHERE student_id = ?)",
        &student.id,
    )?;
    let fee_schedules = delete_step(
        &tx,
        "fee_schedules",
        "DELETE FROM fee_schedules WHERE student_id = ?",
        &student.id,
    )?;
    let students = delete_step(&tx, "students", "DELETE FROM students WHERE id = ?", &student.id)?;
    tx.commit()
        .map_err(|source| FeeError::Integrity { step: "commit", source })?;

    info!(student_id = %student.id, payments, fee_schedules, "student deleted");
    Ok(DeletedCounts {
        payments,
        fee_schedules,
        students,
    })
}

// ---------------------------------------------------------------------------
// Fee schedules
// ---------------------------------------------------------------------------

fn schedule_select() -> String {
    let mut cols = String::from("SELECT id, student_id, admin_id, is_locked");
    for c in FeeCategory::ALL {
        cols.push_str(", ");
        cols.push_str(c.fee_column());
        cols.push_str(", ");
        cols.push_str(c.discount_column());
    }
    cols.push_str(" FROM fee_schedules");
    cols
}

fn schedule_from_row(row: &Row) -> rusqlite::Result<FeeSchedule> {
    let locked: i64 = row.get(3)?;
    let mut fixed = PerCategory::default();
    let mut discount = PerCategory::default();
    for (i, c) in FeeCategory::ALL.into_iter().enumerate() {
        fixed.set(c, decimal_at(row, 4 + 2 * i)?);
        discount.set(c, decimal_at(row, 5 + 2 * i)?);
    }
    Ok(FeeSchedule {
        id: row.get(0)?,
        student_id: row.get(1)?,
        admin_id: row.get(2)?,
        fixed,
        discount,
        is_locked: locked != 0,
    })
}

pub fn load_schedules(conn: &Connection, scope: &Scope) -> Result<Vec<FeeSchedule>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE {SCOPE_FILTER} ORDER BY rowid",
        schedule_select()
    ))?;
    let rows = stmt
        .query_map([scope.admin_id()], schedule_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Schedule for a student whose ownership the caller has already checked.
pub fn schedule_for_student(conn: &Connection, student_id: &str) -> Result<Option<FeeSchedule>> {
    Ok(conn
        .query_row(
            &format!("{} WHERE student_id = ?", schedule_select()),
            [student_id],
            schedule_from_row,
        )
        .optional()?)
}

pub fn find_schedule(conn: &Connection, scope: &Scope, fee_id: &str) -> Result<FeeSchedule> {
    let schedule = conn
        .query_row(
            &format!("{} WHERE id = ?", schedule_select()),
            [fee_id],
            schedule_from_row,
        )
        .optional()?
        .ok_or(FeeError::NotFound("fee schedule"))?;
    scope.check_owner(schedule.admin_id.as_deref())?;
    Ok(schedule)
}

/// Creates the student's schedule on first use, otherwise replaces its fixed
/// amounts. Discounts are left alone. A locked schedule rejects the write.
pub fn save_fixed_amounts(
    conn: &Connection,
    scope: &Scope,
    student_id: &str,
    fixed: &PerCategory<Decimal>,
    lock: bool,
) -> Result<FeeSchedule> {
    let student = find_student(conn, scope, student_id)?;
    if let Some((category, amount)) = fixed.iter().find(|(_, v)| *v < Decimal::ZERO) {
        return Err(FeeError::validation_with(
            "negative_amount",
            format!("{} fee cannot be negative", category.as_str()),
            serde_json::json!({ "category": category.as_str(), "amount": amount }),
        ));
    }
    for (category, amount) in fixed.iter() {
        check_amount_range(category.as_str(), amount)?;
    }

    let existing = schedule_for_student(conn, &student.id)?;
    let mut values: Vec<Value> = fixed
        .iter()
        .map(|(_, v)| Value::Text(v.to_string()))
        .collect();
    values.push(Value::Integer(i64::from(lock)));
    values.push(Value::Text(now_rfc3339()));

    let fee_id = match existing {
        Some(schedule) if schedule.is_locked => {
            return Err(FeeError::validation(
                "fee_locked",
                "fee structure is locked and cannot be modified",
            ));
        }
        Some(schedule) => {
            let assignments = FeeCategory::ALL
                .iter()
                .map(|c| format!("{} = ?", c.fee_column()))
                .collect::<Vec<_>>()
                .join(", ");
            values.push(Value::Text(schedule.id.clone()));
            conn.execute(
                &format!(
                    "UPDATE fee_schedules SET {assignments}, is_locked = ?, updated_at = ? WHERE id = ?"
                ),
                params_from_iter(values),
            )?;
            schedule.id
        }
        None => {
            let fee_id = Uuid::new_v4().to_string();
            let columns = FeeCategory::ALL
                .iter()
                .map(|c| c.fee_column())
                .collect::<Vec<_>>()
                .join(", ");
            values.push(Value::Text(fee_id.clone()));
            values.push(Value::Text(student.id.clone()));
            values.push(match &student.admin_id {
                Some(a) => Value::Text(a.clone()),
                None => Value::Null,
            });
            conn.execute(
                &format!(
                    "INSERT INTO fee_schedules({columns}, is_locked, updated_at, id, student_id, admin_id)
                     VALUES({})",
                    vec!["?"; FeeCategory::ALL.len() + 5].join(", ")
                ),
                params_from_iter(values),
            )?;
            fee_id
        }
    };

    info!(fee_id = %fee_id, student_id = %student.id, locked = lock, "fee schedule saved");
    find_schedule(conn, scope, &fee_id)
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

fn payment_from_row(row: &Row) -> rusqlite::Result<PaymentRecord> {
    Ok(PaymentRecord {
        id: row.get(0)?,
        fee_schedule_id: row.get(1)?,
        category: category_at(row, 2)?,
        paid_amount: decimal_at(row, 3)?,
        bill_no: row.get(4)?,
        payment_date: date_at(row, 5)?,
        student_name: row.get(6)?,
        admission_no: row.get(7)?,
        admin_id: row.get(8)?,
        admin_name: row.get(9)?,
        seq: row.get(10)?,
    })
}

/// Payments in scope, in insertion order.
pub fn load_payments(conn: &Connection, scope: &Scope) -> Result<Vec<PaymentRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE {SCOPE_FILTER} ORDER BY rowid"
    ))?;
    let rows = stmt
        .query_map([scope.admin_id()], payment_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Payments against one schedule, newest first.
pub fn payments_for_schedule(conn: &Connection, fee_id: &str) -> Result<Vec<PaymentRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments
         WHERE fee_schedule_id = ?
         ORDER BY payment_date DESC, rowid DESC"
    ))?;
    let rows = stmt
        .query_map([fee_id], payment_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn total_paid(conn: &Connection, fee_id: &str, category: FeeCategory) -> Result<Decimal> {
    let mut stmt = conn.prepare(
        "SELECT paid_amount FROM payments WHERE fee_schedule_id = ? AND fee_type = ?",
    )?;
    let amounts = stmt
        .query_map((fee_id, category.as_str()), |r| decimal_at(r, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(amounts.into_iter().sum())
}

pub fn bill_no_taken(conn: &Connection, scope: &Scope, bill_no: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM payments WHERE {SCOPE_FILTER} AND bill_no = ?2"),
            (scope.admin_id(), bill_no),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn find_payment(conn: &Connection, scope: &Scope, payment_id: &str) -> Result<PaymentRecord> {
    let payment = conn
        .query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?"),
            [payment_id],
            payment_from_row,
        )
        .optional()?
        .ok_or(FeeError::NotFound("payment"))?;
    scope.check_owner(payment.admin_id.as_deref())?;
    Ok(payment)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedPayment {
    pub payment: PaymentRecord,
    pub verdict: PaymentVerdict,
}

/// Validates and stores one payment inside a single write transaction, so the
/// balance check and the insert see the same ledger state.
pub fn record_payment(
    conn: &Connection,
    scope: &Scope,
    admin_name: Option<&str>,
    fee_id: &str,
    submission: &PaymentSubmission,
) -> Result<RecordedPayment> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let schedule = find_schedule(&tx, scope, fee_id)?;
    let student = student_by_id(&tx, &schedule.student_id)?.ok_or(FeeError::NotFound("student"))?;
    let prior = total_paid(&tx, &schedule.id, submission.category)?;
    let verdict = validate_payment(&schedule, prior, submission)?;

    if bill_no_taken(&tx, scope, &submission.bill_no)? {
        return Err(FeeError::validation_with(
            "duplicate_bill_no",
            "bill number already exists",
            serde_json::json!({ "billNo": submission.bill_no }),
        ));
    }

    if verdict.discount_changed {
        tx.execute(
            &format!(
                "UPDATE fee_schedules SET {} = ?, updated_at = ? WHERE id = ?",
                submission.category.discount_column()
            ),
            (verdict.discount.to_string(), now_rfc3339(), &schedule.id),
        )?;
        debug!(fee_id = %schedule.id, category = submission.category.as_str(), "discount updated");
    }

    let payment_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO payments(
            id, fee_schedule_id, fee_type, paid_amount, bill_no, payment_date,
            student_name, admission_no, admin_name, admin_id, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &payment_id,
            &schedule.id,
            submission.category.as_str(),
            submission.paid_amount.to_string(),
            &submission.bill_no,
            submission.payment_date.format("%Y-%m-%d").to_string(),
            &student.name,
            &student.admission_no,
            admin_name,
            schedule.admin_id.as_deref(),
            now_rfc3339(),
        ),
    )?;
    let payment = find_payment(&tx, scope, &payment_id)?;
    tx.commit()?;

    info!(
        payment_id = %payment.id,
        fee_id = %schedule.id,
        category = submission.category.as_str(),
        amount = %submission.paid_amount,
        "payment recorded"
    );
    Ok(RecordedPayment { payment, verdict })
}

pub fn delete_payment(conn: &Connection, scope: &Scope, payment_id: &str) -> Result<PaymentRecord> {
    let payment = find_payment(conn, scope, payment_id)?;
    conn.execute("DELETE FROM payments WHERE id = ?", [&payment.id])?;
    info!(payment_id = %payment.id, "payment deleted");
    Ok(payment)
}

/// Everything the aggregators read for one scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub students: Vec<StudentRecord>,
    pub schedules: Vec<FeeSchedule>,
    pub payments: Vec<PaymentRecord>,
}

pub fn load_dataset(conn: &Connection, scope: &Scope) -> Result<Dataset> {
    Ok(Dataset {
        students: load_students(conn, scope)?,
        schedules: load_schedules(conn, scope)?,
        payments: load_payments(conn, scope)?,
    })
}
