use crate::error::{FeeError, Result};
use crate::ledger::{
    balance, clamp_balance, schedule_balances, FeeCategory, FeeSchedule, PaidMap, PaymentRecord,
    PerCategory, StudentRecord,
};
use crate::store::Dataset;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

const DASHBOARD_LIST_LIMIT: usize = 5;

/// Conjunctive student filters; every unset field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFilters {
    pub search: Option<String>,
    pub academic_year: Option<String>,
    pub group: Option<String>,
    pub year: Option<i64>,
}

impl StudentFilters {
    pub fn matches(&self, s: &StudentRecord) -> bool {
        if let Some(q) = self.search.as_deref() {
            if !contains_ci(&s.name, q) && !contains_ci(&s.admission_no, q) {
                return false;
            }
        }
        if let Some(y) = self.academic_year.as_deref() {
            if s.academic_year != y {
                return false;
            }
        }
        if let Some(g) = self.group.as_deref() {
            if s.group != g {
                return false;
            }
        }
        if let Some(y) = self.year {
            if s.year != y {
                return false;
            }
        }
        true
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn non_empty(v: Option<&serde_json::Value>) -> Option<&serde_json::Value> {
    match v {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => None,
        Some(other) => Some(other),
    }
}

/// Reads `search`, `academicYear`, `group` and `year` from request params.
/// Empty strings count as "no filter", matching what a blank form field sends.
pub fn parse_student_filters(params: &serde_json::Value) -> Result<StudentFilters> {
    let text = |key: &str| -> Result<Option<String>> {
        match non_empty(params.get(key)) {
            None => Ok(None),
            Some(serde_json::Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(other) => Err(FeeError::validation_with(
                "bad_params",
                format!("{key} must be a string"),
                serde_json::json!({ key: other }),
            )),
        }
    };

    let year = match non_empty(params.get("year")) {
        None => None,
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };
    if non_empty(params.get("year")).is_some() && year.is_none() {
        return Err(FeeError::validation_with(
            "bad_params",
            "year must be a whole number",
            serde_json::json!({ "year": params.get("year") }),
        ));
    }

    Ok(StudentFilters {
        search: text("search")?,
        academic_year: text("academicYear")?,
        group: text("group")?,
        year,
    })
}

/// Report ordering: academic year descending, then group, year of study and
/// name ascending, then insertion order.
pub fn report_order(a: &StudentRecord, b: &StudentRecord) -> Ordering {
    b.academic_year
        .cmp(&a.academic_year)
        .then_with(|| a.group.cmp(&b.group))
        .then_with(|| a.year.cmp(&b.year))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.seq.cmp(&b.seq))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReportRow {
    pub student_id: String,
    pub fee_schedule_id: String,
    pub name: String,
    pub admission_no: String,
    pub year: i64,
    pub group: String,
    pub academic_year: String,
    pub balances: PerCategory<Decimal>,
    pub total_fee: Decimal,
    pub total_paid: Decimal,
    pub total_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearTotals {
    pub academic_year: String,
    pub student_count: usize,
    pub total_fee: Decimal,
    pub total_paid: Decimal,
    pub total_balance: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrandTotals {
    pub student_count: usize,
    pub total_fee: Decimal,
    pub total_paid: Decimal,
    pub total_balance: Decimal,
    pub balances: PerCategory<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeReport {
    pub rows: Vec<StudentReportRow>,
    pub year_totals: Vec<YearTotals>,
    pub grand_totals: GrandTotals,
}

/// Per-student balances for every filtered student that has a fee schedule,
/// with per-year and grand totals. Pure over its inputs.
pub fn build_fee_report(data: &Dataset, filters: &StudentFilters) -> FeeReport {
    let paid = PaidMap::from_payments(&data.payments);
    let by_student: HashMap<&str, &FeeSchedule> = data
        .schedules
        .iter()
        .map(|f| (f.student_id.as_str(), f))
        .collect();

    let mut students: Vec<&StudentRecord> = data
        .students
        .iter()
        .filter(|s| filters.matches(s))
        .filter(|s| by_student.contains_key(s.id.as_str()))
        .collect();
    students.sort_by(|a, b| report_order(a, b));

    let mut rows = Vec::with_capacity(students.len());
    let mut years: BTreeMap<String, YearTotals> = BTreeMap::new();
    let mut grand = GrandTotals::default();

    for s in students {
        let Some(schedule) = by_student.get(s.id.as_str()) else {
            continue;
        };
        let b = schedule_balances(schedule, &paid);

        let year = years
            .entry(s.academic_year.clone())
            .or_insert_with(|| YearTotals {
                academic_year: s.academic_year.clone(),
                student_count: 0,
                total_fee: Decimal::ZERO,
                total_paid: Decimal::ZERO,
                total_balance: Decimal::ZERO,
            });
        year.student_count += 1;
        year.total_fee += b.total_fee;
        year.total_paid += b.total_paid;
        year.total_balance += b.total_balance;

        grand.student_count += 1;
        grand.total_fee += b.total_fee;
        grand.total_paid += b.total_paid;
        grand.total_balance += b.total_balance;
        grand.balances.add_assign(&b.balances);

        rows.push(StudentReportRow {
            student_id: s.id.clone(),
            fee_schedule_id: schedule.id.clone(),
            name: s.name.clone(),
            admission_no: s.admission_no.clone(),
            year: s.year,
            group: s.group.clone(),
            academic_year: s.academic_year.clone(),
            balances: b.balances,
            total_fee: b.total_fee,
            total_paid: b.total_paid,
            total_balance: b.total_balance,
        });
    }

    FeeReport {
        rows,
        year_totals: years.into_values().rev().collect(),
        grand_totals: grand,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutstandingStudent {
    pub student_id: String,
    pub name: String,
    pub admission_no: String,
    pub outstanding_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub total_students: usize,
    pub total_expected: Decimal,
    pub total_discount: Decimal,
    pub net_payable: Decimal,
    pub total_collected: Decimal,
    pub total_balance: Decimal,
    pub recent_payments: Vec<PaymentRecord>,
    pub outstanding_students: Vec<OutstandingStudent>,
}

fn newest_first(a: &PaymentRecord, b: &PaymentRecord) -> Ordering {
    b.payment_date
        .cmp(&a.payment_date)
        .then_with(|| b.seq.cmp(&a.seq))
}

pub fn build_dashboard(data: &Dataset) -> Dashboard {
    let paid = PaidMap::from_payments(&data.payments);
    let total_expected: Decimal = data.schedules.iter().map(|f| f.total_fixed()).sum();
    let total_discount: Decimal = data.schedules.iter().map(|f| f.total_discount()).sum();

    let students: HashMap<&str, &StudentRecord> =
        data.students.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut total_balance = Decimal::ZERO;
    let mut outstanding = Vec::new();
    for schedule in &data.schedules {
        let b = schedule_balances(schedule, &paid);
        total_balance += b.total_balance;
        if b.total_balance <= Decimal::ZERO {
            continue;
        }
        if let Some(s) = students.get(schedule.student_id.as_str()) {
            outstanding.push((
                s.seq,
                OutstandingStudent {
                    student_id: s.id.clone(),
                    name: s.name.clone(),
                    admission_no: s.admission_no.clone(),
                    outstanding_balance: b.total_balance,
                },
            ));
        }
    }
    outstanding.sort_by(|(sa, a), (sb, b)| {
        b.outstanding_balance
            .cmp(&a.outstanding_balance)
            .then_with(|| sa.cmp(sb))
    });

    let mut recent: Vec<PaymentRecord> = data.payments.clone();
    recent.sort_by(newest_first);
    recent.truncate(DASHBOARD_LIST_LIMIT);

    Dashboard {
        total_students: data.students.len(),
        total_expected,
        total_discount,
        net_payable: data.schedules.iter().map(|f| f.total_net()).sum(),
        total_collected: paid.grand_total(),
        total_balance,
        recent_payments: recent,
        outstanding_students: outstanding
            .into_iter()
            .take(DASHBOARD_LIST_LIMIT)
            .map(|(_, o)| o)
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHistoryRow {
    #[serde(flatten)]
    pub payment: PaymentRecord,
    pub academic_year: String,
    pub year: i64,
    pub group: String,
    pub remaining_balance: Decimal,
}

/// Payments newest first, each with the current balance of its category.
/// `search` matches student name, admission number or bill number.
pub fn payment_history(data: &Dataset, search: Option<&str>) -> Vec<PaymentHistoryRow> {
    let paid = PaidMap::from_payments(&data.payments);
    let schedules: HashMap<&str, &FeeSchedule> =
        data.schedules.iter().map(|f| (f.id.as_str(), f)).collect();
    let students: HashMap<&str, &StudentRecord> =
        data.students.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut rows: Vec<PaymentHistoryRow> = data
        .payments
        .iter()
        .filter_map(|p| {
            let schedule = schedules.get(p.fee_schedule_id.as_str())?;
            let student = students.get(schedule.student_id.as_str())?;
            if let Some(q) = search.filter(|q| !q.trim().is_empty()) {
                let q = q.trim();
                if !contains_ci(&student.name, q)
                    && !contains_ci(&student.admission_no, q)
                    && !contains_ci(&p.bill_no, q)
                {
                    return None;
                }
            }
            let mut payment = p.clone();
            payment.student_name = student.name.clone();
            payment.admission_no = student.admission_no.clone();
            Some(PaymentHistoryRow {
                remaining_balance: balance(schedule, p.category, &paid),
                academic_year: student.academic_year.clone(),
                year: student.year,
                group: student.group.clone(),
                payment,
            })
        })
        .collect();
    rows.sort_by(|a, b| newest_first(&a.payment, &b.payment));
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub payment_id: String,
    pub bill_no: String,
    pub payment_date: NaiveDate,
    pub student_name: String,
    pub admission_no: String,
    pub academic_year: String,
    pub category: FeeCategory,
    pub paid_amount: Decimal,
    pub fixed_fee: Decimal,
    pub discount: Decimal,
    pub net_amount: Decimal,
    /// Paid for this category up to and including the payment date.
    pub total_paid_to_date: Decimal,
    pub balance: Decimal,
    pub processed_by: Option<String>,
}

/// Receipt figures for one payment. Only `payments` on the same schedule and
/// category count toward the paid-to-date total.
pub fn build_receipt(
    payment: &PaymentRecord,
    schedule: &FeeSchedule,
    student: &StudentRecord,
    payments: &[PaymentRecord],
) -> Receipt {
    let category = payment.category;
    let total_paid_to_date: Decimal = payments
        .iter()
        .filter(|p| {
            p.fee_schedule_id == payment.fee_schedule_id
                && p.category == category
                && p.payment_date <= payment.payment_date
        })
        .map(|p| p.paid_amount)
        .sum();
    let net_amount = schedule.net_payable(category);

    Receipt {
        payment_id: payment.id.clone(),
        bill_no: payment.bill_no.clone(),
        payment_date: payment.payment_date,
        student_name: student.name.clone(),
        admission_no: student.admission_no.clone(),
        academic_year: student.academic_year.clone(),
        category,
        paid_amount: payment.paid_amount,
        fixed_fee: schedule.fixed.get(category),
        discount: schedule.discount.get(category),
        net_amount,
        total_paid_to_date,
        balance: clamp_balance(net_amount, total_paid_to_date),
        processed_by: payment.admin_name.clone(),
    }
}
