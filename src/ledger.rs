use crate::error::{FeeError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::json;
use std::collections::HashMap;

/// One of the seven fixed billing buckets carried by every fee schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeCategory {
    Tuition,
    Practical,
    University,
    Bus,
    Stationary,
    Internship,
    Viva,
}

impl FeeCategory {
    pub const ALL: [FeeCategory; 7] = [
        FeeCategory::Tuition,
        FeeCategory::Practical,
        FeeCategory::University,
        FeeCategory::Bus,
        FeeCategory::Stationary,
        FeeCategory::Internship,
        FeeCategory::Viva,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FeeCategory::Tuition => "tuition",
            FeeCategory::Practical => "practical",
            FeeCategory::University => "university",
            FeeCategory::Bus => "bus",
            FeeCategory::Stationary => "stationary",
            FeeCategory::Internship => "internship",
            FeeCategory::Viva => "viva",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == raw)
    }

    /// Column holding the fixed amount in `fee_schedules`.
    pub fn fee_column(self) -> &'static str {
        match self {
            FeeCategory::Tuition => "tuition_fee",
            FeeCategory::Practical => "practical_fee",
            FeeCategory::University => "university_fee",
            FeeCategory::Bus => "bus_fee",
            FeeCategory::Stationary => "stationary_fee",
            FeeCategory::Internship => "internship_fee",
            FeeCategory::Viva => "viva_fee",
        }
    }

    /// Column holding the discount in `fee_schedules`.
    pub fn discount_column(self) -> &'static str {
        match self {
            FeeCategory::Tuition => "tuition_discount",
            FeeCategory::Practical => "practical_discount",
            FeeCategory::University => "university_discount",
            FeeCategory::Bus => "bus_discount",
            FeeCategory::Stationary => "stationary_discount",
            FeeCategory::Internship => "internship_discount",
            FeeCategory::Viva => "viva_discount",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A fixed-size record with one value per fee category.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerCategory<T>([T; 7]);

impl<T: Copy> PerCategory<T> {
    pub fn from_fn(mut f: impl FnMut(FeeCategory) -> T) -> Self {
        PerCategory(FeeCategory::ALL.map(&mut f))
    }

    pub fn get(&self, category: FeeCategory) -> T {
        self.0[category.index()]
    }

    pub fn set(&mut self, category: FeeCategory, value: T) {
        self.0[category.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeeCategory, T)> + '_ {
        FeeCategory::ALL.into_iter().map(|c| (c, self.get(c)))
    }
}

impl PerCategory<Decimal> {
    pub fn total(&self) -> Decimal {
        self.0.iter().sum()
    }

    pub fn add_assign(&mut self, other: &PerCategory<Decimal>) {
        for c in FeeCategory::ALL {
            self.0[c.index()] += other.get(c);
        }
    }
}

impl<T: Copy + Serialize> Serialize for PerCategory<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(7))?;
        for (c, v) in self.iter() {
            map.serialize_entry(c.as_str(), &v)?;
        }
        map.end()
    }
}

const MAX_AMOUNT_UNITS: i64 = 1_000_000_000_000_000;

/// Largest magnitude accepted for any single fee, discount or payment.
/// Aggregates over such values stay far below `Decimal::MAX`.
pub fn max_amount() -> Decimal {
    Decimal::from(MAX_AMOUNT_UNITS)
}

pub fn check_amount_range(field: &str, amount: Decimal) -> Result<Decimal> {
    if amount.abs() > max_amount() {
        return Err(FeeError::validation_with(
            "bad_params",
            format!("{} is out of range", field),
            json!({ "field": field, "amount": amount, "max": max_amount() }),
        ));
    }
    Ok(amount)
}

/// Aggregation boundary. `Global` is the unscoped view over every row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Admin(String),
}

impl Scope {
    pub fn admin_id(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::Admin(id) => Some(id.as_str()),
        }
    }

    /// Rows owned by another administrator (or by nobody, when scoped) are off limits.
    pub fn check_owner(&self, owner: Option<&str>) -> Result<()> {
        match self {
            Scope::Global => Ok(()),
            Scope::Admin(id) if owner == Some(id.as_str()) => Ok(()),
            Scope::Admin(_) => Err(FeeError::validation(
                "forbidden",
                "record belongs to another administrator",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
    pub admission_no: String,
    pub year: i64,
    pub quota: String,
    pub address: String,
    pub academic_year: String,
    pub group: String,
    pub admin_id: Option<String>,
    #[serde(skip)]
    pub seq: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSchedule {
    pub id: String,
    pub student_id: String,
    pub admin_id: Option<String>,
    pub fixed: PerCategory<Decimal>,
    pub discount: PerCategory<Decimal>,
    pub is_locked: bool,
}

impl FeeSchedule {
    /// Fixed amount minus discount. Not clamped: a discount larger than the
    /// fixed amount yields a negative net.
    pub fn net_payable(&self, category: FeeCategory) -> Decimal {
        self.fixed.get(category) - self.discount.get(category)
    }

    pub fn total_net(&self) -> Decimal {
        FeeCategory::ALL
            .into_iter()
            .map(|c| self.net_payable(c))
            .sum()
    }

    pub fn total_fixed(&self) -> Decimal {
        self.fixed.total()
    }

    pub fn total_discount(&self) -> Decimal {
        self.discount.total()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    pub fee_schedule_id: String,
    pub category: FeeCategory,
    pub paid_amount: Decimal,
    pub bill_no: String,
    pub payment_date: NaiveDate,
    pub student_name: String,
    pub admission_no: String,
    pub admin_id: Option<String>,
    pub admin_name: Option<String>,
    #[serde(skip)]
    pub seq: i64,
}

/// Total paid per `(fee schedule, category)` key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaidMap {
    totals: HashMap<(String, FeeCategory), Decimal>,
}

impl PaidMap {
    pub fn from_payments<'a, I>(payments: I) -> Self
    where
        I: IntoIterator<Item = &'a PaymentRecord>,
    {
        let mut map = PaidMap::default();
        for p in payments {
            map.add(&p.fee_schedule_id, p.category, p.paid_amount);
        }
        map
    }

    pub fn add(&mut self, fee_schedule_id: &str, category: FeeCategory, amount: Decimal) {
        *self
            .totals
            .entry((fee_schedule_id.to_string(), category))
            .or_insert(Decimal::ZERO) += amount;
    }

    pub fn total_paid(&self, fee_schedule_id: &str, category: FeeCategory) -> Decimal {
        self.totals
            .get(&(fee_schedule_id.to_string(), category))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn per_category(&self, fee_schedule_id: &str) -> PerCategory<Decimal> {
        PerCategory::from_fn(|c| self.total_paid(fee_schedule_id, c))
    }

    /// Sum of every payment in the map, whatever its key.
    pub fn grand_total(&self) -> Decimal {
        self.totals.values().sum()
    }
}

/// `max(net - paid, 0)`. The floor applies here, never to the net alone.
pub fn clamp_balance(net: Decimal, paid: Decimal) -> Decimal {
    (net - paid).max(Decimal::ZERO)
}

pub fn balance(schedule: &FeeSchedule, category: FeeCategory, paid: &PaidMap) -> Decimal {
    clamp_balance(
        schedule.net_payable(category),
        paid.total_paid(&schedule.id, category),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBalances {
    pub balances: PerCategory<Decimal>,
    pub paid: PerCategory<Decimal>,
    pub total_fee: Decimal,
    pub total_paid: Decimal,
    /// Sum of the per-category clamped balances.
    pub total_balance: Decimal,
}

pub fn schedule_balances(schedule: &FeeSchedule, paid: &PaidMap) -> ScheduleBalances {
    let balances = PerCategory::from_fn(|c| balance(schedule, c, paid));
    let paid_per_category = paid.per_category(&schedule.id);
    ScheduleBalances {
        total_fee: schedule.total_fixed(),
        total_paid: paid_per_category.total(),
        total_balance: balances.total(),
        balances,
        paid: paid_per_category,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSubmission {
    pub category: FeeCategory,
    pub paid_amount: Decimal,
    /// Discount entered alongside the payment. `None` keeps the stored one.
    pub discount: Option<Decimal>,
    pub bill_no: String,
    pub payment_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerdict {
    pub discount: Decimal,
    pub discount_changed: bool,
    pub net_amount: Decimal,
    /// Balance before this payment, derived from the submitted discount.
    pub balance: Decimal,
    pub balance_after: Decimal,
}

/// Pre-commit checks for a new payment against one schedule category.
///
/// `total_paid_prior` must cover every payment already stored for the
/// `(schedule, category)` key. Bill number uniqueness is checked by the store.
pub fn validate_payment(
    schedule: &FeeSchedule,
    total_paid_prior: Decimal,
    submission: &PaymentSubmission,
) -> Result<PaymentVerdict> {
    let category = submission.category;
    let stored_discount = schedule.discount.get(category);
    let discount = submission.discount.unwrap_or(stored_discount);
    check_amount_range("paidAmount", submission.paid_amount)?;
    check_amount_range("discount", discount)?;

    if discount < Decimal::ZERO {
        return Err(FeeError::validation(
            "negative_discount",
            "discount cannot be negative",
        ));
    }
    if submission.paid_amount <= Decimal::ZERO {
        return Err(FeeError::validation(
            "non_positive_amount",
            "paid amount must be greater than zero",
        ));
    }

    let discount_changed = discount != stored_discount;
    if discount_changed && schedule.is_locked {
        return Err(FeeError::validation(
            "fee_locked",
            "fee structure is locked and its discounts cannot be modified",
        ));
    }

    let net_amount = schedule.fixed.get(category) - discount;
    let balance = clamp_balance(net_amount, total_paid_prior);
    if submission.paid_amount > balance {
        return Err(FeeError::validation_with(
            "exceeds_balance",
            format!(
                "paid amount ({:.2}) cannot exceed remaining balance ({:.2})",
                submission.paid_amount, balance
            ),
            json!({
                "category": category.as_str(),
                "paidAmount": submission.paid_amount,
                "balance": balance,
            }),
        ));
    }

    Ok(PaymentVerdict {
        discount,
        discount_changed,
        net_amount,
        balance,
        balance_after: balance - submission.paid_amount,
    })
}
