use crate::error::{FeeError, Result};
use crate::ledger::{check_amount_range, FeeCategory, Scope};
use crate::store;
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use std::str::FromStr;

pub fn required_str(params: &Value, key: &str) -> Result<String> {
    optional_str(params, key).ok_or_else(|| FeeError::bad_params(format!("missing {}", key)))
}

/// Trimmed string param; blank counts as absent.
pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn required_i64(params: &Value, key: &str) -> Result<i64> {
    let parsed = match params.get(key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| FeeError::bad_params(format!("{} must be a whole number", key)))
}

pub fn optional_bool(params: &Value, key: &str) -> Result<bool> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(FeeError::bad_params(format!("{} must be a boolean", key))),
    }
}

/// Money from a JSON number or a numeric string, within `max_amount()`.
pub fn amount_value(key: &str, v: &Value) -> Result<Decimal> {
    let parsed = match v {
        Value::Number(n) => {
            let raw = n.to_string();
            Decimal::from_str(&raw)
                .or_else(|_| Decimal::from_scientific(&raw))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    };
    let amount = parsed.ok_or_else(|| {
        FeeError::validation_with(
            "bad_params",
            format!("{} must be a number", key),
            json!({ key: v }),
        )
    })?;
    check_amount_range(key, amount)
}

pub fn required_amount(params: &Value, key: &str) -> Result<Decimal> {
    match params.get(key) {
        None | Some(Value::Null) => Err(FeeError::bad_params(format!("missing {}", key))),
        Some(v) => amount_value(key, v),
    }
}

pub fn optional_amount(params: &Value, key: &str) -> Result<Option<Decimal>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => amount_value(key, v).map(Some),
    }
}

pub fn required_category(params: &Value, key: &str) -> Result<FeeCategory> {
    let raw = required_str(params, key)?;
    FeeCategory::parse(&raw).ok_or_else(|| {
        FeeError::validation_with(
            "bad_params",
            format!("unknown fee category {:?}", raw),
            json!({ key: raw }),
        )
    })
}

/// `YYYY-MM-DD`; today when absent.
pub fn date_or_today(params: &Value, key: &str) -> Result<NaiveDate> {
    match optional_str(params, key) {
        None => Ok(chrono::Local::now().date_naive()),
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
            FeeError::validation_with(
                "bad_params",
                format!("{} must be a YYYY-MM-DD date", key),
                json!({ key: raw }),
            )
        }),
    }
}

/// Resolves the optional `adminId` into a scope. A named administrator must
/// exist; their username is returned for payment attribution.
pub fn resolve_scope(conn: &Connection, params: &Value) -> Result<(Scope, Option<String>)> {
    match optional_str(params, "adminId") {
        None => Ok((Scope::Global, None)),
        Some(admin_id) => {
            let admin = store::find_admin(conn, &admin_id)?;
            Ok((Scope::Admin(admin.id), Some(admin.username)))
        }
    }
}

pub fn scope_of(conn: &Connection, params: &Value) -> Result<Scope> {
    resolve_scope(conn, params).map(|(scope, _)| scope)
}

pub fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| FeeError::validation("serialize_failed", e.to_string()))
}

pub fn no_workspace() -> FeeError {
    FeeError::validation("no_workspace", "select a workspace first")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_accept_numbers_and_numeric_strings() {
        let params = json!({ "a": 1500, "b": "99.50", "c": 12.25, "d": "abc", "e": "" });
        assert_eq!(required_amount(&params, "a").expect("a"), Decimal::from(1500));
        assert_eq!(
            required_amount(&params, "b").expect("b"),
            Decimal::from_str("99.50").expect("dec")
        );
        assert_eq!(
            required_amount(&params, "c").expect("c"),
            Decimal::from_str("12.25").expect("dec")
        );
        assert_eq!(required_amount(&params, "d").expect_err("d").code(), "bad_params");
        assert_eq!(optional_amount(&params, "e").expect("e"), None);
        assert_eq!(required_amount(&params, "zz").expect_err("zz").code(), "bad_params");
    }

    #[test]
    fn amounts_beyond_the_cap_are_rejected() {
        let params = json!({
            "huge": "79228162514264337593543950335",
            "cap": "1000000000000000",
            "over": 1000000000000001u64,
            "neg": "-1000000000000001",
        });
        assert_eq!(required_amount(&params, "cap").expect("cap"), crate::ledger::max_amount());
        for key in ["huge", "over", "neg"] {
            assert_eq!(required_amount(&params, key).expect_err(key).code(), "bad_params");
        }
    }

    #[test]
    fn blank_strings_are_missing() {
        let params = json!({ "name": "  ", "billNo": " B-1 " });
        assert!(required_str(&params, "name").is_err());
        assert_eq!(required_str(&params, "billNo").expect("bill"), "B-1");
    }

    #[test]
    fn dates_are_iso() {
        let params = json!({ "ok": "2025-06-01", "bad": "01/06/2025" });
        assert_eq!(
            date_or_today(&params, "ok").expect("date"),
            NaiveDate::from_ymd_opt(2025, 6, 1).expect("date")
        );
        assert_eq!(date_or_today(&params, "bad").expect_err("bad").code(), "bad_params");
    }
}
