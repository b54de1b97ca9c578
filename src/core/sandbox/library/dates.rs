//! `DATE` namespace
//!
//! Dates are ISO-8601 text (`2024-01-31`, `2024-01-31T09:30:00Z`, ...) or
//! numbers of milliseconds since the Unix epoch. All arithmetic is in UTC.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use super::{Args, Builtin};
use crate::core::sandbox::evaluator::Value;
use crate::error::FormulaResult;

pub(super) const FUNCTIONS: &[(&str, Builtin)] = &[
    ("today", today),
    ("now", now),
    ("year", year),
    ("month", month),
    ("day", day),
    ("toDays", to_days),
    ("addDays", add_days),
    ("diffDays", diff_days),
];

const MILLIS_PER_DAY: i64 = 86_400_000;

const DATE_FORMAT: &str = "%Y-%m-%d";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) if n.is_finite() => DateTime::from_timestamp_millis(n.trunc() as i64),
        Value::Text(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for format in NAIVE_FORMATS {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(dt.and_utc());
                }
            }
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        }
        _ => None,
    }
}

fn date(args: &mut Args<'_>, index: usize) -> FormulaResult<DateTime<Utc>> {
    let value = args.value(index)?;
    parse_date(&value).ok_or_else(|| {
        args.error(format!(
            "argument {} is not a valid date: {}",
            index + 1,
            value.as_text()
        ))
    })
}

fn today(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(0)?;
    Ok(Value::Text(
        Utc::now().date_naive().format(DATE_FORMAT).to_string(),
    ))
}

fn now(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(0)?;
    Ok(Value::Text(
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    ))
}

fn year(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(1)?;
    Ok(Value::Number(date(args, 0)?.year() as f64))
}

fn month(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(1)?;
    Ok(Value::Number(date(args, 0)?.month() as f64))
}

fn day(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(1)?;
    Ok(Value::Number(date(args, 0)?.day() as f64))
}

/// Whole days since 1970-01-01
fn to_days(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(1)?;
    let millis = date(args, 0)?.timestamp_millis();
    Ok(Value::Number(millis.div_euclid(MILLIS_PER_DAY) as f64))
}

/// Calendar date `n` days after (or before, when negative) the argument
fn add_days(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(2)?;
    let start = date(args, 0)?.date_naive();
    let n = args.integer(1)?;

    let days = Days::new(n.unsigned_abs());
    let shifted = if n >= 0 {
        start.checked_add_days(days)
    } else {
        start.checked_sub_days(days)
    };
    let shifted = shifted.ok_or_else(|| args.error("date out of range"))?;
    Ok(Value::Text(shifted.format(DATE_FORMAT).to_string()))
}

/// First date minus second date, in whole days, rounded down
fn diff_days(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(2)?;
    let end = date(args, 0)?.timestamp_millis();
    let start = date(args, 1)?.timestamp_millis();
    Ok(Value::Number((end - start).div_euclid(MILLIS_PER_DAY) as f64))
}
