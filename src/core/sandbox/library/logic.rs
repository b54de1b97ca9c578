//! `LOGIC` namespace. `if`, `and` and `or` evaluate only what they need.

use super::{Args, Builtin};
use crate::core::sandbox::evaluator::Value;
use crate::error::FormulaResult;

pub(super) const FUNCTIONS: &[(&str, Builtin)] = &[
    ("if", if_),
    ("and", and),
    ("or", or),
    ("not", not),
    ("isBlank", is_blank),
    ("isNumber", is_number),
];

/// `LOGIC.if(condition, then[, else])`; a missing else branch is blank
fn if_(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect_range(2, 3)?;
    if args.value(0)?.is_truthy() {
        args.value(1)
    } else if args.len() == 3 {
        args.value(2)
    } else {
        Ok(Value::Null)
    }
}

fn and(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect_at_least(1)?;
    for i in 0..args.len() {
        if !args.value(i)?.is_truthy() {
            return Ok(Value::Boolean(false));
        }
    }
    Ok(Value::Boolean(true))
}

fn or(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect_at_least(1)?;
    for i in 0..args.len() {
        if args.value(i)?.is_truthy() {
            return Ok(Value::Boolean(true));
        }
    }
    Ok(Value::Boolean(false))
}

fn not(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(1)?;
    Ok(Value::Boolean(!args.value(0)?.is_truthy()))
}

/// Blank or empty text
fn is_blank(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(1)?;
    let blank = match args.value(0)? {
        Value::Null => true,
        Value::Text(s) => s.is_empty(),
        _ => false,
    };
    Ok(Value::Boolean(blank))
}

fn is_number(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(1)?;
    let number = matches!(args.value(0)?, Value::Number(n) if n.is_finite());
    Ok(Value::Boolean(number))
}
