//! `MATH` namespace

use super::{finite, Args, Builtin};
use crate::core::sandbox::evaluator::Value;
use crate::error::FormulaResult;

pub(super) const FUNCTIONS: &[(&str, Builtin)] = &[
    ("abs", abs),
    ("ceil", ceil),
    ("floor", floor),
    ("round", round),
    ("max", max),
    ("min", min),
    ("sqrt", sqrt),
    ("pow", pow),
    ("log", log),
    ("log10", log10),
    ("exp", exp),
];

fn unary(args: &mut Args<'_>, f: fn(f64) -> f64) -> FormulaResult<Value> {
    args.expect(1)?;
    let n = args.number(0)?;
    finite(args, f(n))
}

fn abs(args: &mut Args<'_>) -> FormulaResult<Value> {
    unary(args, f64::abs)
}

fn ceil(args: &mut Args<'_>) -> FormulaResult<Value> {
    unary(args, f64::ceil)
}

fn floor(args: &mut Args<'_>) -> FormulaResult<Value> {
    unary(args, f64::floor)
}

/// Half-way cases round towards positive infinity (`-2.5` -> `-2`)
fn round(args: &mut Args<'_>) -> FormulaResult<Value> {
    unary(args, |n| (n + 0.5).floor())
}

fn max(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect_at_least(1)?;
    let numbers = args.numbers()?;
    let result = numbers.into_iter().fold(f64::NEG_INFINITY, f64::max);
    finite(args, result)
}

fn min(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect_at_least(1)?;
    let numbers = args.numbers()?;
    let result = numbers.into_iter().fold(f64::INFINITY, f64::min);
    finite(args, result)
}

fn sqrt(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(1)?;
    let n = args.number(0)?;
    if n < 0.0 {
        return Err(args.error("cannot take the square root of a negative number"));
    }
    finite(args, n.sqrt())
}

fn pow(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(2)?;
    let base = args.number(0)?;
    let exponent = args.number(1)?;
    finite(args, base.powf(exponent))
}

fn log(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(1)?;
    let n = args.number(0)?;
    if n <= 0.0 {
        return Err(args.error("argument must be positive"));
    }
    finite(args, n.ln())
}

fn log10(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(1)?;
    let n = args.number(0)?;
    if n <= 0.0 {
        return Err(args.error("argument must be positive"));
    }
    finite(args, n.log10())
}

fn exp(args: &mut Args<'_>) -> FormulaResult<Value> {
    unary(args, f64::exp)
}
