//! `TEXT` namespace. Lengths and positions count characters.

use super::{Args, Builtin};
use crate::core::sandbox::evaluator::Value;
use crate::error::{FormulaError, FormulaResult};

pub(super) const FUNCTIONS: &[(&str, Builtin)] = &[
    ("upper", upper),
    ("lower", lower),
    ("trim", trim),
    ("left", left),
    ("right", right),
    ("len", len),
    ("concat", concat),
    ("replace", replace),
    ("contains", contains),
];

fn too_long(args: &Args<'_>) -> FormulaError {
    FormulaError::LimitExceeded(format!(
        "{}: text value longer than {} bytes",
        args.name(),
        args.max_text_len()
    ))
}

fn upper(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(1)?;
    Ok(Value::Text(args.text(0)?.to_uppercase()))
}

fn lower(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(1)?;
    Ok(Value::Text(args.text(0)?.to_lowercase()))
}

fn trim(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(1)?;
    Ok(Value::Text(args.text(0)?.trim().to_string()))
}

fn count(args: &mut Args<'_>, index: usize) -> FormulaResult<usize> {
    Ok(args.integer(index)?.max(0) as usize)
}

fn left(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(2)?;
    let text = args.text(0)?;
    let n = count(args, 1)?;
    Ok(Value::Text(text.chars().take(n).collect()))
}

fn right(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(2)?;
    let text = args.text(0)?;
    let n = count(args, 1)?;
    let skip = text.chars().count().saturating_sub(n);
    Ok(Value::Text(text.chars().skip(skip).collect()))
}

fn len(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(1)?;
    Ok(Value::Number(args.text(0)?.chars().count() as f64))
}

/// Blank arguments contribute nothing
fn concat(args: &mut Args<'_>) -> FormulaResult<Value> {
    let parts: Vec<String> = args.values()?.iter().map(Value::as_text).collect();
    let total: usize = parts.iter().map(String::len).sum();
    if total > args.max_text_len() {
        return Err(too_long(args));
    }
    Ok(Value::Text(parts.concat()))
}

/// Replace every occurrence of the search text
fn replace(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(3)?;
    let text = args.text(0)?;
    let search = args.text(1)?;
    let replacement = args.text(2)?;
    if search.is_empty() {
        return Err(args.error("search text must not be empty"));
    }

    let occurrences = text.matches(search.as_str()).count();
    let grown = occurrences.saturating_mul(replacement.len().saturating_sub(search.len()));
    if text.len().saturating_add(grown) > args.max_text_len() {
        return Err(too_long(args));
    }
    Ok(Value::Text(text.replace(&search, &replacement)))
}

fn contains(args: &mut Args<'_>) -> FormulaResult<Value> {
    args.expect(2)?;
    let text = args.text(0)?;
    let search = args.text(1)?;
    Ok(Value::Boolean(text.contains(&search)))
}
