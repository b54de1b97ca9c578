//! Standard function library
//!
//! Four fixed namespaces (`MATH`, `TEXT`, `DATE`, `LOGIC`) of pure
//! functions. The library is built once per process and shared read-only by
//! every sandbox.
//!
//! Builtins receive their arguments unevaluated through [`Args`], so
//! `LOGIC.if`, `LOGIC.and` and `LOGIC.or` only evaluate what they need.

mod dates;
mod logic;
mod math;
mod text;

use std::collections::HashMap;
use std::sync::LazyLock;

use super::evaluator::{Interpreter, Value};
use super::parser::Expr;
use crate::error::{FormulaError, FormulaResult};

/// Signature of every library function
pub type Builtin = fn(&mut Args<'_>) -> FormulaResult<Value>;

/// Namespaces in the order they are registered
pub const NAMESPACES: [&str; 4] = ["MATH", "TEXT", "DATE", "LOGIC"];

static STANDARD: LazyLock<Result<FunctionLibrary, String>> = LazyLock::new(FunctionLibrary::build);

/// Qualified name (`MATH.round`) -> implementation
pub struct FunctionLibrary {
    functions: HashMap<String, Builtin>,
}

impl std::fmt::Debug for FunctionLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionLibrary")
            .field("functions", &self.function_names())
            .finish()
    }
}

impl FunctionLibrary {
    /// The shared standard library
    pub fn standard() -> FormulaResult<&'static FunctionLibrary> {
        STANDARD
            .as_ref()
            .map_err(|e| FormulaError::SandboxInit(e.clone()))
    }

    fn build() -> Result<Self, String> {
        let tables: [(&str, &[(&str, Builtin)]); 4] = [
            (NAMESPACES[0], math::FUNCTIONS),
            (NAMESPACES[1], text::FUNCTIONS),
            (NAMESPACES[2], dates::FUNCTIONS),
            (NAMESPACES[3], logic::FUNCTIONS),
        ];

        let mut functions = HashMap::new();
        for (namespace, entries) in tables {
            for (name, function) in entries {
                let qualified = format!("{}.{}", namespace, name);
                if functions.insert(qualified.clone(), *function).is_some() {
                    return Err(format!("duplicate library function {}", qualified));
                }
            }
        }

        tracing::debug!(functions = functions.len(), "function library loaded");
        Ok(Self { functions })
    }

    /// Exact, case-sensitive lookup by qualified name
    pub fn lookup(&self, qualified_name: &str) -> Option<Builtin> {
        self.functions.get(qualified_name).copied()
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.functions.contains_key(qualified_name)
    }

    /// Qualified names, sorted
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Lazily evaluated call arguments
pub struct Args<'a> {
    name: &'a str,
    exprs: &'a [Expr],
    interpreter: &'a mut Interpreter,
}

impl<'a> Args<'a> {
    pub fn new(name: &'a str, exprs: &'a [Expr], interpreter: &'a mut Interpreter) -> Self {
        Self {
            name,
            exprs,
            interpreter,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn max_text_len(&self) -> usize {
        self.interpreter.limits().max_text_len
    }

    /// A runtime error prefixed with the function name
    pub fn error(&self, message: impl std::fmt::Display) -> FormulaError {
        FormulaError::Runtime(format!("{}: {}", self.name, message))
    }

    pub fn expect(&self, count: usize) -> FormulaResult<()> {
        if self.len() != count {
            return Err(self.error(format!(
                "expects {} argument(s), got {}",
                count,
                self.len()
            )));
        }
        Ok(())
    }

    pub fn expect_range(&self, min: usize, max: usize) -> FormulaResult<()> {
        if self.len() < min || self.len() > max {
            return Err(self.error(format!(
                "expects {}-{} arguments, got {}",
                min,
                max,
                self.len()
            )));
        }
        Ok(())
    }

    pub fn expect_at_least(&self, min: usize) -> FormulaResult<()> {
        if self.len() < min {
            return Err(self.error(format!(
                "expects at least {} argument(s), got {}",
                min,
                self.len()
            )));
        }
        Ok(())
    }

    /// Evaluate argument `index`
    pub fn value(&mut self, index: usize) -> FormulaResult<Value> {
        let exprs = self.exprs;
        let expr = exprs
            .get(index)
            .ok_or_else(|| self.error(format!("missing argument {}", index + 1)))?;
        self.interpreter.evaluate(expr)
    }

    pub fn number(&mut self, index: usize) -> FormulaResult<f64> {
        let value = self.value(index)?;
        value.as_number().ok_or_else(|| {
            self.error(format!(
                "argument {} must be a number, got {}",
                index + 1,
                value.type_name()
            ))
        })
    }

    /// Whole number argument; fractions are truncated
    pub fn integer(&mut self, index: usize) -> FormulaResult<i64> {
        let n = self.number(index)?;
        if !n.is_finite() || n.abs() > i64::MAX as f64 {
            return Err(self.error(format!("argument {} is out of range", index + 1)));
        }
        Ok(n.trunc() as i64)
    }

    /// Text view of a scalar argument; blank and records are rejected
    pub fn text(&mut self, index: usize) -> FormulaResult<String> {
        match self.value(index)? {
            value @ (Value::Null | Value::Record(_)) => Err(self.error(format!(
                "argument {} must be text, got {}",
                index + 1,
                value.type_name()
            ))),
            value => Ok(value.as_text()),
        }
    }

    pub fn values(&mut self) -> FormulaResult<Vec<Value>> {
        (0..self.len()).map(|i| self.value(i)).collect()
    }

    pub fn numbers(&mut self) -> FormulaResult<Vec<f64>> {
        (0..self.len()).map(|i| self.number(i)).collect()
    }
}

/// Reject NaN and infinities produced inside a builtin
fn finite(args: &Args<'_>, n: f64) -> FormulaResult<Value> {
    if n.is_finite() {
        Ok(Value::Number(n))
    } else {
        Err(args.error("result is not a finite number"))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_library_loads_every_namespace() {
        let library = FunctionLibrary::standard().unwrap();
        for namespace in NAMESPACES {
            assert!(
                library
                    .function_names()
                    .iter()
                    .any(|n| n.starts_with(&format!("{}.", namespace))),
                "namespace {} is empty",
                namespace
            );
        }
        assert!(library.contains("MATH.round"));
        assert!(library.contains("DATE.diffDays"));
        assert!(!library.contains("math.round"));
    }

    #[test]
    fn test_library_is_shared() {
        let a = FunctionLibrary::standard().unwrap() as *const FunctionLibrary;
        let b = FunctionLibrary::standard().unwrap() as *const FunctionLibrary;
        assert_eq!(a, b);
    }
}
