//! Formula evaluator
//!
//! Walks the AST against the value tables of one sandbox. Every node visit
//! is charged against the step budget, recursion against the depth budget,
//! and the wall-clock deadline is polled as steps accrue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::library::{Args, FunctionLibrary};
use super::parser::Expr;
use crate::config::SandboxLimits;
use crate::core::references::{FIELDS_TABLE, RELATED_TABLE};
use crate::error::{FormulaError, FormulaResult};
use crate::types::Scalar;

/// String-keyed value table (field name -> value)
pub type Record = HashMap<String, Value>;

/// Value type that can be returned from evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// A value table; only reachable through `fields` / `related`
    Record(Arc<Record>),
    /// Blank (`null`, `undefined`, or a missing field)
    Null,
}

impl Value {
    /// Numeric view of the value. Numeric text converts; blank does not.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    trimmed.parse().ok()
                }
            }
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Record(_) | Value::Null => None,
        }
    }

    /// Text view of the value, as used for concatenation
    pub fn as_text(&self) -> String {
        match self {
            Value::Number(n) => Scalar::Number(*n).to_string(),
            Value::Text(s) => s.clone(),
            Value::Boolean(b) => b.to_string(),
            Value::Record(_) => "[record]".to_string(),
            Value::Null => String::new(),
        }
    }

    /// `false`, blank, `0`, NaN and `""` are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Record(_) => true,
            Value::Null => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::Text(_) => "Text",
            Value::Boolean(_) => "Boolean",
            Value::Record(_) => "Record",
            Value::Null => "null",
        }
    }

    /// Convert a final result for the caller; records never leave the sandbox
    pub fn into_scalar(self) -> FormulaResult<Option<Scalar>> {
        match self {
            Value::Number(n) if !n.is_finite() => Err(FormulaError::Runtime(
                "Result is not a finite number".to_string(),
            )),
            Value::Number(n) => Ok(Some(Scalar::Number(n))),
            Value::Text(s) => Ok(Some(Scalar::Text(s))),
            Value::Boolean(b) => Ok(Some(Scalar::Boolean(b))),
            Value::Null => Ok(None),
            Value::Record(_) => Err(FormulaError::Runtime(
                "Formula must produce a single value, not a record".to_string(),
            )),
        }
    }
}

impl From<&Scalar> for Value {
    fn from(scalar: &Scalar) -> Self {
        match scalar {
            Scalar::Number(n) => Value::Number(*n),
            Scalar::Text(s) => Value::Text(s.clone()),
            Scalar::Boolean(b) => Value::Boolean(*b),
        }
    }
}

impl From<Option<&Scalar>> for Value {
    fn from(scalar: Option<&Scalar>) -> Self {
        scalar.map(Value::from).unwrap_or(Value::Null)
    }
}

/// Steps between wall-clock checks
const DEADLINE_CHECK_INTERVAL: usize = 64;

/// Tree-walking interpreter bound to one sandbox's tables
pub struct Interpreter {
    fields: Value,
    related: Value,
    library: &'static FunctionLibrary,
    limits: SandboxLimits,
    deadline: Instant,
    steps: usize,
    depth: usize,
}

impl Interpreter {
    pub fn new(
        fields: Arc<Record>,
        related: Arc<Record>,
        library: &'static FunctionLibrary,
        limits: SandboxLimits,
    ) -> Self {
        Self {
            fields: Value::Record(fields),
            related: Value::Record(related),
            library,
            limits,
            deadline: Instant::now() + limits.timeout(),
            steps: 0,
            depth: 0,
        }
    }

    /// Stop at `deadline` instead of `timeout_ms` from now
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Evaluate an expression, charging the budgets
    pub fn evaluate(&mut self, expr: &Expr) -> FormulaResult<Value> {
        self.charge()?;
        self.depth += 1;
        if self.depth > self.limits.max_depth {
            self.depth -= 1;
            return Err(FormulaError::LimitExceeded(format!(
                "evaluation nested deeper than {} levels",
                self.limits.max_depth
            )));
        }
        let result = self.evaluate_node(expr).and_then(|v| self.check_size(v));
        self.depth -= 1;
        result
    }

    fn charge(&mut self) -> FormulaResult<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(FormulaError::LimitExceeded(format!(
                "more than {} evaluation steps",
                self.limits.max_steps
            )));
        }
        if (self.steps == 1 || self.steps % DEADLINE_CHECK_INTERVAL == 0)
            && Instant::now() > self.deadline
        {
            return Err(FormulaError::LimitExceeded(format!(
                "evaluation took longer than {}ms",
                self.limits.timeout_ms
            )));
        }
        Ok(())
    }

    fn check_size(&self, value: Value) -> FormulaResult<Value> {
        match &value {
            Value::Text(s) if s.len() > self.limits.max_text_len => {
                Err(FormulaError::LimitExceeded(format!(
                    "text value longer than {} bytes",
                    self.limits.max_text_len
                )))
            }
            _ => Ok(value),
        }
    }

    fn evaluate_node(&mut self, expr: &Expr) -> FormulaResult<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Text(s) => Ok(Value::Text(s.clone())),
            Expr::Boolean(b) => Ok(Value::Boolean(*b)),
            Expr::Null => Ok(Value::Null),

            Expr::Identifier(name) => self.evaluate_identifier(name),

            Expr::Index { target, key } => {
                let target = self.evaluate(target)?;
                let key = self.evaluate(key)?;
                index(&target, &key)
            }

            Expr::FunctionCall { name, args } => self.evaluate_function(name, args),

            Expr::BinaryOp { .. } => self.evaluate_chain(expr),

            Expr::UnaryOp { op, operand } => {
                let val = self.evaluate(operand)?;
                evaluate_unary_op(op, &val)
            }

            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.evaluate(then)
                } else {
                    self.evaluate(otherwise)
                }
            }
        }
    }

    /// Left-nested operator chains (`a + b + c ...`) are one nesting level,
    /// so they are walked in a loop rather than by recursion.
    fn evaluate_chain(&mut self, expr: &Expr) -> FormulaResult<Value> {
        let mut spine = Vec::new();
        let mut node = expr;
        while let Expr::BinaryOp { op, left, right } = node {
            spine.push((op.as_str(), right.as_ref()));
            node = left;
        }

        let mut acc = self.evaluate(node)?;
        for (i, (op, right)) in spine.into_iter().enumerate().rev() {
            // The outermost node was charged on entry
            if i > 0 {
                self.charge()?;
            }
            acc = match op {
                "&&" if !acc.is_truthy() => Value::Boolean(false),
                "||" if acc.is_truthy() => Value::Boolean(true),
                "&&" | "||" => Value::Boolean(self.evaluate(right)?.is_truthy()),
                _ => {
                    let r = self.evaluate(right)?;
                    self.check_size(evaluate_binary_op(op, &acc, &r)?)?
                }
            };
        }
        Ok(acc)
    }

    fn evaluate_identifier(&self, name: &str) -> FormulaResult<Value> {
        match name {
            FIELDS_TABLE => Ok(self.fields.clone()),
            RELATED_TABLE => Ok(self.related.clone()),
            _ => Err(FormulaError::Runtime(format!("{} is not defined", name))),
        }
    }

    fn evaluate_function(&mut self, name: &str, args: &[Expr]) -> FormulaResult<Value> {
        let function = self
            .library
            .lookup(name)
            .ok_or_else(|| FormulaError::Runtime(format!("{} is not a function", name)))?;
        function(&mut Args::new(name, args, self))
    }
}

/// `table[key]`; a missing key or a blank table reads as blank
fn index(target: &Value, key: &Value) -> FormulaResult<Value> {
    match target {
        Value::Record(record) => Ok(record.get(&key.as_text()).cloned().unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        other => Err(FormulaError::Runtime(format!(
            "Cannot look up '{}' in a {} value",
            key.as_text(),
            other.type_name()
        ))),
    }
}

fn operand(value: &Value, side: &str, op: &str) -> FormulaResult<f64> {
    value.as_number().ok_or_else(|| {
        FormulaError::Runtime(format!(
            "{} operand of '{}' must be a number, got {}",
            side,
            op,
            value.type_name()
        ))
    })
}

fn finite(n: f64, op: &str) -> FormulaResult<Value> {
    if n.is_finite() {
        Ok(Value::Number(n))
    } else {
        Err(FormulaError::Runtime(format!(
            "'{}' produced a non-finite number",
            op
        )))
    }
}

/// Evaluate a binary operation
fn evaluate_binary_op(op: &str, left: &Value, right: &Value) -> FormulaResult<Value> {
    match op {
        "==" => return Ok(Value::Boolean(values_equal(left, right))),
        "!=" => return Ok(Value::Boolean(!values_equal(left, right))),
        "<" | ">" | "<=" | ">=" => return compare(op, left, right),
        _ => {}
    }

    // Blank in, blank out
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    if op == "+" && (matches!(left, Value::Text(_)) || matches!(right, Value::Text(_))) {
        return Ok(Value::Text(format!("{}{}", left.as_text(), right.as_text())));
    }

    let l = operand(left, "Left", op)?;
    let r = operand(right, "Right", op)?;

    match op {
        "+" => finite(l + r, op),
        "-" => finite(l - r, op),
        "*" => finite(l * r, op),
        "/" => {
            if r == 0.0 {
                Err(FormulaError::Runtime("Division by zero".to_string()))
            } else {
                finite(l / r, op)
            }
        }
        "%" => {
            if r == 0.0 {
                Err(FormulaError::Runtime("Modulo by zero".to_string()))
            } else {
                finite(l % r, op)
            }
        }
        "^" => finite(l.powf(r), op),
        _ => Err(FormulaError::Runtime(format!("Unknown operator: {}", op))),
    }
}

/// Check if two values are equal. Numbers compare with numeric text.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => (l - r).abs() < 1e-10,
        (Value::Number(_), Value::Text(_)) | (Value::Text(_), Value::Number(_)) => {
            match (left.as_number(), right.as_number()) {
                (Some(l), Some(r)) => (l - r).abs() < 1e-10,
                _ => false,
            }
        }
        (Value::Text(l), Value::Text(r)) => l == r,
        (Value::Boolean(l), Value::Boolean(r)) => l == r,
        (Value::Null, Value::Null) => true,
        (Value::Record(l), Value::Record(r)) => Arc::ptr_eq(l, r),
        _ => false,
    }
}

/// Ordering comparisons: numeric when both sides are numeric, lexical for
/// two texts, always false against a blank
fn compare(op: &str, left: &Value, right: &Value) -> FormulaResult<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Boolean(false));
    }

    let ordering = match (left, right) {
        (Value::Text(l), Value::Text(r)) => l.partial_cmp(r),
        _ => {
            let l = operand(left, "Left", op)?;
            let r = operand(right, "Right", op)?;
            l.partial_cmp(&r)
        }
    };

    let Some(ordering) = ordering else {
        return Ok(Value::Boolean(false));
    };

    Ok(Value::Boolean(match op {
        "<" => ordering.is_lt(),
        ">" => ordering.is_gt(),
        "<=" => ordering.is_le(),
        _ => ordering.is_ge(),
    }))
}

/// Evaluate a unary operation
fn evaluate_unary_op(op: &str, operand: &Value) -> FormulaResult<Value> {
    match op {
        "!" => Ok(Value::Boolean(!operand.is_truthy())),
        _ if operand.is_null() => Ok(Value::Null),
        "-" | "+" => {
            let n = operand.as_number().ok_or_else(|| {
                FormulaError::Runtime(format!(
                    "Operand of unary '{}' must be a number, got {}",
                    op,
                    operand.type_name()
                ))
            })?;
            Ok(Value::Number(if op == "-" { -n } else { n }))
        }
        _ => Err(FormulaError::Runtime(format!(
            "Unknown unary operator: {}",
            op
        ))),
    }
}
