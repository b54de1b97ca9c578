//! Isolated formula execution
//!
//! A [`Sandbox`] owns everything one evaluation can see: the shared read-only
//! function library and its own copy of the value tables. The expression
//! language has no names bound to the filesystem, network, environment or
//! process, so nothing outside those tables is reachable. A sandbox is built
//! per evaluation and dropped when the evaluation ends.

pub mod evaluator;
pub mod library;
pub mod parser;
pub mod tokenizer;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use evaluator::{Interpreter, Record, Value};
use library::FunctionLibrary;

use crate::config::SandboxLimits;
use crate::core::references::resolve_references;
use crate::error::{FormulaError, FormulaResult};
use crate::types::{EvaluationContext, FieldValues, Scalar};

static NEXT_SANDBOX_ID: AtomicU64 = AtomicU64::new(1);

/// One disposable execution context
#[derive(Debug)]
pub struct Sandbox {
    id: u64,
    library: &'static FunctionLibrary,
    limits: SandboxLimits,
    fields: Arc<Record>,
    related: Arc<Record>,
}

impl Sandbox {
    /// Create an empty sandbox with the standard library loaded
    pub fn create(limits: SandboxLimits) -> FormulaResult<Self> {
        let library = FunctionLibrary::standard()?;
        let id = NEXT_SANDBOX_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(sandbox = id, functions = library.len(), "sandbox created");
        Ok(Self {
            id,
            library,
            limits,
            fields: Arc::new(Record::new()),
            related: Arc::new(Record::new()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Copy the caller's values into the sandbox tables.
    ///
    /// `fields` holds the local values plus every related field whose name is
    /// neither a local field nor present on more than one related entity.
    /// `related` holds one table per entity label.
    pub fn load_values(&mut self, context: &EvaluationContext) -> FormulaResult<()> {
        let mut fields = to_record(&context.field_values)?;

        let mut related = Record::new();
        for (entity, values) in &context.related_entities {
            let record = to_record(values)?;
            for (name, value) in &record {
                if context.related_by_name(name).is_some() {
                    fields.insert(name.clone(), value.clone());
                }
            }
            related.insert(entity.clone(), Value::Record(Arc::new(record)));
        }

        tracing::trace!(
            sandbox = self.id,
            fields = fields.len(),
            entities = related.len(),
            "values loaded"
        );
        self.fields = Arc::new(fields);
        self.related = Arc::new(related);
        Ok(())
    }

    /// Rewrite references, parse and execute `expression`
    pub fn run(&self, expression: &str) -> FormulaResult<Option<Scalar>> {
        self.run_until(expression, Instant::now() + self.limits.timeout())
    }

    /// [`run`](Self::run) against a deadline fixed by the caller, so time
    /// spent waiting for a worker counts against the budget
    pub fn run_until(
        &self,
        expression: &str,
        deadline: Instant,
    ) -> FormulaResult<Option<Scalar>> {
        if Instant::now() >= deadline {
            return Err(FormulaError::LimitExceeded(format!(
                "evaluation took longer than {}ms",
                self.limits.timeout_ms
            )));
        }

        let rewritten = resolve_references(expression);
        tracing::trace!(sandbox = self.id, rewritten = %rewritten, "references resolved");

        if rewritten.len() > self.limits.max_expression_len {
            return Err(FormulaError::LimitExceeded(format!(
                "expression longer than {} bytes",
                self.limits.max_expression_len
            )));
        }

        let tokens =
            tokenizer::tokenize(&rewritten).map_err(|e| FormulaError::Syntax(e.to_string()))?;
        let ast = parser::parse(tokens, self.limits.max_depth)
            .map_err(|e| FormulaError::Syntax(e.to_string()))?;

        let mut interpreter = Interpreter::new(
            Arc::clone(&self.fields),
            Arc::clone(&self.related),
            self.library,
            self.limits,
        )
        .with_deadline(deadline);
        let result = interpreter.evaluate(&ast);
        tracing::debug!(
            sandbox = self.id,
            steps = interpreter.steps(),
            ok = result.is_ok(),
            "expression executed"
        );
        result?.into_scalar()
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        tracing::debug!(sandbox = self.id, "sandbox torn down");
    }
}

fn to_record(values: &FieldValues) -> FormulaResult<Record> {
    let mut record = Record::with_capacity(values.len());
    for (name, value) in values {
        if let Some(Scalar::Number(n)) = value {
            if !n.is_finite() {
                tracing::warn!(field = %name, "rejected non-finite input value");
                return Err(FormulaError::SandboxInit(format!(
                    "field '{}' holds a non-finite number",
                    name
                )));
            }
        }
        record.insert(name.clone(), Value::from(value.as_ref()));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(expression: &str, context: &EvaluationContext) -> FormulaResult<Option<Scalar>> {
        let mut sandbox = Sandbox::create(SandboxLimits::default())?;
        sandbox.load_values(context)?;
        sandbox.run(expression)
    }

    fn related(pairs: &[(&str, Scalar)]) -> FieldValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Some(v.clone())))
            .collect()
    }

    #[test]
    fn test_local_and_related_references() {
        let context = EvaluationContext::default()
            .with_field("Deal Value", Some(Scalar::from(200.0)))
            .with_related("Organization", related(&[("Revenue", Scalar::from(1000.0))]));

        assert_eq!(
            run("{{Deal Value}} / {{Organization.Revenue}}", &context).unwrap(),
            Some(Scalar::Number(0.2))
        );
    }

    #[test]
    fn test_unambiguous_related_field_is_visible_by_name() {
        let context = EvaluationContext::default()
            .with_related("Organization", related(&[("Revenue", Scalar::from(1000.0))]));
        assert_eq!(
            run("{{Revenue}}", &context).unwrap(),
            Some(Scalar::Number(1000.0))
        );
    }

    #[test]
    fn test_local_field_shadows_related_field() {
        let context = EvaluationContext::default()
            .with_field("Name", Some(Scalar::from("Deal")))
            .with_related("Organization", related(&[("Name", Scalar::from("Acme"))]));
        assert_eq!(
            run("{{Name}}", &context).unwrap(),
            Some(Scalar::from("Deal"))
        );
        assert_eq!(
            run("{{Organization.Name}}", &context).unwrap(),
            Some(Scalar::from("Acme"))
        );
    }

    #[test]
    fn test_ambiguous_related_field_is_not_flattened() {
        let context = EvaluationContext::default()
            .with_related("Organization", related(&[("Name", Scalar::from("Acme"))]))
            .with_related("Person", related(&[("Name", Scalar::from("Ada"))]));
        assert_eq!(run("{{Name}}", &context).unwrap(), None);
    }

    #[test]
    fn test_non_finite_input_fails_initialisation() {
        let context = EvaluationContext::default().with_field("X", Some(Scalar::Number(f64::NAN)));
        let err = run("{{X}}", &context).unwrap_err();
        assert!(matches!(err, FormulaError::SandboxInit(_)));
        assert_eq!(err.to_string(), "Failed to initialize formula sandbox");
    }

    #[test]
    fn test_syntax_error() {
        let err = run("(1 + 2", &EvaluationContext::default()).unwrap_err();
        assert!(matches!(err, FormulaError::Syntax(_)));
    }

    #[test]
    fn test_expression_length_limit() {
        let mut sandbox = Sandbox::create(SandboxLimits {
            max_expression_len: 8,
            ..SandboxLimits::default()
        })
        .unwrap();
        sandbox.load_values(&EvaluationContext::default()).unwrap();
        let err = sandbox.run("1 + 2 + 3 + 4").unwrap_err();
        assert!(matches!(err, FormulaError::LimitExceeded(_)));
    }

    #[test]
    fn test_expired_deadline_never_executes() {
        let sandbox = Sandbox::create(SandboxLimits::default()).unwrap();
        let err = sandbox.run_until("1 + 1", Instant::now()).unwrap_err();
        assert!(matches!(err, FormulaError::LimitExceeded(_)));
    }

    #[test]
    fn test_sandboxes_are_distinct() {
        let a = Sandbox::create(SandboxLimits::default()).unwrap();
        let b = Sandbox::create(SandboxLimits::default()).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
