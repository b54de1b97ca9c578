//! Formula evaluation entry point
//!
//! [`FormulaEngine::evaluate`] never fails: every problem comes back as the
//! `error` of an [`EvaluationResult`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::dependencies::extract_references;
use super::graph::DependencyGraph;
use super::references::Reference;
use super::sandbox::Sandbox;
use crate::config::{EngineConfig, SandboxLimits};
use crate::error::{FormulaError, FormulaResult};
use crate::types::{
    EvaluationContext, EvaluationResult, FieldValues, FormulaDefinition, RelatedEntities, Scalar,
};

/// Slack on top of the sandbox's own deadline before the caller gives up on it
const TIMEOUT_GRACE: Duration = Duration::from_millis(100);

/// Stateless evaluator; cheap to clone and safe to share between tasks
#[derive(Debug, Clone, Default)]
pub struct FormulaEngine {
    config: EngineConfig,
}

impl FormulaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate `expression` against the given values.
    ///
    /// The sandbox runs on tokio's blocking pool, bounded by the configured
    /// timeout.
    pub async fn evaluate(
        &self,
        expression: &str,
        field_values: &FieldValues,
        related_entities: Option<&RelatedEntities>,
    ) -> EvaluationResult {
        let context = EvaluationContext {
            field_values: field_values.clone(),
            related_entities: related_entities.cloned().unwrap_or_default(),
        };
        self.evaluate_context(expression, &context).await
    }

    /// [`evaluate`](Self::evaluate) with a prebuilt context
    pub async fn evaluate_context(
        &self,
        expression: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult {
        if let Some(field) = null_dependency(expression, context) {
            tracing::debug!(field = %field, "blank dependency, skipping evaluation");
            return EvaluationResult::blank();
        }

        let limits = self.config.limits;
        let sandbox = match prepare(limits, context) {
            Ok(sandbox) => sandbox,
            Err(err) => return failure(err),
        };

        let expression = expression.to_string();
        let deadline = Instant::now() + limits.timeout();
        let mut task =
            tokio::task::spawn_blocking(move || sandbox.run_until(&expression, deadline));

        match tokio::time::timeout(limits.timeout() + TIMEOUT_GRACE, &mut task).await {
            Ok(Ok(outcome)) => finish(outcome),
            Ok(Err(join_error)) => {
                tracing::error!(error = %join_error, "evaluation task failed");
                failure(FormulaError::Runtime("evaluation aborted".to_string()))
            }
            Err(_) => {
                // Cancels the task if it never got a worker; a running one
                // stops at its deadline
                task.abort();
                tracing::warn!(timeout_ms = limits.timeout_ms, "evaluation timed out");
                failure(FormulaError::LimitExceeded(format!(
                    "evaluation took longer than {}ms",
                    limits.timeout_ms
                )))
            }
        }
    }

    /// Evaluate on the current thread. The interpreter's own deadline still
    /// applies.
    pub fn evaluate_sync(&self, expression: &str, context: &EvaluationContext) -> EvaluationResult {
        if null_dependency(expression, context).is_some() {
            return EvaluationResult::blank();
        }
        let outcome =
            prepare(self.config.limits, context).and_then(|sandbox| sandbox.run(expression));
        finish(outcome)
    }

    /// Evaluate every formula field of one record in dependency order.
    ///
    /// Each computed value is visible to the formulas evaluated after it. A
    /// field that is on, or depends on, a cycle is reported as an error and
    /// never evaluated.
    pub async fn evaluate_all(
        &self,
        definitions: &BTreeMap<String, FormulaDefinition>,
        context: &EvaluationContext,
    ) -> BTreeMap<String, EvaluationResult> {
        let graph = DependencyGraph::from_formulas(
            definitions
                .iter()
                .map(|(name, definition)| (name.as_str(), definition.expression.as_str())),
        );

        let mut results = BTreeMap::new();
        let mut acyclic = DependencyGraph::new();
        for name in definitions.keys() {
            match graph.find_cycle(name) {
                Some(path) => {
                    let err = FormulaError::CircularDependency(path.join(" -> "));
                    results.insert(name.clone(), EvaluationResult::failure(err.to_string()));
                }
                None => {
                    acyclic.insert(name.as_str(), graph.dependencies_of(name).to_vec());
                }
            }
        }

        let order = match acyclic.calculation_order() {
            Ok(order) => order,
            Err(err) => {
                for name in definitions.keys() {
                    results
                        .entry(name.clone())
                        .or_insert_with(|| EvaluationResult::failure(err.to_string()));
                }
                return results;
            }
        };
        tracing::debug!(fields = order.len(), "evaluating formulas in dependency order");

        let mut context = context.clone();
        for name in order {
            let Some(definition) = definitions.get(&name) else {
                continue;
            };
            let result = self
                .evaluate_context(&definition.expression, &context)
                .await;
            context
                .field_values
                .insert(name.clone(), result.value.clone());
            results.insert(name, result);
        }
        results
    }
}

/// First dependency that the caller supplied as an explicit blank
fn null_dependency(expression: &str, context: &EvaluationContext) -> Option<Reference> {
    extract_references(expression)
        .into_iter()
        .find(|reference| match reference {
            Reference::Local { field } => matches!(
                context
                    .field_values
                    .get(field)
                    .or_else(|| context.related_by_name(field)),
                Some(None)
            ),
            Reference::Related { entity, field } => matches!(
                context
                    .related_entities
                    .get(entity)
                    .and_then(|values| values.get(field)),
                Some(None)
            ),
        })
}

fn prepare(limits: SandboxLimits, context: &EvaluationContext) -> FormulaResult<Sandbox> {
    let mut sandbox = Sandbox::create(limits)?;
    sandbox.load_values(context)?;
    Ok(sandbox)
}

fn finish(outcome: FormulaResult<Option<Scalar>>) -> EvaluationResult {
    match outcome {
        Ok(Some(value)) => EvaluationResult::value(value),
        Ok(None) => EvaluationResult::blank(),
        Err(err) => failure(err),
    }
}

fn failure(err: FormulaError) -> EvaluationResult {
    match &err {
        FormulaError::SandboxInit(detail) => {
            tracing::error!(detail = %detail, "sandbox initialisation failed")
        }
        FormulaError::LimitExceeded(detail) => tracing::warn!(detail = %detail, "limit exceeded"),
        other => tracing::debug!(error = %other, "evaluation failed"),
    }
    EvaluationResult::failure(err.to_string())
}
