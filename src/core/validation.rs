//! Authoring-time formula checks
//!
//! Nothing here executes a formula. Checks run in a fixed order and the first
//! failure wins: empty expression, self-reference, circular dependency,
//! unknown local field.

use std::collections::HashSet;

use super::dependencies::{base_names, extract_dependencies, extract_references};
use super::graph::DependencyGraph;
use super::references::Reference;
use crate::error::ValidationError;
use crate::types::ValidationResult;

/// Validate a formula on its own.
///
/// The cycle check only sees the formula being edited; related references
/// count as their entity label, so `{{Organization.Name}}` in a field called
/// `Organization` is reported as circular. Use [`FormulaValidator`] to catch
/// cycles through other formula fields.
pub fn validate<S: AsRef<str>>(
    expression: &str,
    existing_field_names: &[S],
    editing_field_name: Option<&str>,
) -> ValidationResult {
    let known: HashSet<&str> = existing_field_names.iter().map(AsRef::as_ref).collect();
    let mut graph = DependencyGraph::new();
    if let Some(editing) = editing_field_name {
        graph.insert(editing, base_names(expression));
    }
    check(expression, &known, editing_field_name, &graph)
}

/// Validation against a whole field catalogue, including the formulas of
/// other fields
#[derive(Debug, Clone, Default)]
pub struct FormulaValidator {
    known_fields: HashSet<String>,
    formulas: DependencyGraph,
}

impl FormulaValidator {
    pub fn new<I, S>(existing_field_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_fields: existing_field_names.into_iter().map(Into::into).collect(),
            formulas: DependencyGraph::new(),
        }
    }

    /// Register the saved formula of another field. The field itself becomes
    /// a known name.
    pub fn add_formula(&mut self, field: impl Into<String>, expression: &str) -> &mut Self {
        let field = field.into();
        self.formulas.insert(field.clone(), base_names(expression));
        self.known_fields.insert(field);
        self
    }

    pub fn with_formula(mut self, field: impl Into<String>, expression: &str) -> Self {
        self.add_formula(field, expression);
        self
    }

    pub fn is_known(&self, field: &str) -> bool {
        self.known_fields.contains(field)
    }

    /// Validate `expression` as the new formula of `editing_field_name`
    pub fn validate(&self, expression: &str, editing_field_name: Option<&str>) -> ValidationResult {
        let known: HashSet<&str> = self.known_fields.iter().map(String::as_str).collect();
        let mut graph = self.formulas.clone();
        if let Some(editing) = editing_field_name {
            graph.insert(editing, base_names(expression));
        }
        check(expression, &known, editing_field_name, &graph)
    }
}

fn check(
    expression: &str,
    known: &HashSet<&str>,
    editing: Option<&str>,
    graph: &DependencyGraph,
) -> ValidationResult {
    let result = match rejection(expression, known, editing, graph) {
        Ok(dependencies) => ValidationResult::valid(dependencies),
        Err(rejection) => ValidationResult::invalid(rejection),
    };
    tracing::debug!(valid = result.valid, error = ?result.error, "formula validated");
    result
}

fn rejection(
    expression: &str,
    known: &HashSet<&str>,
    editing: Option<&str>,
    graph: &DependencyGraph,
) -> Result<Vec<String>, ValidationError> {
    if expression.trim().is_empty() {
        return Err(ValidationError::EmptyExpression);
    }

    let dependencies = extract_dependencies(expression);

    if let Some(editing) = editing {
        if dependencies.iter().any(|d| d == editing) {
            return Err(ValidationError::SelfReference);
        }
        if let Some(path) = graph.find_cycle(editing) {
            return Err(ValidationError::CircularDependency { path });
        }
    }

    for reference in extract_references(expression) {
        if let Reference::Local { field } = reference {
            if Some(field.as_str()) != editing && !known.contains(field.as_str()) {
                return Err(ValidationError::UnknownField(field));
            }
        }
    }

    Ok(dependencies)
}
