use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ValidationError;

//==============================================================================
// Field Values
//==============================================================================

/// A single field value as stored on a record.
///
/// Dates travel as ISO strings (`2024-01-10` or a full timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Boolean(_) => "Boolean",
            Scalar::Number(_) => "Number",
            Scalar::Text(_) => "Text",
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Boolean(b) => write!(f, "{}", b),
            Scalar::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n as f64)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Boolean(b)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

/// Field name -> value. `None` is an explicit blank, which is not the same
/// thing as the key being absent.
pub type FieldValues = HashMap<String, Option<Scalar>>;

/// Related entity label (e.g. "Organization") -> that record's field values.
pub type RelatedEntities = HashMap<String, FieldValues>;

//==============================================================================
// Evaluation Context
//==============================================================================

/// Inputs for one evaluation, built fresh by the caller each time.
///
/// Names are matched exactly and case-sensitively; they may contain spaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    #[serde(default)]
    pub field_values: FieldValues,
    #[serde(default)]
    pub related_entities: RelatedEntities,
}

impl EvaluationContext {
    pub fn new(field_values: FieldValues) -> Self {
        Self {
            field_values,
            related_entities: RelatedEntities::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Option<Scalar>) -> Self {
        self.field_values.insert(name.into(), value);
        self
    }

    pub fn with_related(mut self, entity: impl Into<String>, values: FieldValues) -> Self {
        self.related_entities.insert(entity.into(), values);
        self
    }

    /// The related value a bare `{{name}}` reads: only when no local field
    /// has that name and exactly one related entity carries it
    pub fn related_by_name(&self, name: &str) -> Option<&Option<Scalar>> {
        if self.field_values.contains_key(name) {
            return None;
        }
        let mut owners = self
            .related_entities
            .values()
            .filter_map(|values| values.get(name));
        match (owners.next(), owners.next()) {
            (Some(value), None) => Some(value),
            _ => None,
        }
    }
}

//==============================================================================
// Formula Definitions
//==============================================================================

/// Declared result type of a formula field. Informational only; the engine
/// never coerces a result to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Number,
    Text,
    Date,
    Boolean,
    #[default]
    Any,
}

/// Formula configuration owned by a custom-field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaDefinition {
    pub expression: String,
    #[serde(default, rename = "resultType", alias = "result_type")]
    pub result_type: ResultType,
}

impl FormulaDefinition {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            result_type: ResultType::Any,
        }
    }

    pub fn with_result_type(mut self, result_type: ResultType) -> Self {
        self.result_type = result_type;
        self
    }
}

//==============================================================================
// Results
//==============================================================================

/// Outcome of evaluating one formula.
///
/// `{ value: None, error: None }` is a legitimate blank result (for example a
/// dependency was blank); a failure always carries `error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub value: Option<Scalar>,
    pub error: Option<String>,
}

impl EvaluationResult {
    pub fn value(value: Scalar) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    pub fn blank() -> Self {
        Self::default()
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            value: None,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_blank(&self) -> bool {
        self.value.is_none() && self.error.is_none()
    }
}

/// Feedback for a formula that is being authored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(skip)]
    pub rejection: Option<ValidationError>,
}

impl ValidationResult {
    pub fn valid(dependencies: Vec<String>) -> Self {
        Self {
            valid: true,
            error: None,
            dependencies: Some(dependencies),
            rejection: None,
        }
    }

    pub fn invalid(rejection: ValidationError) -> Self {
        Self {
            valid: false,
            error: Some(rejection.to_string()),
            dependencies: None,
            rejection: Some(rejection),
        }
    }
}
