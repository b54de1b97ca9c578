//! Fieldcalc - formula engine for computed custom fields
//!
//! Formulas reference other fields with `{{Field Name}}` and fields of related
//! records with `{{Entity.Field Name}}`, and call a small fixed library
//! (`MATH`, `TEXT`, `DATE`, `LOGIC`). Each evaluation runs in its own
//! sandbox with no access to the host and always resolves to a value or an
//! error message.
//!
//! # Example
//!
//! ```no_run
//! use fieldcalc::core::FormulaEngine;
//! use fieldcalc::types::{FieldValues, Scalar};
//!
//! # async fn run() {
//! let mut values = FieldValues::new();
//! values.insert("Score".to_string(), Some(Scalar::from(150.0)));
//!
//! let engine = FormulaEngine::new();
//! let result = engine
//!     .evaluate(r#"LOGIC.if({{Score}} > 100, "High", "Low")"#, &values, None)
//!     .await;
//! assert_eq!(result.value, Some(Scalar::from("High")));
//! # }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{EngineConfig, SandboxLimits};
pub use core::{extract_dependencies, validate, DependencyGraph, FormulaEngine, FormulaValidator};
pub use error::{FormulaError, FormulaResult, ValidationError};
pub use types::{
    EvaluationContext, EvaluationResult, FieldValues, FormulaDefinition, RelatedEntities,
    ResultType, Scalar, ValidationResult,
};
