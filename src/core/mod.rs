//! Formula engine core: reference resolution, dependency analysis,
//! sandboxed evaluation and authoring-time validation

pub mod dependencies;
pub mod engine;
pub mod graph;
pub mod references;
pub mod sandbox;
pub mod validation;

pub use dependencies::extract_dependencies;
pub use engine::FormulaEngine;
pub use graph::DependencyGraph;
pub use references::{resolve_references, Reference};
pub use validation::{validate, FormulaValidator};
