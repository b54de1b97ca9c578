//! CLI command handlers

pub mod commands;

pub use commands::{deps, eval, order, validate, FormulaFile};
