//! Dependency extraction
//!
//! A purely lexical scan over the formula text. Nothing here parses or
//! evaluates the surrounding expression.

use super::references::{placeholders, Reference};

/// Referenced field names in source order, duplicates included.
/// Related references are returned whole (`"Organization.Revenue"`).
pub fn extract_dependencies(expression: &str) -> Vec<String> {
    placeholders(expression).map(str::to_string).collect()
}

/// Same scan as [`extract_dependencies`], parsed into [`Reference`]s
pub fn extract_references(expression: &str) -> Vec<Reference> {
    placeholders(expression).map(Reference::parse).collect()
}

/// Dependencies reduced to the names used for cycle checks: related
/// references collapse to their entity label. First occurrence wins.
pub fn base_names(expression: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for reference in extract_references(expression) {
        let base = reference.base_name();
        if !names.iter().any(|n| n == base) {
            names.push(base.to_string());
        }
    }
    names
}

/// Order-preserving dedupe for callers that need a set
pub fn unique(dependencies: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    dependencies
        .iter()
        .filter(|d| seen.insert(d.as_str()))
        .cloned()
        .collect()
}
