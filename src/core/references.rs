//! Field placeholder syntax
//!
//! `{{Field Name}}` refers to a field of the record being evaluated and
//! `{{Entity.Field Name}}` to a field of a related record. Rewriting turns
//! each placeholder into an index expression against the sandbox value
//! tables, e.g. `{{Organization.Revenue}}` becomes
//! `related["Organization"]["Revenue"]`.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Identifier bound to the local field table inside the sandbox
pub const FIELDS_TABLE: &str = "fields";
/// Identifier bound to the related-entity tables inside the sandbox
pub const RELATED_TABLE: &str = "related";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("placeholder pattern is valid"));

/// A parsed `{{...}}` placeholder
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    Local { field: String },
    Related { entity: String, field: String },
}

impl Reference {
    /// Parse the text between the braces. Everything before the first `.`
    /// is the entity label; both parts are trimmed.
    pub fn parse(inner: &str) -> Self {
        match inner.split_once('.') {
            Some((entity, field)) => Reference::Related {
                entity: entity.trim().to_string(),
                field: field.trim().to_string(),
            },
            None => Reference::Local {
                field: inner.trim().to_string(),
            },
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Reference::Local { field } | Reference::Related { field, .. } => field,
        }
    }

    /// Name used for structural cycle checks: the field itself for local
    /// references, the entity label for related ones.
    pub fn base_name(&self) -> &str {
        match self {
            Reference::Local { field } => field,
            Reference::Related { entity, .. } => entity,
        }
    }

    pub fn is_related(&self) -> bool {
        matches!(self, Reference::Related { .. })
    }

    /// Index expression that reads this reference from the value tables
    pub fn to_lookup(&self) -> String {
        match self {
            Reference::Local { field } => format!("{}[{}]", FIELDS_TABLE, quote(field)),
            Reference::Related { entity, field } => {
                format!("{}[{}][{}]", RELATED_TABLE, quote(entity), quote(field))
            }
        }
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reference::Local { field } => f.write_str(field),
            Reference::Related { entity, field } => write!(f, "{}.{}", entity, field),
        }
    }
}

/// Trimmed inner text of every placeholder, left to right
pub fn placeholders(expression: &str) -> impl Iterator<Item = &str> {
    PLACEHOLDER
        .captures_iter(expression)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Rewrite every placeholder into a value-table lookup. Text outside the
/// placeholders is left untouched, so malformed braces survive and fail
/// later in the parser.
pub fn resolve_references(expression: &str) -> String {
    PLACEHOLDER
        .replace_all(expression, |caps: &Captures<'_>| {
            Reference::parse(&caps[1]).to_lookup()
        })
        .into_owned()
}

/// String literal in formula syntax; embedded quotes are doubled.
fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_local_reference() {
        assert_eq!(
            Reference::parse("  Deal Value "),
            Reference::Local {
                field: "Deal Value".to_string()
            }
        );
    }

    #[test]
    fn test_parse_related_reference_splits_on_first_dot() {
        let reference = Reference::parse(" Organization . Revenue.2024 ");
        assert_eq!(
            reference,
            Reference::Related {
                entity: "Organization".to_string(),
                field: "Revenue.2024".to_string(),
            }
        );
        assert_eq!(reference.base_name(), "Organization");
        assert_eq!(reference.to_string(), "Organization.Revenue.2024");
    }

    #[test]
    fn test_resolve_local_and_related() {
        let rewritten = resolve_references("{{Amount}} * {{ Organization.Discount }}");
        assert_eq!(
            rewritten,
            r#"fields["Amount"] * related["Organization"]["Discount"]"#
        );
    }

    #[test]
    fn test_resolve_escapes_quotes() {
        let rewritten = resolve_references(r#"{{The "Big" One}}"#);
        assert_eq!(rewritten, r#"fields["The ""Big"" One"]"#);
    }

    #[test]
    fn test_resolve_leaves_malformed_braces() {
        assert_eq!(resolve_references("{{Amount} + 1"), "{{Amount} + 1");
        assert_eq!(resolve_references("{{}}"), "{{}}");
    }

    #[test]
    fn test_placeholders_in_order() {
        let found: Vec<&str> = placeholders("{{B}} + {{ A }} + {{B}}").collect();
        assert_eq!(found, vec!["B", "A", "B"]);
    }
}
