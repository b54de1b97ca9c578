//! Formula engine integration tests
//!
//! Exercises evaluation end to end through the public async API: reference
//! resolution, null propagation, the function library, sandbox limits and
//! the never-fails contract.

use fieldcalc::config::{EngineConfig, SandboxLimits};
use fieldcalc::types::{EvaluationResult, FieldValues, RelatedEntities, Scalar};
use fieldcalc::FormulaEngine;
use pretty_assertions::assert_eq;

fn values(pairs: &[(&str, Option<Scalar>)]) -> FieldValues {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn num(n: f64) -> Option<Scalar> {
    Some(Scalar::Number(n))
}

fn text(s: &str) -> Option<Scalar> {
    Some(Scalar::from(s))
}

async fn eval(expression: &str, fields: &FieldValues) -> EvaluationResult {
    FormulaEngine::new().evaluate(expression, fields, None).await
}

// ═══════════════════════════════════════════════════════════════════════════
// NULL PROPAGATION
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_explicit_null_dependency_yields_blank() {
    let result = eval("{{X}} + 1", &values(&[("X", None)])).await;
    assert_eq!(result, EvaluationResult::blank());
    assert!(result.is_blank());
}

#[tokio::test]
async fn test_missing_field_behaves_as_blank() {
    let result = eval("{{Missing}}", &FieldValues::new()).await;
    assert_eq!(result, EvaluationResult::blank());
}

#[tokio::test]
async fn test_missing_field_in_arithmetic_is_blank_not_error() {
    let result = eval("{{Missing}} * 2 + 1", &FieldValues::new()).await;
    assert_eq!(result, EvaluationResult::blank());
}

#[tokio::test]
async fn test_explicit_null_related_dependency_yields_blank() {
    let mut related = RelatedEntities::new();
    related.insert("Organization".to_string(), values(&[("Revenue", None)]));

    let result = FormulaEngine::new()
        .evaluate(
            "{{Organization.Revenue}} / 12",
            &FieldValues::new(),
            Some(&related),
        )
        .await;
    assert_eq!(result, EvaluationResult::blank());
}

#[tokio::test]
async fn test_null_related_field_by_plain_name_yields_blank() {
    let mut related = RelatedEntities::new();
    related.insert("Organization".to_string(), values(&[("Revenue", None)]));
    let engine = FormulaEngine::new();

    for expression in [
        r#"TEXT.concat({{Revenue}}, "x")"#,
        r#"TEXT.concat({{Organization.Revenue}}, "x")"#,
    ] {
        let result = engine
            .evaluate(expression, &FieldValues::new(), Some(&related))
            .await;
        assert_eq!(result, EvaluationResult::blank(), "{}", expression);
    }
}

#[tokio::test]
async fn test_ambiguous_null_related_field_does_not_short_circuit() {
    let mut related = RelatedEntities::new();
    related.insert("Organization".to_string(), values(&[("Name", None)]));
    related.insert("Person".to_string(), values(&[("Name", text("Ada"))]));

    let result = FormulaEngine::new()
        .evaluate(r#"TEXT.concat({{Name}}, "x")"#, &FieldValues::new(), Some(&related))
        .await;
    assert_eq!(result, EvaluationResult::value(Scalar::from("x")));
}

// ═══════════════════════════════════════════════════════════════════════════
// FUNCTION LIBRARY THROUGH THE ENGINE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_math_round() {
    let result = eval("MATH.round({{Value}} / 3)", &values(&[("Value", num(10.0))])).await;
    assert_eq!(result, EvaluationResult::value(Scalar::Number(3.0)));
}

#[tokio::test]
async fn test_text_upper() {
    let result = eval("TEXT.upper({{Name}})", &values(&[("Name", text("test"))])).await;
    assert_eq!(result, EvaluationResult::value(Scalar::from("TEST")));
}

#[tokio::test]
async fn test_logic_if() {
    let result = eval(
        r#"LOGIC.if({{Score}} > 100, "High", "Low")"#,
        &values(&[("Score", num(150.0))]),
    )
    .await;
    assert_eq!(result, EvaluationResult::value(Scalar::from("High")));
}

#[tokio::test]
async fn test_date_diff_days() {
    let result = eval(r#"DATE.diffDays("2024-01-10", "2024-01-01")"#, &FieldValues::new()).await;
    assert_eq!(result, EvaluationResult::value(Scalar::Number(9.0)));
}

#[tokio::test]
async fn test_date_fields_are_text() {
    let result = eval(
        "DATE.diffDays({{Close Date}}, {{Created}})",
        &values(&[
            ("Close Date", text("2024-03-01")),
            ("Created", text("2024-02-01T08:00:00Z")),
        ]),
    )
    .await;
    assert_eq!(result, EvaluationResult::value(Scalar::Number(28.0)));
}

#[tokio::test]
async fn test_boolean_result() {
    let result = eval(
        "{{Stage}} == 'Won' && {{Amount}} >= 1000",
        &values(&[("Stage", text("Won")), ("Amount", num(1000.0))]),
    )
    .await;
    assert_eq!(result, EvaluationResult::value(Scalar::Boolean(true)));
}

// ═══════════════════════════════════════════════════════════════════════════
// RELATED ENTITIES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_related_field_by_plain_name() {
    let mut related = RelatedEntities::new();
    related.insert("Organization".to_string(), values(&[("Revenue", num(1000.0))]));

    let result = FormulaEngine::new()
        .evaluate("{{Revenue}}", &FieldValues::new(), Some(&related))
        .await;
    assert_eq!(result, EvaluationResult::value(Scalar::Number(1000.0)));
}

#[tokio::test]
async fn test_related_field_qualified_with_spaces() {
    let mut related = RelatedEntities::new();
    related.insert(
        "Primary Contact".to_string(),
        values(&[("Full Name", text("Ada Lovelace"))]),
    );

    let result = FormulaEngine::new()
        .evaluate(
            "TEXT.left({{ Primary Contact . Full Name }}, 3)",
            &FieldValues::new(),
            Some(&related),
        )
        .await;
    assert_eq!(result, EvaluationResult::value(Scalar::from("Ada")));
}

#[tokio::test]
async fn test_names_are_case_sensitive() {
    let result = eval("{{amount}}", &values(&[("Amount", num(5.0))])).await;
    assert_eq!(result, EvaluationResult::blank());
}

#[tokio::test]
async fn test_field_names_with_quotes_cannot_break_out() {
    let result = eval(
        r#"{{Say "hi"}} + "!""#,
        &values(&[(r#"Say "hi""#, text("hello"))]),
    )
    .await;
    assert_eq!(result, EvaluationResult::value(Scalar::from("hello!")));
}

// ═══════════════════════════════════════════════════════════════════════════
// ERRORS ARE RESULTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_unbalanced_parentheses_is_error_result() {
    let result = eval("(1 + 2", &FieldValues::new()).await;
    assert_eq!(result.value, None);
    assert!(result.error.unwrap().starts_with("Syntax error"));
}

#[tokio::test]
async fn test_malformed_placeholder_is_error_result() {
    let result = eval("{{A} + 1", &values(&[("A", num(1.0))])).await;
    assert!(result.is_error());
}

#[tokio::test]
async fn test_unknown_function_is_error_result() {
    let result = eval("MATH.median(1, 2)", &FieldValues::new()).await;
    assert_eq!(
        result.error.as_deref(),
        Some("Runtime error: MATH.median is not a function")
    );
}

#[tokio::test]
async fn test_host_names_are_not_reachable() {
    for expression in ["process", "require('fs')", "globalThis", "fields.constructor"] {
        let result = eval(expression, &FieldValues::new()).await;
        assert!(result.is_error(), "{} should fail", expression);
    }
}

#[tokio::test]
async fn test_type_mismatch_is_error_result() {
    let result = eval("TEXT.upper({{Flag}})", &values(&[("Flag", None)])).await;
    // Explicit null short-circuits before the type check
    assert_eq!(result, EvaluationResult::blank());

    let result = eval("MATH.sqrt({{Name}})", &values(&[("Name", text("abc"))])).await;
    assert!(result.error.unwrap().contains("must be a number"));
}

#[tokio::test]
async fn test_never_fails_on_garbage() {
    let inputs = [
        "",
        "   ",
        "{{",
        "}}",
        "))((",
        "1 +",
        "'unterminated",
        "1 ? 2",
        "a.b.c(",
        "MATH.round(",
        "@#$%",
        "1 / 0",
        "-'x'",
    ];
    for input in inputs {
        let result = eval(input, &FieldValues::new()).await;
        assert!(
            result.is_error() || result.is_blank() || result.value.is_some(),
            "{:?}",
            input
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LIMITS
// ═══════════════════════════════════════════════════════════════════════════

fn limited(limits: SandboxLimits) -> FormulaEngine {
    FormulaEngine::with_config(EngineConfig { limits })
}

#[tokio::test]
async fn test_step_limit_is_error_result() {
    let engine = limited(SandboxLimits {
        max_steps: 50,
        ..SandboxLimits::default()
    });
    let expression = vec!["1"; 100].join(" + ");
    let result = engine
        .evaluate(&expression, &FieldValues::new(), None)
        .await;
    assert!(result
        .error
        .unwrap()
        .starts_with("Execution limit exceeded"));
}

#[tokio::test]
async fn test_long_flat_sum_is_not_too_deep() {
    let expression = vec!["1"; 1000].join("+");
    let result = eval(&expression, &FieldValues::new()).await;
    assert_eq!(result, EvaluationResult::value(Scalar::Number(1000.0)));

    let names: Vec<String> = (0..150).map(|i| format!("F{}", i)).collect();
    let fields: FieldValues = names
        .iter()
        .map(|name| (name.clone(), num(2.0)))
        .collect();
    let expression = names
        .iter()
        .map(|name| format!("{{{{{}}}}}", name))
        .collect::<Vec<_>>()
        .join(" + ");
    let result = eval(&expression, &fields).await;
    assert_eq!(result, EvaluationResult::value(Scalar::Number(300.0)));
}

#[tokio::test]
async fn test_wall_clock_timeout_is_error_result() {
    let engine = limited(SandboxLimits {
        timeout_ms: 1,
        max_steps: usize::MAX,
        max_expression_len: usize::MAX,
        ..SandboxLimits::default()
    });
    let expression = format!("MATH.max({})", vec!["1"; 100_000].join(","));
    let result = engine
        .evaluate(&expression, &FieldValues::new(), None)
        .await;
    let error = result.error.unwrap();
    assert!(error.starts_with("Execution limit exceeded"), "{}", error);
    assert!(error.contains("longer than 1ms"), "{}", error);
    assert_eq!(result.value, None);
}

#[tokio::test]
async fn test_deep_nesting_is_error_result() {
    let expression = format!("{}1{}", "(".repeat(500), ")".repeat(500));
    let result = eval(&expression, &FieldValues::new()).await;
    assert!(result.is_error());
}

#[tokio::test]
async fn test_text_growth_is_bounded() {
    let engine = limited(SandboxLimits {
        max_text_len: 1024,
        ..SandboxLimits::default()
    });
    let expression = format!("TEXT.concat({})", vec!["'0123456789'"; 200].join(", "));
    let result = engine
        .evaluate(&expression, &FieldValues::new(), None)
        .await;
    assert!(result
        .error
        .unwrap()
        .starts_with("Execution limit exceeded"));
}

#[tokio::test]
async fn test_expression_length_limit() {
    let engine = limited(SandboxLimits {
        max_expression_len: 16,
        ..SandboxLimits::default()
    });
    let result = engine
        .evaluate("{{A very long field name}}", &FieldValues::new(), None)
        .await;
    assert!(result.is_error());
}

// ═══════════════════════════════════════════════════════════════════════════
// ISOLATION AND CONCURRENCY
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_inputs_are_not_mutated() {
    let fields = values(&[("A", num(1.0)), ("B", text("x"))]);
    let before = fields.clone();
    let _ = eval("{{A}} + {{B}}", &fields).await;
    assert_eq!(fields, before);
}

#[tokio::test]
async fn test_repeated_evaluation_is_idempotent() {
    let fields = values(&[("A", num(4.0))]);
    let first = eval("MATH.sqrt({{A}}) * 10", &fields).await;
    let second = eval("MATH.sqrt({{A}}) * 10", &fields).await;
    assert_eq!(first, second);
    assert_eq!(first, EvaluationResult::value(Scalar::Number(20.0)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_evaluations_are_independent() {
    let engine = FormulaEngine::new();
    let mut handles = Vec::new();
    for i in 0..32 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let fields = values(&[("N", num(i as f64))]);
            engine.evaluate("{{N}} * 2", &fields, None).await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap();
        assert_eq!(result, EvaluationResult::value(Scalar::Number(i as f64 * 2.0)));
    }
}
