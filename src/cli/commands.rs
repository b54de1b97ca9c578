use crate::config::EngineConfig;
use crate::core::dependencies::unique;
use crate::core::{extract_dependencies, validate as validate_formula, DependencyGraph};
use crate::core::{FormulaEngine, FormulaValidator};
use crate::error::{FormulaError, FormulaResult};
use crate::types::{
    EvaluationContext, EvaluationResult, FieldValues, FormulaDefinition, RelatedEntities,
    ValidationResult,
};
use colored::Colorize;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A catalogue of formula fields, as read by `order` and `validate --formulas`
#[derive(Debug, Default, Deserialize)]
pub struct FormulaFile {
    #[serde(default)]
    pub formulas: BTreeMap<String, FormulaDefinition>,
}

impl FormulaFile {
    pub fn load(path: &Path) -> FormulaResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Field values from a YAML (or JSON) mapping
fn load_values<T: serde::de::DeserializeOwned + Default>(path: Option<&Path>) -> FormulaResult<T> {
    match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&content)?)
        }
        None => Ok(T::default()),
    }
}

fn runtime() -> FormulaResult<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

fn print_result(result: &EvaluationResult) {
    match (&result.value, &result.error) {
        (_, Some(error)) => println!("   {} {}", "❌".red(), error.red()),
        (Some(value), None) => println!("   = {}", value.to_string().bold().green()),
        (None, None) => println!("   = {}", "(blank)".dimmed()),
    }
}

/// Execute the eval command
pub fn eval(
    expression: String,
    fields: Option<PathBuf>,
    related: Option<PathBuf>,
    json: bool,
    config: EngineConfig,
) -> FormulaResult<()> {
    let field_values: FieldValues = load_values(fields.as_deref())?;
    let related_entities: RelatedEntities = load_values(related.as_deref())?;

    let engine = FormulaEngine::with_config(config);
    let result = runtime()?.block_on(engine.evaluate(
        &expression,
        &field_values,
        Some(&related_entities),
    ));

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", "🧮 Fieldcalc - Evaluate".bold().green());
        println!("   Formula: {}", expression.bright_yellow());
        println!(
            "   Inputs: {} fields, {} related entities\n",
            field_values.len(),
            related_entities.len()
        );
        print_result(&result);
    }

    match result.error {
        Some(error) => Err(FormulaError::Evaluation(error)),
        None => Ok(()),
    }
}

/// Execute the deps command
pub fn deps(expression: String, dedupe: bool) -> FormulaResult<()> {
    let mut dependencies = extract_dependencies(&expression);
    if dedupe {
        dependencies = unique(&dependencies);
    }

    println!("{}", "🌳 Fieldcalc - Dependencies".bold().green());
    println!("   Formula: {}\n", expression.bright_yellow());

    if dependencies.is_empty() {
        println!("   No field references");
    } else {
        for dependency in &dependencies {
            match dependency.split_once('.') {
                Some((entity, field)) => println!(
                    "   {} {}.{}",
                    "└─".dimmed(),
                    entity.cyan(),
                    field.bright_blue()
                ),
                None => println!("   {} {}", "└─".dimmed(), dependency.bright_blue()),
            }
        }
    }
    Ok(())
}

/// Execute the validate command
pub fn validate(
    expression: String,
    known: Vec<String>,
    editing: Option<String>,
    formulas: Option<PathBuf>,
) -> FormulaResult<()> {
    println!("{}", "✅ Fieldcalc - Validate".bold().green());
    println!("   Formula: {}", expression.bright_yellow());
    if let Some(ref field) = editing {
        println!("   Editing: {}", field.bright_blue().bold());
    }
    println!();

    let result: ValidationResult = match formulas {
        Some(path) => {
            let file = FormulaFile::load(&path)?;
            let mut validator = FormulaValidator::new(known);
            for (name, definition) in &file.formulas {
                if Some(name.as_str()) != editing.as_deref() {
                    validator.add_formula(name.as_str(), &definition.expression);
                }
            }
            validator.validate(&expression, editing.as_deref())
        }
        None => validate_formula(&expression, &known, editing.as_deref()),
    };

    match result.error {
        Some(error) => {
            println!("{}", format!("❌ Invalid: {}", error).bold().red());
            Err(FormulaError::Validation(error))
        }
        None => {
            let dependencies = result.dependencies.unwrap_or_default();
            println!(
                "{}",
                format!("✅ Valid ({} references)", dependencies.len())
                    .bold()
                    .green()
            );
            for dependency in unique(&dependencies) {
                println!("   uses: {}", dependency.cyan());
            }
            Ok(())
        }
    }
}

/// Execute the order command: print the calculation order of a formula
/// catalogue, and evaluate it when field values are given
pub fn order(file: PathBuf, fields: Option<PathBuf>, config: EngineConfig) -> FormulaResult<()> {
    println!("{}", "📋 Fieldcalc - Calculation Order".bold().green());
    println!("   File: {}\n", file.display());

    let catalogue = FormulaFile::load(&file)?;
    let graph = DependencyGraph::from_formulas(
        catalogue
            .formulas
            .iter()
            .map(|(name, definition)| (name.as_str(), definition.expression.as_str())),
    );

    let order = match graph.calculation_order() {
        Ok(order) => order,
        Err(e) => {
            println!("{}", format!("❌ {}", e).bold().red());
            return Err(e);
        }
    };

    for (i, name) in order.iter().enumerate() {
        let deps = graph.dependencies_of(name);
        if deps.is_empty() {
            println!("   {}. {}", i + 1, name.bright_blue().bold());
        } else {
            println!(
                "   {}. {} {} {}",
                i + 1,
                name.bright_blue().bold(),
                "←".dimmed(),
                deps.join(", ").cyan()
            );
        }
    }

    let Some(fields) = fields else {
        return Ok(());
    };

    let context = EvaluationContext::new(load_values(Some(fields.as_path()))?);
    let engine = FormulaEngine::with_config(config);
    let results = runtime()?.block_on(engine.evaluate_all(&catalogue.formulas, &context));

    println!("\n{}", "🧮 Results:".bold().cyan());
    let mut failed = 0;
    for name in &order {
        if let Some(result) = results.get(name) {
            println!("   {}", name.bright_blue());
            print_result(result);
            if result.is_error() {
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(FormulaError::Evaluation(format!(
            "{} of {} formulas failed",
            failed,
            results.len()
        )));
    }
    Ok(())
}
