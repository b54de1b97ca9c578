use thiserror::Error;

pub type FormulaResult<T> = Result<T, FormulaError>;

#[derive(Error, Debug)]
pub enum FormulaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Execution limit exceeded: {0}")]
    LimitExceeded(String),

    /// The message is deliberately generic; diagnostics go to the log only.
    #[error("Failed to initialize formula sandbox")]
    SandboxInit(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// A formula evaluated to an error result; carries the result's message
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl FormulaError {
    /// True for errors raised while executing a formula, as opposed to
    /// loading files or analysing dependencies.
    pub fn is_evaluation_error(&self) -> bool {
        matches!(
            self,
            FormulaError::Syntax(_)
                | FormulaError::Runtime(_)
                | FormulaError::LimitExceeded(_)
                | FormulaError::SandboxInit(_)
                | FormulaError::Evaluation(_)
        )
    }
}

/// Why a formula was rejected while being authored.
///
/// The `Display` strings are shown verbatim in the formula editor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expression is required")]
    EmptyExpression,

    #[error("formula cannot reference itself")]
    SelfReference,

    #[error("circular dependency detected")]
    CircularDependency { path: Vec<String> },

    #[error("unknown field: {0}")]
    UnknownField(String),
}

impl From<ValidationError> for FormulaError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::CircularDependency { ref path } if !path.is_empty() => {
                FormulaError::CircularDependency(path.join(" -> "))
            }
            other => FormulaError::Validation(other.to_string()),
        }
    }
}
