use clap::{Parser, Subcommand};
use fieldcalc::cli;
use fieldcalc::config::EngineConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fieldcalc")]
#[command(about = "Evaluate, inspect and validate computed-field formulas")]
#[command(long_about = "Fieldcalc - formula engine for computed custom fields

Formulas reference fields with {{Field Name}} and related records with
{{Entity.Field Name}}, and may call MATH.*, TEXT.*, DATE.* and LOGIC.*
functions. Every evaluation runs in its own sandbox.

COMMANDS:
  eval      - Evaluate a formula against field values
  deps      - List the fields a formula references
  validate  - Check a formula before saving it
  order     - Show (and optionally run) the calculation order of a catalogue

EXAMPLES:
  fieldcalc eval 'MATH.round({{Value}} / 3)' --fields values.yaml
  fieldcalc deps '{{Amount}} * {{Organization.Discount}}'
  fieldcalc validate '{{Amount}} * 2' --known Amount,Stage --editing Total
  fieldcalc order formulas.yaml --fields values.yaml

Logging goes to stderr; set RUST_LOG=fieldcalc=debug to trace sandboxes.")]
#[command(version)]
struct Cli {
    /// Engine configuration file (YAML)
    #[arg(short, long, global = true, env = "FIELDCALC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a formula
    Eval {
        /// Formula text
        expression: String,

        /// YAML or JSON mapping of field name to value
        #[arg(short, long)]
        fields: Option<PathBuf>,

        /// YAML or JSON mapping of entity label to its field values
        #[arg(short, long)]
        related: Option<PathBuf>,

        /// Print the raw {value, error} result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the fields a formula references, in source order
    Deps {
        /// Formula text
        expression: String,

        /// Drop repeated references
        #[arg(short, long)]
        unique: bool,
    },

    #[command(long_about = "Validate a formula before saving it.

Checks, in order: the formula is not empty, it does not reference the field
being edited, it does not close a dependency cycle, and every local field it
references exists.

With --formulas, the formulas of the other fields in the catalogue are taken
into account, so cycles through other formula fields are caught too.")]
    /// Validate a formula
    Validate {
        /// Formula text
        expression: String,

        /// Existing field names (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        known: Vec<String>,

        /// Name of the field whose formula is being edited
        #[arg(short, long)]
        editing: Option<String>,

        /// Formula catalogue (YAML) with the other formula fields
        #[arg(long)]
        formulas: Option<PathBuf>,
    },

    /// Print the calculation order of a formula catalogue
    Order {
        /// Formula catalogue (YAML, `formulas:` mapping)
        file: PathBuf,

        /// Evaluate the catalogue against these field values
        #[arg(short, long)]
        fields: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldcalc=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Eval {
            expression,
            fields,
            related,
            json,
        } => cli::eval(expression, fields, related, json, config)?,

        Commands::Deps { expression, unique } => cli::deps(expression, unique)?,

        Commands::Validate {
            expression,
            known,
            editing,
            formulas,
        } => cli::validate(expression, known, editing, formulas)?,

        Commands::Order { file, fields } => cli::order(file, fields, config)?,
    }

    Ok(())
}
