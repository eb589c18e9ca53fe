mod commands;
mod settings;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::settings::CliSettings;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Data-driven form engine driver.
#[derive(Parser)]
#[command(name = "formwork", version, about = "Data-driven form engine driver")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// TOML settings file (store_dir, persist_key, messages, allow_back_navigation)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report configuration diagnostics for a form document
    Check {
        /// Path to the form configuration JSON
        config: PathBuf,
        /// Exit non-zero when any diagnostic is reported
        #[arg(long)]
        strict: bool,
    },

    /// Show the visible fields of a step for a set of values
    Inspect {
        /// Path to the form configuration JSON
        config: PathBuf,
        /// Path to a JSON object of field values
        #[arg(long)]
        values: Option<PathBuf>,
        /// Step id (defaults to the first step)
        #[arg(long)]
        step: Option<String>,
    },

    /// Validate values and print the cleaned submission
    Submit {
        /// Path to the form configuration JSON
        config: PathBuf,
        /// Path to a JSON object of field values
        #[arg(long)]
        values: PathBuf,
        /// Step id (defaults to the first step)
        #[arg(long)]
        step: Option<String>,
    },

    /// Drive a multi-step form with per-step answers
    Run {
        /// Path to the form configuration JSON
        config: PathBuf,
        /// Path to a JSON object mapping step ids to field values
        #[arg(long)]
        answers: PathBuf,
        /// Directory for persisted progress (overrides the settings file)
        #[arg(long)]
        store_dir: Option<PathBuf>,
        /// Persistence key (overrides the document and the settings file)
        #[arg(long)]
        persist_key: Option<String>,
        /// Stop after this many transitions
        #[arg(long)]
        max_steps: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let settings = match &cli.settings {
        Some(path) => match CliSettings::load(path) {
            Ok(s) => s,
            Err(msg) => {
                report_error(&msg, cli.output, cli.quiet);
                process::exit(1);
            }
        },
        None => CliSettings::default(),
    };

    match cli.command {
        Commands::Check { config, strict } => {
            commands::check::cmd_check(&config, strict, &settings, cli.output, cli.quiet);
        }
        Commands::Inspect {
            config,
            values,
            step,
        } => {
            commands::inspect::cmd_inspect(
                &config,
                values.as_deref(),
                step.as_deref(),
                &settings,
                cli.output,
                cli.quiet,
            );
        }
        Commands::Submit {
            config,
            values,
            step,
        } => {
            commands::submit::cmd_submit(
                &config,
                &values,
                step.as_deref(),
                &settings,
                cli.output,
                cli.quiet,
            );
        }
        Commands::Run {
            config,
            answers,
            store_dir,
            persist_key,
            max_steps,
        } => {
            let mut settings = settings;
            if store_dir.is_some() {
                settings.store_dir = store_dir;
            }
            if persist_key.is_some() {
                settings.persist_key = persist_key;
            }
            commands::run::cmd_run(
                &config,
                &answers,
                max_steps,
                &settings,
                cli.output,
                cli.quiet,
            );
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Read and parse a JSON file, exiting with a reported error on failure.
pub(crate) fn read_json(path: &Path, what: &str, output: OutputFormat, quiet: bool) -> serde_json::Value {
    let src = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error: cannot read {} file {}: {}", what, path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    match serde_json::from_str(&src) {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("error: invalid JSON in {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

/// Print a value as pretty JSON.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e))
    );
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
