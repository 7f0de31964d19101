use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use flagkit_model::{Flag, FlagRecord, FlagType, ModelError, reconcile};

mod loader;
mod output;

use loader::{DocumentFormat, read_flags, resolve_format, validate_document, write_flags};
use output::{Evaluation, OutputFormat, render_evaluation, render_list};

/// Result type for operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors that can occur while handling flag documents
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Unknown flag '{0}'")]
    UnknownFlag(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Model(#[from] ModelError),
}

#[derive(Parser, Debug)]
#[command(name = "flagkit")]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "more logging, repeat for trace")]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a flag document against the schema and decode it
    Validate {
        #[arg(long, help = "flag document to check")]
        file: PathBuf,

        #[arg(long, value_enum, help = "document format, defaults to the file extension")]
        format: Option<DocumentFormat>,
    },

    /// List the flags in a document
    List {
        #[arg(long)]
        file: PathBuf,

        #[arg(long, value_enum)]
        format: Option<DocumentFormat>,

        #[arg(long, help = "only flags in this section, use \"\" for uncategorized")]
        section: Option<String>,

        #[arg(long = "type", value_parser = parse_flag_type, help = "only flags of this type, e.g. ab-test")]
        flag_type: Option<FlagType>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        #[arg(long, env = "FLAGKIT_DEVELOPMENT", help = "treat development flags as enabled")]
        development: bool,
    },

    /// Show what a single flag evaluates to
    Evaluate {
        #[arg(long)]
        file: PathBuf,

        #[arg(long, value_enum)]
        format: Option<DocumentFormat>,

        #[arg(long, help = "flag name, case-sensitive")]
        name: String,

        #[arg(long, help = "pin the assignment draw, 0 to 100")]
        assignment: Option<f64>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        #[arg(long, env = "FLAGKIT_DEVELOPMENT")]
        development: bool,
    },

    /// Reconcile a fresh document with a cached and a fallback one
    Merge {
        #[arg(long, help = "newly fetched document")]
        fresh: PathBuf,

        #[arg(long, help = "document the device already has")]
        cached: Option<PathBuf>,

        #[arg(long, help = "local fallback document")]
        fallback: Option<PathBuf>,

        #[arg(long, help = "where to write the merged document")]
        out: PathBuf,

        #[arg(long, value_enum, help = "format of every document, defaults to each extension")]
        format: Option<DocumentFormat>,
    },
}

fn parse_flag_type(id: &str) -> std::result::Result<FlagType, String> {
    FlagType::from_str_id(id).ok_or_else(|| {
        let known: Vec<&str> = FlagType::ALL.iter().map(|t| t.as_str()).collect();
        format!("unknown flag type '{id}', expected one of: {}", known.join(", "))
    })
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}

fn load(path: &Path, format: Option<DocumentFormat>) -> Result<Vec<Flag>> {
    read_flags(path, resolve_format(path, format)?)
}

fn list(
    flags: Vec<Flag>,
    section: Option<&str>,
    flag_type: Option<FlagType>,
    development: bool,
) -> Vec<Evaluation> {
    flags
        .iter()
        .filter(|f| match section {
            Some("") => f.section().is_none(),
            Some(s) => f.section() == Some(s),
            None => true,
        })
        .filter(|f| flag_type.is_none_or(|t| f.flag_type() == t))
        .map(|f| Evaluation::of(f, development))
        .collect()
}

fn evaluate(
    flags: Vec<Flag>,
    name: &str,
    assignment: Option<f64>,
    development: bool,
) -> Result<Evaluation> {
    let flag = flags
        .into_iter()
        .find(|f| f.name() == name)
        .ok_or_else(|| AppError::UnknownFlag(name.to_string()))?;

    let flag = match assignment {
        Some(draw) if !(0.0..=100.0).contains(&draw) => {
            return Err(AppError::Validation(format!(
                "--assignment must be between 0 and 100, got {draw}"
            )));
        }
        Some(draw) => {
            let mut record = FlagRecord::from(&flag);
            record.test_variation_assignment = Some(draw);
            Flag::from(record)
        }
        None => flag,
    };
    Ok(Evaluation::of(&flag, development))
}

fn merge(
    fresh: &Path,
    cached: Option<&Path>,
    fallback: Option<&Path>,
    format: Option<DocumentFormat>,
) -> Result<Vec<Flag>> {
    let fresh = load(fresh, format)?;
    let cached = cached.map(|p| load(p, format)).transpose()?;
    let fallback = fallback.map(|p| load(p, format)).transpose()?;
    Ok(reconcile(&fresh, cached.as_deref(), fallback.as_deref()))
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Validate { file, format } => {
            let count = validate_document(&file, resolve_format(&file, format)?)?;
            println!("{}: {count} flags OK", file.display());
        }
        Command::List {
            file,
            format,
            section,
            flag_type,
            output,
            development,
        } => {
            let evaluations = list(load(&file, format)?, section.as_deref(), flag_type, development);
            print!("{}", render_list(&evaluations, output)?);
        }
        Command::Evaluate {
            file,
            format,
            name,
            assignment,
            output,
            development,
        } => {
            let evaluation = evaluate(load(&file, format)?, &name, assignment, development)?;
            println!("{}", render_evaluation(&evaluation, output)?);
        }
        Command::Merge {
            fresh,
            cached,
            fallback,
            out,
            format,
        } => {
            let merged = merge(&fresh, cached.as_deref(), fallback.as_deref(), format)?;
            write_flags(&out, resolve_format(&out, format)?, &merged)?;
            tracing::info!(flags = merged.len(), out = %out.display(), "wrote merged document");
            println!("{}: {} flags", out.display(), merged.len());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli.command)
}
