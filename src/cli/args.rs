//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    asset::AssetCommands, completions::CompletionsArgs, form::FormCommands, init::InitArgs,
    job::JobCommands, meter::MeterCommands, sub::SubCommands, validate::ValidateArgs,
};

#[derive(Parser)]
#[command(name = "fct")]
#[command(author, version, about = "Field Compliance Toolkit")]
#[command(
    long_about = "Template-driven inspection capture: instantiate forms per asset, record metered readings against calibrated instruments, and submit evaluated compliance records."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (default: auto-detect by finding .fct/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new FCT project
    Init(InitArgs),

    /// Form versions (test templates)
    #[command(subcommand)]
    Form(FormCommands),

    /// Assets under test
    #[command(subcommand)]
    Asset(AssetCommands),

    /// Jobs (site visits)
    #[command(subcommand)]
    Job(JobCommands),

    /// Meters and their calibrations
    #[command(subcommand)]
    Meter(MeterCommands),

    /// Submissions: capture answers and readings, then submit
    #[command(subcommand)]
    Sub(SubCommands),

    /// Validate catalog files against schemas
    Validate(ValidateArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Automatically detect based on context (yaml for show, table for list)
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Aligned table (for reading)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Markdown tables
    Md,
    /// Just IDs, one per line
    Id,
}

impl OutputFormat {
    /// Replace `Auto` with the given default
    pub fn or(self, default: OutputFormat) -> OutputFormat {
        if self == OutputFormat::Auto {
            default
        } else {
            self
        }
    }
}
