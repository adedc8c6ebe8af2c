//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// covsynth: generate unit tests until a branch-coverage target is met
#[derive(Parser, Debug)]
#[command(name = "covsynth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that a source file is inside the supported subset
    Validate(ValidateArgs),

    /// Print the branch map of a source file
    Analyze(AnalyzeArgs),

    /// Print the grammar's production table
    Grammar,

    /// Generate tests until the coverage target or the iteration ceiling
    ///
    /// Exit status: 0 when the target is reached, 2 when the ceiling is
    /// reached below target, 1 when the source is rejected or on error.
    Generate(GenerateArgs),
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Source file to check
    pub file: PathBuf,
}

/// Arguments for the analyze command
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Source file to analyze
    pub file: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: AnalyzeFormat,
}

/// Arguments for the generate command
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Source file to generate tests for
    pub file: PathBuf,

    /// Module name the tests import (default: the file stem)
    #[arg(short, long)]
    pub module: Option<String>,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Target branch coverage percentage
    #[arg(long, env = "COVSYNTH_TARGET_COVERAGE")]
    pub target: Option<f64>,

    /// Optimization rounds allowed after the initial generation
    #[arg(long, env = "COVSYNTH_MAX_ITERATIONS")]
    pub max_iterations: Option<u32>,

    /// Per-round test execution timeout in seconds
    #[arg(long, env = "COVSYNTH_EXECUTION_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "COVSYNTH_LLM_URL")]
    pub llm_url: Option<String>,

    /// Model name
    #[arg(long, env = "COVSYNTH_MODEL")]
    pub model: Option<String>,

    /// API key sent as a bearer token
    #[arg(long, env = "COVSYNTH_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Python interpreter with pytest and pytest-cov installed
    #[arg(long)]
    pub python: Option<PathBuf>,

    /// Where to write the generated tests (default: test_<module>.py next to the source)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Where to write the run report (`.md` for Markdown, JSON otherwise)
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Format of the summary printed to stdout
    #[arg(short, long, default_value = "text")]
    pub format: ReportFormat,
}

/// Output format for the analyze command
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnalyzeFormat {
    /// Human-readable listing
    #[default]
    Text,
    /// JSON
    Json,
}

/// Output format for run summaries
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Full JSON report
    Json,
    /// Markdown report
    Markdown,
}

/// Color choice argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
