//! covsynth CLI library
//!
//! Argument parsing, configuration layering and command handlers for the
//! `covsynth` binary. Kept as a library so handlers can be tested without
//! spawning the process.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;

pub use commands::{
    AnalyzeArgs, AnalyzeFormat, Cli, ColorArg, Commands, GenerateArgs, ReportFormat, ValidateArgs,
};
pub use config::{CliConfig, ColorChoice, LlmSection, RunFile, Verbosity};
pub use error::{CliError, CliResult};
pub use output::Reporter;

use tracing_subscriber::EnvFilter;

/// Builds the global configuration from parsed flags
#[must_use]
pub fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.into())
}

/// Installs a stderr `tracing` subscriber.
///
/// `RUST_LOG` wins over the level implied by `-q`/`-v`.
pub fn init_tracing(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(config.color.should_color())
        .with_target(config.verbosity == Verbosity::Debug)
        .try_init();
}

/// Dispatches a parsed command line
pub fn run(cli: Cli) -> CliResult<std::process::ExitCode> {
    let config = build_config(&cli);
    init_tracing(&config);

    match cli.command {
        Commands::Validate(args) => handlers::execute_validate(&config, &args),
        Commands::Analyze(args) => handlers::execute_analyze(&config, &args),
        Commands::Grammar => {
            handlers::execute_grammar(&config);
            Ok(std::process::ExitCode::SUCCESS)
        }
        Commands::Generate(args) => handlers::execute_generate(&config, &args),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_build_config() {
        let cli = Cli::try_parse_from(["covsynth", "-v", "--color", "never", "grammar"]).unwrap();
        let config = build_config(&cli);
        assert_eq!(config.verbosity, Verbosity::Verbose);
        assert_eq!(config.color, ColorChoice::Never);

        let cli = Cli::try_parse_from(["covsynth", "-q", "grammar"]).unwrap();
        assert!(build_config(&cli).verbosity.is_quiet());
    }
}
