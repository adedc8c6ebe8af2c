//! `covsynth generate`: run the synthesis loop against real collaborators

use super::read_source;
use crate::commands::{GenerateArgs, ReportFormat};
use crate::config::{CliConfig, RunFile};
use crate::error::{CliError, CliResult};
use crate::output::Reporter;
use covsynth::report::{to_json, to_markdown};
use covsynth::{Engine, RunResult, SynthConfig, TestExecutor, TestGenerator, Verdict};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Process exit status for a verdict: 0 success, 2 partial, 1 failed
#[must_use]
pub fn exit_code(verdict: Verdict) -> ExitCode {
    match verdict {
        Verdict::Success => ExitCode::SUCCESS,
        Verdict::PartialSuccess => ExitCode::from(2),
        Verdict::Failed => ExitCode::FAILURE,
    }
}

/// Loop settings from the run file overlaid with flags and environment
pub fn resolve_config(file: &RunFile, args: &GenerateArgs) -> CliResult<SynthConfig> {
    let mut config = file.synth.clone();
    if let Some(target) = args.target {
        config.target_coverage = target;
    }
    if let Some(ceiling) = args.max_iterations {
        config.max_iterations = ceiling;
    }
    if let Some(timeout) = args.timeout {
        config.execution_timeout_secs = timeout;
    }
    config.validate()?;
    Ok(config)
}

/// `--module`, else the file stem
pub fn module_name(args: &GenerateArgs) -> CliResult<String> {
    if let Some(module) = &args.module {
        return Ok(module.clone());
    }
    args.file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            CliError::invalid_argument(format!(
                "cannot derive a module name from {}; pass --module",
                args.file.display()
            ))
        })
}

fn default_output(source: &Path, module: &str) -> PathBuf {
    source.with_file_name(format!("test_{module}.py"))
}

#[cfg(feature = "llm")]
fn build_generator(
    file: &RunFile,
    args: &GenerateArgs,
    module: &str,
) -> CliResult<Box<dyn TestGenerator>> {
    use covsynth::llm::{LlmSettings, LlmTestGenerator};

    let mut settings = LlmSettings {
        module: module.to_string(),
        api_key: args.api_key.clone(),
        ..LlmSettings::default()
    };
    if let Some(url) = args.llm_url.clone().or_else(|| file.llm.base_url.clone()) {
        settings.base_url = url;
    }
    if let Some(model) = args.model.clone().or_else(|| file.llm.model.clone()) {
        settings.model = model;
    }
    if let Some(temperature) = file.llm.temperature {
        settings.temperature = temperature;
    }
    if file.llm.max_tokens.is_some() {
        settings.max_tokens = file.llm.max_tokens;
    }
    tracing::debug!(base_url = %settings.base_url, model = %settings.model, "generation collaborator");
    Ok(Box::new(LlmTestGenerator::new(settings)?))
}

#[cfg(not(feature = "llm"))]
fn build_generator(_: &RunFile, _: &GenerateArgs, _: &str) -> CliResult<Box<dyn TestGenerator>> {
    Err(CliError::FeatureDisabled { feature: "llm" })
}

#[cfg(feature = "pytest")]
fn build_executor(
    file: &RunFile,
    args: &GenerateArgs,
    module: &str,
) -> CliResult<Box<dyn TestExecutor>> {
    use covsynth::pytest::PytestExecutor;

    let python = args
        .python
        .clone()
        .or_else(|| file.python.clone())
        .unwrap_or_else(|| PathBuf::from("python3"));
    let executor = PytestExecutor::new(python, module)
        .map_err(|e| CliError::invalid_argument(e.to_string()))?;
    Ok(Box::new(executor))
}

#[cfg(not(feature = "pytest"))]
fn build_executor(_: &RunFile, _: &GenerateArgs, _: &str) -> CliResult<Box<dyn TestExecutor>> {
    Err(CliError::FeatureDisabled { feature: "pytest" })
}

/// Runs the loop, writes the suite and report, prints a summary
pub fn execute_generate(config: &CliConfig, args: &GenerateArgs) -> CliResult<ExitCode> {
    let source = read_source(&args.file)?;
    let file = match &args.config {
        Some(path) => RunFile::load(path)?,
        None => RunFile::default(),
    };
    let synth = resolve_config(&file, args)?;
    let module = module_name(args)?;

    let generator = build_generator(&file, args, &module)?;
    let executor = build_executor(&file, args, &module)?;
    let mut engine = Engine::new(synth, generator, executor)?;

    let reporter = Reporter::from_config(config);
    reporter.header(&format!("covsynth {}", args.file.display()));
    reporter.info(&format!(
        "target {:.1}%, at most {} optimization round(s)",
        engine.config().target_coverage,
        engine.config().max_iterations
    ));

    let result = engine.run(&source);
    report_rounds(&reporter, &result);

    if !result.test_source.is_empty() {
        let output = args
            .output
            .clone()
            .unwrap_or_else(|| default_output(&args.file, &module));
        std::fs::write(&output, &result.test_source)?;
        reporter.info(&format!("tests written to {}", output.display()));
    }
    if let Some(path) = &args.report {
        let body = if path.extension().is_some_and(|ext| ext == "md") {
            to_markdown(&result)
        } else {
            to_json(&result)?
        };
        std::fs::write(path, body)?;
        reporter.info(&format!("report written to {}", path.display()));
    }

    match args.format {
        ReportFormat::Text => match result.verdict {
            Verdict::Success => reporter.success(&result.summary()),
            Verdict::PartialSuccess => reporter.warning(&result.summary()),
            Verdict::Failed => reporter.failure(&result.summary()),
        },
        ReportFormat::Json => println!("{}", to_json(&result)?),
        ReportFormat::Markdown => print!("{}", to_markdown(&result)),
    }
    if let Some(violation) = &result.violation {
        eprintln!("{}", super::render_violation(&source, violation));
    }

    Ok(exit_code(result.verdict))
}

fn report_rounds(reporter: &Reporter, result: &RunResult) {
    for round in &result.history {
        let coverage = round
            .coverage
            .map_or_else(|| "not measured".to_string(), |pct| format!("{pct:.1}%"));
        reporter.detail(&format!(
            "round {}: {} ({} attempt(s))",
            round.iteration, coverage, round.attempts
        ));
        for diagnostic in &round.diagnostics {
            reporter.detail(&format!("round {}: {diagnostic}", round.iteration));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;

    fn generate_args(extra: &[&str]) -> GenerateArgs {
        let mut argv = vec!["covsynth", "generate", "src/loan_scoring.py"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Generate(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(Verdict::Success), ExitCode::SUCCESS);
        assert_eq!(exit_code(Verdict::PartialSuccess), ExitCode::from(2));
        assert_eq!(exit_code(Verdict::Failed), ExitCode::FAILURE);
    }

    #[test]
    fn test_module_name_defaults_to_stem() {
        assert_eq!(module_name(&generate_args(&[])).unwrap(), "loan_scoring");
        assert_eq!(
            module_name(&generate_args(&["--module", "scoring"])).unwrap(),
            "scoring"
        );
    }

    #[test]
    fn test_default_output_sits_next_to_source() {
        assert_eq!(
            default_output(Path::new("src/loan_scoring.py"), "loan_scoring"),
            PathBuf::from("src/test_loan_scoring.py")
        );
    }

    #[test]
    fn test_flags_override_run_file() {
        let file = RunFile::from_yaml("target_coverage: 70\nmax_iterations: 3\n").unwrap();

        let config = resolve_config(&file, &generate_args(&[])).unwrap();
        assert_eq!(config.target_coverage, 70.0);
        assert_eq!(config.max_iterations, 3);

        let config =
            resolve_config(&file, &generate_args(&["--target", "95", "--timeout", "10"])).unwrap();
        assert_eq!(config.target_coverage, 95.0);
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.execution_timeout_secs, 10);
    }

    #[test]
    fn test_out_of_range_flag_is_a_config_error() {
        let err = resolve_config(&RunFile::default(), &generate_args(&["--max-iterations", "0"]))
            .unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
        assert!(err.to_string().contains("max_iterations"));
    }
}
