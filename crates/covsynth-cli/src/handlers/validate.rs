//! `covsynth validate`

use super::read_source;
use crate::commands::ValidateArgs;
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::Reporter;
use covsynth::GrammarViolation;
use std::process::ExitCode;

/// Checks the file against the subset; exit 1 on the first violation
pub fn execute_validate(config: &CliConfig, args: &ValidateArgs) -> CliResult<ExitCode> {
    let source = read_source(&args.file)?;
    let reporter = Reporter::from_config(config);
    match covsynth::validate(&source) {
        Ok(_) => {
            let map = covsynth::analyze(&source)?;
            reporter.success(&format!(
                "{}: valid ({} function(s), {} branch(es))",
                args.file.display(),
                map.functions().len(),
                map.total_branches()
            ));
            Ok(ExitCode::SUCCESS)
        }
        Err(violation) => {
            reporter.failure(&format!("{}: {violation}", args.file.display()));
            eprintln!("{}", render_violation(&source, &violation));
            Ok(ExitCode::FAILURE)
        }
    }
}

/// The offending line with a caret under the violation's column
#[must_use]
pub fn render_violation(source: &str, violation: &GrammarViolation) -> String {
    let Some(text) = source.lines().nth(violation.line.saturating_sub(1)) else {
        return String::new();
    };
    let gutter = violation.line.to_string();
    let pad = " ".repeat(gutter.len());
    let caret = " ".repeat(violation.column.saturating_sub(1));
    format!("{pad} |\n{gutter} | {text}\n{pad} | {caret}^")
}
