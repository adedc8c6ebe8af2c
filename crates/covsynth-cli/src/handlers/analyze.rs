//! `covsynth analyze`

use super::read_source;
use crate::commands::{AnalyzeArgs, AnalyzeFormat};
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::Reporter;
use covsynth::{BranchMap, SynthError};
use std::process::ExitCode;

/// Prints the branch map, or the violation that prevents building one
pub fn execute_analyze(config: &CliConfig, args: &AnalyzeArgs) -> CliResult<ExitCode> {
    let source = read_source(&args.file)?;
    let map = match covsynth::analyze(&source) {
        Ok(map) => map,
        Err(SynthError::Grammar(violation)) => {
            Reporter::from_config(config).failure(&format!("{}: {violation}", args.file.display()));
            eprintln!("{}", super::render_violation(&source, &violation));
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };
    match args.format {
        AnalyzeFormat::Text => print!("{}", render_branch_map(&map)),
        AnalyzeFormat::Json => println!("{}", serde_json::to_string_pretty(&map)?),
    }
    Ok(ExitCode::SUCCESS)
}

/// One block per function listing its branch ids in map order
#[must_use]
pub fn render_branch_map(map: &BranchMap) -> String {
    let mut out = format!(
        "{} function(s), {} branch(es), {} decision(s), at least {} test(s)\n",
        map.functions().len(),
        map.total_branches(),
        map.decision_count(),
        map.required_tests()
    );
    for entry in map.functions() {
        let function = &entry.function;
        out.push_str(&format!(
            "\n{}({})  lines {}-{}\n",
            function.name,
            function.params.join(", "),
            function.span.start_line,
            function.span.end_line
        ));
        if entry.branches.is_empty() {
            out.push_str("  no branches\n");
        }
        for branch in &entry.branches {
            out.push_str(&format!("  {:<20} {}\n", branch.id.to_string(), branch.describe()));
        }
    }
    out
}
