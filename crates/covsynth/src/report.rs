//! The run result and its JSON and Markdown renderings.

use crate::analysis::{Branch, BranchMap};
use crate::collaborator::{join_suite, TestArtifact};
use crate::config::SynthConfig;
use crate::coverage::CoverageResult;
use crate::engine::{LoopState, RoundRecord, TransitionRecord, Verdict};
use crate::error::{GrammarViolation, SynthError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use uuid::Uuid;

/// Everything a finished run leaves behind
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub verdict: Verdict,
    /// Final branch coverage percentage
    pub coverage: f64,
    pub target: f64,
    /// Optimization rounds used (0 when the initial suite was enough)
    pub iterations: u32,
    pub ceiling: u32,
    /// Accumulated test source, oldest artifact first
    pub test_source: String,
    /// Branches still uncovered at termination
    pub uncovered: Vec<Branch>,
    /// Tests executed by the final measurement
    pub tests_run: usize,
    /// Tests failing in the final measurement
    pub tests_failed: usize,
    pub artifacts: Vec<TestArtifact>,
    pub history: Vec<RoundRecord>,
    pub transitions: Vec<TransitionRecord>,
    pub final_measurement: Option<CoverageResult>,
    pub branch_map: Option<BranchMap>,
    /// Cause of a `Failed` verdict
    pub error: Option<String>,
    /// Set when the source was outside the supported subset
    pub violation: Option<GrammarViolation>,
    pub source_sha256: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        run_id: Uuid,
        verdict: Verdict,
        config: &SynthConfig,
        source_sha256: String,
        branch_map: Option<BranchMap>,
        state: LoopState,
        failure: Option<SynthError>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let ceiling = state.ceiling();
        let parts = state.into_parts();

        let uncovered = match (&branch_map, &parts.latest) {
            (Some(map), Some(latest)) => latest
                .uncovered
                .iter()
                .filter_map(|id| map.get(id).cloned())
                .collect(),
            (Some(map), None) => map.branches().cloned().collect(),
            _ => Vec::new(),
        };
        let violation = match &failure {
            Some(SynthError::Grammar(v)) => Some(v.clone()),
            _ => None,
        };
        let (tests_run, tests_failed) = parts
            .latest
            .as_ref()
            .map_or((0, 0), |m| (m.tests_run, m.tests_failed));

        Self {
            run_id,
            verdict,
            coverage: parts.latest.as_ref().map_or(0.0, |m| m.percentage),
            target: config.target_coverage,
            iterations: parts.iteration,
            ceiling,
            test_source: join_suite(&parts.artifacts),
            uncovered,
            tests_run,
            tests_failed,
            artifacts: parts.artifacts,
            history: parts.history,
            transitions: parts.transitions,
            final_measurement: parts.latest,
            branch_map,
            error: failure.map(|e| e.to_string()),
            violation,
            source_sha256,
            started_at,
            finished_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.verdict == Verdict::Success
    }

    /// Wall-clock duration of the run
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// One-line outcome, e.g. `partial success: 62.5% of 80.0% after 5 rounds`
    #[must_use]
    pub fn summary(&self) -> String {
        match self.verdict {
            Verdict::Failed => format!(
                "failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            ),
            verdict => format!(
                "{verdict}: {:.1}% of {:.1}% after {} {}",
                self.coverage,
                self.target,
                self.iterations,
                if self.iterations == 1 { "round" } else { "rounds" }
            ),
        }
    }
}

/// Serialize a run result to a pretty-printed JSON string.
pub fn to_json(result: &RunResult) -> Result<String, SynthError> {
    Ok(serde_json::to_string_pretty(result)?)
}

/// Render a run result as a Markdown report.
#[must_use]
pub fn to_markdown(result: &RunResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Coverage Synthesis Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Field | Value |");
    let _ = writeln!(out, "|-------|-------|");
    let _ = writeln!(out, "| Run | `{}` |", result.run_id);
    let _ = writeln!(out, "| Verdict | {} |", result.verdict);
    let _ = writeln!(out, "| Coverage | {:.1}% |", result.coverage);
    let _ = writeln!(out, "| Target | {:.1}% |", result.target);
    let _ = writeln!(out, "| Rounds | {} of {} |", result.iterations, result.ceiling);
    let _ = writeln!(
        out,
        "| Tests | {} run, {} failed |",
        result.tests_run, result.tests_failed
    );
    let _ = writeln!(out, "| Source SHA-256 | `{}` |", result.source_sha256);
    let _ = writeln!(out, "| Started | {} |", result.started_at.to_rfc3339());
    let _ = writeln!(
        out,
        "| Duration | {} ms |",
        result.duration().num_milliseconds()
    );

    if let Some(error) = &result.error {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Error");
        let _ = writeln!(out);
        let _ = writeln!(out, "{error}");
    }

    if !result.history.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Rounds");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Round | Scope | Attempts | Tests added | Coverage | Notes |");
        let _ = writeln!(out, "|-------|-------|----------|-------------|----------|-------|");
        for round in &result.history {
            let scope = match &round.scope {
                crate::collaborator::Scope::All => "all".to_string(),
                crate::collaborator::Scope::Uncovered(ids) => format!("{} uncovered", ids.len()),
            };
            let coverage = round
                .coverage
                .map_or_else(|| "-".to_string(), |c| format!("{c:.1}%"));
            let notes = round
                .generation_error
                .as_deref()
                .or(round.execution_error.as_deref())
                .unwrap_or("");
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                round.iteration, scope, round.attempts, round.tests_added, coverage, notes
            );
        }
    }

    if !result.uncovered.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Uncovered Branches");
        let _ = writeln!(out);
        for branch in &result.uncovered {
            let _ = writeln!(out, "- `{}`: {}", branch.id, branch.describe());
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::engine::source_digest;

    fn failed_result() -> RunResult {
        let violation = crate::grammar::validate("def f(a):\n    for x in a:\n        return x\n")
            .unwrap_err();
        RunResult::assemble(
            Uuid::new_v4(),
            Verdict::Failed,
            &SynthConfig::default(),
            source_digest("x"),
            None,
            LoopState::new(5),
            Some(violation.into()),
            Utc::now(),
        )
    }

    #[test]
    fn test_failed_result_carries_violation() {
        let result = failed_result();
        assert!(!result.is_success());
        assert!(result.violation.is_some());
        assert!(result.error.as_deref().unwrap().contains("'for'"));
        assert!(result.test_source.is_empty());
        assert!(result.summary().starts_with("failed: syntax violation"));
    }

    #[test]
    fn test_unmeasured_map_reports_every_branch_uncovered() {
        let map = crate::analysis::analyze("def f(a):\n    if a:\n        return 1\n    return 0\n").unwrap();
        let result = RunResult::assemble(
            Uuid::new_v4(),
            Verdict::PartialSuccess,
            &SynthConfig::default(),
            source_digest("x"),
            Some(map),
            LoopState::new(1),
            None,
            Utc::now(),
        );
        assert_eq!(result.uncovered.len(), 2);
        assert_eq!(result.summary(), "partial success: 0.0% of 80.0% after 0 rounds");
    }

    #[test]
    fn test_json_rendering() {
        let json = to_json(&failed_result()).unwrap();
        assert!(json.contains("\"verdict\": \"failed\""));
        assert!(json.contains("\"violation\""));
        assert!(json.contains("\"source_sha256\""));
    }

    #[test]
    fn test_markdown_rendering() {
        let md = to_markdown(&failed_result());
        assert!(md.starts_with("# Coverage Synthesis Report"));
        assert!(md.contains("| Verdict | failed |"));
        assert!(md.contains("## Error"));
        assert!(!md.contains("## Rounds"));
    }

    #[test]
    fn test_source_digest_is_hex_sha256() {
        let digest = source_digest("");
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
