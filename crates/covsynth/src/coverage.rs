//! Branch coverage interpretation.
//!
//! Reconciles what a test runner says it executed against the branch map.
//! The branch map is the only ground truth: ids the runner reports that the
//! map does not contain are dropped, and a runner failure produces a 0%
//! result with every branch uncovered.

use crate::analysis::{BranchId, BranchMap};
use crate::error::ExecutionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Raw outcome of running the accumulated suite
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Branch ids the runner saw executed
    pub executed: BTreeSet<BranchId>,
    /// Whether every test passed
    pub passed: bool,
    /// Tests collected and run
    pub tests_run: usize,
    /// Tests that failed or errored
    pub tests_failed: usize,
    /// Tail of the runner's output, for diagnostics
    pub output: String,
}

impl ExecutionReport {
    #[must_use]
    pub fn new(executed: impl IntoIterator<Item = BranchId>, passed: bool) -> Self {
        Self {
            executed: executed.into_iter().collect(),
            passed,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_counts(mut self, run: usize, failed: usize) -> Self {
        self.tests_run = run;
        self.tests_failed = failed;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }
}

/// Something worth reporting about a measurement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Runner hit its timeout
    Timeout { seconds: u64 },
    /// Runner or test process crashed
    Crashed { message: String },
    /// Generated test code could not be collected
    InvalidTestCode { message: String },
    /// Runner prerequisites missing
    Environment { message: String },
    /// Coverage data missing or malformed
    InvalidReport { message: String },
    /// Suite ran but some tests failed
    TestsFailed { failed: usize, run: usize },
    /// Runner reported an id the branch map does not know
    UnknownBranch { id: String },
    /// No measurement was taken this round
    NotMeasured { reason: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { seconds } => write!(f, "execution timed out after {seconds}s"),
            Self::Crashed { message } => write!(f, "runner crashed: {message}"),
            Self::InvalidTestCode { message } => write!(f, "invalid test code: {message}"),
            Self::Environment { message } => write!(f, "environment: {message}"),
            Self::InvalidReport { message } => write!(f, "invalid coverage report: {message}"),
            Self::TestsFailed { failed, run } => write!(f, "{failed} of {run} test(s) failed"),
            Self::UnknownBranch { id } => write!(f, "unknown branch id {id} ignored"),
            Self::NotMeasured { reason } => write!(f, "not measured: {reason}"),
        }
    }
}

impl From<&ExecutionError> for Diagnostic {
    fn from(err: &ExecutionError) -> Self {
        match err {
            ExecutionError::Timeout { seconds } => Self::Timeout { seconds: *seconds },
            ExecutionError::Crashed { message } => Self::Crashed {
                message: message.clone(),
            },
            ExecutionError::InvalidTestCode { message } => Self::InvalidTestCode {
                message: message.clone(),
            },
            ExecutionError::Environment { message } => Self::Environment {
                message: message.clone(),
            },
            ExecutionError::InvalidReport { message } => Self::InvalidReport {
                message: message.clone(),
            },
            ExecutionError::Io(e) => Self::Crashed {
                message: e.to_string(),
            },
        }
    }
}

/// Branch coverage of the accumulated suite at one point in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageResult {
    /// Covered share of branches, 0..=100, one decimal
    pub percentage: f64,
    /// Covered ids in map order
    pub covered: Vec<BranchId>,
    /// Uncovered ids in map order
    pub uncovered: Vec<BranchId>,
    /// Whether the suite passed
    pub passed: bool,
    /// False when the runner failed and this result carries no data
    pub usable: bool,
    pub tests_run: usize,
    pub tests_failed: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl CoverageResult {
    /// 0% result for a round where nothing could be measured
    #[must_use]
    pub fn unmeasured(map: &BranchMap, reason: impl Into<String>) -> Self {
        Self {
            percentage: 0.0,
            covered: Vec::new(),
            uncovered: map.ids().cloned().collect(),
            passed: false,
            usable: false,
            tests_run: 0,
            tests_failed: 0,
            diagnostics: vec![Diagnostic::NotMeasured {
                reason: reason.into(),
            }],
        }
    }

    /// Whether the exact covered share reaches `target`.
    ///
    /// Compares the unrounded ratio, so 1999 of 2000 branches does not meet
    /// a 100% target even though `percentage` displays as 99.9.
    #[must_use]
    pub fn meets_target(&self, target: f64) -> bool {
        let total = self.covered.len() + self.uncovered.len();
        if total == 0 {
            return self.percentage >= target;
        }
        exact_percentage(self.covered.len(), total) >= target
    }

    /// Whether every branch is covered
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.uncovered.is_empty() && self.usable
    }
}

/// Rounds to one decimal place
#[must_use]
pub fn round_percentage(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn exact_percentage(covered: usize, total: usize) -> f64 {
    covered as f64 * 100.0 / total as f64
}

/// Maximum displayed percentage while any branch is uncovered
const BELOW_FULL: f64 = 99.9;

/// Computes [`CoverageResult`]s against one branch map
#[derive(Debug, Clone, Copy)]
pub struct CoverageInterpreter<'m> {
    map: &'m BranchMap,
}

impl<'m> CoverageInterpreter<'m> {
    #[must_use]
    pub const fn new(map: &'m BranchMap) -> Self {
        Self { map }
    }

    /// Interprets a runner outcome
    #[must_use]
    pub fn interpret(&self, outcome: &Result<ExecutionReport, ExecutionError>) -> CoverageResult {
        match outcome {
            Ok(report) => self.from_report(report),
            Err(err) => self.from_error(err),
        }
    }

    fn from_report(&self, report: &ExecutionReport) -> CoverageResult {
        let mut diagnostics = Vec::new();
        for id in report.executed.iter().filter(|id| !self.map.contains(id)) {
            tracing::warn!(branch = %id, "runner reported a branch the map does not contain; ignoring");
            diagnostics.push(Diagnostic::UnknownBranch { id: id.to_string() });
        }
        if !report.passed {
            diagnostics.push(Diagnostic::TestsFailed {
                failed: report.tests_failed,
                run: report.tests_run,
            });
        }

        let (covered, uncovered): (Vec<BranchId>, Vec<BranchId>) = self
            .map
            .ids()
            .cloned()
            .partition(|id| report.executed.contains(id));

        let total = self.map.total_branches();
        let percentage = if total == 0 {
            if report.passed {
                100.0
            } else {
                0.0
            }
        } else if uncovered.is_empty() {
            100.0
        } else {
            round_percentage(exact_percentage(covered.len(), total)).min(BELOW_FULL)
        };

        CoverageResult {
            percentage,
            covered,
            uncovered,
            passed: report.passed,
            usable: true,
            tests_run: report.tests_run,
            tests_failed: report.tests_failed,
            diagnostics,
        }
    }

    fn from_error(&self, err: &ExecutionError) -> CoverageResult {
        tracing::warn!(error = %err, "test execution failed; recording 0% for this round");
        CoverageResult {
            percentage: 0.0,
            covered: Vec::new(),
            uncovered: self.map.ids().cloned().collect(),
            passed: false,
            usable: false,
            tests_run: 0,
            tests_failed: 0,
            diagnostics: vec![Diagnostic::from(err)],
        }
    }
}
