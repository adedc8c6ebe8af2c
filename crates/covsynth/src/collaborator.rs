//! Interfaces to the two external collaborators.
//!
//! The engine treats both as blocking calls. Implementations enforce their
//! own timeouts; the engine also checks elapsed time after each call and
//! treats an overrun as a timeout.

use crate::analysis::{BranchId, BranchMap};
use crate::coverage::ExecutionReport;
use crate::error::{ExecutionError, GenerationError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Branches a generation request should target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "branches", rename_all = "snake_case")]
pub enum Scope {
    /// The whole branch map (initial generation)
    All,
    /// Only these branches (optimization rounds)
    Uncovered(Vec<BranchId>),
}

impl Scope {
    /// Branch ids this scope asks for
    #[must_use]
    pub fn targets(&self, map: &BranchMap) -> Vec<BranchId> {
        match self {
            Self::All => map.ids().cloned().collect(),
            Self::Uncovered(ids) => ids.clone(),
        }
    }
}

/// Everything a generator needs for one request
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub branch_map: &'a BranchMap,
    pub source: &'a str,
    pub scope: &'a Scope,
    /// Accumulated suite so far, for optimization rounds
    pub prior_tests: Option<&'a str>,
    /// 0 for the initial request, then 1..=ceiling
    pub iteration: u32,
    /// 1-based retry attempt
    pub attempt: u32,
    pub timeout: Duration,
}

/// Test source returned by a generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedTests {
    pub code: String,
}

impl GeneratedTests {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// Produces test source for a branch map
pub trait TestGenerator {
    /// Generates tests; must be safe to call again with the same request
    fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<GeneratedTests, GenerationError>;
}

/// Runs a test suite against the source and reports executed branches
pub trait TestExecutor {
    /// Runs `tests` against `source`, giving up after `timeout`
    fn run(
        &mut self,
        source: &str,
        tests: &str,
        timeout: Duration,
    ) -> Result<ExecutionReport, ExecutionError>;
}

impl<G: TestGenerator + ?Sized> TestGenerator for Box<G> {
    fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<GeneratedTests, GenerationError> {
        (**self).generate(request)
    }
}

impl<E: TestExecutor + ?Sized> TestExecutor for Box<E> {
    fn run(
        &mut self,
        source: &str,
        tests: &str,
        timeout: Duration,
    ) -> Result<ExecutionReport, ExecutionError> {
        (**self).run(source, tests, timeout)
    }
}

/// Test code added to the suite in one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestArtifact {
    /// 0 for the initial generation, then the optimization round
    pub iteration: u32,
    /// Branches the artifact was asked to cover
    pub targets: Vec<BranchId>,
    pub code: String,
}

impl TestArtifact {
    /// Number of test functions in the artifact
    #[must_use]
    pub fn test_count(&self) -> usize {
        count_tests(&self.code)
    }
}

/// Counts `def test_*` definitions
#[must_use]
pub fn count_tests(code: &str) -> usize {
    code.lines()
        .filter(|line| line.trim_start().starts_with("def test_"))
        .count()
}

/// Concatenates artifacts into one suite, oldest first
#[must_use]
pub fn join_suite(artifacts: &[TestArtifact]) -> String {
    let mut suite = artifacts
        .iter()
        .map(|a| a.code.trim_end())
        .collect::<Vec<_>>()
        .join("\n\n\n");
    if !artifacts.is_empty() {
        suite.push('\n');
    }
    suite
}
