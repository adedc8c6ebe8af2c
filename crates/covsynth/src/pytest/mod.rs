//! Test execution with pytest and coverage.py.
//!
//! Each run gets a fresh temporary directory holding `<module>.py` and
//! `test_generated.py`, then invokes
//! `python -m pytest test_generated.py --cov=<module> --cov-branch --cov-report=json:coverage.json`.
//! The child is killed if it outlives the timeout.

pub mod coverage_json;

use crate::analysis::{analyze, BranchMap};
use crate::collaborator::TestExecutor;
use crate::coverage::ExecutionReport;
use crate::error::ExecutionError;
use coverage_json::CoverageJson;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::runtime::Runtime;

/// File name the generated suite is written to
pub const TEST_FILE: &str = "test_generated.py";

const REPORT_FILE: &str = "coverage.json";

static MODULE_NAME: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$"));

static SUMMARY_COUNT: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(\d+) (passed|failed|errors?)\b"));

/// Checks that `name` can be used as a Python module name
pub fn validate_module_name(name: &str) -> Result<(), ExecutionError> {
    let valid = MODULE_NAME
        .as_ref()
        .map(|re| re.is_match(name))
        .unwrap_or(false);
    if valid && name != TEST_FILE.trim_end_matches(".py") {
        Ok(())
    } else {
        Err(ExecutionError::environment(format!(
            "invalid module name '{name}': must be a Python identifier"
        )))
    }
}

/// Passed and failed counts from pytest's summary line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestCounts {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
}

impl TestCounts {
    /// Reads the last summary line of pytest output, e.g.
    /// `==== 1 failed, 3 passed in 0.12s ====`
    #[must_use]
    pub fn parse(output: &str) -> Self {
        let mut counts = Self::default();
        let Ok(re) = SUMMARY_COUNT.as_ref() else {
            return counts;
        };
        let Some(line) = output
            .lines()
            .rev()
            .find(|line| line.contains(" in ") && re.is_match(line))
        else {
            return counts;
        };
        for caps in re.captures_iter(line) {
            let n: usize = caps[1].parse().unwrap_or(0);
            match &caps[2] {
                "passed" => counts.passed += n,
                "failed" => counts.failed += n,
                _ => counts.errors += n,
            }
        }
        counts
    }

    #[must_use]
    pub const fn run(&self) -> usize {
        self.passed + self.failed + self.errors
    }
}

/// Runs generated suites under pytest with branch coverage
#[derive(Debug)]
pub struct PytestExecutor {
    python: PathBuf,
    module: String,
    runtime: Runtime,
    cached: Option<(String, BranchMap)>,
}

impl PytestExecutor {
    /// Executor importing the source as `module`, run with `python`
    pub fn new(python: impl Into<PathBuf>, module: impl Into<String>) -> Result<Self, ExecutionError> {
        let module = module.into();
        validate_module_name(&module)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            python: python.into(),
            module,
            runtime,
            cached: None,
        })
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    #[must_use]
    pub fn python(&self) -> &Path {
        &self.python
    }

    fn branch_map(&mut self, source: &str) -> Result<&BranchMap, ExecutionError> {
        let stale = self.cached.as_ref().map_or(true, |(s, _)| s != source);
        if stale {
            let map = analyze(source)
                .map_err(|e| ExecutionError::environment(format!("source rejected: {e}")))?;
            self.cached = Some((source.to_string(), map));
        }
        match &self.cached {
            Some((_, map)) => Ok(map),
            None => Err(ExecutionError::environment("branch map unavailable")),
        }
    }

    fn spawn(&self, dir: &Path, timeout: Duration) -> Result<Output, ExecutionError> {
        let mut command = tokio::process::Command::new(&self.python);
        command
            .args(["-m", "pytest", TEST_FILE])
            .arg(format!("--cov={}", self.module))
            .args(["--cov-branch", "--cov-report"])
            .arg(format!("json:{REPORT_FILE}"))
            .args(["-p", "no:cacheprovider"])
            .current_dir(dir)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        self.runtime.block_on(async {
            let child = command.spawn().map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ExecutionError::environment(format!(
                    "python interpreter '{}' not found",
                    self.python.display()
                )),
                _ => ExecutionError::Io(e),
            })?;
            // Dropping the wait future on timeout kills the child.
            tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| ExecutionError::Timeout {
                    seconds: timeout.as_secs(),
                })?
                .map_err(ExecutionError::Io)
        })
    }
}

impl TestExecutor for PytestExecutor {
    fn run(
        &mut self,
        source: &str,
        tests: &str,
        timeout: Duration,
    ) -> Result<ExecutionReport, ExecutionError> {
        let dir = tempfile::Builder::new().prefix("covsynth-").tempdir()?;
        std::fs::write(dir.path().join(format!("{}.py", self.module)), source)?;
        std::fs::write(dir.path().join(TEST_FILE), tests)?;

        tracing::debug!(dir = %dir.path().display(), module = %self.module, "running pytest");
        let output = self.spawn(dir.path(), timeout)?;
        let text = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let passed = classify_exit(output.status.code(), &text)?;
        let counts = TestCounts::parse(&text);

        let report = std::fs::read_to_string(dir.path().join(REPORT_FILE))
            .map_err(|e| ExecutionError::invalid_report(format!("{REPORT_FILE} not written: {e}")))?;
        let report = CoverageJson::parse(&report)?;
        let module = self.module.clone();
        let map = self.branch_map(source)?;
        let executed = report
            .file(&module)
            .map(|file| coverage_json::executed_branches(map, file))
            .unwrap_or_default();

        tracing::debug!(
            executed = executed.len(),
            passed = counts.passed,
            failed = counts.failed,
            "pytest finished"
        );
        Ok(ExecutionReport::new(executed, passed)
            .with_counts(counts.run(), counts.failed + counts.errors)
            .with_output(text))
    }
}

/// Maps a pytest exit code to "suite passed" or an execution error.
///
/// 0 all passed, 1 some failed, 2 interrupted (collection errors),
/// 3 internal error, 4 usage error, 5 no tests collected.
fn classify_exit(code: Option<i32>, output: &str) -> Result<bool, ExecutionError> {
    if output.contains("No module named pytest") {
        return Err(ExecutionError::environment("pytest is not installed"));
    }
    if output.contains("unrecognized arguments: --cov") {
        return Err(ExecutionError::environment("pytest-cov is not installed"));
    }
    match code {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        Some(2) => Err(ExecutionError::InvalidTestCode {
            message: first_error(output),
        }),
        Some(5) => Err(ExecutionError::InvalidTestCode {
            message: "no tests were collected".to_string(),
        }),
        Some(code) => Err(ExecutionError::crashed(format!(
            "pytest exited with status {code}: {}",
            first_error(output)
        ))),
        None => Err(ExecutionError::crashed("pytest was terminated by a signal")),
    }
}

fn first_error(output: &str) -> String {
    output
        .lines()
        .find(|line| line.starts_with("E ") || line.starts_with("ERROR"))
        .unwrap_or("see pytest output")
        .trim()
        .to_string()
}
