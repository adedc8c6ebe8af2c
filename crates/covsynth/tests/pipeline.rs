//! End-to-end runs of the synthesis loop over fixture sources, with
//! in-memory collaborators standing in for the model and the test runner.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use covsynth::report::{to_json, to_markdown};
use covsynth::{
    BranchId, Engine, ExecutionError, ExecutionReport, GeneratedTests, GenerationError,
    GenerationRequest, RetryPolicy, Scope, SynthConfig, TestExecutor, TestGenerator, Verdict,
};
use std::time::Duration;

const CALCULATOR: &str = include_str!("fixtures/calculator.py");
const LOAN_SCORING: &str = include_str!("fixtures/loan_scoring.py");

/// Covers a share of whatever it is asked to target, rounding up
struct FractionGenerator {
    numerator: usize,
    denominator: usize,
    calls: usize,
}

impl FractionGenerator {
    fn half() -> Self {
        Self {
            numerator: 1,
            denominator: 2,
            calls: 0,
        }
    }

    fn none() -> Self {
        Self {
            numerator: 0,
            denominator: 1,
            calls: 0,
        }
    }
}

impl TestGenerator for FractionGenerator {
    fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<GeneratedTests, GenerationError> {
        self.calls += 1;
        let targets = request.scope.targets(request.branch_map);
        let share = (targets.len() * self.numerator).div_ceil(self.denominator);
        let mut code = format!("def test_round_{}():\n", request.iteration);
        for id in targets.iter().take(share) {
            code.push_str(&format!("    # covers {id}\n"));
        }
        code.push_str("    assert True\n");
        Ok(GeneratedTests::new(code))
    }
}

/// Reports every branch named in a `# covers <id>` comment
struct MarkerExecutor;

impl TestExecutor for MarkerExecutor {
    fn run(
        &mut self,
        _source: &str,
        tests: &str,
        _timeout: Duration,
    ) -> Result<ExecutionReport, ExecutionError> {
        let executed = tests
            .lines()
            .filter_map(|line| line.trim().strip_prefix("# covers "))
            .filter_map(|id| id.parse::<BranchId>().ok());
        let run = tests.matches("def test_").count();
        Ok(ExecutionReport::new(executed, true).with_counts(run, 0))
    }
}

fn config(target: f64, ceiling: u32) -> SynthConfig {
    SynthConfig::new()
        .with_target_coverage(target)
        .with_max_iterations(ceiling)
        .with_retry(RetryPolicy::none())
}

#[test]
fn calculator_reaches_default_target_in_one_optimization() {
    let mut engine = Engine::new(SynthConfig::default(), FractionGenerator::half(), MarkerExecutor).unwrap();
    let result = engine.run(CALCULATOR);

    assert_eq!(result.verdict, Verdict::Success);
    assert_eq!(result.branch_map.as_ref().unwrap().total_branches(), 10);
    let coverages: Vec<Option<f64>> = result.history.iter().map(|r| r.coverage).collect();
    assert_eq!(coverages, vec![Some(50.0), Some(80.0)]);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.uncovered.len(), 2);
}

#[test]
fn loan_scoring_stops_at_ceiling_below_full_coverage() {
    let mut engine = Engine::new(config(100.0, 2), FractionGenerator::half(), MarkerExecutor).unwrap();
    let result = engine.run(LOAN_SCORING);

    assert_eq!(result.verdict, Verdict::PartialSuccess);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.coverage, 92.9);
    assert_eq!(result.uncovered.len(), 1);
    assert_eq!(result.artifacts.len(), 3);
    assert_eq!(result.tests_run, 3);
}

#[test]
fn generator_calls_never_exceed_ceiling_plus_one() {
    for ceiling in 1..=5 {
        let mut engine = Engine::new(config(80.0, ceiling), FractionGenerator::none(), MarkerExecutor).unwrap();
        let result = engine.run(CALCULATOR);
        assert_eq!(result.verdict, Verdict::PartialSuccess);
        assert_eq!(result.iterations, ceiling);
        let (generator, _) = engine.into_parts();
        assert_eq!(generator.calls, ceiling as usize + 1);
    }
}

#[test]
fn artifacts_accumulate_in_round_order() {
    let mut engine = Engine::new(config(100.0, 4), FractionGenerator::half(), MarkerExecutor).unwrap();
    let result = engine.run(LOAN_SCORING);

    let rounds: Vec<u32> = result.artifacts.iter().map(|a| a.iteration).collect();
    assert!(rounds.windows(2).all(|w| w[0] < w[1]));
    let mut offset = 0;
    for artifact in &result.artifacts {
        let at = result.test_source[offset..].find(artifact.code.trim_end()).unwrap();
        offset += at + artifact.code.trim_end().len();
    }
    assert!(result.history.iter().all(|r| r.is_clean()));
}

#[test]
fn optimization_rounds_target_only_uncovered_branches() {
    let mut engine = Engine::new(config(100.0, 3), FractionGenerator::half(), MarkerExecutor).unwrap();
    let result = engine.run(CALCULATOR);

    for pair in result.history.windows(2) {
        let Scope::Uncovered(targets) = &pair[1].scope else {
            panic!("optimization round asked for the whole map");
        };
        assert!(!targets.is_empty());
    }
    assert_eq!(result.history[0].scope, Scope::All);
}

#[test]
fn unsupported_constructs_fail_before_generation() {
    let sources = [
        "def f(xs):\n    for x in xs:\n        return x\n",
        "def f(n):\n    while n:\n        n = n - 1\n    return n\n",
        "class A:\n    pass\n",
        "def f(a):\n    if a:\n        return 1\n    elif a:\n        return 2\n    return 3\n",
        "import os\n",
        "def f(a):\n    return a.b\n",
        "def f(a):\n    return 'x'\n",
        "def f(a, b):\n    if a and b:\n        return 1\n    return 0\n",
    ];
    for source in sources {
        let mut engine = Engine::new(SynthConfig::default(), FractionGenerator::half(), MarkerExecutor).unwrap();
        let result = engine.run(source);
        assert_eq!(result.verdict, Verdict::Failed, "{source}");
        assert!(result.violation.is_some(), "{source}");
        assert_eq!(engine.into_parts().0.calls, 0, "{source}");
    }
}

#[test]
fn boxed_collaborators_drive_the_loop() {
    let generator: Box<dyn TestGenerator> = Box::new(FractionGenerator::half());
    let executor: Box<dyn TestExecutor> = Box::new(MarkerExecutor);
    let mut engine = Engine::new(SynthConfig::default(), generator, executor).unwrap();
    assert_eq!(engine.run(CALCULATOR).verdict, Verdict::Success);
}

#[test]
fn reports_render_a_finished_run() {
    let mut engine = Engine::new(config(100.0, 1), FractionGenerator::half(), MarkerExecutor).unwrap();
    let result = engine.run(CALCULATOR);

    let json = to_json(&result).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["verdict"], "partial_success");
    assert_eq!(value["iterations"], 1);
    assert_eq!(value["history"].as_array().unwrap().len(), 2);
    assert!(value["uncovered"][0]["id"].as_str().unwrap().contains(':'));

    let markdown = to_markdown(&result);
    assert!(markdown.contains("| Verdict | partial success |"));
    assert!(markdown.contains("## Rounds"));
    assert!(markdown.contains("## Uncovered Branches"));
}
