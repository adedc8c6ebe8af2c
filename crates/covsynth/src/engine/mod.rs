//! The coverage-driven synthesis loop.
//!
//! One call to [`Engine::run`] drives a source file through
//! `Idle → Analyzed → GenerationRequested → Measured → Decided →
//! (OptimizationRequested → Measured)* → Terminal`. Each phase is a method
//! returning the next phase; [`LoopState::advance`] rejects any edge the
//! phase graph does not contain.
//!
//! Grammar and analysis errors end the run in `Terminal(Failed)` before any
//! generation. Collaborator errors are written into the round's
//! [`RoundRecord`] and the loop carries on with the coverage it had.

mod state;

pub use state::{
    is_legal_transition, CeilingReached, IllegalTransition, LoopState, Phase, RoundRecord,
    TransitionRecord, Verdict,
};

use crate::analysis::{self, BranchMap};
use crate::collaborator::{
    count_tests, join_suite, GenerationRequest, Scope, TestArtifact, TestExecutor, TestGenerator,
};
use crate::config::SynthConfig;
use crate::coverage::{CoverageInterpreter, CoverageResult, Diagnostic};
use crate::error::{AnalysisError, ExecutionError, GenerationError, SynthError, SynthResult};
use crate::report::RunResult;
use sha2::{Digest, Sha256};
use std::time::Instant;
use uuid::Uuid;

/// Runs the synthesis loop with a generator and an executor
#[derive(Debug)]
pub struct Engine<G, E> {
    config: SynthConfig,
    generator: G,
    executor: E,
}

impl<G: TestGenerator, E: TestExecutor> Engine<G, E> {
    /// Creates an engine; the configuration is validated here
    pub fn new(config: SynthConfig, generator: G, executor: E) -> SynthResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            generator,
            executor,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SynthConfig {
        &self.config
    }

    #[must_use]
    pub const fn generator(&self) -> &G {
        &self.generator
    }

    #[must_use]
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// Drives `source` to a terminal verdict
    pub fn run(&mut self, source: &str) -> RunResult {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id);
        let _entered = span.enter();
        tracing::info!(
            target = self.config.target_coverage,
            ceiling = self.config.max_iterations,
            "starting synthesis run"
        );

        let mut run = Run {
            config: &self.config,
            generator: &mut self.generator,
            executor: &mut self.executor,
            source,
            map: None,
            state: LoopState::new(self.config.max_iterations),
            pending: None,
            failure: None,
        };
        let started_at = chrono::Utc::now();
        let verdict = run.drive();
        let Run {
            map,
            state,
            failure,
            ..
        } = run;

        let result = RunResult::assemble(
            run_id,
            verdict,
            &self.config,
            source_digest(source),
            map,
            state,
            failure,
            started_at,
        );
        tracing::info!(
            verdict = %result.verdict,
            coverage = result.coverage,
            iterations = result.iterations,
            "run finished"
        );
        result
    }

    pub fn into_parts(self) -> (G, E) {
        (self.generator, self.executor)
    }
}

/// Hex SHA-256 of a source text
#[must_use]
pub fn source_digest(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

struct Run<'e, G, E> {
    config: &'e SynthConfig,
    generator: &'e mut G,
    executor: &'e mut E,
    source: &'e str,
    map: Option<BranchMap>,
    state: LoopState,
    pending: Option<PendingRound>,
    failure: Option<SynthError>,
}

/// A round whose generation has finished but which has not been measured
struct PendingRound {
    record: RoundRecord,
    artifact_added: bool,
    started: Instant,
}

impl<G: TestGenerator, E: TestExecutor> Run<'_, G, E> {
    fn drive(&mut self) -> Verdict {
        loop {
            let next = match self.state.phase() {
                Phase::Idle => self.analyze(),
                Phase::Analyzed => self.request(Scope::All),
                Phase::GenerationRequested | Phase::OptimizationRequested => self.measure(),
                Phase::Measured => self.decide(),
                Phase::Decided => self.optimize(),
                Phase::Terminal(verdict) => return verdict,
            };
            if let Err(err) = self.state.advance(next) {
                tracing::error!(error = %err, "aborting run");
                self.fail(err.into());
                if self.state.advance(Phase::Terminal(Verdict::Failed)).is_err() {
                    return Verdict::Failed;
                }
            }
        }
    }

    fn fail(&mut self, err: SynthError) -> Phase {
        if self.failure.is_none() {
            self.failure = Some(err);
        }
        Phase::Terminal(Verdict::Failed)
    }

    fn analyze(&mut self) -> Phase {
        match analysis::analyze(self.source) {
            Ok(map) => {
                tracing::info!(
                    functions = map.functions().len(),
                    branches = map.total_branches(),
                    "source analyzed"
                );
                self.map = Some(map);
                Phase::Analyzed
            }
            Err(err) => {
                tracing::error!(error = %err, "source rejected; no tests will be generated");
                self.fail(err)
            }
        }
    }

    fn request(&mut self, scope: Scope) -> Phase {
        let Some(map) = self.map.as_ref() else {
            return self.fail(AnalysisError::missing("branch map", "run").into());
        };
        let iteration = self.state.iteration();
        let started = Instant::now();
        let mut record = RoundRecord::new(iteration, scope.clone());
        let prior = (!self.state.artifacts().is_empty()).then(|| join_suite(self.state.artifacts()));
        let timeout = self.config.generation_timeout();

        let generator = &mut *self.generator;
        let source = self.source;
        let attempted = self.config.retry.run(
            |attempt| {
                let request = GenerationRequest {
                    branch_map: map,
                    source,
                    scope: &scope,
                    prior_tests: prior.as_deref(),
                    iteration,
                    attempt,
                    timeout,
                };
                let began = Instant::now();
                let generated = generator.generate(&request)?;
                if began.elapsed() > timeout {
                    return Err(GenerationError::Timeout {
                        seconds: timeout.as_secs(),
                    });
                }
                if generated.code.trim().is_empty() {
                    return Err(GenerationError::EmptyOutput);
                }
                Ok(generated)
            },
            GenerationError::is_retryable,
        );
        record.attempts = attempted.attempts;

        let artifact_added = match attempted.result {
            Ok(generated) => {
                record.tests_added = count_tests(&generated.code);
                tracing::info!(
                    iteration,
                    attempts = record.attempts,
                    tests = record.tests_added,
                    "test code generated"
                );
                let targets = scope.targets(map);
                self.state.append(TestArtifact {
                    iteration,
                    targets,
                    code: generated.code,
                });
                true
            }
            Err(err) => {
                tracing::warn!(iteration, attempts = record.attempts, error = %err, "generation failed; round skipped");
                record.generation_error = Some(err.to_string());
                false
            }
        };

        self.pending = Some(PendingRound {
            record,
            artifact_added,
            started,
        });
        if iteration == 0 {
            Phase::GenerationRequested
        } else {
            Phase::OptimizationRequested
        }
    }

    fn measure(&mut self) -> Phase {
        let Some(map) = self.map.as_ref() else {
            return self.fail(AnalysisError::missing("branch map", "run").into());
        };
        let Some(PendingRound {
            mut record,
            artifact_added,
            started,
        }) = self.pending.take()
        else {
            return self.fail(AnalysisError::missing("pending round", "measurement").into());
        };

        if artifact_added {
            let suite = join_suite(self.state.artifacts());
            let timeout = self.config.execution_timeout();
            let began = Instant::now();
            let mut outcome = self.executor.run(self.source, &suite, timeout);
            if outcome.is_ok() && began.elapsed() > timeout {
                outcome = Err(ExecutionError::Timeout {
                    seconds: timeout.as_secs(),
                });
            }
            let result = CoverageInterpreter::new(map).interpret(&outcome);

            record.measured = true;
            record.execution_error = outcome.as_ref().err().map(ToString::to_string);
            record.coverage = result.usable.then_some(result.percentage);
            record.diagnostics = result.diagnostics.clone();
            tracing::info!(
                iteration = record.iteration,
                coverage = result.percentage,
                uncovered = result.uncovered.len(),
                usable = result.usable,
                "suite measured"
            );
            self.state.record_measurement(result);
        } else {
            let reason = "no new test code this round";
            record.diagnostics.push(Diagnostic::NotMeasured {
                reason: reason.to_string(),
            });
            if self.state.latest().is_none() {
                self.state
                    .record_measurement(CoverageResult::unmeasured(map, reason));
            }
        }

        record.duration_ms = started.elapsed().as_millis() as u64;
        self.state.push_round(record);
        Phase::Measured
    }

    fn decide(&mut self) -> Phase {
        let percentage = self.state.percentage();
        let target = self.config.target_coverage;
        if self.state.latest().is_some_and(|m| m.meets_target(target)) {
            tracing::info!(percentage, target, "target reached");
            return Phase::Terminal(Verdict::Success);
        }
        if self.state.iteration() >= self.state.ceiling() {
            tracing::info!(
                percentage,
                target,
                ceiling = self.state.ceiling(),
                "iteration ceiling reached below target"
            );
            return Phase::Terminal(Verdict::PartialSuccess);
        }
        if let Some(window) = self.config.stagnation_window {
            if self.state.is_stagnant(window) {
                tracing::info!(percentage, window, "coverage stagnated; stopping early");
                return Phase::Terminal(Verdict::PartialSuccess);
            }
        }
        Phase::Decided
    }

    fn optimize(&mut self) -> Phase {
        if let Err(err) = self.state.begin_round() {
            return self.fail(err.into());
        }
        let uncovered = self
            .state
            .latest()
            .map(|r| r.uncovered.clone())
            .unwrap_or_default();
        let scope = if uncovered.is_empty() {
            Scope::All
        } else {
            Scope::Uncovered(uncovered)
        };
        tracing::debug!(iteration = self.state.iteration(), "requesting optimization round");
        self.request(scope)
    }
}
