//! Phases, legal transitions and the per-run loop state.

use crate::collaborator::{Scope, TestArtifact};
use crate::coverage::{CoverageResult, Diagnostic};
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Target coverage reached
    Success,
    /// Iteration ceiling (or stagnation) reached below target
    PartialSuccess,
    /// Fatal error; see the run's error
    Failed,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial success",
            Self::Failed => "failed",
        })
    }
}

/// Position of a run in the synthesis loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Analyzed,
    GenerationRequested,
    Measured,
    Decided,
    OptimizationRequested,
    Terminal(Verdict),
}

impl Phase {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Analyzed => f.write_str("Analyzed"),
            Self::GenerationRequested => f.write_str("GenerationRequested"),
            Self::Measured => f.write_str("Measured"),
            Self::Decided => f.write_str("Decided"),
            Self::OptimizationRequested => f.write_str("OptimizationRequested"),
            Self::Terminal(verdict) => write!(f, "Terminal({verdict})"),
        }
    }
}

/// Legal edges of the phase graph:
///
/// ```text
/// Idle                  → Analyzed | Terminal(Failed)
/// Analyzed              → GenerationRequested
/// GenerationRequested   → Measured
/// Measured              → Decided | Terminal(Success | PartialSuccess)
/// Decided               → OptimizationRequested
/// OptimizationRequested → Measured
/// any non-terminal      → Terminal(Failed)
/// ```
#[must_use]
pub fn is_legal_transition(from: Phase, to: Phase) -> bool {
    use Phase::{Analyzed, Decided, GenerationRequested, Idle, Measured, OptimizationRequested, Terminal};

    if to == Terminal(Verdict::Failed) && !from.is_terminal() {
        return true;
    }
    matches!(
        (from, to),
        (Idle, Analyzed)
            | (Analyzed, GenerationRequested)
            | (GenerationRequested, Measured)
            | (Measured, Decided)
            | (Measured, Terminal(Verdict::Success | Verdict::PartialSuccess))
            | (Decided, OptimizationRequested)
            | (OptimizationRequested, Measured)
    )
}

/// Attempted move along an edge the phase graph does not have
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal phase transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: Phase,
    pub to: Phase,
}

/// Attempt to start a round past the iteration ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("iteration ceiling {ceiling} reached")]
pub struct CeilingReached {
    pub ceiling: u32,
}

/// One recorded phase change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: Phase,
    pub to: Phase,
    pub iteration: u32,
    pub elapsed_ms: u64,
}

/// Bookkeeping for one generation-and-measurement round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 0 for the initial round
    pub iteration: u32,
    pub scope: Scope,
    /// Generation attempts made, retries included
    pub attempts: u32,
    /// Final generation error if every attempt failed
    pub generation_error: Option<String>,
    /// Test functions added by this round
    pub tests_added: usize,
    /// Whether the suite was executed this round
    pub measured: bool,
    /// Coverage measured this round, if the measurement was usable
    pub coverage: Option<f64>,
    pub execution_error: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub duration_ms: u64,
}

impl RoundRecord {
    #[must_use]
    pub fn new(iteration: u32, scope: Scope) -> Self {
        Self {
            iteration,
            scope,
            attempts: 0,
            generation_error: None,
            tests_added: 0,
            measured: false,
            coverage: None,
            execution_error: None,
            diagnostics: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Whether the round ran without collaborator errors
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.generation_error.is_none() && self.execution_error.is_none()
    }
}

/// Mutable record threaded through one run.
///
/// Only the engine holds it. Artifacts can only be appended, the iteration
/// counter cannot pass the ceiling, and the verdict can be set once.
#[derive(Debug)]
pub struct LoopState {
    phase: Phase,
    iteration: u32,
    ceiling: u32,
    artifacts: Vec<TestArtifact>,
    latest: Option<CoverageResult>,
    history: Vec<RoundRecord>,
    transitions: Vec<TransitionRecord>,
    verdict: OnceCell<Verdict>,
    started: Instant,
}

impl LoopState {
    #[must_use]
    pub fn new(ceiling: u32) -> Self {
        Self {
            phase: Phase::Idle,
            iteration: 0,
            ceiling,
            artifacts: Vec::new(),
            latest: None,
            history: Vec::new(),
            transitions: Vec::new(),
            verdict: OnceCell::new(),
            started: Instant::now(),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn iteration(&self) -> u32 {
        self.iteration
    }

    #[must_use]
    pub const fn ceiling(&self) -> u32 {
        self.ceiling
    }

    #[must_use]
    pub fn artifacts(&self) -> &[TestArtifact] {
        &self.artifacts
    }

    #[must_use]
    pub const fn latest(&self) -> Option<&CoverageResult> {
        self.latest.as_ref()
    }

    #[must_use]
    pub fn history(&self) -> &[RoundRecord] {
        &self.history
    }

    #[must_use]
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    #[must_use]
    pub fn verdict(&self) -> Option<Verdict> {
        self.verdict.get().copied()
    }

    /// Coverage of the latest measurement, 0 before any
    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.latest.as_ref().map_or(0.0, |r| r.percentage)
    }

    /// Moves to `to`, setting the verdict when `to` is terminal
    pub(crate) fn advance(&mut self, to: Phase) -> Result<(), IllegalTransition> {
        let from = self.phase;
        if !is_legal_transition(from, to) {
            return Err(IllegalTransition { from, to });
        }
        if let Phase::Terminal(verdict) = to {
            if self.verdict.set(verdict).is_err() {
                return Err(IllegalTransition { from, to });
            }
        }
        tracing::debug!(from = %from, to = %to, iteration = self.iteration, "phase transition");
        self.transitions.push(TransitionRecord {
            from,
            to,
            iteration: self.iteration,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        });
        self.phase = to;
        Ok(())
    }

    /// Starts the next optimization round
    pub(crate) fn begin_round(&mut self) -> Result<u32, CeilingReached> {
        if self.iteration >= self.ceiling {
            return Err(CeilingReached {
                ceiling: self.ceiling,
            });
        }
        self.iteration += 1;
        Ok(self.iteration)
    }

    pub(crate) fn append(&mut self, artifact: TestArtifact) {
        self.artifacts.push(artifact);
    }

    /// Records a measurement.
    ///
    /// A usable result always replaces the previous one, including when it is
    /// lower. An unusable result only fills the slot when nothing has been
    /// measured yet, so a failed round keeps the coverage it started with.
    pub(crate) fn record_measurement(&mut self, result: CoverageResult) {
        match &self.latest {
            Some(previous) if !result.usable => {
                tracing::info!(
                    kept = previous.percentage,
                    "measurement unusable; keeping previous coverage"
                );
            }
            _ => self.latest = Some(result),
        }
    }

    pub(crate) fn push_round(&mut self, round: RoundRecord) {
        self.history.push(round);
    }

    /// Whether the last `window + 1` measured coverages lie within one
    /// point of each other
    #[must_use]
    pub fn is_stagnant(&self, window: u32) -> bool {
        let measured: Vec<f64> = self.history.iter().filter_map(|r| r.coverage).collect();
        let span = window as usize + 1;
        if window == 0 || measured.len() < span {
            return false;
        }
        let recent = &measured[measured.len() - span..];
        let high = recent.iter().copied().fold(f64::MIN, f64::max);
        let low = recent.iter().copied().fold(f64::MAX, f64::min);
        high - low < 1.0
    }

    pub(crate) fn into_parts(self) -> LoopParts {
        LoopParts {
            iteration: self.iteration,
            artifacts: self.artifacts,
            latest: self.latest,
            history: self.history,
            transitions: self.transitions,
        }
    }
}

pub(crate) struct LoopParts {
    pub iteration: u32,
    pub artifacts: Vec<TestArtifact>,
    pub latest: Option<CoverageResult>,
    pub history: Vec<RoundRecord>,
    pub transitions: Vec<TransitionRecord>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::coverage::{CoverageInterpreter, ExecutionReport};
    use crate::error::ExecutionError;

    #[test]
    fn test_legal_happy_path() {
        let mut state = LoopState::new(2);
        for to in [
            Phase::Analyzed,
            Phase::GenerationRequested,
            Phase::Measured,
            Phase::Decided,
            Phase::OptimizationRequested,
            Phase::Measured,
            Phase::Terminal(Verdict::Success),
        ] {
            state.advance(to).unwrap();
        }
        assert_eq!(state.verdict(), Some(Verdict::Success));
        assert_eq!(state.transitions().len(), 7);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut state = LoopState::new(1);
        let err = state.advance(Phase::Measured).unwrap_err();
        assert_eq!(err.from, Phase::Idle);
        assert!(state.advance(Phase::Terminal(Verdict::Success)).is_err());
        assert_eq!(state.phase(), Phase::Idle);
    }

    #[test]
    fn test_verdict_set_once() {
        let mut state = LoopState::new(1);
        state.advance(Phase::Terminal(Verdict::Failed)).unwrap();
        assert!(state.advance(Phase::Terminal(Verdict::Failed)).is_err());
        assert!(state.advance(Phase::Analyzed).is_err());
        assert_eq!(state.verdict(), Some(Verdict::Failed));
    }

    #[test]
    fn test_ceiling_enforced() {
        let mut state = LoopState::new(2);
        assert_eq!(state.begin_round().unwrap(), 1);
        assert_eq!(state.begin_round().unwrap(), 2);
        assert_eq!(state.begin_round().unwrap_err(), CeilingReached { ceiling: 2 });
        assert_eq!(state.iteration(), 2);
    }

    #[test]
    fn test_unusable_measurement_keeps_previous() {
        let map = analyze("def f(a):\n    if a:\n        return 1\n    return 0\n").unwrap();
        let interpreter = CoverageInterpreter::new(&map);
        let mut state = LoopState::new(3);

        state.record_measurement(interpreter.interpret(&Err(ExecutionError::crashed("boom"))));
        assert_eq!(state.percentage(), 0.0);
        assert!(!state.latest().unwrap().usable);

        let half = ExecutionReport::new(map.ids().take(1).cloned(), true);
        state.record_measurement(interpreter.interpret(&Ok(half)));
        assert_eq!(state.percentage(), 50.0);

        state.record_measurement(interpreter.interpret(&Err(ExecutionError::Timeout { seconds: 1 })));
        assert_eq!(state.percentage(), 50.0);

        let none = ExecutionReport::new([], false);
        state.record_measurement(interpreter.interpret(&Ok(none)));
        assert_eq!(state.percentage(), 0.0);
    }

    #[test]
    fn test_stagnation() {
        let mut state = LoopState::new(5);
        for (i, pct) in [40.0, 60.0, 60.5, 60.5].into_iter().enumerate() {
            let mut round = RoundRecord::new(i as u32, Scope::All);
            round.coverage = Some(pct);
            state.push_round(round);
        }
        assert!(state.is_stagnant(2));
        assert!(!state.is_stagnant(3));
        assert!(!state.is_stagnant(10));
    }

    #[test]
    fn test_dip_and_recovery_is_not_stagnation() {
        let mut state = LoopState::new(5);
        for (i, pct) in [60.0, 40.0, 60.0].into_iter().enumerate() {
            let mut round = RoundRecord::new(i as u32, Scope::All);
            round.coverage = Some(pct);
            state.push_round(round);
        }
        assert!(!state.is_stagnant(2));
        assert!(!state.is_stagnant(1));

        let mut round = RoundRecord::new(3, Scope::All);
        round.coverage = Some(60.4);
        state.push_round(round);
        assert!(state.is_stagnant(1));
        assert!(!state.is_stagnant(2));
    }
}
