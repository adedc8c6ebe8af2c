//! covsynth: coverage-driven unit test synthesis.
//!
//! Takes a source file written in a restricted, indentation-sensitive
//! subset of Python, enumerates every two-way decision point in it, and
//! drives a generate → execute → measure → refine loop until branch
//! coverage reaches a target or an iteration ceiling is hit.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────────────────────────────┐
//! │ grammar  │──►│ analysis  │──►│ engine (phase machine, LoopState) │
//! │ validate │   │ BranchMap │   │                                   │
//! └──────────┘   └───────────┘   │   TestGenerator ──► TestExecutor  │
//!                                │        ▲                 │        │
//!                                │        └── coverage ◄────┘        │
//!                                └───────────────────────────────────┘
//! ```
//!
//! The core is synchronous and owns no I/O. Generation and execution are
//! collaborator traits; the `llm` and `pytest` features provide concrete
//! implementations.
//!
//! # Example
//!
//! ```
//! let map = covsynth::analyze("def f(a, b):\n    if a > b:\n        return a\n    return b\n")?;
//! assert_eq!(map.total_branches(), 2);
//! assert_eq!(map.ids().next().map(ToString::to_string).as_deref(), Some("f:0:true"));
//! # Ok::<(), covsynth::SynthError>(())
//! ```

pub mod analysis;
pub mod collaborator;
pub mod config;
pub mod coverage;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod report;
pub mod retry;

/// OpenAI-compatible test generator
#[cfg(feature = "llm")]
pub mod llm;

/// pytest + coverage.py test executor
#[cfg(feature = "pytest")]
pub mod pytest;

pub use analysis::{analyze, Branch, BranchId, BranchMap, Function, Outcome};
pub use collaborator::{
    GeneratedTests, GenerationRequest, Scope, TestArtifact, TestExecutor, TestGenerator,
};
pub use config::SynthConfig;
pub use coverage::{CoverageInterpreter, CoverageResult, Diagnostic, ExecutionReport};
pub use engine::{Engine, Phase, Verdict};
pub use error::{
    AnalysisError, ConfigError, ExecutionError, GenerationError, GrammarViolation, SynthError,
    SynthResult,
};
pub use grammar::{grammar, validate};
pub use report::RunResult;
pub use retry::RetryPolicy;
