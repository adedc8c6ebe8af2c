//! Result and error types for covsynth.
//!
//! Two of the kinds are fatal to a run (`GrammarViolation`, `AnalysisError`).
//! The collaborator errors (`GenerationError`, `ExecutionError`) are absorbed
//! into the round history by the engine and never abort a run.

use thiserror::Error;

/// Result type for covsynth operations
pub type SynthResult<T> = Result<T, SynthError>;

/// Top-level error for covsynth
#[derive(Debug, Error)]
pub enum SynthError {
    /// Source is outside the supported subset
    #[error(transparent)]
    Grammar(#[from] GrammarViolation),

    /// Parse tree did not have the shape the extractor expects
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// Generation collaborator failed
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Execution collaborator failed
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Serialization failure while rendering a report
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Engine attempted a phase change the loop does not allow
    #[error(transparent)]
    Transition(#[from] crate::engine::IllegalTransition),

    /// Engine attempted a round past the iteration ceiling
    #[error(transparent)]
    Ceiling(#[from] crate::engine::CeilingReached),
}

impl SynthError {
    /// Whether this error ends a run in `Failed`
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Grammar(_)
                | Self::Analysis(_)
                | Self::Config(_)
                | Self::Transition(_)
                | Self::Ceiling(_)
        )
    }
}

/// Input rejected by the grammar validator.
///
/// Carries the offending token, its 1-based position and the set of tokens
/// the parser would have accepted there.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[error("syntax violation at line {line}, column {column}: found {found}, expected {}{}", expected_list(.expected), hint_suffix(.hint))]
pub struct GrammarViolation {
    /// Description of the offending token
    pub found: String,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
    /// Sorted descriptions of acceptable tokens
    pub expected: Vec<String>,
    /// Extra context, e.g. for unsupported keywords
    pub hint: Option<String>,
}

fn expected_list(expected: &[String]) -> String {
    match expected {
        [] => "nothing".to_string(),
        [one] => one.clone(),
        many => format!("one of {}", many.join(", ")),
    }
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_ref().map(|h| format!(" ({h})")).unwrap_or_default()
}

/// Inconsistency between a parse tree and the branch extractor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// A node appeared where the extractor expected another kind
    #[error("unexpected {found} node while reading {context}")]
    UnexpectedNode {
        /// Kind that was found
        found: String,
        /// What was being extracted
        context: String,
    },

    /// A required child was absent
    #[error("{context} is missing its {child}")]
    MissingChild {
        /// Missing piece
        child: String,
        /// What was being extracted
        context: String,
    },

    /// Two functions share a name, which would make branch ids ambiguous
    #[error("function '{name}' is defined more than once (line {line})")]
    DuplicateFunction {
        /// Function name
        name: String,
        /// Line of the second definition
        line: usize,
    },
}

impl AnalysisError {
    /// Create an unexpected-node error
    pub fn unexpected(found: impl Into<String>, context: impl Into<String>) -> Self {
        Self::UnexpectedNode {
            found: found.into(),
            context: context.into(),
        }
    }

    /// Create a missing-child error
    pub fn missing(child: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingChild {
            child: child.into(),
            context: context.into(),
        }
    }
}

/// Generation collaborator failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// No answer within the per-call timeout
    #[error("generation timed out after {seconds}s")]
    Timeout {
        /// Timeout that was exceeded
        seconds: u64,
    },

    /// Network-level failure
    #[error("transport error: {message}")]
    Transport {
        /// Error message
        message: String,
    },

    /// Upstream asked us to slow down
    #[error("rate limited: {message}")]
    RateLimited {
        /// Error message
        message: String,
    },

    /// Upstream server error (5xx)
    #[error("upstream error {status}: {body}")]
    Upstream {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },

    /// Request refused (4xx other than 429); retrying will not help
    #[error("request rejected {status}: {body}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },

    /// Response contained no test code
    #[error("generator returned no test code")]
    EmptyOutput,

    /// Anything else
    #[error("generation failed: {message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl GenerationError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Whether another attempt may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Transport { .. }
                | Self::RateLimited { .. }
                | Self::Upstream { .. }
                | Self::EmptyOutput
        )
    }
}

/// Execution collaborator failure
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Test run exceeded its timeout
    #[error("test execution timed out after {seconds}s")]
    Timeout {
        /// Timeout that was exceeded
        seconds: u64,
    },

    /// Test process crashed or the runner failed internally
    #[error("test execution crashed: {message}")]
    Crashed {
        /// Error message
        message: String,
    },

    /// Generated tests could not be collected (syntax or import error)
    #[error("generated tests are invalid: {message}")]
    InvalidTestCode {
        /// Error message
        message: String,
    },

    /// Runner prerequisites missing (interpreter, plugins, bad module name)
    #[error("execution environment error: {message}")]
    Environment {
        /// Error message
        message: String,
    },

    /// Coverage data was missing or malformed
    #[error("invalid coverage report: {message}")]
    InvalidReport {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutionError {
    /// Create a crash error
    pub fn crashed(message: impl Into<String>) -> Self {
        Self::Crashed {
            message: message.into(),
        }
    }

    /// Create an environment error
    pub fn environment(message: impl Into<String>) -> Self {
        Self::Environment {
            message: message.into(),
        }
    }

    /// Create an invalid-report error
    pub fn invalid_report(message: impl Into<String>) -> Self {
        Self::InvalidReport {
            message: message.into(),
        }
    }
}

/// Invalid configuration value
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Value outside its allowed range
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        /// Field name
        field: &'static str,
        /// Human-readable range
        expected: &'static str,
        /// Rejected value
        value: String,
    },

    /// Config file could not be parsed
    #[error("failed to parse configuration: {message}")]
    Parse {
        /// Error message
        message: String,
    },
}

impl ConfigError {
    /// Create an out-of-range error
    pub fn out_of_range(
        field: &'static str,
        expected: &'static str,
        value: impl ToString,
    ) -> Self {
        Self::OutOfRange {
            field,
            expected,
            value: value.to_string(),
        }
    }
}
