//! Run configuration

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest accepted iteration ceiling
pub const MAX_ITERATION_CEILING: u32 = 20;

/// Settings for one synthesis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Branch coverage to reach, in (0, 100]
    pub target_coverage: f64,
    /// Optimization rounds allowed after the initial generation
    pub max_iterations: u32,
    /// Per-round limit for running the suite
    pub execution_timeout_secs: u64,
    /// Per-attempt limit for a generation request
    pub generation_timeout_secs: u64,
    /// Retry policy for generation requests
    pub retry: RetryPolicy,
    /// Stop early when the last `n + 1` measured coverages lie within one
    /// point of each other; disabled when `None`
    pub stagnation_window: Option<u32>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            target_coverage: 80.0,
            max_iterations: 5,
            execution_timeout_secs: 60,
            generation_timeout_secs: 120,
            retry: RetryPolicy::default(),
            stagnation_window: None,
        }
    }
}

impl SynthConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the coverage target
    #[must_use]
    pub const fn with_target_coverage(mut self, target: f64) -> Self {
        self.target_coverage = target;
        self
    }

    /// Set the iteration ceiling
    #[must_use]
    pub const fn with_max_iterations(mut self, iterations: u32) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Set the execution timeout
    #[must_use]
    pub const fn with_execution_timeout_secs(mut self, secs: u64) -> Self {
        self.execution_timeout_secs = secs;
        self
    }

    /// Set the generation timeout
    #[must_use]
    pub const fn with_generation_timeout_secs(mut self, secs: u64) -> Self {
        self.generation_timeout_secs = secs;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enable stagnation detection
    #[must_use]
    pub const fn with_stagnation_window(mut self, window: Option<u32>) -> Self {
        self.stagnation_window = window;
        self
    }

    #[must_use]
    pub const fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    #[must_use]
    pub const fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// Checks every value against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.target_coverage > 0.0 && self.target_coverage <= 100.0) {
            return Err(ConfigError::out_of_range(
                "target_coverage",
                "in (0, 100]",
                self.target_coverage,
            ));
        }
        if self.max_iterations == 0 || self.max_iterations > MAX_ITERATION_CEILING {
            return Err(ConfigError::out_of_range(
                "max_iterations",
                "between 1 and 20",
                self.max_iterations,
            ));
        }
        if self.execution_timeout_secs == 0 {
            return Err(ConfigError::out_of_range("execution_timeout_secs", "positive", 0));
        }
        if self.generation_timeout_secs == 0 {
            return Err(ConfigError::out_of_range("generation_timeout_secs", "positive", 0));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::out_of_range("retry.max_attempts", "at least 1", 0));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(ConfigError::out_of_range(
                "retry.multiplier",
                "at least 1.0",
                self.retry.multiplier,
            ));
        }
        if self.stagnation_window == Some(0) {
            return Err(ConfigError::out_of_range("stagnation_window", "at least 1", 0));
        }
        Ok(())
    }

    /// Parses YAML; missing keys keep their defaults
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml_ng::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_yaml(&text)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SynthConfig::new();
        assert_eq!(config.target_coverage, 80.0);
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.execution_timeout(), Duration::from_secs(60));
        assert!(config.stagnation_window.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_target_bounds() {
        assert!(SynthConfig::new().with_target_coverage(0.0).validate().is_err());
        assert!(SynthConfig::new().with_target_coverage(100.1).validate().is_err());
        assert!(SynthConfig::new().with_target_coverage(f64::NAN).validate().is_err());
        SynthConfig::new().with_target_coverage(100.0).validate().unwrap();
        SynthConfig::new().with_target_coverage(0.5).validate().unwrap();
    }

    #[test]
    fn test_iteration_bounds() {
        assert!(SynthConfig::new().with_max_iterations(0).validate().is_err());
        assert!(SynthConfig::new().with_max_iterations(21).validate().is_err());
        SynthConfig::new().with_max_iterations(1).validate().unwrap();
        SynthConfig::new().with_max_iterations(20).validate().unwrap();
    }

    #[test]
    fn test_timeouts_must_be_positive() {
        let err = SynthConfig::new()
            .with_execution_timeout_secs(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("execution_timeout_secs"));
        assert!(SynthConfig::new().with_generation_timeout_secs(0).validate().is_err());
    }

    #[test]
    fn test_retry_and_stagnation_validation() {
        assert!(SynthConfig::new().with_retry(RetryPolicy::new(0)).validate().is_err());
        assert!(SynthConfig::new()
            .with_retry(RetryPolicy::default().with_multiplier(0.5))
            .validate()
            .is_err());
        assert!(SynthConfig::new().with_stagnation_window(Some(0)).validate().is_err());
        SynthConfig::new().with_stagnation_window(Some(3)).validate().unwrap();
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = SynthConfig::from_yaml("target_coverage: 95.0\nretry:\n  max_attempts: 2\n").unwrap();
        assert_eq!(config.target_coverage, 95.0);
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.max_backoff_ms, 10_000);
    }

    #[test]
    fn test_from_yaml_rejects_invalid_values() {
        let err = SynthConfig::from_yaml("max_iterations: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "max_iterations", .. }));
        let err = SynthConfig::from_yaml("target_coverage: [1, 2]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "execution_timeout_secs: 30").unwrap();
        let config = SynthConfig::load(file.path()).unwrap();
        assert_eq!(config.execution_timeout_secs, 30);
        assert!(SynthConfig::load(Path::new("/nonexistent/covsynth.yaml")).is_err());
    }
}
