//! Status lines on stderr

use crate::config::CliConfig;
use console::{style, Style, Term};

/// Writes status lines to stderr; results go to stdout from the handlers
#[derive(Debug)]
pub struct Reporter {
    term: Term,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
    /// Print per-round detail
    pub verbose: bool,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl Reporter {
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            use_color,
            quiet,
            verbose: false,
        }
    }

    #[must_use]
    pub fn from_config(config: &CliConfig) -> Self {
        let mut reporter = Self::new(config.color.should_color(), config.verbosity.is_quiet());
        reporter.verbose = config.verbosity.is_verbose();
        reporter
    }

    fn prefixed(&self, symbol: &str, plain: &str, paint: Style, message: &str) -> String {
        let prefix = if self.use_color {
            paint.bold().apply_to(symbol).to_string()
        } else {
            plain.to_string()
        };
        format!("{prefix} {message}")
    }

    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        let line = self.prefixed("✓", "PASS", Style::new().green(), message);
        let _ = self.term.write_line(&line);
    }

    /// Printed even in quiet mode
    pub fn failure(&self, message: &str) {
        let line = self.prefixed("✗", "FAIL", Style::new().red(), message);
        let _ = self.term.write_line(&line);
    }

    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        let line = self.prefixed("⚠", "WARN", Style::new().yellow(), message);
        let _ = self.term.write_line(&line);
    }

    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        let line = self.prefixed("ℹ", "INFO", Style::new().blue(), message);
        let _ = self.term.write_line(&line);
    }

    /// Only printed at `-v` and above
    pub fn detail(&self, message: &str) {
        if self.quiet || !self.verbose {
            return;
        }
        let line = if self.use_color {
            style(message).dim().to_string()
        } else {
            message.to_string()
        };
        let _ = self.term.write_line(&format!("  {line}"));
    }

    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }
        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };
        let _ = self.term.write_line("");
        let _ = self.term.write_line(&styled);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{ColorChoice, Verbosity};

    #[test]
    fn test_plain_prefixes() {
        let reporter = Reporter::new(false, false);
        assert_eq!(
            reporter.prefixed("✓", "PASS", Style::new().green(), "valid"),
            "PASS valid"
        );
        assert_eq!(
            reporter.prefixed("✗", "FAIL", Style::new().red(), "rejected"),
            "FAIL rejected"
        );
    }

    #[test]
    fn test_colored_prefix_keeps_symbol() {
        let reporter = Reporter::new(true, false);
        let line = reporter.prefixed("⚠", "WARN", Style::new().yellow(), "slow");
        assert!(line.contains('⚠'));
        assert!(line.ends_with(" slow"));
    }

    #[test]
    fn test_from_config() {
        let config = CliConfig::new()
            .with_verbosity(Verbosity::Quiet)
            .with_color(ColorChoice::Never);
        let reporter = Reporter::from_config(&config);
        assert!(reporter.quiet);
        assert!(!reporter.use_color);
        assert!(!reporter.verbose);

        let verbose = Reporter::from_config(&CliConfig::new().with_verbosity(Verbosity::Debug));
        assert!(verbose.verbose);
    }

    #[test]
    fn test_quiet_reporter_does_not_panic() {
        let reporter = Reporter::new(false, true);
        reporter.success("hidden");
        reporter.info("hidden");
        reporter.warning("hidden");
        reporter.detail("hidden");
        reporter.header("hidden");
        reporter.failure("shown");
    }
}
