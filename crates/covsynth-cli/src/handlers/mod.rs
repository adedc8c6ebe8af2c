//! Command handlers - extracted from main.rs for testability
//!
//! Each handler reads its input, renders with pure helpers, and returns
//! the process exit code.

pub mod analyze;
pub mod generate;
pub mod grammar;
pub mod validate;

pub use analyze::{execute_analyze, render_branch_map};
pub use generate::{execute_generate, exit_code, module_name, resolve_config};
pub use grammar::{execute_grammar, render_grammar};
pub use validate::{execute_validate, render_violation};

use crate::error::{CliError, CliResult};
use std::path::Path;

/// Reads a source file, naming the path on failure
pub(crate) fn read_source(path: &Path) -> CliResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        CliError::invalid_argument(format!("cannot read {}: {e}", path.display()))
    })
}
