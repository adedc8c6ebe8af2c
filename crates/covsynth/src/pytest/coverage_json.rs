//! `coverage.py` JSON report parsing and arc translation.
//!
//! With `--cov-branch`, each file entry lists `executed_branches` as
//! `[from, to]` line pairs. For a conditional on line L, the arc into the
//! first line of its then-suite is the true edge; any other arc leaving L
//! (into the else-suite, the next statement, or a negative function exit)
//! is the false edge.

use crate::analysis::{BranchId, BranchMap, Outcome};
use crate::error::ExecutionError;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Top level of `coverage.json`
#[derive(Debug, Clone, Deserialize)]
pub struct CoverageJson {
    pub files: BTreeMap<String, FileCoverage>,
}

/// Per-file section of `coverage.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileCoverage {
    #[serde(default)]
    pub executed_lines: Vec<i64>,
    #[serde(default)]
    pub executed_branches: Vec<(i64, i64)>,
    #[serde(default)]
    pub missing_branches: Vec<(i64, i64)>,
}

impl CoverageJson {
    pub fn parse(text: &str) -> Result<Self, ExecutionError> {
        serde_json::from_str(text).map_err(|e| ExecutionError::invalid_report(e.to_string()))
    }

    /// Section for `<module>.py`, matched on file name
    #[must_use]
    pub fn file(&self, module: &str) -> Option<&FileCoverage> {
        let wanted = format!("{module}.py");
        self.files.iter().find_map(|(path, file)| {
            let name = Path::new(path).file_name()?.to_str()?;
            (name == wanted).then_some(file)
        })
    }
}

/// Translates executed arcs into branch ids of `map`
#[must_use]
pub fn executed_branches(map: &BranchMap, file: &FileCoverage) -> BTreeSet<BranchId> {
    // line -> (true-edge id, target line of the true edge)
    let mut decisions: HashMap<usize, (&BranchId, usize)> = HashMap::new();
    for branch in map.branches() {
        if branch.outcome() == Outcome::Taken {
            if let Some(target) = branch.target_line {
                decisions.insert(branch.line, (&branch.id, target));
            }
        }
    }

    let mut executed = BTreeSet::new();
    for &(from, to) in &file.executed_branches {
        let Ok(from) = usize::try_from(from) else {
            continue;
        };
        let Some(&(taken, target)) = decisions.get(&from) else {
            continue;
        };
        if usize::try_from(to).is_ok_and(|to| to == target) {
            executed.insert(taken.clone());
        } else {
            executed.insert(taken.sibling());
        }
    }
    executed
}
