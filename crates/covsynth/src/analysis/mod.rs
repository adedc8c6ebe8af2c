//! Static branch analysis.
//!
//! [`analyze`] is the whole front half of a run: validate the source
//! against the subset grammar, then extract its [`BranchMap`].

pub mod branch;
pub mod extractor;

pub use branch::{
    Branch, BranchId, BranchMap, Function, FunctionBranches, Outcome, ParseBranchIdError,
    SourceSpan,
};
pub use extractor::extract;

use crate::grammar::validate;
use crate::error::SynthResult;

/// Validates `source` and extracts its branch map
pub fn analyze(source: &str) -> SynthResult<BranchMap> {
    let tree = validate(source)?;
    Ok(extract(&tree)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::SynthError;

    #[test]
    fn test_analyze_valid() {
        let map = analyze("def f(a):\n    if a:\n        return 1\n    return 0\n").unwrap();
        assert_eq!(map.total_branches(), 2);
    }

    #[test]
    fn test_analyze_surfaces_grammar_violation() {
        let err = analyze("def f(a):\n    while a:\n        a = a - 1\n").unwrap_err();
        match err {
            SynthError::Grammar(v) => assert_eq!(v.found, "'while'"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
