//! Prompt construction and response code extraction.

use crate::analysis::{BranchId, BranchMap};
use crate::collaborator::{GenerationRequest, Scope};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;

/// System prompt for the initial generation round
pub const INITIAL_SYSTEM_PROMPT: &str = "\
You are an expert Python test engineer writing pytest tests that maximize branch coverage.

Rules:
1. Write at least one test for every branch in the branch map.
2. A function without branches still needs one test that calls it.
3. Name tests test_<function>_<branch description>.
4. Above each test, add a comment naming the branch id it covers.
5. Tests must be independent and deterministic.
6. Import the functions under test from the module you are given.
7. Output only executable Python code.";

/// System prompt for optimization rounds
pub const OPTIMIZER_SYSTEM_PROMPT: &str = "\
You are an expert test optimization engineer. You receive a module, the tests \
written so far and the branches those tests leave uncovered.

Rules:
1. Write tests only for the uncovered branches listed.
2. Choose inputs that drive each condition to the outcome named.
3. Do not repeat or modify existing tests; your output is appended to them.
4. Do not redefine helper names used by the existing tests.
5. Output only executable Python code.";

/// Builds the system and user messages for one request
#[must_use]
pub fn build(request: &GenerationRequest<'_>, module: &str) -> (&'static str, String) {
    match request.scope {
        Scope::All => (INITIAL_SYSTEM_PROMPT, initial(request, module)),
        Scope::Uncovered(ids) => (OPTIMIZER_SYSTEM_PROMPT, optimization(request, module, ids)),
    }
}

fn initial(request: &GenerationRequest<'_>, module: &str) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Generate pytest tests for the module `{module}`.");
    let _ = writeln!(prompt);
    push_source(&mut prompt, module, request.source);
    let _ = writeln!(prompt, "Branch map ({} branches):", request.branch_map.total_branches());
    push_branch_map(&mut prompt, request.branch_map);
    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "Write at least {} tests. Start with `from {module} import *`.",
        request.branch_map.required_tests()
    );
    prompt
}

fn optimization(request: &GenerationRequest<'_>, module: &str, uncovered: &[BranchId]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "The existing tests for `{module}` leave {} of {} branches uncovered (round {}).",
        uncovered.len(),
        request.branch_map.total_branches(),
        request.iteration
    );
    let _ = writeln!(prompt);
    push_source(&mut prompt, module, request.source);
    let _ = writeln!(prompt, "Uncovered branches:");
    for id in uncovered {
        match request.branch_map.get(id) {
            Some(branch) => {
                let _ = writeln!(prompt, "- {id}: {}", branch.describe());
            }
            None => {
                let _ = writeln!(prompt, "- {id}");
            }
        }
    }
    let _ = writeln!(prompt);
    if let Some(prior) = request.prior_tests {
        let _ = writeln!(prompt, "Existing tests:");
        let _ = writeln!(prompt, "```python");
        let _ = writeln!(prompt, "{}", prior.trim_end());
        let _ = writeln!(prompt, "```");
        let _ = writeln!(prompt);
    }
    let _ = writeln!(prompt, "Write only the additional tests. Start with `from {module} import *`.");
    prompt
}

fn push_source(prompt: &mut String, module: &str, source: &str) {
    let _ = writeln!(prompt, "Source of `{module}.py`:");
    let _ = writeln!(prompt, "```python");
    let _ = writeln!(prompt, "{}", source.trim_end());
    let _ = writeln!(prompt, "```");
    let _ = writeln!(prompt);
}

fn push_branch_map(prompt: &mut String, map: &BranchMap) {
    for entry in map.functions() {
        let function = &entry.function;
        let _ = writeln!(
            prompt,
            "- {}({}), lines {}-{}",
            function.name,
            function.params.join(", "),
            function.span.start_line,
            function.span.end_line
        );
        if entry.branches.is_empty() {
            let _ = writeln!(prompt, "  - no branches; call it at least once");
        }
        for branch in &entry.branches {
            let _ = writeln!(prompt, "  - {}: {}", branch.id, branch.describe());
        }
    }
}

static FENCE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?s)```[ \t]*(?:python3?|py)?[ \t]*\r?\n(.*?)```"));

/// Pulls test code out of a model response.
///
/// Fenced blocks are concatenated in order; an unfenced response is taken
/// whole. Returns an empty string when nothing usable remains.
#[must_use]
pub fn extract_code(response: &str) -> String {
    let blocks: Vec<&str> = match FENCE.as_ref() {
        Ok(fence) => fence
            .captures_iter(response)
            .filter_map(|c| c.get(1).map(|m| m.as_str().trim_end()))
            .filter(|block| !block.trim().is_empty())
            .collect(),
        Err(_) => Vec::new(),
    };
    if blocks.is_empty() {
        if response.contains("```") {
            return response.replace("```python", "").replace("```", "").trim().to_string();
        }
        return response.trim().to_string();
    }
    blocks.join("\n\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use std::time::Duration;

    const SOURCE: &str = "def f(a, b):\n    if a > b:\n        return a\n    return b\n\ndef g(x):\n    return x\n";

    fn request<'a>(map: &'a BranchMap, scope: &'a Scope, prior: Option<&'a str>) -> GenerationRequest<'a> {
        GenerationRequest {
            branch_map: map,
            source: SOURCE,
            scope,
            prior_tests: prior,
            iteration: u32::from(prior.is_some()),
            attempt: 1,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_initial_prompt_lists_branch_map() {
        let map = analyze(SOURCE).unwrap();
        let (system, user) = build(&request(&map, &Scope::All, None), "calc");
        assert_eq!(system, INITIAL_SYSTEM_PROMPT);
        assert!(user.contains("`calc`"));
        assert!(user.contains("f:0:true: f line 2: a > b is true"));
        assert!(user.contains("g(x), lines 6-7"));
        assert!(user.contains("no branches; call it at least once"));
        assert!(user.contains("Write at least 3 tests"));
    }

    #[test]
    fn test_optimization_prompt_lists_only_uncovered() {
        let map = analyze(SOURCE).unwrap();
        let scope = Scope::Uncovered(vec!["f:0:false".parse().unwrap()]);
        let (system, user) = build(&request(&map, &scope, Some("def test_f():\n    pass\n")), "calc");
        assert_eq!(system, OPTIMIZER_SYSTEM_PROMPT);
        assert!(user.contains("leave 1 of 2 branches uncovered (round 1)"));
        assert!(user.contains("- f:0:false: f line 2: a > b is false"));
        assert!(!user.contains("f:0:true"));
        assert!(user.contains("Existing tests:"));
        assert!(user.contains("def test_f():"));
    }

    #[test]
    fn test_extract_fenced_code() {
        let response = "Here you go:\n```python\nfrom m import *\n\ndef test_a():\n    assert f(2, 1) == 2\n```\nDone.";
        assert_eq!(
            extract_code(response),
            "from m import *\n\ndef test_a():\n    assert f(2, 1) == 2"
        );
    }

    #[test]
    fn test_extract_multiple_fences() {
        let response = "```py\ndef test_a():\n    pass\n```\ntext\n```\ndef test_b():\n    pass\n```";
        let code = extract_code(response);
        assert!(code.starts_with("def test_a"));
        assert!(code.ends_with("def test_b():\n    pass"));
    }

    #[test]
    fn test_extract_unfenced_and_empty() {
        assert_eq!(extract_code("  def test_a():\n    pass\n "), "def test_a():\n    pass");
        assert_eq!(extract_code("```python\n\n```"), "");
        assert_eq!(extract_code("   "), "");
    }
}
