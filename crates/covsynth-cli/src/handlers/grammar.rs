//! `covsynth grammar`

use crate::config::CliConfig;
use covsynth::grammar::Grammar;

/// Prints the production table; `-v` adds conflicts
pub fn execute_grammar(config: &CliConfig) {
    print!("{}", render_grammar(covsynth::grammar(), config.verbosity.is_verbose()));
}

#[must_use]
pub fn render_grammar(grammar: &Grammar, with_conflicts: bool) -> String {
    let mut out = grammar.to_string();
    if with_conflicts {
        let conflicts = grammar.conflicts();
        if conflicts.is_empty() {
            out.push_str("\n# no prediction conflicts\n");
        } else {
            out.push_str(&format!("\n# {} prediction conflict(s)\n", conflicts.len()));
            for conflict in conflicts {
                out.push_str(&format!(
                    "# {} on {}: kept production {}, dropped {}\n",
                    conflict.nonterminal,
                    conflict.lookahead.describe(),
                    conflict.kept,
                    conflict.rejected
                ));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_grammar_lists_productions() {
        let table = render_grammar(covsynth::grammar(), false);
        assert!(table.lines().any(|l| l.starts_with("funcdef")));
        assert!(table.lines().any(|l| l.starts_with("if_stmt")));
        assert!(!table.contains("conflict"));
    }

    #[test]
    fn test_render_grammar_reports_conflicts() {
        let table = render_grammar(covsynth::grammar(), true);
        assert!(table.contains("# no prediction conflicts"));
    }
}
