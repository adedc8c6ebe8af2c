//! Table-driven predictive parser.
//!
//! Expands nonterminals by looking up the single production the LL(1) table
//! predicts for the current token. The first mismatch becomes a
//! [`GrammarViolation`] whose expected set is read straight from the table,
//! so error messages always agree with the grammar.

use super::lexer::{Token, TokenKind};
use super::tree::SyntaxNode;
use super::{Grammar, NonTerminal, Production, Symbol};
use crate::error::GrammarViolation;
use std::collections::BTreeSet;

/// Maximum depth of non-transparent nodes
pub const MAX_NESTING: usize = 256;

/// Predictive parser over a token stream
#[derive(Debug)]
pub struct Parser<'g> {
    grammar: &'g Grammar,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'g> Parser<'g> {
    /// Creates a parser; a trailing `Eof` is added if the stream lacks one
    #[must_use]
    pub fn new(grammar: &'g Grammar, mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let (end, line) = tokens.last().map_or((0, 1), |t| (t.end, t.line));
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                start: end,
                end,
                line,
                column: 1,
            });
        }
        Self {
            grammar,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Parses a whole file
    pub fn parse(mut self) -> Result<SyntaxNode, GrammarViolation> {
        self.node(NonTerminal::File)
    }

    fn node(&mut self, kind: NonTerminal) -> Result<SyntaxNode, GrammarViolation> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.violation(
                BTreeSet::new(),
                Some(format!("nesting deeper than {MAX_NESTING} levels")),
            ));
        }
        let mut node = SyntaxNode::new(kind);
        self.expand(kind, &mut node)?;
        self.depth -= 1;
        Ok(node)
    }

    /// Expands `start` into `node`, looping instead of recursing on a
    /// transparent nonterminal's own tail.
    fn expand(&mut self, start: NonTerminal, node: &mut SyntaxNode) -> Result<(), GrammarViolation> {
        let mut current = start;
        loop {
            let production = self.predict(current)?;
            let mut tail = None;
            for (i, symbol) in production.rhs.iter().enumerate() {
                let is_last = i + 1 == production.rhs.len();
                match *symbol {
                    Symbol::T(kind) => {
                        let token = self.expect(kind)?;
                        node.push_token(token);
                    }
                    Symbol::N(child) if is_last && child == current && child.is_transparent() => {
                        tail = Some(child);
                    }
                    Symbol::N(child) if child.is_transparent() => self.expand(child, node)?,
                    Symbol::N(child) => {
                        let sub = self.node(child)?;
                        node.push_node(sub);
                    }
                }
            }
            match tail {
                Some(next) => current = next,
                None => return Ok(()),
            }
        }
    }

    fn predict(&self, nt: NonTerminal) -> Result<&'static Production, GrammarViolation> {
        let lookahead = self.peek().kind;
        self.grammar
            .predict(nt, lookahead)
            .ok_or_else(|| self.violation(self.grammar.expected(nt), None))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, GrammarViolation> {
        if self.peek().kind != kind {
            return Err(self.violation(BTreeSet::from([kind]), None));
        }
        let token = self.peek().clone();
        self.pos += 1;
        Ok(token)
    }

    fn peek(&self) -> &Token {
        let index = self.pos.min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn violation(&self, expected: BTreeSet<TokenKind>, hint: Option<String>) -> GrammarViolation {
        let token = self.peek();
        let mut expected: Vec<String> = expected
            .into_iter()
            .map(|k| k.describe().to_string())
            .collect();
        expected.sort();
        expected.dedup();
        let hint = hint.or_else(|| match token.kind {
            TokenKind::Reserved => Some(format!("'{}' is outside the supported subset", token.text)),
            TokenKind::Indent => Some("indentation must follow a block opener".to_string()),
            _ => None,
        });
        GrammarViolation {
            found: token.describe(),
            line: token.line,
            column: token.column,
            expected,
            hint,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use crate::grammar::{validate, NonTerminal};

    const CALCULATOR: &str = include_str!("../../tests/fixtures/calculator.py");
    const LOAN: &str = include_str!("../../tests/fixtures/loan_scoring.py");

    #[test]
    fn test_accepts_fixtures() {
        validate(CALCULATOR).unwrap();
        validate(LOAN).unwrap();
    }

    #[test]
    fn test_accepts_if_without_else_and_bare_return() {
        validate("def f(x):\n    if x < 0:\n        return\n    return x\n").unwrap();
    }

    #[test]
    fn test_accepts_unary_minus_and_parentheses() {
        validate("def f(a):\n    b = -(a + 1) * -2\n    return b / 3.5\n").unwrap();
    }

    #[test]
    fn test_accepts_empty_source() {
        let tree = validate("# nothing here\n").unwrap();
        assert_eq!(tree.root().kind(), NonTerminal::File);
    }

    #[test]
    fn test_rejects_for_loop() {
        let err = validate("def f(xs):\n    for x in xs:\n        return x\n").unwrap_err();
        assert_eq!(err.found, "'for'");
        assert_eq!((err.line, err.column), (2, 5));
        assert_eq!(err.expected, vec!["'if'", "'return'", "identifier"]);
        assert!(err.hint.unwrap().contains("outside the supported subset"));
    }

    #[test]
    fn test_rejects_class_definition() {
        let err = validate("class Foo:\n    x = 1\n").unwrap_err();
        assert_eq!(err.found, "'class'");
        assert_eq!(err.expected, vec!["'def'", "end of input"]);
    }

    #[test]
    fn test_rejects_elif() {
        let err = validate("def f(a):\n    if a:\n        return 1\n    elif a:\n        return 2\n").unwrap_err();
        assert_eq!(err.found, "'elif'");
        assert_eq!(err.line, 4);
    }

    #[test]
    fn test_rejects_decorator() {
        let err = validate("@cache\ndef f():\n    return 1\n").unwrap_err();
        assert_eq!(err.found, "illegal character '@'");
        assert_eq!((err.line, err.column), (1, 1));
    }

    #[test]
    fn test_missing_colon() {
        let err = validate("def f(a)\n    return a\n").unwrap_err();
        assert_eq!(err.found, "newline");
        assert_eq!(err.expected, vec!["':'"]);
    }

    #[test]
    fn test_unexpected_indent() {
        let err = validate("def f():\n    x = 1\n        return x\n").unwrap_err();
        assert_eq!(err.found, "unexpected indent");
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_chained_comparison_rejected() {
        let err = validate("def f(a, b, c):\n    if a < b < c:\n        return 1\n").unwrap_err();
        assert_eq!(err.found, "'<'");
        assert_eq!(err.expected, vec!["':'"]);
    }

    #[test]
    fn test_statement_outside_function_rejected() {
        let err = validate("x = 1\n").unwrap_err();
        assert_eq!(err.found, "identifier 'x'");
    }

    #[test]
    fn test_empty_body_rejected() {
        let err = validate("def f():\n\ndef g():\n    return 1\n").unwrap_err();
        assert_eq!(err.expected, vec!["indent"]);
    }

    #[test]
    fn test_deep_nesting_is_a_violation_not_a_crash() {
        let expr = format!("{}1{}", "(".repeat(400), ")".repeat(400));
        let source = format!("def f():\n    return {expr}\n");
        let err = validate(&source).unwrap_err();
        assert!(err.hint.unwrap().contains("nesting deeper"));
    }

    #[test]
    fn test_long_flat_suites_parse() {
        let body: String = (0..2000).map(|i| format!("    x{i} = {i}\n")).collect();
        let source = format!("def f():\n{body}    return 0\n");
        validate(&source).unwrap();
    }
}
