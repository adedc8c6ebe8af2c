//! Walks a validated parse tree and enumerates decision edges.
//!
//! Functions are visited in source order. Inside a function each `if`
//! emits its taken edge then its not-taken edge, then the extractor descends
//! into the `if` suite, then the `else` suite, and only then moves on to the
//! next sibling statement. The resulting ids depend only on the source text.

use super::branch::{
    Branch, BranchId, BranchMap, Function, FunctionBranches, Outcome, SourceSpan,
};
use crate::error::AnalysisError;
use crate::grammar::lexer::TokenKind;
use crate::grammar::{NonTerminal, ParseTree, SyntaxNode};
use std::collections::HashSet;

/// Builds the branch map for a validated source
pub fn extract(tree: &ParseTree) -> Result<BranchMap, AnalysisError> {
    let root = tree.root();
    if root.kind() != NonTerminal::File {
        return Err(AnalysisError::unexpected(root.kind().name(), "file"));
    }

    let mut seen = HashSet::new();
    let mut functions = Vec::new();
    for node in root.child_nodes() {
        if node.kind() != NonTerminal::FuncDef {
            return Err(AnalysisError::unexpected(node.kind().name(), "top level"));
        }
        let entry = FunctionExtractor::new(tree).function(node)?;
        if !seen.insert(entry.function.name.clone()) {
            return Err(AnalysisError::DuplicateFunction {
                name: entry.function.name,
                line: entry.function.span.start_line,
            });
        }
        functions.push(entry);
    }

    let map = BranchMap::new(functions);
    tracing::debug!(
        functions = map.functions().len(),
        branches = map.total_branches(),
        "branch map extracted"
    );
    Ok(map)
}

struct FunctionExtractor<'t> {
    tree: &'t ParseTree,
    name: String,
    next_index: u32,
    branches: Vec<Branch>,
}

impl<'t> FunctionExtractor<'t> {
    const fn new(tree: &'t ParseTree) -> Self {
        Self {
            tree,
            name: String::new(),
            next_index: 0,
            branches: Vec::new(),
        }
    }

    fn function(mut self, node: &SyntaxNode) -> Result<FunctionBranches, AnalysisError> {
        let mut tokens = node.tokens();
        let def = tokens
            .next()
            .filter(|t| t.kind == TokenKind::Def)
            .ok_or_else(|| AnalysisError::missing("'def' keyword", "function definition"))?;
        let name = tokens
            .next()
            .filter(|t| t.kind == TokenKind::Name)
            .ok_or_else(|| AnalysisError::missing("name", "function definition"))?;
        self.name = name.text.clone();

        let params = node
            .tokens()
            .skip_while(|t| t.kind != TokenKind::LParen)
            .take_while(|t| t.kind != TokenKind::RParen)
            .filter(|t| t.kind == TokenKind::Name)
            .map(|t| t.text.clone())
            .collect();

        let context = format!("function '{}'", self.name);
        let body = node
            .child_nodes()
            .next()
            .ok_or_else(|| AnalysisError::missing("body", context.as_str()))?;
        self.suite(body)?;

        let span = SourceSpan {
            start_line: def.line,
            end_line: node.end_line().unwrap_or(def.line),
        };
        Ok(FunctionBranches {
            function: Function {
                name: self.name,
                params,
                span,
            },
            branches: self.branches,
        })
    }

    fn suite(&mut self, node: &SyntaxNode) -> Result<(), AnalysisError> {
        if node.kind() != NonTerminal::Suite {
            return Err(AnalysisError::unexpected(node.kind().name(), "block"));
        }
        let mut statements = 0;
        for stmt in node.child_nodes() {
            statements += 1;
            match stmt.kind() {
                NonTerminal::IfStmt => self.conditional(stmt)?,
                NonTerminal::ReturnStmt | NonTerminal::AssignStmt => {}
                other => return Err(AnalysisError::unexpected(other.name(), "block")),
            }
        }
        if statements == 0 {
            return Err(AnalysisError::missing(
                "statements",
                format!("block in function '{}'", self.name),
            ));
        }
        Ok(())
    }

    fn conditional(&mut self, node: &SyntaxNode) -> Result<(), AnalysisError> {
        let if_token = node
            .token(TokenKind::If)
            .ok_or_else(|| AnalysisError::missing("'if' keyword", "conditional"))?;
        let mut children = node.child_nodes();
        let condition = children
            .next()
            .filter(|n| n.kind() == NonTerminal::Expr)
            .ok_or_else(|| AnalysisError::missing("condition", "conditional"))?;
        let then_suite = children
            .next()
            .ok_or_else(|| AnalysisError::missing("body", "conditional"))?;
        let else_suite = children.next();
        if else_suite.is_some() != node.token(TokenKind::Else).is_some() {
            return Err(AnalysisError::missing("'else' keyword", "conditional"));
        }

        let index = self.next_index;
        self.next_index += 1;
        let text = self.tree.text(condition).to_string();
        let line = if_token.line;
        self.branches.push(Branch {
            id: BranchId::new(self.name.clone(), index, Outcome::Taken),
            line,
            condition: text.clone(),
            target_line: first_statement_line(then_suite),
        });
        self.branches.push(Branch {
            id: BranchId::new(self.name.clone(), index, Outcome::NotTaken),
            line,
            condition: text,
            target_line: else_suite.and_then(first_statement_line),
        });

        self.suite(then_suite)?;
        if let Some(suite) = else_suite {
            self.suite(suite)?;
        }
        Ok(())
    }
}

fn first_statement_line(suite: &SyntaxNode) -> Option<usize> {
    suite.child_nodes().next().and_then(SyntaxNode::line)
}
