//! Grammar validator for the supported Python subset.
//!
//! The subset covers function definitions, two-way `if`/`else` (nestable),
//! assignment, `return`, arithmetic `+ - * /` and the six comparisons.
//! Everything else is rejected before any analysis happens.
//!
//! ## Structure
//!
//! - [`lexer`]: indentation-aware tokenizer
//! - [`Grammar`]: productions plus the LL(1) table derived from FIRST/FOLLOW
//!   sets, built once per process by [`grammar()`]
//! - [`parser`]: table-driven predictive parser producing a [`ParseTree`]
//!
//! Supporting a new construct means adding tokens to the lexer, productions
//! to [`PRODUCTIONS`] and a match arm in the branch extractor.

pub mod lexer;
pub mod parser;
pub mod tree;

use crate::error::GrammarViolation;
use lexer::TokenKind;
use once_cell::sync::Lazy;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

pub use parser::Parser;
pub use tree::{ParseTree, SyntaxElement, SyntaxNode};

/// Nonterminals of the subset grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum NonTerminal {
    File,
    FuncList,
    FuncDef,
    Params,
    ParamTail,
    Suite,
    StmtList,
    Stmt,
    IfStmt,
    ElseClause,
    ReturnStmt,
    ReturnValue,
    AssignStmt,
    Expr,
    CmpTail,
    Arith,
    ArithTail,
    Term,
    TermTail,
    Factor,
}

impl NonTerminal {
    /// Name as written in the production table
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::FuncList => "func_list",
            Self::FuncDef => "funcdef",
            Self::Params => "params",
            Self::ParamTail => "param_tail",
            Self::Suite => "suite",
            Self::StmtList => "stmt_list",
            Self::Stmt => "stmt",
            Self::IfStmt => "if_stmt",
            Self::ElseClause => "else_clause",
            Self::ReturnStmt => "return_stmt",
            Self::ReturnValue => "return_value",
            Self::AssignStmt => "assign_stmt",
            Self::Expr => "expr",
            Self::CmpTail => "cmp_tail",
            Self::Arith => "arith",
            Self::ArithTail => "arith_tail",
            Self::Term => "term",
            Self::TermTail => "term_tail",
            Self::Factor => "factor",
        }
    }

    /// Transparent nonterminals are spliced into their parent node.
    ///
    /// Lists and tails therefore come out flat, and right-recursive tails
    /// are parsed iteratively.
    #[must_use]
    pub const fn is_transparent(self) -> bool {
        matches!(
            self,
            Self::FuncList
                | Self::Params
                | Self::ParamTail
                | Self::StmtList
                | Self::Stmt
                | Self::ElseClause
                | Self::ReturnValue
                | Self::CmpTail
                | Self::ArithTail
                | Self::TermTail
        )
    }
}

impl fmt::Display for NonTerminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Grammar symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// Terminal
    T(TokenKind),
    /// Nonterminal
    N(NonTerminal),
}

/// A single production `lhs → rhs`; an empty `rhs` is ε
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Production {
    pub lhs: NonTerminal,
    pub rhs: &'static [Symbol],
}

impl fmt::Display for Production {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<12} →", self.lhs.name())?;
        if self.rhs.is_empty() {
            return f.write_str(" ε");
        }
        for symbol in self.rhs {
            match symbol {
                Symbol::T(kind) => write!(f, " {}", kind.describe())?,
                Symbol::N(nt) => write!(f, " {}", nt.name())?,
            }
        }
        Ok(())
    }
}

macro_rules! prod {
    ($lhs:ident => $($sym:expr),*) => {
        Production { lhs: NonTerminal::$lhs, rhs: &[$($sym),*] }
    };
}

use NonTerminal as Nt;
use Symbol::{N, T};
use TokenKind as K;

/// The subset grammar
pub const PRODUCTIONS: &[Production] = &[
    prod!(File => N(Nt::FuncList), T(K::Eof)),
    prod!(FuncList => N(Nt::FuncDef), N(Nt::FuncList)),
    prod!(FuncList =>),
    prod!(FuncDef => T(K::Def), T(K::Name), T(K::LParen), N(Nt::Params), T(K::RParen), T(K::Colon), N(Nt::Suite)),
    prod!(Params => T(K::Name), N(Nt::ParamTail)),
    prod!(Params =>),
    prod!(ParamTail => T(K::Comma), T(K::Name), N(Nt::ParamTail)),
    prod!(ParamTail =>),
    prod!(Suite => T(K::Newline), T(K::Indent), N(Nt::Stmt), N(Nt::StmtList), T(K::Dedent)),
    prod!(StmtList => N(Nt::Stmt), N(Nt::StmtList)),
    prod!(StmtList =>),
    prod!(Stmt => N(Nt::IfStmt)),
    prod!(Stmt => N(Nt::ReturnStmt)),
    prod!(Stmt => N(Nt::AssignStmt)),
    prod!(IfStmt => T(K::If), N(Nt::Expr), T(K::Colon), N(Nt::Suite), N(Nt::ElseClause)),
    prod!(ElseClause => T(K::Else), T(K::Colon), N(Nt::Suite)),
    prod!(ElseClause =>),
    prod!(ReturnStmt => T(K::Return), N(Nt::ReturnValue), T(K::Newline)),
    prod!(ReturnValue => N(Nt::Expr)),
    prod!(ReturnValue =>),
    prod!(AssignStmt => T(K::Name), T(K::Assign), N(Nt::Expr), T(K::Newline)),
    prod!(Expr => N(Nt::Arith), N(Nt::CmpTail)),
    prod!(CmpTail => T(K::EqEq), N(Nt::Arith)),
    prod!(CmpTail => T(K::NotEq), N(Nt::Arith)),
    prod!(CmpTail => T(K::Lt), N(Nt::Arith)),
    prod!(CmpTail => T(K::Gt), N(Nt::Arith)),
    prod!(CmpTail => T(K::LtEq), N(Nt::Arith)),
    prod!(CmpTail => T(K::GtEq), N(Nt::Arith)),
    prod!(CmpTail =>),
    prod!(Arith => N(Nt::Term), N(Nt::ArithTail)),
    prod!(ArithTail => T(K::Plus), N(Nt::Term), N(Nt::ArithTail)),
    prod!(ArithTail => T(K::Minus), N(Nt::Term), N(Nt::ArithTail)),
    prod!(ArithTail =>),
    prod!(Term => N(Nt::Factor), N(Nt::TermTail)),
    prod!(TermTail => T(K::Star), N(Nt::Factor), N(Nt::TermTail)),
    prod!(TermTail => T(K::Slash), N(Nt::Factor), N(Nt::TermTail)),
    prod!(TermTail =>),
    prod!(Factor => T(K::Name)),
    prod!(Factor => T(K::Number)),
    prod!(Factor => T(K::LParen), N(Nt::Expr), T(K::RParen)),
    prod!(Factor => T(K::Minus), N(Nt::Factor)),
];

/// Two productions competing for the same table cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub nonterminal: NonTerminal,
    pub lookahead: TokenKind,
    pub kept: usize,
    pub rejected: usize,
}

/// Productions plus the derived LL(1) parse table
#[derive(Debug)]
pub struct Grammar {
    productions: &'static [Production],
    nullable: BTreeSet<NonTerminal>,
    first: BTreeMap<NonTerminal, BTreeSet<TokenKind>>,
    follow: BTreeMap<NonTerminal, BTreeSet<TokenKind>>,
    table: HashMap<(NonTerminal, TokenKind), usize>,
    expected: BTreeMap<NonTerminal, BTreeSet<TokenKind>>,
    conflicts: Vec<Conflict>,
}

static GRAMMAR: Lazy<Grammar> = Lazy::new(|| {
    let grammar = Grammar::build(PRODUCTIONS);
    tracing::debug!(
        productions = grammar.productions.len(),
        cells = grammar.table.len(),
        conflicts = grammar.conflicts.len(),
        "grammar table built"
    );
    grammar
});

/// The process-wide grammar, built on first use
pub fn grammar() -> &'static Grammar {
    &GRAMMAR
}

impl Grammar {
    /// Derives nullable, FIRST and FOLLOW sets and the parse table
    #[must_use]
    pub fn build(productions: &'static [Production]) -> Self {
        let mut grammar = Self {
            productions,
            nullable: BTreeSet::new(),
            first: BTreeMap::new(),
            follow: BTreeMap::new(),
            table: HashMap::new(),
            expected: BTreeMap::new(),
            conflicts: Vec::new(),
        };
        grammar.compute_nullable();
        grammar.compute_first();
        grammar.compute_follow();
        grammar.compute_table();
        grammar
    }

    fn compute_nullable(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            for p in self.productions {
                if self.nullable.contains(&p.lhs) {
                    continue;
                }
                let all_nullable = p
                    .rhs
                    .iter()
                    .all(|s| matches!(s, Symbol::N(nt) if self.nullable.contains(nt)));
                if all_nullable {
                    self.nullable.insert(p.lhs);
                    changed = true;
                }
            }
        }
    }

    fn compute_first(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            for p in self.productions {
                let (set, _) = self.first_of(p.rhs);
                let entry = self.first.entry(p.lhs).or_default();
                let before = entry.len();
                entry.extend(set);
                changed |= entry.len() != before;
            }
        }
    }

    fn compute_follow(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            for p in self.productions {
                for (i, symbol) in p.rhs.iter().enumerate() {
                    let Symbol::N(target) = *symbol else { continue };
                    let (mut set, rest_nullable) = self.first_of(&p.rhs[i + 1..]);
                    if rest_nullable {
                        set.extend(self.follow.get(&p.lhs).cloned().unwrap_or_default());
                    }
                    let entry = self.follow.entry(target).or_default();
                    let before = entry.len();
                    entry.extend(set);
                    changed |= entry.len() != before;
                }
            }
        }
    }

    fn compute_table(&mut self) {
        for (index, p) in self.productions.iter().enumerate() {
            let (mut lookaheads, nullable) = self.first_of(p.rhs);
            if nullable {
                lookaheads.extend(self.follow.get(&p.lhs).cloned().unwrap_or_default());
            }
            for lookahead in lookaheads {
                self.expected.entry(p.lhs).or_default().insert(lookahead);
                match self.table.entry((p.lhs, lookahead)) {
                    Entry::Occupied(cell) => self.conflicts.push(Conflict {
                        nonterminal: p.lhs,
                        lookahead,
                        kept: *cell.get(),
                        rejected: index,
                    }),
                    Entry::Vacant(cell) => {
                        cell.insert(index);
                    }
                }
            }
        }
    }

    /// FIRST set of a symbol sequence and whether the sequence is nullable
    fn first_of(&self, symbols: &[Symbol]) -> (BTreeSet<TokenKind>, bool) {
        let mut set = BTreeSet::new();
        for symbol in symbols {
            match *symbol {
                Symbol::T(kind) => {
                    set.insert(kind);
                    return (set, false);
                }
                Symbol::N(nt) => {
                    if let Some(first) = self.first.get(&nt) {
                        set.extend(first.iter().copied());
                    }
                    if !self.nullable.contains(&nt) {
                        return (set, false);
                    }
                }
            }
        }
        (set, true)
    }

    /// Production to expand `nt` with when `lookahead` is next
    #[must_use]
    pub fn predict(&self, nt: NonTerminal, lookahead: TokenKind) -> Option<&'static Production> {
        self.table
            .get(&(nt, lookahead))
            .and_then(|&index| self.productions.get(index))
    }

    /// Tokens that may start an expansion of `nt`
    #[must_use]
    pub fn expected(&self, nt: NonTerminal) -> BTreeSet<TokenKind> {
        self.expected.get(&nt).cloned().unwrap_or_default()
    }

    /// All productions in declaration order
    #[must_use]
    pub const fn productions(&self) -> &'static [Production] {
        self.productions
    }

    #[must_use]
    pub fn is_nullable(&self, nt: NonTerminal) -> bool {
        self.nullable.contains(&nt)
    }

    #[must_use]
    pub fn first_set(&self, nt: NonTerminal) -> BTreeSet<TokenKind> {
        self.first.get(&nt).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn follow_set(&self, nt: NonTerminal) -> BTreeSet<TokenKind> {
        self.follow.get(&nt).cloned().unwrap_or_default()
    }

    /// Table cells claimed by more than one production (empty for LL(1))
    #[must_use]
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for production in self.productions {
            writeln!(f, "{production}")?;
        }
        Ok(())
    }
}

/// Validates `source` against the subset grammar.
///
/// Returns the parse tree on success, or the first violation found.
pub fn validate(source: &str) -> Result<ParseTree, GrammarViolation> {
    let tokens = lexer::tokenize(source);
    let root = Parser::new(grammar(), tokens).parse()?;
    Ok(ParseTree::new(source, root))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_grammar_is_ll1() {
        assert!(grammar().conflicts().is_empty(), "{:?}", grammar().conflicts());
    }

    #[test]
    fn test_singleton_is_shared() {
        assert!(std::ptr::eq(grammar(), grammar()));
    }

    #[test]
    fn test_nullable_sets() {
        let g = grammar();
        assert!(g.is_nullable(NonTerminal::FuncList));
        assert!(g.is_nullable(NonTerminal::ElseClause));
        assert!(g.is_nullable(NonTerminal::ReturnValue));
        assert!(!g.is_nullable(NonTerminal::Suite));
        assert!(!g.is_nullable(NonTerminal::Expr));
    }

    #[test]
    fn test_first_sets() {
        let g = grammar();
        let stmt: Vec<_> = g.first_set(NonTerminal::Stmt).into_iter().collect();
        assert_eq!(stmt, vec![TokenKind::If, TokenKind::Return, TokenKind::Name]);
        let factor = g.first_set(NonTerminal::Factor);
        assert!(factor.contains(&TokenKind::Minus));
        assert!(factor.contains(&TokenKind::LParen));
    }

    #[test]
    fn test_else_not_in_follow_of_else_clause() {
        let follow = grammar().follow_set(NonTerminal::ElseClause);
        assert!(!follow.contains(&TokenKind::Else));
        assert!(follow.contains(&TokenKind::Dedent));
    }

    #[test]
    fn test_predict() {
        let g = grammar();
        let p = g.predict(NonTerminal::Stmt, TokenKind::If).unwrap();
        assert_eq!(p.rhs, &[Symbol::N(NonTerminal::IfStmt)]);
        assert!(g.predict(NonTerminal::Stmt, TokenKind::Reserved).is_none());
    }

    #[test]
    fn test_display_lists_every_production() {
        let text = grammar().to_string();
        assert_eq!(text.lines().count(), PRODUCTIONS.len());
        assert!(text.contains("if_stmt      → 'if' expr ':' suite else_clause"));
        assert!(text.contains("else_clause  → ε"));
    }
}
