//! Concrete syntax tree produced by the parser.

use super::lexer::{Token, TokenKind};
use super::NonTerminal;

/// Child of a syntax node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxElement {
    Node(SyntaxNode),
    Token(Token),
}

/// Interior node labelled with the nonterminal it was expanded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    kind: NonTerminal,
    children: Vec<SyntaxElement>,
}

impl SyntaxNode {
    #[must_use]
    pub const fn new(kind: NonTerminal) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> NonTerminal {
        self.kind
    }

    #[must_use]
    pub fn children(&self) -> &[SyntaxElement] {
        &self.children
    }

    /// Direct child nodes, in order
    pub fn child_nodes(&self) -> impl Iterator<Item = &SyntaxNode> {
        self.children.iter().filter_map(|c| match c {
            SyntaxElement::Node(n) => Some(n),
            SyntaxElement::Token(_) => None,
        })
    }

    /// Direct child tokens, in order
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.children.iter().filter_map(|c| match c {
            SyntaxElement::Token(t) => Some(t),
            SyntaxElement::Node(_) => None,
        })
    }

    /// First direct child token of the given kind
    #[must_use]
    pub fn token(&self, kind: TokenKind) -> Option<&Token> {
        self.tokens().find(|t| t.kind == kind)
    }

    /// First token carrying source text, searching depth-first
    #[must_use]
    pub fn first_text_token(&self) -> Option<&Token> {
        self.children.iter().find_map(|c| match c {
            SyntaxElement::Token(t) if !t.kind.is_layout() => Some(t),
            SyntaxElement::Token(_) => None,
            SyntaxElement::Node(n) => n.first_text_token(),
        })
    }

    /// Last token carrying source text, searching depth-first
    #[must_use]
    pub fn last_text_token(&self) -> Option<&Token> {
        self.children.iter().rev().find_map(|c| match c {
            SyntaxElement::Token(t) if !t.kind.is_layout() => Some(t),
            SyntaxElement::Token(_) => None,
            SyntaxElement::Node(n) => n.last_text_token(),
        })
    }

    /// Byte range covered by the node's text
    #[must_use]
    pub fn text_range(&self) -> Option<(usize, usize)> {
        Some((self.first_text_token()?.start, self.last_text_token()?.end))
    }

    /// Line of the node's first token
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        self.first_text_token().map(|t| t.line)
    }

    /// Line of the node's last token
    #[must_use]
    pub fn end_line(&self) -> Option<usize> {
        self.last_text_token().map(|t| t.line)
    }

    pub(crate) fn push_token(&mut self, token: Token) {
        self.children.push(SyntaxElement::Token(token));
    }

    pub(crate) fn push_node(&mut self, node: SyntaxNode) {
        self.children.push(SyntaxElement::Node(node));
    }
}

/// A validated source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTree {
    source: String,
    root: SyntaxNode,
}

impl ParseTree {
    #[must_use]
    pub fn new(source: impl Into<String>, root: SyntaxNode) -> Self {
        Self {
            source: source.into(),
            root,
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub const fn root(&self) -> &SyntaxNode {
        &self.root
    }

    /// Source text of `node`, or "" for a node without text
    #[must_use]
    pub fn text(&self, node: &SyntaxNode) -> &str {
        node.text_range()
            .and_then(|(start, end)| self.source.get(start..end))
            .unwrap_or("")
    }
}
