//! Indentation-aware tokenizer for the supported subset.
//!
//! The lexer never fails: anything it cannot classify becomes a
//! [`TokenKind::Illegal`] or [`TokenKind::Reserved`] token, and the parser
//! turns the first such token into a [`GrammarViolation`](crate::GrammarViolation)
//! with a proper expected-token set.

use serde::Serialize;

/// Columns a tab advances to
pub const TAB_WIDTH: usize = 4;

/// Host-language keywords that are outside the subset.
const RESERVED: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "del", "elif", "except", "finally", "for", "from", "global", "import", "in",
    "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "try", "while", "with", "yield",
];

/// Token categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TokenKind {
    /// `def`
    Def,
    /// `if`
    If,
    /// `else`
    Else,
    /// `return`
    Return,
    /// Identifier
    Name,
    /// Integer or decimal literal
    Number,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    LtEq,
    /// `>=`
    GtEq,
    /// `=`
    Assign,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// End of a logical line
    Newline,
    /// Indentation increased
    Indent,
    /// Indentation decreased
    Dedent,
    /// End of input
    Eof,
    /// Keyword of the host language that the subset does not support
    Reserved,
    /// Character or layout the lexer could not classify
    Illegal,
}

impl TokenKind {
    /// Human-readable name used in expected-token sets
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Def => "'def'",
            Self::If => "'if'",
            Self::Else => "'else'",
            Self::Return => "'return'",
            Self::Name => "identifier",
            Self::Number => "number",
            Self::Plus => "'+'",
            Self::Minus => "'-'",
            Self::Star => "'*'",
            Self::Slash => "'/'",
            Self::EqEq => "'=='",
            Self::NotEq => "'!='",
            Self::Lt => "'<'",
            Self::Gt => "'>'",
            Self::LtEq => "'<='",
            Self::GtEq => "'>='",
            Self::Assign => "'='",
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::Comma => "','",
            Self::Colon => "':'",
            Self::Newline => "newline",
            Self::Indent => "indent",
            Self::Dedent => "dedent",
            Self::Eof => "end of input",
            Self::Reserved => "reserved keyword",
            Self::Illegal => "illegal character",
        }
    }

    /// Tokens without source text
    #[must_use]
    pub const fn is_layout(self) -> bool {
        matches!(self, Self::Newline | Self::Indent | Self::Dedent | Self::Eof)
    }
}

/// A lexed token with its position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    /// Category
    pub kind: TokenKind,
    /// Source text (empty for layout tokens, message for layout errors)
    pub text: String,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// 1-based line
    pub line: usize,
    /// 1-based column, in characters
    pub column: usize,
}

impl Token {
    /// Description of this token for error messages
    #[must_use]
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Name => format!("identifier '{}'", self.text),
            TokenKind::Number => format!("number {}", self.text),
            TokenKind::Reserved => format!("'{}'", self.text),
            TokenKind::Illegal => self.text.clone(),
            TokenKind::Indent => "unexpected indent".to_string(),
            kind => kind.describe().to_string(),
        }
    }
}

/// Tokenizer over a whole source file
#[derive(Debug)]
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    col: usize,
    indents: Vec<usize>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer for the given source
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            col: 1,
            indents: vec![0],
            tokens: Vec::new(),
        }
    }

    /// Tokenizes the entire input, ending with dedents and `Eof`
    #[must_use]
    pub fn tokenize(mut self) -> Vec<Token> {
        while self.pos < self.input.len() {
            self.logical_line();
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push_layout(TokenKind::Dedent);
        }
        self.push_layout(TokenKind::Eof);
        self.tokens
    }

    fn logical_line(&mut self) {
        let mut width = 0;
        while let Some(ch) = self.current_char() {
            match ch {
                ' ' => width += 1,
                '\t' => width += TAB_WIDTH - width % TAB_WIDTH,
                _ => break,
            }
            self.advance();
        }

        match self.current_char() {
            None => return,
            Some('\n' | '\r') => {
                self.consume_newline();
                return;
            }
            Some('#') => {
                self.skip_comment();
                self.consume_newline();
                return;
            }
            Some(_) => {}
        }

        self.indentation(width);

        loop {
            self.skip_inline_whitespace();
            match self.current_char() {
                None => {
                    self.push_layout(TokenKind::Newline);
                    return;
                }
                Some('\n' | '\r') => {
                    self.push_layout(TokenKind::Newline);
                    self.consume_newline();
                    return;
                }
                Some('#') => self.skip_comment(),
                Some(ch) => self.scan(ch),
            }
        }
    }

    fn indentation(&mut self, width: usize) {
        let top = self.indents.last().copied().unwrap_or(0);
        if width > top {
            self.indents.push(width);
            self.push_layout(TokenKind::Indent);
            return;
        }
        while width < self.indents.last().copied().unwrap_or(0) {
            self.indents.pop();
            self.push_layout(TokenKind::Dedent);
        }
        if width != self.indents.last().copied().unwrap_or(0) {
            let column = self.column();
            self.tokens.push(Token {
                kind: TokenKind::Illegal,
                text: "inconsistent dedent".to_string(),
                start: self.pos,
                end: self.pos,
                line: self.line,
                column,
            });
        }
    }

    fn scan(&mut self, ch: char) {
        let start = self.pos;
        let column = self.column();
        let kind = match ch {
            c if c.is_ascii_alphabetic() || c == '_' => self.read_word(),
            c if c.is_ascii_digit() => self.read_number(),
            '=' | '!' | '<' | '>' => self.read_comparison(ch),
            _ => {
                self.advance();
                match ch {
                    '+' => TokenKind::Plus,
                    '-' => TokenKind::Minus,
                    '*' => TokenKind::Star,
                    '/' => TokenKind::Slash,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    ',' => TokenKind::Comma,
                    ':' => TokenKind::Colon,
                    _ => TokenKind::Illegal,
                }
            }
        };
        let lexeme = &self.input[start..self.pos];
        let text = if kind == TokenKind::Illegal {
            format!("illegal character '{lexeme}'")
        } else {
            lexeme.to_string()
        };
        self.tokens.push(Token {
            kind,
            text,
            start,
            end: self.pos,
            line: self.line,
            column,
        });
    }

    fn read_word(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(c) = self.current_char() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        match &self.input[start..self.pos] {
            "def" => TokenKind::Def,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "return" => TokenKind::Return,
            word if RESERVED.contains(&word) => TokenKind::Reserved,
            _ => TokenKind::Name,
        }
    }

    fn read_number(&mut self) -> TokenKind {
        self.skip_digits();
        if self.current_char() == Some('.') && self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            self.skip_digits();
        }
        TokenKind::Number
    }

    fn read_comparison(&mut self, first: char) -> TokenKind {
        self.advance();
        let doubled = self.current_char() == Some('=');
        if doubled {
            self.advance();
        }
        match (first, doubled) {
            ('=', true) => TokenKind::EqEq,
            ('=', false) => TokenKind::Assign,
            ('!', true) => TokenKind::NotEq,
            ('<', true) => TokenKind::LtEq,
            ('<', false) => TokenKind::Lt,
            ('>', true) => TokenKind::GtEq,
            ('>', false) => TokenKind::Gt,
            _ => TokenKind::Illegal,
        }
    }

    fn push_layout(&mut self, kind: TokenKind) {
        let column = self.column();
        self.tokens.push(Token {
            kind,
            text: String::new(),
            start: self.pos,
            end: self.pos,
            line: self.line,
            column,
        });
    }

    fn column(&self) -> usize {
        self.col
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
            self.col += 1;
        }
    }

    fn skip_digits(&mut self) {
        while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
    }

    fn skip_inline_whitespace(&mut self) {
        while matches!(self.current_char(), Some(' ' | '\t' | '\x0c')) {
            self.advance();
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch == '\n' || ch == '\r' {
                break;
            }
            self.advance();
        }
    }

    fn consume_newline(&mut self) {
        if self.current_char() == Some('\r') {
            self.advance();
        }
        if self.current_char() == Some('\n') {
            self.advance();
        }
        self.line += 1;
        self.col = 1;
    }
}

/// Tokenizes `source`
#[must_use]
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_function() {
        use TokenKind::*;
        assert_eq!(
            kinds("def f(a, b):\n    return a + b\n"),
            vec![
                Def, Name, LParen, Name, Comma, Name, RParen, Colon, Newline, Indent, Return,
                Name, Plus, Name, Newline, Dedent, Eof
            ]
        );
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        use TokenKind::*;
        let source = "# header\n\ndef f():\n    # inside\n\n    x = 1  # trailing\n";
        assert_eq!(
            kinds(source),
            vec![Def, Name, LParen, RParen, Colon, Newline, Indent, Name, Assign, Number, Newline, Dedent, Eof]
        );
    }

    #[test]
    fn test_comparison_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("a == b != c < d > e <= f >= g = h"),
            vec![Name, EqEq, Name, NotEq, Name, Lt, Name, Gt, Name, LtEq, Name, GtEq, Name, Assign, Name, Newline, Eof]
        );
    }

    #[test]
    fn test_nested_dedents_close_at_eof() {
        use TokenKind::*;
        let source = "def f(a):\n    if a:\n        return 1\n    return 2";
        let tokens = kinds(source);
        assert_eq!(&tokens[tokens.len() - 3..], &[Dedent, Dedent, Eof][..]);
        let dedents = tokens.iter().filter(|k| **k == Dedent).count();
        let indents = tokens.iter().filter(|k| **k == Indent).count();
        assert_eq!(dedents, indents);
    }

    #[test]
    fn test_tab_counts_as_four_columns() {
        use TokenKind::*;
        let source = "def f():\n\tx = 1\n    return x\n";
        let tokens = kinds(source);
        assert!(!tokens.contains(&Illegal));
        assert_eq!(tokens.iter().filter(|k| **k == Indent).count(), 1);
    }

    #[test]
    fn test_inconsistent_dedent_is_illegal() {
        let source = "def f():\n        x = 1\n    return x\n";
        let tokens = tokenize(source);
        let bad = tokens.iter().find(|t| t.kind == TokenKind::Illegal).unwrap();
        assert_eq!(bad.text, "inconsistent dedent");
        assert_eq!(bad.line, 3);
    }

    #[test]
    fn test_reserved_and_illegal() {
        let tokens = tokenize("for x in y: z[0]");
        assert_eq!(tokens[0].kind, TokenKind::Reserved);
        assert_eq!(tokens[0].describe(), "'for'");
        let bracket = tokens.iter().find(|t| t.kind == TokenKind::Illegal).unwrap();
        assert_eq!(bracket.describe(), "illegal character '['");
        assert_eq!(bracket.column, 14);
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("x = 3.25 + 10");
        let numbers: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Number)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(numbers, vec!["3.25", "10"]);
    }

    #[test]
    fn test_positions_and_spans() {
        let source = "def g():\n    return 7\n";
        let tokens = tokenize(source);
        let ret = tokens.iter().find(|t| t.kind == TokenKind::Return).unwrap();
        assert_eq!((ret.line, ret.column), (2, 5));
        assert_eq!(&source[ret.start..ret.end], "return");
    }

    #[test]
    fn test_columns_on_long_line() {
        let source = format!("x = {}1\n", "1 + ".repeat(50_000));
        let tokens = tokenize(&source);
        let last = tokens.iter().rev().find(|t| t.kind == TokenKind::Number).unwrap();
        assert_eq!(last.line, 1);
        assert_eq!(last.column, source.trim_end().chars().count());
    }

    #[test]
    fn test_columns_count_chars_not_bytes() {
        let source = "# héllo wörld\nx = \"é\" + y\n";
        let tokens = tokenize(source);
        let y = tokens.iter().find(|t| t.text == "y").unwrap();
        assert_eq!((y.line, y.column), (2, 11));
        assert_eq!(&source[y.start..y.end], "y");
    }

    #[test]
    fn test_crlf_line_endings() {
        use TokenKind::*;
        assert_eq!(
            kinds("def f():\r\n    return 1\r\n"),
            vec![Def, Name, LParen, RParen, Colon, Newline, Indent, Return, Number, Newline, Dedent, Eof]
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("   \n# only a comment\n"), vec![TokenKind::Eof]);
    }
}
