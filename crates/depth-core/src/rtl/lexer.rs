//! Tokenizer for the supported Verilog/SystemVerilog subset

use crate::error::{DepthError, Result};

/// Directives whose whole line is ignored
const SKIPPED_DIRECTIVES: &[&str] = &[
    "timescale",
    "define",
    "undef",
    "include",
    "ifdef",
    "ifndef",
    "elsif",
    "else",
    "endif",
    "default_nettype",
    "resetall",
    "celldefine",
    "endcelldefine",
];

/// Multi-character operators, longest first
const OPERATORS: &[&str] = &[
    "<<<", ">>>", "===", "!==", "**", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "~&", "~|",
    "~^", "^~", "->", "+:", "-:", "(", ")", "[", "]", "{", "}", ";", ",", ".", ":", "?", "@", "#",
    "=", "+", "-", "*", "/", "%", "<", ">", "!", "~", "&", "|", "^",
];

/// A parsed numeric literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Literal {
    /// Explicit bit width of sized literals (`8'hff`)
    pub width: Option<u32>,
    /// Numeric value, `None` for x/z digits, reals or overflow
    pub value: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword
    Ident(String),
    /// System identifier such as `$signed`
    SystemIdent(String),
    Number(Literal),
    Str(String),
    Op(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

/// Split RTL source into tokens, terminated by a single `Eof` token
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> DepthError {
        DepthError::parse(self.line, self.column, message)
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => self.skip_line(),
                (Some('/'), Some('*')) => {
                    let (line, column) = (self.line, self.column);
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(DepthError::parse(
                                    line,
                                    column,
                                    "unterminated block comment",
                                ))
                            }
                        }
                    }
                }
                (Some('`'), _) => {
                    let (line, column) = (self.line, self.column);
                    self.bump();
                    let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                    if SKIPPED_DIRECTIVES.contains(&name.as_str()) {
                        self.skip_line();
                    } else {
                        return Err(DepthError::parse(
                            line,
                            column,
                            format!("macro usage `{} is not supported", name),
                        ));
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia()?;
        let (line, column) = (self.line, self.column);
        let make = |kind| Token { kind, line, column };

        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(make(TokenKind::Eof)),
        };

        if c.is_ascii_alphabetic() || c == '_' {
            let ident = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
            return Ok(make(TokenKind::Ident(ident)));
        }

        if c == '\\' {
            self.bump();
            let ident = self.take_while(|c| !c.is_whitespace());
            if ident.is_empty() {
                return Err(self.error("empty escaped identifier"));
            }
            return Ok(make(TokenKind::Ident(ident)));
        }

        if c == '$' {
            self.bump();
            let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
            return Ok(make(TokenKind::SystemIdent(format!("${}", name))));
        }

        if c == '"' {
            self.bump();
            let mut text = String::new();
            loop {
                match self.bump() {
                    Some('"') => break,
                    Some('\\') => {
                        if let Some(escaped) = self.bump() {
                            text.push(escaped);
                        }
                    }
                    Some('\n') | None => {
                        return Err(DepthError::parse(line, column, "unterminated string literal"))
                    }
                    Some(other) => text.push(other),
                }
            }
            return Ok(make(TokenKind::Str(text)));
        }

        if c.is_ascii_digit() || (c == '\'' && self.is_based_tick(1)) {
            return self.number().map(make);
        }

        for op in OPERATORS {
            if self.matches(op) {
                for _ in 0..op.len() {
                    self.bump();
                }
                return Ok(make(TokenKind::Op(*op)));
            }
        }

        Err(self.error(format!("unexpected character '{}'", c)))
    }

    fn matches(&self, op: &str) -> bool {
        op.chars()
            .enumerate()
            .all(|(i, expected)| self.peek_at(i) == Some(expected))
    }

    /// True if the char at `offset` starts the base part of a literal (`'h`, `'sb`, `'0`)
    fn is_based_tick(&self, offset: usize) -> bool {
        match self.peek_at(offset) {
            Some('s') | Some('S') => matches!(
                self.peek_at(offset + 1),
                Some('b' | 'B' | 'o' | 'O' | 'd' | 'D' | 'h' | 'H')
            ),
            Some('b' | 'B' | 'o' | 'O' | 'd' | 'D' | 'h' | 'H') => true,
            Some('0' | '1' | 'x' | 'X' | 'z' | 'Z') => true,
            _ => false,
        }
    }

    fn number(&mut self) -> Result<TokenKind> {
        let mut width = None;

        if self.peek() != Some('\'') {
            let digits = self.take_while(|c| c.is_ascii_digit() || c == '_');
            let clean: String = digits.chars().filter(|c| *c != '_').collect();

            // Real literal: value unknown for depth analysis purposes
            if self.peek() == Some('.') && self.peek_at(1).map_or(false, |c| c.is_ascii_digit()) {
                self.bump();
                self.take_while(|c| c.is_ascii_digit() || c == '_');
                return Ok(TokenKind::Number(Literal {
                    width: None,
                    value: None,
                }));
            }

            // Allow `8 'hff`
            let mut lookahead = 0;
            while self.peek_at(lookahead).map_or(false, |c| c == ' ' || c == '\t') {
                lookahead += 1;
            }
            if self.peek_at(lookahead) == Some('\'') && self.is_based_tick(lookahead + 1) {
                for _ in 0..lookahead {
                    self.bump();
                }
                let w: u32 = clean
                    .parse()
                    .map_err(|_| self.error(format!("invalid literal width '{}'", digits)))?;
                if w == 0 {
                    return Err(self.error("literal width must be positive"));
                }
                width = Some(w);
            } else {
                return Ok(TokenKind::Number(Literal {
                    width: None,
                    value: clean.parse().ok(),
                }));
            }
        }

        // Consume the tick
        self.bump();
        if matches!(self.peek(), Some('s' | 'S')) {
            self.bump();
        }

        let radix = match self.peek() {
            Some('b' | 'B') => 2,
            Some('o' | 'O') => 8,
            Some('d' | 'D') => 10,
            Some('h' | 'H') => 16,
            Some(fill @ ('0' | '1' | 'x' | 'X' | 'z' | 'Z')) => {
                // Unbased unsized fill literal: '0, '1, 'x, 'z
                self.bump();
                let value = match fill {
                    '0' => Some(0),
                    '1' => Some(u64::MAX),
                    _ => None,
                };
                return Ok(TokenKind::Number(Literal { width, value }));
            }
            _ => return Err(self.error("malformed based literal")),
        };
        self.bump();

        while matches!(self.peek(), Some(' ' | '\t')) {
            self.bump();
        }
        let digits = self.take_while(|c| {
            c.is_ascii_hexdigit() || matches!(c, '_' | 'x' | 'X' | 'z' | 'Z' | '?')
        });
        let clean: String = digits.chars().filter(|c| *c != '_').collect();
        if clean.is_empty() {
            return Err(self.error("based literal has no digits"));
        }
        let value = if clean.chars().any(|c| matches!(c, 'x' | 'X' | 'z' | 'Z' | '?')) {
            None
        } else {
            u64::from_str_radix(&clean, radix).ok()
        };
        Ok(TokenKind::Number(Literal { width, value }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_comments_and_directives_skipped() {
        let toks = kinds("`timescale 1ns/1ps\n// line\n/* block\n */ wire a;");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("wire".to_string()),
                TokenKind::Ident("a".to_string()),
                TokenKind::Op(";"),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_sized_literals() {
        let toks = kinds("8'hFF 4'b10_10 'd3 '0 2'bx1 16 'h10");
        let lits: Vec<Literal> = toks
            .into_iter()
            .filter_map(|k| match k {
                TokenKind::Number(l) => Some(l),
                _ => None,
            })
            .collect();
        assert_eq!(lits[0], Literal { width: Some(8), value: Some(255) });
        assert_eq!(lits[1], Literal { width: Some(4), value: Some(10) });
        assert_eq!(lits[2], Literal { width: None, value: Some(3) });
        assert_eq!(lits[3], Literal { width: None, value: Some(0) });
        assert_eq!(lits[4], Literal { width: Some(2), value: None });
        assert_eq!(lits[5], Literal { width: Some(16), value: Some(16) });
    }

    #[test]
    fn test_longest_operator_wins() {
        let toks = kinds("a <<< 2 <= b === c");
        assert!(toks.contains(&TokenKind::Op("<<<")));
        assert!(toks.contains(&TokenKind::Op("<=")));
        assert!(toks.contains(&TokenKind::Op("===")));
    }

    #[test]
    fn test_positions_are_tracked() {
        let toks = tokenize("wire\n  x;").unwrap();
        assert_eq!((toks[1].line, toks[1].column), (2, 3));
    }

    #[test]
    fn test_unterminated_comment_is_error() {
        let err = tokenize("wire a; /* oops").unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }

    #[test]
    fn test_macro_usage_rejected() {
        let err = tokenize("assign y = `WIDTH;").unwrap_err();
        assert!(err.to_string().contains("WIDTH"));
    }

    #[test]
    fn test_unexpected_character() {
        assert!(tokenize("wire a ¤;").is_err());
    }
}
