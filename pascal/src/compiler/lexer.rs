//! Lexical analysis.
use smol_str::SmolStr;

use crate::error::{PascalError, PascalResult};

use super::{
    cursor::{Cursor, EOF_CHAR},
    tokens::{Sym, Token, TokenKind, Word},
};

pub struct Lexer<'a> {
    cursor: Cursor<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            cursor: Cursor::new(source),
        }
    }

    /// Scan the next token. Once the source is exhausted every further
    /// call returns the sticky EOF token.
    pub fn next_token(&mut self) -> PascalResult<Token> {
        loop {
            let c = self.cursor.next();
            if c == EOF_CHAR && self.cursor.at_end() {
                return Ok(self.make(TokenKind::Eof, ""));
            }
            if c.is_whitespace() {
                continue;
            }

            return match c {
                '{' => self.consume_comment(),
                '\'' => self.consume_string(),
                '_' | 'a'..='z' | 'A'..='Z' => Ok(self.consume_ident(c)),
                '0'..='9' => Ok(self.consume_number(c)),
                _ => self.consume_symbol(c),
            };
        }
    }

    fn line(&self) -> u32 {
        self.cursor.line()
    }

    fn make(&self, kind: TokenKind, text: impl Into<SmolStr>) -> Token {
        Token {
            kind,
            text: text.into(),
            line: self.line(),
        }
    }

    /// Identifier or reserved word. Case is preserved in the token text
    /// and folded at lookup.
    fn consume_ident(&mut self, first: char) -> Token {
        let mut text = String::new();
        text.push(first);
        while matches!(self.cursor.peek(), '_' | 'a'..='z' | 'A'..='Z' | '0'..='9') {
            text.push(self.cursor.next());
        }
        match Word::parse(&text) {
            Some(word) => self.make(TokenKind::Word(word), text),
            None => self.make(TokenKind::Ident, text),
        }
    }

    /// Number literal: a digit run with at most one `.`. When the `.`
    /// is followed by another `.` it belongs to the `..` range symbol
    /// and is pushed back.
    fn consume_number(&mut self, first: char) -> Token {
        let mut text = String::new();
        text.push(first);
        let mut seen_dot = false;
        loop {
            match self.cursor.peek() {
                '0'..='9' => text.push(self.cursor.next()),
                '.' if !seen_dot => {
                    let dot = self.cursor.next();
                    if self.cursor.peek() == '.' {
                        // Range symbol, not a fraction.
                        self.cursor.push_back(dot);
                        break;
                    }
                    seen_dot = true;
                    text.push(dot);
                }
                _ => break,
            }
        }
        self.make(TokenKind::Number, text)
    }

    /// String literal in apostrophes; `''` is a literal apostrophe.
    /// Strings may not span lines.
    fn consume_string(&mut self) -> PascalResult<Token> {
        let line = self.line();
        let mut text = String::new();
        loop {
            let c = self.cursor.next();
            match c {
                '\'' => {
                    if self.cursor.peek() == '\'' {
                        self.cursor.next();
                        text.push('\'');
                    } else {
                        break;
                    }
                }
                '\n' => return Err(PascalError::at("unterminated string", text, line)),
                EOF_CHAR if self.cursor.at_end() => {
                    return Err(PascalError::at("unterminated string", text, line));
                }
                _ => text.push(c),
            }
        }
        Ok(Token {
            kind: TokenKind::Str,
            text: text.into(),
            line,
        })
    }

    /// Brace or paren-star comment; never nested, closed by either
    /// terminator. The token survives until the stream strips it.
    fn consume_comment(&mut self) -> PascalResult<Token> {
        let line = self.line();
        let mut text = String::new();
        loop {
            let c = self.cursor.next();
            if c == EOF_CHAR && self.cursor.at_end() {
                return Err(PascalError::at("unterminated comment", "", line));
            }
            if c == '}' {
                break;
            }
            if c == '*' && self.cursor.peek() == ')' {
                self.cursor.next();
                break;
            }
            text.push(c);
        }
        Ok(Token {
            kind: TokenKind::Comment,
            text: text.into(),
            line,
        })
    }

    /// Symbols, longest match. `(*` opens a comment.
    fn consume_symbol(&mut self, first: char) -> PascalResult<Token> {
        use Sym as S;
        let sym = match first {
            '<' => match self.cursor.peek() {
                '>' => self.two(S::NotEqual),
                '=' => self.two(S::LessEqual),
                '<' => self.two(S::ShiftLeft),
                _ => S::Less,
            },
            '>' => match self.cursor.peek() {
                '=' => self.two(S::GreaterEqual),
                '>' => self.two(S::ShiftRight),
                _ => S::Greater,
            },
            ':' => match self.cursor.peek() {
                '=' => self.two(S::Assign),
                _ => S::Colon,
            },
            '.' => match self.cursor.peek() {
                '.' => self.two(S::DotDot),
                _ => S::Dot,
            },
            '(' => match self.cursor.peek() {
                '*' => {
                    self.cursor.next();
                    return self.consume_comment();
                }
                _ => S::LeftParen,
            },
            '-' => S::Minus,
            '+' => S::Plus,
            '*' => S::Star,
            '/' => S::Slash,
            ';' => S::Semicolon,
            ',' => S::Comma,
            '[' => S::LeftBracket,
            ']' => S::RightBracket,
            ')' => S::RightParen,
            '=' => S::Equal,
            '^' => S::Caret,
            '@' => S::At,
            _ => {
                return Err(PascalError::at(
                    "unknown character",
                    first.to_string(),
                    self.line(),
                ));
            }
        };
        Ok(self.make(TokenKind::Sym(sym), sym.to_string()))
    }

    fn two(&mut self, sym: Sym) -> Sym {
        self.cursor.next();
        sym
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut out = vec![];
        loop {
            let token = lexer.next_token().unwrap();
            let kind = token.kind;
            out.push(kind);
            if kind == TokenKind::Eof {
                return out;
            }
        }
    }

    #[test]
    fn test_lex_assignment() {
        use TokenKind as TK;
        assert_eq!(
            kinds("x := 1;"),
            vec![
                TK::Ident,
                TK::Sym(Sym::Assign),
                TK::Number,
                TK::Sym(Sym::Semicolon),
                TK::Eof
            ]
        );
    }

    #[test]
    fn test_lex_range_is_not_a_fraction() {
        let mut lexer = Lexer::new("1..3");
        assert_eq!(lexer.next_token().unwrap().text, "1");
        assert!(lexer.next_token().unwrap().is_sym(Sym::DotDot));
        assert_eq!(lexer.next_token().unwrap().text, "3");
    }

    #[test]
    fn test_lex_real_literal() {
        let mut lexer = Lexer::new("3.14");
        let token = lexer.next_token().unwrap();
        assert_eq!(token.kind, TokenKind::Number);
        assert_eq!(token.text, "3.14");
    }

    #[test]
    fn test_lex_string_escape() {
        let mut lexer = Lexer::new("'it''s'");
        let token = lexer.next_token().unwrap();
        assert_eq!(token.kind, TokenKind::Str);
        assert_eq!(token.text, "it's");
    }

    #[test]
    fn test_lex_unterminated_string() {
        let mut lexer = Lexer::new("'oops");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn test_lex_both_comment_styles() {
        let mut lexer = Lexer::new("{ one } (* two *)");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Comment);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Comment);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_lex_reserved_word_any_case() {
        let mut lexer = Lexer::new("BEGIN End");
        assert!(lexer.next_token().unwrap().is_word(Word::Begin));
        assert!(lexer.next_token().unwrap().is_word(Word::End));
    }

    #[test]
    fn test_lex_line_numbers() {
        let mut lexer = Lexer::new("a\nb\nc");
        assert_eq!(lexer.next_token().unwrap().line, 1);
        assert_eq!(lexer.next_token().unwrap().line, 2);
        assert_eq!(lexer.next_token().unwrap().line, 3);
    }

    #[test]
    fn test_lex_unknown_character() {
        let mut lexer = Lexer::new("?");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn test_eof_is_sticky() {
        let mut lexer = Lexer::new("");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
    }
}
