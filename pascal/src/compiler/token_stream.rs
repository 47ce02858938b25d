//! Peekable token stream.
use crate::error::{PascalError, PascalResult};

use super::{
    lexer::Lexer,
    tokens::{Sym, Token, TokenKind, Word},
};

/// Buffered stream of tokens with one-token lookahead.
///
/// Tokens are lazily lexed; comment tokens are silently dropped so the
/// parser never sees them.
pub struct TokenStream<'a> {
    lexer: Lexer<'a>,
    lookahead: Option<Token>,
}

impl<'a> TokenStream<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Self {
            lexer,
            lookahead: None,
        }
    }

    fn fill(&mut self) -> PascalResult<()> {
        while self.lookahead.is_none() {
            let token = self.lexer.next_token()?;
            if token.kind != TokenKind::Comment {
                self.lookahead = Some(token);
            }
        }
        Ok(())
    }

    /// Current token without advancing.
    pub fn peek(&mut self) -> PascalResult<&Token> {
        self.fill()?;
        Ok(self.lookahead.as_ref().unwrap())
    }

    /// Current token kind without advancing.
    pub fn peek_kind(&mut self) -> PascalResult<TokenKind> {
        Ok(self.peek()?.kind)
    }

    /// Consume and return the current token.
    pub fn next_token(&mut self) -> PascalResult<Token> {
        self.fill()?;
        Ok(self.lookahead.take().unwrap())
    }

    /// Consume the current token if it is the given symbol.
    pub fn match_sym(&mut self, sym: Sym) -> PascalResult<bool> {
        if self.peek()?.is_sym(sym) {
            self.next_token()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consume the current token if it is the given reserved word.
    pub fn match_word(&mut self, word: Word) -> PascalResult<bool> {
        if self.peek()?.is_word(word) {
            self.next_token()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consume the current token, which must be the given symbol.
    pub fn expect_sym(&mut self, sym: Sym) -> PascalResult<Token> {
        let token = self.next_token()?;
        if token.is_sym(sym) {
            Ok(token)
        } else {
            Err(unexpected(&token, &format!("expected '{sym}'")))
        }
    }

    /// Consume the current token, which must be the given reserved word.
    pub fn expect_word(&mut self, word: Word) -> PascalResult<Token> {
        let token = self.next_token()?;
        if token.is_word(word) {
            Ok(token)
        } else {
            Err(unexpected(&token, &format!("expected '{word}'")))
        }
    }

    /// Consume the current token, which must be an identifier.
    pub fn expect_ident(&mut self) -> PascalResult<Token> {
        let token = self.next_token()?;
        if token.kind == TokenKind::Ident {
            Ok(token)
        } else {
            Err(unexpected(&token, "expected identifier"))
        }
    }
}

/// Parse error pointing at the token that broke the grammar.
pub fn unexpected(token: &Token, message: &str) -> PascalError {
    if token.kind == TokenKind::Eof {
        PascalError::at(format!("{message}, found end of input"), "", token.line)
    } else {
        PascalError::at(message.to_string(), token.text.clone(), token.line)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn stream(source: &str) -> TokenStream {
        TokenStream::new(Lexer::new(source))
    }

    #[test]
    fn test_comments_are_stripped() {
        let mut s = stream("a { note } b (* note *) c");
        assert_eq!(s.next_token().unwrap().text, "a");
        assert_eq!(s.peek().unwrap().text, "b");
        assert_eq!(s.next_token().unwrap().text, "b");
        assert_eq!(s.next_token().unwrap().text, "c");
        assert_eq!(s.peek_kind().unwrap(), TokenKind::Eof);
    }

    #[test]
    fn test_match_does_not_consume_on_miss() {
        let mut s = stream(";");
        assert!(!s.match_sym(Sym::Comma).unwrap());
        assert!(s.match_sym(Sym::Semicolon).unwrap());
    }

    #[test]
    fn test_expect_reports_offender() {
        let mut s = stream("begin");
        let err = s.expect_sym(Sym::Semicolon).unwrap_err();
        assert_eq!(err.token().unwrap().text, "begin");
        assert_eq!(err.line(), Some(1));
    }
}
