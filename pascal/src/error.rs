//! Result and errors.
use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

pub type PascalResult<T> = std::result::Result<T, PascalError>;

/// Error raised by any stage of the pipeline.
///
/// Lexing, parsing, code generation and the running machine all report
/// failures through this one type; the first error aborts the stage that
/// raised it. The offending token is attached when the stage had one in
/// hand, so the host can point the user at a source line.
#[derive(Debug, Clone, PartialEq)]
pub struct PascalError {
    message: String,
    token: Option<ErrorToken>,
}

/// Source text and line of the token an error was reported against.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorToken {
    pub text: SmolStr,
    pub line: u32,
}

impl PascalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            token: None,
        }
    }

    /// Error anchored to a piece of source text.
    pub fn at(message: impl Into<String>, text: impl Into<SmolStr>, line: u32) -> Self {
        Self {
            message: message.into(),
            token: Some(ErrorToken {
                text: text.into(),
                line,
            }),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn token(&self) -> Option<&ErrorToken> {
        self.token.as_ref()
    }

    pub fn line(&self) -> Option<u32> {
        self.token.as_ref().map(|t| t.line)
    }
}

impl Display for PascalError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(token) = &self.token {
            if token.text.is_empty() {
                write!(f, " (line {})", token.line)?;
            } else {
                write!(f, " at '{}' (line {})", token.text, token.line)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for PascalError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display_with_token() {
        let err = PascalError::at("unexpected token", ";", 12);
        assert_eq!(err.to_string(), "unexpected token at ';' (line 12)");
    }

    #[test]
    fn test_display_bare() {
        let err = PascalError::new("division by zero");
        assert_eq!(err.to_string(), "division by zero");
    }
}
