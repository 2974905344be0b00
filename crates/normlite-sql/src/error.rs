//! Error types for the SQL front end.
//!
//! Lexing and parsing only ever fail one way: a `SyntaxError` pointing back
//! at the offending position in the source text.

use std::fmt;
use thiserror::Error;

/// A position in the original SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Failure raised by the lexer or the parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("unexpected character {found:?} at {position}")]
    UnexpectedCharacter { found: char, position: Position },

    #[error("unterminated string literal starting at {position}")]
    UnterminatedString { position: Position },

    #[error("expected {expected}, found {found} at {position}")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: Position,
    },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("unknown type {name:?} at {position}")]
    UnknownType { name: String, position: Position },
}

pub type SyntaxResult<T> = Result<T, SyntaxError>;
