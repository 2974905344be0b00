#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]
//! # normlite-sql
//!
//! Tokenizer, parser, and AST for the restricted SQL dialect accepted by
//! normlite's cross-compiler. This crate has no knowledge of schema, the
//! Notion wire format, or transactions — it turns SQL text into an
//! immutable `Statement` tree and nothing more.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;

pub use ast::{ColumnDef, ComparisonOp, Constant, LogicalOp, SelectColumns, SqlType, Statement, WhereExpr};
pub use error::{Position, SyntaxError, SyntaxResult};
pub use lexer::{tokenize, Lexer, Token, TokenKind};
pub use parser::Parser;
