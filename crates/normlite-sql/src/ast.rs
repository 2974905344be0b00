//! The abstract syntax tree produced by the parser.
//!
//! Every node is an immutable tagged variant; there is no dynamic dispatch
//! anywhere in this module, so the compiler downstream can match on the tag
//! directly instead of visiting through a trait object.

use crate::error::Position;
use std::fmt;

/// A SQL type name as written in a `CREATE TABLE` column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    Int,
    Varchar(u32),
    TitleVarchar(u32),
    Bool,
    Date,
    Number,
    Money(String),
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Varchar(n) => write!(f, "varchar({n})"),
            Self::TitleVarchar(n) => write!(f, "title_varchar({n})"),
            Self::Bool => write!(f, "bool"),
            Self::Date => write!(f, "date"),
            Self::Number => write!(f, "number"),
            Self::Money(currency) => write!(f, "money({currency})"),
        }
    }
}

/// A literal or bound-parameter value appearing in SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Integer(i64),
    Number(f64),
    Str(String),
    Bool(bool),
    Param(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum LogicalOp {
    And,
    Or,
}

/// A column definition inside `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    pub primary_key: bool,
}

/// A `WHERE` clause expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereExpr {
    Comparison { column: String, op: ComparisonOp, value: Constant },
    Logical { op: LogicalOp, left: Box<WhereExpr>, right: Box<WhereExpr> },
}

/// Top-level parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable {
        table: String,
        columns: Vec<ColumnDef>,
        position: Position,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Constant>,
        position: Position,
    },
    Select {
        table: String,
        columns: SelectColumns,
        filter: Option<WhereExpr>,
        position: Position,
    },
    DropTable {
        table: String,
        position: Position,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectColumns {
    All,
    Named(Vec<String>),
}

impl Statement {
    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Self::CreateTable { position, .. }
            | Self::Insert { position, .. }
            | Self::Select { position, .. }
            | Self::DropTable { position, .. } => *position,
        }
    }
}
