//! Recursive-descent parser over the token stream produced by [`crate::lexer`].
//!
//! The parser does not resolve identifiers against schema; that is a
//! downstream concern of the compiler once a `MetaData` registry is
//! available.

use crate::ast::{ColumnDef, ComparisonOp, Constant, LogicalOp, SelectColumns, SqlType, Statement, WhereExpr};
use crate::error::{Position, SyntaxError, SyntaxResult};
use crate::lexer::{tokenize, Token, TokenKind};
use tracing::debug;

pub struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl Parser {
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, cursor: 0 }
    }

    /// Tokenizes `sql` and parses exactly one statement.
    pub fn parse_statement(sql: &str) -> SyntaxResult<Statement> {
        let tokens = tokenize(sql)?;
        let mut parser = Self::new(tokens);
        parser.statement()
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.cursor < self.tokens.len() - 1 {
            self.cursor += 1;
        }
        token
    }

    fn at_keyword(&self, word: &str) -> bool {
        let token = self.peek();
        token.kind == TokenKind::Keyword && token.lexeme.eq_ignore_ascii_case(word)
    }

    fn at_symbol(&self, symbol: &str) -> bool {
        let token = self.peek();
        token.kind == TokenKind::Symbol && token.lexeme == symbol
    }

    fn expect_keyword(&mut self, word: &str) -> SyntaxResult<Token> {
        if self.at_keyword(word) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(word))
        }
    }

    fn expect_symbol(&mut self, symbol: &str) -> SyntaxResult<Token> {
        if self.at_symbol(symbol) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(symbol))
        }
    }

    fn expect_identifier(&mut self) -> SyntaxResult<String> {
        let token = self.peek().clone();
        if token.kind == TokenKind::Identifier {
            self.advance();
            Ok(token.lexeme)
        } else {
            Err(self.unexpected("an identifier"))
        }
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            SyntaxError::UnexpectedEof { expected: expected.to_string() }
        } else {
            SyntaxError::UnexpectedToken {
                expected: expected.to_string(),
                found: token.lexeme.clone(),
                position: token.position,
            }
        }
    }

    fn statement(&mut self) -> SyntaxResult<Statement> {
        let position = self.peek().position;
        if self.at_keyword("CREATE") {
            self.create_table(position)
        } else if self.at_keyword("INSERT") {
            self.insert(position)
        } else if self.at_keyword("SELECT") {
            self.select(position)
        } else if self.at_keyword("DROP") {
            self.drop_table(position)
        } else {
            Err(self.unexpected("CREATE, INSERT, SELECT, or DROP"))
        }
    }

    fn create_table(&mut self, position: Position) -> SyntaxResult<Statement> {
        self.expect_keyword("CREATE")?;
        self.expect_keyword("TABLE")?;
        let table = self.expect_identifier()?;
        self.expect_symbol("(")?;
        let mut columns = Vec::new();
        loop {
            let name = self.expect_identifier()?;
            let sql_type = self.sql_type()?;
            columns.push(ColumnDef { name, sql_type, primary_key: false });
            if self.at_symbol(",") {
                self.advance();
                continue;
            }
            break;
        }
        self.expect_symbol(")")?;
        debug!(table = %table, columns = columns.len(), "parsed CREATE TABLE");
        Ok(Statement::CreateTable { table, columns, position })
    }

    fn sql_type(&mut self) -> SyntaxResult<SqlType> {
        let token = self.peek().clone();
        if token.kind != TokenKind::Keyword {
            return Err(self.unexpected("a column type"));
        }
        let upper = token.lexeme.to_ascii_uppercase();
        self.advance();
        match upper.as_str() {
            "INT" => Ok(SqlType::Int),
            "BOOL" => Ok(SqlType::Bool),
            "DATE" => Ok(SqlType::Date),
            "NUMBER" => Ok(SqlType::Number),
            "VARCHAR" => Ok(SqlType::Varchar(self.type_length()?)),
            "TITLE_VARCHAR" => Ok(SqlType::TitleVarchar(self.type_length()?)),
            "MONEY" => {
                self.expect_symbol("(")?;
                let currency = self.expect_identifier()?;
                self.expect_symbol(")")?;
                Ok(SqlType::Money(currency))
            }
            _ => Err(SyntaxError::UnknownType { name: token.lexeme, position: token.position }),
        }
    }

    fn type_length(&mut self) -> SyntaxResult<u32> {
        self.expect_symbol("(")?;
        let token = self.peek().clone();
        if token.kind != TokenKind::Number {
            return Err(self.unexpected("a numeric length"));
        }
        self.advance();
        self.expect_symbol(")")?;
        token.lexeme.parse::<u32>().map_err(|_| SyntaxError::UnexpectedToken {
            expected: "a numeric length".to_string(),
            found: token.lexeme,
            position: token.position,
        })
    }

    fn insert(&mut self, position: Position) -> SyntaxResult<Statement> {
        self.expect_keyword("INSERT")?;
        self.expect_keyword("INTO")?;
        let table = self.expect_identifier()?;
        let columns = self.identifier_list()?;
        self.expect_keyword("VALUES")?;
        let values = self.value_list()?;
        if values.len() != columns.len() {
            return Err(SyntaxError::UnexpectedToken {
                expected: format!("{} values", columns.len()),
                found: format!("{} values", values.len()),
                position,
            });
        }
        Ok(Statement::Insert { table, columns, values, position })
    }

    fn identifier_list(&mut self) -> SyntaxResult<Vec<String>> {
        self.expect_symbol("(")?;
        let mut names = Vec::new();
        loop {
            names.push(self.expect_identifier()?);
            if self.at_symbol(",") {
                self.advance();
                continue;
            }
            break;
        }
        self.expect_symbol(")")?;
        Ok(names)
    }

    fn value_list(&mut self) -> SyntaxResult<Vec<Constant>> {
        self.expect_symbol("(")?;
        let mut values = Vec::new();
        loop {
            values.push(self.constant()?);
            if self.at_symbol(",") {
                self.advance();
                continue;
            }
            break;
        }
        self.expect_symbol(")")?;
        Ok(values)
    }

    fn constant(&mut self) -> SyntaxResult<Constant> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number => {
                self.advance();
                if token.lexeme.contains('.') {
                    token.lexeme.parse::<f64>().map(Constant::Number).map_err(|_| self.unexpected("a number"))
                } else {
                    token.lexeme.parse::<i64>().map(Constant::Integer).map_err(|_| self.unexpected("an integer"))
                }
            }
            TokenKind::String => {
                self.advance();
                Ok(Constant::Str(token.lexeme))
            }
            TokenKind::Symbol if token.lexeme.starts_with(':') => {
                self.advance();
                Ok(Constant::Param(token.lexeme[1..].to_string()))
            }
            TokenKind::Keyword if token.lexeme.eq_ignore_ascii_case("true") => {
                self.advance();
                Ok(Constant::Bool(true))
            }
            TokenKind::Keyword if token.lexeme.eq_ignore_ascii_case("false") => {
                self.advance();
                Ok(Constant::Bool(false))
            }
            _ => Err(self.unexpected("a literal value or named parameter")),
        }
    }

    fn select(&mut self, position: Position) -> SyntaxResult<Statement> {
        self.expect_keyword("SELECT")?;
        let columns = if self.at_symbol("*") {
            self.advance();
            SelectColumns::All
        } else {
            let mut names = vec![self.expect_identifier()?];
            while self.at_symbol(",") {
                self.advance();
                names.push(self.expect_identifier()?);
            }
            SelectColumns::Named(names)
        };
        self.expect_keyword("FROM")?;
        let table = self.expect_identifier()?;
        let filter = if self.at_keyword("WHERE") {
            self.advance();
            Some(self.where_expr()?)
        } else {
            None
        };
        Ok(Statement::Select { table, columns, filter, position })
    }

    // WHERE grammar: `or_expr := and_expr (OR and_expr)*`, `and_expr :=
    // comparison (AND comparison)*`, so AND binds tighter than OR.
    fn where_expr(&mut self) -> SyntaxResult<WhereExpr> {
        let mut left = self.and_expr()?;
        while self.at_keyword("OR") {
            self.advance();
            let right = self.and_expr()?;
            left = WhereExpr::Logical { op: LogicalOp::Or, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> SyntaxResult<WhereExpr> {
        let mut left = self.comparison()?;
        while self.at_keyword("AND") {
            self.advance();
            let right = self.comparison()?;
            left = WhereExpr::Logical { op: LogicalOp::And, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn comparison(&mut self) -> SyntaxResult<WhereExpr> {
        if self.at_symbol("(") {
            self.advance();
            let inner = self.where_expr()?;
            self.expect_symbol(")")?;
            return Ok(inner);
        }
        let column = self.expect_identifier()?;
        let op = self.comparison_op()?;
        let value = self.constant()?;
        Ok(WhereExpr::Comparison { column, op, value })
    }

    fn comparison_op(&mut self) -> SyntaxResult<ComparisonOp> {
        let token = self.peek().clone();
        let op = match token.lexeme.as_str() {
            "=" => ComparisonOp::Eq,
            "!=" => ComparisonOp::NotEq,
            "<" => ComparisonOp::Lt,
            "<=" => ComparisonOp::LtEq,
            ">" => ComparisonOp::Gt,
            ">=" => ComparisonOp::GtEq,
            _ => return Err(self.unexpected("a comparison operator")),
        };
        self.advance();
        Ok(op)
    }

    fn drop_table(&mut self, position: Position) -> SyntaxResult<Statement> {
        self.expect_keyword("DROP")?;
        self.expect_keyword("TABLE")?;
        let table = self.expect_identifier()?;
        Ok(Statement::DropTable { table, position })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Constant;

    #[test]
    fn parses_create_table_with_multiple_columns() {
        let stmt = Parser::parse_statement(
            "CREATE TABLE students (id int, name title_varchar(255), grade varchar(1))",
        )
        .unwrap();
        match stmt {
            Statement::CreateTable { table, columns, .. } => {
                assert_eq!(table, "students");
                assert_eq!(columns.len(), 3);
                assert_eq!(columns[1].sql_type, SqlType::TitleVarchar(255));
            }
            other => panic!("expected CreateTable, got {other:?}"),
        }
    }

    #[test]
    fn parses_insert_with_literals() {
        let stmt = Parser::parse_statement(
            "INSERT INTO students (id, name, grade) VALUES (1, 'Isaac Newton', 'B')",
        )
        .unwrap();
        match stmt {
            Statement::Insert { columns, values, .. } => {
                assert_eq!(columns, vec!["id", "name", "grade"]);
                assert_eq!(values[0], Constant::Integer(1));
                assert_eq!(values[1], Constant::Str("Isaac Newton".to_string()));
            }
            other => panic!("expected Insert, got {other:?}"),
        }
    }

    #[test]
    fn parses_insert_with_named_parameters() {
        let stmt = Parser::parse_statement(
            "INSERT INTO students (id, name, grade) VALUES (:id, :name, :grade)",
        )
        .unwrap();
        match stmt {
            Statement::Insert { values, .. } => {
                assert_eq!(values[0], Constant::Param("id".to_string()));
            }
            other => panic!("expected Insert, got {other:?}"),
        }
    }

    #[test]
    fn parses_select_star_without_where() {
        let stmt = Parser::parse_statement("SELECT * FROM students").unwrap();
        match stmt {
            Statement::Select { columns, filter, .. } => {
                assert_eq!(columns, SelectColumns::All);
                assert!(filter.is_none());
            }
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn and_binds_tighter_than_or_in_where() {
        let stmt = Parser::parse_statement(
            "SELECT id FROM students WHERE grade = 'A' OR grade = 'B' AND id > 1",
        )
        .unwrap();
        let Statement::Select { filter: Some(WhereExpr::Logical { op: LogicalOp::Or, right, .. }), .. } = stmt
        else {
            panic!("expected a top-level OR");
        };
        assert!(matches!(*right, WhereExpr::Logical { op: LogicalOp::And, .. }));
    }

    #[test]
    fn parenthesized_where_regroups_precedence() {
        let stmt = Parser::parse_statement(
            "SELECT id FROM students WHERE (grade = 'A' OR grade = 'B') AND id > 1",
        )
        .unwrap();
        let Statement::Select { filter: Some(WhereExpr::Logical { op: LogicalOp::And, left, .. }), .. } = stmt
        else {
            panic!("expected a top-level AND");
        };
        assert!(matches!(*left, WhereExpr::Logical { op: LogicalOp::Or, .. }));
    }

    #[test]
    fn reports_expected_vs_actual_token_on_failure() {
        let err = Parser::parse_statement("CREATE students (id int)").unwrap_err();
        match err {
            SyntaxError::UnexpectedToken { expected, .. } => assert_eq!(expected, "TABLE"),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn parses_drop_table() {
        let stmt = Parser::parse_statement("DROP TABLE students").unwrap();
        assert!(matches!(stmt, Statement::DropTable { .. }));
    }
}
