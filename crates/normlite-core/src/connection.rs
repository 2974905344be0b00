//! The high-level DBAPI-shaped surface: `Connection`, the transaction-aware
//! cursor it hands back from `execute`, and the composite cursor it builds
//! once a transaction commits.

use crate::client::NotionClient;
use crate::error::{NormliteError, NormliteResult};
use crate::row::Row;
use crate::schema::MetaData;
use crate::transaction::{Transaction, TransactionManager, TransactionState};
use normlite_sql::Statement;
use serde_json::Value as Json;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// `paramstyle` is fixed at `named` — the only style `:param` placeholders
/// in this dialect ever mean.
pub const PARAMSTYLE: &str = "named";

/// A single operation's result set. Mutating statements carry no rows but
/// may carry a `lastrowid` candidate; `SELECT` carries rows and no id.
#[derive(Debug)]
pub struct Cursor {
    returns_rows: bool,
    rows: Vec<Row>,
    position: usize,
    last_modified_id: Option<String>,
    closed: bool,
}

impl Cursor {
    fn new(returns_rows: bool, rows: Vec<Row>, last_modified_id: Option<String>) -> Self {
        Self { returns_rows, rows, position: 0, last_modified_id, closed: false }
    }

    fn empty() -> Self {
        Self::new(false, Vec::new(), None)
    }

    #[must_use]
    pub fn description(&self) -> Option<Vec<(String, &'static str)>> {
        if !self.returns_rows {
            return None;
        }
        self.rows.first().map(|r| r.metadata().description().unwrap_or_default()).or(Some(Vec::new()))
    }

    /// Count of rows produced by `SELECT`, or `-1` for a statement that
    /// doesn't return rows (`rowcount` is indeterminate for those: Notion
    /// doesn't report an affected-row count for a single-object mutation).
    #[must_use]
    pub fn rowcount(&self) -> i64 {
        if self.returns_rows {
            self.rows.len() as i64
        } else {
            -1
        }
    }

    /// 128-bit interpretation of the id of the last object this statement
    /// created or renamed; `None` for `SELECT`/`DROP TABLE`.
    #[must_use]
    pub fn lastrowid(&self) -> Option<u128> {
        let id = self.last_modified_id.as_deref()?;
        Uuid::parse_str(id).ok().map(|u| u.as_u128())
    }

    pub fn fetchone(&mut self) -> NormliteResult<Option<Row>> {
        self.ensure_open()?;
        if self.position >= self.rows.len() {
            return Ok(None);
        }
        let row = self.rows[self.position].clone();
        self.position += 1;
        Ok(Some(row))
    }

    /// Non-restartable: once exhausted, further calls return an empty
    /// sequence rather than re-yielding already-fetched rows.
    pub fn fetchall(&mut self) -> NormliteResult<Vec<Row>> {
        self.ensure_open()?;
        let remaining = self.rows[self.position..].to_vec();
        self.position = self.rows.len();
        Ok(remaining)
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    fn ensure_open(&self) -> NormliteResult<()> {
        if self.closed {
            Err(NormliteError::ResourceClosed { reason: "cursor is closed".to_string() })
        } else {
            Ok(())
        }
    }
}

/// An ordered sequence of per-operation cursors, one per statement committed
/// in a transaction. `nextset` is the only legal way to advance; every other
/// accessor forwards to whichever cursor is current.
pub struct CompositeCursor {
    cursors: Vec<Cursor>,
    current: usize,
}

impl CompositeCursor {
    fn new(cursors: Vec<Cursor>) -> Self {
        Self { cursors, current: 0 }
    }

    fn current(&self) -> NormliteResult<&Cursor> {
        self.cursors
            .get(self.current)
            .ok_or_else(|| NormliteError::interface("composite cursor has no current result set"))
    }

    fn current_mut(&mut self) -> NormliteResult<&mut Cursor> {
        self.cursors
            .get_mut(self.current)
            .ok_or_else(|| NormliteError::interface("composite cursor has no current result set"))
    }

    /// Advances to the next child cursor. Returns `false`, without moving,
    /// once every result set has been visited.
    pub fn nextset(&mut self) -> bool {
        if self.current + 1 < self.cursors.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    pub fn description(&self) -> Option<Vec<(String, &'static str)>> {
        self.current().ok()?.description()
    }

    pub fn rowcount(&self) -> i64 {
        self.current().map(Cursor::rowcount).unwrap_or(-1)
    }

    pub fn lastrowid(&self) -> Option<u128> {
        self.current().ok()?.lastrowid()
    }

    pub fn fetchone(&mut self) -> NormliteResult<Option<Row>> {
        self.current_mut()?.fetchone()
    }

    pub fn fetchall(&mut self) -> NormliteResult<Vec<Row>> {
        self.current_mut()?.fetchall()
    }
}

/// High-level API over a transaction manager and shared schema: one
/// statement-at-a-time, auto-opening a transaction on first use. Not
/// thread-safe — callers serialize statements on one connection themselves.
pub struct Connection {
    metadata: Arc<Mutex<MetaData>>,
    manager: TransactionManager,
    current_tx: Option<Transaction>,
    last_committed: Option<CompositeCursor>,
}

impl Connection {
    #[must_use]
    pub fn new(client: Arc<dyn NotionClient>, metadata: Arc<Mutex<MetaData>>) -> Self {
        let manager = TransactionManager::new(client, metadata.clone());
        Self { metadata, manager, current_tx: None, last_committed: None }
    }

    #[must_use]
    pub fn metadata(&self) -> Arc<Mutex<MetaData>> {
        self.metadata.clone()
    }

    /// Stages `statement` against the current transaction, opening one if
    /// none is active. Execution is deferred until `commit`; mutating and
    /// non-mutating statements alike report an empty result until then.
    pub fn execute(&mut self, statement: Statement, params: Json) -> NormliteResult<Cursor> {
        if self.current_tx.is_none() {
            self.current_tx = Some(self.manager.begin());
        }
        let tx = self.current_tx.as_mut().expect("just ensured a transaction is open");
        tx.stage(statement, params)?;
        Ok(Cursor::empty())
    }

    /// `executemany` is reserved: always fails rather than silently
    /// executing nothing.
    pub fn executemany(&mut self, _statement: Statement, _param_sets: Vec<Json>) -> NormliteResult<Cursor> {
        Err(NormliteError::interface("executemany is not implemented"))
    }

    /// Runs the two-phase commit protocol and builds a composite cursor from
    /// the ordered per-operation result sets.
    pub async fn commit(&mut self) -> NormliteResult<&CompositeCursor> {
        let mut tx = self
            .current_tx
            .take()
            .ok_or_else(|| NormliteError::transaction("no active transaction to commit"))?;
        self.manager.commit(&mut tx).await?;

        let cursors = tx
            .operation_shapes()
            .into_iter()
            .map(|(returns_rows, rows, last_modified_id)| Cursor::new(returns_rows, rows, last_modified_id))
            .collect();
        self.last_committed = Some(CompositeCursor::new(cursors));
        Ok(self.last_committed.as_ref().expect("just assigned"))
    }

    /// Aborts the current transaction. Any previously built composite cursor
    /// remains accessible but every contained cursor is marked closed.
    pub async fn rollback(&mut self) -> NormliteResult<()> {
        let mut tx = self
            .current_tx
            .take()
            .ok_or_else(|| NormliteError::transaction("no active transaction to roll back"))?;
        self.manager.rollback(&mut tx).await?;
        if let Some(composite) = &mut self.last_committed {
            for cursor in &mut composite.cursors {
                cursor.close();
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn transaction_state(&self) -> Option<TransactionState> {
        self.current_tx.as_ref().map(Transaction::state)
    }

    #[must_use]
    pub fn last_committed(&self) -> Option<&CompositeCursor> {
        self.last_committed.as_ref()
    }

    pub fn last_committed_mut(&mut self) -> Option<&mut CompositeCursor> {
        self.last_committed.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryNotionClient;
    use crate::schema::{Column, Table};
    use crate::types::TypeEngine;
    use normlite_sql::{ColumnDef, Constant, SelectColumns, SqlType};

    fn new_connection() -> Connection {
        let client: Arc<dyn NotionClient> = Arc::new(InMemoryNotionClient::new());
        Connection::new(client, Arc::new(Mutex::new(MetaData::new())))
    }

    fn declare_students(conn: &Connection) {
        let columns = vec![Column::new("id", TypeEngine::Integer, true)];
        conn.metadata().lock().unwrap().add(Table::new("students", columns).unwrap()).unwrap();
    }

    fn create_table_statement() -> Statement {
        Statement::CreateTable {
            table: "students".to_string(),
            columns: vec![ColumnDef { name: "id".to_string(), sql_type: SqlType::Int, primary_key: true }],
            position: Default::default(),
        }
    }

    #[tokio::test]
    async fn execute_before_commit_returns_an_empty_cursor() {
        let mut conn = new_connection();
        declare_students(&conn);
        let mut cursor = conn.execute(create_table_statement(), serde_json::json!({})).unwrap();
        assert_eq!(cursor.fetchall().unwrap().len(), 0);
        assert_eq!(cursor.rowcount(), -1);
    }

    #[tokio::test]
    async fn insert_then_select_commit_builds_a_composite_cursor() {
        let mut conn = new_connection();
        declare_students(&conn);
        conn.execute(create_table_statement(), serde_json::json!({})).unwrap();
        conn.commit().await.unwrap();

        conn.execute(
            Statement::Insert {
                table: "students".to_string(),
                columns: vec!["id".to_string()],
                values: vec![Constant::Integer(1)],
                position: Default::default(),
            },
            serde_json::json!({}),
        )
        .unwrap();
        conn.execute(
            Statement::Select {
                table: "students".to_string(),
                columns: SelectColumns::All,
                filter: None,
                position: Default::default(),
            },
            serde_json::json!({}),
        )
        .unwrap();
        let composite = conn.commit().await.unwrap();
        assert_eq!(composite.rowcount(), -1);
    }

    #[tokio::test]
    async fn composite_cursor_nextset_advances_through_committed_operations() {
        let mut conn = new_connection();
        declare_students(&conn);
        conn.execute(create_table_statement(), serde_json::json!({})).unwrap();
        conn.execute(
            Statement::Select {
                table: "students".to_string(),
                columns: SelectColumns::All,
                filter: None,
                position: Default::default(),
            },
            serde_json::json!({}),
        )
        .unwrap();
        conn.commit().await.unwrap();

        let composite = conn.last_committed().unwrap();
        assert_eq!(composite.rowcount(), -1);
        let cursor = conn.last_committed.as_mut().unwrap();
        assert!(cursor.nextset());
        assert_eq!(cursor.rowcount(), 0);
        assert!(!cursor.nextset());
    }

    #[tokio::test]
    async fn executemany_is_reserved() {
        let mut conn = new_connection();
        let err = conn.executemany(create_table_statement(), vec![]).unwrap_err();
        assert!(matches!(err, NormliteError::Interface { .. }));
    }

    #[test]
    fn paramstyle_is_always_named() {
        assert_eq!(PARAMSTYLE, "named");
    }
}
