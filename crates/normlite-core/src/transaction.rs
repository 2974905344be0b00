//! Transaction lifecycle and the straight-line two-phase commit protocol.
//!
//! No write-ahead log, no MVCC version chain, no savepoints, no crash
//! recovery: a transaction is a list of staged operations applied in order,
//! each guarded by a lock acquired from [`crate::lock::LockManager`] just
//! before it runs. The first failure aborts everything already committed,
//! in reverse order, and releases every lock the transaction holds.

use crate::client::NotionClient;
use crate::compiler::{self, CallDescriptor, Endpoint, RequestKind};
use crate::error::{NormliteError, NormliteResult};
use crate::lock::{LockManager, LockMode};
use crate::row::{rows_from_objects, NotionObject, Row};
use crate::schema::MetaData;
use normlite_sql::{SelectColumns, Statement};
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    PartiallyCommitted,
    Committed,
    Failed,
    Aborted,
}

/// A statement staged against a transaction, along with whatever result or
/// undo state it accumulates as it moves through the commit protocol.
pub struct Operation {
    statement: Statement,
    params: Json,
    descriptor: Option<CallDescriptor>,
    result_rows: Vec<Row>,
    created_object_id: Option<String>,
    previous_remote_id: Option<String>,
}

impl Operation {
    #[must_use]
    pub fn new(statement: Statement, params: Json) -> Self {
        Self {
            statement,
            params,
            descriptor: None,
            result_rows: Vec::new(),
            created_object_id: None,
            previous_remote_id: None,
        }
    }

    fn table_name(&self) -> &str {
        match &self.statement {
            Statement::CreateTable { table, .. }
            | Statement::Insert { table, .. }
            | Statement::Select { table, .. }
            | Statement::DropTable { table, .. } => table,
        }
    }

    /// The lock table resource this operation contends on: `CREATE TABLE`
    /// takes the whole schema, everything else takes its own table.
    #[must_use]
    pub fn resource_id(&self) -> String {
        match &self.statement {
            Statement::CreateTable { .. } => "schema".to_string(),
            _ => self.table_name().to_string(),
        }
    }

    #[must_use]
    pub fn lock_mode(&self) -> LockMode {
        match &self.statement {
            Statement::Select { .. } => LockMode::Shared,
            _ => LockMode::Exclusive,
        }
    }

    #[must_use]
    pub fn returns_rows(&self) -> bool {
        matches!(self.statement, Statement::Select { .. })
    }

    /// `lastrowid` candidate: the id of the object this operation last
    /// created or renamed remotely. `None` for `SELECT`/`DROP TABLE`.
    #[must_use]
    pub fn last_modified_id(&self) -> Option<&str> {
        self.created_object_id.as_deref()
    }

    /// Compiles the statement into a call descriptor and resolves any named
    /// parameters. Pure: touches neither the client nor `metadata` mutably.
    fn stage(&mut self, metadata: &MetaData) -> NormliteResult<()> {
        let mut descriptor = compiler::compile(&self.statement, metadata)?;
        if let Statement::Insert { table, .. } = &self.statement {
            let table = metadata
                .get(table)
                .ok_or_else(|| NormliteError::argument(format!("unknown table {table:?}")))?;
            descriptor.payload = compiler::resolve_placeholders(&descriptor.payload, &self.params, table)?;
        }
        self.descriptor = Some(descriptor);
        Ok(())
    }

    async fn do_commit(&mut self, client: &dyn NotionClient, metadata: &mut MetaData) -> NormliteResult<()> {
        let descriptor = self
            .descriptor
            .as_ref()
            .ok_or_else(|| NormliteError::internal("do_commit called before stage"))?;
        let response = client.call(descriptor).await?;

        match &self.statement {
            Statement::CreateTable { table, .. } => {
                let remote_id = response.get("id").and_then(Json::as_str).map(str::to_string);
                self.created_object_id = remote_id.clone();
                if let Some(t) = metadata.get_mut(table) {
                    t.remote_id = remote_id;
                }
            }
            Statement::Insert { .. } => {
                self.created_object_id = response.get("id").and_then(Json::as_str).map(str::to_string);
            }
            Statement::Select { table, columns, .. } => {
                let objects = parse_query_results(&response)?;
                let order = schema_order(columns, metadata.get(table));
                self.result_rows = rows_from_objects(&objects, order.as_deref());
            }
            Statement::DropTable { table, .. } => {
                if let Some(t) = metadata.get_mut(table) {
                    self.previous_remote_id = t.remote_id.take();
                }
            }
        }
        Ok(())
    }

    /// Undoes an already-committed operation, best-effort. Failures here are
    /// logged by the caller and never override the original commit error.
    async fn do_rollback(&mut self, client: &dyn NotionClient, metadata: &mut MetaData) -> NormliteResult<()> {
        match &self.statement {
            Statement::CreateTable { table, .. } => {
                if let Some(database_id) = metadata.get(table).and_then(|t| t.remote_id.clone()) {
                    let archive = archive_database_descriptor(&database_id);
                    client.call(&archive).await?;
                    if let Some(t) = metadata.get_mut(table) {
                        t.remote_id = None;
                    }
                }
            }
            Statement::Insert { .. } => {
                if let Some(page_id) = &self.created_object_id {
                    let archive = archive_page_descriptor(page_id);
                    client.call(&archive).await?;
                }
            }
            Statement::Select { .. } => {}
            Statement::DropTable { table, .. } => {
                if let Some(database_id) = &self.previous_remote_id {
                    let restore = restore_database_descriptor(database_id);
                    client.call(&restore).await?;
                    if let Some(t) = metadata.get_mut(table) {
                        t.remote_id = Some(database_id.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// The rows this operation produced, empty for anything but `SELECT`.
    #[must_use]
    pub fn result(&self) -> Vec<Row> {
        self.result_rows.clone()
    }
}

fn archive_page_descriptor(page_id: &str) -> CallDescriptor {
    CallDescriptor {
        endpoint: Endpoint::Pages,
        request: RequestKind::Update,
        payload: json!({ "page_id": page_id, "archived": true }),
        params: json!({}),
    }
}

fn archive_database_descriptor(database_id: &str) -> CallDescriptor {
    CallDescriptor {
        endpoint: Endpoint::Databases,
        request: RequestKind::Update,
        payload: json!({ "database_id": database_id, "archived": true }),
        params: json!({}),
    }
}

fn restore_database_descriptor(database_id: &str) -> CallDescriptor {
    CallDescriptor {
        endpoint: Endpoint::Databases,
        request: RequestKind::Update,
        payload: json!({ "database_id": database_id, "archived": false }),
        params: json!({}),
    }
}

fn parse_query_results(response: &Json) -> NormliteResult<Vec<NotionObject>> {
    let results = response
        .get("results")
        .and_then(Json::as_array)
        .ok_or_else(|| NormliteError::internal("query response missing \"results\" array"))?;
    results.iter().map(NotionObject::parse).collect()
}

fn schema_order(columns: &SelectColumns, table: Option<&crate::schema::Table>) -> Option<Vec<String>> {
    match columns {
        SelectColumns::Named(names) => Some(names.clone()),
        SelectColumns::All => table.map(|t| t.columns.iter().map(|c| c.name.clone()).collect()),
    }
}

/// An in-flight unit of work: an ordered list of staged statements plus the
/// lifecycle state the protocol below drives it through.
pub struct Transaction {
    tid: String,
    state: TransactionState,
    operations: Vec<Operation>,
}

impl Transaction {
    #[must_use]
    pub fn tid(&self) -> &str {
        &self.tid
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn stage(&mut self, statement: Statement, params: Json) -> NormliteResult<()> {
        if self.state != TransactionState::Active {
            return Err(NormliteError::transaction(format!(
                "cannot stage an operation on a transaction in state {:?}",
                self.state
            )));
        }
        self.operations.push(Operation::new(statement, params));
        Ok(())
    }

    /// `(returns_rows, rows, last_modified_id)` per staged operation, in
    /// commit order — what the connection needs to build a composite cursor
    /// once `commit` has run.
    #[must_use]
    pub fn operation_shapes(&self) -> Vec<(bool, Vec<Row>, Option<String>)> {
        self.operations
            .iter()
            .map(|op| (op.returns_rows(), op.result(), op.last_modified_id().map(str::to_string)))
            .collect()
    }
}

/// Mints transactions and drives the commit/rollback protocol. Shared across
/// every connection open against the same schema and client.
pub struct TransactionManager {
    locks: Arc<LockManager>,
    client: Arc<dyn NotionClient>,
    metadata: Arc<Mutex<MetaData>>,
    active: Mutex<HashMap<String, TransactionState>>,
}

impl TransactionManager {
    #[must_use]
    pub fn new(client: Arc<dyn NotionClient>, metadata: Arc<Mutex<MetaData>>) -> Self {
        Self { locks: Arc::new(LockManager::new()), client, metadata, active: Mutex::new(HashMap::new()) }
    }

    #[must_use]
    pub fn begin(&self) -> Transaction {
        let tid = Uuid::new_v4().to_string();
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(tid.clone(), TransactionState::Active);
        info!(tid, "transaction begun");
        Transaction { tid, state: TransactionState::Active, operations: Vec::new() }
    }

    /// Runs the two-phase commit protocol: acquire, stage, commit, in
    /// insertion order; abort and roll back everything already committed on
    /// the first failure.
    pub async fn commit(&self, tx: &mut Transaction) -> NormliteResult<Vec<Vec<Row>>> {
        if tx.state != TransactionState::Active {
            return Err(NormliteError::transaction(format!(
                "cannot commit a transaction in state {:?}",
                tx.state
            )));
        }
        tx.state = TransactionState::PartiallyCommitted;

        let mut committed = 0;
        for index in 0..tx.operations.len() {
            if let Err(err) = self.commit_one(tx, index).await {
                error!(tid = %tx.tid, error = %err, "commit failed, rolling back");
                tx.state = TransactionState::Failed;
                self.rollback_committed(tx, committed).await;
                self.locks.release(&tx.tid);
                tx.state = TransactionState::Aborted;
                self.mark(&tx.tid, TransactionState::Aborted);
                return Err(err);
            }
            committed += 1;
        }

        let results = tx.operations.iter().map(Operation::result).collect();
        tx.state = TransactionState::Committed;
        self.locks.release(&tx.tid);
        self.mark(&tx.tid, TransactionState::Committed);
        info!(tid = %tx.tid, "transaction committed");
        Ok(results)
    }

    async fn commit_one(&self, tx: &mut Transaction, index: usize) -> NormliteResult<()> {
        let resource = tx.operations[index].resource_id();
        let mode = tx.operations[index].lock_mode();
        self.locks.acquire(&resource, &tx.tid, mode)?;

        let mut metadata = self.metadata.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        tx.operations[index].stage(&metadata)?;
        tx.operations[index].do_commit(self.client.as_ref(), &mut metadata).await
    }

    async fn rollback_committed(&self, tx: &mut Transaction, committed: usize) {
        let mut metadata = self.metadata.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for index in (0..committed).rev() {
            if let Err(err) = tx.operations[index].do_rollback(self.client.as_ref(), &mut metadata).await {
                error!(tid = %tx.tid, error = %err, "rollback of a committed operation failed");
            }
        }
    }

    /// Aborts a transaction directly, without running the rest of commit.
    /// Only meaningful while `ACTIVE`, since `commit` is the only path that
    /// ever partially commits an operation.
    pub async fn rollback(&self, tx: &mut Transaction) -> NormliteResult<()> {
        if tx.state != TransactionState::Active {
            return Err(NormliteError::transaction(format!(
                "cannot roll back a transaction in state {:?}",
                tx.state
            )));
        }
        tx.state = TransactionState::Failed;
        self.locks.release(&tx.tid);
        tx.state = TransactionState::Aborted;
        self.mark(&tx.tid, TransactionState::Aborted);
        info!(tid = %tx.tid, "transaction rolled back");
        Ok(())
    }

    fn mark(&self, tid: &str, state: TransactionState) {
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(tid.to_string(), state);
    }
}
