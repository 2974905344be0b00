//! The four routes of the HTTP proxy surface. Each handler only
//! deserializes its request, drives the connection/transaction API, and
//! serializes the `{transaction_id?, state, data?, error?}` envelope — no
//! business logic lives here.

use crate::error::ApiError;
use actix_web::{web, HttpResponse};
use normlite_core::{NormliteError, Row, Transaction, TransactionManager, TransactionState};
use normlite_sql::{Parser, Statement};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// Shared server state: one transaction manager per process, and a registry
/// of transactions that are `ACTIVE` but not yet committed or rolled back,
/// keyed by the id handed back from `POST /transactions`.
///
/// A [`Transaction`] is not `Clone`, so each handler that needs to operate
/// on one removes it from the registry and puts it back (or drops it, once
/// its commit/rollback leaves it in a terminal state).
pub struct AppState {
    pub manager: TransactionManager,
    transactions: Mutex<HashMap<String, Transaction>>,
}

impl AppState {
    #[must_use]
    pub fn new(manager: TransactionManager) -> Self {
        Self { manager, transactions: Mutex::new(HashMap::new()) }
    }

    fn insert(&self, tx: Transaction) {
        self.transactions.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(tx.tid().to_string(), tx);
    }

    fn take(&self, tid: &str) -> Result<Transaction, ApiError> {
        self.transactions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(tid)
            .ok_or_else(|| ApiError(NormliteError::invalid_request(format!("no active transaction {tid:?}"))))
    }
}

#[derive(Serialize, Deserialize)]
pub struct TransactionEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn state_label(state: TransactionState) -> &'static str {
    match state {
        TransactionState::Active => "ACTIVE",
        TransactionState::PartiallyCommitted => "PARTIALLY_COMMITTED",
        TransactionState::Committed => "COMMITTED",
        TransactionState::Failed => "FAILED",
        TransactionState::Aborted => "ABORTED",
    }
}

fn row_to_json(row: &Row) -> Json {
    let mut map = serde_json::Map::new();
    for (key, value) in row.metadata().keys().iter().zip(row.values()) {
        map.insert(key.clone(), value.clone());
    }
    Json::Object(map)
}

/// `POST /transactions` — begins a transaction and returns its id.
pub async fn begin_transaction(state: web::Data<AppState>) -> HttpResponse {
    let tx = state.manager.begin();
    let tid = tx.tid().to_string();
    let label = state_label(tx.state());
    state.insert(tx);
    info!(tid, "transaction opened over HTTP");
    HttpResponse::Ok().json(TransactionEnvelope { transaction_id: Some(tid), state: label.to_string(), data: None, error: None })
}

#[derive(Deserialize)]
pub struct StageRequest {
    pub sql: String,
    #[serde(default)]
    pub params: Json,
}

/// `POST /transactions/{tid}/insert` — parses `sql` and stages it against
/// the named transaction. The route name mirrors the mutating half of the
/// dialect; staging a `SELECT` here is rejected, not silently accepted.
pub async fn insert(
    path: web::Path<String>,
    body: web::Json<StageRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let tid = path.into_inner();
    let mut tx = state.take(&tid)?;

    let result = (|| -> Result<(), NormliteError> {
        let statement = Parser::parse_statement(&body.sql)?;
        if matches!(statement, Statement::Select { .. }) {
            return Err(NormliteError::argument("the insert route does not accept SELECT statements"));
        }
        tx.stage(statement, body.params.clone())
    })();

    let label = state_label(tx.state());
    state.insert(tx);

    match result {
        Ok(()) => Ok(HttpResponse::Ok().json(TransactionEnvelope {
            transaction_id: Some(tid),
            state: label.to_string(),
            data: None,
            error: None,
        })),
        Err(err) => Err(ApiError(err)),
    }
}

/// `POST /transactions/{tid}/commit` — runs the two-phase commit protocol
/// and returns one result set per staged operation, in staging order.
pub async fn commit(path: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let tid = path.into_inner();
    let mut tx = state.take(&tid)?;

    match state.manager.commit(&mut tx).await {
        Ok(result_sets) => {
            let label = state_label(tx.state());
            let data: Vec<Vec<Json>> =
                result_sets.iter().map(|rows: &Vec<Row>| rows.iter().map(row_to_json).collect()).collect();
            Ok(HttpResponse::Ok().json(TransactionEnvelope {
                transaction_id: Some(tid),
                state: label.to_string(),
                data: Some(Json::from(data)),
                error: None,
            }))
        }
        Err(err) => Err(ApiError(err)),
    }
}

/// `POST /transactions/{tid}/rollback` — aborts the named transaction.
pub async fn rollback(path: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let tid = path.into_inner();
    let mut tx = state.take(&tid)?;

    match state.manager.rollback(&mut tx).await {
        Ok(()) => {
            let label = state_label(tx.state());
            Ok(HttpResponse::Ok().json(TransactionEnvelope {
                transaction_id: Some(tid),
                state: label.to_string(),
                data: None,
                error: None,
            }))
        }
        Err(err) => Err(ApiError(err)),
    }
}
