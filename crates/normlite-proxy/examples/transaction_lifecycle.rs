//! Transaction Lifecycle Demo
//!
//! Drives the four routes of the HTTP proxy surface end to end, in process,
//! against the in-memory client:
//! - `POST /transactions` to open a transaction
//! - `POST /transactions/{tid}/insert` to stage a `CREATE TABLE` and an
//!   `INSERT`
//! - `POST /transactions/{tid}/commit` to run the two-phase commit protocol
//!   and read back the committed rows
//! - `POST /transactions/{tid}/rollback` on a second transaction, to show a
//!   staged statement left uncommitted
//!
//! Run with: cargo run --example transaction_lifecycle

use actix_web::{test, web, App};
use normlite_core::client::InMemoryNotionClient;
use normlite_core::schema::{Column, MetaData, Table};
use normlite_core::types::TypeEngine;
use normlite_core::{NotionClient, TransactionManager};
use normlite_proxy::handlers::{self, AppState, TransactionEnvelope};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(tracing::Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to install subscriber");

    let mut metadata = MetaData::new();
    metadata.add(Table::new("students", vec![Column::new("id", TypeEngine::Integer, true)]).unwrap()).unwrap();
    let client: Arc<dyn NotionClient> = Arc::new(InMemoryNotionClient::new());
    let state = web::Data::new(AppState::new(TransactionManager::new(client, Arc::new(Mutex::new(metadata)))));

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .route("/transactions", web::post().to(handlers::begin_transaction))
            .route("/transactions/{tid}/insert", web::post().to(handlers::insert))
            .route("/transactions/{tid}/commit", web::post().to(handlers::commit))
            .route("/transactions/{tid}/rollback", web::post().to(handlers::rollback)),
    )
    .await;

    // Open a transaction, stage a CREATE TABLE and an INSERT, then commit.
    let req = test::TestRequest::post().uri("/transactions").to_request();
    let resp: TransactionEnvelope = test::call_and_read_body_json(&app, req).await;
    let tid = resp.transaction_id.expect("begin_transaction always returns an id");
    info!(tid, "opened transaction");

    for sql in ["CREATE TABLE students (id int primary key)", "INSERT INTO students (id) VALUES (1)"] {
        let req = test::TestRequest::post()
            .uri(&format!("/transactions/{tid}/insert"))
            .set_json(&serde_json::json!({ "sql": sql }))
            .to_request();
        let _: TransactionEnvelope = test::call_and_read_body_json(&app, req).await;
    }

    let req = test::TestRequest::post().uri(&format!("/transactions/{tid}/commit")).to_request();
    let resp: TransactionEnvelope = test::call_and_read_body_json(&app, req).await;
    info!(state = %resp.state, data = ?resp.data, "committed");

    // A second transaction stages an insert, then rolls back: the table
    // still holds only the one row committed above.
    let req = test::TestRequest::post().uri("/transactions").to_request();
    let resp: TransactionEnvelope = test::call_and_read_body_json(&app, req).await;
    let tid = resp.transaction_id.expect("begin_transaction always returns an id");

    let req = test::TestRequest::post()
        .uri(&format!("/transactions/{tid}/insert"))
        .set_json(&serde_json::json!({ "sql": "INSERT INTO students (id) VALUES (2)" }))
        .to_request();
    let _: TransactionEnvelope = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::post().uri(&format!("/transactions/{tid}/rollback")).to_request();
    let resp: TransactionEnvelope = test::call_and_read_body_json(&app, req).await;
    info!(state = %resp.state, "rolled back, the staged insert never reached the table");
}
