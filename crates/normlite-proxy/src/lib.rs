//! # normlite-proxy
//!
//! A thin `actix-web` surface over the execution core: four routes
//! translating JSON request bodies into transaction-manager calls and
//! their results into a small response envelope. No business logic lives
//! here — see `normlite-core` for the engine this adapts.

pub mod config;
pub mod error;
pub mod handlers;

use actix_web::{middleware::Logger, web, App, HttpServer};
use normlite_core::{NormliteConfig, TransactionManager};
use std::io;

pub use handlers::AppState;

/// Builds the `TransactionManager` a server needs from configuration: an
/// in-memory or file-backed client, and a fresh, empty schema registry.
pub fn build_transaction_manager(config: &NormliteConfig) -> normlite_core::NormliteResult<TransactionManager> {
    use normlite_core::{FileNotionClient, InMemoryNotionClient, MetaData, NormliteError, NotionClient};
    use std::sync::{Arc, Mutex};

    let client: Arc<dyn NotionClient> = match config.client.backend.as_str() {
        "memory" => Arc::new(InMemoryNotionClient::new()),
        "file" => {
            let path = config
                .client
                .store_path
                .as_deref()
                .ok_or_else(|| NormliteError::invalid_request("client.backend = \"file\" requires client.store_path"))?;
            Arc::new(FileNotionClient::open(path)?)
        }
        other => return Err(NormliteError::invalid_request(format!("unknown client backend {other:?}"))),
    };
    let metadata = Arc::new(Mutex::new(MetaData::new()));
    Ok(TransactionManager::new(client, metadata))
}

/// Runs the HTTP server until it is told to shut down. Callers own the
/// graceful-shutdown signal; this just binds and serves.
pub async fn run(config: NormliteConfig) -> io::Result<()> {
    let manager = build_transaction_manager(&config).map_err(|e| io::Error::other(e.to_string()))?;
    let state = web::Data::new(AppState::new(manager));
    let address = config::bind_address(&config);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .route("/transactions", web::post().to(handlers::begin_transaction))
            .route("/transactions/{tid}/insert", web::post().to(handlers::insert))
            .route("/transactions/{tid}/commit", web::post().to(handlers::commit))
            .route("/transactions/{tid}/rollback", web::post().to(handlers::rollback))
    })
    .bind(&address)?
    .run()
    .await
}
