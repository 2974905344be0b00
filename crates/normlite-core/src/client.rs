//! The pluggable Notion client boundary.
//!
//! This is the only collaborator permitted to mutate remote state; every
//! other component in this crate is a pure function of schema, AST, and
//! bound parameters. Two implementations are provided: an in-memory client
//! backed by a process-wide deterministic store (for tests), and a
//! file-backed client that loads on open and dumps on close.

use crate::compiler::{CallDescriptor, Endpoint, RequestKind};
use crate::error::{NormliteError, NormliteResult};
use async_trait::async_trait;
use serde_json::{json, Map, Value as Json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// The stable id of the workspace root page every in-memory or file-backed
/// store starts with; it never changes across a `reset()`.
pub const ROOT_PAGE_ID: &str = "00000000-0000-4000-8000-000000000000";

#[async_trait]
pub trait NotionClient: Send + Sync {
    async fn call(&self, descriptor: &CallDescriptor) -> NormliteResult<Json>;
}

#[derive(Debug, Default)]
struct Store {
    pages: HashMap<String, Json>,
    databases: HashMap<String, Json>,
}

impl Store {
    fn with_root() -> Self {
        let mut store = Self::default();
        store.pages.insert(
            ROOT_PAGE_ID.to_string(),
            json!({ "object": "page", "id": ROOT_PAGE_ID, "archived": false, "in_trash": false, "properties": {} }),
        );
        store
    }
}

/// A process-wide, mutex-guarded Notion store used for deterministic tests.
#[derive(Clone, Default)]
pub struct InMemoryNotionClient {
    store: Arc<Mutex<Store>>,
}

impl InMemoryNotionClient {
    #[must_use]
    pub fn new() -> Self {
        Self { store: Arc::new(Mutex::new(Store::with_root())) }
    }

    /// Resets the store back to containing only the stable root page.
    pub fn reset(&self) {
        let mut store = self.store.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *store = Store::with_root();
    }
}

#[async_trait]
impl NotionClient for InMemoryNotionClient {
    async fn call(&self, descriptor: &CallDescriptor) -> NormliteResult<Json> {
        let mut store = self.store.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        handle_call(&mut store, descriptor)
    }
}

/// Loads a JSON file of page/database objects on construction and
/// overwrites it atomically when [`FileNotionClient::close`] is called — the
/// guaranteed release hook runs on every exit path, including error, because
/// callers are expected to use a `finally`/`?`-propagating scope around it.
pub struct FileNotionClient {
    path: PathBuf,
    store: Mutex<Store>,
}

impl FileNotionClient {
    pub fn open(path: impl AsRef<Path>) -> NormliteResult<Self> {
        let path = path.as_ref().to_path_buf();
        let store = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| NormliteError::database(format!("failed to read {path:?}: {e}")))?;
            load_store(&contents)?
        } else {
            Store::with_root()
        };
        Ok(Self { path, store: Mutex::new(store) })
    }

    /// Overwrites the backing file atomically: write to a sibling temp file,
    /// then rename over the original.
    pub fn close(&self) -> NormliteResult<()> {
        let store = self.store.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let contents = dump_store(&store)?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, contents)
            .map_err(|e| NormliteError::database(format!("failed to write {tmp_path:?}: {e}")))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| NormliteError::database(format!("failed to replace {:?}: {e}", self.path)))?;
        debug!(path = ?self.path, "closed file-backed Notion client");
        Ok(())
    }
}

impl Drop for FileNotionClient {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to flush file-backed Notion client on drop");
        }
    }
}

#[async_trait]
impl NotionClient for FileNotionClient {
    async fn call(&self, descriptor: &CallDescriptor) -> NormliteResult<Json> {
        let mut store = self.store.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        handle_call(&mut store, descriptor)
    }
}

fn load_store(contents: &str) -> NormliteResult<Store> {
    let objects: Vec<Json> = serde_json::from_str(contents)
        .map_err(|e| NormliteError::database(format!("malformed store file: {e}")))?;
    let mut store = Store::default();
    for object in objects {
        match object.get("object").and_then(Json::as_str) {
            Some("page") => {
                if let Some(id) = object.get("id").and_then(Json::as_str) {
                    store.pages.insert(id.to_string(), object);
                }
            }
            Some("database") => {
                if let Some(id) = object.get("id").and_then(Json::as_str) {
                    store.databases.insert(id.to_string(), object);
                }
            }
            _ => {}
        }
    }
    if !store.pages.contains_key(ROOT_PAGE_ID) {
        store.pages.insert(
            ROOT_PAGE_ID.to_string(),
            json!({ "object": "page", "id": ROOT_PAGE_ID, "archived": false, "in_trash": false, "properties": {} }),
        );
    }
    Ok(store)
}

fn dump_store(store: &Store) -> NormliteResult<String> {
    let mut objects: Vec<&Json> = store.pages.values().chain(store.databases.values()).collect();
    objects.sort_by_key(|o| o.get("id").and_then(Json::as_str).unwrap_or_default().to_string());
    serde_json::to_string_pretty(&objects)
        .map_err(|e| NormliteError::database(format!("failed to serialize store: {e}")))
}

fn handle_call(store: &mut Store, descriptor: &CallDescriptor) -> NormliteResult<Json> {
    match (descriptor.endpoint, descriptor.request) {
        (Endpoint::Pages, RequestKind::Create) => create_page(store, &descriptor.payload),
        (Endpoint::Pages, RequestKind::Retrieve) => retrieve(&store.pages, &descriptor.payload),
        (Endpoint::Pages, RequestKind::Update) => update_page(store, &descriptor.payload),
        (Endpoint::Databases, RequestKind::Create) => create_database(store, &descriptor.payload),
        (Endpoint::Databases, RequestKind::Retrieve) => retrieve_database(store, &descriptor.payload),
        (Endpoint::Databases, RequestKind::Update) => update_database(store, &descriptor.payload),
        (Endpoint::Databases, RequestKind::Query) => query_database(store, &descriptor.payload),
        (endpoint, request) => Err(NormliteError::database(format!(
            "unsupported operation {endpoint:?}.{request:?}"
        ))),
    }
}

fn create_page(store: &mut Store, payload: &Json) -> NormliteResult<Json> {
    let id = Uuid::new_v4().to_string();
    let mut object = Map::new();
    object.insert("object".to_string(), json!("page"));
    object.insert("id".to_string(), json!(id));
    object.insert("archived".to_string(), json!(false));
    object.insert("in_trash".to_string(), json!(false));
    object.insert("parent".to_string(), payload.get("parent").cloned().unwrap_or(Json::Null));
    object.insert("properties".to_string(), payload.get("properties").cloned().unwrap_or(json!({})));
    let object = Json::Object(object);
    store.pages.insert(id, object.clone());
    Ok(object)
}

fn create_database(store: &mut Store, payload: &Json) -> NormliteResult<Json> {
    let id = Uuid::new_v4().to_string();
    let mut object = Map::new();
    object.insert("object".to_string(), json!("database"));
    object.insert("id".to_string(), json!(id));
    object.insert("archived".to_string(), json!(false));
    object.insert("in_trash".to_string(), json!(false));
    object.insert("title".to_string(), payload.get("title").cloned().unwrap_or(json!([])));
    object.insert("properties".to_string(), payload.get("properties").cloned().unwrap_or(json!({})));
    object.insert("parent".to_string(), payload.get("parent").cloned().unwrap_or(Json::Null));
    let object = Json::Object(object);
    store.databases.insert(id, object.clone());
    Ok(object)
}

fn update_page(store: &mut Store, payload: &Json) -> NormliteResult<Json> {
    let id = payload
        .get("page_id")
        .and_then(Json::as_str)
        .ok_or_else(|| NormliteError::interface("update payload missing \"page_id\""))?;
    let page = store
        .pages
        .get_mut(id)
        .ok_or_else(|| NormliteError::database(format!("no such page {id:?}")))?;
    if let Some(properties) = payload.get("properties") {
        page["properties"] = properties.clone();
    }
    if let Some(archived) = payload.get("archived") {
        page["archived"] = archived.clone();
    }
    Ok(page.clone())
}

fn update_database(store: &mut Store, payload: &Json) -> NormliteResult<Json> {
    let id = payload
        .get("database_id")
        .and_then(Json::as_str)
        .ok_or_else(|| NormliteError::interface("update payload missing \"database_id\""))?;
    let database = store
        .databases
        .get_mut(id)
        .ok_or_else(|| NormliteError::database(format!("no such database {id:?}")))?;
    if let Some(archived) = payload.get("archived") {
        database["archived"] = archived.clone();
    }
    Ok(database.clone())
}

/// Retrieves a database by id, or by title when the caller is reflecting a
/// table it hasn't seen a remote id for yet.
fn retrieve_database(store: &Store, payload: &Json) -> NormliteResult<Json> {
    if let Some(title) = payload.get("title").and_then(Json::as_str) {
        return store
            .databases
            .values()
            .find(|db| db.pointer("/title/0/text/content").and_then(Json::as_str) == Some(title))
            .cloned()
            .ok_or_else(|| NormliteError::database(format!("no database titled {title:?}")));
    }
    retrieve(&store.databases, payload)
}

fn retrieve(objects: &HashMap<String, Json>, payload: &Json) -> NormliteResult<Json> {
    let id = payload
        .get("id")
        .and_then(Json::as_str)
        .ok_or_else(|| NormliteError::interface("retrieve payload missing \"id\""))?;
    objects.get(id).cloned().ok_or_else(|| NormliteError::database(format!("no such object {id:?}")))
}

fn query_database(store: &Store, payload: &Json) -> NormliteResult<Json> {
    let database_id = payload
        .get("database_id")
        .and_then(Json::as_str)
        .ok_or_else(|| NormliteError::interface("query payload missing \"database_id\""))?;
    let results: Vec<&Json> = store
        .pages
        .values()
        .filter(|page| {
            page.pointer("/parent/database_id").and_then(Json::as_str) == Some(database_id)
        })
        .filter(|page| matches_filter(page, payload.get("filter")))
        .collect();
    Ok(json!({ "object": "list", "results": results }))
}

fn matches_filter(page: &Json, filter: Option<&Json>) -> bool {
    let Some(filter) = filter else { return true };
    if let Some(and) = filter.get("and").and_then(Json::as_array) {
        return and.iter().all(|f| matches_filter(page, Some(f)));
    }
    if let Some(or) = filter.get("or").and_then(Json::as_array) {
        return or.iter().any(|f| matches_filter(page, Some(f)));
    }
    let Some(Json::Object(map)) = Some(filter) else { return true };
    let Some(property_name) = filter.get("property").and_then(Json::as_str) else { return true };
    let Some(actual) = page.pointer(&format!("/properties/{property_name}")) else { return false };
    map.iter()
        .filter(|(key, _)| key.as_str() != "property")
        .all(|(verb, expected)| compare_filter_verb(actual, verb, expected))
}

fn compare_filter_verb(actual: &Json, verb: &str, expected: &Json) -> bool {
    let number = actual.get("number").or(Some(actual));
    let cmp_num = |n: f64, e: f64| n.partial_cmp(&e);
    match verb {
        "equals" => number.and_then(Json::as_f64).zip(expected.as_f64()).map(|(a, b)| a == b).unwrap_or(actual == expected),
        "does_not_equal" => !compare_filter_verb(actual, "equals", expected),
        "less_than" => number
            .and_then(Json::as_f64)
            .zip(expected.as_f64())
            .and_then(|(a, b)| cmp_num(a, b))
            .map(|o| o.is_lt())
            .unwrap_or(false),
        "less_than_or_equal_to" => number
            .and_then(Json::as_f64)
            .zip(expected.as_f64())
            .and_then(|(a, b)| cmp_num(a, b))
            .map(|o| o.is_le())
            .unwrap_or(false),
        "greater_than" => number
            .and_then(Json::as_f64)
            .zip(expected.as_f64())
            .and_then(|(a, b)| cmp_num(a, b))
            .map(|o| o.is_gt())
            .unwrap_or(false),
        "greater_than_or_equal_to" => number
            .and_then(Json::as_f64)
            .zip(expected.as_f64())
            .and_then(|(a, b)| cmp_num(a, b))
            .map(|o| o.is_ge())
            .unwrap_or(false),
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CallDescriptor, Endpoint, RequestKind};

    fn descriptor(endpoint: Endpoint, request: RequestKind, payload: Json) -> CallDescriptor {
        CallDescriptor { endpoint, request, payload, params: json!({}) }
    }

    #[tokio::test]
    async fn in_memory_client_always_has_a_stable_root_page() {
        let client = InMemoryNotionClient::new();
        let first_root = ROOT_PAGE_ID.to_string();
        client.reset();
        assert_eq!(first_root, ROOT_PAGE_ID);
    }

    #[tokio::test]
    async fn create_database_then_query_round_trips() {
        let client = InMemoryNotionClient::new();
        let db = client
            .call(&descriptor(
                Endpoint::Databases,
                RequestKind::Create,
                json!({ "title": [], "properties": {}, "parent": { "page_id": ROOT_PAGE_ID } }),
            ))
            .await
            .unwrap();
        let database_id = db.get("id").and_then(Json::as_str).unwrap().to_string();

        client
            .call(&descriptor(
                Endpoint::Pages,
                RequestKind::Create,
                json!({ "parent": { "database_id": database_id }, "properties": { "id": { "number": 1 } } }),
            ))
            .await
            .unwrap();

        let result = client
            .call(&descriptor(
                Endpoint::Databases,
                RequestKind::Query,
                json!({ "database_id": database_id }),
            ))
            .await
            .unwrap();
        assert_eq!(result["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_operation_fails_with_database_error() {
        let client = InMemoryNotionClient::new();
        let err = client
            .call(&descriptor(Endpoint::Blocks, RequestKind::Update, json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, NormliteError::Database { .. }));
    }
}
