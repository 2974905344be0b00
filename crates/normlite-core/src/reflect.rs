//! Schema reflection: rebuilding column metadata for a declared-but-not-yet-
//! materialized table from whatever the remote store actually holds.
//!
//! Decomposed into two single-call primitives, `has_table` and
//! `reflect_table`, so each can be staged and logged independently rather
//! than hiding two round trips behind one opaque call.

use crate::client::NotionClient;
use crate::compiler::{CallDescriptor, Endpoint, RequestKind};
use crate::error::{NormliteError, NormliteResult};
use crate::schema::{Column, MetaData, IMPLICIT_ARCHIVED_COLUMN, IMPLICIT_ID_COLUMN};
use crate::types::{currency_code_from_number_format, TypeEngine};
use serde_json::{json, Value as Json};

/// `HasTable(name)`: one API call. `None` when no remote database with this
/// title exists; `Some((database_id, properties))` otherwise.
pub async fn has_table(client: &dyn NotionClient, name: &str) -> NormliteResult<Option<(String, Json)>> {
    let descriptor = CallDescriptor {
        endpoint: Endpoint::Databases,
        request: RequestKind::Retrieve,
        payload: json!({ "title": name }),
        params: json!({}),
    };
    match client.call(&descriptor).await {
        Ok(object) => {
            let id = object
                .get("id")
                .and_then(Json::as_str)
                .map(str::to_string)
                .ok_or_else(|| NormliteError::internal("reflected database is missing \"id\""))?;
            let properties = object.get("properties").cloned().unwrap_or_else(|| json!({}));
            Ok(Some((id, properties)))
        }
        Err(NormliteError::Database { .. }) => Ok(None),
        Err(other) => Err(other),
    }
}

/// `ReflectTable(name)`: decodes a raw property map into `Column`s. Fails
/// `InvalidRequestError` unless every property resolves to a known type
/// engine and both implicit columns are present — the `ReflectedTableInfo`
/// validation the orchestrator relies on.
pub fn reflect_table(table_name: &str, properties: &Json) -> NormliteResult<Vec<Column>> {
    let Json::Object(map) = properties else {
        return Err(NormliteError::invalid_request(format!(
            "table {table_name:?} has a malformed property map"
        )));
    };

    let mut columns = Vec::with_capacity(map.len());
    for (name, spec) in map {
        let engine = type_engine_from_property_spec(name, spec).ok_or_else(|| {
            NormliteError::invalid_request(format!(
                "column {name:?} on table {table_name:?} has an unrecognized type"
            ))
        })?;
        let primary_key = name == IMPLICIT_ID_COLUMN;
        columns.push(Column::new(name.clone(), engine, primary_key));
    }

    if !columns.iter().any(|c| c.name == IMPLICIT_ID_COLUMN) || !columns.iter().any(|c| c.name == IMPLICIT_ARCHIVED_COLUMN) {
        return Err(NormliteError::invalid_request(format!(
            "table {table_name:?} is missing its implicit columns and cannot be reflected"
        )));
    }
    Ok(columns)
}

/// Recovers a type engine from a stored property spec. The implicit columns
/// are resolved by name since `_no_id`/`_no_archived` are never created as
/// ordinary Notion properties; everything else is resolved from the sole key
/// of its spec object, which doubles as its type tag.
fn type_engine_from_property_spec(name: &str, spec: &Json) -> Option<TypeEngine> {
    if name == IMPLICIT_ID_COLUMN {
        return Some(TypeEngine::ObjectId);
    }
    if name == IMPLICIT_ARCHIVED_COLUMN {
        return Some(TypeEngine::ArchivalFlag);
    }
    let tag = spec.as_object()?.keys().next()?.as_str();
    match tag {
        "number" => {
            let format = spec.pointer("/number/format").and_then(Json::as_str).unwrap_or("number");
            if format == "number" {
                Some(TypeEngine::Numeric)
            } else {
                Some(TypeEngine::Money { currency: currency_code_from_number_format(format) })
            }
        }
        "title" => Some(TypeEngine::String { is_title: true }),
        "rich_text" => Some(TypeEngine::String { is_title: false }),
        "checkbox" => Some(TypeEngine::Boolean),
        "date" => Some(TypeEngine::Date),
        _ => None,
    }
}

/// Orchestrates reflection across every registered table that has not yet
/// been materialized remotely: `has_table` then `reflect_table`, merging
/// decoded columns back into the registry and recording the database id.
/// Tables with no matching remote database are left untouched.
pub async fn reflect(metadata: &mut MetaData, client: &dyn NotionClient) -> NormliteResult<()> {
    let pending: Vec<String> = metadata.iter().filter(|t| t.remote_id.is_none()).map(|t| t.name.clone()).collect();

    for name in pending {
        let Some((remote_id, properties)) = has_table(client, &name).await? else { continue };
        let columns = reflect_table(&name, &properties)?;
        if let Some(table) = metadata.get_mut(&name) {
            for column in columns {
                if !table.columns.contains(&column.name) {
                    table.columns.add(column, &name)?;
                }
            }
            table.remote_id = Some(remote_id);
        }
    }
    Ok(())
}
