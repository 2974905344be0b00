//! Parsed Notion objects and the row model the cursor exposes to callers.

use crate::error::{NormliteError, NormliteResult};
use crate::schema::{IMPLICIT_ARCHIVED_COLUMN, IMPLICIT_ID_COLUMN};
use serde_json::Value as Json;
use std::sync::Arc;

/// A single property on a parsed page or database.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub id: String,
    pub kind: String,
    pub value: Json,
}

/// A parsed Notion API response object, tagged by its `"object"` field.
#[derive(Debug, Clone, PartialEq)]
pub enum NotionObject {
    Page { id: String, archived: bool, in_trash: bool, properties: Vec<Property> },
    Database { id: String, title: String, archived: bool, in_trash: bool, properties: Vec<Property> },
}

impl NotionObject {
    /// Parses a single page or database object from a raw JSON value,
    /// preserving property declaration order as the canonical column order.
    pub fn parse(json: &Json) -> NormliteResult<Self> {
        let object_kind = json
            .get("object")
            .and_then(Json::as_str)
            .ok_or_else(|| NormliteError::internal("Notion response missing \"object\" field"))?;
        let id = json.get("id").and_then(Json::as_str).unwrap_or_default().to_string();
        let archived = json.get("archived").and_then(Json::as_bool).unwrap_or(false);
        let in_trash = json.get("in_trash").and_then(Json::as_bool).unwrap_or(false);
        let properties = parse_properties(json.get("properties"));

        match object_kind {
            "page" => Ok(Self::Page { id, archived, in_trash, properties }),
            "database" => {
                let title = extract_plain_text(json.get("title")).unwrap_or_default();
                Ok(Self::Database { id, title, archived, in_trash, properties })
            }
            other => Err(NormliteError::internal(format!("unknown Notion object kind {other:?}"))),
        }
    }
}

fn parse_properties(properties: Option<&Json>) -> Vec<Property> {
    let Some(Json::Object(map)) = properties else {
        return Vec::new();
    };
    map.iter()
        .map(|(name, value)| Property {
            name: name.clone(),
            id: value.get("id").and_then(Json::as_str).unwrap_or_default().to_string(),
            kind: value.get("type").and_then(Json::as_str).unwrap_or_default().to_string(),
            value: value.clone(),
        })
        .collect()
}

fn extract_plain_text(title: Option<&Json>) -> Option<String> {
    title?.as_array()?.first()?.pointer("/text/content")?.as_str().map(str::to_string)
}

/// Flattens a `NotionObject` into the canonical positional-tuple shape used
/// by `Row`.
#[must_use]
pub fn flatten(object: &NotionObject) -> (Vec<String>, Vec<Json>) {
    let mut keys = vec!["object".to_string(), IMPLICIT_ID_COLUMN.to_string()];
    let mut values = vec![Json::String(object_kind(object).to_string())];

    match object {
        NotionObject::Page { id, archived, in_trash, properties } => {
            values.push(Json::String(id.clone()));
            keys.push(IMPLICIT_ARCHIVED_COLUMN.to_string());
            values.push(Json::Bool(*archived));
            keys.push("in_trash".to_string());
            values.push(Json::Bool(*in_trash));
            append_properties(&mut keys, &mut values, properties);
        }
        NotionObject::Database { id, title, archived, in_trash, properties } => {
            values.push(Json::String(id.clone()));
            keys.push("title".to_string());
            values.push(Json::String(title.clone()));
            keys.push(IMPLICIT_ARCHIVED_COLUMN.to_string());
            values.push(Json::Bool(*archived));
            keys.push("in_trash".to_string());
            values.push(Json::Bool(*in_trash));
            append_properties(&mut keys, &mut values, properties);
        }
    }
    (keys, values)
}

fn object_kind(object: &NotionObject) -> &'static str {
    match object {
        NotionObject::Page { .. } => "page",
        NotionObject::Database { .. } => "database",
    }
}

fn append_properties(keys: &mut Vec<String>, values: &mut Vec<Json>, properties: &[Property]) {
    for property in properties {
        keys.push(property.name.clone());
        values.push(property.value.clone());
    }
}

/// Column metadata describing the shape of a result set.
///
/// The sentinel "no-result" metadata (`returns_rows = false`) is produced by
/// [`ResultMetadata::empty`] and raises `InterfaceError` on any accessor use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMetadata {
    keys: Arc<Vec<String>>,
    returns_rows: bool,
}

impl ResultMetadata {
    #[must_use]
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys: Arc::new(keys), returns_rows: true }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self { keys: Arc::new(Vec::new()), returns_rows: false }
    }

    #[must_use]
    pub fn returns_rows(&self) -> bool {
        self.returns_rows
    }

    pub fn index_of(&self, key: &str) -> NormliteResult<usize> {
        self.require_rows()?;
        self.keys
            .iter()
            .position(|k| k == key)
            .ok_or_else(|| NormliteError::interface(format!("unknown column {key:?}")))
    }

    pub fn key_at(&self, index: usize) -> NormliteResult<&str> {
        self.require_rows()?;
        self.keys.get(index).map(String::as_str).ok_or_else(|| {
            NormliteError::interface(format!("column index {index} out of range"))
        })
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    fn require_rows(&self) -> NormliteResult<()> {
        if self.returns_rows {
            Ok(())
        } else {
            Err(NormliteError::interface("statement does not return rows"))
        }
    }

    /// DBAPI `description`: a 7-tuple per column, or `None` when the
    /// statement does not return rows.
    #[must_use]
    pub fn description(&self) -> Option<Vec<(String, &'static str)>> {
        if self.returns_rows {
            Some(self.keys.iter().map(|k| (k.clone(), "STRING")).collect())
        } else {
            None
        }
    }
}

/// A single, read-only result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    metadata: ResultMetadata,
    values: Vec<Json>,
}

impl Row {
    #[must_use]
    pub fn new(metadata: ResultMetadata, values: Vec<Json>) -> Self {
        Self { metadata, values }
    }

    #[must_use]
    pub fn metadata(&self) -> &ResultMetadata {
        &self.metadata
    }

    pub fn get(&self, key: &str) -> NormliteResult<&Json> {
        let index = self.metadata.index_of(key)?;
        Ok(&self.values[index])
    }

    pub fn get_index(&self, index: usize) -> NormliteResult<&Json> {
        self.metadata.key_at(index)?;
        Ok(&self.values[index])
    }

    #[must_use]
    pub fn values(&self) -> &[Json] {
        &self.values
    }
}

/// Builds rows for a whole result set from parsed Notion objects, using the
/// declared column order when `schema_order` is supplied or the object's own
/// property order otherwise.
pub fn rows_from_objects(objects: &[NotionObject], schema_order: Option<&[String]>) -> Vec<Row> {
    objects
        .iter()
        .map(|object| {
            let (keys, values) = flatten(object);
            match schema_order {
                Some(order) => reorder(&keys, &values, order),
                None => Row::new(ResultMetadata::new(keys), values),
            }
        })
        .collect()
}

fn reorder(keys: &[String], values: &[Json], order: &[String]) -> Row {
    let reordered_values: Vec<Json> = order
        .iter()
        .map(|wanted| {
            keys.iter()
                .position(|k| k == wanted)
                .map(|i| values[i].clone())
                .unwrap_or(Json::Null)
        })
        .collect();
    Row::new(ResultMetadata::new(order.to_vec()), reordered_values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_page_with_properties_in_declared_order() {
        let json = json!({
            "object": "page",
            "id": "p1",
            "archived": false,
            "in_trash": false,
            "properties": {
                "id": { "id": "a", "type": "number", "number": 1 },
            }
        });
        let object = NotionObject::parse(&json).unwrap();
        match object {
            NotionObject::Page { id, properties, .. } => {
                assert_eq!(id, "p1");
                assert_eq!(properties.len(), 1);
            }
            other => panic!("expected Page, got {other:?}"),
        }
    }

    #[test]
    fn empty_metadata_rejects_accessor_use() {
        let metadata = ResultMetadata::empty();
        assert!(!metadata.returns_rows());
        assert!(metadata.index_of("id").is_err());
        assert!(metadata.description().is_none());
    }

    #[test]
    fn row_reordering_matches_schema_column_order() {
        let object = NotionObject::Page {
            id: "p1".to_string(),
            archived: false,
            in_trash: false,
            properties: vec![
                Property { name: "name".into(), id: "1".into(), kind: "title".into(), value: json!(1) },
                Property { name: "id".into(), id: "2".into(), kind: "number".into(), value: json!(2) },
            ],
        };
        let rows = rows_from_objects(&[object], Some(&["id".to_string(), "name".to_string()]));
        assert_eq!(rows[0].metadata().keys(), &["id".to_string(), "name".to_string()]);
    }
}
