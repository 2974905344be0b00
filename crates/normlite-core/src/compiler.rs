//! Lowers a parsed `Statement` plus schema plus bound parameters into a
//! `CallDescriptor` ready for the Notion client.
//!
//! This is a pure recursive function over the AST's tagged variants — no
//! dynamic dispatch, per the design notes: the same `(ast, schema, params)`
//! input always produces the same descriptor.

use crate::client::ROOT_PAGE_ID;
use crate::error::{NormliteError, NormliteResult};
use crate::schema::{MetaData, Table};
use crate::types::{TypeEngine, Value};
use normlite_sql::{ColumnDef, ComparisonOp, Constant, LogicalOp, SelectColumns, SqlType, Statement, WhereExpr};
use serde_json::{json, Map, Value as Json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Pages,
    Databases,
    Blocks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Create,
    Retrieve,
    Update,
    Query,
}

/// `{endpoint, request, payload, params}` — the contract the Notion client
/// is invoked with. `payload` may contain named placeholders of the form
/// `:name`, resolved from `params` at staging time.
#[derive(Debug, Clone, PartialEq)]
pub struct CallDescriptor {
    pub endpoint: Endpoint,
    pub request: RequestKind,
    pub payload: Json,
    pub params: Json,
}

#[must_use]
pub fn sql_type_to_type_engine(sql_type: &SqlType) -> TypeEngine {
    match sql_type {
        SqlType::Int => TypeEngine::Integer,
        SqlType::Number => TypeEngine::Numeric,
        SqlType::Money(currency) => TypeEngine::Money { currency: currency.clone() },
        SqlType::Bool => TypeEngine::Boolean,
        SqlType::Date => TypeEngine::Date,
        SqlType::Varchar(_) => TypeEngine::String { is_title: false },
        SqlType::TitleVarchar(_) => TypeEngine::String { is_title: true },
    }
}

/// Compiles a statement into a call descriptor. `metadata` is consulted for
/// column resolution on `INSERT`/`SELECT`; `CREATE TABLE` never needs it.
pub fn compile(statement: &Statement, metadata: &MetaData) -> NormliteResult<CallDescriptor> {
    match statement {
        Statement::CreateTable { table, columns, .. } => compile_create_table(table, columns),
        Statement::Insert { table, columns, values, .. } => compile_insert(table, columns, values, metadata),
        Statement::Select { table, filter, .. } => compile_select(table, filter.as_ref(), metadata),
        Statement::DropTable { table, .. } => compile_drop_table(table, metadata),
    }
}

fn compile_create_table(table: &str, columns: &[ColumnDef]) -> NormliteResult<CallDescriptor> {
    let mut properties = Map::new();
    for column in columns {
        let engine = sql_type_to_type_engine(&column.sql_type);
        properties.insert(column.name.clone(), engine.col_spec());
    }
    let payload = json!({
        "title": [{ "text": { "content": table } }],
        "properties": properties,
        "parent": { "page_id": ROOT_PAGE_ID },
    });
    Ok(CallDescriptor { endpoint: Endpoint::Databases, request: RequestKind::Create, payload, params: json!({}) })
}

fn resolve_table<'a>(metadata: &'a MetaData, name: &str) -> NormliteResult<&'a Table> {
    metadata.get(name).ok_or_else(|| NormliteError::argument(format!("unknown table {name:?}")))
}

fn remote_database_id(table: &Table) -> NormliteResult<&str> {
    table
        .remote_id
        .as_deref()
        .ok_or_else(|| NormliteError::argument(format!("table {:?} has not been created yet", table.name)))
}

fn compile_insert(
    table_name: &str,
    columns: &[String],
    values: &[Constant],
    metadata: &MetaData,
) -> NormliteResult<CallDescriptor> {
    let table = resolve_table(metadata, table_name)?;
    let database_id = remote_database_id(table)?;
    let mut properties = Map::new();
    for (column_name, value) in columns.iter().zip(values.iter()) {
        let column = table
            .columns
            .get(column_name)
            .ok_or_else(|| NormliteError::argument(format!("unknown column {column_name:?} on table {table_name:?}")))?;
        let fragment = match value {
            Constant::Param(name) => Json::String(format!(":{name}")),
            literal => {
                let native = constant_to_value(literal, column.type_engine.clone())?;
                column.type_engine.clone().bind(&native)?
            }
        };
        properties.insert(column_name.clone(), fragment);
    }
    let payload = json!({
        "parent": { "database_id": database_id },
        "properties": properties,
    });
    Ok(CallDescriptor { endpoint: Endpoint::Pages, request: RequestKind::Create, payload, params: json!({}) })
}

fn compile_select(
    table_name: &str,
    filter: Option<&WhereExpr>,
    metadata: &MetaData,
) -> NormliteResult<CallDescriptor> {
    let table = resolve_table(metadata, table_name)?;
    let database_id = remote_database_id(table)?;
    let mut payload = Map::new();
    payload.insert("database_id".to_string(), json!(database_id));
    if let Some(expr) = filter {
        payload.insert("filter".to_string(), compile_where(expr, table)?);
    }
    Ok(CallDescriptor {
        endpoint: Endpoint::Databases,
        request: RequestKind::Query,
        payload: Json::Object(payload),
        params: json!({}),
    })
}

fn compile_drop_table(table_name: &str, metadata: &MetaData) -> NormliteResult<CallDescriptor> {
    let table = resolve_table(metadata, table_name)?;
    let database_id = remote_database_id(table)?;
    let payload = json!({ "database_id": database_id, "archived": true });
    Ok(CallDescriptor { endpoint: Endpoint::Databases, request: RequestKind::Update, payload, params: json!({}) })
}

fn compile_where(expr: &WhereExpr, table: &Table) -> NormliteResult<Json> {
    match expr {
        WhereExpr::Logical { op, left, right } => {
            let key = match op {
                LogicalOp::And => "and",
                LogicalOp::Or => "or",
            };
            Ok(json!({ key: [compile_where(left, table)?, compile_where(right, table)?] }))
        }
        WhereExpr::Comparison { column, op, value } => {
            let col = table
                .columns
                .get(column)
                .ok_or_else(|| NormliteError::argument(format!("unknown column {column:?} on table {:?}", table.name)))?;
            let verb = comparison_verb(*op);
            let native = constant_to_value(value, col.type_engine.clone())?;
            let literal = literal_json(&native);
            Ok(json!({ "property": column, verb: literal }))
        }
    }
}

fn comparison_verb(op: ComparisonOp) -> &'static str {
    match op {
        ComparisonOp::Eq => "equals",
        ComparisonOp::NotEq => "does_not_equal",
        ComparisonOp::Lt => "less_than",
        ComparisonOp::LtEq => "less_than_or_equal_to",
        ComparisonOp::Gt => "greater_than",
        ComparisonOp::GtEq => "greater_than_or_equal_to",
    }
}

fn literal_json(value: &Value) -> Json {
    match value {
        Value::Integer(n) => json!(n),
        Value::Numeric(n) | Value::Money(n) => json!(n),
        Value::Str(s) => json!(s),
        Value::Boolean(b) => json!(b),
        Value::Date { start, .. } => json!(start),
        Value::Uuid(s) | Value::ObjectId(s) => json!(s),
        Value::Archived(b) => json!(b),
        Value::Null => Json::Null,
    }
}

/// Coerces a parsed AST literal through a column's declared type engine.
/// `Param` constants must be resolved before reaching this function.
pub fn constant_to_value(constant: &Constant, engine: TypeEngine) -> NormliteResult<Value> {
    match (constant, engine) {
        (Constant::Integer(n), TypeEngine::Integer) => Ok(Value::Integer(*n)),
        (Constant::Integer(n), TypeEngine::Numeric) => Ok(Value::Numeric(*n as f64)),
        (Constant::Integer(n), TypeEngine::Money { .. }) => Ok(Value::Money(*n as f64)),
        (Constant::Number(n), TypeEngine::Numeric) => Ok(Value::Numeric(*n)),
        (Constant::Number(n), TypeEngine::Money { .. }) => Ok(Value::Money(*n)),
        (Constant::Str(s), TypeEngine::String { is_title: _ }) => Ok(Value::Str(s.clone())),
        (Constant::Str(s), TypeEngine::Date) => Ok(Value::Date { start: s.clone(), end: None }),
        (Constant::Str(s), TypeEngine::Uuid) => Ok(Value::Uuid(s.clone())),
        (Constant::Str(s), TypeEngine::ObjectId) => Ok(Value::ObjectId(s.clone())),
        (Constant::Bool(b), TypeEngine::Boolean) => Ok(Value::Boolean(*b)),
        (Constant::Bool(b), TypeEngine::ArchivalFlag) => Ok(Value::Archived(*b)),
        (Constant::Param(name), _) => {
            Err(NormliteError::internal(format!("unresolved parameter :{name} reached the compiler")))
        }
        (other, engine) => Err(NormliteError::argument(format!(
            "literal {other:?} is not compatible with column type {engine:?}"
        ))),
    }
}

/// Substitutes `:name` placeholders in a compiled payload with values from
/// `params`, coercing each through the owning column's type engine. Used by
/// the transaction-aware cursor at stage time.
pub fn resolve_placeholders(payload: &Json, params: &Json, table: &Table) -> NormliteResult<Json> {
    let mut resolved = payload.clone();
    if let Some(properties) = resolved.get_mut("properties").and_then(Json::as_object_mut) {
        for (column_name, fragment) in properties.iter_mut() {
            let Json::String(s) = fragment else { continue };
            let Some(name) = s.strip_prefix(':') else { continue };
            let column = table
                .columns
                .get(column_name)
                .ok_or_else(|| NormliteError::argument(format!("unknown column {column_name:?}")))?;
            let raw = params
                .get(name)
                .ok_or_else(|| NormliteError::interface(format!("missing bind parameter {name:?}")))?;
            let native = json_to_value(raw, column.type_engine.clone())?;
            *fragment = column.type_engine.clone().bind(&native)?;
        }
    }
    Ok(resolved)
}

fn json_to_value(raw: &Json, engine: TypeEngine) -> NormliteResult<Value> {
    match (raw, engine) {
        (Json::Number(n), TypeEngine::Integer) => n
            .as_i64()
            .map(Value::Integer)
            .ok_or_else(|| NormliteError::interface("expected an integer parameter")),
        (Json::Number(n), TypeEngine::Numeric) => Ok(Value::Numeric(n.as_f64().unwrap_or_default())),
        (Json::Number(n), TypeEngine::Money { .. }) => Ok(Value::Money(n.as_f64().unwrap_or_default())),
        (Json::String(s), TypeEngine::String { .. }) => Ok(Value::Str(s.clone())),
        (Json::String(s), TypeEngine::Date) => Ok(Value::Date { start: s.clone(), end: None }),
        (Json::String(s), TypeEngine::Uuid) => Ok(Value::Uuid(s.clone())),
        (Json::String(s), TypeEngine::ObjectId) => Ok(Value::ObjectId(s.clone())),
        (Json::Bool(b), TypeEngine::Boolean) => Ok(Value::Boolean(*b)),
        (Json::Bool(b), TypeEngine::ArchivalFlag) => Ok(Value::Archived(*b)),
        (_, engine) => Err(NormliteError::interface(format!("parameter {raw} is not compatible with {engine:?}"))),
    }
}
