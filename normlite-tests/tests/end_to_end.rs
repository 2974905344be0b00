//! End-to-end scenarios driven entirely through the connection API, against
//! the in-memory Notion client. No internal component is mocked — only the
//! external Notion boundary is swapped for its in-memory double.

use normlite_core::client::InMemoryNotionClient;
use normlite_core::schema::{Column, MetaData, Table, IMPLICIT_ARCHIVED_COLUMN, IMPLICIT_ID_COLUMN};
use normlite_core::types::{TypeEngine, Value};
use normlite_core::{Connection, LockManager, LockMode, NormliteError, NotionClient};
use normlite_sql::{ColumnDef, Constant, SelectColumns, SqlType, Statement};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn new_connection() -> Connection {
    let client: Arc<dyn NotionClient> = Arc::new(InMemoryNotionClient::new());
    Connection::new(client, Arc::new(Mutex::new(MetaData::new())))
}

fn declare_students(conn: &Connection, with_name_and_grade: bool) {
    let mut columns = vec![Column::new("id", TypeEngine::Integer, true)];
    if with_name_and_grade {
        columns.push(Column::new("name", TypeEngine::String { is_title: true }, false));
        columns.push(Column::new("grade", TypeEngine::String { is_title: false }, false));
    }
    conn.metadata().lock().unwrap().add(Table::new("students", columns).unwrap()).unwrap();
}

fn create_students_statement(with_name_and_grade: bool) -> Statement {
    let mut columns = vec![ColumnDef { name: "id".to_string(), sql_type: SqlType::Int, primary_key: true }];
    if with_name_and_grade {
        columns.push(ColumnDef { name: "name".to_string(), sql_type: SqlType::TitleVarchar(255), primary_key: false });
        columns.push(ColumnDef { name: "grade".to_string(), sql_type: SqlType::Varchar(1), primary_key: false });
    }
    Statement::CreateTable { table: "students".to_string(), columns, position: Default::default() }
}

fn insert_student(id: i64, name: &str, grade: &str) -> Statement {
    Statement::Insert {
        table: "students".to_string(),
        columns: vec!["id".to_string(), "name".to_string(), "grade".to_string()],
        values: vec![Constant::Integer(id), Constant::Str(name.to_string()), Constant::Str(grade.to_string())],
        position: Default::default(),
    }
}

fn select_students() -> Statement {
    Statement::Select {
        table: "students".to_string(),
        columns: SelectColumns::Named(vec!["id".to_string(), "name".to_string(), "grade".to_string()]),
        filter: None,
        position: Default::default(),
    }
}

/// Scenario 1: create + insert + select, insertion order preserved.
#[tokio::test]
async fn create_insert_select_round_trips_in_insertion_order() {
    let mut conn = new_connection();
    declare_students(&conn, true);

    conn.execute(create_students_statement(true), json!({})).unwrap();
    conn.commit().await.unwrap();

    conn.execute(insert_student(1, "Isaac Newton", "B"), json!({})).unwrap();
    conn.commit().await.unwrap();

    conn.execute(insert_student(2, "Galileo Galilei", "A"), json!({})).unwrap();
    conn.commit().await.unwrap();

    conn.execute(select_students(), json!({})).unwrap();
    conn.commit().await.unwrap();
    let rows = conn.last_committed_mut().unwrap().fetchall().unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("id").unwrap(), &json!(1));
    assert_eq!(rows[0].get("name").unwrap(), &json!("Isaac Newton"));
    assert_eq!(rows[0].get("grade").unwrap(), &json!("B"));
    assert_eq!(rows[1].get("id").unwrap(), &json!(2));
    assert_eq!(rows[1].get("name").unwrap(), &json!("Galileo Galilei"));
    assert_eq!(rows[1].get("grade").unwrap(), &json!("A"));
}

/// Scenario 2: a parametric insert is invisible until its transaction
/// commits.
#[tokio::test]
async fn parametric_insert_is_invisible_until_commit() {
    let mut conn = new_connection();
    declare_students(&conn, true);
    conn.execute(create_students_statement(true), json!({})).unwrap();
    conn.commit().await.unwrap();

    conn.execute(insert_student(1, "Isaac Newton", "B"), json!({})).unwrap();
    conn.commit().await.unwrap();
    conn.execute(insert_student(2, "Galileo Galilei", "A"), json!({})).unwrap();
    conn.commit().await.unwrap();

    conn.execute(select_students(), json!({})).unwrap();
    conn.commit().await.unwrap();
    assert_eq!(conn.last_committed_mut().unwrap().fetchall().unwrap().len(), 2);

    // Stage the parametric insert without committing it.
    conn.execute(
        Statement::Insert {
            table: "students".to_string(),
            columns: vec!["id".to_string(), "name".to_string(), "grade".to_string()],
            values: vec![
                Constant::Param("id".to_string()),
                Constant::Param("name".to_string()),
                Constant::Param("grade".to_string()),
            ],
            position: Default::default(),
        },
        json!({ "id": 3, "name": "Newton", "grade": "C" }),
    )
    .unwrap();
    assert_eq!(conn.transaction_state(), Some(normlite_core::TransactionState::Active));

    conn.commit().await.unwrap();
    conn.execute(select_students(), json!({})).unwrap();
    conn.commit().await.unwrap();
    assert_eq!(conn.last_committed_mut().unwrap().fetchall().unwrap().len(), 3);
}

/// Scenario 3: a conflicting exclusive lock raises `AcquireLockFailed`
/// synchronously; the holder's commit still succeeds and the loser can
/// acquire once the holder releases.
#[test]
fn conflicting_lock_raises_then_clears_on_release() {
    let locks = LockManager::new();
    locks.acquire("students", "holder", LockMode::Exclusive).unwrap();

    let err = locks.acquire("students", "other", LockMode::Exclusive).unwrap_err();
    assert!(matches!(err, NormliteError::AcquireLockFailed { .. }));

    locks.release("holder");
    locks.acquire("students", "other", LockMode::Exclusive).unwrap();
}

/// Scenario 4: rollback leaves no trace and transitions to `ABORTED`.
#[tokio::test]
async fn rollback_discards_staged_inserts() {
    let mut conn = new_connection();
    declare_students(&conn, false);
    conn.execute(create_students_statement(false), json!({})).unwrap();
    conn.commit().await.unwrap();

    conn.execute(
        Statement::Insert {
            table: "students".to_string(),
            columns: vec!["id".to_string()],
            values: vec![Constant::Integer(1)],
            position: Default::default(),
        },
        json!({}),
    )
    .unwrap();
    conn.execute(
        Statement::Insert {
            table: "students".to_string(),
            columns: vec!["id".to_string()],
            values: vec![Constant::Integer(2)],
            position: Default::default(),
        },
        json!({}),
    )
    .unwrap();

    conn.rollback().await.unwrap();
    assert_eq!(conn.transaction_state(), None);

    conn.execute(select_students(), json!({})).unwrap();
    conn.commit().await.unwrap();
    assert_eq!(conn.last_committed_mut().unwrap().fetchall().unwrap().len(), 0);
}

/// Scenario 5: reflection recovers column descriptors matching the original
/// declaration plus the two implicit columns.
#[tokio::test]
async fn reflection_round_trips_the_declared_schema() {
    let client: Arc<dyn NotionClient> = Arc::new(InMemoryNotionClient::new());
    let metadata = Arc::new(Mutex::new(MetaData::new()));
    let mut conn = Connection::new(client.clone(), metadata);
    declare_students(&conn, false);
    conn.execute(create_students_statement(false), json!({})).unwrap();
    conn.commit().await.unwrap();

    let mut fresh_metadata = MetaData::new();
    fresh_metadata.add(Table::new("students", vec![]).unwrap()).unwrap();
    normlite_core::reflect::reflect(&mut fresh_metadata, client.as_ref()).await.unwrap();

    let table = fresh_metadata.get("students").unwrap();
    assert!(table.columns.contains("id"));
    assert!(table.columns.contains(IMPLICIT_ID_COLUMN));
    assert!(table.columns.contains(IMPLICIT_ARCHIVED_COLUMN));
}

/// Scenario 6: type bind exemplars.
#[test]
fn type_bind_exemplars_match_the_declared_wire_shapes() {
    assert_eq!(TypeEngine::Integer.bind(&Value::Integer(2)).unwrap(), json!({ "number": 2 }));
    assert_eq!(
        TypeEngine::String { is_title: true }.bind(&Value::Str("Tuscan kale".to_string())).unwrap(),
        json!({ "title": [{ "text": { "content": "Tuscan kale" } }] })
    );
    assert_eq!(TypeEngine::Boolean.bind(&Value::Boolean(false)).unwrap(), json!({ "checkbox": false }));
}
