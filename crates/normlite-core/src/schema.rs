//! Schema registry: tables, columns, and the metadata catalog.
//!
//! A `Column`'s back-reference to its owning `Table` is modeled as the
//! table's name rather than an owning pointer or `Rc`/`Weak` pair — the
//! registry (`MetaData`) is the single owner of every `Table`, so a name
//! lookup is a cheap, cycle-free substitute for a weak reference whose
//! lifetime is bounded by the registry itself.

use crate::error::{NormliteError, NormliteResult};
use crate::types::TypeEngine;
use std::collections::{HashMap, HashSet};

pub const IMPLICIT_ID_COLUMN: &str = "_no_id";
pub const IMPLICIT_ARCHIVED_COLUMN: &str = "_no_archived";

/// A single table column. Created detached (`parent = None`); `parent` is
/// set exactly once, by `ColumnCollection::add` when appended to a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub type_engine: TypeEngine,
    pub primary_key: bool,
    pub parent: Option<String>,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, type_engine: TypeEngine, primary_key: bool) -> Self {
        Self { name: name.into(), type_engine, primary_key, parent: None }
    }
}

/// An ordered, uniquely-named sequence of columns.
///
/// Mutation happens only through `add`; everything else is read access.
/// `ReadOnlyColumns` wraps a `&ColumnCollection` and exposes none of the
/// mutating surface at all, rather than panicking on a duplicated method —
/// the "single readonly failure" called for by the design notes is simply
/// "the method doesn't exist on the read-only type".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnCollection {
    order: Vec<Column>,
    index_of: HashMap<String, usize>,
    names: HashSet<String>,
}

impl ColumnCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mut column: Column, owner: &str) -> NormliteResult<()> {
        if self.names.contains(&column.name) {
            return Err(NormliteError::DuplicateColumn {
                table: owner.to_string(),
                column: column.name,
            });
        }
        column.parent = Some(owner.to_string());
        self.names.insert(column.name.clone());
        self.index_of.insert(column.name.clone(), self.order.len());
        self.order.push(column);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.index_of.get(name).map(|&i| &self.order[i])
    }

    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&Column> {
        self.order.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.order.iter()
    }

    #[must_use]
    pub fn readonly(&self) -> ReadOnlyColumns<'_> {
        ReadOnlyColumns(self)
    }
}

/// An immutable view over a `ColumnCollection`; borrows rather than copies.
pub struct ReadOnlyColumns<'a>(&'a ColumnCollection);

impl<'a> ReadOnlyColumns<'a> {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a Column> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Column> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Notion,
}

/// A registered table: its columns, constraints, and primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: ColumnCollection,
    pub constraints: HashSet<String>,
    pub dialect: Dialect,
    /// The Notion database id this table was created as, populated once the
    /// `CREATE TABLE` operation commits (or by reflection). `None` means the
    /// table is declared but not yet materialized remotely.
    pub remote_id: Option<String>,
}

impl Table {
    /// Builds a table from user-declared columns, auto-appending the two
    /// implicit columns (`_no_id`, `_no_archived`) exactly once.
    pub fn new(name: impl Into<String>, user_columns: Vec<Column>) -> NormliteResult<Self> {
        let name = name.into();
        let mut columns = ColumnCollection::new();
        for column in user_columns {
            columns.add(column, &name)?;
        }
        columns.add(Column::new(IMPLICIT_ID_COLUMN, TypeEngine::ObjectId, true), &name)?;
        columns.add(Column::new(IMPLICIT_ARCHIVED_COLUMN, TypeEngine::ArchivalFlag, false), &name)?;
        Ok(Self { name, columns, constraints: HashSet::new(), dialect: Dialect::Notion, remote_id: None })
    }

    /// The primary key constraint: every column with `primary_key = true`,
    /// in declaration order (implicit `_no_id` always sorts last because it
    /// is always appended last by `new`).
    pub fn primary_key(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }
}

/// Process-scoped registry mapping table name to `Table`, unless explicitly
/// replaced by the caller.
#[derive(Debug, Clone, Default)]
pub struct MetaData {
    tables: HashMap<String, Table>,
}

impl MetaData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, table: Table) -> NormliteResult<()> {
        if self.tables.contains_key(&table.name) {
            return Err(NormliteError::invalid_request(format!(
                "table {:?} is already registered",
                table.name
            )));
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Table> {
        self.tables.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_columns() -> Vec<Column> {
        vec![
            Column::new("id", TypeEngine::Integer, false),
            Column::new("name", TypeEngine::String { is_title: true }, false),
        ]
    }

    #[test]
    fn table_always_gets_both_implicit_columns() {
        let table = Table::new("students", sample_columns()).unwrap();
        assert!(table.columns.contains(IMPLICIT_ID_COLUMN));
        assert!(table.columns.contains(IMPLICIT_ARCHIVED_COLUMN));
        assert_eq!(table.columns.len(), 4);
    }

    #[test]
    fn appended_column_parent_is_set_exactly_once() {
        let table = Table::new("students", sample_columns()).unwrap();
        let id = table.columns.get("id").unwrap();
        assert_eq!(id.parent.as_deref(), Some("students"));
    }

    #[test]
    fn duplicate_column_name_fails() {
        let columns = vec![
            Column::new("id", TypeEngine::Integer, false),
            Column::new("id", TypeEngine::Integer, false),
        ];
        let err = Table::new("students", columns).unwrap_err();
        assert!(matches!(err, NormliteError::DuplicateColumn { .. }));
    }

    #[test]
    fn primary_key_includes_implicit_id_and_user_declared_keys() {
        let columns = vec![Column::new("id", TypeEngine::Integer, true)];
        let table = Table::new("students", columns).unwrap();
        let pk: Vec<&str> = table.primary_key().map(|c| c.name.as_str()).collect();
        assert_eq!(pk, vec!["id", IMPLICIT_ID_COLUMN]);
    }

    #[test]
    fn metadata_rejects_duplicate_table_registration() {
        let mut metadata = MetaData::new();
        metadata.add(Table::new("students", sample_columns()).unwrap()).unwrap();
        let err = metadata.add(Table::new("students", vec![]).unwrap()).unwrap_err();
        assert!(matches!(err, NormliteError::InvalidRequest { .. }));
    }
}
