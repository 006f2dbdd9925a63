//! Live schema: the database as it physically exists.
//!
//! Produced fresh by the inspector on every synchronization pass and
//! only ever diffed against the logical schema, never patched in place.

use std::collections::BTreeMap;

use crate::dialect::ColumnType;

/// A column as inspected from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveColumn {
    /// Column name.
    pub name: String,
    /// Classified type. Unclassifiable native types become
    /// [`ColumnType::Unknown`] and are compared conservatively.
    pub ty: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default expression as reported by the engine, if any.
    pub default: Option<String>,
}

/// An index as inspected from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveIndex {
    /// Index name.
    pub name: String,
    /// Covered columns in order.
    pub columns: Vec<String>,
    /// Whether this is a UNIQUE index.
    pub unique: bool,
}

/// A foreign key as inspected from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveForeignKey {
    /// Constraint name if the engine reports one.
    pub name: Option<String>,
    /// Columns on the owning table.
    pub columns: Vec<String>,
    /// Referenced table.
    pub references_table: String,
    /// Referenced columns.
    pub references_columns: Vec<String>,
}

/// A table as inspected from the database.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiveTable {
    /// Table name.
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<LiveColumn>,
    /// Indexes on this table.
    pub indexes: Vec<LiveIndex>,
    /// Foreign keys on this table.
    pub foreign_keys: Vec<LiveForeignKey>,
}

impl LiveTable {
    /// Creates an empty table entry.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&LiveColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// The inspected schema: every application table, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveSchema {
    /// Tables keyed by name for deterministic iteration.
    pub tables: BTreeMap<String, LiveTable>,
}

impl LiveSchema {
    /// Creates an empty schema (fresh install).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table.
    pub fn add_table(&mut self, table: LiveTable) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&LiveTable> {
        self.tables.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_schema_has_no_tables() {
        let live = LiveSchema::new();
        assert!(live.tables.is_empty());
        assert!(live.table("articles").is_none());
    }

    #[test]
    fn column_lookup() {
        let mut table = LiveTable::new("articles");
        table.columns.push(LiveColumn {
            name: "title".to_string(),
            ty: ColumnType::Varchar(Some(255)),
            nullable: false,
            default: None,
        });
        assert!(table.column("title").is_some());
        assert!(table.column("missing").is_none());
    }
}
