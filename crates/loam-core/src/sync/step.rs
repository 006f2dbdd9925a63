//! Migration steps.
//!
//! Each step carries the minimal data to execute it and to describe
//! itself for logging. Sequences are ephemeral: generated by the differ,
//! executed, and discarded.

use crate::dialect::ColumnType;

/// A column as it should be created.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Resolved column type.
    pub ty: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether a UNIQUE constraint applies inline.
    pub unique: bool,
    /// Default value as a SQL expression.
    pub default: Option<String>,
    /// Whether this is the primary key column.
    pub primary_key: bool,
    /// Whether the primary key auto-increments.
    pub autoincrement: bool,
}

impl ColumnSpec {
    /// Plain nullable column of the given type.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            unique: false,
            default: None,
            primary_key: false,
            autoincrement: false,
        }
    }

    /// The conventional auto-increment big-integer primary key.
    #[must_use]
    pub fn primary_key(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ColumnType::BigInt,
            nullable: false,
            unique: false,
            default: None,
            primary_key: true,
            autoincrement: true,
        }
    }
}

/// A foreign key as it should be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySpec {
    /// Constraint name.
    pub name: String,
    /// Columns on the owning table.
    pub columns: Vec<String>,
    /// Referenced table.
    pub references_table: String,
    /// Referenced columns.
    pub references_columns: Vec<String>,
}

/// A single schema-altering operation.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationStep {
    /// Create a table with all its columns. `foreign_keys` is only
    /// populated on dialects that cannot add constraints after the
    /// fact; elsewhere FK creation is a separate deferred step.
    CreateTable {
        /// Table name.
        table: String,
        /// Columns in order, primary key first.
        columns: Vec<ColumnSpec>,
        /// Inline foreign keys (SQLite only).
        foreign_keys: Vec<ForeignKeySpec>,
    },
    /// Add a column to an existing table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column to add.
        column: ColumnSpec,
    },
    /// Change a column's type (safe widenings only; the differ gates
    /// anything else behind a warning).
    AlterColumnType {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Current type, for the log line.
        from: ColumnType,
        /// New type.
        to: ColumnType,
        /// Nullability to restate on dialects whose ALTER form rewrites
        /// the whole column definition.
        nullable: bool,
    },
    /// Drop a column. Only emitted when destructive migrations are
    /// explicitly allowed.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// Create an index.
    AddIndex {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
        /// Covered columns.
        columns: Vec<String>,
        /// Whether the index is UNIQUE.
        unique: bool,
    },
    /// Drop an index.
    DropIndex {
        /// Table name (required by MySQL's DROP INDEX form).
        table: String,
        /// Index name.
        name: String,
    },
    /// Add a foreign key constraint. Deferred until both endpoint
    /// tables exist.
    AddForeignKey {
        /// Table name.
        table: String,
        /// Constraint.
        spec: ForeignKeySpec,
    },
    /// Drop a foreign key constraint.
    DropForeignKey {
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },
}

impl MigrationStep {
    /// One-line description for logs and for `PartialMigration` errors.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::CreateTable { table, columns, .. } => {
                format!("create table {table} ({} columns)", columns.len())
            }
            Self::AddColumn { table, column } => {
                format!("add column {table}.{}", column.name)
            }
            Self::AlterColumnType {
                table,
                column,
                from,
                to,
                ..
            } => format!("alter column {table}.{column} from {from} to {to}"),
            Self::DropColumn { table, column } => format!("drop column {table}.{column}"),
            Self::AddIndex { table, name, unique, .. } => {
                if *unique {
                    format!("add unique index {name} on {table}")
                } else {
                    format!("add index {name} on {table}")
                }
            }
            Self::DropIndex { table, name } => format!("drop index {name} on {table}"),
            Self::AddForeignKey { table, spec } => {
                format!(
                    "add foreign key {} on {table} referencing {}",
                    spec.name, spec.references_table
                )
            }
            Self::DropForeignKey { table, name } => {
                format!("drop foreign key {name} on {table}")
            }
        }
    }

    /// The table this step operates on.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table, .. }
            | Self::AddColumn { table, .. }
            | Self::AlterColumnType { table, .. }
            | Self::DropColumn { table, .. }
            | Self::AddIndex { table, .. }
            | Self::DropIndex { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::DropForeignKey { table, .. } => table,
        }
    }

    /// Whether the step discards data or structure.
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        matches!(self, Self::DropColumn { .. })
    }
}
