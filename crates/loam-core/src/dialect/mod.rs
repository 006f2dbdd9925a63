//! Dialect drivers.
//!
//! A closed set of engine variants behind one capability surface,
//! selected once at startup. Each dialect owns identifier quoting,
//! attribute-to-column type mapping, DDL generation for migration
//! steps, parameter placeholder syntax, and the classification tables
//! that turn native error codes into the core taxonomy.

mod mysql;
mod postgres;
mod sqlite;

use std::fmt;

use serde::Deserialize;

use crate::error::{ConstraintKind, CoreError, Result};
use crate::schema::{AttributeDefinition, AttributeType, JoinStrategy};
use crate::sync::{ColumnSpec, ForeignKeySpec, MigrationStep};

/// Resolved column types, the common denominator the differ compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Double-precision float.
    Double,
    /// Bounded string; `None` means unbounded on engines that allow it.
    Varchar(Option<u32>),
    /// Unbounded text.
    Text,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Date and time.
    DateTime,
    /// JSON document.
    Json,
    /// A native type the inspector could not classify. Compared
    /// conservatively: never considered safely convertible.
    Unknown(String),
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SmallInt => write!(f, "smallint"),
            Self::Integer => write!(f, "integer"),
            Self::BigInt => write!(f, "bigint"),
            Self::Double => write!(f, "double"),
            Self::Varchar(Some(n)) => write!(f, "varchar({n})"),
            Self::Varchar(None) => write!(f, "varchar"),
            Self::Text => write!(f, "text"),
            Self::Boolean => write!(f, "boolean"),
            Self::Date => write!(f, "date"),
            Self::DateTime => write!(f, "datetime"),
            Self::Json => write!(f, "json"),
            Self::Unknown(native) => write!(f, "unknown({native})"),
        }
    }
}

/// The supported SQL engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL.
    Postgres,
    /// MySQL / MariaDB.
    MySql,
    /// SQLite.
    Sqlite,
}

impl Dialect {
    /// Dialect name for logs and error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Quotes an identifier.
    #[must_use]
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Self::Postgres | Self::Sqlite => format!("\"{name}\""),
            Self::MySql => format!("`{name}`"),
        }
    }

    /// Parameter placeholder for the 1-based ordinal.
    #[must_use]
    pub fn placeholder(self, ordinal: usize) -> String {
        match self {
            Self::Postgres => format!("${ordinal}"),
            Self::MySql | Self::Sqlite => "?".to_string(),
        }
    }

    /// Whether INSERT ... RETURNING is available.
    #[must_use]
    pub const fn supports_returning(self) -> bool {
        matches!(self, Self::Postgres | Self::Sqlite)
    }

    /// Whether the engine enforces foreign keys.
    #[must_use]
    pub const fn supports_foreign_keys(self) -> bool {
        true
    }

    /// Whether constraints can be added/dropped with ALTER TABLE after
    /// table creation. SQLite cannot; its FKs are declared inline at
    /// CREATE TABLE time.
    #[must_use]
    pub const fn supports_alter_foreign_key(self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    /// Whether a column's type can be changed in place.
    #[must_use]
    pub const fn supports_alter_column_type(self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    /// Whether DDL participates in transactions and rolls back cleanly.
    #[must_use]
    pub const fn supports_transactional_ddl(self) -> bool {
        !matches!(self, Self::MySql)
    }

    /// Whether a native JSON column type exists.
    #[must_use]
    pub const fn supports_native_json(self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    /// Resolves an attribute to the column type it materializes as.
    ///
    /// # Errors
    ///
    /// `UnsupportedType` for attributes with no scalar column on this
    /// dialect (components, relations without a join column).
    pub fn column_type_for(self, attr: &AttributeDefinition) -> Result<ColumnType> {
        let unsupported = || CoreError::UnsupportedType {
            dialect: self.name(),
            attribute: attr.name.clone(),
            ty: attr.ty.name().to_string(),
        };
        match &attr.ty {
            AttributeType::String { length } => Ok(ColumnType::Varchar(Some(*length))),
            AttributeType::Text => Ok(ColumnType::Text),
            AttributeType::Integer => Ok(ColumnType::Integer),
            AttributeType::BigInteger => Ok(ColumnType::BigInt),
            AttributeType::Float => Ok(ColumnType::Double),
            AttributeType::Boolean => Ok(ColumnType::Boolean),
            AttributeType::Date => Ok(ColumnType::Date),
            AttributeType::DateTime => Ok(ColumnType::DateTime),
            AttributeType::Json => Ok(ColumnType::Json),
            AttributeType::Relation(def) => match &def.strategy {
                // FK columns reference the auto-increment pk.
                JoinStrategy::JoinColumn { .. } => Ok(ColumnType::BigInt),
                _ => Err(unsupported()),
            },
            AttributeType::Component { .. } => Err(unsupported()),
        }
    }

    /// Collapses a resolved type to what the engine will actually
    /// store and report back through inspection. Identity everywhere
    /// except SQLite's reduced type system.
    #[must_use]
    pub fn normalize(self, ty: &ColumnType) -> ColumnType {
        match self {
            Self::Postgres | Self::MySql => ty.clone(),
            Self::Sqlite => sqlite::normalize(ty),
        }
    }

    /// Native SQL spelling of a column type.
    #[must_use]
    pub fn column_type_sql(self, ty: &ColumnType) -> String {
        match self {
            Self::Postgres => postgres::column_type_sql(ty),
            Self::MySql => mysql::column_type_sql(ty),
            Self::Sqlite => sqlite::column_type_sql(ty),
        }
    }

    /// Classifies a native type string reported by the inspector.
    #[must_use]
    pub fn classify_native_type(self, native: &str) -> ColumnType {
        match self {
            Self::Postgres => postgres::classify_native_type(native),
            Self::MySql => mysql::classify_native_type(native),
            Self::Sqlite => sqlite::classify_native_type(native),
        }
    }

    /// Classifies a native error code (with its message, which some
    /// engines need for disambiguation) into a constraint kind.
    /// Unrecognized codes return `None` and fall through to the
    /// `Database` catch-all.
    #[must_use]
    pub fn classify_code(self, code: &str, message: &str) -> Option<ConstraintKind> {
        match self {
            Self::Postgres => postgres::classify_code(code),
            Self::MySql => mysql::classify_code(code, message),
            Self::Sqlite => sqlite::classify_code(code, message),
        }
    }

    /// Generates the DDL statement for one migration step.
    ///
    /// # Errors
    ///
    /// `UnsupportedOperation` for steps the engine has no ALTER form
    /// for (the differ avoids emitting these; this is the backstop).
    pub fn ddl(self, step: &MigrationStep) -> Result<String> {
        match step {
            MigrationStep::CreateTable {
                table,
                columns,
                foreign_keys,
            } => Ok(self.create_table_sql(table, columns, foreign_keys)),
            MigrationStep::AddColumn { table, column } => Ok(format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.quote_identifier(table),
                self.column_definition(column)
            )),
            MigrationStep::AlterColumnType {
                table,
                column,
                to,
                nullable,
                ..
            } => self.alter_column_type_sql(table, column, to, *nullable),
            MigrationStep::DropColumn { table, column } => Ok(format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.quote_identifier(table),
                self.quote_identifier(column)
            )),
            MigrationStep::AddIndex {
                table,
                name,
                columns,
                unique,
            } => {
                let cols: Vec<String> =
                    columns.iter().map(|c| self.quote_identifier(c)).collect();
                Ok(format!(
                    "CREATE {}INDEX {} ON {} ({})",
                    if *unique { "UNIQUE " } else { "" },
                    self.quote_identifier(name),
                    self.quote_identifier(table),
                    cols.join(", ")
                ))
            }
            MigrationStep::DropIndex { table, name } => Ok(match self {
                Self::MySql => format!(
                    "DROP INDEX {} ON {}",
                    self.quote_identifier(name),
                    self.quote_identifier(table)
                ),
                Self::Postgres | Self::Sqlite => {
                    format!("DROP INDEX {}", self.quote_identifier(name))
                }
            }),
            MigrationStep::AddForeignKey { table, spec } => {
                if !self.supports_alter_foreign_key() {
                    return Err(CoreError::UnsupportedOperation(format!(
                        "{} cannot add a foreign key to an existing table",
                        self.name()
                    )));
                }
                Ok(format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} {}",
                    self.quote_identifier(table),
                    self.quote_identifier(&spec.name),
                    self.foreign_key_clause(spec)
                ))
            }
            MigrationStep::DropForeignKey { table, name } => match self {
                Self::Postgres => Ok(format!(
                    "ALTER TABLE {} DROP CONSTRAINT {}",
                    self.quote_identifier(table),
                    self.quote_identifier(name)
                )),
                Self::MySql => Ok(format!(
                    "ALTER TABLE {} DROP FOREIGN KEY {}",
                    self.quote_identifier(table),
                    self.quote_identifier(name)
                )),
                Self::Sqlite => Err(CoreError::UnsupportedOperation(
                    "sqlite cannot drop a foreign key from an existing table".to_string(),
                )),
            },
        }
    }

    fn create_table_sql(
        self,
        table: &str,
        columns: &[ColumnSpec],
        foreign_keys: &[ForeignKeySpec],
    ) -> String {
        let mut parts: Vec<String> = columns
            .iter()
            .map(|c| format!("    {}", self.column_definition(c)))
            .collect();
        for fk in foreign_keys {
            parts.push(format!(
                "    CONSTRAINT {} {}",
                self.quote_identifier(&fk.name),
                self.foreign_key_clause(fk)
            ));
        }
        format!(
            "CREATE TABLE {} (\n{}\n)",
            self.quote_identifier(table),
            parts.join(",\n")
        )
    }

    /// Renders one column definition.
    #[must_use]
    pub fn column_definition(self, col: &ColumnSpec) -> String {
        if col.primary_key {
            return match self {
                Self::Postgres => postgres::primary_key_definition(col),
                Self::MySql => mysql::primary_key_definition(col),
                Self::Sqlite => sqlite::primary_key_definition(col),
            };
        }

        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&col.name),
            self.column_type_sql(&col.ty)
        );
        if !col.nullable {
            sql.push_str(" NOT NULL");
        }
        if col.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(ref default) = col.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }

    fn foreign_key_clause(self, spec: &ForeignKeySpec) -> String {
        let cols: Vec<String> = spec
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        let ref_cols: Vec<String> = spec
            .references_columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            cols.join(", "),
            self.quote_identifier(&spec.references_table),
            ref_cols.join(", ")
        )
    }

    fn alter_column_type_sql(
        self,
        table: &str,
        column: &str,
        to: &ColumnType,
        nullable: bool,
    ) -> Result<String> {
        match self {
            Self::Postgres => Ok(format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
                self.quote_identifier(table),
                self.quote_identifier(column),
                self.column_type_sql(to)
            )),
            // MODIFY rewrites the definition, so nullability must be
            // restated.
            Self::MySql => Ok(format!(
                "ALTER TABLE {} MODIFY COLUMN {} {}{}",
                self.quote_identifier(table),
                self.quote_identifier(column),
                self.column_type_sql(to),
                if nullable { "" } else { " NOT NULL" }
            )),
            Self::Sqlite => Err(CoreError::UnsupportedOperation(
                "sqlite cannot change a column's type in place".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_per_dialect() {
        assert_eq!(Dialect::Postgres.quote_identifier("articles"), "\"articles\"");
        assert_eq!(Dialect::Sqlite.quote_identifier("articles"), "\"articles\"");
        assert_eq!(Dialect::MySql.quote_identifier("articles"), "`articles`");
    }

    #[test]
    fn placeholders_per_dialect() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::MySql.placeholder(3), "?");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
    }

    #[test]
    fn capability_table() {
        assert!(Dialect::Postgres.supports_returning());
        assert!(Dialect::Sqlite.supports_returning());
        assert!(!Dialect::MySql.supports_returning());

        assert!(Dialect::Postgres.supports_transactional_ddl());
        assert!(!Dialect::MySql.supports_transactional_ddl());

        assert!(!Dialect::Sqlite.supports_alter_foreign_key());
        assert!(!Dialect::Sqlite.supports_alter_column_type());
        assert!(!Dialect::Sqlite.supports_native_json());
    }

    #[test]
    fn unsupported_component_type() {
        let attr = AttributeDefinition::new(
            "seo",
            AttributeType::Component {
                component_uid: "shared.seo".to_string(),
            },
        );
        let err = Dialect::Postgres.column_type_for(&attr).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnsupportedType { dialect: "postgres", .. }
        ));
    }

    #[test]
    fn add_index_sql() {
        let step = MigrationStep::AddIndex {
            table: "articles".to_string(),
            name: "articles_title_unique".to_string(),
            columns: vec!["title".to_string()],
            unique: true,
        };
        assert_eq!(
            Dialect::Postgres.ddl(&step).unwrap(),
            "CREATE UNIQUE INDEX \"articles_title_unique\" ON \"articles\" (\"title\")"
        );
        assert_eq!(
            Dialect::MySql.ddl(&step).unwrap(),
            "CREATE UNIQUE INDEX `articles_title_unique` ON `articles` (`title`)"
        );
    }

    #[test]
    fn drop_index_needs_table_on_mysql() {
        let step = MigrationStep::DropIndex {
            table: "articles".to_string(),
            name: "idx".to_string(),
        };
        assert_eq!(
            Dialect::MySql.ddl(&step).unwrap(),
            "DROP INDEX `idx` ON `articles`"
        );
        assert_eq!(Dialect::Sqlite.ddl(&step).unwrap(), "DROP INDEX \"idx\"");
    }

    #[test]
    fn sqlite_rejects_fk_alter() {
        let step = MigrationStep::AddForeignKey {
            table: "articles".to_string(),
            spec: ForeignKeySpec {
                name: "fk_articles_author".to_string(),
                columns: vec!["author_id".to_string()],
                references_table: "authors".to_string(),
                references_columns: vec!["id".to_string()],
            },
        };
        assert!(matches!(
            Dialect::Sqlite.ddl(&step),
            Err(CoreError::UnsupportedOperation(_))
        ));
        assert!(Dialect::Postgres.ddl(&step).is_ok());
    }
}
