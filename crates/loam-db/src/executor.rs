//! Query execution and record assembly.
//!
//! Compiles queries against the manager's dialect, binds every operand
//! as a parameter, and maps rows back into [`Record`]s. SELECTs with
//! joins are regrouped into nested records keyed by the root primary
//! key, so a to-many join returns one record per root row with its
//! children collected under the relation attribute.

use sqlx::any::{AnyArguments, AnyRow};
use sqlx::{AnyConnection, Column, Row, TypeInfo};
use tracing::debug;

use loam_core::dialect::Dialect;
use loam_core::error::{CoreError, Result};
use loam_core::query::{plan_joins, CompiledQuery, JoinPlan, Predicate, Query};
use loam_core::schema::LogicalSchema;
use loam_core::value::SqlValue;

use crate::manager::ConnectionManager;
use crate::translate::translate_db_error;

type AnySqlQuery<'q> = sqlx::query::Query<'q, sqlx::Any, AnyArguments<'q>>;

/// One field of an assembled record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A scalar column value.
    Scalar(SqlValue),
    /// A to-one relation: the related record, or `None` when unset.
    One(Option<Record>),
    /// A to-many relation: all related records seen for this root.
    Many(Vec<Record>),
}

/// An assembled row: fields in projection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing an existing one of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Looks up a scalar field by name.
    #[must_use]
    pub fn scalar(&self, name: &str) -> Option<&SqlValue> {
        match self.get(name) {
            Some(FieldValue::Scalar(v)) => Some(v),
            _ => None,
        }
    }

    /// Iterates fields in projection order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Runs queries for one logical schema over one managed pool.
pub struct QueryExecutor<'a> {
    manager: &'a ConnectionManager,
    schema: &'a LogicalSchema,
}

impl<'a> QueryExecutor<'a> {
    /// Creates an executor.
    #[must_use]
    pub const fn new(manager: &'a ConnectionManager, schema: &'a LogicalSchema) -> Self {
        Self { manager, schema }
    }

    /// Runs a SELECT and assembles the result records.
    ///
    /// # Errors
    ///
    /// Compilation errors for invalid IR; translated driver errors at
    /// execution time.
    pub async fn fetch(&self, query: &Query) -> Result<Vec<Record>> {
        let mut conn = self.acquire().await?;
        self.fetch_with(&mut conn, query).await
    }

    /// As [`QueryExecutor::fetch`], on an explicit connection (for use
    /// inside a transaction).
    ///
    /// # Errors
    ///
    /// See [`QueryExecutor::fetch`].
    pub async fn fetch_with(&self, conn: &mut AnyConnection, query: &Query) -> Result<Vec<Record>> {
        let dialect = self.dialect();
        let compiled = query.compile(self.schema, dialect)?;
        let joins = plan_joins(self.schema, query)?;
        self.log(&compiled);

        let rows = run(conn, dialect, &compiled)
            .fetch_all()
            .await?;
        self.assemble(query, &joins, &rows)
    }

    /// Inserts one record and returns it as stored, including the
    /// generated primary key.
    ///
    /// # Errors
    ///
    /// `ConstraintViolation` when the row breaks a constraint;
    /// compilation or translated driver errors otherwise.
    pub async fn insert(&self, query: &Query) -> Result<Record> {
        let mut conn = self.acquire().await?;
        self.insert_with(&mut conn, query).await
    }

    /// As [`QueryExecutor::insert`], on an explicit connection.
    ///
    /// # Errors
    ///
    /// See [`QueryExecutor::insert`].
    pub async fn insert_with(&self, conn: &mut AnyConnection, query: &Query) -> Result<Record> {
        let dialect = self.dialect();
        let compiled = query.compile(self.schema, dialect)?;
        self.log(&compiled);

        if dialect.supports_returning() {
            let row = run(conn, dialect, &compiled).fetch_one().await?;
            return record_from_row(&row, "");
        }

        let result = run(conn, dialect, &compiled).execute().await?;
        let id = result.last_insert_id().ok_or_else(|| CoreError::Database {
            code: None,
            message: "engine did not report an insert id".to_string(),
        })?;

        // Read the row back so defaults filled by the engine are
        // visible to the caller.
        let def = self.schema.get(&query.content_type).ok_or_else(|| {
            CoreError::UnsupportedOperation(format!(
                "unknown content type '{}'",
                query.content_type
            ))
        })?;
        let select = Query::select(&query.content_type)
            .filter(Predicate::eq(def.primary_key.as_str(), id));
        let reread = select.compile(self.schema, dialect)?;
        self.log(&reread);
        let row = run(conn, dialect, &reread).fetch_one().await?;
        record_from_row(&row, "t0_")
    }

    /// Runs an UPDATE and returns the affected row count.
    ///
    /// # Errors
    ///
    /// See [`QueryExecutor::insert`].
    pub async fn update(&self, query: &Query) -> Result<u64> {
        let mut conn = self.acquire().await?;
        self.update_with(&mut conn, query).await
    }

    /// As [`QueryExecutor::update`], on an explicit connection.
    ///
    /// # Errors
    ///
    /// See [`QueryExecutor::insert`].
    pub async fn update_with(&self, conn: &mut AnyConnection, query: &Query) -> Result<u64> {
        let dialect = self.dialect();
        let compiled = query.compile(self.schema, dialect)?;
        self.log(&compiled);
        let result = run(conn, dialect, &compiled).execute().await?;
        Ok(result.rows_affected())
    }

    /// Runs a DELETE and returns the affected row count.
    ///
    /// # Errors
    ///
    /// See [`QueryExecutor::insert`].
    pub async fn delete(&self, query: &Query) -> Result<u64> {
        let mut conn = self.acquire().await?;
        self.delete_with(&mut conn, query).await
    }

    /// As [`QueryExecutor::delete`], on an explicit connection.
    ///
    /// # Errors
    ///
    /// See [`QueryExecutor::insert`].
    pub async fn delete_with(&self, conn: &mut AnyConnection, query: &Query) -> Result<u64> {
        self.update_with(conn, query).await
    }

    const fn dialect(&self) -> Dialect {
        self.manager.dialect()
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Any>> {
        self.manager
            .pool()
            .acquire()
            .await
            .map_err(|e| translate_db_error(self.dialect(), e))
    }

    fn log(&self, compiled: &CompiledQuery) {
        if self.manager.config().log_statements {
            debug!(sql = %compiled.sql, params = compiled.params.len(), "executing");
        }
    }

    /// Regroups flat joined rows into nested records keyed by the root
    /// primary key, preserving arrival order.
    fn assemble(
        &self,
        query: &Query,
        joins: &[JoinPlan],
        rows: &[AnyRow],
    ) -> Result<Vec<Record>> {
        let def = self.schema.get(&query.content_type).ok_or_else(|| {
            CoreError::UnsupportedOperation(format!(
                "unknown content type '{}'",
                query.content_type
            ))
        })?;
        let root_pk_column = format!("t0_{}", def.primary_key);

        let mut keys: Vec<SqlValue> = Vec::new();
        let mut records: Vec<Record> = Vec::new();

        for row in rows {
            let pk = decode_named(row, &root_pk_column)?;
            let position = keys.iter().position(|k| *k == pk);
            let index = if let Some(index) = position {
                index
            } else {
                let mut record = record_from_row(row, "t0_")?;
                for plan in joins {
                    let empty = if plan.to_many {
                        FieldValue::Many(Vec::new())
                    } else {
                        FieldValue::One(None)
                    };
                    record.set(plan.attribute.clone(), empty);
                }
                keys.push(pk);
                records.push(record);
                records.len() - 1
            };

            for plan in joins {
                let target = self.schema.get(&plan.target).ok_or_else(|| {
                    CoreError::UnsupportedOperation(format!(
                        "unknown content type '{}'",
                        plan.target
                    ))
                })?;
                let prefix = format!("{}_", plan.alias);
                let child_pk = decode_named(row, &format!("{}{}", prefix, target.primary_key))?;
                if child_pk.is_null() {
                    continue;
                }
                let child = record_from_row(row, &prefix)?;
                let record = &mut records[index];
                match record.get(&plan.attribute) {
                    Some(FieldValue::Many(existing)) => {
                        let seen = existing
                            .iter()
                            .any(|c| c.scalar(&target.primary_key) == Some(&child_pk));
                        if !seen {
                            let mut children = existing.clone();
                            children.push(child);
                            record.set(plan.attribute.clone(), FieldValue::Many(children));
                        }
                    }
                    Some(FieldValue::One(None)) => {
                        record.set(plan.attribute.clone(), FieldValue::One(Some(child)));
                    }
                    _ => {}
                }
            }
        }

        Ok(records)
    }
}

/// Prepared statement with bound parameters plus uniform error
/// translation.
struct Run<'q> {
    conn: &'q mut AnyConnection,
    dialect: Dialect,
    query: AnySqlQuery<'q>,
}

fn run<'q>(conn: &'q mut AnyConnection, dialect: Dialect, compiled: &'q CompiledQuery) -> Run<'q> {
    let mut query = sqlx::query(&compiled.sql);
    for param in &compiled.params {
        query = bind_value(query, param);
    }
    Run {
        conn,
        dialect,
        query,
    }
}

impl Run<'_> {
    async fn fetch_all(self) -> Result<Vec<AnyRow>> {
        self.query
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| translate_db_error(self.dialect, e))
    }

    async fn fetch_one(self) -> Result<AnyRow> {
        self.query
            .fetch_one(&mut *self.conn)
            .await
            .map_err(|e| translate_db_error(self.dialect, e))
    }

    async fn execute(self) -> Result<sqlx::any::AnyQueryResult> {
        self.query
            .execute(&mut *self.conn)
            .await
            .map_err(|e| translate_db_error(self.dialect, e))
    }
}

/// Binds one value. Dates and JSON go over the wire as ISO-8601 /
/// serialized text; the engines coerce on their side.
fn bind_value<'q>(query: AnySqlQuery<'q>, value: &SqlValue) -> AnySqlQuery<'q> {
    if let Some(text) = value.as_text_fallback() {
        return query.bind(text);
    }
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
        // Covered by the text fallback above.
        SqlValue::Date(_) | SqlValue::DateTime(_) | SqlValue::Json(_) => {
            query.bind(Option::<String>::None)
        }
    }
}

/// Builds a record from every column carrying the given alias prefix
/// (empty prefix takes all columns), stripping the prefix.
fn record_from_row(row: &AnyRow, prefix: &str) -> Result<Record> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let Some(name) = column.name().strip_prefix(prefix) else {
            continue;
        };
        record.set(name.to_string(), FieldValue::Scalar(decode_index(row, index)?));
    }
    Ok(record)
}

fn decode_named(row: &AnyRow, name: &str) -> Result<SqlValue> {
    let index = row
        .columns()
        .iter()
        .position(|c| c.name() == name)
        .ok_or_else(|| CoreError::Database {
            code: None,
            message: format!("missing projected column '{name}'"),
        })?;
    decode_index(row, index)
}

/// Decodes one cell by the driver-reported type, falling back to text.
fn decode_index(row: &AnyRow, index: usize) -> Result<SqlValue> {
    let type_name = row.columns()[index].type_info().name().to_ascii_uppercase();
    let decoded = match type_name.as_str() {
        "NULL" => Some(SqlValue::Null),
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .map(|v| v.map_or(SqlValue::Null, SqlValue::Bool)),
        "TINYINT" | "SMALLINT" | "INT" | "INT2" | "INT4" | "INT8" | "INTEGER" | "BIGINT"
        | "MEDIUMINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .map(|v| v.map_or(SqlValue::Null, SqlValue::Int)),
        "REAL" | "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" | "NUMERIC"
        | "DECIMAL" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .map(|v| v.map_or(SqlValue::Null, SqlValue::Float)),
        _ => None,
    };
    if let Some(value) = decoded {
        return Ok(value);
    }
    // Everything else is carried as text.
    row.try_get::<Option<String>, _>(index)
        .map(|v| v.map_or(SqlValue::Null, SqlValue::Text))
        .map_err(|e| CoreError::Database {
            code: None,
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_set_replaces() {
        let mut record = Record::new();
        record.set("title", FieldValue::Scalar(SqlValue::Text("a".into())));
        record.set("title", FieldValue::Scalar(SqlValue::Text("b".into())));
        assert_eq!(record.len(), 1);
        assert_eq!(record.scalar("title"), Some(&SqlValue::Text("b".into())));
    }

    #[test]
    fn record_preserves_insertion_order() {
        let mut record = Record::new();
        record.set("id", FieldValue::Scalar(SqlValue::Int(1)));
        record.set("title", FieldValue::Scalar(SqlValue::Text("t".into())));
        record.set("views", FieldValue::Scalar(SqlValue::Int(0)));
        let names: Vec<&str> = record.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["id", "title", "views"]);
    }

    #[test]
    fn scalar_accessor_ignores_relations() {
        let mut record = Record::new();
        record.set("author", FieldValue::One(None));
        assert!(record.scalar("author").is_none());
        assert!(matches!(record.get("author"), Some(FieldValue::One(None))));
    }
}
