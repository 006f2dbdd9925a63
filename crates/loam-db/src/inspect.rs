//! Live schema inspection.
//!
//! Reads the engine's catalogs into a [`LiveSchema`]: `information_schema`
//! on Postgres/MySQL, `sqlite_master` plus PRAGMAs on SQLite. Strictly
//! read-only, produced fresh per call. The synchronizer's own
//! bookkeeping table is skipped.

use sqlx::any::AnyRow;
use sqlx::{AnyConnection, AnyPool, Row};

use loam_core::dialect::Dialect;
use loam_core::error::Result;
use loam_core::live::{LiveColumn, LiveForeignKey, LiveIndex, LiveSchema, LiveTable};

use crate::sync::SYNC_HISTORY_TABLE;
use crate::translate::translate_db_error;

/// Inspects the current database into a live schema.
///
/// # Errors
///
/// Translated driver errors; a fully empty database yields an empty
/// schema, not an error.
pub async fn inspect(pool: &AnyPool, dialect: Dialect) -> Result<LiveSchema> {
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| translate_db_error(dialect, e))?;
    match dialect {
        Dialect::Postgres => inspect_postgres(&mut conn).await,
        Dialect::MySql => inspect_mysql(&mut conn).await,
        Dialect::Sqlite => inspect_sqlite(&mut conn).await,
    }
}

async fn fetch_all(
    conn: &mut AnyConnection,
    dialect: Dialect,
    sql: &str,
) -> Result<Vec<AnyRow>> {
    sqlx::query(sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| translate_db_error(dialect, e))
}

fn decode_err(e: sqlx::Error) -> loam_core::error::CoreError {
    loam_core::error::CoreError::Database {
        code: None,
        message: e.to_string(),
    }
}

fn text(row: &AnyRow, name: &str) -> Result<String> {
    row.try_get::<String, _>(name).map_err(decode_err)
}

fn opt_text(row: &AnyRow, name: &str) -> Result<Option<String>> {
    row.try_get::<Option<String>, _>(name).map_err(decode_err)
}

fn integer(row: &AnyRow, name: &str) -> Result<i64> {
    row.try_get::<i64, _>(name).map_err(decode_err)
}

// ---------------------------------------------------------------- postgres

async fn inspect_postgres(conn: &mut AnyConnection) -> Result<LiveSchema> {
    let dialect = Dialect::Postgres;
    let mut live = LiveSchema::new();

    let tables = fetch_all(
        conn,
        dialect,
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
         ORDER BY table_name",
    )
    .await?;
    for row in &tables {
        let name = text(row, "table_name")?;
        if name != SYNC_HISTORY_TABLE {
            live.add_table(LiveTable::new(name));
        }
    }

    let columns = fetch_all(
        conn,
        dialect,
        "SELECT table_name, column_name, data_type, \
                CAST(character_maximum_length AS BIGINT) AS char_len, \
                is_nullable, column_default \
         FROM information_schema.columns \
         WHERE table_schema = current_schema() \
         ORDER BY table_name, ordinal_position",
    )
    .await?;
    for row in &columns {
        let table = text(row, "table_name")?;
        let Some(entry) = live.tables.get_mut(&table) else {
            continue;
        };
        let data_type = text(row, "data_type")?;
        let char_len = row
            .try_get::<Option<i64>, _>("char_len")
            .map_err(|e| translate_db_error(dialect, e))?;
        let native = match char_len {
            Some(len) if data_type.eq_ignore_ascii_case("character varying") => {
                format!("character varying({len})")
            }
            _ => data_type,
        };
        entry.columns.push(LiveColumn {
            name: text(row, "column_name")?,
            ty: dialect.classify_native_type(&native),
            nullable: text(row, "is_nullable")?.eq_ignore_ascii_case("yes"),
            default: opt_text(row, "column_default")?,
        });
    }

    let indexes = fetch_all(
        conn,
        dialect,
        "SELECT t.relname AS table_name, i.relname AS index_name, \
                ix.indisunique AS is_unique, a.attname AS column_name \
         FROM pg_index ix \
         JOIN pg_class i ON i.oid = ix.indexrelid \
         JOIN pg_class t ON t.oid = ix.indrelid \
         JOIN pg_namespace n ON n.oid = t.relnamespace \
         JOIN unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) ON TRUE \
         JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
         WHERE n.nspname = current_schema() AND NOT ix.indisprimary \
         ORDER BY t.relname, i.relname, k.ord",
    )
    .await?;
    for row in &indexes {
        let table = text(row, "table_name")?;
        let Some(entry) = live.tables.get_mut(&table) else {
            continue;
        };
        let index_name = text(row, "index_name")?;
        let unique = row
            .try_get::<bool, _>("is_unique")
            .map_err(|e| translate_db_error(dialect, e))?;
        let column = text(row, "column_name")?;
        push_index_column(entry, index_name, unique, column);
    }

    let fks = fetch_all(
        conn,
        dialect,
        "SELECT tc.table_name, tc.constraint_name, kcu.column_name, \
                ccu.table_name AS foreign_table, ccu.column_name AS foreign_column \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON kcu.constraint_name = tc.constraint_name \
          AND kcu.table_schema = tc.table_schema \
         JOIN information_schema.constraint_column_usage ccu \
           ON ccu.constraint_name = tc.constraint_name \
          AND ccu.table_schema = tc.table_schema \
         WHERE tc.constraint_type = 'FOREIGN KEY' \
           AND tc.table_schema = current_schema() \
         ORDER BY tc.table_name, tc.constraint_name, kcu.ordinal_position",
    )
    .await?;
    for row in &fks {
        let table = text(row, "table_name")?;
        let Some(entry) = live.tables.get_mut(&table) else {
            continue;
        };
        push_foreign_key_column(
            entry,
            Some(text(row, "constraint_name")?),
            text(row, "column_name")?,
            text(row, "foreign_table")?,
            text(row, "foreign_column")?,
        );
    }

    Ok(live)
}

// ------------------------------------------------------------------ mysql

async fn inspect_mysql(conn: &mut AnyConnection) -> Result<LiveSchema> {
    let dialect = Dialect::MySql;
    let mut live = LiveSchema::new();

    let tables = fetch_all(
        conn,
        dialect,
        "SELECT TABLE_NAME AS table_name FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
         ORDER BY TABLE_NAME",
    )
    .await?;
    for row in &tables {
        let name = text(row, "table_name")?;
        if name != SYNC_HISTORY_TABLE {
            live.add_table(LiveTable::new(name));
        }
    }

    let columns = fetch_all(
        conn,
        dialect,
        "SELECT TABLE_NAME AS table_name, COLUMN_NAME AS column_name, \
                DATA_TYPE AS data_type, COLUMN_TYPE AS column_type, \
                IS_NULLABLE AS is_nullable, COLUMN_DEFAULT AS column_default \
         FROM information_schema.columns \
         WHERE table_schema = DATABASE() \
         ORDER BY TABLE_NAME, ORDINAL_POSITION",
    )
    .await?;
    for row in &columns {
        let table = text(row, "table_name")?;
        let Some(entry) = live.tables.get_mut(&table) else {
            continue;
        };
        let data_type = text(row, "data_type")?;
        // COLUMN_TYPE carries the length for varchar and the (1) that
        // marks tinyint-as-boolean; DATA_TYPE is cleaner for the rest.
        let column_type = text(row, "column_type")?;
        let native = if data_type.eq_ignore_ascii_case("varchar")
            || data_type.eq_ignore_ascii_case("tinyint")
        {
            column_type
        } else {
            data_type
        };
        entry.columns.push(LiveColumn {
            name: text(row, "column_name")?,
            ty: dialect.classify_native_type(&native),
            nullable: text(row, "is_nullable")?.eq_ignore_ascii_case("yes"),
            default: opt_text(row, "column_default")?,
        });
    }

    let indexes = fetch_all(
        conn,
        dialect,
        "SELECT TABLE_NAME AS table_name, INDEX_NAME AS index_name, \
                NON_UNIQUE AS non_unique, COLUMN_NAME AS column_name \
         FROM information_schema.statistics \
         WHERE table_schema = DATABASE() AND INDEX_NAME <> 'PRIMARY' \
         ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX",
    )
    .await?;
    for row in &indexes {
        let table = text(row, "table_name")?;
        let Some(entry) = live.tables.get_mut(&table) else {
            continue;
        };
        let index_name = text(row, "index_name")?;
        let unique = integer(row, "non_unique")? == 0;
        let column = text(row, "column_name")?;
        push_index_column(entry, index_name, unique, column);
    }

    let fks = fetch_all(
        conn,
        dialect,
        "SELECT TABLE_NAME AS table_name, CONSTRAINT_NAME AS constraint_name, \
                COLUMN_NAME AS column_name, \
                REFERENCED_TABLE_NAME AS foreign_table, \
                REFERENCED_COLUMN_NAME AS foreign_column \
         FROM information_schema.key_column_usage \
         WHERE table_schema = DATABASE() AND REFERENCED_TABLE_NAME IS NOT NULL \
         ORDER BY TABLE_NAME, CONSTRAINT_NAME, ORDINAL_POSITION",
    )
    .await?;
    for row in &fks {
        let table = text(row, "table_name")?;
        let Some(entry) = live.tables.get_mut(&table) else {
            continue;
        };
        push_foreign_key_column(
            entry,
            Some(text(row, "constraint_name")?),
            text(row, "column_name")?,
            text(row, "foreign_table")?,
            text(row, "foreign_column")?,
        );
    }

    Ok(live)
}

// ----------------------------------------------------------------- sqlite

async fn inspect_sqlite(conn: &mut AnyConnection) -> Result<LiveSchema> {
    let dialect = Dialect::Sqlite;
    let mut live = LiveSchema::new();

    let tables = fetch_all(
        conn,
        dialect,
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name",
    )
    .await?;

    for row in &tables {
        let table = text(row, "name")?;
        if table == SYNC_HISTORY_TABLE {
            continue;
        }
        let mut entry = LiveTable::new(table.clone());
        let quoted = dialect.quote_identifier(&table);

        let columns = fetch_all(conn, dialect, &format!("PRAGMA table_info({quoted})")).await?;
        for col in &columns {
            entry.columns.push(LiveColumn {
                name: text(col, "name")?,
                ty: dialect.classify_native_type(&text(col, "type")?),
                nullable: integer(col, "notnull")? == 0 && integer(col, "pk")? == 0,
                default: opt_text(col, "dflt_value")?,
            });
        }

        let indexes = fetch_all(conn, dialect, &format!("PRAGMA index_list({quoted})")).await?;
        for idx in &indexes {
            let index_name = text(idx, "name")?;
            // Implicit indexes backing inline constraints.
            if index_name.starts_with("sqlite_autoindex") {
                continue;
            }
            let unique = integer(idx, "unique")? == 1;
            let quoted_index = dialect.quote_identifier(&index_name);
            let info =
                fetch_all(conn, dialect, &format!("PRAGMA index_info({quoted_index})")).await?;
            let mut index_columns = Vec::with_capacity(info.len());
            for entry_row in &info {
                index_columns.push(text(entry_row, "name")?);
            }
            entry.indexes.push(LiveIndex {
                name: index_name,
                columns: index_columns,
                unique,
            });
        }

        let fks =
            fetch_all(conn, dialect, &format!("PRAGMA foreign_key_list({quoted})")).await?;
        // Rows of one composite FK share an `id`; SQLite reports no
        // constraint names.
        let mut grouped: std::collections::BTreeMap<i64, LiveForeignKey> =
            std::collections::BTreeMap::new();
        for fk in &fks {
            let id = integer(fk, "id")?;
            // `to` is NULL when the FK references the implicit pk.
            let referenced_column = opt_text(fk, "to")?.unwrap_or_else(|| "id".to_string());
            let slot = grouped.entry(id).or_insert_with(|| LiveForeignKey {
                name: None,
                columns: Vec::new(),
                references_table: String::new(),
                references_columns: Vec::new(),
            });
            slot.references_table = text(fk, "table")?;
            slot.columns.push(text(fk, "from")?);
            slot.references_columns.push(referenced_column);
        }
        entry.foreign_keys.extend(grouped.into_values());

        live.add_table(entry);
    }

    Ok(live)
}

// ---------------------------------------------------------------- helpers

/// Appends one (index, column) pair, growing the multi-column index in
/// place when the name repeats.
fn push_index_column(table: &mut LiveTable, index_name: String, unique: bool, column: String) {
    if let Some(existing) = table.indexes.iter_mut().find(|i| i.name == index_name) {
        existing.columns.push(column);
    } else {
        table.indexes.push(LiveIndex {
            name: index_name,
            columns: vec![column],
            unique,
        });
    }
}

/// Appends one (constraint, column) pair, grouping by constraint name
/// where the engine reports one and by endpoint table otherwise.
fn push_foreign_key_column(
    table: &mut LiveTable,
    name: Option<String>,
    column: String,
    references_table: String,
    references_column: String,
) {
    let existing = table.foreign_keys.iter_mut().find(|fk| match (&fk.name, &name) {
        (Some(a), Some(b)) => a == b,
        _ => fk.references_table == references_table,
    });
    if let Some(fk) = existing {
        fk.columns.push(column);
        fk.references_columns.push(references_column);
    } else {
        table.foreign_keys.push(LiveForeignKey {
            name,
            columns: vec![column],
            references_table,
            references_columns: vec![references_column],
        });
    }
}
