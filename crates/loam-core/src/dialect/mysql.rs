//! MySQL specifics: type spellings, AUTO_INCREMENT keys, and error
//! classification.
//!
//! MySQL reports SQLSTATE 23000 for every integrity violation, so
//! classification falls back to the server's message text to tell the
//! constraint families apart.

use crate::error::ConstraintKind;
use crate::sync::ColumnSpec;

use super::{ColumnType, Dialect};

pub(super) fn column_type_sql(ty: &ColumnType) -> String {
    match ty {
        ColumnType::SmallInt => "SMALLINT".to_string(),
        ColumnType::Integer => "INT".to_string(),
        ColumnType::BigInt => "BIGINT".to_string(),
        ColumnType::Double => "DOUBLE".to_string(),
        ColumnType::Varchar(Some(n)) => format!("VARCHAR({n})"),
        // MySQL requires a length on VARCHAR.
        ColumnType::Varchar(None) => "VARCHAR(255)".to_string(),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Boolean => "BOOLEAN".to_string(),
        ColumnType::Date => "DATE".to_string(),
        ColumnType::DateTime => "DATETIME".to_string(),
        ColumnType::Json => "JSON".to_string(),
        ColumnType::Unknown(native) => native.clone(),
    }
}

pub(super) fn primary_key_definition(col: &ColumnSpec) -> String {
    format!(
        "{} {}{} PRIMARY KEY",
        Dialect::MySql.quote_identifier(&col.name),
        column_type_sql(&col.ty),
        if col.autoincrement {
            " NOT NULL AUTO_INCREMENT"
        } else {
            " NOT NULL"
        }
    )
}

/// Classifies an `information_schema` DATA_TYPE value.
pub(super) fn classify_native_type(native: &str) -> ColumnType {
    let lower = native.to_ascii_lowercase();
    match lower.as_str() {
        // BOOLEAN is stored as tinyint(1); this layer never emits a
        // plain tinyint for anything else.
        "tinyint" | "tinyint(1)" => ColumnType::Boolean,
        "smallint" => ColumnType::SmallInt,
        "int" | "integer" | "mediumint" => ColumnType::Integer,
        "bigint" => ColumnType::BigInt,
        "double" | "float" | "decimal" => ColumnType::Double,
        "text" | "mediumtext" | "longtext" | "tinytext" => ColumnType::Text,
        "date" => ColumnType::Date,
        "datetime" | "timestamp" => ColumnType::DateTime,
        "json" => ColumnType::Json,
        _ => {
            if lower.starts_with("varchar") {
                let len = lower
                    .split('(')
                    .nth(1)
                    .and_then(|rest| rest.trim_end_matches(')').trim().parse::<u32>().ok());
                ColumnType::Varchar(len)
            } else {
                ColumnType::Unknown(native.to_string())
            }
        }
    }
}

pub(super) fn classify_code(code: &str, message: &str) -> Option<ConstraintKind> {
    // sqlx surfaces the SQLSTATE; the MySQL errno is only in the text.
    if code != "23000" && code != "HY000" {
        return None;
    }
    let lower = message.to_ascii_lowercase();
    if lower.contains("duplicate entry") {
        Some(ConstraintKind::Unique)
    } else if lower.contains("foreign key constraint") {
        Some(ConstraintKind::ForeignKey)
    } else if lower.contains("cannot be null") || lower.contains("doesn't have a default value") {
        Some(ConstraintKind::NotNull)
    } else {
        None
    }
}
