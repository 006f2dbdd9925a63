//! SQLite specifics.
//!
//! SQLite has a reduced type system (storage classes), no in-place
//! column type changes, and no ALTER form for constraints; foreign keys
//! are declared inline at CREATE TABLE time. `normalize` collapses
//! resolved types to what a round-trip through PRAGMA inspection will
//! report, keeping the differ idempotent.

use crate::error::ConstraintKind;
use crate::sync::ColumnSpec;

use super::{ColumnType, Dialect};

pub(super) fn column_type_sql(ty: &ColumnType) -> String {
    match normalize(ty) {
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::Double => "REAL".to_string(),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Unknown(native) => native,
        // normalize only produces the variants above.
        other => other.to_string().to_ascii_uppercase(),
    }
}

/// Collapses to SQLite storage classes: all integers (and booleans)
/// become INTEGER, floats REAL, everything stringly TEXT.
pub(super) fn normalize(ty: &ColumnType) -> ColumnType {
    match ty {
        ColumnType::SmallInt
        | ColumnType::Integer
        | ColumnType::BigInt
        | ColumnType::Boolean => ColumnType::Integer,
        ColumnType::Double => ColumnType::Double,
        ColumnType::Varchar(_)
        | ColumnType::Text
        | ColumnType::Date
        | ColumnType::DateTime
        | ColumnType::Json => ColumnType::Text,
        ColumnType::Unknown(native) => ColumnType::Unknown(native.clone()),
    }
}

/// AUTOINCREMENT requires the exact `INTEGER PRIMARY KEY` spelling.
pub(super) fn primary_key_definition(col: &ColumnSpec) -> String {
    format!(
        "{} INTEGER PRIMARY KEY{}",
        Dialect::Sqlite.quote_identifier(&col.name),
        if col.autoincrement { " AUTOINCREMENT" } else { "" }
    )
}

/// Classifies a declared type from `PRAGMA table_info`.
pub(super) fn classify_native_type(native: &str) -> ColumnType {
    let lower = native.to_ascii_lowercase();
    if lower.contains("int") {
        ColumnType::Integer
    } else if lower.contains("char") || lower.contains("clob") || lower.contains("text") {
        ColumnType::Text
    } else if lower.contains("real") || lower.contains("floa") || lower.contains("doub") {
        ColumnType::Double
    } else if lower.is_empty() {
        ColumnType::Unknown(String::new())
    } else {
        ColumnType::Unknown(native.to_string())
    }
}

/// SQLite extended result codes.
pub(super) fn classify_code(code: &str, message: &str) -> Option<ConstraintKind> {
    match code {
        "1299" => Some(ConstraintKind::NotNull),
        "2067" | "1555" => Some(ConstraintKind::Unique),
        "787" => Some(ConstraintKind::ForeignKey),
        // Primary result code 19 (SQLITE_CONSTRAINT) without the
        // extended part; fall back to the message.
        "19" => {
            let lower = message.to_ascii_lowercase();
            if lower.contains("unique") {
                Some(ConstraintKind::Unique)
            } else if lower.contains("not null") {
                Some(ConstraintKind::NotNull)
            } else if lower.contains("foreign key") {
                Some(ConstraintKind::ForeignKey)
            } else {
                None
            }
        }
        _ => None,
    }
}
