//! PostgreSQL specifics: type spellings, SERIAL primary keys, and
//! SQLSTATE classification.

use crate::error::ConstraintKind;
use crate::sync::ColumnSpec;

use super::{ColumnType, Dialect};

pub(super) fn column_type_sql(ty: &ColumnType) -> String {
    match ty {
        ColumnType::SmallInt => "SMALLINT".to_string(),
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::BigInt => "BIGINT".to_string(),
        ColumnType::Double => "DOUBLE PRECISION".to_string(),
        ColumnType::Varchar(Some(n)) => format!("VARCHAR({n})"),
        ColumnType::Varchar(None) => "VARCHAR".to_string(),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Boolean => "BOOLEAN".to_string(),
        ColumnType::Date => "DATE".to_string(),
        ColumnType::DateTime => "TIMESTAMP".to_string(),
        ColumnType::Json => "JSONB".to_string(),
        ColumnType::Unknown(native) => native.clone(),
    }
}

/// Auto-increment primary keys use SERIAL/BIGSERIAL rather than a
/// keyword.
pub(super) fn primary_key_definition(col: &ColumnSpec) -> String {
    let ty = if col.autoincrement {
        match col.ty {
            ColumnType::SmallInt | ColumnType::Integer => "SERIAL".to_string(),
            ColumnType::BigInt => "BIGSERIAL".to_string(),
            _ => column_type_sql(&col.ty),
        }
    } else {
        column_type_sql(&col.ty)
    };
    format!(
        "{} {ty} PRIMARY KEY",
        Dialect::Postgres.quote_identifier(&col.name)
    )
}

/// Classifies an `information_schema` data type string.
pub(super) fn classify_native_type(native: &str) -> ColumnType {
    let lower = native.to_ascii_lowercase();
    match lower.as_str() {
        "smallint" | "int2" => ColumnType::SmallInt,
        "integer" | "int" | "int4" => ColumnType::Integer,
        "bigint" | "int8" => ColumnType::BigInt,
        "double precision" | "real" | "float8" | "float4" | "numeric" => ColumnType::Double,
        "text" => ColumnType::Text,
        "boolean" | "bool" => ColumnType::Boolean,
        "date" => ColumnType::Date,
        "json" | "jsonb" => ColumnType::Json,
        _ => {
            if lower.starts_with("timestamp") {
                ColumnType::DateTime
            } else if lower.starts_with("character varying") || lower.starts_with("varchar") {
                parse_varchar_length(&lower)
            } else {
                ColumnType::Unknown(native.to_string())
            }
        }
    }
}

fn parse_varchar_length(lower: &str) -> ColumnType {
    let len = lower
        .split('(')
        .nth(1)
        .and_then(|rest| rest.trim_end_matches(')').trim().parse::<u32>().ok());
    ColumnType::Varchar(len)
}

/// SQLSTATE class 23 carries one code per constraint family.
pub(super) fn classify_code(code: &str) -> Option<ConstraintKind> {
    match code {
        "23502" => Some(ConstraintKind::NotNull),
        "23505" => Some(ConstraintKind::Unique),
        "23503" => Some(ConstraintKind::ForeignKey),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_primary_key() {
        let col = ColumnSpec::primary_key("id");
        assert_eq!(primary_key_definition(&col), "\"id\" BIGSERIAL PRIMARY KEY");
    }

    #[test]
    fn type_spellings() {
        assert_eq!(column_type_sql(&ColumnType::Json), "JSONB");
        assert_eq!(column_type_sql(&ColumnType::DateTime), "TIMESTAMP");
        assert_eq!(column_type_sql(&ColumnType::Double), "DOUBLE PRECISION");
        assert_eq!(column_type_sql(&ColumnType::Varchar(Some(120))), "VARCHAR(120)");
    }

    #[test]
    fn classifies_information_schema_types() {
        assert_eq!(
            classify_native_type("character varying(255)"),
            ColumnType::Varchar(Some(255))
        );
        assert_eq!(
            classify_native_type("timestamp without time zone"),
            ColumnType::DateTime
        );
        assert_eq!(classify_native_type("jsonb"), ColumnType::Json);
        assert_eq!(
            classify_native_type("tsvector"),
            ColumnType::Unknown("tsvector".to_string())
        );
    }

    #[test]
    fn sqlstate_classification() {
        assert_eq!(classify_code("23505"), Some(ConstraintKind::Unique));
        assert_eq!(classify_code("23503"), Some(ConstraintKind::ForeignKey));
        assert_eq!(classify_code("23502"), Some(ConstraintKind::NotNull));
        assert_eq!(classify_code("42601"), None);
    }
}
