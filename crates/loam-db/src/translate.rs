//! sqlx error translation.
//!
//! Every sqlx error leaving this crate passes through here so callers
//! only ever see the [`CoreError`] taxonomy. Constraint violations are
//! classified through the dialect's native code tables; anything
//! unrecognized keeps its native code on the `Database` catch-all.

use loam_core::dialect::Dialect;
use loam_core::error::CoreError;

/// Translates a sqlx error for the given dialect.
pub fn translate_db_error(dialect: Dialect, err: sqlx::Error) -> CoreError {
    match err {
        sqlx::Error::PoolTimedOut => CoreError::PoolTimeout,
        sqlx::Error::PoolClosed => CoreError::Connection {
            message: "connection pool is closed".to_string(),
        },
        sqlx::Error::Io(io) => CoreError::Connection {
            message: io.to_string(),
        },
        sqlx::Error::Tls(tls) => CoreError::Connection {
            message: tls.to_string(),
        },
        sqlx::Error::Protocol(message) => CoreError::Connection { message },
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.to_string());
            let message = db.message().to_string();
            if let Some(kind) = code
                .as_deref()
                .and_then(|c| dialect.classify_code(c, &message))
            {
                CoreError::ConstraintViolation { kind, message }
            } else {
                CoreError::Database { code, message }
            }
        }
        other => CoreError::Database {
            code: None,
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_distinct() {
        let err = translate_db_error(Dialect::Sqlite, sqlx::Error::PoolTimedOut);
        assert!(matches!(err, CoreError::PoolTimeout));
    }

    #[test]
    fn io_errors_become_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = translate_db_error(Dialect::Postgres, sqlx::Error::Io(io));
        assert!(matches!(err, CoreError::Connection { .. }));
    }

    #[test]
    fn row_not_found_falls_through() {
        let err = translate_db_error(Dialect::Postgres, sqlx::Error::RowNotFound);
        assert!(matches!(err, CoreError::Database { code: None, .. }));
    }
}
