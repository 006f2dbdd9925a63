//! Pooled connection and transaction management.
//!
//! One [`ConnectionManager`] per database, created at startup and
//! shared by the synchronizer and the executor. Transactions commit on
//! `Ok` and roll back on `Err` on every exit path; nested scopes map
//! to engine savepoints.

use std::future::Future;

use sqlx::any::AnyPoolOptions;
use sqlx::{Acquire, Any, AnyPool, Transaction};
use tracing::info;

use loam_core::dialect::Dialect;
use loam_core::error::{CoreError, Result};

use crate::config::DatabaseConfig;
use crate::translate::translate_db_error;

/// Owns the connection pool for one configured database.
#[derive(Debug)]
pub struct ConnectionManager {
    pool: AnyPool,
    config: DatabaseConfig,
}

impl ConnectionManager {
    /// Connects the pool according to the config.
    ///
    /// # Errors
    ///
    /// `CoreError::Connection` when the engine cannot be reached or
    /// the url is not valid for any installed driver.
    pub async fn connect(config: DatabaseConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| CoreError::Connection {
                message: e.to_string(),
            })?;

        info!(
            dialect = config.dialect.name(),
            max_connections = config.max_connections,
            "database pool ready"
        );

        Ok(Self { pool, config })
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// The configured dialect.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    /// The config this manager was built from.
    #[must_use]
    pub const fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Runs `f` inside a transaction. The closure takes the
    /// transaction by value and hands it back on success; commit
    /// happens here. On `Err` the transaction is dropped inside `f`,
    /// which queues a rollback on the connection.
    ///
    /// Not reentrant: a nested call acquires a second pooled
    /// connection and can starve a small pool. Nested scopes go
    /// through [`ConnectionManager::savepoint`] on the outer
    /// transaction instead.
    ///
    /// # Errors
    ///
    /// `CoreError::PoolTimeout` when no connection becomes available
    /// within the acquire timeout; otherwise whatever `f` or the
    /// commit returns.
    pub async fn with_transaction<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Transaction<'static, Any>) -> Fut,
        Fut: Future<Output = Result<(Transaction<'static, Any>, T)>>,
    {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| translate_db_error(self.config.dialect, e))?;

        let (tx, value) = f(tx).await?;
        tx.commit()
            .await
            .map_err(|e| translate_db_error(self.config.dialect, e))?;
        Ok(value)
    }

    /// Opens a savepoint-backed nested transaction inside `outer`.
    /// Committing or rolling back the returned transaction releases or
    /// rewinds to the savepoint without touching the outer scope.
    ///
    /// # Errors
    ///
    /// Translated driver error if the savepoint cannot be created.
    pub async fn savepoint<'c, 't>(
        &self,
        outer: &'t mut Transaction<'c, Any>,
    ) -> Result<Transaction<'t, Any>> {
        outer
            .begin()
            .await
            .map_err(|e| translate_db_error(self.config.dialect, e))
    }

    /// Closes the pool, waiting for checked-out connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
