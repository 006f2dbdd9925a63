//! Schema synchronization execution.
//!
//! Inspects the live schema, diffs it against the declared one, and
//! applies the resulting plan. Startup-time and single-flight: an
//! in-process mutex serializes concurrent calls, and the database is
//! only ever mutated here.

use chrono::Utc;
use sqlx::AnyConnection;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use loam_core::dialect::Dialect;
use loam_core::error::{CoreError, Result};
use loam_core::schema::LogicalSchema;
use loam_core::sync::{diff, DiffOptions, MigrationPlan, MigrationStep};

use crate::manager::ConnectionManager;
use crate::translate::translate_db_error;

/// Bookkeeping table recording completed synchronization runs. The
/// inspector skips it; it never takes part in diffing.
pub const SYNC_HISTORY_TABLE: &str = "loam_sync_history";

/// Applies schema changes for one database.
pub struct Synchronizer<'a> {
    manager: &'a ConnectionManager,
    options: DiffOptions,
    guard: Mutex<()>,
}

impl<'a> Synchronizer<'a> {
    /// Creates a synchronizer; the destructive-migration policy comes
    /// from the manager's config.
    #[must_use]
    pub fn new(manager: &'a ConnectionManager) -> Self {
        Self {
            manager,
            options: DiffOptions {
                allow_destructive: manager.config().allow_destructive_migrations,
            },
            guard: Mutex::new(()),
        }
    }

    /// Brings the database in line with the declared schema and
    /// returns the plan that was applied.
    ///
    /// On dialects with transactional DDL the whole plan applies in
    /// one transaction and a failure rolls everything back
    /// (`CoreError::Sync`). Elsewhere steps apply sequentially and a
    /// mid-sequence failure surfaces as `CoreError::PartialMigration`
    /// naming the last completed step; the sequence is never retried
    /// automatically.
    ///
    /// # Errors
    ///
    /// `Schema` for an invalid logical schema, `Sync`/`PartialMigration`
    /// for apply failures, translated driver errors otherwise.
    pub async fn sync(&self, schema: &LogicalSchema) -> Result<MigrationPlan> {
        let _held = self.guard.lock().await;
        let dialect = self.manager.dialect();

        schema.validate()?;
        self.ensure_history_table().await?;

        let live = crate::inspect::inspect(self.manager.pool(), dialect).await?;
        let plan = diff(schema, &live, dialect, &self.options)?;

        for warning in &plan.warnings {
            warn!(dialect = dialect.name(), "{warning}");
        }

        if plan.steps.is_empty() {
            info!(dialect = dialect.name(), "schema is up to date");
            return Ok(plan);
        }

        info!(
            dialect = dialect.name(),
            steps = plan.steps.len(),
            "applying schema changes"
        );

        if dialect.supports_transactional_ddl() {
            self.apply_transactional(dialect, &plan.steps).await?;
        } else {
            self.apply_sequential(dialect, &plan.steps).await?;
        }

        self.record_run(&plan).await?;
        info!(dialect = dialect.name(), "schema synchronized");
        Ok(plan)
    }

    async fn apply_transactional(&self, dialect: Dialect, steps: &[MigrationStep]) -> Result<()> {
        self.manager
            .with_transaction(|mut tx| async move {
                for step in steps {
                    apply_step(&mut tx, dialect, step).await?;
                }
                Ok((tx, ()))
            })
            .await
            .map_err(|e| match e {
                CoreError::PoolTimeout => CoreError::PoolTimeout,
                other => CoreError::Sync {
                    message: other.to_string(),
                },
            })
    }

    async fn apply_sequential(&self, dialect: Dialect, steps: &[MigrationStep]) -> Result<()> {
        let mut conn = self
            .manager
            .pool()
            .acquire()
            .await
            .map_err(|e| translate_db_error(dialect, e))?;
        for (completed, step) in steps.iter().enumerate() {
            if let Err(e) = apply_step(&mut conn, dialect, step).await {
                return Err(CoreError::PartialMigration {
                    completed,
                    failed_step: step.describe(),
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn ensure_history_table(&self) -> Result<()> {
        let dialect = self.manager.dialect();
        let ddl = match dialect {
            Dialect::Postgres => format!(
                "CREATE TABLE IF NOT EXISTS \"{SYNC_HISTORY_TABLE}\" (\
                 \"id\" BIGSERIAL PRIMARY KEY, \
                 \"applied_at\" VARCHAR(64) NOT NULL, \
                 \"steps\" INTEGER NOT NULL)"
            ),
            Dialect::MySql => format!(
                "CREATE TABLE IF NOT EXISTS `{SYNC_HISTORY_TABLE}` (\
                 `id` BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY, \
                 `applied_at` VARCHAR(64) NOT NULL, \
                 `steps` INT NOT NULL)"
            ),
            Dialect::Sqlite => format!(
                "CREATE TABLE IF NOT EXISTS \"{SYNC_HISTORY_TABLE}\" (\
                 \"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \
                 \"applied_at\" TEXT NOT NULL, \
                 \"steps\" INTEGER NOT NULL)"
            ),
        };
        sqlx::query(&ddl)
            .execute(self.manager.pool())
            .await
            .map_err(|e| translate_db_error(dialect, e))?;
        Ok(())
    }

    async fn record_run(&self, plan: &MigrationPlan) -> Result<()> {
        let dialect = self.manager.dialect();
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES ({}, {})",
            dialect.quote_identifier(SYNC_HISTORY_TABLE),
            dialect.quote_identifier("applied_at"),
            dialect.quote_identifier("steps"),
            dialect.placeholder(1),
            dialect.placeholder(2),
        );
        let applied_at = Utc::now().format("%Y-%m-%dT%H:%M:%S%.fZ").to_string();
        #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
        let steps = plan.steps.len() as i64;
        sqlx::query(&sql)
            .bind(applied_at)
            .bind(steps)
            .execute(self.manager.pool())
            .await
            .map_err(|e| translate_db_error(dialect, e))?;
        Ok(())
    }
}

async fn apply_step(
    conn: &mut AnyConnection,
    dialect: Dialect,
    step: &MigrationStep,
) -> Result<()> {
    let sql = dialect.ddl(step)?;
    debug!(sql = %sql, "executing DDL");
    sqlx::query(&sql)
        .execute(&mut *conn)
        .await
        .map_err(|e| translate_db_error(dialect, e))?;
    info!(step = %step.describe(), "applied");
    Ok(())
}
