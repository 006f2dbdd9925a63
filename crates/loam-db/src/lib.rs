//! Stateful half of the loam data layer.
//!
//! Owns everything that touches a live database: the pooled
//! [`ConnectionManager`], the live-schema inspector, the
//! [`Synchronizer`] that applies diffed migration plans, and the
//! [`QueryExecutor`] that runs compiled queries and assembles records.
//! All driver errors are translated into the `loam-core` taxonomy at
//! this crate's boundary.
//!
//! Typical startup:
//!
//! ```no_run
//! use loam_core::dialect::Dialect;
//! use loam_core::schema::LogicalSchema;
//! use loam_db::{ConnectionManager, DatabaseConfig, Synchronizer};
//!
//! # async fn start(schema: LogicalSchema) -> loam_core::error::Result<()> {
//! let config = DatabaseConfig::new(Dialect::Sqlite, "sqlite:app.db");
//! let manager = ConnectionManager::connect(config).await?;
//! Synchronizer::new(&manager).sync(&schema).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod inspect;
pub mod manager;
pub mod sync;
pub mod translate;

pub use config::DatabaseConfig;
pub use executor::{FieldValue, QueryExecutor, Record};
pub use inspect::inspect;
pub use manager::ConnectionManager;
pub use sync::{Synchronizer, SYNC_HISTORY_TABLE};
pub use translate::translate_db_error;
