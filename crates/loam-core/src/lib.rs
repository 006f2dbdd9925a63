//! Driver-agnostic core of the loam data layer.
//!
//! Everything in this crate is pure: the logical content-type schema,
//! the dialect drivers (SQL generation, capability table, native error
//! classification), the live-schema model, the schema differ, and the
//! query builder/compiler. No I/O happens here; the `loam-db` crate
//! owns pools, inspection, and execution.
//!
//! ```
//! use loam_core::dialect::Dialect;
//! use loam_core::query::{Predicate, Query};
//! use loam_core::schema::{AttributeDefinition, ContentTypeDefinition, LogicalSchema};
//!
//! let schema = LogicalSchema::from_definitions(vec![
//!     ContentTypeDefinition::new("api::article.article", "articles")
//!         .attribute(AttributeDefinition::string("title").not_null().unique()),
//! ])?;
//!
//! let compiled = Query::select("api::article.article")
//!     .filter(Predicate::eq("title", "hello"))
//!     .compile(&schema, Dialect::Postgres)?;
//! assert!(compiled.sql.starts_with("SELECT"));
//! # Ok::<(), loam_core::error::CoreError>(())
//! ```

pub mod dialect;
pub mod error;
pub mod live;
pub mod query;
pub mod schema;
pub mod sync;
pub mod value;

pub use dialect::{ColumnType, Dialect};
pub use error::{ConstraintKind, CoreError, Result, SchemaError};
pub use query::{CompiledQuery, Predicate, Query};
pub use schema::{AttributeDefinition, ContentTypeDefinition, LogicalSchema};
pub use sync::{diff, DiffOptions, MigrationPlan, MigrationStep};
pub use value::{SqlValue, ToSqlValue};
