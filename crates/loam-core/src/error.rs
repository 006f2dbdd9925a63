//! Error taxonomy for the data layer.
//!
//! Every public operation in both loam crates returns a value from this
//! closed set. Engine-specific error codes are carried as auxiliary data
//! on the `Database` variant so callers pattern-match on kinds, never on
//! native codes.

use thiserror::Error;

/// The kind of constraint a write violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// A NOT NULL column received a null value.
    NotNull,
    /// A unique index or constraint was violated.
    Unique,
    /// A foreign key reference could not be satisfied.
    ForeignKey,
}

impl ConstraintKind {
    /// Human-readable name for log output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotNull => "not-null",
            Self::Unique => "unique",
            Self::ForeignKey => "foreign-key",
        }
    }
}

/// Logical schema validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two content types declared the same uid.
    #[error("duplicate content type uid '{0}'")]
    DuplicateUid(String),

    /// Two content types mapped to the same table.
    #[error("table '{table}' is declared by both '{first}' and '{second}'")]
    DuplicateTable {
        /// The colliding table name.
        table: String,
        /// The uid that declared the table first.
        first: String,
        /// The uid that declared it again.
        second: String,
    },

    /// An attribute name appears twice within one content type.
    #[error("content type '{uid}' declares attribute '{attribute}' more than once")]
    DuplicateAttribute {
        /// Content type uid.
        uid: String,
        /// The duplicated attribute name.
        attribute: String,
    },

    /// A relation points at a uid that does not exist in the schema.
    #[error("relation '{attribute}' on '{uid}' targets unknown content type '{target}'")]
    UnknownRelationTarget {
        /// Content type uid owning the relation.
        uid: String,
        /// Relation attribute name.
        attribute: String,
        /// The unresolved target uid.
        target: String,
    },
}

/// Errors produced by the data layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The database engine could not be reached.
    #[error("connection failed: {message}")]
    Connection {
        /// Driver-reported reason.
        message: String,
    },

    /// Waiting for a pooled connection exceeded the configured timeout.
    ///
    /// Transient: callers may retry with backoff. Distinct from a query
    /// execution failure.
    #[error("timed out waiting for a pooled connection")]
    PoolTimeout,

    /// An attribute type has no column mapping on the selected dialect.
    #[error("attribute '{attribute}' has type {ty} which is not supported on {dialect}")]
    UnsupportedType {
        /// Dialect name.
        dialect: &'static str,
        /// Attribute name.
        attribute: String,
        /// The unmappable semantic type.
        ty: String,
    },

    /// The query IR asked for something the builder cannot compile.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The logical schema itself is invalid.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Schema synchronization failed inside a DDL transaction; the
    /// database was rolled back to its pre-sync state.
    #[error("schema synchronization failed: {message}")]
    Sync {
        /// What went wrong.
        message: String,
    },

    /// Schema synchronization failed mid-sequence on a dialect without
    /// transactional DDL. The database is left in the state after the
    /// last completed step; operator intervention is required and the
    /// sequence is never retried automatically.
    #[error(
        "migration failed after {completed} completed step(s); \
         failing step: {failed_step}: {message}"
    )]
    PartialMigration {
        /// Number of steps that were applied successfully.
        completed: usize,
        /// Description of the step that failed.
        failed_step: String,
        /// Driver-reported reason.
        message: String,
    },

    /// A write violated a database constraint. Surfaced to callers as a
    /// validation failure; not retried.
    #[error("{} constraint violated: {message}", kind.as_str())]
    ConstraintViolation {
        /// Which constraint family was violated.
        kind: ConstraintKind,
        /// Driver-reported detail.
        message: String,
    },

    /// Catch-all for translated native errors. The native code is
    /// preserved for diagnosis.
    #[error("database error{}: {message}", code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Database {
        /// Native error code (SQLSTATE, errno, ...) if the driver
        /// reported one.
        code: Option<String>,
        /// Driver-reported message.
        message: String,
    },
}

/// Result type alias for data-layer operations.
pub type Result<T> = std::result::Result<T, CoreError>;
