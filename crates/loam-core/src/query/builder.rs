//! Fluent query builder.
//!
//! The builder is owner-consuming: each method takes and returns `self`,
//! producing an immutable [`Query`] value that the compiler and the
//! execution layer both read. Attributes are referenced by their
//! logical names; nothing here knows about physical columns.

use crate::value::{SqlValue, ToSqlValue};

use super::expr::Predicate;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl Order {
    /// SQL keyword.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Attribute name.
    pub attribute: String,
    /// Direction.
    pub order: Order,
}

/// Statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// SELECT.
    Select,
    /// INSERT of one row.
    Insert,
    /// UPDATE of all rows matching the filter.
    Update,
    /// DELETE of all rows matching the filter.
    Delete,
}

/// An immutable query over one content type.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Statement kind.
    pub kind: QueryKind,
    /// Content type uid this query targets.
    pub content_type: String,
    /// Projection restricted to these attributes; empty selects every
    /// scalar attribute. The primary key is always projected.
    pub columns: Vec<String>,
    /// Filter, if any.
    pub filter: Option<Predicate>,
    /// Relation attributes to join and project, in declaration order.
    pub joins: Vec<String>,
    /// Sort keys in priority order.
    pub order_by: Vec<OrderBy>,
    /// Row limit.
    pub limit: Option<u64>,
    /// Row offset.
    pub offset: Option<u64>,
    /// Assignments for INSERT/UPDATE, in declaration order.
    pub values: Vec<(String, SqlValue)>,
}

impl Query {
    fn new(kind: QueryKind, content_type: impl Into<String>) -> Self {
        Self {
            kind,
            content_type: content_type.into(),
            columns: Vec::new(),
            filter: None,
            joins: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            values: Vec::new(),
        }
    }

    /// Starts a SELECT over the given content type.
    #[must_use]
    pub fn select(content_type: impl Into<String>) -> Self {
        Self::new(QueryKind::Select, content_type)
    }

    /// Starts an INSERT into the given content type.
    #[must_use]
    pub fn insert(content_type: impl Into<String>) -> Self {
        Self::new(QueryKind::Insert, content_type)
    }

    /// Starts an UPDATE of the given content type.
    #[must_use]
    pub fn update(content_type: impl Into<String>) -> Self {
        Self::new(QueryKind::Update, content_type)
    }

    /// Starts a DELETE from the given content type.
    #[must_use]
    pub fn delete(content_type: impl Into<String>) -> Self {
        Self::new(QueryKind::Delete, content_type)
    }

    /// Restricts the projection to the given attribute.
    #[must_use]
    pub fn column(mut self, attribute: impl Into<String>) -> Self {
        self.columns.push(attribute.into());
        self
    }

    /// Sets the filter. Chained calls AND the predicates together.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Joins a relation attribute, projecting the related record(s).
    #[must_use]
    pub fn join(mut self, relation: impl Into<String>) -> Self {
        self.joins.push(relation.into());
        self
    }

    /// Adds a sort key.
    #[must_use]
    pub fn order_by(mut self, attribute: impl Into<String>, order: Order) -> Self {
        self.order_by.push(OrderBy {
            attribute: attribute.into(),
            order,
        });
        self
    }

    /// Limits the number of rows.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` rows.
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Adds an assignment (INSERT/UPDATE only; ignored by the compiler
    /// for reads).
    #[must_use]
    pub fn value(mut self, attribute: impl Into<String>, value: impl ToSqlValue) -> Self {
        self.values.push((attribute.into(), value.to_sql_value()));
        self
    }
}
