//! Filter predicate tree.
//!
//! Predicates reference attributes by name; resolution to physical
//! columns happens at compile time. Operand values are carried as
//! [`SqlValue`]s and always become positional parameters.

use crate::value::{SqlValue, ToSqlValue};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// SQL LIKE with the engine's default collation.
    Like,
    /// Case-insensitive LIKE. Compiles to native `ILIKE` on engines
    /// that have it and to `LOWER(col) LIKE LOWER(?)` elsewhere, so
    /// the same filter behaves identically everywhere.
    ILike,
}

impl CompareOp {
    /// The SQL operator token (`ILike` is handled separately by the
    /// compiler).
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like | Self::ILike => "LIKE",
        }
    }
}

/// A filter condition over one content type's attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// All children must hold. Empty conjunction is always true.
    And(Vec<Predicate>),
    /// Any child must hold. Empty disjunction is always false.
    Or(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
    /// Binary comparison against a scalar operand.
    Compare {
        /// Attribute name.
        attribute: String,
        /// Operator.
        op: CompareOp,
        /// Operand; bound as a parameter.
        value: SqlValue,
    },
    /// Membership in a value set. An empty set is always false.
    In {
        /// Attribute name.
        attribute: String,
        /// Operands; each bound as a parameter.
        values: Vec<SqlValue>,
    },
    /// NULL check.
    IsNull {
        /// Attribute name.
        attribute: String,
        /// When set, compiles to IS NOT NULL.
        negated: bool,
    },
}

impl Predicate {
    fn compare(attribute: impl Into<String>, op: CompareOp, value: impl ToSqlValue) -> Self {
        Self::Compare {
            attribute: attribute.into(),
            op,
            value: value.to_sql_value(),
        }
    }

    /// `attribute = value`
    #[must_use]
    pub fn eq(attribute: impl Into<String>, value: impl ToSqlValue) -> Self {
        Self::compare(attribute, CompareOp::Eq, value)
    }

    /// `attribute <> value`
    #[must_use]
    pub fn ne(attribute: impl Into<String>, value: impl ToSqlValue) -> Self {
        Self::compare(attribute, CompareOp::Ne, value)
    }

    /// `attribute < value`
    #[must_use]
    pub fn lt(attribute: impl Into<String>, value: impl ToSqlValue) -> Self {
        Self::compare(attribute, CompareOp::Lt, value)
    }

    /// `attribute <= value`
    #[must_use]
    pub fn lte(attribute: impl Into<String>, value: impl ToSqlValue) -> Self {
        Self::compare(attribute, CompareOp::Lte, value)
    }

    /// `attribute > value`
    #[must_use]
    pub fn gt(attribute: impl Into<String>, value: impl ToSqlValue) -> Self {
        Self::compare(attribute, CompareOp::Gt, value)
    }

    /// `attribute >= value`
    #[must_use]
    pub fn gte(attribute: impl Into<String>, value: impl ToSqlValue) -> Self {
        Self::compare(attribute, CompareOp::Gte, value)
    }

    /// `attribute LIKE pattern`
    #[must_use]
    pub fn like(attribute: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(attribute, CompareOp::Like, pattern.into())
    }

    /// Case-insensitive LIKE.
    #[must_use]
    pub fn ilike(attribute: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(attribute, CompareOp::ILike, pattern.into())
    }

    /// `attribute IN (values...)`
    #[must_use]
    pub fn in_values<V: ToSqlValue>(
        attribute: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            attribute: attribute.into(),
            values: values.into_iter().map(ToSqlValue::to_sql_value).collect(),
        }
    }

    /// `attribute IS NULL`
    #[must_use]
    pub fn is_null(attribute: impl Into<String>) -> Self {
        Self::IsNull {
            attribute: attribute.into(),
            negated: false,
        }
    }

    /// `attribute IS NOT NULL`
    #[must_use]
    pub fn is_not_null(attribute: impl Into<String>) -> Self {
        Self::IsNull {
            attribute: attribute.into(),
            negated: true,
        }
    }

    /// Conjunction with another predicate. Flattens nested `And`s.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And(mut children) => {
                children.push(other);
                Self::And(children)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Disjunction with another predicate. Flattens nested `Or`s.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut children) => {
                children.push(other);
                Self::Or(children)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Negation.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_carry_operands_as_values() {
        let p = Predicate::eq("title", "hello");
        assert!(matches!(
            p,
            Predicate::Compare {
                op: CompareOp::Eq,
                value: SqlValue::Text(_),
                ..
            }
        ));
    }

    #[test]
    fn and_flattens() {
        let p = Predicate::eq("a", 1_i64)
            .and(Predicate::eq("b", 2_i64))
            .and(Predicate::eq("c", 3_i64));
        assert!(matches!(p, Predicate::And(children) if children.len() == 3));
    }

    #[test]
    fn or_flattens() {
        let p = Predicate::eq("a", 1_i64)
            .or(Predicate::eq("b", 2_i64))
            .or(Predicate::eq("c", 3_i64));
        assert!(matches!(p, Predicate::Or(children) if children.len() == 3));
    }

    #[test]
    fn in_values_converts() {
        let p = Predicate::in_values("id", [1_i64, 2, 3]);
        assert!(matches!(p, Predicate::In { values, .. } if values.len() == 3));
    }
}
