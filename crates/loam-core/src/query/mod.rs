//! Query construction.
//!
//! A fluent builder produces an immutable [`Query`] IR; the compiler
//! turns it into dialect-native SQL with positional parameters. The
//! execution layer binds and runs the result.

mod builder;
mod compile;
mod expr;

pub use builder::{Order, OrderBy, Query, QueryKind};
pub use compile::{plan_joins, CompiledQuery, JoinPlan};
pub use expr::{CompareOp, Predicate};
