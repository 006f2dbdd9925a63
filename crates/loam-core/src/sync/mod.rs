//! Schema synchronization planning.
//!
//! [`diff`] turns a logical/live schema pair into a [`MigrationPlan`];
//! the execution layer applies the plan. Nothing here touches a
//! database.

mod diff;
mod step;

pub use diff::{diff, is_safe_widening, DiffOptions, MigrationPlan, MigrationWarning};
pub use step::{ColumnSpec, ForeignKeySpec, MigrationStep};
