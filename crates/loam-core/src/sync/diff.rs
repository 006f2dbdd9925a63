//! Schema differ.
//!
//! Compares the declared [`LogicalSchema`] against an inspected
//! [`LiveSchema`] and produces an ordered [`MigrationPlan`]. The plan is
//! deterministic (BTree iteration order) and idempotent: applying it and
//! diffing again yields an empty plan.
//!
//! Destructive changes are policy-gated: column drops are only emitted
//! when [`DiffOptions::allow_destructive`] is set, and ambiguous type
//! changes are reported as warnings instead of guessed at.

use std::collections::BTreeSet;

use crate::dialect::{ColumnType, Dialect};
use crate::error::Result;
use crate::live::{LiveSchema, LiveTable};
use crate::schema::{ContentTypeDefinition, JoinStrategy, LogicalSchema};

use super::step::{ColumnSpec, ForeignKeySpec, MigrationStep};

/// Policy knobs for the differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Allow steps that discard data (column drops). When unset such
    /// changes become warnings and zero steps.
    pub allow_destructive: bool,
}

/// A change the differ detected but will not apply automatically.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationWarning {
    /// A live column has no logical counterpart and destructive
    /// migrations are disabled.
    SkippedDrop {
        /// Table name.
        table: String,
        /// The column that would be dropped.
        column: String,
    },
    /// A column's type changed in a way that has no safe automatic
    /// conversion (narrowing, cross-family, or unclassifiable type).
    ManualTypeChange {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Live type.
        from: ColumnType,
        /// Declared type.
        to: ColumnType,
    },
    /// A foreign key is missing on a dialect that cannot add
    /// constraints to an existing table.
    ManualForeignKey {
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },
}

impl std::fmt::Display for MigrationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SkippedDrop { table, column } => write!(
                f,
                "column {table}.{column} exists in the database but not in the schema; \
                 not dropped (destructive migrations disabled)"
            ),
            Self::ManualTypeChange {
                table,
                column,
                from,
                to,
            } => write!(
                f,
                "column {table}.{column} is {from} but the schema declares {to}; \
                 no safe automatic conversion, manual intervention required"
            ),
            Self::ManualForeignKey { table, name } => write!(
                f,
                "foreign key {name} is missing on {table} but this engine cannot \
                 add constraints to an existing table"
            ),
        }
    }
}

/// The ordered result of a diff.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationPlan {
    /// Steps in execution order.
    pub steps: Vec<MigrationStep>,
    /// Changes detected but not translated into steps.
    pub warnings: Vec<MigrationWarning>,
}

impl MigrationPlan {
    /// `true` when there is nothing to apply and nothing to report.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.warnings.is_empty()
    }

    /// Generates the DDL for every step.
    ///
    /// # Errors
    ///
    /// Propagates `UnsupportedOperation` if a step has no DDL form on
    /// the dialect (the differ does not emit such steps).
    pub fn to_sql(&self, dialect: Dialect) -> Result<Vec<String>> {
        self.steps.iter().map(|s| dialect.ddl(s)).collect()
    }
}

/// Whether converting `from` into `to` cannot lose or reinterpret data.
///
/// Anything not listed here (narrowing, cross-family, unknown types) is
/// treated as requiring manual intervention.
#[must_use]
pub fn is_safe_widening(from: &ColumnType, to: &ColumnType) -> bool {
    match (from, to) {
        (ColumnType::Varchar(Some(a)), ColumnType::Varchar(Some(b))) => b >= a,
        (ColumnType::Varchar(Some(_)), ColumnType::Varchar(None) | ColumnType::Text) => true,
        (
            ColumnType::SmallInt,
            ColumnType::Integer | ColumnType::BigInt | ColumnType::Double,
        ) => true,
        (ColumnType::Integer, ColumnType::BigInt | ColumnType::Double) => true,
        _ => false,
    }
}

/// Everything the differ derives about one content type before
/// comparing it with the live table.
struct ExpectedTable {
    name: String,
    columns: Vec<ColumnSpec>,
    unique_indexes: Vec<(String, String)>,
    foreign_keys: Vec<ForeignKeySpec>,
}

fn expected_table(
    schema: &LogicalSchema,
    def: &ContentTypeDefinition,
    dialect: Dialect,
) -> Result<ExpectedTable> {
    let table = def.table_name.clone();
    let mut columns = vec![ColumnSpec::primary_key(&def.primary_key)];
    let mut unique_indexes = Vec::new();
    let mut foreign_keys = Vec::new();

    for (attr, column) in def.scalar_columns() {
        let ty = dialect.column_type_for(attr)?;
        let mut spec = ColumnSpec::new(column.clone(), ty);
        spec.nullable = attr.nullable;
        spec.default.clone_from(&attr.default);
        columns.push(spec);

        if attr.unique {
            unique_indexes.push((format!("{table}_{column}_unique"), column.clone()));
        }

        if let Some(rel) = attr.as_relation() {
            if let JoinStrategy::JoinColumn { column } = &rel.strategy {
                // Validated schemas always resolve relation targets.
                if let Some(target) = schema.get(&rel.target) {
                    foreign_keys.push(ForeignKeySpec {
                        name: format!("fk_{table}_{column}"),
                        columns: vec![column.clone()],
                        references_table: target.table_name.clone(),
                        references_columns: vec![target.primary_key.clone()],
                    });
                }
            }
        }
    }

    Ok(ExpectedTable {
        name: table,
        columns,
        unique_indexes,
        foreign_keys,
    })
}

/// Compares the declared schema against the inspected one.
///
/// Step ordering: table creations and column additions/alterations
/// first, then index changes, then foreign-key drops, then
/// (policy-gated) column drops, then deferred foreign-key additions.
/// The FK phase runs last so mutually referencing content types never
/// hit a forward-reference failure.
///
/// # Errors
///
/// `UnsupportedType` when an attribute has no column mapping on the
/// dialect.
pub fn diff(
    logical: &LogicalSchema,
    live: &LiveSchema,
    dialect: Dialect,
    options: &DiffOptions,
) -> Result<MigrationPlan> {
    let mut create_ops = Vec::new();
    let mut index_ops = Vec::new();
    let mut drop_fk_ops = Vec::new();
    let mut drop_col_ops = Vec::new();
    let mut add_fk_ops = Vec::new();
    let mut warnings = Vec::new();

    for def in logical.iter() {
        let expected = expected_table(logical, def, dialect)?;

        match live.table(&expected.name) {
            None => {
                // Fresh table: FKs go inline where ALTER cannot add
                // them later, otherwise into the deferred phase.
                let inline_fks = if dialect.supports_alter_foreign_key() {
                    for fk in &expected.foreign_keys {
                        add_fk_ops.push(MigrationStep::AddForeignKey {
                            table: expected.name.clone(),
                            spec: fk.clone(),
                        });
                    }
                    Vec::new()
                } else {
                    expected.foreign_keys.clone()
                };

                create_ops.push(MigrationStep::CreateTable {
                    table: expected.name.clone(),
                    columns: expected.columns.clone(),
                    foreign_keys: inline_fks,
                });

                for (name, column) in &expected.unique_indexes {
                    index_ops.push(MigrationStep::AddIndex {
                        table: expected.name.clone(),
                        name: name.clone(),
                        columns: vec![column.clone()],
                        unique: true,
                    });
                }
            }
            Some(live_table) => diff_existing_table(
                &expected,
                live_table,
                dialect,
                options,
                &mut create_ops,
                &mut index_ops,
                &mut drop_fk_ops,
                &mut drop_col_ops,
                &mut add_fk_ops,
                &mut warnings,
            ),
        }
    }

    let mut steps = create_ops;
    steps.extend(index_ops);
    steps.extend(drop_fk_ops);
    steps.extend(drop_col_ops);
    steps.extend(add_fk_ops);

    Ok(MigrationPlan { steps, warnings })
}

#[allow(clippy::too_many_arguments)]
fn diff_existing_table(
    expected: &ExpectedTable,
    live: &LiveTable,
    dialect: Dialect,
    options: &DiffOptions,
    add_ops: &mut Vec<MigrationStep>,
    index_ops: &mut Vec<MigrationStep>,
    drop_fk_ops: &mut Vec<MigrationStep>,
    drop_col_ops: &mut Vec<MigrationStep>,
    add_fk_ops: &mut Vec<MigrationStep>,
    warnings: &mut Vec<MigrationWarning>,
) {
    let table = &expected.name;
    let expected_names: BTreeSet<&str> =
        expected.columns.iter().map(|c| c.name.as_str()).collect();
    let live_names: BTreeSet<&str> = live.columns.iter().map(|c| c.name.as_str()).collect();

    // ---- new and changed columns -------------------------------
    for spec in &expected.columns {
        match live.column(&spec.name) {
            None => {
                if spec.primary_key {
                    // A table without its pk column requires rebuild;
                    // that never happens for tables this layer created.
                    continue;
                }
                add_ops.push(MigrationStep::AddColumn {
                    table: table.clone(),
                    column: spec.clone(),
                });
            }
            Some(live_col) => {
                if spec.primary_key {
                    continue;
                }
                let want = dialect.normalize(&spec.ty);
                if live_col.ty == want {
                    continue;
                }
                if dialect.supports_alter_column_type()
                    && is_safe_widening(&live_col.ty, &want)
                {
                    add_ops.push(MigrationStep::AlterColumnType {
                        table: table.clone(),
                        column: spec.name.clone(),
                        from: live_col.ty.clone(),
                        to: spec.ty.clone(),
                        nullable: spec.nullable,
                    });
                } else {
                    warnings.push(MigrationWarning::ManualTypeChange {
                        table: table.clone(),
                        column: spec.name.clone(),
                        from: live_col.ty.clone(),
                        to: want,
                    });
                }
            }
        }
    }

    // ---- stray live columns ------------------------------------
    for name in live_names.difference(&expected_names) {
        if options.allow_destructive {
            drop_col_ops.push(MigrationStep::DropColumn {
                table: table.clone(),
                column: (*name).to_string(),
            });
        } else {
            warnings.push(MigrationWarning::SkippedDrop {
                table: table.clone(),
                column: (*name).to_string(),
            });
        }
    }

    // ---- unique indexes ----------------------------------------
    // Compared by coverage, not name: environments may disagree on
    // index names.
    for (name, column) in &expected.unique_indexes {
        let exists = live
            .indexes
            .iter()
            .any(|idx| idx.unique && idx.columns == [column.clone()]);
        if !exists {
            index_ops.push(MigrationStep::AddIndex {
                table: table.clone(),
                name: name.clone(),
                columns: vec![column.clone()],
                unique: true,
            });
        }
    }
    // Only indexes following this layer's naming convention are
    // candidates for removal; operator-created indexes are left alone.
    for idx in &live.indexes {
        if !idx.name.ends_with("_unique") || !idx.name.starts_with(table.as_str()) {
            continue;
        }
        let still_wanted = expected
            .unique_indexes
            .iter()
            .any(|(_, column)| idx.unique && idx.columns == [column.clone()]);
        if !still_wanted {
            index_ops.push(MigrationStep::DropIndex {
                table: table.clone(),
                name: idx.name.clone(),
            });
        }
    }

    // ---- foreign keys ------------------------------------------
    for fk in &expected.foreign_keys {
        let exists = live.foreign_keys.iter().any(|live_fk| {
            live_fk.columns == fk.columns
                && live_fk.references_table == fk.references_table
                && live_fk.references_columns == fk.references_columns
        });
        if exists {
            continue;
        }
        if dialect.supports_alter_foreign_key() {
            add_fk_ops.push(MigrationStep::AddForeignKey {
                table: table.clone(),
                spec: fk.clone(),
            });
        } else {
            warnings.push(MigrationWarning::ManualForeignKey {
                table: table.clone(),
                name: fk.name.clone(),
            });
        }
    }
    for live_fk in &live.foreign_keys {
        let still_wanted = expected.foreign_keys.iter().any(|fk| {
            live_fk.columns == fk.columns
                && live_fk.references_table == fk.references_table
                && live_fk.references_columns == fk.references_columns
        });
        if !still_wanted {
            if let Some(name) = &live_fk.name {
                if dialect.supports_alter_foreign_key() {
                    drop_fk_ops.push(MigrationStep::DropForeignKey {
                        table: table.clone(),
                        name: name.clone(),
                    });
                }
            }
        }
    }
}
