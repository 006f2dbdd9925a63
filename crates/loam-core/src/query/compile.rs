//! Query compilation.
//!
//! Turns a [`Query`] into one SQL string plus an ordered parameter
//! list for a given dialect. Every scalar operand becomes a positional
//! parameter; no user data is ever interpolated into the SQL text.
//! Compilation is deterministic: the same query compiles to the same
//! bytes and the same parameter order every time.

use crate::dialect::Dialect;
use crate::error::{CoreError, Result};
use crate::schema::{ContentTypeDefinition, JoinStrategy, LogicalSchema};
use crate::value::SqlValue;

use super::builder::{Query, QueryKind};
use super::expr::{CompareOp, Predicate};

/// A compiled statement: SQL text plus bind parameters in order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// The SQL text with dialect-native placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<SqlValue>,
}

/// One joined relation in a compiled SELECT. The execution layer uses
/// the alias prefix (`{alias}_`) to regroup projected columns into
/// nested records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPlan {
    /// The relation attribute on the root content type.
    pub attribute: String,
    /// Target content type uid.
    pub target: String,
    /// Table alias assigned to the target (`t1`, `t2`, ...).
    pub alias: String,
    /// Whether traversal can yield more than one row per root record.
    pub to_many: bool,
}

/// Resolves the joins of a SELECT to aliases and cardinalities, in
/// declaration order. Aliases are assigned `t1`, `t2`, ... and are
/// identical to the ones [`Query::compile`] emits.
///
/// # Errors
///
/// `UnsupportedOperation` when a join names a non-relation attribute
/// or an attribute that does not exist.
pub fn plan_joins(schema: &LogicalSchema, query: &Query) -> Result<Vec<JoinPlan>> {
    let def = root_definition(schema, &query.content_type)?;
    let mut plans = Vec::with_capacity(query.joins.len());
    for (i, name) in query.joins.iter().enumerate() {
        let attr = def.get_attribute(name).ok_or_else(|| {
            CoreError::UnsupportedOperation(format!(
                "cannot join unknown attribute '{name}' on '{}'",
                def.uid
            ))
        })?;
        let rel = attr.as_relation().ok_or_else(|| {
            CoreError::UnsupportedOperation(format!(
                "cannot join non-relation attribute '{name}' on '{}'",
                def.uid
            ))
        })?;
        plans.push(JoinPlan {
            attribute: name.clone(),
            target: rel.target.clone(),
            alias: format!("t{}", i + 1),
            to_many: rel.kind.is_to_many(),
        });
    }
    Ok(plans)
}

fn root_definition<'a>(
    schema: &'a LogicalSchema,
    uid: &str,
) -> Result<&'a ContentTypeDefinition> {
    schema.get(uid).ok_or_else(|| {
        CoreError::UnsupportedOperation(format!("unknown content type '{uid}'"))
    })
}

impl Query {
    /// Compiles this query for a dialect.
    ///
    /// # Errors
    ///
    /// `UnsupportedOperation` for invalid IR: unknown content type,
    /// unknown attribute in a filter/projection/assignment, a join
    /// over a non-relation attribute, or a write with no assignments.
    pub fn compile(&self, schema: &LogicalSchema, dialect: Dialect) -> Result<CompiledQuery> {
        let compiler = Compiler {
            schema,
            dialect,
            query: self,
        };
        match self.kind {
            QueryKind::Select => compiler.select(),
            QueryKind::Insert => compiler.insert(),
            QueryKind::Update => compiler.update(),
            QueryKind::Delete => compiler.delete(),
        }
    }
}

struct Compiler<'a> {
    schema: &'a LogicalSchema,
    dialect: Dialect,
    query: &'a Query,
}

impl Compiler<'_> {
    fn root(&self) -> Result<&ContentTypeDefinition> {
        root_definition(self.schema, &self.query.content_type)
    }

    /// Maps an attribute name to the physical column it materializes
    /// as on the given definition. The primary key resolves to itself.
    fn resolve_column(&self, def: &ContentTypeDefinition, attribute: &str) -> Result<String> {
        if attribute == def.primary_key {
            return Ok(def.primary_key.clone());
        }
        def.scalar_columns()
            .find(|(attr, _)| attr.name == attribute)
            .map(|(_, column)| column)
            .ok_or_else(|| {
                CoreError::UnsupportedOperation(format!(
                    "unknown attribute '{attribute}' on '{}'",
                    def.uid
                ))
            })
    }

    /// Projected columns of a definition: primary key first, then the
    /// scalar columns (restricted to `columns` when set).
    fn projection_columns(&self, def: &ContentTypeDefinition, restricted: bool) -> Result<Vec<String>> {
        let mut cols = vec![def.primary_key.clone()];
        if restricted && !self.query.columns.is_empty() {
            for attribute in &self.query.columns {
                let column = self.resolve_column(def, attribute)?;
                if !cols.contains(&column) {
                    cols.push(column);
                }
            }
        } else {
            for (_, column) in def.scalar_columns() {
                if !cols.contains(&column) {
                    cols.push(column);
                }
            }
        }
        Ok(cols)
    }

    fn qualified(&self, alias: &str, column: &str) -> String {
        format!("{alias}.{}", self.dialect.quote_identifier(column))
    }

    fn select(&self) -> Result<CompiledQuery> {
        let def = self.root()?;
        let joins = plan_joins(self.schema, self.query)?;
        let mut params = Vec::new();

        let mut projection = Vec::new();
        for column in self.projection_columns(def, true)? {
            projection.push(format!(
                "{} AS {}",
                self.qualified("t0", &column),
                self.dialect.quote_identifier(&format!("t0_{column}"))
            ));
        }

        let mut join_sql = Vec::new();
        for (i, plan) in joins.iter().enumerate() {
            // plan_joins already validated the attribute.
            let attr = def
                .get_attribute(&plan.attribute)
                .and_then(|a| a.as_relation())
                .ok_or_else(|| {
                    CoreError::UnsupportedOperation(format!(
                        "cannot join non-relation attribute '{}'",
                        plan.attribute
                    ))
                })?;
            let target = root_definition(self.schema, &plan.target)?;
            let alias = &plan.alias;

            match &attr.strategy {
                JoinStrategy::JoinColumn { column } => {
                    join_sql.push(format!(
                        "LEFT JOIN {} {alias} ON {} = {}",
                        self.dialect.quote_identifier(&target.table_name),
                        self.qualified("t0", column),
                        self.qualified(alias, &target.primary_key),
                    ));
                }
                JoinStrategy::InverseJoinColumn { column } => {
                    join_sql.push(format!(
                        "LEFT JOIN {} {alias} ON {} = {}",
                        self.dialect.quote_identifier(&target.table_name),
                        self.qualified(alias, column),
                        self.qualified("t0", &def.primary_key),
                    ));
                }
                JoinStrategy::JoinTable {
                    table,
                    source_column,
                    target_column,
                } => {
                    let link = format!("j{}", i + 1);
                    join_sql.push(format!(
                        "LEFT JOIN {} {link} ON {} = {}",
                        self.dialect.quote_identifier(table),
                        self.qualified(&link, source_column),
                        self.qualified("t0", &def.primary_key),
                    ));
                    join_sql.push(format!(
                        "LEFT JOIN {} {alias} ON {} = {}",
                        self.dialect.quote_identifier(&target.table_name),
                        self.qualified(alias, &target.primary_key),
                        self.qualified(&link, target_column),
                    ));
                }
            }

            for column in self.projection_columns(target, false)? {
                projection.push(format!(
                    "{} AS {}",
                    self.qualified(alias, &column),
                    self.dialect
                        .quote_identifier(&format!("{alias}_{column}"))
                ));
            }
        }

        let mut sql = format!(
            "SELECT {} FROM {} t0",
            projection.join(", "),
            self.dialect.quote_identifier(&def.table_name)
        );
        for clause in &join_sql {
            sql.push(' ');
            sql.push_str(clause);
        }

        if let Some(filter) = &self.query.filter {
            let clause = self.predicate_sql(def, Some("t0"), filter, &mut params)?;
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        if !self.query.order_by.is_empty() {
            let mut keys = Vec::new();
            for key in &self.query.order_by {
                let column = self.resolve_column(def, &key.attribute)?;
                keys.push(format!("{} {}", self.qualified("t0", &column), key.order.sql()));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        sql.push_str(&self.limit_offset_sql());

        Ok(CompiledQuery { sql, params })
    }

    /// LIMIT/OFFSET rendering. The operands are `u64` counts from the
    /// builder, not user data, so they are rendered as literals.
    fn limit_offset_sql(&self) -> String {
        let (limit, offset) = (self.query.limit, self.query.offset);
        match (limit, offset) {
            (None, None) => String::new(),
            (Some(l), None) => format!(" LIMIT {l}"),
            (Some(l), Some(o)) => format!(" LIMIT {l} OFFSET {o}"),
            // OFFSET without LIMIT needs a dummy limit on engines
            // whose grammar ties the two together.
            (None, Some(o)) => match self.dialect {
                Dialect::Postgres => format!(" OFFSET {o}"),
                Dialect::MySql => format!(" LIMIT 18446744073709551615 OFFSET {o}"),
                Dialect::Sqlite => format!(" LIMIT -1 OFFSET {o}"),
            },
        }
    }

    fn predicate_sql(
        &self,
        def: &ContentTypeDefinition,
        alias: Option<&str>,
        predicate: &Predicate,
        params: &mut Vec<SqlValue>,
    ) -> Result<String> {
        match predicate {
            Predicate::And(children) => {
                if children.is_empty() {
                    return Ok("1 = 1".to_string());
                }
                let mut parts = Vec::with_capacity(children.len());
                for child in children {
                    parts.push(format!(
                        "({})",
                        self.predicate_sql(def, alias, child, params)?
                    ));
                }
                Ok(parts.join(" AND "))
            }
            Predicate::Or(children) => {
                if children.is_empty() {
                    return Ok("1 = 0".to_string());
                }
                let mut parts = Vec::with_capacity(children.len());
                for child in children {
                    parts.push(format!(
                        "({})",
                        self.predicate_sql(def, alias, child, params)?
                    ));
                }
                Ok(parts.join(" OR "))
            }
            Predicate::Not(inner) => Ok(format!(
                "NOT ({})",
                self.predicate_sql(def, alias, inner, params)?
            )),
            Predicate::Compare {
                attribute,
                op,
                value,
            } => {
                let column = self.column_ref(def, alias, attribute)?;
                params.push(value.clone());
                let placeholder = self.dialect.placeholder(params.len());
                match op {
                    CompareOp::ILike if self.dialect == Dialect::Postgres => {
                        Ok(format!("{column} ILIKE {placeholder}"))
                    }
                    CompareOp::ILike => {
                        Ok(format!("LOWER({column}) LIKE LOWER({placeholder})"))
                    }
                    other => Ok(format!("{column} {} {placeholder}", other.sql())),
                }
            }
            Predicate::In { attribute, values } => {
                if values.is_empty() {
                    return Ok("1 = 0".to_string());
                }
                let column = self.column_ref(def, alias, attribute)?;
                let mut placeholders = Vec::with_capacity(values.len());
                for value in values {
                    params.push(value.clone());
                    placeholders.push(self.dialect.placeholder(params.len()));
                }
                Ok(format!("{column} IN ({})", placeholders.join(", ")))
            }
            Predicate::IsNull { attribute, negated } => {
                let column = self.column_ref(def, alias, attribute)?;
                Ok(if *negated {
                    format!("{column} IS NOT NULL")
                } else {
                    format!("{column} IS NULL")
                })
            }
        }
    }

    fn column_ref(
        &self,
        def: &ContentTypeDefinition,
        alias: Option<&str>,
        attribute: &str,
    ) -> Result<String> {
        let column = self.resolve_column(def, attribute)?;
        Ok(match alias {
            Some(alias) => self.qualified(alias, &column),
            None => self.dialect.quote_identifier(&column),
        })
    }

    fn insert(&self) -> Result<CompiledQuery> {
        let def = self.root()?;
        if self.query.values.is_empty() {
            return Err(CoreError::UnsupportedOperation(
                "insert with no values".to_string(),
            ));
        }

        let mut params = Vec::new();
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();
        for (attribute, value) in &self.query.values {
            let column = self.resolve_column(def, attribute)?;
            params.push(value.clone());
            columns.push(self.dialect.quote_identifier(&column));
            placeholders.push(self.dialect.placeholder(params.len()));
        }

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.dialect.quote_identifier(&def.table_name),
            columns.join(", "),
            placeholders.join(", ")
        );

        if self.dialect.supports_returning() {
            let returned: Vec<String> = self
                .projection_columns(def, false)?
                .iter()
                .map(|c| self.dialect.quote_identifier(c))
                .collect();
            sql.push_str(" RETURNING ");
            sql.push_str(&returned.join(", "));
        }

        Ok(CompiledQuery { sql, params })
    }

    fn update(&self) -> Result<CompiledQuery> {
        let def = self.root()?;
        if self.query.values.is_empty() {
            return Err(CoreError::UnsupportedOperation(
                "update with no assignments".to_string(),
            ));
        }

        let mut params = Vec::new();
        let mut assignments = Vec::new();
        for (attribute, value) in &self.query.values {
            let column = self.resolve_column(def, attribute)?;
            params.push(value.clone());
            assignments.push(format!(
                "{} = {}",
                self.dialect.quote_identifier(&column),
                self.dialect.placeholder(params.len())
            ));
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.dialect.quote_identifier(&def.table_name),
            assignments.join(", ")
        );
        if let Some(filter) = &self.query.filter {
            let clause = self.predicate_sql(def, None, filter, &mut params)?;
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        Ok(CompiledQuery { sql, params })
    }

    fn delete(&self) -> Result<CompiledQuery> {
        let def = self.root()?;
        let mut params = Vec::new();
        let mut sql = format!(
            "DELETE FROM {}",
            self.dialect.quote_identifier(&def.table_name)
        );
        if let Some(filter) = &self.query.filter {
            let clause = self.predicate_sql(def, None, filter, &mut params)?;
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        Ok(CompiledQuery { sql, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        AttributeDefinition, ContentTypeDefinition, JoinStrategy, RelationDefinition,
        RelationKind,
    };

    fn schema() -> LogicalSchema {
        let articles = ContentTypeDefinition::new("api::article.article", "articles")
            .attribute(AttributeDefinition::string("title").not_null().unique())
            .attribute(AttributeDefinition::integer("views"))
            .attribute(AttributeDefinition::relation(
                "author",
                RelationDefinition {
                    target: "api::author.author".to_string(),
                    kind: RelationKind::ManyToOne,
                    strategy: JoinStrategy::JoinColumn {
                        column: "author_id".to_string(),
                    },
                },
            ))
            .attribute(AttributeDefinition::relation(
                "tags",
                RelationDefinition {
                    target: "api::tag.tag".to_string(),
                    kind: RelationKind::ManyToMany,
                    strategy: JoinStrategy::JoinTable {
                        table: "articles_tags".to_string(),
                        source_column: "article_id".to_string(),
                        target_column: "tag_id".to_string(),
                    },
                },
            ));
        let authors = ContentTypeDefinition::new("api::author.author", "authors")
            .attribute(AttributeDefinition::string("name").not_null());
        let tags = ContentTypeDefinition::new("api::tag.tag", "tags")
            .attribute(AttributeDefinition::string("label"));
        LogicalSchema::from_definitions(vec![articles, authors, tags]).unwrap()
    }

    #[test]
    fn plain_select_postgres() {
        let q = Query::select("api::article.article").filter(Predicate::eq("title", "hello"));
        let compiled = q.compile(&schema(), Dialect::Postgres).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT t0.\"id\" AS \"t0_id\", t0.\"title\" AS \"t0_title\", \
             t0.\"views\" AS \"t0_views\", t0.\"author_id\" AS \"t0_author_id\" \
             FROM \"articles\" t0 WHERE t0.\"title\" = $1"
        );
        assert_eq!(compiled.params, vec![SqlValue::Text("hello".to_string())]);
    }

    #[test]
    fn compilation_is_deterministic() {
        let q = Query::select("api::article.article")
            .join("author")
            .filter(Predicate::gt("views", 10_i64).and(Predicate::is_not_null("title")))
            .order_by("title", crate::query::Order::Asc)
            .limit(5);
        let a = q.compile(&schema(), Dialect::MySql).unwrap();
        let b = q.compile(&schema(), Dialect::MySql).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn operands_never_appear_in_sql() {
        let hostile = "x'; DROP TABLE articles; --";
        let q = Query::select("api::article.article").filter(
            Predicate::eq("title", hostile)
                .or(Predicate::like("title", "%DELETE FROM%")),
        );
        for dialect in [Dialect::Postgres, Dialect::MySql, Dialect::Sqlite] {
            let compiled = q.compile(&schema(), dialect).unwrap();
            assert!(!compiled.sql.contains("DROP TABLE"));
            assert!(!compiled.sql.contains("DELETE FROM"));
            assert_eq!(compiled.params.len(), 2);
        }
    }

    #[test]
    fn ilike_is_native_on_postgres_and_lowered_elsewhere() {
        let q = Query::select("api::article.article")
            .filter(Predicate::ilike("title", "%rust%"));

        let pg = q.compile(&schema(), Dialect::Postgres).unwrap();
        assert!(pg.sql.contains("t0.\"title\" ILIKE $1"));

        let sqlite = q.compile(&schema(), Dialect::Sqlite).unwrap();
        assert!(sqlite.sql.contains("LOWER(t0.\"title\") LIKE LOWER(?)"));

        let mysql = q.compile(&schema(), Dialect::MySql).unwrap();
        assert!(mysql.sql.contains("LOWER(t0.`title`) LIKE LOWER(?)"));
    }

    #[test]
    fn join_column_relation() {
        let q = Query::select("api::article.article").join("author");
        let compiled = q.compile(&schema(), Dialect::Postgres).unwrap();
        assert!(compiled
            .sql
            .contains("LEFT JOIN \"authors\" t1 ON t0.\"author_id\" = t1.\"id\""));
        assert!(compiled.sql.contains("t1.\"name\" AS \"t1_name\""));
    }

    #[test]
    fn join_table_relation_uses_link_alias() {
        let q = Query::select("api::article.article").join("tags");
        let compiled = q.compile(&schema(), Dialect::Postgres).unwrap();
        assert!(compiled
            .sql
            .contains("LEFT JOIN \"articles_tags\" j1 ON j1.\"article_id\" = t0.\"id\""));
        assert!(compiled
            .sql
            .contains("LEFT JOIN \"tags\" t1 ON t1.\"id\" = j1.\"tag_id\""));
    }

    #[test]
    fn join_plan_aliases_follow_declaration_order() {
        let q = Query::select("api::article.article").join("author").join("tags");
        let plans = plan_joins(&schema(), &q).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].alias, "t1");
        assert_eq!(plans[0].attribute, "author");
        assert!(!plans[0].to_many);
        assert_eq!(plans[1].alias, "t2");
        assert!(plans[1].to_many);
    }

    #[test]
    fn join_over_scalar_attribute_fails() {
        let q = Query::select("api::article.article").join("title");
        let err = q.compile(&schema(), Dialect::Postgres).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedOperation(_)));
    }

    #[test]
    fn insert_returns_row_where_supported() {
        let q = Query::insert("api::article.article")
            .value("title", "hello")
            .value("views", 1_i64);

        let pg = q.compile(&schema(), Dialect::Postgres).unwrap();
        assert_eq!(
            pg.sql,
            "INSERT INTO \"articles\" (\"title\", \"views\") VALUES ($1, $2) \
             RETURNING \"id\", \"title\", \"views\", \"author_id\""
        );

        let mysql = q.compile(&schema(), Dialect::MySql).unwrap();
        assert_eq!(
            mysql.sql,
            "INSERT INTO `articles` (`title`, `views`) VALUES (?, ?)"
        );
    }

    #[test]
    fn update_compiles_assignments_then_filter() {
        let q = Query::update("api::article.article")
            .value("views", 7_i64)
            .filter(Predicate::eq("id", 3_i64));
        let compiled = q.compile(&schema(), Dialect::Postgres).unwrap();
        assert_eq!(
            compiled.sql,
            "UPDATE \"articles\" SET \"views\" = $1 WHERE \"id\" = $2"
        );
        assert_eq!(
            compiled.params,
            vec![SqlValue::Int(7), SqlValue::Int(3)]
        );
    }

    #[test]
    fn update_without_assignments_fails() {
        let q = Query::update("api::article.article").filter(Predicate::eq("id", 1_i64));
        assert!(matches!(
            q.compile(&schema(), Dialect::Postgres),
            Err(CoreError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn delete_with_filter() {
        let q = Query::delete("api::article.article").filter(Predicate::lt("views", 5_i64));
        let compiled = q.compile(&schema(), Dialect::Sqlite).unwrap();
        assert_eq!(compiled.sql, "DELETE FROM \"articles\" WHERE \"views\" < ?");
    }

    #[test]
    fn unknown_attribute_in_filter_fails() {
        let q = Query::select("api::article.article").filter(Predicate::eq("missing", 1_i64));
        assert!(matches!(
            q.compile(&schema(), Dialect::Postgres),
            Err(CoreError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn empty_in_set_is_always_false() {
        let q = Query::select("api::article.article")
            .filter(Predicate::in_values("id", Vec::<i64>::new()));
        let compiled = q.compile(&schema(), Dialect::Postgres).unwrap();
        assert!(compiled.sql.ends_with("WHERE 1 = 0"));
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn offset_without_limit_per_dialect() {
        let q = Query::select("api::article.article").offset(40);
        assert!(q
            .compile(&schema(), Dialect::Postgres)
            .unwrap()
            .sql
            .ends_with(" OFFSET 40"));
        assert!(q
            .compile(&schema(), Dialect::MySql)
            .unwrap()
            .sql
            .ends_with(" LIMIT 18446744073709551615 OFFSET 40"));
        assert!(q
            .compile(&schema(), Dialect::Sqlite)
            .unwrap()
            .sql
            .ends_with(" LIMIT -1 OFFSET 40"));
    }

    #[test]
    fn restricted_projection_always_includes_primary_key() {
        let q = Query::select("api::article.article").column("title");
        let compiled = q.compile(&schema(), Dialect::Postgres).unwrap();
        assert!(compiled.sql.contains("t0.\"id\" AS \"t0_id\""));
        assert!(compiled.sql.contains("t0.\"title\" AS \"t0_title\""));
        assert!(!compiled.sql.contains("t0_views"));
    }
}
