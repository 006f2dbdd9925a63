//! Logical content-type schema.
//!
//! The schema is supplied by the content-type subsystem as an in-memory
//! value, validated once, and treated as immutable for the lifetime of
//! the process. Synchronization and query building both read from it;
//! nothing mutates it.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::SchemaError;

/// Semantic attribute types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeType {
    /// Bounded string. `length` caps the column where the dialect
    /// distinguishes bounded from unbounded text.
    String {
        /// Maximum length in characters.
        length: u32,
    },
    /// Unbounded text.
    Text,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInteger,
    /// Double-precision float.
    Float,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Date and time.
    DateTime,
    /// JSON document.
    Json,
    /// Link to another content type. Carries no scalar column of its
    /// own unless the join strategy places one on this table.
    Relation(RelationDefinition),
    /// Reusable component; structural, materialized by the host as
    /// separate content types.
    Component {
        /// The component's own uid.
        component_uid: String,
    },
}

impl AttributeType {
    /// Short name for error messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::String { .. } => "string",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::BigInteger => "biginteger",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Json => "json",
            Self::Relation(_) => "relation",
            Self::Component { .. } => "component",
        }
    }
}

/// Relation cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// One row here references one row there.
    OneToOne,
    /// One row here owns many rows there.
    OneToMany,
    /// Many rows here reference one row there.
    ManyToOne,
    /// Linked through a join table.
    ManyToMany,
}

impl RelationKind {
    /// Whether traversing this relation from the owning side can yield
    /// more than one row.
    #[must_use]
    pub const fn is_to_many(self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }
}

/// How a relation is physically joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinStrategy {
    /// A foreign key column on this table pointing at the target's
    /// primary key.
    JoinColumn {
        /// Column name on the owning table.
        column: String,
    },
    /// A foreign key column on the target table pointing back here.
    InverseJoinColumn {
        /// Column name on the target table.
        column: String,
    },
    /// A dedicated join table holding one FK per side.
    JoinTable {
        /// Join table name.
        table: String,
        /// Column referencing this side's primary key.
        source_column: String,
        /// Column referencing the target's primary key.
        target_column: String,
    },
}

/// A relation attribute's target and mechanics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDefinition {
    /// Target content type uid.
    pub target: String,
    /// Cardinality.
    pub kind: RelationKind,
    /// Physical join strategy.
    pub strategy: JoinStrategy,
}

/// A single attribute of a content type.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDefinition {
    /// Attribute name (also the column name for scalar attributes).
    pub name: String,
    /// Semantic type.
    pub ty: AttributeType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether the value must be unique across rows.
    pub unique: bool,
    /// Default value as a SQL expression, if any.
    pub default: Option<String>,
}

impl AttributeDefinition {
    /// Creates an attribute of the given type. Nullable by default.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            unique: false,
            default: None,
        }
    }

    /// Bounded string attribute (length 255).
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::String { length: 255 })
    }

    /// Unbounded text attribute.
    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Text)
    }

    /// 32-bit integer attribute.
    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Integer)
    }

    /// 64-bit integer attribute.
    #[must_use]
    pub fn big_integer(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::BigInteger)
    }

    /// Float attribute.
    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Float)
    }

    /// Boolean attribute.
    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Boolean)
    }

    /// Date attribute.
    #[must_use]
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Date)
    }

    /// Date-time attribute.
    #[must_use]
    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::DateTime)
    }

    /// JSON attribute.
    #[must_use]
    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Json)
    }

    /// Relation attribute.
    #[must_use]
    pub fn relation(name: impl Into<String>, def: RelationDefinition) -> Self {
        Self::new(name, AttributeType::Relation(def))
    }

    /// Marks the attribute NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the attribute UNIQUE.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets a default SQL expression.
    #[must_use]
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Returns the relation definition if this is a relation attribute.
    #[must_use]
    pub fn as_relation(&self) -> Option<&RelationDefinition> {
        match &self.ty {
            AttributeType::Relation(def) => Some(def),
            _ => None,
        }
    }

    /// Whether this attribute materializes as a column on its own
    /// table. Relations via inverse/join-table strategies and
    /// components do not.
    #[must_use]
    pub fn is_scalar_column(&self) -> bool {
        match &self.ty {
            AttributeType::Relation(def) => {
                matches!(def.strategy, JoinStrategy::JoinColumn { .. })
            }
            AttributeType::Component { .. } => false,
            _ => true,
        }
    }
}

/// A content-type definition: one logical entity, one table.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentTypeDefinition {
    /// Globally unique, stable identifier.
    pub uid: String,
    /// Physical table name.
    pub table_name: String,
    /// Primary key attribute name.
    pub primary_key: String,
    /// Attributes in declaration order.
    pub attributes: Vec<AttributeDefinition>,
}

impl ContentTypeDefinition {
    /// Creates a definition with an auto-increment `id` primary key.
    #[must_use]
    pub fn new(uid: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            table_name: table_name.into(),
            primary_key: "id".to_string(),
            attributes: Vec::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn attribute(mut self, attr: AttributeDefinition) -> Self {
        self.attributes.push(attr);
        self
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Iterates attributes that materialize as columns on this table,
    /// paired with their column names.
    pub fn scalar_columns(&self) -> impl Iterator<Item = (&AttributeDefinition, String)> {
        self.attributes.iter().filter_map(|attr| {
            if !attr.is_scalar_column() {
                return None;
            }
            let column = match &attr.ty {
                AttributeType::Relation(def) => match &def.strategy {
                    JoinStrategy::JoinColumn { column } => column.clone(),
                    _ => return None,
                },
                _ => attr.name.clone(),
            };
            Some((attr, column))
        })
    }
}

/// The full logical schema: every content type, keyed by uid.
///
/// Constructed once at process start; immutable thereafter. Keyed with a
/// `BTreeMap` so every consumer iterates in a deterministic order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogicalSchema {
    types: BTreeMap<String, ContentTypeDefinition>,
}

impl LogicalSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a validated schema from definitions.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found: duplicate uid, duplicate
    /// table name, duplicate attribute within a type, or a relation
    /// whose target uid does not exist.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = ContentTypeDefinition>,
    ) -> Result<Self, SchemaError> {
        let mut types = BTreeMap::new();
        for def in definitions {
            if types.contains_key(&def.uid) {
                return Err(SchemaError::DuplicateUid(def.uid));
            }
            types.insert(def.uid.clone(), def);
        }
        let schema = Self { types };
        schema.validate()?;
        Ok(schema)
    }

    /// Re-checks all invariants.
    ///
    /// # Errors
    ///
    /// See [`LogicalSchema::from_definitions`].
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut tables: HashMap<&str, &str> = HashMap::new();
        for (uid, def) in &self.types {
            if let Some(first) = tables.insert(def.table_name.as_str(), uid.as_str()) {
                return Err(SchemaError::DuplicateTable {
                    table: def.table_name.clone(),
                    first: first.to_string(),
                    second: uid.clone(),
                });
            }

            let mut seen: HashSet<&str> = HashSet::new();
            for attr in &def.attributes {
                if !seen.insert(attr.name.as_str()) {
                    return Err(SchemaError::DuplicateAttribute {
                        uid: uid.clone(),
                        attribute: attr.name.clone(),
                    });
                }
                if let Some(rel) = attr.as_relation() {
                    if !self.types.contains_key(&rel.target) {
                        return Err(SchemaError::UnknownRelationTarget {
                            uid: uid.clone(),
                            attribute: attr.name.clone(),
                            target: rel.target.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Looks up a content type by uid.
    #[must_use]
    pub fn get(&self, uid: &str) -> Option<&ContentTypeDefinition> {
        self.types.get(uid)
    }

    /// Iterates all content types in uid order.
    pub fn iter(&self) -> impl Iterator<Item = &ContentTypeDefinition> {
        self.types.values()
    }

    /// Number of content types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the schema is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> ContentTypeDefinition {
        ContentTypeDefinition::new("api::article.article", "articles")
            .attribute(AttributeDefinition::string("title").not_null().unique())
            .attribute(AttributeDefinition::integer("views").default_expr("0"))
    }

    fn author() -> ContentTypeDefinition {
        ContentTypeDefinition::new("api::author.author", "authors")
            .attribute(AttributeDefinition::string("name").not_null())
    }

    #[test]
    fn builds_valid_schema() {
        let schema = LogicalSchema::from_definitions(vec![article(), author()]).unwrap();
        assert_eq!(schema.len(), 2);
        assert!(schema.get("api::article.article").is_some());
    }

    #[test]
    fn rejects_duplicate_uid() {
        let err = LogicalSchema::from_definitions(vec![article(), article()]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateUid(uid) if uid == "api::article.article"));
    }

    #[test]
    fn rejects_duplicate_table() {
        let other = ContentTypeDefinition::new("api::post.post", "articles");
        let err = LogicalSchema::from_definitions(vec![article(), other]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateTable { table, .. } if table == "articles"));
    }

    #[test]
    fn rejects_duplicate_attribute() {
        let bad = ContentTypeDefinition::new("api::tag.tag", "tags")
            .attribute(AttributeDefinition::string("name"))
            .attribute(AttributeDefinition::text("name"));
        let err = LogicalSchema::from_definitions(vec![bad]).unwrap_err();
        assert!(
            matches!(err, SchemaError::DuplicateAttribute { attribute, .. } if attribute == "name")
        );
    }

    #[test]
    fn rejects_unresolved_relation_target() {
        let bad = ContentTypeDefinition::new("api::article.article", "articles").attribute(
            AttributeDefinition::relation(
                "author",
                RelationDefinition {
                    target: "api::author.author".to_string(),
                    kind: RelationKind::ManyToOne,
                    strategy: JoinStrategy::JoinColumn {
                        column: "author_id".to_string(),
                    },
                },
            ),
        );
        let err = LogicalSchema::from_definitions(vec![bad]).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnknownRelationTarget { target, .. } if target == "api::author.author"
        ));
    }

    #[test]
    fn scalar_columns_include_join_columns() {
        let def = ContentTypeDefinition::new("api::article.article", "articles")
            .attribute(AttributeDefinition::string("title"))
            .attribute(AttributeDefinition::relation(
                "author",
                RelationDefinition {
                    target: "api::article.article".to_string(),
                    kind: RelationKind::ManyToOne,
                    strategy: JoinStrategy::JoinColumn {
                        column: "author_id".to_string(),
                    },
                },
            ))
            .attribute(AttributeDefinition::relation(
                "tags",
                RelationDefinition {
                    target: "api::article.article".to_string(),
                    kind: RelationKind::ManyToMany,
                    strategy: JoinStrategy::JoinTable {
                        table: "articles_tags".to_string(),
                        source_column: "article_id".to_string(),
                        target_column: "tag_id".to_string(),
                    },
                },
            ));

        let cols: Vec<String> = def.scalar_columns().map(|(_, c)| c).collect();
        assert_eq!(cols, vec!["title".to_string(), "author_id".to_string()]);
    }

    #[test]
    fn to_many_detection() {
        assert!(RelationKind::OneToMany.is_to_many());
        assert!(RelationKind::ManyToMany.is_to_many());
        assert!(!RelationKind::ManyToOne.is_to_many());
        assert!(!RelationKind::OneToOne.is_to_many());
    }
}
