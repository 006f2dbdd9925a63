//! Synchronizer behavior against a real SQLite database.

use loam_core::dialect::Dialect;
use loam_core::schema::{AttributeDefinition, ContentTypeDefinition, LogicalSchema};
use loam_core::sync::MigrationWarning;
use loam_db::{inspect, ConnectionManager, DatabaseConfig, Synchronizer};

fn db_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display())
}

async fn connect(dir: &tempfile::TempDir) -> ConnectionManager {
    let config = DatabaseConfig::new(Dialect::Sqlite, db_url(dir));
    ConnectionManager::connect(config).await.unwrap()
}

fn schema_v1() -> LogicalSchema {
    LogicalSchema::from_definitions(vec![ContentTypeDefinition::new(
        "api::article.article",
        "articles",
    )
    .attribute(AttributeDefinition::string("title").not_null().unique())
    .attribute(AttributeDefinition::integer("views").default_expr("0"))])
    .unwrap()
}

#[tokio::test]
async fn sync_creates_tables_then_converges() {
    let dir = tempfile::tempdir().unwrap();
    let manager = connect(&dir).await;
    let synchronizer = Synchronizer::new(&manager);

    let first = synchronizer.sync(&schema_v1()).await.unwrap();
    assert!(!first.steps.is_empty());

    let live = inspect(manager.pool(), Dialect::Sqlite).await.unwrap();
    let articles = live.table("articles").unwrap();
    assert!(articles.column("id").is_some());
    assert!(articles.column("title").is_some());
    assert!(articles.column("views").is_some());
    assert!(articles
        .indexes
        .iter()
        .any(|i| i.unique && i.columns == ["title".to_string()]));

    let second = synchronizer.sync(&schema_v1()).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn new_attribute_is_added_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let manager = connect(&dir).await;
    let synchronizer = Synchronizer::new(&manager);
    synchronizer.sync(&schema_v1()).await.unwrap();

    let v2 = LogicalSchema::from_definitions(vec![ContentTypeDefinition::new(
        "api::article.article",
        "articles",
    )
    .attribute(AttributeDefinition::string("title").not_null().unique())
    .attribute(AttributeDefinition::integer("views").default_expr("0"))
    .attribute(AttributeDefinition::text("body"))])
    .unwrap();

    synchronizer.sync(&v2).await.unwrap();

    let live = inspect(manager.pool(), Dialect::Sqlite).await.unwrap();
    assert!(live.table("articles").unwrap().column("body").is_some());
}

#[tokio::test]
async fn removed_attribute_is_kept_unless_destructive_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let manager = connect(&dir).await;
    let synchronizer = Synchronizer::new(&manager);
    synchronizer.sync(&schema_v1()).await.unwrap();

    let without_views = LogicalSchema::from_definitions(vec![ContentTypeDefinition::new(
        "api::article.article",
        "articles",
    )
    .attribute(AttributeDefinition::string("title").not_null().unique())])
    .unwrap();

    let plan = synchronizer.sync(&without_views).await.unwrap();
    assert!(plan.steps.is_empty());
    assert!(matches!(
        plan.warnings.as_slice(),
        [MigrationWarning::SkippedDrop { column, .. }] if column == "views"
    ));

    // Column untouched.
    let live = inspect(manager.pool(), Dialect::Sqlite).await.unwrap();
    assert!(live.table("articles").unwrap().column("views").is_some());
}

#[tokio::test]
async fn destructive_flag_drops_stray_columns() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DatabaseConfig::new(Dialect::Sqlite, db_url(&dir));
    config.allow_destructive_migrations = true;
    let manager = ConnectionManager::connect(config).await.unwrap();
    let synchronizer = Synchronizer::new(&manager);
    synchronizer.sync(&schema_v1()).await.unwrap();

    let without_views = LogicalSchema::from_definitions(vec![ContentTypeDefinition::new(
        "api::article.article",
        "articles",
    )
    .attribute(AttributeDefinition::string("title").not_null().unique())])
    .unwrap();

    let plan = synchronizer.sync(&without_views).await.unwrap();
    assert_eq!(plan.steps.len(), 1);

    let live = inspect(manager.pool(), Dialect::Sqlite).await.unwrap();
    assert!(live.table("articles").unwrap().column("views").is_none());
}

#[tokio::test]
async fn bookkeeping_table_is_invisible_to_inspection() {
    let dir = tempfile::tempdir().unwrap();
    let manager = connect(&dir).await;
    let synchronizer = Synchronizer::new(&manager);
    synchronizer.sync(&schema_v1()).await.unwrap();

    let live = inspect(manager.pool(), Dialect::Sqlite).await.unwrap();
    assert!(live.table(loam_db::SYNC_HISTORY_TABLE).is_none());
}
