//! Executor round-trips against a real SQLite database.

use loam_core::dialect::Dialect;
use loam_core::error::{ConstraintKind, CoreError};
use loam_core::query::{Order, Predicate, Query};
use loam_core::schema::{
    AttributeDefinition, ContentTypeDefinition, JoinStrategy, LogicalSchema, RelationDefinition,
    RelationKind,
};
use loam_core::value::SqlValue;
use loam_db::{ConnectionManager, DatabaseConfig, FieldValue, QueryExecutor, Synchronizer};

fn blog_schema() -> LogicalSchema {
    let authors = ContentTypeDefinition::new("api::author.author", "authors")
        .attribute(AttributeDefinition::string("name").not_null());
    let articles = ContentTypeDefinition::new("api::article.article", "articles")
        .attribute(AttributeDefinition::string("title").not_null().unique())
        .attribute(AttributeDefinition::integer("views").default_expr("0"))
        .attribute(AttributeDefinition::relation(
            "author",
            RelationDefinition {
                target: "api::author.author".to_string(),
                kind: RelationKind::ManyToOne,
                strategy: JoinStrategy::JoinColumn {
                    column: "author_id".to_string(),
                },
            },
        ));
    LogicalSchema::from_definitions(vec![articles, authors]).unwrap()
}

async fn prepared(dir: &tempfile::TempDir) -> (ConnectionManager, LogicalSchema) {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    let config = DatabaseConfig::new(Dialect::Sqlite, url);
    let manager = ConnectionManager::connect(config).await.unwrap();
    let schema = blog_schema();
    Synchronizer::new(&manager).sync(&schema).await.unwrap();
    (manager, schema)
}

fn int(record: &loam_db::Record, name: &str) -> i64 {
    match record.scalar(name) {
        Some(SqlValue::Int(v)) => *v,
        other => panic!("expected integer field '{name}', got {other:?}"),
    }
}

#[tokio::test]
async fn insert_then_select_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, schema) = prepared(&dir).await;
    let executor = QueryExecutor::new(&manager, &schema);

    let inserted = executor
        .insert(
            &Query::insert("api::article.article")
                .value("title", "hello world")
                .value("views", 3_i64),
        )
        .await
        .unwrap();
    assert!(int(&inserted, "id") > 0);
    assert_eq!(
        inserted.scalar("title"),
        Some(&SqlValue::Text("hello world".to_string()))
    );

    let fetched = executor
        .fetch(
            &Query::select("api::article.article")
                .filter(Predicate::eq("title", "hello world")),
        )
        .await
        .unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(int(&fetched[0], "views"), 3);
}

#[tokio::test]
async fn duplicate_unique_key_is_a_constraint_violation() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, schema) = prepared(&dir).await;
    let executor = QueryExecutor::new(&manager, &schema);

    let insert = Query::insert("api::article.article").value("title", "only once");
    executor.insert(&insert).await.unwrap();

    let err = executor.insert(&insert).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::ConstraintViolation {
            kind: ConstraintKind::Unique,
            ..
        }
    ));
}

#[tokio::test]
async fn joined_fetch_nests_the_related_record() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, schema) = prepared(&dir).await;
    let executor = QueryExecutor::new(&manager, &schema);

    let author = executor
        .insert(&Query::insert("api::author.author").value("name", "ada"))
        .await
        .unwrap();
    let author_id = int(&author, "id");

    executor
        .insert(
            &Query::insert("api::article.article")
                .value("title", "with author")
                .value("author", author_id),
        )
        .await
        .unwrap();
    executor
        .insert(&Query::insert("api::article.article").value("title", "orphan"))
        .await
        .unwrap();

    let records = executor
        .fetch(
            &Query::select("api::article.article")
                .join("author")
                .order_by("title", Order::Asc),
        )
        .await
        .unwrap();
    assert_eq!(records.len(), 2);

    // "orphan" sorts first, then "with author".
    assert!(matches!(records[0].get("author"), Some(FieldValue::One(None))));
    match records[1].get("author") {
        Some(FieldValue::One(Some(nested))) => {
            assert_eq!(
                nested.scalar("name"),
                Some(&SqlValue::Text("ada".to_string()))
            );
        }
        other => panic!("expected nested author, got {other:?}"),
    }
}

#[tokio::test]
async fn update_and_delete_report_affected_counts() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, schema) = prepared(&dir).await;
    let executor = QueryExecutor::new(&manager, &schema);

    for title in ["a", "b", "c"] {
        executor
            .insert(&Query::insert("api::article.article").value("title", title))
            .await
            .unwrap();
    }

    let updated = executor
        .update(
            &Query::update("api::article.article")
                .value("views", 9_i64)
                .filter(Predicate::in_values("title", ["a", "b"])),
        )
        .await
        .unwrap();
    assert_eq!(updated, 2);

    let deleted = executor
        .delete(
            &Query::delete("api::article.article").filter(Predicate::eq("title", "c")),
        )
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let remaining = executor
        .fetch(&Query::select("api::article.article"))
        .await
        .unwrap();
    assert_eq!(remaining.len(), 2);
    for record in &remaining {
        assert_eq!(int(record, "views"), 9);
    }
}

#[tokio::test]
async fn savepoint_rolls_back_without_touching_the_outer_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, schema) = prepared(&dir).await;
    let executor = QueryExecutor::new(&manager, &schema);

    let mut tx = manager.pool().begin().await.unwrap();
    executor
        .insert_with(
            &mut tx,
            &Query::insert("api::author.author").value("name", "kept"),
        )
        .await
        .unwrap();

    let mut nested = manager.savepoint(&mut tx).await.unwrap();
    executor
        .insert_with(
            &mut nested,
            &Query::insert("api::author.author").value("name", "discarded"),
        )
        .await
        .unwrap();
    nested.rollback().await.unwrap();

    tx.commit().await.unwrap();

    let authors = executor
        .fetch(&Query::select("api::author.author"))
        .await
        .unwrap();
    assert_eq!(authors.len(), 1);
    assert_eq!(
        authors[0].scalar("name"),
        Some(&SqlValue::Text("kept".to_string()))
    );
}

#[tokio::test]
async fn transaction_rolls_back_on_error() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, schema) = prepared(&dir).await;
    let executor = QueryExecutor::new(&manager, &schema);

    // The closure borrows the locally built executor; only the
    // transaction itself moves in and out.
    let result: Result<(), CoreError> = manager
        .with_transaction(|mut tx| {
            let executor = &executor;
            async move {
                executor
                    .insert_with(
                        &mut tx,
                        &Query::insert("api::author.author").value("name", "ghost"),
                    )
                    .await?;
                Err(CoreError::Sync {
                    message: "forced failure".to_string(),
                })
            }
        })
        .await;
    assert!(result.is_err());

    let authors = executor
        .fetch(&Query::select("api::author.author"))
        .await
        .unwrap();
    assert!(authors.is_empty());
}

#[tokio::test]
async fn nested_scope_inside_transaction_rolls_back_through_a_savepoint() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, schema) = prepared(&dir).await;
    let executor = QueryExecutor::new(&manager, &schema);

    // `with_transaction` is not reentrant; a nested scope opens a
    // savepoint on the outer transaction instead of a second physical
    // transaction.
    manager
        .with_transaction(|mut tx| {
            let manager = &manager;
            let executor = &executor;
            async move {
                executor
                    .insert_with(
                        &mut tx,
                        &Query::insert("api::author.author").value("name", "kept"),
                    )
                    .await?;

                let mut nested = manager.savepoint(&mut tx).await?;
                executor
                    .insert_with(
                        &mut nested,
                        &Query::insert("api::author.author").value("name", "discarded"),
                    )
                    .await?;
                nested.rollback().await.unwrap();

                Ok((tx, ()))
            }
        })
        .await
        .unwrap();

    let authors = executor
        .fetch(&Query::select("api::author.author"))
        .await
        .unwrap();
    assert_eq!(authors.len(), 1);
    assert_eq!(
        authors[0].scalar("name"),
        Some(&SqlValue::Text("kept".to_string()))
    );
}

#[tokio::test]
async fn concurrent_transactions_on_disjoint_rows_both_commit() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, schema) = prepared(&dir).await;
    let executor = QueryExecutor::new(&manager, &schema);

    for title in ["left", "right"] {
        executor
            .insert(&Query::insert("api::article.article").value("title", title))
            .await
            .unwrap();
    }

    let executor_ref = &executor;
    let first = manager.with_transaction(|mut tx| {
        let query = Query::update("api::article.article")
            .value("views", 1_i64)
            .filter(Predicate::eq("title", "left"));
        async move {
            let n = executor_ref.update_with(&mut tx, &query).await?;
            Ok((tx, n))
        }
    });
    let second = manager.with_transaction(|mut tx| {
        let query = Query::update("api::article.article")
            .value("views", 2_i64)
            .filter(Predicate::eq("title", "right"));
        async move {
            let n = executor_ref.update_with(&mut tx, &query).await?;
            Ok((tx, n))
        }
    });

    let (first, second) = tokio::join!(first, second);
    assert_eq!(first.unwrap(), 1);
    assert_eq!(second.unwrap(), 1);

    let rows = executor
        .fetch(&Query::select("api::article.article").order_by("title", Order::Asc))
        .await
        .unwrap();
    assert_eq!(int(&rows[0], "views"), 1);
    assert_eq!(int(&rows[1], "views"), 2);
}

#[tokio::test]
async fn concurrent_writers_to_the_same_row_serialize() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, schema) = prepared(&dir).await;
    let executor = QueryExecutor::new(&manager, &schema);

    executor
        .insert(&Query::insert("api::article.article").value("title", "contested"))
        .await
        .unwrap();

    let executor_ref = &executor;
    let write = |views: i64| {
        manager.with_transaction(move |mut tx| {
            let query = Query::update("api::article.article")
                .value("views", views)
                .filter(Predicate::eq("title", "contested"));
            async move {
                let n = executor_ref.update_with(&mut tx, &query).await?;
                Ok((tx, n))
            }
        })
    };

    // Both writers target the same row; they serialize on the engine's
    // write lock and both commit.
    let (first, second) = tokio::join!(write(7), write(8));
    assert_eq!(first.unwrap(), 1);
    assert_eq!(second.unwrap(), 1);

    let rows = executor
        .fetch(&Query::select("api::article.article"))
        .await
        .unwrap();
    let views = int(&rows[0], "views");
    assert!(views == 7 || views == 8, "got {views}");
}
