use database::{Client, migrate};
use sqlx::Row;

async fn schema_dump(pool: &sqlx::SqlitePool) -> Vec<String> {
  sqlx::query(
    "SELECT name, sql FROM sqlite_master
     WHERE type IN ('table', 'index') ORDER BY name",
  )
  .fetch_all(pool)
  .await
  .unwrap()
  .into_iter()
  .map(|row| {
    format!(
      "{}|{}",
      row.get::<String, _>("name"),
      row.get::<Option<String>, _>("sql").unwrap_or_default()
    )
  })
  .collect()
}

#[tokio::test]
async fn migrations_are_idempotent() {
  let dir = tempfile::tempdir().unwrap();
  let pool =
    database::init(&dir.path().join("treeos.sqlite")).await.unwrap();

  migrate(&pool).await.unwrap();
  let first = schema_dump(&pool).await;

  // Running again must add no columns and leave the schema
  // byte-identical.
  migrate(&pool).await.unwrap();
  let second = schema_dump(&pool).await;

  assert_eq!(first, second);
}

#[tokio::test]
async fn missing_columns_are_added() {
  let dir = tempfile::tempdir().unwrap();
  let pool =
    database::init(&dir.path().join("treeos.sqlite")).await.unwrap();

  // A database created by an earlier version: operations without
  // the metadata column, chat without agent attribution.
  sqlx::query(
    "CREATE TABLE docker_operations (
      id TEXT PRIMARY KEY,
      operation_type TEXT NOT NULL,
      app_id TEXT NOT NULL,
      status TEXT NOT NULL,
      created_at INTEGER NOT NULL,
      updated_at INTEGER NOT NULL
    )",
  )
  .execute(&pool)
  .await
  .unwrap();
  sqlx::query(
    "CREATE TABLE chat_messages (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      app_id TEXT NOT NULL,
      timestamp INTEGER NOT NULL,
      message TEXT NOT NULL,
      sender_type TEXT NOT NULL
    )",
  )
  .execute(&pool)
  .await
  .unwrap();

  migrate(&pool).await.unwrap();

  for (table, column) in [
    ("docker_operations", "metadata"),
    ("docker_operations", "progress"),
    ("docker_operations", "completed_at"),
    ("chat_messages", "agent_model"),
    ("chat_messages", "agent_provider"),
    ("chat_messages", "status_level"),
  ] {
    assert!(
      database::column_exists(&pool, table, column)
        .await
        .unwrap(),
      "{table}.{column} missing after migration"
    );
  }
}

#[tokio::test]
async fn client_initializes_and_queries() {
  let dir = tempfile::tempdir().unwrap();
  let client =
    Client::new(&dir.path().join("treeos.sqlite")).await.unwrap();

  assert!(client.operations.list(None, 10).await.unwrap().is_empty());
  assert!(client.models.list().await.unwrap().is_empty());
  assert!(client.users.list().await.unwrap().is_empty());
}
