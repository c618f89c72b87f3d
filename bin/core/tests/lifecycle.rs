//! Install / start flows wired through the real engine,
//! validator, and database, without a container runtime.

use std::path::Path;

use database::Client;
use treeos_core::{
  engine,
  startup::recover_operations,
  validate::{ValidateCtx, validate_compose},
};
use treeos_client::{
  entities::operation::{
    Operation, OperationStatus, OperationType,
  },
  error::ValidationRule,
};

fn ctx(app_id: &str) -> ValidateCtx<'_> {
  ValidateCtx {
    app_id,
    apps_mount_root: Path::new("/mnt/apps"),
    shared_models_root: Path::new("/mnt/models"),
  }
}

const NGINX_COMPOSE: &str = "\
services:
  web1:
    image: nginx:alpine
    ports:
      - 8080:80
";

fn app_files(id: &str) -> engine::AppFiles {
  engine::AppFiles {
    manifest: treeos_client::entities::app::AppManifest {
      id: id.to_string(),
      name: id.to_string(),
      primary_service: "web1".into(),
      expected_services: vec!["web1".into()],
      initial_setup_required: false,
      icon: None,
    },
    compose_contents: NGINX_COMPOSE.to_string(),
    env_contents: engine::render_env("ontree", id),
  }
}

/// Create refuses a rejected document before any file is written,
/// and a later start-style validation of the same document
/// produces the identical error set.
#[tokio::test]
async fn rejected_compose_is_refused_identically() {
  let root = tempfile::tempdir().unwrap();
  let privileged = "\
services:
  bad:
    image: nginx:alpine
    privileged: true
";

  let at_create =
    validate_compose(privileged, &ctx("bad1")).unwrap_err();
  assert_eq!(at_create[0].rule, ValidationRule::Privileged);

  // The engine is never reached with a rejected document.
  assert!(!root.path().join("bad1").exists());

  // The same document re-read at start time fails the same way.
  let at_start =
    validate_compose(privileged, &ctx("bad1")).unwrap_err();
  assert_eq!(at_create, at_start);
}

#[tokio::test]
async fn rejected_bind_mount_names_the_rule() {
  let compose = "\
services:
  bad2:
    image: nginx:alpine
    volumes:
      - /etc:/host-etc
";
  let errors =
    validate_compose(compose, &ctx("bad2")).unwrap_err();
  assert_eq!(errors.len(), 1);
  assert_eq!(errors[0].rule, ValidationRule::BindMount);
  assert_eq!(errors[0].service.as_deref(), Some("bad2"));
}

/// The accepted path: files land on disk, re-read yields the
/// same content, and the stored compose still validates.
#[tokio::test]
async fn accepted_app_round_trips_and_revalidates() {
  let root = tempfile::tempdir().unwrap();
  let files = app_files("web1");

  validate_compose(&files.compose_contents, &ctx("web1"))
    .unwrap();
  engine::create_app_files(root.path(), "web1", &files)
    .await
    .unwrap();

  let back = engine::read_app_files(root.path(), "web1", "ontree")
    .await
    .unwrap();
  assert_eq!(back.compose_contents, files.compose_contents);
  // What the engine stored is what every start re-validates.
  validate_compose(&back.compose_contents, &ctx("web1"))
    .unwrap();
}

/// A crash mid-start: the stale row fails on recovery, the app is
/// unblocked, and a fresh operation can be recorded.
#[tokio::test]
async fn stale_operation_recovery_unblocks_the_app() {
  let dir = tempfile::tempdir().unwrap();
  let db = Client::new(&dir.path().join("treeos.sqlite"))
    .await
    .unwrap();

  let op = Operation::new(
    OperationType::Start,
    "web1",
    serde_json::json!({}),
  );
  db.operations.create(&op).await.unwrap();
  db.operations.set_in_progress(&op.id).await.unwrap();
  // Push the last update past the stale threshold.
  sqlx::query(
    "UPDATE docker_operations SET updated_at = updated_at - ?
     WHERE id = ?",
  )
  .bind(10 * 60_000)
  .bind(&op.id)
  .execute(&db.pool)
  .await
  .unwrap();

  let (tx, _rx) = tokio::sync::mpsc::channel(8);
  recover_operations(&db, &tx, 5 * 60_000).await.unwrap();

  let recovered =
    db.operations.get(&op.id).await.unwrap().unwrap();
  assert_eq!(recovered.status, OperationStatus::Failed);
  assert_eq!(recovered.error_message, "stale");

  // Nothing blocks the next start.
  assert!(
    db.operations
      .active_for_app("web1")
      .await
      .unwrap()
      .is_none()
  );
  let next = Operation::new(
    OperationType::Start,
    "web1",
    serde_json::json!({}),
  );
  db.operations.create(&next).await.unwrap();
  let active = db
    .operations
    .active_for_app("web1")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(active.id, next.id);
}
