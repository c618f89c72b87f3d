use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use database::Client;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use treeos_client::entities::model::ModelPullEvent;

use crate::config::core_config;

static DB_CLIENT: OnceLock<Client> = OnceLock::new();

pub async fn init_db_client() {
  let client = Client::new(&core_config().db_path)
    .await
    .expect("failed to initialize database client");
  DB_CLIENT
    .set(client)
    .expect("db client initialized twice");
}

pub fn db_client() -> &'static Client {
  DB_CLIENT.get().expect("db client not initialized")
}

/// A bounded id queue. Enqueue past the bound fails instead of
/// blocking the caller.
pub struct IdQueue {
  pub tx: mpsc::Sender<String>,
  pub rx: Mutex<mpsc::Receiver<String>>,
}

impl IdQueue {
  fn new(capacity: usize) -> IdQueue {
    let (tx, rx) = mpsc::channel(capacity);
    IdQueue {
      tx,
      rx: Mutex::new(rx),
    }
  }
}

pub fn op_queue() -> &'static IdQueue {
  static OP_QUEUE: OnceLock<IdQueue> = OnceLock::new();
  OP_QUEUE
    .get_or_init(|| IdQueue::new(core_config().queue_capacity))
}

pub fn model_queue() -> &'static IdQueue {
  static MODEL_QUEUE: OnceLock<IdQueue> = OnceLock::new();
  MODEL_QUEUE
    .get_or_init(|| IdQueue::new(core_config().queue_capacity))
}

/// Per-app serialization points. The at-most-one-in-flight rule
/// is check-then-insert against the database; the check and the
/// insert are only atomic while this lock is held. Inline stops
/// hold it too.
pub fn app_lock(app_id: &str) -> Arc<Mutex<()>> {
  static APP_LOCKS: OnceLock<
    DashMap<String, Arc<Mutex<()>>>,
  > = OnceLock::new();
  APP_LOCKS
    .get_or_init(Default::default)
    .entry(app_id.to_string())
    .or_default()
    .clone()
}

/// In-memory half of the operation cancellation flags, keyed by
/// operation id. The durable half lives on the operation row.
pub fn op_cancels(
) -> &'static DashMap<String, CancellationToken> {
  static OP_CANCELS: OnceLock<
    DashMap<String, CancellationToken>,
  > = OnceLock::new();
  OP_CANCELS.get_or_init(Default::default)
}

/// Cancellation tokens for model downloads, keyed by model name.
/// Present only while a job is queued or processing.
pub fn model_cancels(
) -> &'static DashMap<String, CancellationToken> {
  static MODEL_CANCELS: OnceLock<
    DashMap<String, CancellationToken>,
  > = OnceLock::new();
  MODEL_CANCELS.get_or_init(Default::default)
}

/// Best-effort progress broadcast. Lagging subscribers lose old
/// events; durable state lives in the model records.
pub fn model_events() -> &'static broadcast::Sender<ModelPullEvent>
{
  static MODEL_EVENTS: OnceLock<
    broadcast::Sender<ModelPullEvent>,
  > = OnceLock::new();
  MODEL_EVENTS.get_or_init(|| broadcast::channel(64).0)
}

pub fn subscribe_model_events(
) -> broadcast::Receiver<ModelPullEvent> {
  model_events().subscribe()
}
