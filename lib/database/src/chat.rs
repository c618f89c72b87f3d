use anyhow::Context;
use sqlx::{FromRow, SqlitePool};
use treeos_client::entities::chat::{
  ChatMessage, SenderType, StatusLevel,
};

#[derive(Debug, Clone)]
pub struct ChatMessages {
  pool: SqlitePool,
}

#[derive(FromRow)]
struct ChatMessageRow {
  app_id: String,
  timestamp: i64,
  message: String,
  sender_type: String,
  sender_name: String,
  status_level: String,
  agent_model: Option<String>,
  agent_provider: Option<String>,
  details: Option<String>,
}

impl TryFrom<ChatMessageRow> for ChatMessage {
  type Error = anyhow::Error;
  fn try_from(row: ChatMessageRow) -> anyhow::Result<ChatMessage> {
    Ok(ChatMessage {
      sender_type: row
        .sender_type
        .parse::<SenderType>()
        .with_context(|| {
          format!("bad sender_type: {}", row.sender_type)
        })?,
      status_level: row
        .status_level
        .parse::<StatusLevel>()
        .with_context(|| {
          format!("bad status_level: {}", row.status_level)
        })?,
      details: row
        .details
        .as_deref()
        .and_then(|details| serde_json::from_str(details).ok()),
      app_id: row.app_id,
      timestamp: row.timestamp,
      message: row.message,
      sender_name: row.sender_name,
      agent_model: row.agent_model,
      agent_provider: row.agent_provider,
    })
  }
}

impl ChatMessages {
  pub fn new(pool: &SqlitePool) -> ChatMessages {
    ChatMessages { pool: pool.clone() }
  }

  pub async fn append(
    &self,
    message: &ChatMessage,
  ) -> anyhow::Result<()> {
    sqlx::query(
      "INSERT INTO chat_messages
        (app_id, timestamp, message, sender_type, sender_name,
         status_level, agent_model, agent_provider, details)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&message.app_id)
    .bind(message.timestamp)
    .bind(&message.message)
    .bind(message.sender_type.to_string())
    .bind(&message.sender_name)
    .bind(message.status_level.to_string())
    .bind(&message.agent_model)
    .bind(&message.agent_provider)
    .bind(message.details.as_ref().map(|d| d.to_string()))
    .execute(&self.pool)
    .await
    .context("failed to append chat message")?;
    Ok(())
  }

  /// Newest first, always.
  pub async fn list(
    &self,
    app_id: &str,
    limit: i64,
  ) -> anyhow::Result<Vec<ChatMessage>> {
    let rows = sqlx::query_as::<_, ChatMessageRow>(
      "SELECT app_id, timestamp, message, sender_type, sender_name,
              status_level, agent_model, agent_provider, details
       FROM chat_messages WHERE app_id = ?
       ORDER BY timestamp DESC LIMIT ?",
    )
    .bind(app_id)
    .bind(limit)
    .fetch_all(&self.pool)
    .await
    .context("failed to list chat messages")?;
    rows.into_iter().map(ChatMessage::try_from).collect()
  }

  /// Drop the stream of a deleted app.
  pub async fn delete_for_app(
    &self,
    app_id: &str,
  ) -> anyhow::Result<u64> {
    let res = sqlx::query(
      "DELETE FROM chat_messages WHERE app_id = ?",
    )
    .bind(app_id)
    .execute(&self.pool)
    .await
    .context("failed to delete chat messages")?;
    Ok(res.rows_affected())
  }
}
