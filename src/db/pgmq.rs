//! pgmq queue operations via direct SQLx.
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.read,
//! pgmq.archive. The downstream channel and the pull-trigger queue are
//! both pgmq queues.

use async_trait::async_trait;
use opentelemetry::KeyValue;

use crate::bus::Publisher;
use crate::error::{Error, Result};
use crate::model::ItemId;
use crate::telemetry::metrics;

/// A message read from a pgmq queue.
#[derive(Debug, Clone)]
pub struct PgmqMessage {
    pub msg_id: i64,
    pub read_ct: i32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub message: serde_json::Value,
}

fn count(queue_name: &str, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue_name.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}

impl super::Db {
    /// Create a pgmq queue (idempotent).
    pub async fn create_queue(&self, queue_name: &str) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await?;
        count(queue_name, "create");
        Ok(())
    }

    /// Send a message to a pgmq queue. Returns the message ID.
    pub async fn send_to_queue(&self, queue_name: &str, payload: &serde_json::Value) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, 0)")
            .bind(queue_name)
            .bind(payload)
            .fetch_one(&self.pool)
            .await?;
        count(queue_name, "send");
        Ok(row.0)
    }

    /// Read the next message from a queue (visibility timeout in seconds).
    /// Returns None if queue is empty.
    pub async fn read_from_queue(
        &self,
        queue_name: &str,
        vt_seconds: i32,
    ) -> Result<Option<PgmqMessage>> {
        let row = sqlx::query_as::<
            _,
            (
                i64,
                i32,
                chrono::DateTime<chrono::Utc>,
                serde_json::Value,
            ),
        >("SELECT msg_id, read_ct, enqueued_at, message FROM pgmq.read($1, $2, 1)")
        .bind(queue_name)
        .bind(vt_seconds)
        .fetch_optional(&self.pool)
        .await?;

        let msg = row.map(|(msg_id, read_ct, enqueued_at, message)| PgmqMessage {
            msg_id,
            read_ct,
            enqueued_at,
            message,
        });

        count(
            queue_name,
            if msg.is_some() { "read" } else { "read_empty" },
        );
        Ok(msg)
    }

    /// Archive a message (moves to archive table, preserves for audit).
    pub async fn archive_message(&self, queue_name: &str, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;
        count(queue_name, "archive");
        Ok(())
    }
}

/// Downstream notifications are the bare id as a JSON string.
#[async_trait]
impl Publisher for super::Db {
    async fn publish(&self, channel: &str, item_id: &ItemId) -> Result<()> {
        let payload = serde_json::Value::String(item_id.to_string());
        self.send_to_queue(channel, &payload)
            .await
            .map(|_| ())
            .map_err(|e| Error::Publish {
                channel: channel.to_string(),
                item_id: item_id.to_string(),
                reason: e.to_string(),
            })
    }
}
