//! Pull transport: poll a pgmq trigger queue.
//!
//! A read hides the message for `visibility_timeout` seconds. Ack and Reject
//! archive it; Nack leaves it alone so it reappears once the timeout lapses,
//! which is the queue's native redelivery.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{Instrument, error, info, info_span, warn};

use super::{Disposition, decode_queue_message, dispatch};
use crate::db::Db;
use crate::db::pgmq::PgmqMessage;
use crate::engine::ClaimEngine;
use crate::error::Result;

/// Configuration for the queue poller.
#[derive(Debug, Clone)]
pub struct PullConfig {
    pub queue: String,
    /// Visibility timeout (seconds) for pgmq reads.
    pub visibility_timeout: i32,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
}

impl PullConfig {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            visibility_timeout: 60,
            poll_interval: Duration::from_secs(2),
        }
    }
}

pub struct QueueTrigger {
    db: Arc<Db>,
    engine: Arc<ClaimEngine>,
    config: PullConfig,
    shutdown: Arc<Notify>,
}

impl QueueTrigger {
    pub fn new(
        db: Arc<Db>,
        engine: Arc<ClaimEngine>,
        config: PullConfig,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            db,
            engine,
            config,
            shutdown,
        }
    }

    /// Poll until shutdown. Queue errors are logged and retried after the poll interval.
    pub async fn run(&self) -> Result<()> {
        self.db.create_queue(&self.config.queue).await?;
        info!(queue = %self.config.queue, "pull trigger started");

        loop {
            let handled = tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("pull trigger shutting down");
                    return Ok(());
                }
                handled = self.poll_once() => handled,
            };

            match handled {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!("pull trigger error: {e}"),
            }

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("pull trigger shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Read and handle at most one message. Returns its disposition, or
    /// `None` when the queue was empty.
    pub async fn poll_once(&self) -> Result<Option<Disposition>> {
        let Some(msg) = self
            .db
            .read_from_queue(&self.config.queue, self.config.visibility_timeout)
            .await?
        else {
            return Ok(None);
        };

        let span = info_span!("trigger.pull", msg_id = msg.msg_id, read_ct = msg.read_ct);
        self.handle(msg).instrument(span).await.map(Some)
    }

    async fn handle(&self, msg: PgmqMessage) -> Result<Disposition> {
        let decoded = decode_queue_message(&msg.message)
            .map(|trigger| trigger.with_message_id(msg.msg_id.to_string()));
        let disposition = dispatch(&self.engine, decoded).await;
        match disposition {
            Disposition::Ack => {
                self.db.archive_message(&self.config.queue, msg.msg_id).await?;
            }
            Disposition::Reject => {
                error!(payload = %msg.message, "archiving unusable trigger");
                self.db.archive_message(&self.config.queue, msg.msg_id).await?;
            }
            Disposition::Nack => {
                warn!(
                    visibility_timeout = self.config.visibility_timeout,
                    "leaving trigger for redelivery"
                );
            }
        }
        Ok(disposition)
    }
}
