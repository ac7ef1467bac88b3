//! Bounded retry with exponential backoff around any publisher.
//!
//! Each attempt runs under its own timeout; a timed-out attempt counts as a
//! failed one. After `max_attempts` the last failure is returned as
//! [`Error::Publish`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tracing::warn;

use super::Publisher;
use crate::error::{Error, Result};
use crate::model::ItemId;
use crate::telemetry::metrics;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

pub struct RetryingPublisher {
    inner: Arc<dyn Publisher>,
    policy: RetryPolicy,
}

impl RetryingPublisher {
    pub fn new(inner: Arc<dyn Publisher>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Publisher for RetryingPublisher {
    async fn publish(&self, channel: &str, item_id: &ItemId) -> Result<()> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            let result = tokio::time::timeout(
                self.policy.attempt_timeout,
                self.inner.publish(channel, item_id),
            )
            .await;

            let reason = match result {
                Ok(Ok(())) => {
                    metrics::publishes().add(
                        1,
                        &[
                            KeyValue::new("channel", channel.to_string()),
                            KeyValue::new("result", "ok"),
                        ],
                    );
                    return Ok(());
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {:?}", self.policy.attempt_timeout),
            };

            metrics::publishes().add(
                1,
                &[
                    KeyValue::new("channel", channel.to_string()),
                    KeyValue::new("result", "error"),
                ],
            );
            warn!(%item_id, channel, attempt, max_attempts, %reason, "publish attempt failed");
            last_reason = reason;

            if attempt < max_attempts {
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }
        }

        Err(Error::Publish {
            channel: channel.to_string(),
            item_id: item_id.to_string(),
            reason: format!("gave up after {max_attempts} attempts: {last_reason}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            attempt_timeout: Duration::from_millis(200),
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            attempt_timeout: Duration::from_secs(1),
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let bus = Arc::new(MemoryBus::new());
        bus.fail_next(2);
        let publisher = RetryingPublisher::new(bus.clone(), fast_policy(3));

        publisher
            .publish("integration", &ItemId::from("A1"))
            .await
            .unwrap();

        assert_eq!(bus.attempts(), 3);
        assert_eq!(bus.messages("integration"), ["A1"]);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let bus = Arc::new(MemoryBus::new());
        bus.set_failing(true);
        let publisher = RetryingPublisher::new(bus.clone(), fast_policy(2));

        let err = publisher
            .publish("integration", &ItemId::from("A1"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Publish { .. }));
        assert!(err.is_retryable());
        assert_eq!(bus.attempts(), 2);
        assert!(bus.messages("integration").is_empty());
    }
}
