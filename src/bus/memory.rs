//! Recording publisher for tests and local runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use super::Publisher;
use crate::error::{Error, Result};
use crate::model::ItemId;

#[derive(Default)]
pub struct MemoryBus {
    published: Mutex<HashMap<String, Vec<String>>>,
    fail_next: AtomicUsize,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` publishes, then recover.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fail every publish until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Payloads delivered to `channel`, in publish order.
    pub fn messages(&self, channel: &str) -> Vec<String> {
        self.lock().get(channel).cloned().unwrap_or_default()
    }

    /// Publish calls seen, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<String>>> {
        self.published.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn should_fail(&self) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Publisher for MemoryBus {
    async fn publish(&self, channel: &str, item_id: &ItemId) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.should_fail() {
            return Err(Error::Publish {
                channel: channel.to_string(),
                item_id: item_id.to_string(),
                reason: "memory bus rejected the message".to_string(),
            });
        }
        self.lock()
            .entry(channel.to_string())
            .or_default()
            .push(item_id.to_string());
        Ok(())
    }
}
