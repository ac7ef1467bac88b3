//! Notification publisher interface.
//!
//! A publish either definitely succeeded or definitely failed. Retry policy
//! lives in [`retry::RetryingPublisher`], not in the individual backends.

pub mod memory;
pub mod retry;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::ItemId;

pub use memory::MemoryBus;
pub use retry::{RetryPolicy, RetryingPublisher};

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one item id to a named channel.
    async fn publish(&self, channel: &str, item_id: &ItemId) -> Result<()>;
}
