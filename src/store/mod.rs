//! Work item store interface.
//!
//! The store is the only shared mutable state between invocations. Its
//! conditional [`WorkItemStore::transition`] is the claim primitive: nothing
//! in this crate locks in-process across invocations.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{AiGenerated, Article, ItemId, ItemStatus};

pub use memory::MemoryStore;

/// Result of a conditional status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Status was still the expected value and has been replaced.
    Applied,
    /// Someone else changed the status first.
    Conflict,
    /// The item no longer exists.
    NotFound,
}

#[async_trait]
pub trait WorkItemStore: Send + Sync {
    /// Return at most one item currently in `status`. Which one is up to the store.
    async fn find_candidate(&self, status: ItemStatus) -> Result<Option<Article>>;

    /// Atomically move `id` from `expected` to `new`, stamping `updated_at = at`.
    async fn transition(
        &self,
        id: &ItemId,
        expected: ItemStatus,
        new: ItemStatus,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome>;

    /// Plain read by id.
    async fn get_by_id(&self, id: &ItemId) -> Result<Option<Article>>;

    /// Items stuck in `status` since before `updated_before`, oldest first.
    async fn find_stale(
        &self,
        status: ItemStatus,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Article>>;

    /// Write analyzer output. Does not touch status or `updated_at`.
    async fn annotate(&self, id: &ItemId, ai_generated: &AiGenerated) -> Result<()>;

    /// Cheap reachability check for health endpoints.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
