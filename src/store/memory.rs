//! In-process store for tests and local runs.
//!
//! A single mutex guards the map, so the conditional write is atomic with
//! respect to every other call on the same `MemoryStore`.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{TransitionOutcome, WorkItemStore};
use crate::error::{Error, Result};
use crate::model::{AiGenerated, Article, ItemId, ItemStatus};

#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<ItemId, Article>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = Article>) -> Self {
        let store = Self::new();
        for item in items {
            store.insert(item);
        }
        store
    }

    /// Insert or replace an item.
    pub fn insert(&self, item: Article) {
        self.lock().insert(item.id.clone(), item);
    }

    /// Remove an item, as an external actor deleting it would.
    pub fn remove(&self, id: &ItemId) -> Option<Article> {
        self.lock().remove(id)
    }

    /// Make every subsequent call fail with `StoreUnavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of all items, ordered by id.
    pub fn snapshot(&self) -> Vec<Article> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ItemId, Article>> {
        // A poisoned map is still structurally valid; every write is a single assignment.
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::StoreUnavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl WorkItemStore for MemoryStore {
    async fn find_candidate(&self, status: ItemStatus) -> Result<Option<Article>> {
        self.check_available()?;
        Ok(self
            .lock()
            .values()
            .find(|item| item.status == status)
            .cloned())
    }

    async fn transition(
        &self,
        id: &ItemId,
        expected: ItemStatus,
        new: ItemStatus,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        self.check_available()?;
        let mut items = self.lock();
        let Some(item) = items.get_mut(id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if item.status != expected {
            return Ok(TransitionOutcome::Conflict);
        }
        item.status = new;
        item.updated_at = at;
        Ok(TransitionOutcome::Applied)
    }

    async fn get_by_id(&self, id: &ItemId) -> Result<Option<Article>> {
        self.check_available()?;
        Ok(self.lock().get(id).cloned())
    }

    async fn find_stale(
        &self,
        status: ItemStatus,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Article>> {
        self.check_available()?;
        let mut stale: Vec<Article> = self
            .lock()
            .values()
            .filter(|item| item.status == status && item.updated_at < updated_before)
            .cloned()
            .collect();
        stale.sort_by_key(|item| item.updated_at);
        stale.truncate(limit);
        Ok(stale)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    async fn annotate(&self, id: &ItemId, ai_generated: &AiGenerated) -> Result<()> {
        self.check_available()?;
        match self.lock().get_mut(id) {
            Some(item) => {
                item.ai_generated = Some(ai_generated.clone());
                Ok(())
            }
            None => Err(Error::NotFound(format!("article {id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transition_is_conditional_on_current_status() {
        let store = MemoryStore::with_items([Article::received("A1", "hello")]);
        let id = ItemId::from("A1");
        let now = Utc::now();

        let first = store
            .transition(&id, ItemStatus::Received, ItemStatus::Claimed, now)
            .await
            .unwrap();
        let second = store
            .transition(&id, ItemStatus::Received, ItemStatus::Claimed, now)
            .await
            .unwrap();
        let missing = store
            .transition(
                &ItemId::from("nope"),
                ItemStatus::Received,
                ItemStatus::Claimed,
                now,
            )
            .await
            .unwrap();

        assert_eq!(first, TransitionOutcome::Applied);
        assert_eq!(second, TransitionOutcome::Conflict);
        assert_eq!(missing, TransitionOutcome::NotFound);
        assert_eq!(store.get_by_id(&id).await.unwrap().unwrap().updated_at, now);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::with_items([Article::received("A1", "hello")]);
        store.set_unavailable(true);
        let err = store
            .find_candidate(ItemStatus::Received)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        store.set_unavailable(false);
        assert!(
            store
                .find_candidate(ItemStatus::Received)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn find_stale_respects_cutoff_and_limit() {
        let now = Utc::now();
        let mut old = Article::received("old", "");
        old.status = ItemStatus::Claimed;
        old.updated_at = now - chrono::Duration::minutes(10);
        let mut older = Article::received("older", "");
        older.status = ItemStatus::Claimed;
        older.updated_at = now - chrono::Duration::minutes(20);
        let mut fresh = Article::received("fresh", "");
        fresh.status = ItemStatus::Claimed;
        fresh.updated_at = now;
        let store = MemoryStore::with_items([old, older, fresh]);

        let cutoff = now - chrono::Duration::minutes(5);
        let stale = store
            .find_stale(ItemStatus::Claimed, cutoff, 10)
            .await
            .unwrap();
        let ids: Vec<_> = stale.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["older", "old"]);

        let limited = store
            .find_stale(ItemStatus::Claimed, cutoff, 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }
}
