use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use snitchr_types::ValidationError;
use snitchr_types::api::{ListQuery, NewConfession, Stats};
use snitchr_types::events::ChangeEvent;
use snitchr_types::models::{Confession, Reactions};

use crate::error::{Result, StoreError};
use crate::feed::FeedSubscription;
use crate::store::{ConfessionStore, Page, start_of_day, summarize};

const FEED_CAPACITY: usize = 1024;

/// In-process store with the same query semantics as the server. Every
/// write is published on its own change feed.
pub struct MemoryStore {
    records: Mutex<Vec<Confession>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_confessions(Vec::new())
    }

    pub fn with_confessions(records: Vec<Confession>) -> Self {
        let (changes, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            records: Mutex::new(records),
            changes,
        }
    }

    /// Live feed of this store's writes. Must be called inside a runtime.
    pub fn subscribe(&self) -> FeedSubscription {
        FeedSubscription::from_broadcast(self.changes.subscribe())
    }

    /// Every stored record, newest first.
    pub fn snapshot(&self) -> Vec<Confession> {
        let mut records = self.records().clone();
        let query = ListQuery::default();
        records.sort_by(|a, b| ordering(&query, a, b));
        records
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores a record as-is, bypassing validation, and publishes it.
    pub fn insert(&self, record: Confession) {
        self.records().push(record.clone());
        self.publish(ChangeEvent::Insert(record));
    }

    fn records(&self) -> MutexGuard<'_, Vec<Confession>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: ChangeEvent) {
        debug!("Memory store {} {}", event.kind(), event.id());
        // No subscribers is fine.
        let _ = self.changes.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn ordering(query: &ListQuery, a: &Confession, b: &Confession) -> Ordering {
    if query.precedes(a, b) {
        Ordering::Less
    } else if query.precedes(b, a) {
        Ordering::Greater
    } else {
        a.id.cmp(&b.id)
    }
}

#[async_trait]
impl ConfessionStore for MemoryStore {
    async fn query(&self, query: &ListQuery, page: u32, page_size: u32) -> Result<Page> {
        if page_size == 0 {
            return Err(ValidationError::InvalidPageSize.into());
        }
        let mut matching: Vec<Confession> = self
            .records()
            .iter()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();
        matching.sort_by(|a, b| ordering(query, a, b));

        let total = matching.len() as u64;
        let offset = page as usize * page_size as usize;
        let confessions = matching
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .collect();
        Ok(Page { confessions, total })
    }

    async fn get(&self, id: &str) -> Result<Confession> {
        self.records()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()).into())
    }

    async fn create(&self, draft: NewConfession) -> Result<Confession> {
        let draft = draft.validated()?;
        let record = Confession {
            id: Uuid::new_v4().to_string(),
            message: draft.message,
            nickname: draft.nickname,
            mood: draft.mood,
            location: draft.location,
            created_at: Utc::now(),
            reactions: Reactions::default(),
        };
        self.insert(record.clone());
        Ok(record)
    }

    async fn update_reactions(&self, id: &str, reactions: Reactions) -> Result<Confession> {
        let updated = {
            let mut records = self.records();
            let record = records
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            record.reactions = reactions;
            record.clone()
        };
        self.publish(ChangeEvent::Update(updated.clone()));
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let removed = {
            let mut records = self.records();
            let index = records
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            records.remove(index)
        };
        self.publish(ChangeEvent::Delete(removed));
        Ok(())
    }

    async fn stats(&self) -> Result<Stats> {
        let today = start_of_day(Utc::now());
        Ok(summarize(&self.records(), today))
    }
}
