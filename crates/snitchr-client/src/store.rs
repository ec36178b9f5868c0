use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use snitchr_types::api::{FilterKind, ListQuery, NewConfession, PageResponse, Stats};
use snitchr_types::models::{Confession, Reactions};

use crate::error::Result;

/// One page of results plus the number of matches across all pages.
pub type Page = PageResponse;

/// Persistence seam for the list controller. Implementations shape requests
/// and report failures; they hold no list state of their own.
#[async_trait]
pub trait ConfessionStore: Send + Sync {
    /// Page of confessions matching `query`, in its ordering.
    async fn query(&self, query: &ListQuery, page: u32, page_size: u32) -> Result<Page>;

    async fn get(&self, id: &str) -> Result<Confession>;

    /// Returns the canonical record with its assigned id and timestamp.
    async fn create(&self, draft: NewConfession) -> Result<Confession>;

    /// Replaces the whole reactions map of `id`.
    async fn update_reactions(&self, id: &str, reactions: Reactions) -> Result<Confession>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn stats(&self) -> Result<Stats>;

    /// Newest first, unfiltered.
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page> {
        self.query(&ListQuery::default(), page, page_size).await
    }

    async fn search(&self, term: &str, page: u32, page_size: u32) -> Result<Page> {
        let query = ListQuery {
            search: Some(term.to_string()),
            filter: FilterKind::All,
        };
        self.query(&query, page, page_size).await
    }

    async fn filter(&self, kind: FilterKind, page: u32, page_size: u32) -> Result<Page> {
        let query = ListQuery {
            search: None,
            filter: kind,
        };
        self.query(&query, page, page_size).await
    }
}

#[async_trait]
impl<S: ConfessionStore + ?Sized> ConfessionStore for Arc<S> {
    async fn query(&self, query: &ListQuery, page: u32, page_size: u32) -> Result<Page> {
        (**self).query(query, page, page_size).await
    }

    async fn get(&self, id: &str) -> Result<Confession> {
        (**self).get(id).await
    }

    async fn create(&self, draft: NewConfession) -> Result<Confession> {
        (**self).create(draft).await
    }

    async fn update_reactions(&self, id: &str, reactions: Reactions) -> Result<Confession> {
        (**self).update_reactions(id, reactions).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        (**self).delete(id).await
    }

    async fn stats(&self) -> Result<Stats> {
        (**self).stats().await
    }
}

/// Aggregate counters over a set of confessions, `today` counting records
/// created at or after `today_start`.
pub fn summarize(confessions: &[Confession], today_start: DateTime<Utc>) -> Stats {
    Stats {
        total_confessions: confessions.len() as u64,
        today_confessions: confessions
            .iter()
            .filter(|c| c.created_at >= today_start)
            .count() as u64,
        total_reactions: confessions.iter().map(|c| c.reactions.total()).sum(),
    }
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}
