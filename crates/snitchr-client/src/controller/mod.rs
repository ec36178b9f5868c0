//! The confession list controller.
//!
//! One owned instance holds the authoritative list. User actions are applied
//! optimistically as [`Mutation`] records and reverted if the store refuses
//! them; realtime changes are merged by id, so replays and echoes of our own
//! writes are harmless. All list state sits behind a single mutex that is
//! never held across an `.await`.

mod events;
mod mutation;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use snitchr_types::api::{DEFAULT_PAGE_SIZE, FilterKind, ListQuery, NewConfession, Stats};
use snitchr_types::events::ChangeEvent;
use snitchr_types::models::{Confession, ReactionKind, Reactions};

use crate::error::{ClientError, Result};
use crate::feed::{FeedEvent, FeedSubscription};
use crate::store::{ConfessionStore, Page, start_of_day, summarize};

pub use events::ListEvent;
pub use mutation::Mutation;

/// Prefix of the temporary ids given to entries awaiting confirmation.
pub const PROVISIONAL_PREFIX: &str = "local-";

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    pub page_size: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadMode {
    Append,
    Replace,
}

#[derive(Debug)]
struct ListState {
    entries: Vec<Confession>,
    query: ListQuery,
    /// Highest page loaded under the current generation.
    page: Option<u32>,
    has_more: bool,
    loads_in_flight: u32,
    /// Bumped whenever in-flight page responses become meaningless.
    generation: u64,
    /// Ids with a pending `remove`, flagged once the feed reports the delete.
    pending_removals: HashMap<String, bool>,
    /// Changes made while a page request is running.
    log: LoadLog,
    last_error: Option<ClientError>,
    disposed: bool,
}

impl ListState {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            query: ListQuery::default(),
            page: None,
            has_more: true,
            loads_in_flight: 0,
            generation: 0,
            pending_removals: HashMap::new(),
            log: LoadLog::default(),
            last_error: None,
            disposed: false,
        }
    }

    fn loading(&self) -> bool {
        self.loads_in_flight > 0
    }

    fn log_insert(&mut self, record: &Confession) {
        if self.loading() {
            self.log.insert(record.clone());
        }
    }

    fn log_update(&mut self, record: &Confession) {
        if self.loading() {
            self.log.update(record.clone());
        }
    }

    fn log_delete(&mut self, id: &str) {
        if self.loading() {
            self.log.delete(id);
        }
    }

    /// Drops records deleted, or being removed, since the page was requested.
    fn screen(&self, mut records: Vec<Confession>) -> Vec<Confession> {
        records.retain(|c| !self.log.tombstones.contains(&c.id) && !self.pending_removals.contains_key(&c.id));
        records
    }

    /// Reapplies the logged inserts and updates over a freshly landed page.
    fn replay_log(&mut self) {
        let log = std::mem::take(&mut self.log);
        for entry in &mut self.entries {
            if let Some(record) = log.updates.get(&entry.id) {
                *entry = record.clone();
            }
        }
        for record in &log.inserts {
            if self.position(&record.id).is_none() && self.query.matches(record) {
                let index = self.insert_position(record);
                self.entries.insert(index, record.clone());
            }
        }
        self.log = log;
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|c| c.id == id)
    }

    /// Position of a confirmed entry. Provisional entries have no store
    /// record to act on yet.
    fn confirmed_position(&self, id: &str) -> Option<usize> {
        if id.starts_with(PROVISIONAL_PREFIX) {
            return None;
        }
        self.position(id)
    }

    /// Where `record` belongs under the active ordering, ahead of the first
    /// entry it precedes.
    fn insert_position(&self, record: &Confession) -> usize {
        self.entries
            .iter()
            .position(|e| self.query.precedes(record, e))
            .unwrap_or(self.entries.len())
    }

    /// Appends records whose ids are not present yet. Returns how many were
    /// added.
    fn append(&mut self, records: Vec<Confession>) -> usize {
        let before = self.entries.len();
        for record in records {
            if self.position(&record.id).is_none() {
                self.entries.push(record);
            }
        }
        self.entries.len() - before
    }
}

/// What happened to the list while a page was on its way. A page reflects
/// the store as of the request, so anything merged or deleted since then is
/// replayed over it when it lands.
#[derive(Debug, Default)]
struct LoadLog {
    tombstones: HashSet<String>,
    inserts: Vec<Confession>,
    updates: HashMap<String, Confession>,
}

impl LoadLog {
    fn insert(&mut self, record: Confession) {
        self.tombstones.remove(&record.id);
        self.updates.remove(&record.id);
        self.inserts.retain(|c| c.id != record.id);
        self.inserts.push(record);
    }

    fn update(&mut self, record: Confession) {
        match self.inserts.iter_mut().find(|c| c.id == record.id) {
            Some(slot) => *slot = record,
            None => {
                self.updates.insert(record.id.clone(), record);
            }
        }
    }

    fn delete(&mut self, id: &str) {
        self.inserts.retain(|c| c.id != id);
        self.updates.remove(id);
        self.tombstones.insert(id.to_string());
    }
}

pub struct ListController<S> {
    store: S,
    config: ControllerConfig,
    state: Mutex<ListState>,
    events: broadcast::Sender<ListEvent>,
    feed_task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: ConfessionStore> ListController<S> {
    pub fn new(store: S, config: ControllerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            config,
            state: Mutex::new(ListState::new()),
            events,
            feed_task: Mutex::new(None),
        }
    }

    /// Starts the list under `query` instead of the default newest-first
    /// listing.
    pub fn with_query(mut self, query: ListQuery) -> Self {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner).query = query;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ListEvent> {
        self.events.subscribe()
    }

    // -- Lifecycle --

    /// Loads page 0.
    pub async fn init(&self) -> Result<()> {
        info!("Initialising confession list (page size {})", self.config.page_size);
        self.refresh().await
    }

    /// Spawns the task merging `feed` into the list, replacing any previous
    /// one. A `Gap` triggers a refresh.
    pub fn attach_feed(self: &Arc<Self>, mut feed: FeedSubscription)
    where
        S: 'static,
    {
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(event) = feed.next().await {
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                match event {
                    FeedEvent::Change(change) => {
                        controller.apply_change(change);
                    }
                    FeedEvent::Gap { missed } => {
                        warn!("Change feed gap ({} missed), refreshing", missed);
                        controller.note_error(ClientError::FeedGap { missed });
                        if let Err(e) = controller.refresh().await {
                            warn!("Refresh after feed gap failed: {}", e);
                        }
                    }
                }
            }
            debug!("Feed merge task finished");
        });

        if let Some(previous) = self.feed_slot().replace(task) {
            previous.abort();
        }
    }

    /// Stops the feed task and invalidates every in-flight page request.
    pub fn dispose(&self) {
        if let Some(task) = self.feed_slot().take() {
            task.abort();
        }
        let mut state = self.lock();
        state.generation += 1;
        state.loads_in_flight = 0;
        state.log = LoadLog::default();
        state.disposed = true;
        info!("Confession list disposed");
    }

    // -- Loading --

    /// Appends `page` of the current query, skipping ids already listed.
    pub async fn load(&self, page: u32) -> Result<()> {
        let (generation, query) = {
            let mut state = self.lock();
            if state.disposed {
                return Ok(());
            }
            state.loads_in_flight += 1;
            (state.generation, state.query.clone())
        };
        self.run_load(generation, query, page, LoadMode::Append).await
    }

    /// Loads the page after the last one loaded. Returns false without
    /// touching the store while a load is running or nothing is left.
    pub async fn load_more(&self) -> Result<bool> {
        let (generation, query, page) = {
            let mut state = self.lock();
            if state.disposed || state.loads_in_flight > 0 || !state.has_more {
                return Ok(false);
            }
            state.loads_in_flight += 1;
            let next = state.page.map_or(0, |p| p + 1);
            (state.generation, state.query.clone(), next)
        };
        self.run_load(generation, query, page, LoadMode::Append).await?;
        Ok(true)
    }

    /// Refetches page 0 and replaces the list with it. The old entries stay
    /// visible until the new page arrives.
    pub async fn refresh(&self) -> Result<()> {
        let (generation, query) = {
            let mut state = self.lock();
            if state.disposed {
                return Ok(());
            }
            state.generation += 1;
            state.loads_in_flight = 1;
            state.log = LoadLog::default();
            (state.generation, state.query.clone())
        };
        self.run_load(generation, query, 0, LoadMode::Replace).await
    }

    pub async fn set_search_term(&self, term: impl Into<String>) -> Result<()> {
        let term = term.into();
        {
            let mut state = self.lock();
            let trimmed = term.trim();
            state.query.search = (!trimmed.is_empty()).then(|| trimmed.to_string());
        }
        self.refresh().await
    }

    pub async fn set_filter(&self, filter: FilterKind) -> Result<()> {
        self.lock().query.filter = filter;
        self.refresh().await
    }

    async fn run_load(&self, generation: u64, query: ListQuery, page: u32, mode: LoadMode) -> Result<()> {
        let result = self.store.query(&query, page, self.config.page_size).await;

        let outcome = {
            let mut state = self.lock();
            if state.generation != generation {
                debug!(
                    "Discarding stale page {} (generation {}, now {})",
                    page, generation, state.generation
                );
                return Ok(());
            }
            state.loads_in_flight = state.loads_in_flight.saturating_sub(1);
            let outcome = match result {
                Ok(Page { confessions, total }) => {
                    let confessions = state.screen(confessions);
                    let event = match mode {
                        LoadMode::Append => {
                            let count = state.append(confessions);
                            state.page = Some(state.page.map_or(page, |p| p.max(page)));
                            state.replay_log();
                            ListEvent::Loaded { page, count }
                        }
                        LoadMode::Replace => {
                            // Entries still awaiting confirmation are not in
                            // any page yet.
                            state.entries.retain(|c| c.id.starts_with(PROVISIONAL_PREFIX));
                            state.append(confessions);
                            state.page = Some(page);
                            state.replay_log();
                            ListEvent::Refreshed {
                                count: state.entries.len(),
                            }
                        }
                    };
                    let loaded = (u64::from(page) + 1) * u64::from(self.config.page_size);
                    state.has_more = loaded < total;
                    Ok(event)
                }
                Err(e) => {
                    state.last_error = Some(e.clone());
                    Err(e)
                }
            };
            if !state.loading() {
                state.log = LoadLog::default();
            }
            outcome
        };

        match outcome {
            Ok(event) => {
                debug!("Page {} loaded: {:?}", page, event);
                self.emit(event);
                Ok(())
            }
            Err(e) => {
                warn!("Loading page {} failed: {}", page, e);
                self.emit(ListEvent::Error(e.clone()));
                Err(e)
            }
        }
    }

    // -- Optimistic mutations --

    /// Validates `draft`, shows it at the top under a provisional id and
    /// swaps in the canonical record once the store accepts it. A draft the
    /// active search or filter excludes is posted without being listed.
    pub async fn add(&self, draft: NewConfession) -> Result<Confession> {
        let draft = draft.validated()?;

        let provisional = Confession {
            id: format!("{PROVISIONAL_PREFIX}{}", Uuid::new_v4()),
            message: draft.message.clone(),
            nickname: draft.nickname.clone(),
            mood: draft.mood,
            location: draft.location,
            created_at: Utc::now(),
            reactions: Reactions::default(),
        };
        let mutation = Mutation::Insert {
            index: 0,
            entry: provisional.clone(),
        };
        let listed = {
            let mut state = self.lock();
            state.query.matches(&provisional) && mutation.apply(&mut state.entries)
        };
        if !listed {
            debug!("New confession is outside the active query, not listing it");
        }
        self.emit(ListEvent::Added {
            provisional_id: provisional.id.clone(),
        });

        match self.store.create(draft).await {
            Ok(canonical) => {
                {
                    let mut state = self.lock();
                    let canonical_listed = state.position(&canonical.id).is_some();
                    match state.position(&provisional.id) {
                        // The feed got there first.
                        Some(i) if canonical_listed => {
                            state.entries.remove(i);
                        }
                        Some(i) => {
                            state.entries[i] = canonical.clone();
                            state.log_insert(&canonical);
                        }
                        None => debug!("Provisional {} is not listed", provisional.id),
                    }
                }
                info!("Confession {} created", canonical.id);
                self.emit(ListEvent::AddConfirmed {
                    provisional_id: provisional.id,
                    id: canonical.id.clone(),
                });
                Ok(canonical)
            }
            Err(e) => Err(self.roll_back(&mutation, e)),
        }
    }

    /// Flips `kind` on confession `id` right away. A store failure restores
    /// the exact previous reactions.
    pub async fn toggle_reaction(&self, id: &str, kind: ReactionKind) -> Result<()> {
        let (mutation, reactions) = {
            let mut state = self.lock();
            let Some(before) = state.confirmed_position(id).map(|i| state.entries[i].clone()) else {
                warn!("Ignoring {} reaction on unlisted confession {}", kind, id);
                return Ok(());
            };
            let reactions = before.reactions.toggled(kind)?;
            let after = Confession {
                reactions,
                ..before.clone()
            };
            state.log_update(&after);
            let mutation = Mutation::Replace { before, after };
            mutation.apply(&mut state.entries);
            (mutation, reactions)
        };
        self.emit(ListEvent::ReactionToggled {
            id: id.to_string(),
            kind,
            reacted: reactions.get(kind).reacted,
        });

        match self.store.update_reactions(id, reactions).await {
            Ok(_) => {
                debug!("{} reaction on {} confirmed", kind, id);
                Ok(())
            }
            Err(e) => Err(self.roll_back(&mutation, e)),
        }
    }

    /// Removes confession `id` right away. A store failure puts it back where
    /// it was, unless the feed reported the delete in the meantime.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let mutation = {
            let mut state = self.lock();
            let Some(index) = state.confirmed_position(id) else {
                warn!("Ignoring removal of unlisted confession {}", id);
                return Ok(());
            };
            let mutation = Mutation::Remove {
                index,
                entry: state.entries[index].clone(),
            };
            mutation.apply(&mut state.entries);
            state.pending_removals.insert(id.to_string(), false);
            mutation
        };
        self.emit(ListEvent::Removed { id: id.to_string() });

        let result = self.store.delete(id).await;
        let deleted_remotely = {
            let mut state = self.lock();
            if result.is_ok() {
                state.log_delete(id);
            }
            state.pending_removals.remove(id).unwrap_or(false)
        };

        match result {
            Ok(()) => {
                info!("Confession {} deleted", id);
                Ok(())
            }
            Err(e) if deleted_remotely => {
                debug!("Delete of {} failed ({}) but the feed already removed it", id, e);
                Ok(())
            }
            Err(e) => Err(self.roll_back(&mutation, e)),
        }
    }

    fn roll_back(&self, mutation: &Mutation, error: ClientError) -> ClientError {
        {
            let mut state = self.lock();
            mutation.revert(&mut state.entries);
            if let Mutation::Replace { before, .. } = mutation {
                state.log_update(before);
            }
            state.last_error = Some(error.clone());
        }
        warn!("Rolled back {} of {}: {}", mutation.label(), mutation.id(), error);
        self.emit(ListEvent::RolledBack {
            id: mutation.id().to_string(),
            error: error.clone(),
        });
        error
    }

    // -- Realtime --

    /// Merges one change into the list. Returns whether the list changed.
    pub fn apply_change(&self, change: ChangeEvent) -> bool {
        let changed = {
            let mut state = self.lock();
            match &change {
                ChangeEvent::Insert(record) => {
                    if state.position(&record.id).is_some() || !state.query.matches(record) {
                        false
                    } else {
                        let index = state.insert_position(record);
                        state.entries.insert(index, record.clone());
                        state.log_insert(record);
                        true
                    }
                }
                ChangeEvent::Update(record) => {
                    state.log_update(record);
                    match state.position(&record.id) {
                        Some(i) if state.entries[i] != *record => {
                            state.entries[i] = record.clone();
                            true
                        }
                        _ => false,
                    }
                }
                ChangeEvent::Delete(record) => {
                    if let Some(flag) = state.pending_removals.get_mut(&record.id) {
                        *flag = true;
                    }
                    state.log_delete(&record.id);
                    match state.position(&record.id) {
                        Some(i) => {
                            state.entries.remove(i);
                            true
                        }
                        None => false,
                    }
                }
            }
        };

        if changed {
            debug!("Merged realtime {} of {}", change.kind(), change.id());
            self.emit(ListEvent::RealtimeMerged {
                kind: change.kind(),
                id: change.id().to_string(),
            });
        }
        changed
    }

    // -- Snapshots --

    pub fn confessions(&self) -> Vec<Confession> {
        self.lock().entries.clone()
    }

    pub fn get(&self, id: &str) -> Option<Confession> {
        let state = self.lock();
        state.position(id).map(|i| state.entries[i].clone())
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_more(&self) -> bool {
        self.lock().has_more
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loads_in_flight > 0
    }

    /// Last page loaded, `None` before the first load.
    pub fn page(&self) -> Option<u32> {
        self.lock().page
    }

    pub fn query(&self) -> ListQuery {
        self.lock().query.clone()
    }

    pub fn last_error(&self) -> Option<ClientError> {
        self.lock().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.lock().last_error = None;
    }

    /// Counters over the listed confessions only.
    pub fn stats(&self) -> Stats {
        summarize(&self.lock().entries, start_of_day(Utc::now()))
    }

    fn note_error(&self, error: ClientError) {
        self.lock().last_error = Some(error.clone());
        self.emit(ListEvent::Error(error));
    }

    fn emit(&self, event: ListEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn feed_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.feed_task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> Drop for ListController<S> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.feed_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}
