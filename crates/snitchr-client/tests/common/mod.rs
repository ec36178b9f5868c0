#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use snitchr_client::error::Result;
use snitchr_client::{ClientError, ConfessionStore, MemoryStore, Page};
use snitchr_types::api::{ListQuery, NewConfession, Stats};
use snitchr_types::models::{Confession, Reactions};

/// `MemoryStore` wrapper that can fail or hold back individual calls.
///
/// A queued failure replaces the next call of that operation without
/// touching the inner store. A gate lets the next call run against the inner
/// store, then holds its result until the gate is released.
pub struct TestStore {
    pub inner: MemoryStore,
    failures: Mutex<HashMap<&'static str, VecDeque<ClientError>>>,
    gates: Mutex<HashMap<&'static str, VecDeque<oneshot::Receiver<()>>>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl TestStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failures: Mutex::default(),
            gates: Mutex::default(),
            calls: Mutex::default(),
        }
    }

    pub fn seeded(records: Vec<Confession>) -> Self {
        Self::new(MemoryStore::with_confessions(records))
    }

    pub fn fail_next(&self, op: &'static str, error: ClientError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Holds the next `op` call's result until the returned sender fires or
    /// is dropped.
    pub fn gate_next(&self, op: &'static str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().entry(op).or_default().push_back(rx);
        tx
    }

    pub fn calls(&self, op: &'static str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    async fn call<T>(&self, op: &'static str, inner: impl Future<Output = Result<T>> + Send) -> Result<T> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        let failure = self.failures.lock().unwrap().get_mut(op).and_then(VecDeque::pop_front);
        let result = match failure {
            Some(error) => Err(error),
            None => inner.await,
        };
        let gate = self.gates.lock().unwrap().get_mut(op).and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        result
    }
}

#[async_trait]
impl ConfessionStore for TestStore {
    async fn query(&self, query: &ListQuery, page: u32, page_size: u32) -> Result<Page> {
        self.call("query", self.inner.query(query, page, page_size)).await
    }

    async fn get(&self, id: &str) -> Result<Confession> {
        self.call("get", self.inner.get(id)).await
    }

    async fn create(&self, draft: NewConfession) -> Result<Confession> {
        self.call("create", self.inner.create(draft)).await
    }

    async fn update_reactions(&self, id: &str, reactions: Reactions) -> Result<Confession> {
        self.call("update_reactions", self.inner.update_reactions(id, reactions)).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.call("delete", self.inner.delete(id)).await
    }

    async fn stats(&self) -> Result<Stats> {
        self.call("stats", self.inner.stats()).await
    }
}

/// A confession created `minutes` ago.
pub fn confession(id: &str, message: &str, minutes: i64) -> Confession {
    Confession {
        id: id.to_string(),
        message: message.to_string(),
        nickname: None,
        mood: None,
        location: None,
        created_at: at_minutes_ago(minutes),
        reactions: Reactions::default(),
    }
}

pub fn with_hearts(mut record: Confession, hearts: u32) -> Confession {
    record.reactions.heart.count = hearts;
    record
}

fn at_minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::minutes(minutes)
}

/// Records "1", "2", "3", with "3" the newest.
pub fn three() -> Vec<Confession> {
    vec![
        confession("1", "first", 30),
        confession("2", "second", 20),
        confession("3", "third", 10),
    ]
}

pub fn ids(list: &[Confession]) -> Vec<String> {
    list.iter().map(|c| c.id.clone()).collect()
}

pub fn assert_unique(list: &[Confession]) {
    let mut seen = std::collections::HashSet::new();
    for c in list {
        assert!(seen.insert(c.id.clone()), "duplicate id {} in {:?}", c.id, ids(list));
    }
}

/// Polls `condition` until it holds, failing the test after about a second.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not met in time");
}
