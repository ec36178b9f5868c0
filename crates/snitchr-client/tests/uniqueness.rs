mod common;

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use snitchr_client::controller::{ControllerConfig, ListController};
use snitchr_client::{ClientError, ConfessionStore, StoreError};
use snitchr_types::api::{ListQuery, NewConfession};
use snitchr_types::events::ChangeEvent;
use snitchr_types::models::{Confession, ReactionKind};

use common::{TestStore, assert_unique, ids, three};

type Controller = Arc<ListController<TestStore>>;

/// One step of a generated run. Store-backed operations run as spawned
/// tasks and, when `held`, stay parked on a gate until a later `Release`.
#[derive(Debug, Clone)]
enum Op {
    Add { n: u8, held: bool },
    Remove { pick: usize, held: bool },
    Toggle { pick: usize, held: bool },
    Refresh { held: bool },
    LoadMore { held: bool },
    FeedInsert(usize),
    FeedUpdate(usize),
    FeedDelete(usize),
    FailNext(u8),
    Release(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<u8>(), any::<bool>()).prop_map(|(n, held)| Op::Add { n, held }),
        (0usize..16, any::<bool>()).prop_map(|(pick, held)| Op::Remove { pick, held }),
        (0usize..16, any::<bool>()).prop_map(|(pick, held)| Op::Toggle { pick, held }),
        any::<bool>().prop_map(|held| Op::Refresh { held }),
        any::<bool>().prop_map(|held| Op::LoadMore { held }),
        (0usize..16).prop_map(Op::FeedInsert),
        (0usize..16).prop_map(Op::FeedUpdate),
        (0usize..16).prop_map(Op::FeedDelete),
        (0u8..3).prop_map(Op::FailNext),
        (0usize..16).prop_map(Op::Release),
        (0usize..16).prop_map(Op::Release),
    ]
}

fn nth(records: &[Confession], i: usize) -> Option<Confession> {
    records.get(i % records.len().max(1)).cloned()
}

fn hold(list: &Controller, gates: &mut Vec<oneshot::Sender<()>>, held: bool, op: &'static str) {
    if held {
        gates.push(list.store().gate_next(op));
    }
}

/// Lets spawned operations and the feed task run until they block.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Waits long enough for every published change to reach the list.
async fn quiesce() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

async fn run(ops: Vec<Op>) {
    let store = TestStore::seeded(three());
    let feed = store.inner.subscribe();
    let list: Controller = Arc::new(ListController::new(store, ControllerConfig { page_size: 100 }));
    list.attach_feed(feed);
    list.init().await.unwrap();

    // Every record the store has ever held, for replaying through the feed.
    let mut known: Vec<Confession> = list.confessions();
    let mut gates: Vec<oneshot::Sender<()>> = Vec::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    for op in ops {
        for record in list.store().inner.snapshot() {
            if !known.iter().any(|k| k.id == record.id) {
                known.push(record);
            }
        }
        let listed = list.confessions();
        let pick = |i: usize| nth(&listed, i).map(|c| c.id);

        match op {
            Op::Add { n, held } => {
                hold(&list, &mut gates, held, "create");
                let list = list.clone();
                tasks.push(tokio::spawn(async move {
                    let _ = list.add(NewConfession::new(format!("confession {n}"))).await;
                }));
            }
            Op::Remove { pick: i, held } => {
                if let Some(id) = pick(i) {
                    hold(&list, &mut gates, held, "delete");
                    let list = list.clone();
                    tasks.push(tokio::spawn(async move {
                        let _ = list.remove(&id).await;
                    }));
                }
            }
            Op::Toggle { pick: i, held } => {
                if let Some(id) = pick(i) {
                    hold(&list, &mut gates, held, "update_reactions");
                    let list = list.clone();
                    tasks.push(tokio::spawn(async move {
                        let _ = list.toggle_reaction(&id, ReactionKind::Heart).await;
                    }));
                }
            }
            Op::Refresh { held } => {
                hold(&list, &mut gates, held, "query");
                let list = list.clone();
                tasks.push(tokio::spawn(async move {
                    let _ = list.refresh().await;
                }));
            }
            Op::LoadMore { held } => {
                hold(&list, &mut gates, held, "query");
                let list = list.clone();
                tasks.push(tokio::spawn(async move {
                    let _ = list.load_more().await;
                }));
            }
            Op::FeedInsert(i) => {
                if let Some(record) = nth(&known, i) {
                    list.apply_change(ChangeEvent::Insert(record));
                }
            }
            Op::FeedUpdate(i) => {
                if let Some(mut record) = nth(&known, i) {
                    record.reactions.laugh.count += 1;
                    list.apply_change(ChangeEvent::Update(record));
                }
            }
            Op::FeedDelete(i) => {
                if let Some(record) = nth(&known, i) {
                    list.apply_change(ChangeEvent::Delete(record));
                }
            }
            Op::FailNext(which) => {
                let op = ["create", "delete", "update_reactions"][usize::from(which) % 3];
                list.store()
                    .fail_next(op, ClientError::Store(StoreError::Rejected("injected".into())));
            }
            Op::Release(i) => {
                if !gates.is_empty() {
                    let gate = gates.swap_remove(i % gates.len());
                    let _ = gate.send(());
                }
            }
        }

        settle().await;
        assert_unique(&list.confessions());
    }

    // Dropping the senders opens every remaining gate.
    gates.clear();
    for task in tasks {
        task.await.unwrap();
    }
    quiesce().await;
    assert_unique(&list.confessions());

    list.refresh().await.unwrap();
    quiesce().await;
    let stored = list
        .store()
        .inner
        .query(&ListQuery::default(), 0, 100)
        .await
        .unwrap()
        .confessions;
    let entries = list.confessions();
    assert_eq!(ids(&entries), ids(&stored));
    assert_eq!(entries, stored);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ids_stay_unique_under_any_interleaving(ops in proptest::collection::vec(op(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run(ops));
    }
}

#[tokio::test]
async fn toggles_keep_counts_consistent() {
    let list = ListController::new(TestStore::seeded(three()), ControllerConfig::default());
    list.init().await.unwrap();

    for round in 0..6u32 {
        let before = list.get("2").unwrap().reactions.laugh;
        list.toggle_reaction("2", ReactionKind::Laugh).await.unwrap();
        let after = list.get("2").unwrap().reactions.laugh;

        assert_eq!(after.reacted, !before.reacted, "round {round}");
        if before.reacted {
            assert_eq!(after.count, before.count - 1);
        } else {
            assert_eq!(after.count, before.count + 1);
        }
    }
}
