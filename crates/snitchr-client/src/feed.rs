use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use snitchr_types::events::{ChangeEvent, GatewayEvent};

/// Buffered events per subscription before the producer waits.
pub const FEED_BUFFER: usize = 256;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Change(ChangeEvent),
    /// Events were lost. `missed` is zero when the count is unknown, as
    /// after a reconnect.
    Gap { missed: u64 },
}

/// Receiving end of a change feed. Dropping it stops the producer task.
pub struct FeedSubscription {
    rx: mpsc::Receiver<FeedEvent>,
    task: Option<JoinHandle<()>>,
}

impl FeedSubscription {
    /// A subscription fed by hand, for tests and custom transports.
    pub fn channel(buffer: usize) -> (mpsc::Sender<FeedEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx, task: None })
    }

    /// Adapts an in-process broadcast receiver. Lagging turns into a `Gap`.
    pub fn from_broadcast(mut changes: broadcast::Receiver<ChangeEvent>) -> Self {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let task = tokio::spawn(async move {
            loop {
                let event = match changes.recv().await {
                    Ok(change) => FeedEvent::Change(change),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Change feed lagged, {} events dropped", missed);
                        FeedEvent::Gap { missed }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Self { rx, task: Some(task) }
    }

    pub async fn next(&mut self) -> Option<FeedEvent> {
        self.rx.recv().await
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// WebSocket client for the server's `/feed` endpoint.
#[derive(Debug, Clone)]
pub struct WsFeed {
    url: String,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl WsFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// Spawns the connection loop. It reconnects until the subscription is
    /// dropped and reports a `Gap` after every reconnect.
    pub fn subscribe(self) -> FeedSubscription {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let task = tokio::spawn(self.run(tx));
        FeedSubscription { rx, task: Some(task) }
    }

    async fn run(self, tx: mpsc::Sender<FeedEvent>) {
        let mut backoff = self.initial_backoff;
        let mut connected_before = false;

        loop {
            match tokio_tungstenite::connect_async(self.url.as_str()).await {
                Ok((stream, _)) => {
                    info!("Connected to change feed at {}", self.url);
                    backoff = self.initial_backoff;
                    if connected_before && tx.send(FeedEvent::Gap { missed: 0 }).await.is_err() {
                        return;
                    }
                    connected_before = true;

                    let (mut write, mut read) = stream.split();
                    while let Some(message) = read.next().await {
                        let event = match message {
                            Ok(Message::Text(text)) => match decode_frame(text.as_str()) {
                                Some(event) => event,
                                None => continue,
                            },
                            Ok(Message::Ping(payload)) => {
                                if let Err(e) = write.send(Message::Pong(payload)).await {
                                    warn!("Failed to answer feed ping: {}", e);
                                    break;
                                }
                                continue;
                            }
                            Ok(Message::Close(_)) => break,
                            Ok(_) => continue,
                            Err(e) => {
                                warn!("Change feed read error: {}", e);
                                break;
                            }
                        };
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    warn!("Change feed disconnected");
                }
                Err(e) => warn!("Change feed connect to {} failed: {}", self.url, e),
            }

            if tx.is_closed() {
                return;
            }
            debug!("Reconnecting to change feed in {:?}", backoff);
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }
}

/// Turns a gateway text frame into a feed event. `Ready` and undecodable
/// frames yield nothing.
fn decode_frame(text: &str) -> Option<FeedEvent> {
    match serde_json::from_str::<GatewayEvent>(text) {
        Ok(GatewayEvent::Change(change)) => Some(FeedEvent::Change(change)),
        Ok(GatewayEvent::Resync { missed }) => Some(FeedEvent::Gap { missed }),
        Ok(GatewayEvent::Ready { subscribers }) => {
            debug!("Change feed ready ({} subscribers)", subscribers);
            None
        }
        Err(e) => {
            warn!("Skipping undecodable feed frame: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use snitchr_types::models::{Confession, Reactions};

    use super::*;

    fn record(id: &str) -> Confession {
        Confession {
            id: id.into(),
            message: "hello".into(),
            nickname: None,
            mood: None,
            location: None,
            created_at: Utc::now(),
            reactions: Reactions::default(),
        }
    }

    #[test]
    fn frames_decode_to_feed_events() {
        let deleted = record("7");
        let change = GatewayEvent::Change(ChangeEvent::Delete(deleted.clone()));
        let text = serde_json::to_string(&change).unwrap();
        assert_eq!(decode_frame(&text), Some(FeedEvent::Change(ChangeEvent::Delete(deleted))));

        let resync = serde_json::to_string(&GatewayEvent::Resync { missed: 4 }).unwrap();
        assert_eq!(decode_frame(&resync), Some(FeedEvent::Gap { missed: 4 }));

        let ready = serde_json::to_string(&GatewayEvent::Ready { subscribers: 2 }).unwrap();
        assert_eq!(decode_frame(&ready), None);
        assert_eq!(decode_frame("not json"), None);
    }

    #[tokio::test]
    async fn broadcast_lag_becomes_gap() {
        let (tx, rx) = broadcast::channel(2);
        for id in ["1", "2", "3", "4"] {
            tx.send(ChangeEvent::Insert(record(id))).unwrap();
        }
        let mut feed = FeedSubscription::from_broadcast(rx);

        assert_eq!(feed.next().await, Some(FeedEvent::Gap { missed: 2 }));
        match feed.next().await {
            Some(FeedEvent::Change(change)) => assert_eq!(change.id(), "3"),
            other => panic!("expected change, got {:?}", other),
        }
        match feed.next().await {
            Some(FeedEvent::Change(change)) => assert_eq!(change.id(), "4"),
            other => panic!("expected change, got {:?}", other),
        }

        drop(tx);
        assert_eq!(feed.next().await, None);
    }

    #[tokio::test]
    async fn manual_channel_delivers_in_order() {
        let (tx, mut feed) = FeedSubscription::channel(4);
        tx.send(FeedEvent::Gap { missed: 0 }).await.unwrap();
        tx.send(FeedEvent::Change(ChangeEvent::Insert(record("1")))).await.unwrap();
        drop(tx);

        assert_eq!(feed.next().await, Some(FeedEvent::Gap { missed: 0 }));
        assert!(matches!(feed.next().await, Some(FeedEvent::Change(_))));
        assert_eq!(feed.next().await, None);
    }
}
