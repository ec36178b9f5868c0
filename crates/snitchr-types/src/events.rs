use serde::{Deserialize, Serialize};

use crate::models::Confession;

/// A committed change to the confession collection.
///
/// Insert and update carry the new state, delete carries the last known
/// state of the removed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum ChangeEvent {
    Insert(Confession),
    Update(Confession),
    Delete(Confession),
}

impl ChangeEvent {
    pub fn record(&self) -> &Confession {
        match self {
            Self::Insert(c) | Self::Update(c) | Self::Delete(c) => c,
        }
    }

    pub fn id(&self) -> &str {
        &self.record().id
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
        }
    }
}

/// Frames sent over the `/feed` WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Sent once after the socket is accepted.
    Ready { subscribers: usize },

    /// A confession was inserted, updated or deleted.
    Change(ChangeEvent),

    /// The server dropped `missed` events for this subscriber. The client's
    /// view may be stale and should be refetched.
    Resync { missed: u64 },
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::Reactions;

    #[test]
    fn change_frame_shape() {
        let record = Confession {
            id: "abc".into(),
            message: "hi".into(),
            nickname: None,
            mood: None,
            location: None,
            created_at: Utc::now(),
            reactions: Reactions::default(),
        };
        let frame = GatewayEvent::Change(ChangeEvent::Delete(record));
        let value = serde_json::to_value(&frame).unwrap();

        assert_eq!(value["type"], "Change");
        assert_eq!(value["data"]["kind"], "delete");
        assert_eq!(value["data"]["record"]["id"], "abc");

        let back: GatewayEvent = serde_json::from_value(value).unwrap();
        match back {
            GatewayEvent::Change(ev) => assert_eq!(ev.id(), "abc"),
            other => panic!("unexpected frame {:?}", other),
        }
    }
}
