use snitchr_types::models::ReactionKind;

use crate::error::ClientError;

/// Notifications for presentation layers (haptics, confetti, toasts).
#[derive(Debug, Clone, PartialEq)]
pub enum ListEvent {
    /// A page was appended.
    Loaded { page: u32, count: usize },
    /// The list was replaced from page 0.
    Refreshed { count: usize },
    /// A provisional entry was prepended.
    Added { provisional_id: String },
    AddConfirmed { provisional_id: String, id: String },
    ReactionToggled { id: String, kind: ReactionKind, reacted: bool },
    Removed { id: String },
    /// An optimistic change was undone after the store refused it.
    RolledBack { id: String, error: ClientError },
    RealtimeMerged { kind: &'static str, id: String },
    Error(ClientError),
}
