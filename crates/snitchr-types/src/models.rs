use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// Display name used when a confession carries no nickname.
pub const ANONYMOUS: &str = "Anonymous";

/// An anonymous post. Everything except `reactions` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confession {
    pub id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reactions: Reactions,
}

impl Confession {
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(ANONYMOUS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

// -- Moods --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mood {
    Happy,
    Sad,
    Angry,
    Shocked,
    Love,
    Thoughtful,
    Funny,
    Tired,
    Hug,
    Cool,
    MindBlown,
    Pleading,
}

impl Mood {
    pub const ALL: [Mood; 12] = [
        Mood::Happy,
        Mood::Sad,
        Mood::Angry,
        Mood::Shocked,
        Mood::Love,
        Mood::Thoughtful,
        Mood::Funny,
        Mood::Tired,
        Mood::Hug,
        Mood::Cool,
        Mood::MindBlown,
        Mood::Pleading,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Mood::Happy => "happy",
            Mood::Sad => "sad",
            Mood::Angry => "angry",
            Mood::Shocked => "shocked",
            Mood::Love => "love",
            Mood::Thoughtful => "thoughtful",
            Mood::Funny => "funny",
            Mood::Tired => "tired",
            Mood::Hug => "hug",
            Mood::Cool => "cool",
            Mood::MindBlown => "mind-blown",
            Mood::Pleading => "pleading",
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Mood::Happy => "😊",
            Mood::Sad => "😢",
            Mood::Angry => "😡",
            Mood::Shocked => "😱",
            Mood::Love => "😍",
            Mood::Thoughtful => "🤔",
            Mood::Funny => "😂",
            Mood::Tired => "😴",
            Mood::Hug => "🤗",
            Mood::Cool => "😎",
            Mood::MindBlown => "🤯",
            Mood::Pleading => "🥺",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mood::Happy => "Happy",
            Mood::Sad => "Sad",
            Mood::Angry => "Angry",
            Mood::Shocked => "Shocked",
            Mood::Love => "Love",
            Mood::Thoughtful => "Thoughtful",
            Mood::Funny => "Funny",
            Mood::Tired => "Tired",
            Mood::Hug => "Hug",
            Mood::Cool => "Cool",
            Mood::MindBlown => "Mind blown",
            Mood::Pleading => "Pleading",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Mood {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mood::ALL
            .into_iter()
            .find(|m| m.slug() == s)
            .ok_or_else(|| ValidationError::UnknownMood(s.to_string()))
    }
}

// -- Reactions --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Heart,
    Laugh,
    Think,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 3] = [ReactionKind::Heart, ReactionKind::Laugh, ReactionKind::Think];

    pub fn as_str(self) -> &'static str {
        match self {
            ReactionKind::Heart => "heart",
            ReactionKind::Laugh => "laugh",
            ReactionKind::Think => "think",
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            ReactionKind::Heart => "❤️",
            ReactionKind::Laugh => "😂",
            ReactionKind::Think => "🤔",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReactionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownReaction(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionState {
    pub count: u32,
    /// Whether the current user has reacted with this kind.
    pub reacted: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reactions {
    #[serde(default)]
    pub heart: ReactionState,
    #[serde(default)]
    pub laugh: ReactionState,
    #[serde(default)]
    pub think: ReactionState,
}

impl Reactions {
    pub fn get(&self, kind: ReactionKind) -> ReactionState {
        match kind {
            ReactionKind::Heart => self.heart,
            ReactionKind::Laugh => self.laugh,
            ReactionKind::Think => self.think,
        }
    }

    fn slot_mut(&mut self, kind: ReactionKind) -> &mut ReactionState {
        match kind {
            ReactionKind::Heart => &mut self.heart,
            ReactionKind::Laugh => &mut self.laugh,
            ReactionKind::Think => &mut self.think,
        }
    }

    /// Flip the `reacted` flag for `kind` and move its count by one in the
    /// matching direction. A count that would leave the `u32` range is
    /// rejected.
    pub fn toggled(&self, kind: ReactionKind) -> Result<Reactions, ValidationError> {
        let mut next = *self;
        let slot = next.slot_mut(kind);
        if slot.reacted {
            slot.count = slot
                .count
                .checked_sub(1)
                .ok_or(ValidationError::ReactionUnderflow { kind })?;
        } else {
            slot.count = slot
                .count
                .checked_add(1)
                .ok_or(ValidationError::ReactionOverflow { kind })?;
        }
        slot.reacted = !slot.reacted;
        Ok(next)
    }

    pub fn total(&self) -> u64 {
        ReactionKind::ALL
            .into_iter()
            .map(|k| u64::from(self.get(k).count))
            .sum()
    }

    pub fn any(&self) -> bool {
        self.total() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_adds_then_removes() {
        let start = Reactions::default();

        let once = start.toggled(ReactionKind::Heart).unwrap();
        assert_eq!(once.heart, ReactionState { count: 1, reacted: true });
        assert_eq!(once.laugh, ReactionState::default());

        let twice = once.toggled(ReactionKind::Heart).unwrap();
        assert_eq!(twice, start);
    }

    #[test]
    fn toggle_underflow_is_rejected() {
        let broken = Reactions {
            think: ReactionState { count: 0, reacted: true },
            ..Default::default()
        };

        let err = broken.toggled(ReactionKind::Think).unwrap_err();
        assert_eq!(err, ValidationError::ReactionUnderflow { kind: ReactionKind::Think });
    }

    #[test]
    fn toggle_overflow_is_rejected() {
        let full = Reactions {
            heart: ReactionState { count: u32::MAX, reacted: false },
            ..Default::default()
        };

        let err = full.toggled(ReactionKind::Heart).unwrap_err();
        assert_eq!(err, ValidationError::ReactionOverflow { kind: ReactionKind::Heart });
        assert_eq!(full.heart.count, u32::MAX);
    }

    #[test]
    fn total_sums_every_kind() {
        let r = Reactions {
            heart: ReactionState { count: 3, reacted: false },
            laugh: ReactionState { count: 2, reacted: true },
            think: ReactionState { count: 0, reacted: false },
        };
        assert_eq!(r.total(), 5);
        assert!(r.any());
        assert!(!Reactions::default().any());
    }

    #[test]
    fn mood_slugs_parse_back() {
        for mood in Mood::ALL {
            assert_eq!(mood.slug().parse::<Mood>().unwrap(), mood);
        }
        assert!("grumpy".parse::<Mood>().is_err());
    }

    #[test]
    fn mood_serializes_as_kebab_slug() {
        let json = serde_json::to_string(&Mood::MindBlown).unwrap();
        assert_eq!(json, "\"mind-blown\"");
    }

    #[test]
    fn location_bounds() {
        assert!(Location::new(52.52, 13.405).is_valid());
        assert!(!Location::new(91.0, 0.0).is_valid());
        assert!(!Location::new(0.0, -180.5).is_valid());
    }
}
