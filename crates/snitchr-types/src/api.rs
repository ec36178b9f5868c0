use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{Confession, Location, Mood};
use crate::validation::ValidationError;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

// -- Confessions --

/// Draft sent by a client. The store assigns `id`, `created_at` and zeroed
/// reactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewConfession {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl NewConfession {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    pub fn with_mood(mut self, mood: Mood) -> Self {
        self.mood = Some(mood);
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

// -- Listing --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    #[default]
    All,
    /// Ordered by heart count only; laugh and think are ignored.
    Popular,
    WithReactions,
    WithoutReactions,
}

impl FilterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterKind::All => "all",
            FilterKind::Popular => "popular",
            FilterKind::WithReactions => "with_reactions",
            FilterKind::WithoutReactions => "without_reactions",
        }
    }

    pub fn matches(self, confession: &Confession) -> bool {
        match self {
            FilterKind::All | FilterKind::Popular => true,
            FilterKind::WithReactions => confession.reactions.any(),
            FilterKind::WithoutReactions => !confession.reactions.any(),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" | "recent" => Ok(FilterKind::All),
            "popular" => Ok(FilterKind::Popular),
            "with_reactions" | "with-reactions" => Ok(FilterKind::WithReactions),
            "without_reactions" | "no_reactions" | "no-reactions" => Ok(FilterKind::WithoutReactions),
            other => Err(ValidationError::UnknownFilter(other.to_string())),
        }
    }
}

/// The predicate and ordering a list is built under. The search term
/// narrows within the selected filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub search: Option<String>,
    pub filter: FilterKind,
}

impl ListQuery {
    /// Trimmed search term, `None` when blank.
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn matches(&self, confession: &Confession) -> bool {
        if !self.filter.matches(confession) {
            return false;
        }
        match self.search_term() {
            None => true,
            Some(term) => {
                let needle = term.to_lowercase();
                confession.message.to_lowercase().contains(&needle)
                    || confession
                        .nickname
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(&needle))
            }
        }
    }

    /// Whether `a` sorts strictly before `b` under this query's ordering.
    pub fn precedes(&self, a: &Confession, b: &Confession) -> bool {
        if self.filter == FilterKind::Popular {
            let (ha, hb) = (a.reactions.heart.count, b.reactions.heart.count);
            if ha != hb {
                return ha > hb;
            }
        }
        a.created_at > b.created_at
    }
}

/// Query string for `GET /confessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default)]
    pub filter: FilterKind,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl PageQuery {
    pub fn new(query: &ListQuery, page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            search: query.search_term().map(str::to_string),
            filter: query.filter,
        }
    }

    pub fn list_query(&self) -> ListQuery {
        ListQuery {
            search: self.search.clone(),
            filter: self.filter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResponse {
    pub confessions: Vec<Confession>,
    /// Number of rows matching the query across all pages.
    pub total: u64,
}

// -- Stats --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_confessions: u64,
    pub today_confessions: u64,
    pub total_reactions: u64,
}

// -- Errors --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
