use thiserror::Error;

use crate::api::NewConfession;
use crate::models::ReactionKind;

pub const MESSAGE_MAX_CHARS: usize = 280;
pub const NICKNAME_MIN_CHARS: usize = 2;
pub const NICKNAME_MAX_CHARS: usize = 20;

/// Bad input. Caught before anything is sent or applied, so it never needs
/// a rollback.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("message must not be empty")]
    EmptyMessage,

    #[error("message is {len} characters long, the limit is {MESSAGE_MAX_CHARS}")]
    MessageTooLong { len: usize },

    #[error("nickname must be {NICKNAME_MIN_CHARS}-{NICKNAME_MAX_CHARS} characters, got {len}")]
    NicknameLength { len: usize },

    #[error("location ({latitude}, {longitude}) is out of range")]
    InvalidLocation { latitude: f64, longitude: f64 },

    #[error("page size must be greater than zero")]
    InvalidPageSize,

    #[error("{kind} is marked as reacted but its count is already zero")]
    ReactionUnderflow { kind: ReactionKind },

    #[error("{kind} count is already at its maximum")]
    ReactionOverflow { kind: ReactionKind },

    #[error("unknown mood '{0}'")]
    UnknownMood(String),

    #[error("unknown reaction '{0}'")]
    UnknownReaction(String),

    #[error("unknown filter '{0}'")]
    UnknownFilter(String),

    #[error("rejected by server: {0}")]
    Rejected(String),
}

impl NewConfession {
    /// Trim and check a draft. Blank nicknames collapse to `None`.
    pub fn validated(self) -> Result<NewConfession, ValidationError> {
        let message = self.message.trim().to_string();
        let len = message.chars().count();
        if len == 0 {
            return Err(ValidationError::EmptyMessage);
        }
        if len > MESSAGE_MAX_CHARS {
            return Err(ValidationError::MessageTooLong { len });
        }

        let nickname = match self.nickname.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(name) => {
                let len = name.chars().count();
                if !(NICKNAME_MIN_CHARS..=NICKNAME_MAX_CHARS).contains(&len) {
                    return Err(ValidationError::NicknameLength { len });
                }
                Some(name.to_string())
            }
        };

        if let Some(loc) = self.location {
            if !loc.is_valid() {
                return Err(ValidationError::InvalidLocation {
                    latitude: loc.latitude,
                    longitude: loc.longitude,
                });
            }
        }

        Ok(NewConfession {
            message,
            nickname,
            mood: self.mood,
            location: self.location,
        })
    }
}
