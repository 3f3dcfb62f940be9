//! Conversation turn types.

use chrono::{DateTime, Utc};
use colloquy_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Ai,
}

impl TurnRole {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "ai",
        }
    }

    /// Parse the storage representation.
    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "user" => Ok(Self::User),
            "ai" => Ok(Self::Ai),
            other => Err(AppError::Memory(format!("Unknown turn role: {}", other))),
        }
    }
}

/// One message in a session's transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: i64,
    pub session_id: String,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    /// Render as a single transcript line ("USER: ...", "AI: ...").
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.role.as_str().to_uppercase(), self.content)
    }
}

/// Render turns as a newline-joined transcript, oldest first.
pub fn render_transcript(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(ChatTurn::transcript_line)
        .collect::<Vec<_>>()
        .join("\n")
}
