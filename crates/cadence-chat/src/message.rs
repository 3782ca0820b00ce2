//! Conversation message values.

use cadence_markup::StyledText;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single conversation entry. Immutable once appended: messages are only
/// ever created whole and removed whole (bulk clear, or the retry flow
/// removing the trailing pair).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Styled render of the content. Assistant messages only.
    #[serde(default)]
    pub rendered: Option<StyledText>,
    /// Set when the response was cut short by a recoverable failure.
    /// Assistant messages only.
    #[serde(default)]
    pub terminal_error: Option<ErrorKind>,
}

impl Message {
    /// Create a user message. User messages never carry rendered content or
    /// a terminal error.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            rendered: None,
            terminal_error: None,
        }
    }

    /// Create an assistant message for a completed response.
    pub fn assistant(content: impl Into<String>, rendered: Option<StyledText>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            rendered,
            terminal_error: None,
        }
    }

    /// Create an assistant message whose response was cut short by a
    /// recoverable failure.
    pub fn assistant_with_error(
        content: impl Into<String>,
        rendered: Option<StyledText>,
        error: ErrorKind,
    ) -> Self {
        Self {
            terminal_error: Some(error),
            ..Self::assistant(content, rendered)
        }
    }
}
