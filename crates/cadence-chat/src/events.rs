//! Chat events observed by the UI layer.

use cadence_markup::StyledText;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::message::Message;
use crate::telemetry::TelemetrySnapshot;

/// Events emitted while the chat runtime works
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A response cycle started
    CycleStarted,

    /// A message was appended to the conversation
    MessageAppended { message: Message },

    /// The raw streamed content changed
    StreamContent { content: String },

    /// The styled render of the streamed content caught up.
    /// May lag `StreamContent` under backpressure.
    StreamRendered { rendered: StyledText },

    /// The conversation was cleared
    Cleared,

    /// A response cycle reached a terminal state
    CycleFinished {
        telemetry: TelemetrySnapshot,
        error: Option<ErrorKind>,
    },
}

impl ChatEvent {
    /// Check if this event ends a response cycle
    pub fn is_cycle_end(&self) -> bool {
        matches!(self, ChatEvent::CycleFinished { .. })
    }
}
