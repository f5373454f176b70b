use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EventId;

/// A chat message as it travels from the hub to every connected client.
/// Immutable once built; `from` and `timestamp` are always set by the constructor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub from: String,
    #[serde(rename = "message")]
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Stamp a message received from `from` with a fresh id and the current time.
    pub fn new(from: impl Into<String>, text: impl Into<String>) -> Self {
        Self::at(from, text, Utc::now())
    }

    pub fn at(from: impl Into<String>, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            from: from.into(),
            text: text.into(),
            timestamp,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
