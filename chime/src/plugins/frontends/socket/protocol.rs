use crate::notification::{Action, CloseReason, Priority};
use serde::{Deserialize, Serialize};

/// One line sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Notify {
        application: String,
        title: String,
        #[serde(default)]
        text: String,
        /// http(s) URL or local file path.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icon: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<Priority>,
        /// Seconds; 0 keeps the notification until it is closed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        actions: Vec<Action>,
    },
    Close {
        id: u32,
    },
}

/// One line sent back to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Accepted { id: u32 },
    Rejected { reason: String },
    Closed { id: u32, reason: CloseReason },
    ActionInvoked {
        id: u32,
        #[serde(default)]
        action: Option<Action>,
    },
}

impl Response {
    /// Notification the response is about, if any.
    pub fn id(&self) -> Option<u32> {
        match self {
            Self::Accepted { id } | Self::Closed { id, .. } | Self::ActionInvoked { id, .. } => Some(*id),
            Self::Rejected { .. } => None,
        }
    }
}
