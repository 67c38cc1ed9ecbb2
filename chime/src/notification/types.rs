use crate::application::Application;
use crate::icon::Icon;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A notification as submitted by an application.
///
/// This is a value type: the core keeps its own copy once broadcast and hands out
/// clones in events and lookups.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Option<u32>,
    pub application: Application,
    pub title: String,
    pub text: String,
    pub icon: Icon,
    pub priority: Priority,
    pub timeout: Option<Duration>,
    pub actions: Vec<Action>,
    pub created_at: DateTime<Utc>,
    pub close_reason: Option<CloseReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Lowest,
    Low,
    Normal,
    High,
    Emergency,
}

/// Why a notification left the active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TimedOut,
    /// The user dismissed it.
    Dismissed,
    /// The user clicked it or one of its actions.
    Activated,
    /// The application asked for it to be closed.
    Requested,
    BackendError,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub id: u32,
    pub name: String,
}

impl Action {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl Notification {
    /// New notification using the application's default icon.
    pub fn new(application: &Application, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            application: application.clone(),
            title: title.into(),
            text: text.into(),
            icon: application.icon().clone(),
            priority: Priority::Normal,
            timeout: None,
            actions: vec![],
            created_at: Utc::now(),
            close_reason: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_icon(mut self, icon: Icon) -> Self {
        self.icon = icon;
        self
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn add_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn action_by_id(&self, id: u32) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some() && self.close_reason.is_none()
    }

    /// Sticky notifications stay until closed explicitly.
    pub fn is_sticky(&self) -> bool {
        self.timeout == Some(Duration::ZERO)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TimedOut => "timed out",
            Self::Dismissed => "dismissed",
            Self::Activated => "activated",
            Self::Requested => "closed on request",
            Self::BackendError => "backend error",
        };
        f.write_str(s)
    }
}
