// plugins/backend.rs
//
// The backend plugin contract: how the core hands notifications to a backend and
// how the backend reports what happened to them.

use crate::application::Application;
use crate::error::BackendError;
use crate::icon::IconCache;
use crate::notification::{CloseReason, Notification};
use crate::settings::{SettingsScope, SettingsStore, SettingsValue};
use async_trait::async_trait;
use tokio::sync::mpsc;

// ============================================================================
// CAPABILITIES & EVENTS
// ============================================================================

/// What a backend can do beyond showing a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Notifications can be closed programmatically.
    pub can_close: bool,
    /// Actions are shown and reported back individually. Without it the core
    /// reports any action as a plain click.
    pub supports_actions: bool,
}

/// Something a backend observed about a notification it was given.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Closed { id: u32, reason: CloseReason },
    /// `action_id` is `None` when the backend cannot tell a click from an action.
    ActionInvoked { id: u32, action_id: Option<u32> },
    Error(BackendError),
}

/// Backend events tagged with the name of the backend that sent them.
#[derive(Debug, Clone)]
pub(crate) struct TaggedBackendEvent {
    pub backend: String,
    pub event: BackendEvent,
}

/// Channel a backend uses to report back to the core.
#[derive(Debug, Clone)]
pub struct BackendEventSink {
    backend: String,
    tx: mpsc::UnboundedSender<TaggedBackendEvent>,
}

impl BackendEventSink {
    pub(crate) fn new(backend: impl Into<String>, tx: mpsc::UnboundedSender<TaggedBackendEvent>) -> Self {
        Self {
            backend: backend.into(),
            tx,
        }
    }

    pub fn closed(&self, id: u32, reason: CloseReason) {
        self.send(BackendEvent::Closed { id, reason });
    }

    pub fn action_invoked(&self, id: u32, action_id: Option<u32>) {
        self.send(BackendEvent::ActionInvoked { id, action_id });
    }

    pub fn error(&self, error: BackendError) {
        self.send(BackendEvent::Error(error));
    }

    pub fn send(&self, event: BackendEvent) {
        // The core only goes away at shutdown; late reports are meaningless then.
        let _ = self.tx.send(TaggedBackendEvent {
            backend: self.backend.clone(),
            event,
        });
    }
}

/// Everything a backend receives when it is initialized.
#[derive(Debug, Clone)]
pub struct BackendContext {
    pub name: String,
    pub events: BackendEventSink,
    pub icons: IconCache,
    pub settings: SettingsStore,
}

impl BackendContext {
    /// A setting from this backend's own namespace.
    pub fn setting(&self, key: &str) -> Option<SettingsValue> {
        self.settings.value(key, &SettingsScope::plugin(self.name.clone()))
    }
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// A plugin that displays or delivers notifications.
///
/// Calls come from the core's dispatch loop one at a time. Backends that do slow
/// work should spawn it and report the outcome through the event sink.
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    fn capabilities(&self) -> BackendCapabilities;

    /// Settings this backend reads, with their defaults. Declared when loaded.
    fn default_settings(&self) -> Vec<(&'static str, SettingsValue)> {
        vec![]
    }

    /// Prepare for use. An error here makes the backend unusable as primary.
    async fn initialize(&self, context: BackendContext) -> Result<(), BackendError>;

    async fn deinitialize(&self) {}

    async fn register_application(&self, _application: &Application) {}

    async fn deregister_application(&self, _application: &Application) {}

    /// Show or send `notification`. It always carries an id.
    async fn notify(&self, notification: &Notification) -> Result<(), BackendError>;

    /// Close a notification on request. Only called when `can_close` is advertised.
    /// The backend confirms by reporting `Closed` with `reason`.
    async fn close_notification(
        &self,
        _notification: &Notification,
        _reason: CloseReason,
    ) -> Result<(), BackendError> {
        Ok(())
    }
}
