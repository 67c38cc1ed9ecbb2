// plugins/backends/toast.rs
//
// In-process popup model. Keeps track of what should be on screen, closes popups
// when their timeout runs out and takes clicks/dismissals from whatever GUI layer
// draws them.

use crate::application::Application;
use crate::error::BackendError;
use crate::icon::{IconMode, IconState, Size};
use crate::notification::{Action, CloseReason, Notification, Priority};
use crate::plugins::{BackendCapabilities, BackendContext, BackendEventSink, NotificationBackend};
use async_trait::async_trait;
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

pub const NAME: &str = "Toast";

/// Edge length of the icon a popup is drawn with.
pub const ICON_SIZE: u32 = 48;

/// A popup that should currently be visible.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleToast {
    pub id: u32,
    pub application: String,
    pub title: String,
    pub text: String,
    pub priority: Priority,
    /// Rendered PNG of the notification icon.
    pub icon: PathBuf,
    pub actions: Vec<Action>,
}

struct Shown {
    toast: VisibleToast,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct ToastState {
    events: Option<BackendEventSink>,
    shown: BTreeMap<u32, Shown>,
}

impl ToastState {
    fn take(&mut self, id: u32) -> Option<(VisibleToast, BackendEventSink)> {
        let shown = self.shown.remove(&id)?;
        if let Some(timer) = shown.timer {
            timer.abort();
        }
        let events = self.events.clone()?;
        Some((shown.toast, events))
    }
}

pub struct ToastBackend {
    state: Arc<Mutex<ToastState>>,
    context: Mutex<Option<BackendContext>>,
}

impl ToastBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ToastState::default())),
            context: Mutex::new(None),
        }
    }

    /// Popups currently on screen, oldest first.
    pub fn visible(&self) -> Vec<VisibleToast> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.shown.values().map(|s| s.toast.clone()).collect()
    }

    /// The user clicked a popup (`action_id` is `None`) or one of its actions.
    /// Returns `false` if no such popup is shown.
    pub fn invoke_action(&self, id: u32, action_id: Option<u32>) -> bool {
        let taken = self.state.lock().unwrap_or_else(PoisonError::into_inner).take(id);
        match taken {
            Some((_, events)) => {
                events.action_invoked(id, action_id);
                events.closed(id, CloseReason::Activated);
                true
            }
            None => false,
        }
    }

    /// The user closed a popup.
    pub fn dismiss(&self, id: u32) -> bool {
        let taken = self.state.lock().unwrap_or_else(PoisonError::into_inner).take(id);
        match taken {
            Some((_, events)) => {
                events.closed(id, CloseReason::Dismissed);
                true
            }
            None => false,
        }
    }

    fn start_timer(&self, id: u32, notification: &Notification) -> Option<JoinHandle<()>> {
        let timeout = notification.timeout.filter(|_| !notification.is_sticky())?;
        let state = Arc::clone(&self.state);
        Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let taken = {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                // The entry may have been replaced by an update with a fresh timer.
                match state.shown.get_mut(&id) {
                    Some(shown) => {
                        shown.timer = None;
                        state.take(id)
                    }
                    None => None,
                }
            };
            if let Some((_, events)) = taken {
                debug!("Toast {} timed out", id);
                events.closed(id, CloseReason::TimedOut);
            }
        }))
    }
}

impl Default for ToastBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationBackend for ToastBackend {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            can_close: true,
            supports_actions: true,
        }
    }

    async fn initialize(&self, context: BackendContext) -> Result<(), BackendError> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).events = Some(context.events.clone());
        *self.context.lock().unwrap_or_else(PoisonError::into_inner) = Some(context);
        Ok(())
    }

    async fn deinitialize(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, shown) in std::mem::take(&mut state.shown) {
            if let Some(timer) = shown.timer {
                timer.abort();
            }
        }
        state.events = None;
        *self.context.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    async fn register_application(&self, application: &Application) {
        debug!("Toast: registered {}", application.name());
    }

    async fn notify(&self, notification: &Notification) -> Result<(), BackendError> {
        let id = notification
            .id
            .ok_or_else(|| BackendError::Delivery("notification has no id".to_string()))?;
        let icons = self
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.icons.clone())
            .ok_or_else(|| BackendError::Unavailable("toast backend is not initialized".to_string()))?;

        let icon = icons.local_url(
            &notification.icon,
            Size::new(ICON_SIZE, ICON_SIZE),
            IconMode::Normal,
            IconState::Off,
        );
        let toast = VisibleToast {
            id,
            application: notification.application.name().to_string(),
            title: notification.title.clone(),
            text: notification.text.clone(),
            priority: notification.priority,
            icon,
            actions: notification.actions.clone(),
        };

        // The entry goes in before the timer starts so an instant timeout still finds it.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = state.shown.insert(id, Shown { toast, timer: None }) {
            if let Some(timer) = previous.timer {
                timer.abort();
            }
            debug!("Toast {} updated in place", id);
        }
        let timer = self.start_timer(id, notification);
        if let Some(shown) = state.shown.get_mut(&id) {
            shown.timer = timer;
        }
        info!("Showing toast {}: {}", id, notification.title);
        Ok(())
    }

    async fn close_notification(
        &self,
        notification: &Notification,
        reason: CloseReason,
    ) -> Result<(), BackendError> {
        let Some(id) = notification.id else {
            return Ok(());
        };
        let taken = self.state.lock().unwrap_or_else(PoisonError::into_inner).take(id);
        if let Some((_, events)) = taken {
            events.closed(id, reason);
        }
        Ok(())
    }
}
