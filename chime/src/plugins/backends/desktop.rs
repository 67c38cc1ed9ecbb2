// plugins/backends/desktop.rs
//
// Native OS notifications through notify-rust. On freedesktop systems the server
// reports clicks and closes back; elsewhere the popup is fire-and-forget.

use crate::error::BackendError;
use crate::icon::{IconMode, IconState, Size};
use crate::notification::{CloseReason, Notification};
use crate::plugins::{BackendCapabilities, BackendContext, NotificationBackend};
use async_trait::async_trait;
use log::{debug, error as log_error};
use std::sync::{Mutex, PoisonError};

pub const NAME: &str = "Desktop";

#[derive(Default)]
pub struct DesktopBackend {
    context: Mutex<Option<BackendContext>>,
}

impl DesktopBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationBackend for DesktopBackend {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            can_close: false,
            supports_actions: cfg!(all(unix, not(target_os = "macos"))),
        }
    }

    async fn initialize(&self, context: BackendContext) -> Result<(), BackendError> {
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            tokio::task::spawn_blocking(notify_rust::get_server_information)
                .await
                .map_err(|e| BackendError::Unavailable(e.to_string()))?
                .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        }
        *self.context.lock().unwrap_or_else(PoisonError::into_inner) = Some(context);
        Ok(())
    }

    async fn deinitialize(&self) {
        *self.context.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    async fn notify(&self, notification: &Notification) -> Result<(), BackendError> {
        let context = self
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| BackendError::Unavailable("desktop backend is not initialized".to_string()))?;
        let id = notification.id.unwrap_or_default();

        let icon = context.icons.local_url(
            &notification.icon,
            Size::new(64, 64),
            IconMode::Normal,
            IconState::Off,
        );

        let mut toast = notify_rust::Notification::new();
        toast
            .appname(notification.application.name())
            .summary(&notification.title)
            .body(&notification.text)
            .icon(&icon.to_string_lossy());
        toast.timeout(match notification.timeout {
            Some(timeout) if !timeout.is_zero() => {
                notify_rust::Timeout::Milliseconds(timeout.as_millis().min(u32::MAX as u128) as u32)
            }
            Some(_) => notify_rust::Timeout::Never,
            None => notify_rust::Timeout::Default,
        });
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            use crate::notification::Priority;
            if notification.priority >= Priority::High {
                toast.urgency(notify_rust::Urgency::Critical);
            } else if notification.priority <= Priority::Low {
                toast.urgency(notify_rust::Urgency::Low);
            }
            for action in &notification.actions {
                toast.action(&action.id.to_string(), &action.name);
            }
        }

        let events = context.events.clone();
        tokio::task::spawn_blocking(move || match toast.show() {
            #[cfg(all(unix, not(target_os = "macos")))]
            Ok(handle) => handle.wait_for_action(|action| match action {
                "__closed" => events.closed(id, CloseReason::Dismissed),
                "default" => {
                    events.action_invoked(id, None);
                    events.closed(id, CloseReason::Activated);
                }
                other => {
                    events.action_invoked(id, other.parse().ok());
                    events.closed(id, CloseReason::Activated);
                }
            }),
            #[cfg(not(all(unix, not(target_os = "macos"))))]
            Ok(_) => debug!("Desktop notification {} shown", id),
            Err(e) => {
                log_error!("Failed to show desktop notification {}: {}", id, e);
                events.error(BackendError::Delivery(e.to_string()));
                events.closed(id, CloseReason::BackendError);
            }
        });

        debug!("Desktop notification {} queued", id);
        Ok(())
    }
}
