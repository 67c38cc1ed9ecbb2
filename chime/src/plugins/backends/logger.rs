use crate::application::Application;
use crate::error::BackendError;
use crate::notification::{CloseReason, Notification, Priority};
use crate::plugins::{BackendCapabilities, BackendContext, BackendEventSink, NotificationBackend};
use async_trait::async_trait;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

pub const NAME: &str = "Logger";

/// Writes every notification to the log. Works as primary backend on headless
/// machines and as a secondary backend that keeps a trail of everything sent.
#[derive(Default)]
pub struct LoggerBackend {
    events: Mutex<Option<BackendEventSink>>,
    timers: Arc<Mutex<HashMap<u32, JoinHandle<()>>>>,
}

impl LoggerBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationBackend for LoggerBackend {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }

    async fn initialize(&self, context: BackendContext) -> Result<(), BackendError> {
        *self.events.lock().unwrap_or_else(PoisonError::into_inner) = Some(context.events);
        Ok(())
    }

    async fn deinitialize(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, timer) in timers.drain() {
            timer.abort();
        }
        *self.events.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    async fn register_application(&self, application: &Application) {
        info!("📋 Application registered: {}", application.name());
    }

    async fn deregister_application(&self, application: &Application) {
        info!("📋 Application deregistered: {}", application.name());
    }

    async fn notify(&self, notification: &Notification) -> Result<(), BackendError> {
        let events = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| BackendError::Unavailable("logger backend is not initialized".to_string()))?;
        let id = notification.id.unwrap_or_default();

        let line = format!(
            "🔔 [{}] #{} {}: {}",
            notification.application.name(),
            id,
            notification.title,
            notification.text
        );
        if notification.priority >= Priority::High {
            warn!("{}", line);
        } else {
            info!("{}", line);
        }

        let Some(timeout) = notification.timeout.filter(|_| !notification.is_sticky()) else {
            return Ok(());
        };
        // Held across the spawn so the timer cannot remove its entry before it exists.
        let mut pending = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        let timers = Arc::clone(&self.timers);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            timers.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
            events.closed(id, CloseReason::TimedOut);
        });
        if let Some(previous) = pending.insert(id, timer) {
            previous.abort();
        }
        Ok(())
    }
}
