use super::types::{Action, CloseReason, Notification};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Events the core fans out to every subscriber.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// An action was invoked on a notification. `action` is `None` when the backend
    /// only knows that the notification was clicked.
    ActionInvoked {
        notification: Notification,
        action: Option<Action>,
    },
    NotificationClosed {
        notification: Notification,
        reason: CloseReason,
    },
    PrimaryBackendError(String),
    PrimaryBackendChanged(String),
}

/// Observer list. Each subscriber gets its own unbounded channel so a slow reader
/// never causes another subscriber to miss an event.
#[derive(Default)]
pub(crate) struct Subscribers {
    senders: Mutex<Vec<mpsc::UnboundedSender<CoreEvent>>>,
}

impl Subscribers {
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<CoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver to every live subscriber, dropping the ones whose receiver is gone.
    pub(crate) fn emit(&self, event: CoreEvent) {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_to_all_subscribers() {
        let subscribers = Subscribers::default();
        let mut a = subscribers.subscribe();
        let mut b = subscribers.subscribe();

        subscribers.emit(CoreEvent::PrimaryBackendChanged("Toast".into()));

        assert!(matches!(a.try_recv(), Ok(CoreEvent::PrimaryBackendChanged(name)) if name == "Toast"));
        assert!(matches!(b.try_recv(), Ok(CoreEvent::PrimaryBackendChanged(name)) if name == "Toast"));
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let subscribers = Subscribers::default();
        let rx = subscribers.subscribe();
        let _keep = subscribers.subscribe();
        drop(rx);

        subscribers.emit(CoreEvent::PrimaryBackendError("boom".into()));
        assert_eq!(subscribers.len(), 1);
    }
}
