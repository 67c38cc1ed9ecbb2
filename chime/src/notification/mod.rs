// Notification data model and the events the core raises about notifications
pub mod events;
pub mod types;

pub use events::CoreEvent;
pub use types::{Action, CloseReason, Notification, Priority};
